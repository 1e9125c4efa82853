//! Knowbot agent runtime: the per-session conversation loop.
//!
//! - `tools`: typed client over the knowledge service surface (resources and tools)
//! - `guardrails`: the action gate deciding whether a turn may open a ticket
//! - `conversation`: bounded session history and prompt composition
//! - `llm`: text-generation clients for OpenAI, Anthropic, Ollama and Gemini
//! - `runtime`: the orchestrator that sequences a turn and produces its outcome
//! - `trace`: per-turn stage timings and decision flags
//!
//! The generation model only phrases replies. Which knowledge is shown, which intent applies
//! and whether an action fires are decided deterministically before it is called.

pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod runtime;
pub mod tools;
pub mod trace;

pub use guardrails::{ActionDecision, ActionGate};
pub use llm::{HttpLlmClient, LlmClient};
pub use runtime::{ConversationOrchestrator, Session, TurnOutcome};
pub use tools::{BackendClient, KnowledgeBackend, LocalBackend};
