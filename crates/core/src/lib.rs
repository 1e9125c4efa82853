//! Knowbot core: the retrieval, classification and action engine.
//!
//! - `text`: tokenizer shared by corpus indexing and queries
//! - `knowledge`: in-memory index with keyword, semantic-overlap and hybrid search
//! - `intent`: rule-based intent resolution with security override and fallback
//! - `actions`: side-effecting actions and their executor
//! - `deployment`: the per-industry persona/intents/actions/knowledge bundle
//! - `service`: resource and tool routing over all of the above
//! - `config`: application configuration (`knowbot.toml` + `KNOWBOT_*`)

pub mod actions;
pub mod config;
pub mod deployment;
pub mod errors;
pub mod intent;
pub mod knowledge;
pub mod service;
pub mod text;

pub use actions::{ActionExecutor, ActionReceipt, ActionRequest, RecordingExecutor};
pub use deployment::{Deployment, KnowledgeRecord, PersonaConfig};
pub use errors::KnowbotError;
pub use intent::{Confidence, IntentResolver, IntentResult, Severity};
pub use knowledge::{KnowledgeIndex, SearchMode, SearchResponse};
pub use service::KnowledgeService;
pub use text::Tokenizer;
