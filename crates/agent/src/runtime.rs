//! Per-session control flow.
//!
//! A turn runs its stages strictly in order and awaits each boundary call before starting the
//! next. The only concurrent work is the set of independent reads issued once at session
//! start. Sessions own their history and state, so several sessions may share one
//! orchestrator.

use std::sync::Arc;
use std::time::Instant;

use knowbot_core::actions::{ActionReceipt, ActionRequest};
use knowbot_core::config::SessionConfig;
use knowbot_core::deployment::{KnowledgeRecord, PersonaConfig};
use knowbot_core::errors::KnowbotError;
use knowbot_core::intent::IntentResult;
use knowbot_core::knowledge::first_in_category;
use serde::Serialize;
use uuid::Uuid;

use crate::conversation::{compose_request, ConversationTurn, SessionHistory};
use crate::guardrails::{ActionDecision, ActionGate};
use crate::llm::LlmClient;
use crate::tools::BackendClient;
use crate::trace::{
    TraceRecord, STAGE_ACTION_EXECUTION, STAGE_CATEGORY_FALLBACK, STAGE_EXPLICIT_ESCALATION,
    STAGE_GENERATION, STAGE_IMPLICIT_ESCALATION, STAGE_INTENT_RESOLUTION, STAGE_KNOWLEDGE_SEARCH,
};

pub const HANDOFF_REPLY: &str =
    "I've passed your request to our support team. Someone will follow up with you shortly.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    ExitKeyword,
    ExplicitEscalation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Terminated(TerminationReason),
}

pub struct Session {
    id: Uuid,
    persona: PersonaConfig,
    gate: ActionGate,
    fallback_pool: Vec<KnowledgeRecord>,
    history: SessionHistory,
    state: SessionState,
    turns: u32,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("turns", &self.turns)
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, SessionState::Terminated(_))
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    fn terminate(&mut self, reason: TerminationReason) {
        self.state = SessionState::Terminated(reason);
    }

    fn category_fallback(&self, intent: &str) -> Option<KnowledgeRecord> {
        first_in_category(&self.fallback_pool, intent).cloned()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnOutcome {
    pub reply: Option<String>,
    pub intent: Option<IntentResult>,
    pub knowledge: Vec<KnowledgeRecord>,
    pub decision: Option<ActionDecision>,
    pub receipt: Option<ActionReceipt>,
    pub terminated: Option<TerminationReason>,
    pub trace: TraceRecord,
}

impl TurnOutcome {
    fn new(trace: TraceRecord) -> Self {
        Self {
            reply: None,
            intent: None,
            knowledge: Vec::new(),
            decision: None,
            receipt: None,
            terminated: None,
            trace,
        }
    }
}

#[derive(Clone)]
pub struct ConversationOrchestrator {
    backend: BackendClient,
    llm: Arc<dyn LlmClient>,
    settings: SessionConfig,
}

impl std::fmt::Debug for ConversationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationOrchestrator").field("settings", &self.settings).finish()
    }
}

impl ConversationOrchestrator {
    pub fn new(
        backend: BackendClient,
        llm: Arc<dyn LlmClient>,
        settings: SessionConfig,
    ) -> Self {
        Self { backend, llm, settings }
    }

    pub fn settings(&self) -> &SessionConfig {
        &self.settings
    }

    pub async fn start_session(&self) -> Result<Session, KnowbotError> {
        let (persona, actions, corpus) = tokio::try_join!(
            self.backend.persona(),
            self.backend.action_policy(),
            self.backend.search_all()
        )?;

        let session = Session {
            id: Uuid::new_v4(),
            gate: ActionGate::new(&persona, &actions),
            persona,
            fallback_pool: corpus.matches,
            history: SessionHistory::new(self.settings.max_history_turns),
            state: SessionState::Active,
            turns: 0,
        };

        tracing::info!(
            event_name = "knowbot.session.started",
            session_id = %session.id,
            kb_total = session.fallback_pool.len(),
            max_history_turns = session.history.capacity(),
            "session started"
        );

        Ok(session)
    }

    pub async fn handle_turn(
        &self,
        session: &mut Session,
        input: &str,
    ) -> Result<TurnOutcome, KnowbotError> {
        if session.is_terminated() {
            return Err(KnowbotError::SessionTerminated);
        }

        let kb_total = session.fallback_pool.len();
        if self.settings.is_exit_keyword(input) {
            session.terminate(TerminationReason::ExitKeyword);
            let mut trace = TraceRecord::new(session.id.to_string(), session.turns, kb_total);
            trace.terminated = true;
            tracing::info!(
                event_name = "knowbot.session.terminated",
                session_id = %session.id,
                reason = "exit_keyword",
                "session terminated"
            );
            let mut outcome = TurnOutcome::new(trace);
            outcome.terminated = Some(TerminationReason::ExitKeyword);
            return Ok(outcome);
        }

        let query = input.trim();
        if query.is_empty() {
            return Err(KnowbotError::EmptyQuery);
        }

        session.turns += 1;
        let mut trace = TraceRecord::new(session.id.to_string(), session.turns, kb_total);

        let started = Instant::now();
        let explicit = session.gate.check_explicit(query);
        trace.record(STAGE_EXPLICIT_ESCALATION, started);
        if let Some(decision) = explicit {
            return self.escalate_explicitly(session, query, decision, trace).await;
        }

        let started = Instant::now();
        let search = self.backend.search(query).await?;
        trace.record(STAGE_KNOWLEDGE_SEARCH, started);
        trace.search_mode = search.search_mode;
        trace.knowledge_matches = search.matches.len();

        let started = Instant::now();
        let intent = self.backend.resolve_intent(query).await?;
        trace.record(STAGE_INTENT_RESOLUTION, started);
        trace.intent = Some(intent.intent.clone());

        let mut knowledge = search.matches;
        if knowledge.is_empty() {
            let started = Instant::now();
            knowledge.extend(session.category_fallback(&intent.intent));
            trace.record(STAGE_CATEGORY_FALLBACK, started);
            trace.fallback_used = true;
        }

        let started = Instant::now();
        let decision = session.gate.check_implicit(query, &intent);
        trace.record(STAGE_IMPLICIT_ESCALATION, started);
        trace.escalation = decision.escalation;

        let mut receipt = None;
        if decision.authorized {
            let started = Instant::now();
            let executed = self.backend.execute(&ticket_request(query)).await?;
            trace.record(STAGE_ACTION_EXECUTION, started);
            trace.action_taken = true;
            receipt = Some(executed);
        }

        session.history.push(ConversationTurn::user(query));

        let started = Instant::now();
        let request = compose_request(&session.persona, &knowledge, &session.history);
        let reply = self
            .llm
            .complete(&request)
            .await
            .map_err(|error| KnowbotError::unavailable("llm", format!("{error:#}")))?;
        trace.record(STAGE_GENERATION, started);

        session.history.push(ConversationTurn::model(reply.clone()));

        log_turn(&trace);
        Ok(TurnOutcome {
            reply: Some(reply),
            intent: Some(intent),
            knowledge,
            decision: Some(decision),
            receipt,
            terminated: None,
            trace,
        })
    }

    /// Terminal path. The session is terminated before the action runs, so a failed action
    /// still ends the session.
    async fn escalate_explicitly(
        &self,
        session: &mut Session,
        query: &str,
        decision: ActionDecision,
        mut trace: TraceRecord,
    ) -> Result<TurnOutcome, KnowbotError> {
        session.terminate(TerminationReason::ExplicitEscalation);
        trace.escalation = decision.escalation;
        trace.terminated = true;

        let started = Instant::now();
        let receipt = self.backend.execute(&ticket_request(query)).await.map_err(|error| {
            tracing::warn!(
                event_name = "knowbot.action.failed",
                session_id = %session.id,
                error_class = error.error_class(),
                error = %error,
                "explicit escalation action failed"
            );
            error
        })?;
        trace.record(STAGE_ACTION_EXECUTION, started);
        trace.action_taken = true;

        log_turn(&trace);
        Ok(TurnOutcome {
            reply: Some(HANDOFF_REPLY.to_string()),
            intent: None,
            knowledge: Vec::new(),
            decision: Some(decision),
            receipt: Some(receipt),
            terminated: Some(TerminationReason::ExplicitEscalation),
            trace,
        })
    }
}

fn ticket_request(query: &str) -> ActionRequest {
    ActionRequest::CreateTicket { issue: query.to_string() }
}

fn log_turn(trace: &TraceRecord) {
    tracing::info!(
        event_name = "knowbot.turn.completed",
        session_id = %trace.session_id,
        turn = trace.turn,
        knowledge_matches = trace.knowledge_matches,
        fallback_used = trace.fallback_used,
        intent = trace.intent.as_deref().unwrap_or(""),
        action_taken = trace.action_taken,
        terminated = trace.terminated,
        elapsed_ms = trace.total_ms(),
        "turn completed"
    );
}
