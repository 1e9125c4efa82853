use std::time::Instant;

use chrono::{DateTime, Utc};
use knowbot_core::knowledge::SearchMode;
use serde::Serialize;

use crate::guardrails::EscalationKind;

pub const STAGE_EXPLICIT_ESCALATION: &str = "explicit_escalation";
pub const STAGE_KNOWLEDGE_SEARCH: &str = "knowledge_search";
pub const STAGE_INTENT_RESOLUTION: &str = "intent_resolution";
pub const STAGE_CATEGORY_FALLBACK: &str = "category_fallback";
pub const STAGE_IMPLICIT_ESCALATION: &str = "implicit_escalation";
pub const STAGE_ACTION_EXECUTION: &str = "action_execution";
pub const STAGE_GENERATION: &str = "generation";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: &'static str,
    pub elapsed_ms: f64,
}

/// Per-turn diagnostics. Kept out of prompts and history.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceRecord {
    pub session_id: String,
    pub turn: u32,
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageTiming>,
    pub search_mode: Option<SearchMode>,
    pub knowledge_matches: usize,
    pub kb_total: usize,
    pub fallback_used: bool,
    pub intent: Option<String>,
    pub escalation: Option<EscalationKind>,
    pub action_taken: bool,
    pub terminated: bool,
}

impl TraceRecord {
    pub fn new(session_id: impl Into<String>, turn: u32, kb_total: usize) -> Self {
        Self {
            session_id: session_id.into(),
            turn,
            started_at: Utc::now(),
            stages: Vec::new(),
            search_mode: None,
            knowledge_matches: 0,
            kb_total,
            fallback_used: false,
            intent: None,
            escalation: None,
            action_taken: false,
            terminated: false,
        }
    }

    pub fn record(&mut self, stage: &'static str, started: Instant) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.stages.push(StageTiming { stage, elapsed_ms });
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|timing| timing.stage).collect()
    }

    pub fn total_ms(&self) -> f64 {
        self.stages.iter().map(|timing| timing.elapsed_ms).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::{TraceRecord, STAGE_GENERATION, STAGE_KNOWLEDGE_SEARCH};

    #[test]
    fn stages_keep_recording_order() {
        let mut trace = TraceRecord::new("session-1", 1, 12);
        trace.record(STAGE_KNOWLEDGE_SEARCH, Instant::now());
        trace.record(STAGE_GENERATION, Instant::now());

        assert_eq!(trace.stage_names(), vec!["knowledge_search", "generation"]);
        assert!(trace.total_ms() >= 0.0);
        assert_eq!(trace.kb_total, 12);
    }
}
