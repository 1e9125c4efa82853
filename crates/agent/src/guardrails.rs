use knowbot_core::actions::CREATE_TICKET;
use knowbot_core::deployment::{ActionsConfig, PersonaConfig};
use knowbot_core::intent::{IntentResult, Severity};
use serde::Serialize;

/// Built-in phrases that count as asking for a human when the intent is severe enough.
pub const HUMAN_REQUEST_PHRASES: &[&str] = &[
    "human",
    "agent",
    "representative",
    "real person",
    "talk to someone",
    "create ticket",
    "raise a ticket",
    "contact support",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    Explicit,
    Implicit,
}

impl EscalationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Implicit => "implicit",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionDecision {
    pub authorized: bool,
    pub action_name: Option<String>,
    pub reason_code: &'static str,
    pub terminates_session: bool,
    pub escalation: Option<EscalationKind>,
}

impl ActionDecision {
    fn authorize(reason_code: &'static str, escalation: EscalationKind) -> Self {
        Self {
            authorized: true,
            action_name: Some(CREATE_TICKET.to_string()),
            reason_code,
            terminates_session: escalation == EscalationKind::Explicit,
            escalation: Some(escalation),
        }
    }

    fn refuse(reason_code: &'static str) -> Self {
        Self {
            authorized: false,
            action_name: None,
            reason_code,
            terminates_session: false,
            escalation: None,
        }
    }
}

/// Decides whether a turn may fire the ticket action. Never executes anything itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionGate {
    explicit_phrases: Vec<String>,
    escalation_severities: Vec<Severity>,
    ticket_enabled: bool,
}

impl ActionGate {
    pub fn new(persona: &PersonaConfig, actions: &ActionsConfig) -> Self {
        let explicit_phrases = persona
            .escalation_phrases
            .user_request_indicators
            .iter()
            .map(|phrase| phrase.trim().to_lowercase())
            .filter(|phrase| !phrase.is_empty())
            .collect();

        Self {
            explicit_phrases,
            escalation_severities: actions.policy.escalation_severities.clone(),
            ticket_enabled: actions.is_enabled(CREATE_TICKET),
        }
    }

    /// Explicit escalation is a hard override: it ignores intent, severity and the catalog.
    pub fn check_explicit(&self, query: &str) -> Option<ActionDecision> {
        let query = query.to_lowercase();
        self.explicit_phrases
            .iter()
            .any(|phrase| query.contains(phrase.as_str()))
            .then(|| ActionDecision::authorize("explicit_user_request", EscalationKind::Explicit))
    }

    pub fn check_implicit(&self, query: &str, intent: &IntentResult) -> ActionDecision {
        let query = query.to_lowercase();
        if !HUMAN_REQUEST_PHRASES.iter().any(|phrase| query.contains(phrase)) {
            return ActionDecision::refuse("no_escalation_signal");
        }
        if !self.escalation_severities.contains(&intent.severity) {
            return ActionDecision::refuse("severity_below_threshold");
        }
        if !self.ticket_enabled {
            return ActionDecision::refuse("action_disabled");
        }
        ActionDecision::authorize("severity_escalation", EscalationKind::Implicit)
    }

    pub fn evaluate(&self, query: &str, intent: &IntentResult) -> ActionDecision {
        self.check_explicit(query).unwrap_or_else(|| self.check_implicit(query, intent))
    }
}
