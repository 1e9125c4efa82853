use std::collections::VecDeque;

use knowbot_core::deployment::{KnowledgeRecord, PersonaConfig};
use serde::{Deserialize, Serialize};

use crate::llm::GenerationRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: Role::Model, text: text.into() }
    }
}

/// Bounded FIFO of turns; pushing past capacity evicts the oldest turn.
#[derive(Clone, Debug)]
pub struct SessionHistory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl SessionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { turns: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn to_vec(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }
}

pub fn system_prompt(persona: &PersonaConfig) -> String {
    format!(
        "You are a {} support assistant. Respond in a {} and {} manner. \
         Provide direct, actionable guidance. \
         Do not mention internal systems, confidence levels, or escalation logic.",
        persona.tone, persona.verbosity, persona.style
    )
}

pub fn render_knowledge(knowledge: &[KnowledgeRecord]) -> String {
    if knowledge.is_empty() {
        return "Context:\nNo matching knowledge was found for this question.".to_string();
    }

    let mut rendered = String::from("Context:");
    for record in knowledge {
        rendered.push_str(&format!("\n- [{}] {}: {}", record.category, record.title, record.content));
    }
    rendered
}

/// Builds the generation input from persona, knowledge and the history window only.
pub fn compose_request(
    persona: &PersonaConfig,
    knowledge: &[KnowledgeRecord],
    history: &SessionHistory,
) -> GenerationRequest {
    GenerationRequest {
        system: system_prompt(persona),
        context: render_knowledge(knowledge),
        turns: history.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use knowbot_core::deployment::{KnowledgeRecord, PersonaConfig};

    use super::{compose_request, ConversationTurn, Role, SessionHistory};

    fn persona() -> PersonaConfig {
        PersonaConfig {
            tone: "friendly".to_string(),
            verbosity: "concise".to_string(),
            style: "step-by-step".to_string(),
            search: Default::default(),
            escalation_phrases: Default::default(),
        }
    }

    #[test]
    fn history_keeps_the_most_recent_window() {
        let mut history = SessionHistory::new(4);
        for index in 0..7 {
            history.push(ConversationTurn::user(format!("turn {index}")));
        }

        assert_eq!(history.len(), 4);
        let texts = history.iter().map(|turn| turn.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["turn 3", "turn 4", "turn 5", "turn 6"]);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut history = SessionHistory::new(0);
        history.push(ConversationTurn::user("a"));
        history.push(ConversationTurn::model("b"));

        assert_eq!(history.capacity(), 1);
        assert_eq!(history.to_vec(), vec![ConversationTurn::model("b")]);
    }

    #[test]
    fn request_carries_persona_knowledge_and_history() {
        let mut history = SessionHistory::new(10);
        history.push(ConversationTurn::user("How do I reset my password?"));
        let knowledge = vec![KnowledgeRecord {
            id: "kb-1".to_string(),
            title: "Password reset".to_string(),
            content: "Use the forgot password link.".to_string(),
            category: "account".to_string(),
        }];

        let request = compose_request(&persona(), &knowledge, &history);

        assert!(request.system.starts_with("You are a friendly support assistant."));
        assert!(request.system.contains("concise and step-by-step manner"));
        assert!(request.context.contains("[account] Password reset: Use the forgot password link."));
        assert_eq!(request.turns.len(), 1);
        assert_eq!(request.turns[0].role, Role::User);
    }

    #[test]
    fn empty_knowledge_renders_placeholder() {
        let request = compose_request(&persona(), &[], &SessionHistory::new(2));
        assert!(request.context.contains("No matching knowledge"));
        assert!(request.turns.is_empty());
    }
}
