use knowbot_agent::runtime::{TerminationReason, TurnOutcome};
use knowbot_agent::trace::TraceRecord;
use knowbot_core::actions::ActionReceipt;
use knowbot_core::intent::IntentResult;
use serde::Serialize;

use super::{escape_json, CommandResult, EXIT_CONFIG, EXIT_RUNTIME, EXIT_TURN_FAILED};
use crate::bootstrap::{self, AppContext};

#[derive(Debug, Serialize)]
struct AskPayload<'a> {
    command: &'static str,
    status: &'static str,
    reply: Option<&'a str>,
    intent: Option<&'a IntentResult>,
    knowledge_ids: Vec<&'a str>,
    action_taken: bool,
    receipt: Option<&'a ActionReceipt>,
    terminated: Option<TerminationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<&'a TraceRecord>,
}

pub fn run(query: &str, show_trace: bool) -> CommandResult {
    let config = match bootstrap::load_config() {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("ask", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    bootstrap::init_logging(&config);

    let llm = match bootstrap::build_llm(&config) {
        Ok(llm) => llm,
        Err(error) => {
            return CommandResult::failure("ask", "llm_client", format!("{error:#}"), EXIT_CONFIG)
        }
    };
    let context = match bootstrap::build_context(config, llm) {
        Ok(context) => context,
        Err(error) => {
            return CommandResult::failure("ask", error.error_class(), error.to_string(), EXIT_CONFIG)
        }
    };

    bootstrap::block_on(execute(&context, query, show_trace)).unwrap_or_else(|error| {
        CommandResult::failure(
            "ask",
            "runtime",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// Runs one turn in a fresh session.
pub async fn execute(context: &AppContext, query: &str, show_trace: bool) -> CommandResult {
    let mut session = match context.orchestrator.start_session().await {
        Ok(session) => session,
        Err(error) => {
            return CommandResult::failure("ask", error.error_class(), error.to_string(), EXIT_CONFIG)
        }
    };

    match context.orchestrator.handle_turn(&mut session, query).await {
        Ok(outcome) => {
            CommandResult { exit_code: 0, output: render_outcome(&outcome, show_trace) }
        }
        Err(error) => {
            tracing::warn!(
                event_name = "knowbot.cli.ask_failed",
                session_id = %session.id(),
                error_class = error.error_class(),
                error = %error,
                "ask turn failed"
            );
            CommandResult::failure("ask", error.error_class(), error.user_message(), EXIT_TURN_FAILED)
        }
    }
}

fn render_outcome(outcome: &TurnOutcome, show_trace: bool) -> String {
    let payload = AskPayload {
        command: "ask",
        status: "ok",
        reply: outcome.reply.as_deref(),
        intent: outcome.intent.as_ref(),
        knowledge_ids: outcome.knowledge.iter().map(|record| record.id.as_str()).collect(),
        action_taken: outcome.trace.action_taken,
        receipt: outcome.receipt.as_ref(),
        terminated: outcome.terminated,
        trace: show_trace.then_some(&outcome.trace),
    };

    serde_json::to_string_pretty(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"ask\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    })
}
