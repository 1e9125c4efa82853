use std::io::{self, BufRead, Write};

use knowbot_agent::runtime::TerminationReason;
use knowbot_core::errors::KnowbotError;

use super::{CommandResult, EXIT_CONFIG, EXIT_RUNTIME};
use crate::bootstrap::{self, AppContext};

const PROMPT: &str = "you> ";

pub fn run(show_trace: bool) -> CommandResult {
    let config = match bootstrap::load_config() {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    bootstrap::init_logging(&config);

    let llm = match bootstrap::build_llm(&config) {
        Ok(llm) => llm,
        Err(error) => {
            return CommandResult::failure("chat", "llm_client", format!("{error:#}"), EXIT_CONFIG)
        }
    };
    let context = match bootstrap::build_context(config, llm) {
        Ok(context) => context,
        Err(error) => {
            return CommandResult::failure("chat", error.error_class(), error.to_string(), EXIT_CONFIG)
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    bootstrap::block_on(execute(&context, stdin.lock(), &mut stdout, show_trace)).unwrap_or_else(
        |error| {
            CommandResult::failure(
                "chat",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        },
    )
}

/// Runs one interactive session until an exit keyword, an explicit escalation or end of
/// input. Recoverable turn errors are reported and the session continues.
pub async fn execute<R, W>(
    context: &AppContext,
    input: R,
    output: &mut W,
    show_trace: bool,
) -> CommandResult
where
    R: BufRead,
    W: Write,
{
    let mut session = match context.orchestrator.start_session().await {
        Ok(session) => session,
        Err(error) => {
            return CommandResult::failure("chat", error.error_class(), error.to_string(), EXIT_CONFIG)
        }
    };

    let exit_hint = context.config.session.exit_keywords.join("/");
    let _ = writeln!(output, "Ask a question, or type {exit_hint} to leave.");

    let mut lines = input.lines();
    let mut failed_turns = 0usize;
    let reason = loop {
        let _ = write!(output, "{PROMPT}");
        let _ = output.flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            None => break "end_of_input",
            Some(Err(error)) => {
                tracing::warn!(
                    event_name = "knowbot.cli.input_failed",
                    session_id = %session.id(),
                    error = %error,
                    "could not read chat input"
                );
                return CommandResult::failure(
                    "chat",
                    "input_read",
                    format!(
                        "session {} stopped after {} turns: could not read input: {error}",
                        session.id(),
                        session.turns()
                    ),
                    EXIT_RUNTIME,
                );
            }
        };

        match context.orchestrator.handle_turn(&mut session, &line).await {
            Ok(outcome) => {
                if let Some(reply) = &outcome.reply {
                    let _ = writeln!(output, "bot> {reply}");
                }
                if show_trace {
                    if let Ok(trace) = serde_json::to_string(&outcome.trace) {
                        let _ = writeln!(output, "trace> {trace}");
                    }
                }
                match outcome.terminated {
                    Some(TerminationReason::ExitKeyword) => break "exit_keyword",
                    Some(TerminationReason::ExplicitEscalation) => break "explicit_escalation",
                    None => {}
                }
            }
            Err(KnowbotError::EmptyQuery) => {
                let _ = writeln!(output, "bot> {}", KnowbotError::EmptyQuery.user_message());
            }
            Err(error) => {
                failed_turns += 1;
                tracing::warn!(
                    event_name = "knowbot.cli.turn_failed",
                    session_id = %session.id(),
                    error_class = error.error_class(),
                    error = %error,
                    "chat turn failed"
                );
                let _ = writeln!(output, "bot> {}", error.user_message());
                if !error.is_recoverable() || session.is_terminated() {
                    break "session_terminated";
                }
            }
        }
    };

    CommandResult::success(
        "chat",
        format!(
            "session {} ended ({reason}) after {} turns, {failed_turns} failed",
            session.id(),
            session.turns()
        ),
    )
}
