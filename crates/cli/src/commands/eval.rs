//! Offline evaluation of intent resolution, knowledge search and the action policy against a
//! file of labelled cases. Runs entirely in-process; the generation model is never called.

use std::fs;
use std::path::Path;
use std::time::Instant;

use knowbot_agent::guardrails::ActionGate;
use knowbot_core::KnowledgeService;
use serde::{Deserialize, Serialize};

use super::{CommandResult, EXIT_CONFIG, EXIT_EVAL_FAILED};
use crate::bootstrap;

#[derive(Clone, Debug, Deserialize)]
pub struct EvalCase {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub query: String,
    pub expected_intent: String,
    #[serde(default)]
    pub expect_action: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Clone, Debug, Serialize)]
pub struct SystemOutput {
    pub intent: String,
    pub knowledge_hits: usize,
    pub action_triggered: bool,
    pub latency_ms: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExpectedOutput {
    pub intent: String,
    pub action_triggered: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct CaseResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub query: String,
    pub system_output: SystemOutput,
    pub expected_output: ExpectedOutput,
    pub status: CaseStatus,
    pub notes: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvalSummary {
    pub total: usize,
    pub failures: Vec<String>,
    pub intent_accuracy_pct: f64,
    pub avg_latency_ms: f64,
}

pub fn run(cases_path: &Path, output_path: Option<&Path>) -> CommandResult {
    let config = match bootstrap::load_config() {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("eval", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    bootstrap::init_logging(&config);

    let (service, _) = match bootstrap::load_service(&config) {
        Ok(loaded) => loaded,
        Err(error) => {
            return CommandResult::failure("eval", error.error_class(), error.to_string(), EXIT_CONFIG)
        }
    };

    let cases = match load_cases(cases_path) {
        Ok(cases) => cases,
        Err(message) => return CommandResult::failure("eval", "invalid_cases", message, EXIT_CONFIG),
    };

    let results = evaluate(&service, &cases);
    let summary = summarize(&results);

    if let Some(path) = output_path {
        let written = serde_json::to_string_pretty(&results)
            .map_err(|error| error.to_string())
            .and_then(|json| fs::write(path, json).map_err(|error| error.to_string()));
        if let Err(error) = written {
            return CommandResult::failure(
                "eval",
                "output_write",
                format!("failed to write `{}`: {error}", path.display()),
                EXIT_CONFIG,
            );
        }
    }

    let exit_code = if summary.failures.is_empty() { 0 } else { EXIT_EVAL_FAILED };
    CommandResult { exit_code, output: render_report(&results, &summary) }
}

pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("could not read `{}`: {error}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|error| format!("could not parse `{}`: {error}", path.display()))
}

/// Evaluates each case against the service and the deployment's action policy. Actions are
/// decided but never executed.
pub fn evaluate(service: &KnowledgeService, cases: &[EvalCase]) -> Vec<CaseResult> {
    let deployment = service.deployment();
    let gate = ActionGate::new(&deployment.persona, &deployment.actions);

    cases
        .iter()
        .map(|case| {
            let started = Instant::now();
            let intent = service.resolve_intent(&case.query);
            let knowledge_hits = service.search(&case.query).matches.len();
            let action_triggered = gate.evaluate(&case.query, &intent).authorized;
            let latency_ms = (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0;

            let mut notes = Vec::new();
            if intent.intent != case.expected_intent {
                notes.push(format!(
                    "Intent mismatch (detected='{}', expected='{}')",
                    intent.intent, case.expected_intent
                ));
            }
            if action_triggered != case.expect_action {
                notes.push(format!(
                    "Action mismatch (triggered={action_triggered}, expected={})",
                    case.expect_action
                ));
            }
            let status = if notes.is_empty() { CaseStatus::Pass } else { CaseStatus::Fail };

            CaseResult {
                id: case.id.clone(),
                kind: case.kind.clone(),
                query: case.query.clone(),
                system_output: SystemOutput {
                    intent: intent.intent,
                    knowledge_hits,
                    action_triggered,
                    latency_ms,
                },
                expected_output: ExpectedOutput {
                    intent: case.expected_intent.clone(),
                    action_triggered: case.expect_action,
                },
                status,
                notes,
            }
        })
        .collect()
}

pub fn summarize(results: &[CaseResult]) -> EvalSummary {
    let total = results.len();
    let failures = results
        .iter()
        .filter(|result| result.status == CaseStatus::Fail)
        .map(|result| result.id.clone())
        .collect::<Vec<_>>();
    let intent_matches = results
        .iter()
        .filter(|result| result.system_output.intent == result.expected_output.intent)
        .count();

    let (intent_accuracy_pct, avg_latency_ms) = if total == 0 {
        (0.0, 0.0)
    } else {
        let latency: f64 = results.iter().map(|result| result.system_output.latency_ms).sum();
        (intent_matches as f64 * 100.0 / total as f64, latency / total as f64)
    };

    EvalSummary { total, failures, intent_accuracy_pct, avg_latency_ms }
}

fn render_report(results: &[CaseResult], summary: &EvalSummary) -> String {
    let mut lines = Vec::new();

    for result in results {
        let query = if result.query.is_empty() { "[EMPTY]" } else { result.query.as_str() };
        lines.push(format!("TEST {} ({})", result.id, result.kind));
        lines.push(format!("  query           : {query}"));
        lines.push(format!("  intent          : {}", result.system_output.intent));
        lines.push(format!("  knowledge hits  : {}", result.system_output.knowledge_hits));
        lines.push(format!("  action triggered: {}", result.system_output.action_triggered));
        lines.push(format!("  latency (ms)    : {:.2}", result.system_output.latency_ms));
        let status = match result.status {
            CaseStatus::Pass => "PASS",
            CaseStatus::Fail => "FAIL",
        };
        lines.push(format!("  status          : {status}"));
        for note in &result.notes {
            lines.push(format!("    - {note}"));
        }
    }

    lines.push(String::new());
    lines.push(format!("total cases     : {}", summary.total));
    lines.push(format!("intent accuracy : {:.2}%", summary.intent_accuracy_pct));
    lines.push(format!("avg latency     : {:.2} ms", summary.avg_latency_ms));
    lines.push(format!("failures        : {}", summary.failures.len()));
    if summary.failures.is_empty() {
        lines.push("eval: all cases passed".to_string());
    } else {
        lines.push(format!("eval: failed cases: {}", summary.failures.join(", ")));
    }

    lines.join("\n")
}
