use knowbot_core::config::{AppConfig, LlmProvider};
use secrecy::ExposeSecret;
use serde::Serialize;

use super::escape_json;
use crate::bootstrap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn passed(&self) -> bool {
        self.overall_status == CheckStatus::Pass
    }
}

pub fn run(json_output: bool) -> (bool, String) {
    let report = build_report();
    let passed = report.passed();

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return (passed, output);
    }

    (passed, render_human(&report))
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match bootstrap::load_config() {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_deployment_bundle(&config));
            checks.push(check_llm_readiness(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "deployment_bundle",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "llm_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_deployment_bundle(config: &AppConfig) -> DoctorCheck {
    match bootstrap::load_service(config) {
        Ok((service, _)) => {
            let deployment = service.deployment();
            DoctorCheck {
                name: "deployment_bundle",
                status: CheckStatus::Pass,
                details: format!(
                    "{} knowledge entries ({} search), {} intents, fallback `{}`",
                    service.index().len(),
                    service.index().mode().as_str(),
                    deployment.intents.intents.len(),
                    service.resolver().fallback_intent()
                ),
            }
        }
        Err(error) => DoctorCheck {
            name: "deployment_bundle",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_llm_readiness(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    let has_key =
        llm.api_key.as_ref().map(|key| !key.expose_secret().trim().is_empty()).unwrap_or(false);

    match (llm.provider, has_key) {
        (LlmProvider::Ollama, _) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Pass,
            details: format!(
                "ollama model `{}` at {}",
                llm.model,
                llm.base_url.as_deref().unwrap_or("the default local endpoint")
            ),
        },
        (provider, true) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Pass,
            details: format!("{} model `{}` with api key configured", provider.as_str(), llm.model),
        },
        (provider, false) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Fail,
            details: format!("{} requires llm.api_key", provider.as_str()),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
