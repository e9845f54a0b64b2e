use covermatch_core::config::{AppConfig, ConfigError, LoadOptions};
use covermatch_core::{EnvSource, SearchSettings, SettingsSource};
use serde::Serialize;

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

pub fn run(json_output: bool) -> String {
    let report = build_report(AppConfig::load(LoadOptions::default()), &EnvSource);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

const CONFIG_CHECKS: [&str; 3] =
    ["riskwolf_credential", "bedrock_credential", "matcher_knowledge_base"];

fn build_report(
    config: Result<AppConfig, ConfigError>,
    settings: &dyn SettingsSource,
) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(presence_check(
                CONFIG_CHECKS[0],
                config.riskwolf.api_key.is_some(),
                "riskwolf api key configured",
                "RISKWOLF_API_KEY is not set; Riskwolf tools will fail",
            ));
            checks.push(presence_check(
                CONFIG_CHECKS[1],
                config.bedrock.api_key.is_some(),
                "bedrock api key configured",
                "AWS_BEARER_TOKEN_BEDROCK is not set; model and retrieval calls will fail",
            ));
            checks.push(match &config.bedrock.knowledge_base_id {
                Some(id) => DoctorCheck {
                    name: CONFIG_CHECKS[2],
                    status: CheckStatus::Pass,
                    details: format!("matcher knowledge base `{id}` in {}", config.bedrock.region),
                },
                None => DoctorCheck {
                    name: CONFIG_CHECKS[2],
                    status: CheckStatus::Fail,
                    details: "BEDROCK_KB_ID is not set; `covermatch match` cannot run".to_string(),
                },
            });
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(CONFIG_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }
    checks.push(search_settings_check(settings));

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn presence_check(
    name: &'static str,
    present: bool,
    pass_details: &str,
    fail_details: &str,
) -> DoctorCheck {
    let (status, details) =
        if present { (CheckStatus::Pass, pass_details) } else { (CheckStatus::Fail, fail_details) };
    DoctorCheck { name, status, details: details.to_string() }
}

fn search_settings_check(settings: &dyn SettingsSource) -> DoctorCheck {
    match SearchSettings::resolve(settings) {
        Ok(settings) => DoctorCheck {
            name: "search_settings",
            status: CheckStatus::Pass,
            details: format!(
                "search service will use knowledge base `{}` with `{}`",
                settings.knowledge_base_id, settings.model_id
            ),
        },
        Err(missing) => DoctorCheck {
            name: "search_settings",
            status: CheckStatus::Fail,
            details: missing.to_string(),
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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
