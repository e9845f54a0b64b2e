use std::env;
use std::io::Write;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use covermatch_agent::matcher::matcher_agent;
use covermatch_agent::{
    Crew, CrewExecutor, InputSource, LlmClient, MatcherPipeline, ToolRegistry,
};
use covermatch_cli::commands::{config, matcher, matcher::MatchInput};
use serde_json::{json, Value};

#[test]
fn match_rejects_unknown_source() {
    with_env(&[], || {
        let result = matcher::run("agent7", MatchInput::Text("flight delay".to_string()));
        assert_eq!(result.exit_code, 4, "expected invalid input code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "match");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_input");
    });
}

#[test]
fn match_rejects_blank_input_and_unreadable_files() {
    with_env(&[], || {
        let blank = matcher::run("user", MatchInput::Text("   ".to_string()));
        assert_eq!(blank.exit_code, 4);

        let missing = matcher::run(
            "user",
            MatchInput::File("/definitely/not/here/profile.txt".into()),
        );
        assert_eq!(missing.exit_code, 4);
        let payload = parse_payload(&missing.output);
        assert!(payload["message"].as_str().unwrap_or("").contains("could not read input file"));
    });
}

#[test]
fn match_requires_matcher_knowledge_base() {
    with_env(&[("RISKWOLF_API_KEY", "rw-test"), ("AWS_BEARER_TOKEN_BEDROCK", "br-test")], || {
        let result = matcher::run("user", MatchInput::Sample);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or("").contains("BEDROCK_KB_ID"));
    });
}

#[test]
fn match_reports_invalid_environment_config() {
    with_env(&[("COVERMATCH_LLM_TEMPERATURE", "warm")], || {
        let result = matcher::run("agent1", MatchInput::Sample);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or("").contains("COVERMATCH_LLM_TEMPERATURE"));
    });
}

#[test]
fn input_file_and_samples_resolve_to_text() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "Parametric hail cover for Bavarian vineyards").expect("write input");

    let text = matcher::resolve_input(MatchInput::File(file.path().to_path_buf()), InputSource::User)
        .expect("file input");
    assert_eq!(text.trim(), "Parametric hail cover for Bavarian vineyards");

    let agent1 = matcher::resolve_input(MatchInput::Sample, InputSource::Agent1).expect("sample");
    assert!(agent1.starts_with("Risk Profile for AirTravelers Inc"));
    assert!(matcher::sample_for(InputSource::User).contains("JFK and LAX"));
}

#[test]
fn run_with_wraps_pipeline_result_in_command_payload() {
    let executor = Arc::new(CannedExecutor::new(Ok("{\"status\": \"final\", \"coverage_options\": []}")));
    let pipeline = pipeline(executor.clone());

    let result = matcher::run_with(&pipeline, "flight delay JFK-LAX", InputSource::Agent1);

    assert_eq!(result.exit_code, 0);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["result"], json!({ "status": "final", "coverage_options": [] }));
    assert_eq!(executor.task_counts(), vec![4]);
}

#[test]
fn run_with_maps_orchestration_failure_to_exit_code() {
    let pipeline = pipeline(Arc::new(CannedExecutor::new(Err("bedrock throttled"))));

    let result = matcher::run_with(&pipeline, "anything", InputSource::User);

    assert_eq!(result.exit_code, 5);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "matcher_run");
    assert_eq!(payload["message"], "bedrock throttled");
}

#[test]
fn config_attributes_well_known_env_names_and_redacts_keys() {
    with_env(
        &[("RISKWOLF_API_KEY", "rwk_live_0123456789"), ("AWS_REGION", "eu-west-1")],
        || {
            let output = config::run();

            assert!(output.contains("- riskwolf.api_key = rwk_*** (source: env (RISKWOLF_API_KEY))"));
            assert!(output.contains("- bedrock.region = eu-west-1 (source: env (AWS_REGION))"));
            assert!(output.contains(
                "- bedrock.agent_runtime_endpoint = https://bedrock-agent-runtime.eu-west-1.amazonaws.com \
                 (source: derived from bedrock.region, env (AWS_REGION))"
            ));
            assert!(!output.contains("0123456789"));
        },
    );
}

#[test]
fn config_attributes_pinned_endpoint_to_its_own_env_key() {
    with_env(
        &[
            ("AWS_REGION", "eu-west-1"),
            ("COVERMATCH_BEDROCK_RUNTIME_ENDPOINT", "http://localhost:4566"),
        ],
        || {
            let output = config::run();

            assert!(output.contains(
                "- bedrock.runtime_endpoint = http://localhost:4566 \
                 (source: env (COVERMATCH_BEDROCK_RUNTIME_ENDPOINT))"
            ));
            assert!(output.contains("(source: derived from bedrock.region, env (AWS_REGION))"));
        },
    );
}

struct UnusedLlm;

#[async_trait]
impl LlmClient for UnusedLlm {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        Err(anyhow!("the canned executor never calls the model"))
    }
}

struct CannedExecutor {
    reply: std::result::Result<&'static str, &'static str>,
    task_counts: Mutex<Vec<usize>>,
}

impl CannedExecutor {
    fn new(reply: std::result::Result<&'static str, &'static str>) -> Self {
        Self { reply, task_counts: Mutex::new(Vec::new()) }
    }

    fn task_counts(&self) -> Vec<usize> {
        self.task_counts.lock().expect("task counts lock").clone()
    }
}

#[async_trait]
impl CrewExecutor for CannedExecutor {
    async fn kickoff(&self, crew: &Crew) -> Result<String> {
        self.task_counts.lock().expect("task counts lock").push(crew.tasks.len());
        self.reply.map(str::to_string).map_err(|message| anyhow!(message))
    }
}

fn pipeline(executor: Arc<CannedExecutor>) -> MatcherPipeline {
    MatcherPipeline::new(matcher_agent(Arc::new(UnusedLlm), ToolRegistry::default()), executor)
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "COVERMATCH_RISKWOLF_BASE_URL",
        "COVERMATCH_RISKWOLF_API_KEY",
        "RISKWOLF_API_KEY",
        "COVERMATCH_BEDROCK_REGION",
        "AWS_REGION",
        "COVERMATCH_BEDROCK_API_KEY",
        "AWS_BEARER_TOKEN_BEDROCK",
        "COVERMATCH_BEDROCK_KNOWLEDGE_BASE_ID",
        "BEDROCK_KB_ID",
        "COVERMATCH_BEDROCK_RUNTIME_ENDPOINT",
        "COVERMATCH_BEDROCK_AGENT_RUNTIME_ENDPOINT",
        "COVERMATCH_LLM_MODEL",
        "LLM_ID",
        "COVERMATCH_LLM_TEMPERATURE",
        "COVERMATCH_LLM_MAX_TOKENS",
        "COVERMATCH_LLM_TIMEOUT_SECS",
        "COVERMATCH_SERVER_BIND_ADDRESS",
        "COVERMATCH_SERVER_PORT",
        "COVERMATCH_LOGGING_LEVEL",
        "COVERMATCH_LOG_LEVEL",
        "COVERMATCH_LOGGING_FORMAT",
        "COVERMATCH_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
