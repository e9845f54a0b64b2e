use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use covermatch_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

const REGION_ENV_KEYS: &[&str] = &["COVERMATCH_BEDROCK_REGION", "AWS_REGION"];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let fields: [(&str, String, &[&str]); 15] = [
        ("riskwolf.base_url", config.riskwolf.base_url.clone(), &["COVERMATCH_RISKWOLF_BASE_URL"]),
        (
            "riskwolf.api_key",
            redact_secret(config.riskwolf.api_key.as_ref()),
            &["COVERMATCH_RISKWOLF_API_KEY", "RISKWOLF_API_KEY"],
        ),
        ("bedrock.region", config.bedrock.region.clone(), REGION_ENV_KEYS),
        (
            "bedrock.api_key",
            redact_secret(config.bedrock.api_key.as_ref()),
            &["COVERMATCH_BEDROCK_API_KEY", "AWS_BEARER_TOKEN_BEDROCK"],
        ),
        (
            "bedrock.knowledge_base_id",
            config.bedrock.knowledge_base_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["COVERMATCH_BEDROCK_KNOWLEDGE_BASE_ID", "BEDROCK_KB_ID"],
        ),
        (
            "bedrock.runtime_endpoint",
            config.bedrock.runtime_endpoint(),
            &["COVERMATCH_BEDROCK_RUNTIME_ENDPOINT"],
        ),
        (
            "bedrock.agent_runtime_endpoint",
            config.bedrock.agent_runtime_endpoint(),
            &["COVERMATCH_BEDROCK_AGENT_RUNTIME_ENDPOINT"],
        ),
        ("llm.model", config.llm.model.clone(), &["COVERMATCH_LLM_MODEL", "LLM_ID"]),
        ("llm.temperature", config.llm.temperature.to_string(), &["COVERMATCH_LLM_TEMPERATURE"]),
        ("llm.max_tokens", config.llm.max_tokens.to_string(), &["COVERMATCH_LLM_MAX_TOKENS"]),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["COVERMATCH_LLM_TIMEOUT_SECS"]),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["COVERMATCH_SERVER_BIND_ADDRESS"],
        ),
        ("server.port", config.server.port.to_string(), &["COVERMATCH_SERVER_PORT"]),
        (
            "logging.level",
            config.logging.level.clone(),
            &["COVERMATCH_LOGGING_LEVEL", "COVERMATCH_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["COVERMATCH_LOGGING_FORMAT", "COVERMATCH_LOG_FORMAT"],
        ),
    ];

    let derived = |key: &str, env_keys: &[&str], pinned: bool| {
        if pinned {
            source(key, env_keys)
        } else {
            format!("derived from bedrock.region, {}", source("bedrock.region", REGION_ENV_KEYS))
        }
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.into_iter().map(|(key, value, env_keys)| {
        let origin = match key {
            "bedrock.runtime_endpoint" => {
                derived(key, env_keys, config.bedrock.runtime_endpoint.is_some())
            }
            "bedrock.agent_runtime_endpoint" => {
                derived(key, env_keys, config.bedrock.agent_runtime_endpoint.is_some())
            }
            _ => source(key, env_keys),
        };
        render_line(key, &value, origin)
    }));
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("covermatch.toml"), PathBuf::from("config/covermatch.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys
        .iter()
        .find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()))
    {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps at most a four-character prefix so operators can tell keys apart.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}
