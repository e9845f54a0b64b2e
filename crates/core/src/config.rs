use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub riskwolf: RiskwolfConfig,
    pub bedrock: BedrockConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct RiskwolfConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct BedrockConfig {
    pub region: String,
    pub api_key: Option<SecretString>,
    pub knowledge_base_id: Option<String>,
    pub runtime_endpoint: Option<String>,
    pub agent_runtime_endpoint: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub riskwolf_base_url: Option<String>,
    pub riskwolf_api_key: Option<String>,
    pub bedrock_region: Option<String>,
    pub bedrock_api_key: Option<String>,
    pub knowledge_base_id: Option<String>,
    pub bedrock_runtime_endpoint: Option<String>,
    pub bedrock_agent_runtime_endpoint: Option<String>,
    pub llm_model: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_RISKWOLF_BASE_URL: &str = "https://api.riskwolf.com/v1";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MODEL: &str = "anthropic.claude-v2";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            riskwolf: RiskwolfConfig {
                base_url: DEFAULT_RISKWOLF_BASE_URL.to_string(),
                api_key: None,
            },
            bedrock: BedrockConfig {
                region: DEFAULT_REGION.to_string(),
                api_key: None,
                knowledge_base_id: None,
                runtime_endpoint: None,
                agent_runtime_endpoint: None,
            },
            llm: LlmConfig {
                model: DEFAULT_MODEL.to_string(),
                temperature: 0.2,
                max_tokens: 4000,
                timeout_secs: 120,
            },
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), port: 5000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl BedrockConfig {
    /// Inference endpoint, `https://bedrock-runtime.{region}.amazonaws.com` unless overridden.
    pub fn runtime_endpoint(&self) -> String {
        self.runtime_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region))
    }

    /// Knowledge-base endpoint, `https://bedrock-agent-runtime.{region}.amazonaws.com` unless overridden.
    pub fn agent_runtime_endpoint(&self) -> String {
        self.agent_runtime_endpoint.clone().unwrap_or_else(|| {
            format!("https://bedrock-agent-runtime.{}.amazonaws.com", self.region)
        })
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(riskwolf) = patch.riskwolf {
            if let Some(base_url) = riskwolf.base_url {
                self.riskwolf.base_url = base_url;
            }
            if let Some(api_key) = riskwolf.api_key {
                self.riskwolf.api_key = Some(secret_value(api_key));
            }
        }

        if let Some(bedrock) = patch.bedrock {
            if let Some(region) = bedrock.region {
                self.bedrock.region = region;
            }
            if let Some(api_key) = bedrock.api_key {
                self.bedrock.api_key = Some(secret_value(api_key));
            }
            if let Some(knowledge_base_id) = bedrock.knowledge_base_id {
                self.bedrock.knowledge_base_id = Some(knowledge_base_id);
            }
            if let Some(runtime_endpoint) = bedrock.runtime_endpoint {
                self.bedrock.runtime_endpoint = Some(runtime_endpoint);
            }
            if let Some(agent_runtime_endpoint) = bedrock.agent_runtime_endpoint {
                self.bedrock.agent_runtime_endpoint = Some(agent_runtime_endpoint);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("COVERMATCH_RISKWOLF_BASE_URL") {
            self.riskwolf.base_url = value;
        }
        if let Some(value) = read_env_any(&["COVERMATCH_RISKWOLF_API_KEY", "RISKWOLF_API_KEY"]) {
            self.riskwolf.api_key = Some(secret_value(value));
        }

        if let Some(value) = read_env_any(&["COVERMATCH_BEDROCK_REGION", "AWS_REGION"]) {
            self.bedrock.region = value;
        }
        if let Some(value) =
            read_env_any(&["COVERMATCH_BEDROCK_API_KEY", "AWS_BEARER_TOKEN_BEDROCK"])
        {
            self.bedrock.api_key = Some(secret_value(value));
        }
        if let Some(value) =
            read_env_any(&["COVERMATCH_BEDROCK_KNOWLEDGE_BASE_ID", "BEDROCK_KB_ID"])
        {
            self.bedrock.knowledge_base_id = Some(value);
        }
        if let Some(value) = read_env("COVERMATCH_BEDROCK_RUNTIME_ENDPOINT") {
            self.bedrock.runtime_endpoint = Some(value);
        }
        if let Some(value) = read_env("COVERMATCH_BEDROCK_AGENT_RUNTIME_ENDPOINT") {
            self.bedrock.agent_runtime_endpoint = Some(value);
        }

        if let Some(value) = read_env_any(&["COVERMATCH_LLM_MODEL", "LLM_ID"]) {
            self.llm.model = value;
        }
        if let Some(value) = read_env("COVERMATCH_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("COVERMATCH_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("COVERMATCH_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("COVERMATCH_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("COVERMATCH_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("COVERMATCH_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COVERMATCH_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("COVERMATCH_SERVER_PORT") {
            self.server.port = parse_u16("COVERMATCH_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env_any(&["COVERMATCH_LOGGING_LEVEL", "COVERMATCH_LOG_LEVEL"]) {
            self.logging.level = value;
        }
        if let Some(value) = read_env_any(&["COVERMATCH_LOGGING_FORMAT", "COVERMATCH_LOG_FORMAT"])
        {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.riskwolf_base_url {
            self.riskwolf.base_url = base_url;
        }
        if let Some(api_key) = overrides.riskwolf_api_key {
            self.riskwolf.api_key = Some(secret_value(api_key));
        }
        if let Some(region) = overrides.bedrock_region {
            self.bedrock.region = region;
        }
        if let Some(api_key) = overrides.bedrock_api_key {
            self.bedrock.api_key = Some(secret_value(api_key));
        }
        if let Some(knowledge_base_id) = overrides.knowledge_base_id {
            self.bedrock.knowledge_base_id = Some(knowledge_base_id);
        }
        if let Some(endpoint) = overrides.bedrock_runtime_endpoint {
            self.bedrock.runtime_endpoint = Some(endpoint);
        }
        if let Some(endpoint) = overrides.bedrock_agent_runtime_endpoint {
            self.bedrock.agent_runtime_endpoint = Some(endpoint);
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_riskwolf(&self.riskwolf)?;
        validate_bedrock(&self.bedrock)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("covermatch.toml"), PathBuf::from("config/covermatch.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_riskwolf(riskwolf: &RiskwolfConfig) -> Result<(), ConfigError> {
    if !is_http_url(riskwolf.base_url.trim()) {
        return Err(ConfigError::Validation(
            "riskwolf.base_url must start with http:// or https://".to_string(),
        ));
    }

    if let Some(api_key) = &riskwolf.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "riskwolf.api_key must not be blank when set (unset it instead)".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_bedrock(bedrock: &BedrockConfig) -> Result<(), ConfigError> {
    if bedrock.region.trim().is_empty() {
        return Err(ConfigError::Validation("bedrock.region must not be empty".to_string()));
    }

    for (key, endpoint) in [
        ("bedrock.runtime_endpoint", &bedrock.runtime_endpoint),
        ("bedrock.agent_runtime_endpoint", &bedrock.agent_runtime_endpoint),
    ] {
        if let Some(endpoint) = endpoint {
            if !is_http_url(endpoint.trim()) {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if !(0.0..=1.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=1.0".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation(
            "server.bind_address must not be empty".to_string(),
        ));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

pub(crate) fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// First non-blank value among `keys`, in order.
fn read_env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| read_env(key))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    riskwolf: Option<RiskwolfPatch>,
    bedrock: Option<BedrockPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RiskwolfPatch {
    base_url: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BedrockPatch {
    region: Option<String>,
    api_key: Option<String>,
    knowledge_base_id: Option<String>,
    runtime_endpoint: Option<String>,
    agent_runtime_endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
