use std::time::Duration;

use covermatch_core::config::{BedrockConfig, LlmConfig};
use reqwest::Client;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{endpoint_url, send_json, with_bearer, ClientError};

const SERVICE: &str = "bedrock-runtime";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferenceConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&LlmConfig> for InferenceConfig {
    fn from(config: &LlmConfig) -> Self {
        Self { temperature: config.temperature, max_tokens: config.max_tokens }
    }
}

/// Single-turn text inference through the Bedrock Converse API.
#[derive(Clone, Debug)]
pub struct BedrockRuntimeClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl BedrockRuntimeClient {
    pub fn new(
        http: Client,
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Self {
        Self { http, endpoint: endpoint.into(), api_key, timeout }
    }

    pub fn from_config(http: Client, bedrock: &BedrockConfig, llm: &LlmConfig) -> Self {
        Self::new(
            http,
            bedrock.runtime_endpoint(),
            bedrock.api_key.clone(),
            Duration::from_secs(llm.timeout_secs),
        )
    }

    pub async fn converse(
        &self,
        model_id: &str,
        system: &str,
        prompt: &str,
        inference: InferenceConfig,
    ) -> Result<String, ClientError> {
        let url = endpoint_url(SERVICE, &self.endpoint, &["model", model_id, "converse"])?;
        let body = ConverseRequest {
            system: (!system.is_empty())
                .then(|| vec![TextBlock { text: system.to_string() }])
                .unwrap_or_default(),
            messages: vec![Message {
                role: "user",
                content: vec![TextBlock { text: prompt.to_string() }],
            }],
            inference_config: InferenceConfigBody {
                temperature: inference.temperature,
                max_tokens: inference.max_tokens,
            },
        };

        debug!(event_name = "bedrock.converse.request", model_id, "invoking model");

        let request = with_bearer(SERVICE, self.http.post(url), self.api_key.as_ref())?
            .timeout(self.timeout)
            .json(&body);
        let response: ConverseResponse = send_json(SERVICE, request).await?;

        let text = response
            .output
            .message
            .map(|message| {
                message.content.into_iter().filter_map(|block| block.text).collect::<String>()
            })
            .filter(|text| !text.is_empty())
            .ok_or(ClientError::UnexpectedResponse {
                service: SERVICE,
                what: "an assistant text message",
            })?;

        debug!(
            event_name = "bedrock.converse.response",
            model_id,
            stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
            "model responded"
        );
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConverseRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<TextBlock>,
    messages: Vec<Message>,
    inference_config: InferenceConfigBody,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<TextBlock>,
}

#[derive(Debug, Serialize)]
struct TextBlock {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceConfigBody {
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseResponse {
    output: ConverseOutput,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    #[serde(default)]
    message: Option<OutputMessage>,
}

#[derive(Debug, Deserialize)]
struct OutputMessage {
    #[serde(default)]
    content: Vec<OutputBlock>,
}

#[derive(Debug, Deserialize)]
struct OutputBlock {
    #[serde(default)]
    text: Option<String>,
}
