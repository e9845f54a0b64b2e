use anyhow::Result;
use async_trait::async_trait;
use covermatch_clients::{BedrockRuntimeClient, InferenceConfig};
use covermatch_core::config::LlmConfig;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// A Bedrock-hosted model bound to one model id and sampling configuration.
#[derive(Clone, Debug)]
pub struct BedrockLlm {
    client: BedrockRuntimeClient,
    model_id: String,
    inference: InferenceConfig,
}

impl BedrockLlm {
    pub fn new(
        client: BedrockRuntimeClient,
        model_id: impl Into<String>,
        inference: InferenceConfig,
    ) -> Self {
        Self { client, model_id: model_id.into(), inference }
    }

    pub fn from_config(client: BedrockRuntimeClient, llm: &LlmConfig) -> Self {
        Self::new(client, llm.model.clone(), InferenceConfig::from(llm))
    }
}

#[async_trait]
impl LlmClient for BedrockLlm {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        Ok(self.client.converse(&self.model_id, system, prompt, self.inference).await?)
    }
}
