use covermatch_core::config::BedrockConfig;
use reqwest::Client;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{endpoint_url, send_json, with_bearer, ClientError};

const SERVICE: &str = "bedrock-knowledge-base";

/// One ranked passage returned by the knowledge base.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub content: String,
    pub score: f64,
}

#[derive(Clone, Debug)]
pub struct KnowledgeBaseClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    knowledge_base_id: String,
}

impl KnowledgeBaseClient {
    pub fn new(
        http: Client,
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        knowledge_base_id: impl Into<String>,
    ) -> Self {
        Self { http, endpoint: endpoint.into(), api_key, knowledge_base_id: knowledge_base_id.into() }
    }

    pub fn from_config(
        http: Client,
        bedrock: &BedrockConfig,
        knowledge_base_id: impl Into<String>,
    ) -> Self {
        Self::new(http, bedrock.agent_runtime_endpoint(), bedrock.api_key.clone(), knowledge_base_id)
    }

    /// Vector search for `query`, returning at most `top_k` passages in ranked order.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: u32,
    ) -> Result<Vec<RetrievalResult>, ClientError> {
        let url = endpoint_url(
            SERVICE,
            &self.endpoint,
            &["knowledgebases", self.knowledge_base_id.as_str(), "retrieve"],
        )?;
        let body = json!({
            "retrievalQuery": { "text": query },
            "retrievalConfiguration": {
                "vectorSearchConfiguration": { "numberOfResults": top_k }
            }
        });

        let request =
            with_bearer(SERVICE, self.http.post(url), self.api_key.as_ref())?.json(&body);
        let response: RetrieveResponse = send_json(SERVICE, request).await?;

        debug!(
            event_name = "knowledge_base.retrieve",
            knowledge_base_id = %self.knowledge_base_id,
            result_count = response.retrieval_results.len(),
            "knowledge base retrieval completed"
        );

        Ok(response
            .retrieval_results
            .into_iter()
            .map(|result| RetrievalResult {
                content: result.content.map(|content| content.text).unwrap_or_default(),
                score: result.score,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    content: Option<RawContent>,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(default)]
    text: String,
}
