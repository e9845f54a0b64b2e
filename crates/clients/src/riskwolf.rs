use covermatch_core::config::RiskwolfConfig;
use reqwest::Client;
use secrecy::SecretString;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{endpoint_url, send_json, with_bearer, ClientError};

const SERVICE: &str = "riskwolf";

/// Bearer-authenticated passthrough to the Riskwolf REST API.
///
/// Each method issues exactly one request and returns the JSON body as received.
#[derive(Clone, Debug)]
pub struct RiskwolfClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl RiskwolfClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self { http, base_url: base_url.into(), api_key }
    }

    pub fn from_config(http: Client, config: &RiskwolfConfig) -> Self {
        Self::new(http, config.base_url.clone(), config.api_key.clone())
    }

    /// `GET /metadata?query=…`
    pub async fn metadata(&self, query: &str) -> Result<Value, ClientError> {
        self.get(&["metadata"], &[("query".to_string(), query.to_string())]).await
    }

    /// `POST /validate` with the coverage configuration as body.
    pub async fn validate(&self, config: &Value) -> Result<Value, ClientError> {
        self.post(&["validate"], config).await
    }

    /// `GET /indices/{index_id}/values` with `params` as query arguments.
    pub async fn index_values(
        &self,
        index_id: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ClientError> {
        self.get(&["indices", index_id, "values"], &query_pairs(params)).await
    }

    /// `POST /coverage/build`
    pub async fn build_coverage(&self, params: &Value) -> Result<Value, ClientError> {
        self.post(&["coverage", "build"], params).await
    }

    /// `POST /coverage/configure`
    pub async fn configure_coverage(&self, config: &Value) -> Result<Value, ClientError> {
        self.post(&["coverage", "configure"], config).await
    }

    /// `GET /events?query=…` against the world event / coverage database.
    pub async fn world_events(&self, query: &str) -> Result<Value, ClientError> {
        self.get(&["events"], &[("query".to_string(), query.to_string())]).await
    }

    async fn get(&self, path: &[&str], query: &[(String, String)]) -> Result<Value, ClientError> {
        let url = endpoint_url(SERVICE, &self.base_url, path)?;
        debug!(
            event_name = "riskwolf.request",
            method = "GET",
            path = url.path(),
            "calling riskwolf api"
        );

        let request = with_bearer(SERVICE, self.http.get(url), self.api_key.as_ref())?.query(query);
        send_json(SERVICE, request).await
    }

    async fn post(&self, path: &[&str], body: &Value) -> Result<Value, ClientError> {
        let url = endpoint_url(SERVICE, &self.base_url, path)?;
        debug!(
            event_name = "riskwolf.request",
            method = "POST",
            path = url.path(),
            "calling riskwolf api"
        );

        let request = with_bearer(SERVICE, self.http.post(url), self.api_key.as_ref())?.json(body);
        send_json(SERVICE, request).await
    }
}

/// Flattens a JSON object into query pairs; arrays repeat their key.
fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                pairs.extend(items.iter().map(|item| (key.clone(), scalar_text(item))));
            }
            other => pairs.push((key.clone(), scalar_text(other))),
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
