//! HTTP clients for the remote services the matcher and search programs call.
//!
//! - `riskwolf` - the parametric insurance REST API (metadata, validation,
//!   index values, coverage build/configure, world events)
//! - `bedrock` - model inference through the Bedrock Converse API
//! - `knowledge_base` - managed retrieval against a Bedrock knowledge base
//!
//! Every call is a single request: no retries, pagination, or response schema
//! checks beyond what is needed to hand the body back to the caller.

pub mod bedrock;
pub mod error;
pub mod knowledge_base;
pub mod riskwolf;

pub use bedrock::{BedrockRuntimeClient, InferenceConfig};
pub use error::ClientError;
pub use knowledge_base::{KnowledgeBaseClient, RetrievalResult};
pub use riskwolf::RiskwolfClient;
/// Shared connection pool handed to every client.
pub use reqwest::Client as HttpClient;

use reqwest::{RequestBuilder, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

pub(crate) fn endpoint_url(
    service: &'static str,
    base: &str,
    segments: &[&str],
) -> Result<Url, ClientError> {
    let mut url =
        Url::parse(base).map_err(|_| ClientError::InvalidUrl { service, url: base.to_string() })?;
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidUrl { service, url: base.to_string() })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub(crate) fn with_bearer(
    service: &'static str,
    request: RequestBuilder,
    api_key: Option<&SecretString>,
) -> Result<RequestBuilder, ClientError> {
    let api_key = api_key.ok_or(ClientError::MissingApiKey { service })?;
    Ok(request.bearer_auth(api_key.expose_secret()))
}

pub(crate) async fn send_json<T: DeserializeOwned>(
    service: &'static str,
    request: RequestBuilder,
) -> Result<T, ClientError> {
    let response =
        request.send().await.map_err(|source| ClientError::Transport { service, source })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status { service, status, body });
    }

    response.json::<T>().await.map_err(|source| ClientError::Decode { service, source })
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    /// Serves `router` on an ephemeral local port and returns its base URL.
    pub async fn serve(router: Router) -> String {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let address = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }
}
