use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use covermatch_agent::{
    search::run_search, BedrockLlm, CrewExecutor, KnowledgeBaseTool, LlmClient, Retriever,
};
use covermatch_clients::{BedrockRuntimeClient, HttpClient, InferenceConfig, KnowledgeBaseClient};
use covermatch_core::{
    config::{BedrockConfig, LlmConfig},
    ApplicationError, InterfaceError, SearchSettings, SettingsSource,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

const MISSING_QUERY: &str = "Missing 'query' in request body";
const EMPTY_QUERY: &str = "Query must be a non-empty string";

/// Runs one knowledge search with settings resolved for the current request.
#[async_trait]
pub trait SearchRuntime: Send + Sync {
    async fn search(&self, settings: &SearchSettings, query: &str) -> Result<String>;
}

/// Builds a fresh agent, tool and task per request and runs them through `executor`.
pub struct CrewSearchRuntime {
    http: HttpClient,
    bedrock: BedrockConfig,
    llm: LlmConfig,
    executor: Arc<dyn CrewExecutor>,
}

impl CrewSearchRuntime {
    pub fn new(
        http: HttpClient,
        bedrock: BedrockConfig,
        llm: LlmConfig,
        executor: Arc<dyn CrewExecutor>,
    ) -> Self {
        Self { http, bedrock, llm, executor }
    }

    /// Endpoints follow the request's region unless explicitly overridden in config.
    fn regional(&self, settings: &SearchSettings) -> BedrockConfig {
        BedrockConfig { region: settings.region.clone(), ..self.bedrock.clone() }
    }
}

#[async_trait]
impl SearchRuntime for CrewSearchRuntime {
    async fn search(&self, settings: &SearchSettings, query: &str) -> Result<String> {
        let bedrock = self.regional(settings);

        let retriever: Arc<dyn Retriever> = Arc::new(KnowledgeBaseClient::from_config(
            self.http.clone(),
            &bedrock,
            settings.knowledge_base_id.clone(),
        ));
        let llm: Arc<dyn LlmClient> = Arc::new(BedrockLlm::new(
            BedrockRuntimeClient::from_config(self.http.clone(), &bedrock, &self.llm),
            settings.model_id.clone(),
            InferenceConfig::from(&self.llm),
        ));

        run_search(self.executor.as_ref(), query, KnowledgeBaseTool::new(retriever), llm).await
    }
}

#[derive(Clone)]
pub struct QueryState {
    settings: Arc<dyn SettingsSource>,
    runtime: Arc<dyn SearchRuntime>,
}

impl QueryState {
    pub fn new(settings: Arc<dyn SettingsSource>, runtime: Arc<dyn SearchRuntime>) -> Self {
        Self { settings, runtime }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub result: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryError {
    pub error: String,
}

pub fn router(state: QueryState) -> Router {
    Router::new().route("/api/query", post(query)).with_state(state)
}

pub async fn query(
    State(state): State<QueryState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<QueryResponse>, (StatusCode, Json<QueryError>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let body = body.ok().map(|Json(body)| body);

    match handle(&state, body, &correlation_id).await {
        Ok(response) => Ok(Json(response)),
        Err(app_error) => {
            let interface = app_error.into_interface(correlation_id);
            Err(error_response(&interface))
        }
    }
}

async fn handle(
    state: &QueryState,
    body: Option<Value>,
    correlation_id: &str,
) -> Result<QueryResponse, ApplicationError> {
    let query = extract_query(body)?;
    info!(
        event_name = "search.query.received",
        correlation_id,
        query = %query,
        "received query"
    );

    let settings = SearchSettings::resolve(state.settings.as_ref())?;
    let result = state
        .runtime
        .search(&settings, &query)
        .await
        .map_err(|error| ApplicationError::Orchestration(format!("{error:#}")))?;

    info!(
        event_name = "search.query.completed",
        correlation_id,
        knowledge_base_id = %settings.knowledge_base_id,
        result_chars = result.len(),
        "query answered"
    );
    Ok(QueryResponse { query, result })
}

fn extract_query(body: Option<Value>) -> Result<String, ApplicationError> {
    let query = match body {
        Some(Value::Object(mut fields)) => fields.remove("query"),
        _ => None,
    }
    .ok_or_else(|| ApplicationError::InvalidRequest(MISSING_QUERY.to_string()))?;

    match query {
        Value::String(query) if !query.trim().is_empty() => Ok(query),
        _ => Err(ApplicationError::InvalidRequest(EMPTY_QUERY.to_string())),
    }
}

fn error_response(interface: &InterfaceError) -> (StatusCode, Json<QueryError>) {
    let status = if interface.is_client_error() {
        warn!(
            event_name = "search.query.rejected",
            correlation_id = interface.correlation_id(),
            error = interface.message(),
            "query rejected"
        );
        StatusCode::BAD_REQUEST
    } else {
        error!(
            event_name = "search.query.failed",
            correlation_id = interface.correlation_id(),
            error = interface.message(),
            "failed to process query"
        );
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(QueryError { error: interface.message().to_string() }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use covermatch_core::config::AppConfig;
    use covermatch_core::settings::{AWS_REGION, KNOWLEDGE_BASE_ID, LLM_ID};
    use covermatch_core::SearchSettings;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{query, router, CrewSearchRuntime, QueryState, SearchRuntime};

    #[derive(Default)]
    struct StubRuntime {
        fail: bool,
        seen: Mutex<Vec<(SearchSettings, String)>>,
    }

    #[async_trait]
    impl SearchRuntime for StubRuntime {
        async fn search(&self, settings: &SearchSettings, query: &str) -> Result<String> {
            self.seen.lock().expect("seen lock").push((settings.clone(), query.to_string()));
            if self.fail {
                return Err(anyhow!("model access denied"));
            }
            Ok(format!("answer for {query}"))
        }
    }

    fn settings(pairs: &[(&str, &str)]) -> Arc<HashMap<String, String>> {
        Arc::new(pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect())
    }

    fn all_settings() -> Arc<HashMap<String, String>> {
        settings(&[
            (KNOWLEDGE_BASE_ID, "KB123"),
            (AWS_REGION, "us-west-2"),
            (LLM_ID, "anthropic.claude-3-haiku"),
        ])
    }

    fn state(settings: Arc<HashMap<String, String>>, runtime: Arc<StubRuntime>) -> QueryState {
        QueryState::new(settings, runtime)
    }

    #[tokio::test]
    async fn well_formed_query_returns_result_and_unchanged_query() {
        let runtime = Arc::new(StubRuntime::default());

        let Json(response) = query(
            State(state(all_settings(), runtime.clone())),
            Ok(Json(json!({ "query": "  What is covered?  " }))),
        )
        .await
        .expect("query should succeed");

        assert_eq!(response.query, "  What is covered?  ");
        assert_eq!(response.result, "answer for   What is covered?  ");
        let seen = runtime.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.knowledge_base_id, "KB123");
        assert_eq!(seen[0].0.region, "us-west-2");
        assert_eq!(seen[0].0.model_id, "anthropic.claude-3-haiku");
    }

    #[tokio::test]
    async fn missing_or_blank_query_is_rejected_before_running() {
        let runtime = Arc::new(StubRuntime::default());
        let cases = [
            (json!({}), "Missing 'query' in request body"),
            (json!(["query"]), "Missing 'query' in request body"),
            (json!({ "query": "" }), "Query must be a non-empty string"),
            (json!({ "query": "   " }), "Query must be a non-empty string"),
            (json!({ "query": 12 }), "Query must be a non-empty string"),
        ];

        for (body, message) in cases {
            let (status, Json(error)) =
                query(State(state(all_settings(), runtime.clone())), Ok(Json(body)))
                    .await
                    .expect_err("invalid body");
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(error.error, message);
        }
        assert!(runtime.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_settings_are_listed_in_fixed_order() {
        let runtime = Arc::new(StubRuntime::default());

        let (status, Json(error)) = query(
            State(state(settings(&[(AWS_REGION, "us-east-1")]), runtime.clone())),
            Ok(Json(json!({ "query": "hail" }))),
        )
        .await
        .expect_err("settings missing");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.error, "Missing environment variables: KNOWLEDGE_BASE_ID, LLM_ID");
        assert!(runtime.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn runtime_failure_maps_to_internal_error() {
        let runtime = Arc::new(StubRuntime { fail: true, ..Default::default() });

        let (status, Json(error)) =
            query(State(state(all_settings(), runtime)), Ok(Json(json!({ "query": "hail" }))))
                .await
                .expect_err("runtime failed");

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.error, "Error: model access denied");
    }

    #[tokio::test]
    async fn non_json_body_is_a_bad_request_through_the_router() {
        let app = router(state(all_settings(), Arc::new(StubRuntime::default())));

        let response = app
            .oneshot(
                Request::post("/api/query")
                    .header("content-type", "text/plain")
                    .body(Body::from("query=hail"))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body, json!({ "error": "Missing 'query' in request body" }));
    }

    #[test]
    fn regional_config_follows_request_region_unless_overridden() {
        let mut config = AppConfig::default();
        let runtime = |bedrock| {
            CrewSearchRuntime::new(
                reqwest::Client::new(),
                bedrock,
                AppConfig::default().llm,
                Arc::new(covermatch_agent::SequentialExecutor),
            )
        };
        let settings = SearchSettings {
            knowledge_base_id: "KB".to_string(),
            region: "eu-central-1".to_string(),
            model_id: "m".to_string(),
        };

        let derived = runtime(config.bedrock.clone()).regional(&settings);
        assert_eq!(derived.runtime_endpoint(), "https://bedrock-runtime.eu-central-1.amazonaws.com");
        assert_eq!(
            derived.agent_runtime_endpoint(),
            "https://bedrock-agent-runtime.eu-central-1.amazonaws.com"
        );

        config.bedrock.agent_runtime_endpoint = Some("http://localhost:4566".to_string());
        let pinned = runtime(config.bedrock).regional(&settings);
        assert_eq!(pinned.agent_runtime_endpoint(), "http://localhost:4566");
    }

    async fn serve(router: axum::Router) -> String {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let address = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    /// Fake Bedrock: the model asks for one knowledge-base search, then answers with
    /// its model id and the observation it was given.
    async fn fake_bedrock() -> String {
        use axum::{extract::Path, routing::post};

        let router = axum::Router::new()
            .route(
                "/model/{model_id}/converse",
                post(|Path(model_id): Path<String>, Json(body): Json<Value>| async move {
                    let prompt =
                        body["messages"][0]["content"][0]["text"].as_str().unwrap_or_default();
                    let reply = match prompt.rsplit_once("Observation:") {
                        Some((_, observation)) => {
                            format!("Final Answer: [{model_id}] {}", observation.trim())
                        }
                        None => "Action: Bedrock Knowledge Base Search\n\
                                 Action Input: {\"query\": \"hail cover\"}"
                            .to_string(),
                    };
                    Json(json!({
                        "output": { "message": { "role": "assistant", "content": [{ "text": reply }] } },
                        "stopReason": "end_turn"
                    }))
                }),
            )
            .route(
                "/knowledgebases/{kb_id}/retrieve",
                post(|Path(kb_id): Path<String>, Json(body): Json<Value>| async move {
                    assert_eq!(body["retrievalQuery"]["text"], "hail cover");
                    Json(json!({
                        "retrievalResults": [
                            { "content": { "text": format!("passage from {kb_id}") }, "score": 0.8 }
                        ]
                    }))
                }),
            );
        serve(router).await
    }

    #[tokio::test]
    async fn crew_runtime_routes_request_settings_to_bedrock() {
        let endpoint = fake_bedrock().await;
        let mut config = AppConfig::default();
        config.bedrock.api_key = Some("bedrock-key".to_string().into());
        config.bedrock.runtime_endpoint = Some(endpoint.clone());
        config.bedrock.agent_runtime_endpoint = Some(endpoint);
        let runtime = CrewSearchRuntime::new(
            reqwest::Client::new(),
            config.bedrock,
            config.llm,
            Arc::new(covermatch_agent::SequentialExecutor),
        );
        let settings = SearchSettings {
            knowledge_base_id: "KB9".to_string(),
            region: "ap-southeast-2".to_string(),
            model_id: "my-model".to_string(),
        };

        let answer = runtime.search(&settings, "hail cover").await.expect("search runs");

        assert_eq!(answer, "[my-model] passage from KB9");
    }
}
