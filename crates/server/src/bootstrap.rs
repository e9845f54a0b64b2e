use std::sync::Arc;

use axum::Router;
use covermatch_agent::SequentialExecutor;
use covermatch_clients::HttpClient;
use covermatch_core::config::AppConfig;
use covermatch_core::{EnvSource, SettingsSource};
use thiserror::Error;
use tracing::info;

use crate::health;
use crate::query::{self, CrewSearchRuntime, QueryState};

pub struct Application {
    pub config: AppConfig,
    pub router: Router,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Search settings are read from the process environment on every request.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let http = HttpClient::builder().build().map_err(BootstrapError::HttpClient)?;
    let runtime = CrewSearchRuntime::new(
        http,
        config.bedrock.clone(),
        config.llm.clone(),
        Arc::new(SequentialExecutor),
    );
    let settings: Arc<dyn SettingsSource> = Arc::new(EnvSource);

    let router = query::router(QueryState::new(settings.clone(), Arc::new(runtime)))
        .merge(health::router(settings));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_timeout_secs = config.llm.timeout_secs,
        "search runtime initialized"
    );
    Ok(Application { config, router })
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use covermatch_core::config::AppConfig;
    use tower::ServiceExt;

    use crate::bootstrap::bootstrap_with_config;

    #[test]
    fn bootstrap_with_defaults_keeps_config() {
        let app = bootstrap_with_config(AppConfig::default()).expect("defaults bootstrap");

        assert_eq!(app.config.server.port, 5000);
        assert_eq!(app.config.server.bind_address, "0.0.0.0");
    }

    #[tokio::test]
    async fn router_serves_query_and_health_routes() {
        let app = bootstrap_with_config(AppConfig::default()).expect("defaults bootstrap");

        let health = app
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).expect("health request"))
            .await
            .expect("health response");
        let query = app
            .router
            .oneshot(
                Request::post("/api/query")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("query request"),
            )
            .await
            .expect("query response");

        assert_ne!(health.status(), StatusCode::NOT_FOUND);
        assert_eq!(query.status(), StatusCode::BAD_REQUEST);
    }
}
