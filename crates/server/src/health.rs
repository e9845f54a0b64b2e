use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use covermatch_core::{SearchSettings, SettingsSource};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    settings: Arc<dyn SettingsSource>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub search_settings: HealthCheck,
    pub checked_at: String,
}

pub fn router(settings: Arc<dyn SettingsSource>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { settings })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let search_settings = settings_check(state.settings.as_ref());
    let ready = search_settings.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "covermatch-server runtime initialized".to_string(),
        },
        search_settings,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn settings_check(source: &dyn SettingsSource) -> HealthCheck {
    match SearchSettings::resolve(source) {
        Ok(settings) => HealthCheck {
            status: "ready",
            detail: format!(
                "knowledge base {} in {} with model {}",
                settings.knowledge_base_id, settings.region, settings.model_id
            ),
        },
        Err(missing) => HealthCheck { status: "degraded", detail: missing.to_string() },
    }
}
