use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use placement_ai::workflows::catalog::{catalog_router, CatalogStore};
use placement_ai::workflows::consultation::crm::CrmPublisher;
use placement_ai::workflows::consultation::gemini::LlmGateway;
use placement_ai::workflows::consultation::{consultation_router, ConsultationRouterState};

/// Compose the consultation and catalog routers with the service's own
/// operational endpoints.
pub(crate) fn app_router<L, C>(
    consultation: ConsultationRouterState<L, C>,
    catalog: Arc<CatalogStore>,
) -> axum::Router
where
    L: LlmGateway + 'static,
    C: CrmPublisher + 'static,
{
    consultation_router(consultation)
        .merge(catalog_router(catalog))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route("/api/health", axum::routing::get(api_health_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Liveness plus LLM key presence, for the browser UI's banner.
pub(crate) async fn api_health_endpoint(
    Extension(state): Extension<AppState>,
) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "llm_configured": state.llm_configured,
    }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;

    fn state(llm_configured: bool, ready: bool) -> AppState {
        let handle = PrometheusBuilder::new()
            .build_recorder()
            .handle();
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(handle),
            llm_configured,
        }
    }

    #[tokio::test]
    async fn api_health_reports_llm_key_presence() {
        let Json(body) = api_health_endpoint(Extension(state(true, true))).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["llm_configured"], true);

        let Json(body) = api_health_endpoint(Extension(state(false, true))).await;
        assert_eq!(body["llm_configured"], false);
    }

    #[tokio::test]
    async fn readiness_tracks_the_flag() {
        let response = readiness_endpoint(Extension(state(true, false)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = readiness_endpoint(Extension(state(true, true)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
