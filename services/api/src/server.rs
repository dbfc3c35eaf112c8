use crate::cli::ServeArgs;
use crate::infra::{build_pipeline, AppState, InMemoryCrmPublisher};
use crate::routes::app_router;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

use placement_ai::config::AppConfig;
use placement_ai::error::AppError;
use placement_ai::telemetry;
use placement_ai::workflows::consultation::ConsultationRouterState;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let handles = build_pipeline(&config)?;
    info!(
        loaded = handles.load_summary.loaded,
        skipped = handles.load_summary.skipped,
        catalog = %config.data.catalog_path.display(),
        "community catalog ready"
    );

    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        llm_configured: handles.llm_configured,
    };

    let consultation_state = ConsultationRouterState {
        service: handles.service,
        crm: Arc::new(InMemoryCrmPublisher::default()),
    };

    let app = app_router(consultation_state, handles.catalog)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "placement consultation service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
