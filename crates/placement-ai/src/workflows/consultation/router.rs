use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::crm::CrmPublisher;
use super::domain::{ConsultationInput, ConsultationResult};
use super::gemini::LlmGateway;
use super::service::{ConsultationError, ConsultationService};

/// Shared state for the consultation endpoints: the pipeline plus the
/// collaborator-supplied CRM writer.
pub struct ConsultationRouterState<L, C> {
    pub service: Arc<ConsultationService<L>>,
    pub crm: Arc<C>,
}

impl<L, C> Clone for ConsultationRouterState<L, C> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            crm: self.crm.clone(),
        }
    }
}

/// Router builder exposing the consultation processing endpoints.
pub fn consultation_router<L, C>(state: ConsultationRouterState<L, C>) -> Router
where
    L: LlmGateway + 'static,
    C: CrmPublisher + 'static,
{
    Router::new()
        .route("/api/process-audio", post(process_audio_handler::<L, C>))
        .route("/api/process-text", post(process_text_handler::<L, C>))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessTextRequest {
    text: String,
    #[serde(default = "default_push_to_crm")]
    push_to_crm: bool,
}

fn default_push_to_crm() -> bool {
    true
}

pub(crate) async fn process_text_handler<L, C>(
    State(state): State<ConsultationRouterState<L, C>>,
    axum::Json(request): axum::Json<ProcessTextRequest>,
) -> Response
where
    L: LlmGateway + 'static,
    C: CrmPublisher + 'static,
{
    if request.text.trim().is_empty() {
        let payload = json!({ "error": "no text provided" });
        return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
    }

    run_consultation(
        &state,
        ConsultationInput::Text(request.text),
        request.push_to_crm,
    )
    .await
}

pub(crate) async fn process_audio_handler<L, C>(
    State(state): State<ConsultationRouterState<L, C>>,
    mut multipart: Multipart,
) -> Response
where
    L: LlmGateway + 'static,
    C: CrmPublisher + 'static,
{
    let mut audio: Option<(Vec<u8>, String)> = None;
    let mut push_to_crm = true;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => {
                let payload = json!({ "error": format!("invalid multipart body: {error}") });
                return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
            }
        };

        match field.name() {
            Some("audio") => {
                let mime = field
                    .content_type()
                    .unwrap_or("audio/mpeg")
                    .to_string();
                match field.bytes().await {
                    Ok(bytes) => audio = Some((bytes.to_vec(), mime)),
                    Err(error) => {
                        let payload =
                            json!({ "error": format!("failed to read audio upload: {error}") });
                        return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
                    }
                }
            }
            Some("push_to_crm") => {
                if let Ok(value) = field.text().await {
                    push_to_crm = value.trim().eq_ignore_ascii_case("true");
                }
            }
            _ => {}
        }
    }

    let Some((bytes, mime)) = audio else {
        let payload = json!({ "error": "no audio file provided" });
        return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
    };
    if bytes.is_empty() {
        let payload = json!({ "error": "audio upload is empty" });
        return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
    }

    run_consultation(&state, ConsultationInput::Audio { bytes, mime }, push_to_crm).await
}

async fn run_consultation<L, C>(
    state: &ConsultationRouterState<L, C>,
    input: ConsultationInput,
    push_to_crm: bool,
) -> Response
where
    L: LlmGateway + 'static,
    C: CrmPublisher + 'static,
{
    match state.service.process(input).await {
        Ok(mut result) => {
            if push_to_crm && !result.no_matches {
                push_result(state.crm.as_ref(), &mut result);
            }
            (StatusCode::OK, axum::Json(result)).into_response()
        }
        Err(ConsultationError::Extraction(error)) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(ConsultationError::LlmUnavailable(reason)) => {
            let payload = json!({
                "error": format!("LLM unavailable, please retry: {reason}"),
            });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
    }
}

fn push_result<C: CrmPublisher>(crm: &C, result: &mut ConsultationResult) {
    match crm.publish(result) {
        Ok(consultation_id) => {
            result.crm_pushed = true;
            result.consultation_id = Some(consultation_id);
        }
        Err(error) => {
            warn!(%error, "CRM push failed, returning result without it");
        }
    }
}
