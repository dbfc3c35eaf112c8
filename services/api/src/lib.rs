mod cli;
mod infra;
mod routes;
mod server;

use placement_ai::error::AppError;
use placement_ai::workflows::consultation::ConsultationError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}

/// Contract exit codes for CLI collaborators: 1 extraction failure,
/// 2 LLM unavailable, 3 input not found/unreadable.
pub fn exit_code(error: &AppError) -> i32 {
    match error {
        AppError::Consultation(ConsultationError::Extraction(_)) => 1,
        AppError::Consultation(ConsultationError::LlmUnavailable(_)) => 2,
        AppError::Io(_) => 3,
        _ => 1,
    }
}
