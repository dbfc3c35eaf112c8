use super::domain::ConsultationResult;

/// Trait describing the outbound CRM writer (e.g. a spreadsheet
/// adapter). The core never talks to a CRM directly; collaborators
/// provide an implementation and receive the consultation id back.
pub trait CrmPublisher: Send + Sync {
    fn publish(&self, result: &ConsultationResult) -> Result<String, CrmError>;
}

/// CRM dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("crm transport unavailable: {0}")]
    Transport(String),
    #[error("crm rejected the consultation: {0}")]
    Rejected(String),
}
