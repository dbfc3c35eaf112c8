pub mod crm;
pub mod domain;
pub mod extraction;
pub mod filters;
pub mod gemini;
pub mod location;
pub mod metrics;
pub mod ranking;
mod router;
mod service;

pub use domain::{
    ClientRequirements, ConsultationInput, ConsultationResult, ConsultationState, KeyMetrics,
    Recommendation, Timeline,
};
pub use router::{consultation_router, ConsultationRouterState};
pub use service::{ConsultationError, ConsultationService, PipelineConfig};
