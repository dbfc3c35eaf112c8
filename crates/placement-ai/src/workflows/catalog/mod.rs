mod domain;
mod normalizer;
mod parser;
mod router;
mod store;

pub use domain::{
    ApartmentCategory, CareLevel, CatalogStats, Community, CommunityDraft, LoadSummary,
    UpfrontCosts,
};
pub use normalizer::{apartment_category_for, availability_score_for, willingness_score_for};
pub use router::catalog_router;
pub use store::{CatalogError, CatalogSnapshot, CatalogStore};
