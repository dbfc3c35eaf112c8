use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::catalog::{ApartmentCategory, CareLevel};

use super::metrics::PerformanceMetrics;

/// How soon the client needs a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeline {
    #[serde(rename = "immediate")]
    Immediate,
    #[serde(rename = "near-term")]
    NearTerm,
    #[serde(rename = "flexible")]
    Flexible,
}

impl Timeline {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::NearTerm => "near-term",
            Self::Flexible => "flexible",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "immediate" => Some(Self::Immediate),
            "near-term" | "near term" => Some(Self::NearTerm),
            "flexible" => Some(Self::Flexible),
            _ => None,
        }
    }

    /// Highest availability score a community may carry and still satisfy
    /// this timeline; `None` means unconstrained.
    pub const fn max_availability_score(self) -> Option<u8> {
        match self {
            Self::Immediate => Some(20),
            Self::NearTerm => Some(60),
            Self::Flexible => None,
        }
    }
}

/// Structured client requirements extracted from one consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequirements {
    #[serde(default)]
    pub client_name: Option<String>,
    pub care_level: CareLevel,
    #[serde(default)]
    pub budget_monthly: Option<f64>,
    pub timeline: Timeline,
    #[serde(default)]
    pub location_preference: Option<String>,
    /// Canonical five-digit ZIP after resolving `location_preference`.
    #[serde(default)]
    pub resolved_zip: Option<String>,
    #[serde(default)]
    pub needs_enhanced: bool,
    #[serde(default)]
    pub needs_enriched: bool,
    #[serde(default)]
    pub is_couple: bool,
    #[serde(default)]
    pub has_pet: bool,
    #[serde(default)]
    pub apartment_preference: Option<ApartmentCategory>,
    #[serde(default)]
    pub special_notes: Option<String>,
}

/// One consultation's raw input.
#[derive(Debug, Clone)]
pub enum ConsultationInput {
    Audio { bytes: Vec<u8>, mime: String },
    Text(String),
}

impl ConsultationInput {
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio { .. })
    }
}

/// Consultation lifecycle, traced as the orchestrator advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsultationState {
    Created,
    Extracting,
    Filtering,
    RankingDeterministic,
    Shortlisted,
    RankingAi,
    Aggregating,
    Done,
}

impl ConsultationState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Extracting => "extracting",
            Self::Filtering => "filtering",
            Self::RankingDeterministic => "ranking_det",
            Self::Shortlisted => "shortlisted",
            Self::RankingAi => "ranking_ai",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
        }
    }
}

/// Snapshot of the numbers a consultant quotes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMetrics {
    pub monthly_fee: f64,
    pub distance_miles: Option<f64>,
    pub est_waitlist: String,
}

/// One ranked community, with per-dimension ranks and explanations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub final_rank: usize,
    pub community_id: u32,
    pub combined_rank_score: f64,
    pub key_metrics: KeyMetrics,
    /// Eight dimension keys; `null` where the ranker was not applicable.
    pub rankings: BTreeMap<String, Option<f64>>,
    pub explanations: BTreeMap<String, String>,
}

/// Everything handed back to collaborators (HTTP facade, CRM writer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationResult {
    pub client_info: ClientRequirements,
    #[serde(default = "Utc::now")]
    pub processed_at: DateTime<Utc>,
    pub ranking_weights: BTreeMap<String, f64>,
    pub recommendations: Vec<Recommendation>,
    pub no_matches: bool,
    pub performance_metrics: PerformanceMetrics,
    pub crm_pushed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consultation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_gates_match_contract() {
        assert_eq!(Timeline::Immediate.max_availability_score(), Some(20));
        assert_eq!(Timeline::NearTerm.max_availability_score(), Some(60));
        assert_eq!(Timeline::Flexible.max_availability_score(), None);
    }

    #[test]
    fn timeline_parse_round_trips_labels() {
        for timeline in [Timeline::Immediate, Timeline::NearTerm, Timeline::Flexible] {
            assert_eq!(Timeline::parse(timeline.label()), Some(timeline));
        }
        assert_eq!(Timeline::parse("someday"), None);
    }
}
