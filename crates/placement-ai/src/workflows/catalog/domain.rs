use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Acuity tier of senior-living service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CareLevel {
    #[serde(rename = "Independent Living")]
    IndependentLiving,
    #[serde(rename = "Assisted Living")]
    AssistedLiving,
    #[serde(rename = "Memory Care")]
    MemoryCare,
}

impl CareLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::IndependentLiving => "Independent Living",
            Self::AssistedLiving => "Assisted Living",
            Self::MemoryCare => "Memory Care",
        }
    }

    /// Lenient parse for spreadsheet cells and LLM output.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized.contains("independent") {
            Some(Self::IndependentLiving)
        } else if normalized.contains("assisted") {
            Some(Self::AssistedLiving)
        } else if normalized.contains("memory") {
            Some(Self::MemoryCare)
        } else {
            None
        }
    }
}

/// Normalized apartment tag derived from the free-text unit description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApartmentCategory {
    #[serde(rename = "studio")]
    Studio,
    #[serde(rename = "1BR")]
    OneBedroom,
    #[serde(rename = "2BR")]
    TwoBedroom,
    #[serde(rename = "double-occupancy")]
    DoubleOccupancy,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ApartmentCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Studio => "studio",
            Self::OneBedroom => "1BR",
            Self::TwoBedroom => "2BR",
            Self::DoubleOccupancy => "double-occupancy",
            Self::Unknown => "unknown",
        }
    }
}

/// One-time move-in charges. `second_person_fee` stays optional: many
/// communities simply do not publish one, which the couple ranker treats
/// as worst-case.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpfrontCosts {
    #[serde(default)]
    pub deposit: f64,
    #[serde(default)]
    pub move_in_fee: f64,
    #[serde(default)]
    pub community_fee: f64,
    #[serde(default)]
    pub pet_fee: f64,
    #[serde(default)]
    pub second_person_fee: Option<f64>,
}

impl UpfrontCosts {
    /// Sum of the one-time charges relevant to this client.
    pub fn move_in_total(&self, has_pet: bool) -> f64 {
        let pet = if has_pet { self.pet_fee } else { 0.0 };
        self.deposit + self.move_in_fee + self.community_fee + pet
    }
}

/// One row of the community catalog, with derived fields computed at load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub community_id: u32,
    pub care_level: CareLevel,
    pub monthly_fee: f64,
    pub upfront: UpfrontCosts,
    pub zip_code: Option<String>,
    pub apartment_type: Option<String>,
    pub apartment_category: ApartmentCategory,
    pub waitlist_status: String,
    pub availability_score: u8,
    pub works_with_placement: bool,
    pub contract_rate: f64,
    pub willingness_score: u8,
    pub enhanced: bool,
    pub enriched: bool,
    #[serde(default)]
    pub amenity_notes: Option<String>,
    /// Optional catalog columns preserved verbatim; unused by ranking.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Mutable subset accepted by the catalog CRUD surface. Derived fields
/// are recomputed by the store, never supplied by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityDraft {
    pub care_level: CareLevel,
    pub monthly_fee: f64,
    #[serde(default)]
    pub upfront: UpfrontCosts,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub apartment_type: Option<String>,
    #[serde(default)]
    pub waitlist_status: String,
    #[serde(default)]
    pub works_with_placement: bool,
    #[serde(default)]
    pub contract_rate: f64,
    #[serde(default)]
    pub enhanced: bool,
    #[serde(default)]
    pub enriched: bool,
    #[serde(default)]
    pub amenity_notes: Option<String>,
}

/// Aggregate view reported by `CatalogStore::stats` and `/api/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub total_communities: usize,
    pub care_levels: BTreeMap<String, usize>,
    pub avg_monthly_fee: f64,
    pub enhanced_available: usize,
    pub working_with_placement: usize,
}

/// Startup bookkeeping: malformed rows are skipped, not fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
}
