use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use super::domain::{CatalogStats, Community, CommunityDraft, LoadSummary, UpfrontCosts};
use super::normalizer::{apartment_category_for, availability_score_for, willingness_score_for};
use super::parser;

/// Error enumeration for catalog failures.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog data: {0}")]
    Csv(#[from] csv::Error),
    #[error("community {0} not found")]
    NotFound(u32),
    #[error("community {0} already exists")]
    Duplicate(u32),
    #[error("invalid community fields: {0}")]
    InvalidFields(String),
}

/// Immutable, consistently ordered view of the catalog. Consultations hold
/// one snapshot for their whole lifetime; writers publish a replacement.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    communities: Vec<Community>,
}

impl CatalogSnapshot {
    fn new(mut communities: Vec<Community>) -> Self {
        communities.sort_by_key(|community| community.community_id);
        Self { communities }
    }

    pub fn communities(&self) -> &[Community] {
        &self.communities
    }

    pub fn get(&self, community_id: u32) -> Option<&Community> {
        self.communities
            .binary_search_by_key(&community_id, |community| community.community_id)
            .ok()
            .map(|index| &self.communities[index])
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<Community>
    where
        P: Fn(&Community) -> bool,
    {
        self.communities
            .iter()
            .filter(|community| predicate(community))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.communities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.communities.is_empty()
    }
}

/// In-memory catalog with copy-on-write snapshots. Mutations take the
/// writer lock, re-normalize only the touched row, and publish a new
/// snapshot for subsequent consultations.
pub struct CatalogStore {
    inner: RwLock<Arc<CatalogSnapshot>>,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Arc::new(CatalogSnapshot::default())),
        }
    }
}

impl CatalogStore {
    pub fn from_communities(communities: Vec<Community>) -> Self {
        Self {
            inner: RwLock::new(Arc::new(CatalogSnapshot::new(communities))),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<(Self, LoadSummary), CatalogError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<(Self, LoadSummary), CatalogError> {
        let (mut communities, errors) = parser::parse_communities(reader)?;

        for error in &errors {
            warn!(line = error.line, reason = %error.message, "skipping malformed catalog row");
        }

        let parsed = communities.len();
        let mut seen = BTreeMap::new();
        communities.retain(|community| {
            if seen.insert(community.community_id, ()).is_some() {
                warn!(
                    community_id = community.community_id,
                    "skipping duplicate community id"
                );
                false
            } else {
                true
            }
        });

        let skipped = errors.len() + (parsed - communities.len());
        let summary = LoadSummary {
            loaded: communities.len(),
            skipped,
        };
        info!(
            loaded = summary.loaded,
            skipped = summary.skipped,
            "catalog loaded"
        );

        Ok((Self::from_communities(communities), summary))
    }

    /// Current immutable view; cheap to clone and hold across await points.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.inner.read().expect("catalog lock poisoned").clone()
    }

    /// Add a community, assigning the next free identifier.
    pub fn insert(&self, draft: CommunityDraft) -> Result<u32, CatalogError> {
        validate_draft(&draft)?;
        let mut guard = self.inner.write().expect("catalog lock poisoned");
        let next_id = guard
            .communities
            .iter()
            .map(|community| community.community_id)
            .max()
            .map_or(1, |max| max + 1);

        let mut communities = guard.communities.clone();
        communities.push(materialize(next_id, draft));
        *guard = Arc::new(CatalogSnapshot::new(communities));
        Ok(next_id)
    }

    /// Replace an existing row, re-running normalization for it only.
    pub fn update(&self, community_id: u32, draft: CommunityDraft) -> Result<(), CatalogError> {
        validate_draft(&draft)?;
        let mut guard = self.inner.write().expect("catalog lock poisoned");
        let mut communities = guard.communities.clone();
        let slot = communities
            .iter_mut()
            .find(|community| community.community_id == community_id)
            .ok_or(CatalogError::NotFound(community_id))?;

        let extra = std::mem::take(&mut slot.extra);
        let mut replacement = materialize(community_id, draft);
        replacement.extra = extra;
        *slot = replacement;

        *guard = Arc::new(CatalogSnapshot::new(communities));
        Ok(())
    }

    pub fn delete(&self, community_id: u32) -> Result<(), CatalogError> {
        let mut guard = self.inner.write().expect("catalog lock poisoned");
        let mut communities = guard.communities.clone();
        let before = communities.len();
        communities.retain(|community| community.community_id != community_id);
        if communities.len() == before {
            return Err(CatalogError::NotFound(community_id));
        }
        *guard = Arc::new(CatalogSnapshot::new(communities));
        Ok(())
    }

    pub fn stats(&self) -> CatalogStats {
        let snapshot = self.snapshot();
        let communities = snapshot.communities();

        let mut care_levels = BTreeMap::new();
        for community in communities {
            *care_levels
                .entry(community.care_level.label().to_string())
                .or_insert(0) += 1;
        }

        let avg_monthly_fee = if communities.is_empty() {
            0.0
        } else {
            communities
                .iter()
                .map(|community| community.monthly_fee)
                .sum::<f64>()
                / communities.len() as f64
        };

        CatalogStats {
            total_communities: communities.len(),
            care_levels,
            avg_monthly_fee,
            enhanced_available: communities.iter().filter(|c| c.enhanced).count(),
            working_with_placement: communities
                .iter()
                .filter(|c| c.works_with_placement)
                .count(),
        }
    }
}

fn validate_draft(draft: &CommunityDraft) -> Result<(), CatalogError> {
    if !draft.monthly_fee.is_finite() || draft.monthly_fee < 0.0 {
        return Err(CatalogError::InvalidFields(format!(
            "monthly_fee must be a non-negative number, got {}",
            draft.monthly_fee
        )));
    }
    if let Some(zip) = &draft.zip_code {
        if parser::parse_zip(zip).is_none() {
            return Err(CatalogError::InvalidFields(format!(
                "zip_code '{zip}' must be five digits"
            )));
        }
    }
    Ok(())
}

fn materialize(community_id: u32, draft: CommunityDraft) -> Community {
    Community {
        community_id,
        care_level: draft.care_level,
        monthly_fee: draft.monthly_fee,
        availability_score: availability_score_for(&draft.waitlist_status),
        willingness_score: willingness_score_for(draft.works_with_placement),
        apartment_category: apartment_category_for(draft.apartment_type.as_deref()),
        upfront: UpfrontCosts {
            deposit: draft.upfront.deposit.max(0.0),
            move_in_fee: draft.upfront.move_in_fee.max(0.0),
            community_fee: draft.upfront.community_fee.max(0.0),
            pet_fee: draft.upfront.pet_fee.max(0.0),
            second_person_fee: draft.upfront.second_person_fee.map(|fee| fee.max(0.0)),
        },
        zip_code: draft.zip_code.and_then(|zip| parser::parse_zip(&zip)),
        apartment_type: draft.apartment_type,
        waitlist_status: draft.waitlist_status,
        works_with_placement: draft.works_with_placement,
        contract_rate: draft.contract_rate.clamp(0.0, 1.0),
        enhanced: draft.enhanced,
        enriched: draft.enriched,
        amenity_notes: draft.amenity_notes,
        extra: BTreeMap::new(),
    }
}
