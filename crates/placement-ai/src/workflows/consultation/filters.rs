use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::workflows::catalog::Community;

use super::domain::ClientRequirements;

/// Hard-filter dials. The budget tolerance is a contract set once at
/// construction, not a per-call knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub budget_tolerance: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            budget_tolerance: 1.0,
        }
    }
}

/// Eliminate communities that cannot satisfy the client's absolute
/// constraints. Every survivor satisfies all five conditions.
pub fn apply_hard_filters(
    communities: &[Community],
    requirements: &ClientRequirements,
    config: &FilterConfig,
) -> Vec<Community> {
    let survivors: Vec<Community> = communities
        .iter()
        .filter(|community| passes(community, requirements, config))
        .cloned()
        .collect();

    debug!(
        initial = communities.len(),
        surviving = survivors.len(),
        care_level = requirements.care_level.label(),
        timeline = requirements.timeline.label(),
        "hard filters applied"
    );

    survivors
}

fn passes(
    community: &Community,
    requirements: &ClientRequirements,
    config: &FilterConfig,
) -> bool {
    if community.care_level != requirements.care_level {
        return false;
    }

    if requirements.needs_enhanced && !community.enhanced {
        return false;
    }

    if requirements.needs_enriched && !community.enriched {
        return false;
    }

    if let Some(budget) = requirements.budget_monthly {
        // Monthly fee only; upfront costs belong to the total-cost ranker.
        if community.monthly_fee > budget * config.budget_tolerance {
            return false;
        }
    }

    if let Some(max_score) = requirements.timeline.max_availability_score() {
        if community.availability_score > max_score {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::catalog::{CareLevel, UpfrontCosts};
    use crate::workflows::consultation::domain::Timeline;
    use std::collections::BTreeMap;

    fn community(id: u32) -> Community {
        Community {
            community_id: id,
            care_level: CareLevel::AssistedLiving,
            monthly_fee: 4500.0,
            upfront: UpfrontCosts::default(),
            zip_code: Some("14620".to_string()),
            apartment_type: None,
            apartment_category: crate::workflows::catalog::ApartmentCategory::Unknown,
            waitlist_status: "Available".to_string(),
            availability_score: 0,
            works_with_placement: true,
            contract_rate: 0.8,
            willingness_score: 10,
            enhanced: false,
            enriched: false,
            amenity_notes: None,
            extra: BTreeMap::new(),
        }
    }

    fn requirements() -> ClientRequirements {
        ClientRequirements {
            client_name: None,
            care_level: CareLevel::AssistedLiving,
            budget_monthly: Some(5000.0),
            timeline: Timeline::NearTerm,
            location_preference: None,
            resolved_zip: None,
            needs_enhanced: false,
            needs_enriched: false,
            is_couple: false,
            has_pet: false,
            apartment_preference: None,
            special_notes: None,
        }
    }

    #[test]
    fn budget_boundary_is_inclusive() {
        let mut at_budget = community(1);
        at_budget.monthly_fee = 5000.0;
        let mut over_budget = community(2);
        over_budget.monthly_fee = 5001.0;

        let survivors = apply_hard_filters(
            &[at_budget, over_budget],
            &requirements(),
            &FilterConfig::default(),
        );
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].community_id, 1);
    }

    #[test]
    fn budget_tolerance_widens_the_gate() {
        let mut over_budget = community(1);
        over_budget.monthly_fee = 5400.0;

        let config = FilterConfig {
            budget_tolerance: 1.1,
        };
        let survivors = apply_hard_filters(&[over_budget], &requirements(), &config);
        assert_eq!(survivors.len(), 1);
    }

    #[test]
    fn timeline_boundary_is_inclusive() {
        let mut on_boundary = community(1);
        on_boundary.availability_score = 60;
        let mut past_boundary = community(2);
        past_boundary.availability_score = 61;

        let survivors = apply_hard_filters(
            &[on_boundary, past_boundary],
            &requirements(),
            &FilterConfig::default(),
        );
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].community_id, 1);
    }

    #[test]
    fn flexible_timeline_ignores_availability() {
        let mut long_wait = community(1);
        long_wait.availability_score = 99;
        let mut flexible = requirements();
        flexible.timeline = Timeline::Flexible;

        let survivors = apply_hard_filters(&[long_wait], &flexible, &FilterConfig::default());
        assert_eq!(survivors.len(), 1);
    }

    #[test]
    fn care_level_and_service_flags_are_absolute() {
        let mut wrong_level = community(1);
        wrong_level.care_level = CareLevel::MemoryCare;
        let not_enhanced = community(2);
        let mut enhanced = community(3);
        enhanced.enhanced = true;

        let mut needs_enhanced = requirements();
        needs_enhanced.needs_enhanced = true;

        let survivors = apply_hard_filters(
            &[wrong_level, not_enhanced, enhanced],
            &needs_enhanced,
            &FilterConfig::default(),
        );
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].community_id, 3);
    }

    #[test]
    fn missing_budget_skips_the_budget_gate() {
        let mut expensive = community(1);
        expensive.monthly_fee = 12000.0;
        let mut no_budget = requirements();
        no_budget.budget_monthly = None;

        let survivors = apply_hard_filters(&[expensive], &no_budget, &FilterConfig::default());
        assert_eq!(survivors.len(), 1);
    }
}
