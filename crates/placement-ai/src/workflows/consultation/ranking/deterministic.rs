use std::collections::BTreeMap;

use crate::workflows::catalog::Community;
use crate::workflows::consultation::domain::ClientRequirements;
use crate::workflows::consultation::location::Geocoder;

use super::{
    format_usd, ranks_with_ties, trailing_ties, RankDimension, RankingOutcome, SortOrder,
};

/// Upfront charges are spread over an assumed two-year stay.
const AMORTIZATION_MONTHS: f64 = 24.0;

/// Tie tolerances per dimension: scores closer than this are the same.
const COST_EPSILON: f64 = 0.01;
const DISTANCE_EPSILON: f64 = 0.1;
const UTILIZATION_EPSILON: f64 = 0.01;
const COUPLE_FEE_EPSILON: f64 = 10.0;

/// The five rule-based rank vectors plus the raw miles the distance
/// ranker measured (surfaced later in `key_metrics`).
#[derive(Debug, Clone)]
pub struct DeterministicRankings {
    pub outcomes: BTreeMap<RankDimension, RankingOutcome>,
    pub distance_miles: BTreeMap<u32, Option<f64>>,
}

impl DeterministicRankings {
    pub fn outcome(&self, dimension: RankDimension) -> &RankingOutcome {
        &self.outcomes[&dimension]
    }
}

/// Run the five deterministic rankers as one concurrent group. Four are
/// pure computations; the distance ranker suspends on geocoding.
pub async fn run_deterministic_rankers(
    communities: &[Community],
    requirements: &ClientRequirements,
    geocoder: &Geocoder,
) -> DeterministicRankings {
    let (business, cost, (distance, distance_miles), budget, couple) = futures::join!(
        async { rank_business(communities) },
        async { rank_total_cost(communities, requirements.has_pet) },
        rank_distance(communities, requirements, geocoder),
        async { rank_budget_efficiency(communities, requirements.budget_monthly) },
        async { rank_couple(communities, requirements.is_couple) },
    );

    let outcomes = [business, cost, distance, budget, couple]
        .into_iter()
        .map(|outcome| (outcome.dimension, outcome))
        .collect();

    DeterministicRankings {
        outcomes,
        distance_miles,
    }
}

/// Business value: willingness x commission, higher is better.
fn rank_business(communities: &[Community]) -> RankingOutcome {
    let mut scored = Vec::with_capacity(communities.len());
    let mut reasons = BTreeMap::new();

    for community in communities {
        let score = community.willingness_score as f64 * community.contract_rate;
        reasons.insert(
            community.community_id,
            format!(
                "Willingness {}/10 x contract {:.0}% = {:.2}",
                community.willingness_score,
                community.contract_rate * 100.0,
                score
            ),
        );
        scored.push((community.community_id, score));
    }

    let ranks = ranks_with_ties(scored, SortOrder::Descending, 0.0);
    RankingOutcome::applicable(RankDimension::Business, ranks, reasons)
}

/// Total cost: monthly fee plus amortized upfront charges, lower is better.
fn rank_total_cost(communities: &[Community], has_pet: bool) -> RankingOutcome {
    let mut scored = Vec::with_capacity(communities.len());
    let mut reasons = BTreeMap::new();

    for community in communities {
        let upfront = community.upfront.move_in_total(has_pet);
        let amortized = upfront / AMORTIZATION_MONTHS;
        let score = community.monthly_fee + amortized;
        reasons.insert(
            community.community_id,
            format!(
                "{}/month + {} amortized upfront ({} one-time over 24 months)",
                format_usd(community.monthly_fee),
                format_usd(amortized),
                format_usd(upfront)
            ),
        );
        scored.push((community.community_id, score));
    }

    let ranks = ranks_with_ties(scored, SortOrder::Ascending, COST_EPSILON);
    RankingOutcome::applicable(RankDimension::Cost, ranks, reasons)
}

/// Geodesic miles from the client's resolved ZIP, lower is better.
/// Unknown distances trail, averaged-tied among themselves; with no
/// client location the whole dimension is N/A.
async fn rank_distance(
    communities: &[Community],
    requirements: &ClientRequirements,
    geocoder: &Geocoder,
) -> (RankingOutcome, BTreeMap<u32, Option<f64>>) {
    let ids: Vec<u32> = communities.iter().map(|c| c.community_id).collect();

    let Some(client_zip) = requirements.resolved_zip.as_deref() else {
        let miles = ids.iter().map(|id| (*id, None)).collect();
        return (
            RankingOutcome::neutral(
                RankDimension::Distance,
                &ids,
                "Not applicable (no client location provided)",
            ),
            miles,
        );
    };

    let mut scored = Vec::new();
    let mut unknown = Vec::new();
    let mut reasons = BTreeMap::new();
    let mut miles_by_id = BTreeMap::new();

    for community in communities {
        let miles = match community.zip_code.as_deref() {
            Some(zip) => geocoder.distance_miles(client_zip, zip).await,
            None => None,
        };
        miles_by_id.insert(community.community_id, miles);

        match miles {
            Some(miles) => {
                reasons.insert(
                    community.community_id,
                    format!("{miles:.2} miles from ZIP {client_zip}"),
                );
                scored.push((community.community_id, miles));
            }
            None => {
                reasons.insert(
                    community.community_id,
                    "Distance unknown (unrecognized ZIP)".to_string(),
                );
                unknown.push(community.community_id);
            }
        }
    }

    let ranked_count = scored.len();
    let mut ranks = ranks_with_ties(scored, SortOrder::Ascending, DISTANCE_EPSILON);
    trailing_ties(&mut ranks, &unknown, ranked_count);

    (
        RankingOutcome::applicable(RankDimension::Distance, ranks, reasons),
        miles_by_id,
    )
}

/// Budget utilization: monthly fee as a fraction of budget, lower is
/// better value. Without a budget the dimension contributes no signal.
fn rank_budget_efficiency(communities: &[Community], budget: Option<f64>) -> RankingOutcome {
    let ids: Vec<u32> = communities.iter().map(|c| c.community_id).collect();

    let Some(budget) = budget.filter(|b| *b > 0.0) else {
        return RankingOutcome::neutral(
            RankDimension::BudgetEfficiency,
            &ids,
            "Not applicable (no budget provided)",
        );
    };

    let mut scored = Vec::with_capacity(communities.len());
    let mut reasons = BTreeMap::new();

    for community in communities {
        let utilization = community.monthly_fee / budget;
        reasons.insert(
            community.community_id,
            format!(
                "{}/mo is {:.1}% of {} budget",
                format_usd(community.monthly_fee),
                utilization * 100.0,
                format_usd(budget)
            ),
        );
        scored.push((community.community_id, utilization));
    }

    let ranks = ranks_with_ties(scored, SortOrder::Ascending, UTILIZATION_EPSILON);
    RankingOutcome::applicable(RankDimension::BudgetEfficiency, ranks, reasons)
}

/// Second-person fee, lower is better; a community that publishes no
/// fee is the riskiest choice for a couple and trails the field.
fn rank_couple(communities: &[Community], is_couple: bool) -> RankingOutcome {
    let ids: Vec<u32> = communities.iter().map(|c| c.community_id).collect();

    if !is_couple {
        return RankingOutcome::neutral(
            RankDimension::Couple,
            &ids,
            "Not applicable (client is single)",
        );
    }

    let mut scored = Vec::new();
    let mut unpublished = Vec::new();
    let mut reasons = BTreeMap::new();

    for community in communities {
        match community.upfront.second_person_fee {
            Some(fee) => {
                reasons.insert(
                    community.community_id,
                    format!("{}/mo for second person", format_usd(fee)),
                );
                scored.push((community.community_id, fee));
            }
            None => {
                reasons.insert(
                    community.community_id,
                    "No second-person fee published (risky for couples)".to_string(),
                );
                unpublished.push(community.community_id);
            }
        }
    }

    let ranked_count = scored.len();
    let mut ranks = ranks_with_ties(scored, SortOrder::Ascending, COUPLE_FEE_EPSILON);
    trailing_ties(&mut ranks, &unpublished, ranked_count);

    RankingOutcome::applicable(RankDimension::Couple, ranks, reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeocodeConfig;
    use crate::workflows::catalog::{CareLevel, UpfrontCosts};
    use crate::workflows::consultation::domain::Timeline;
    use crate::workflows::consultation::location::{
        Coordinates, GeocodeError, GeocodeProvider,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    fn community(id: u32, monthly_fee: f64) -> Community {
        Community {
            community_id: id,
            care_level: CareLevel::AssistedLiving,
            monthly_fee,
            upfront: UpfrontCosts::default(),
            zip_code: Some("14611".to_string()),
            apartment_type: None,
            apartment_category: crate::workflows::catalog::ApartmentCategory::Unknown,
            waitlist_status: "Available".to_string(),
            availability_score: 0,
            works_with_placement: false,
            contract_rate: 0.0,
            willingness_score: 0,
            enhanced: false,
            enriched: false,
            amenity_notes: None,
            extra: std::collections::BTreeMap::new(),
        }
    }

    fn requirements() -> ClientRequirements {
        ClientRequirements {
            client_name: None,
            care_level: CareLevel::AssistedLiving,
            budget_monthly: Some(5000.0),
            timeline: Timeline::Flexible,
            location_preference: None,
            resolved_zip: Some("14611".to_string()),
            needs_enhanced: false,
            needs_enriched: false,
            is_couple: false,
            has_pet: false,
            apartment_preference: None,
            special_notes: None,
        }
    }

    struct GridProvider;

    #[async_trait]
    impl GeocodeProvider for GridProvider {
        async fn resolve(&self, zip: &str) -> Result<Coordinates, GeocodeError> {
            // One hundredth of a degree of longitude per ZIP increment.
            let offset: f64 = match zip {
                "14611" => 0.0,
                "14612" => 0.01,
                "14613" => 0.02,
                _ => return Err(GeocodeError::NotFound(zip.to_string())),
            };
            Ok(Coordinates {
                latitude: 43.15,
                longitude: -77.65 + offset,
            })
        }
    }

    fn geocoder() -> Geocoder {
        Geocoder::new(
            Arc::new(GridProvider),
            &GeocodeConfig {
                cache_capacity: 1024,
                min_request_interval: Duration::from_millis(0),
            },
        )
    }

    #[test]
    fn business_ranks_partnership_value_descending() {
        let mut strong = community(1, 4000.0);
        strong.willingness_score = 10;
        strong.contract_rate = 0.85;
        let mut weak = community(2, 4000.0);
        weak.willingness_score = 10;
        weak.contract_rate = 0.5;
        let none = community(3, 4000.0);

        let outcome = rank_business(&[strong, weak, none]);
        assert_eq!(outcome.rank_of(1), Some(1.0));
        assert_eq!(outcome.rank_of(2), Some(2.0));
        assert_eq!(outcome.rank_of(3), Some(3.0));
        assert!(outcome.reason_of(1).contains("85%"));
    }

    #[test]
    fn total_cost_amortizes_upfront_over_two_years() {
        let cheap_monthly = community(1, 3000.0);
        let mut heavy_upfront = community(2, 2900.0);
        heavy_upfront.upfront.deposit = 4800.0;

        // 2900 + 4800/24 = 3100 > 3000
        let outcome = rank_total_cost(&[cheap_monthly, heavy_upfront], false);
        assert_eq!(outcome.rank_of(1), Some(1.0));
        assert_eq!(outcome.rank_of(2), Some(2.0));
        assert!(outcome.reason_of(2).contains("$200 amortized upfront"));
    }

    #[test]
    fn pet_fee_counts_only_for_pet_owners() {
        let mut with_pet_fee = community(1, 3000.0);
        with_pet_fee.upfront.pet_fee = 2400.0;
        let plain = community(2, 3050.0);

        let without_pet = rank_total_cost(&[with_pet_fee.clone(), plain.clone()], false);
        assert_eq!(without_pet.rank_of(1), Some(1.0));

        // 3000 + 2400/24 = 3100 > 3050
        let with_pet = rank_total_cost(&[with_pet_fee, plain], true);
        assert_eq!(with_pet.rank_of(2), Some(1.0));
    }

    #[tokio::test]
    async fn distance_ranks_close_first_and_unknowns_trail() {
        let near = community(1, 4000.0);
        let mut far = community(2, 4000.0);
        far.zip_code = Some("14613".to_string());
        let mut unknown = community(3, 4000.0);
        unknown.zip_code = Some("99999".to_string());
        let mut missing = community(4, 4000.0);
        missing.zip_code = None;

        let geocoder = geocoder();
        let (outcome, miles) =
            rank_distance(&[near, far, unknown, missing], &requirements(), &geocoder).await;

        assert_eq!(outcome.rank_of(1), Some(1.0));
        assert_eq!(outcome.rank_of(2), Some(2.0));
        // Positions 3 and 4 averaged between the two unknowns.
        assert_eq!(outcome.rank_of(3), Some(3.5));
        assert_eq!(outcome.rank_of(4), Some(3.5));
        assert!(miles[&1].is_some());
        assert!(miles[&3].is_none());
        assert!(outcome.reason_of(3).contains("unknown"));

        let sum: f64 = outcome.ranks.values().sum();
        assert_eq!(sum, 10.0);
    }

    #[tokio::test]
    async fn distance_is_neutral_without_client_location() {
        let communities = [community(1, 4000.0), community(2, 4000.0)];
        let mut no_location = requirements();
        no_location.resolved_zip = None;

        let geocoder = geocoder();
        let (outcome, _) = rank_distance(&communities, &no_location, &geocoder).await;
        assert!(!outcome.applicable);
        assert_eq!(outcome.rank_of(1), Some(1.5));
        assert_eq!(outcome.rank_of(2), Some(1.5));
    }

    #[test]
    fn budget_efficiency_prefers_lower_utilization() {
        let cheap = community(1, 3000.0);
        let pricey = community(2, 4900.0);

        let outcome = rank_budget_efficiency(&[cheap, pricey], Some(5000.0));
        assert_eq!(outcome.rank_of(1), Some(1.0));
        assert_eq!(outcome.rank_of(2), Some(2.0));
        assert!(outcome.reason_of(1).contains("60.0%"));
    }

    #[test]
    fn budget_efficiency_is_neutral_without_budget() {
        let communities = [community(1, 3000.0), community(2, 4000.0), community(3, 5000.0)];
        let outcome = rank_budget_efficiency(&communities, None);
        assert!(!outcome.applicable);
        for id in [1, 2, 3] {
            assert_eq!(outcome.rank_of(id), Some(2.0));
        }
    }

    #[test]
    fn couple_ranker_orders_by_second_person_fee() {
        let mut cheap = community(1, 4000.0);
        cheap.upfront.second_person_fee = Some(500.0);
        let mut pricey = community(2, 4000.0);
        pricey.upfront.second_person_fee = Some(1000.0);
        let unpublished = community(3, 4000.0);

        let outcome = rank_couple(&[cheap, pricey, unpublished], true);
        assert_eq!(outcome.rank_of(1), Some(1.0));
        assert_eq!(outcome.rank_of(2), Some(2.0));
        assert_eq!(outcome.rank_of(3), Some(3.0));
        assert!(outcome.reason_of(3).contains("risky"));
    }

    #[test]
    fn couple_ranker_is_neutral_for_singles() {
        let communities = [community(1, 4000.0), community(2, 4000.0)];
        let outcome = rank_couple(&communities, false);
        assert!(!outcome.applicable);
        assert_eq!(outcome.rank_of(1), Some(1.5));
    }

    #[tokio::test]
    async fn all_five_outcomes_are_produced() {
        let communities = [community(1, 4000.0), community(2, 4500.0)];
        let geocoder = geocoder();
        let rankings =
            run_deterministic_rankers(&communities, &requirements(), &geocoder).await;

        for dimension in RankDimension::DETERMINISTIC {
            assert!(rankings.outcomes.contains_key(&dimension));
        }
        assert_eq!(rankings.distance_miles.len(), 2);
    }
}
