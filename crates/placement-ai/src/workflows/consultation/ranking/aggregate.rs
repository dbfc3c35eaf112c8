use std::collections::BTreeMap;

use crate::workflows::catalog::Community;
use crate::workflows::consultation::domain::{KeyMetrics, Recommendation};

use super::{AiRankerReport, DeterministicRankings, RankDimension, RankingWeights};

/// Weighted Borda count over the eight rank vectors. Lower combined
/// score is better. Ties break on holistic rank, then distance rank,
/// then community id, so the final ordering is total and reproducible.
pub fn aggregate_recommendations(
    shortlist: &[Community],
    deterministic: &DeterministicRankings,
    ai: &AiRankerReport,
    weights: &RankingWeights,
    limit: usize,
) -> Vec<Recommendation> {
    let outcome_for = |dimension: RankDimension| {
        if RankDimension::DETERMINISTIC.contains(&dimension) {
            deterministic.outcome(dimension)
        } else {
            ai.outcome(dimension)
        }
    };

    let mut scored: Vec<(f64, Recommendation)> = shortlist
        .iter()
        .map(|community| {
            let mut combined = 0.0;
            let mut rankings = BTreeMap::new();
            let mut explanations = BTreeMap::new();

            for dimension in RankDimension::ALL {
                let outcome = outcome_for(dimension);
                let rank = outcome.rank_of(community.community_id).unwrap_or_default();
                combined += weights.weight(dimension) * rank;

                let key = dimension.key().to_string();
                rankings.insert(key.clone(), outcome.applicable.then_some(rank));
                explanations.insert(key, outcome.reason_of(community.community_id).to_string());
            }

            let recommendation = Recommendation {
                final_rank: 0,
                community_id: community.community_id,
                combined_rank_score: combined,
                key_metrics: KeyMetrics {
                    monthly_fee: community.monthly_fee,
                    distance_miles: deterministic
                        .distance_miles
                        .get(&community.community_id)
                        .copied()
                        .flatten(),
                    est_waitlist: community.waitlist_status.clone(),
                },
                rankings,
                explanations,
            };

            (combined, recommendation)
        })
        .collect();

    scored.sort_by(|a, b| {
        let holistic = RankDimension::Holistic.key();
        let distance = RankDimension::Distance.key();
        let tiebreak = |recommendation: &Recommendation, key: &str| {
            recommendation
                .rankings
                .get(key)
                .copied()
                .flatten()
                .unwrap_or(f64::MAX)
        };

        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                tiebreak(&a.1, holistic)
                    .partial_cmp(&tiebreak(&b.1, holistic))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                tiebreak(&a.1, distance)
                    .partial_cmp(&tiebreak(&b.1, distance))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.1.community_id.cmp(&b.1.community_id))
    });

    scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, (_, mut recommendation))| {
            recommendation.final_rank = index + 1;
            recommendation
        })
        .collect()
}
