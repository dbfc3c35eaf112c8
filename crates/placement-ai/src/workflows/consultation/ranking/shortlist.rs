use crate::workflows::catalog::Community;

use super::{DeterministicRankings, RankDimension, RankingWeights};

/// Pick the strongest `limit` candidates from the deterministic rank
/// vectors before spending tokens on AI ranking. The pre-aggregate uses
/// the same weights as the final Borda count; neutral ranks are already
/// embedded for N/A dimensions, so a plain weighted sum is exact.
pub fn select_shortlist(
    communities: &[Community],
    rankings: &DeterministicRankings,
    weights: &RankingWeights,
    limit: usize,
) -> Vec<Community> {
    let mut scored: Vec<(f64, &Community)> = communities
        .iter()
        .map(|community| {
            let score: f64 = RankDimension::DETERMINISTIC
                .iter()
                .map(|dimension| {
                    let rank = rankings
                        .outcome(*dimension)
                        .rank_of(community.community_id)
                        .unwrap_or_default();
                    weights.weight(*dimension) * rank
                })
                .sum();
            (score, community)
        })
        .collect();

    scored.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.community_id.cmp(&b.1.community_id))
    });

    scored
        .into_iter()
        .take(limit)
        .map(|(_, community)| community.clone())
        .collect()
}
