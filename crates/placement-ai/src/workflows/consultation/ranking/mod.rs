mod aggregate;
mod ai;
mod deterministic;
mod shortlist;

pub use aggregate::aggregate_recommendations;
pub use ai::{run_ai_rankers, AiRankerReport, AiRankingContext, NOT_RANKED_BY_AI};
pub use deterministic::{run_deterministic_rankers, DeterministicRankings};
pub use shortlist::select_shortlist;

use std::collections::BTreeMap;

/// The eight ranking dimensions, in aggregation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RankDimension {
    Business,
    Cost,
    Distance,
    BudgetEfficiency,
    Couple,
    Availability,
    Amenity,
    Holistic,
}

impl RankDimension {
    pub const ALL: [Self; 8] = [
        Self::Business,
        Self::Cost,
        Self::Distance,
        Self::BudgetEfficiency,
        Self::Couple,
        Self::Availability,
        Self::Amenity,
        Self::Holistic,
    ];

    pub const DETERMINISTIC: [Self; 5] = [
        Self::Business,
        Self::Cost,
        Self::Distance,
        Self::BudgetEfficiency,
        Self::Couple,
    ];

    pub const AI: [Self; 3] = [Self::Availability, Self::Amenity, Self::Holistic];

    pub const fn key(self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Cost => "cost",
            Self::Distance => "distance",
            Self::BudgetEfficiency => "budget_efficiency",
            Self::Couple => "couple",
            Self::Availability => "availability",
            Self::Amenity => "amenity",
            Self::Holistic => "holistic",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dim| dim.key() == key)
    }
}

/// One dimension's verdict over a candidate set. Ranks are 1-based and
/// may be fractional from average-rank tie handling. `applicable: false`
/// marks a neutral (N/A or degraded) dimension: the neutral ranks still
/// feed the Borda sum, but collaborators see `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingOutcome {
    pub dimension: RankDimension,
    pub ranks: BTreeMap<u32, f64>,
    pub reasons: BTreeMap<u32, String>,
    pub applicable: bool,
}

impl RankingOutcome {
    pub fn applicable(
        dimension: RankDimension,
        ranks: BTreeMap<u32, f64>,
        reasons: BTreeMap<u32, String>,
    ) -> Self {
        Self {
            dimension,
            ranks,
            reasons,
            applicable: true,
        }
    }

    /// Neutral outcome: every community gets `(N+1)/2` and the same reason.
    pub fn neutral(dimension: RankDimension, ids: &[u32], reason: &str) -> Self {
        let neutral = neutral_rank(ids.len());
        Self {
            dimension,
            ranks: ids.iter().map(|id| (*id, neutral)).collect(),
            reasons: ids.iter().map(|id| (*id, reason.to_string())).collect(),
            applicable: false,
        }
    }

    pub fn rank_of(&self, community_id: u32) -> Option<f64> {
        self.ranks.get(&community_id).copied()
    }

    pub fn reason_of(&self, community_id: u32) -> &str {
        self.reasons
            .get(&community_id)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// The neutral rank keeps the Borda sum invariant when a dimension
/// contributes no signal.
pub fn neutral_rank(n: usize) -> f64 {
    (n as f64 + 1.0) / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Assign 1-based ranks with average-rank tie handling: `t` tied items
/// starting at position `k` all receive `k + (t-1)/2`. Scores within
/// `epsilon` of the group leader tie.
pub fn ranks_with_ties(
    mut scored: Vec<(u32, f64)>,
    order: SortOrder,
    epsilon: f64,
) -> BTreeMap<u32, f64> {
    scored.sort_by(|a, b| {
        let ordering = a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal);
        let ordering = match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        ordering.then_with(|| a.0.cmp(&b.0))
    });

    let mut ranks = BTreeMap::new();
    let mut i = 0;
    while i < scored.len() {
        let group_score = scored[i].1;
        let mut j = i;
        while j < scored.len() && (scored[j].1 - group_score).abs() <= epsilon {
            j += 1;
        }

        let average = (i + 1 + j) as f64 / 2.0;
        for (community_id, _) in &scored[i..j] {
            ranks.insert(*community_id, average);
        }
        i = j;
    }

    ranks
}

/// Tie a trailing group (unknown distances, unpublished fees) across the
/// positions after `ranked_count`, averaged among themselves.
pub fn trailing_ties(ranks: &mut BTreeMap<u32, f64>, trailing_ids: &[u32], ranked_count: usize) {
    if trailing_ids.is_empty() {
        return;
    }
    let total = ranked_count + trailing_ids.len();
    let average = (ranked_count + 1 + total) as f64 / 2.0;
    for community_id in trailing_ids {
        ranks.insert(*community_id, average);
    }
}

/// Per-dimension weights for the Borda aggregation. Callers override
/// only the dimensions they name; everything else stays at 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingWeights {
    weights: BTreeMap<RankDimension, f64>,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            weights: RankDimension::ALL.iter().map(|dim| (*dim, 1.0)).collect(),
        }
    }
}

impl RankingWeights {
    pub fn with_overrides<'a, I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut weights = Self::default();
        for (key, weight) in overrides {
            if let Some(dimension) = RankDimension::from_key(key) {
                weights.weights.insert(dimension, weight);
            }
        }
        weights
    }

    pub fn weight(&self, dimension: RankDimension) -> f64 {
        self.weights.get(&dimension).copied().unwrap_or(1.0)
    }

    pub fn as_map(&self) -> BTreeMap<String, f64> {
        self.weights
            .iter()
            .map(|(dimension, weight)| (dimension.key().to_string(), *weight))
            .collect()
    }
}

/// Whole-dollar USD formatting with thousands separators, for
/// explanation strings.
pub(crate) fn format_usd(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.abs().to_string();
    let mut grouped = String::new();
    for (index, c) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_sum_is_invariant_under_ties() {
        let scored = vec![(1, 10.0), (2, 10.0), (3, 5.0), (4, 5.0), (5, 1.0)];
        let ranks = ranks_with_ties(scored, SortOrder::Ascending, 0.0);

        let sum: f64 = ranks.values().sum();
        assert_eq!(sum, 15.0); // 5 * 6 / 2

        assert_eq!(ranks[&5], 1.0);
        assert_eq!(ranks[&3], 2.5);
        assert_eq!(ranks[&4], 2.5);
        assert_eq!(ranks[&1], 4.5);
        assert_eq!(ranks[&2], 4.5);
    }

    #[test]
    fn descending_order_ranks_highest_first() {
        let scored = vec![(1, 2.0), (2, 8.0), (3, 5.0)];
        let ranks = ranks_with_ties(scored, SortOrder::Descending, 0.0);
        assert_eq!(ranks[&2], 1.0);
        assert_eq!(ranks[&3], 2.0);
        assert_eq!(ranks[&1], 3.0);
    }

    #[test]
    fn epsilon_groups_near_ties() {
        let scored = vec![(1, 100.0), (2, 100.005), (3, 200.0)];
        let ranks = ranks_with_ties(scored, SortOrder::Ascending, 0.01);
        assert_eq!(ranks[&1], 1.5);
        assert_eq!(ranks[&2], 1.5);
        assert_eq!(ranks[&3], 3.0);
    }

    #[test]
    fn trailing_group_averages_the_tail_positions() {
        let mut ranks = ranks_with_ties(vec![(1, 1.0), (2, 2.0)], SortOrder::Ascending, 0.0);
        trailing_ties(&mut ranks, &[7, 8], 2);

        // Positions 3 and 4 averaged.
        assert_eq!(ranks[&7], 3.5);
        assert_eq!(ranks[&8], 3.5);
        let sum: f64 = ranks.values().sum();
        assert_eq!(sum, 10.0); // 4 * 5 / 2
    }

    #[test]
    fn neutral_rank_is_midpoint() {
        assert_eq!(neutral_rank(9), 5.0);
        assert_eq!(neutral_rank(10), 5.5);
    }

    #[test]
    fn weights_override_only_named_dimensions() {
        let weights = RankingWeights::with_overrides([("distance", 0.5), ("holistic", 2.0)]);
        assert_eq!(weights.weight(RankDimension::Distance), 0.5);
        assert_eq!(weights.weight(RankDimension::Holistic), 2.0);
        assert_eq!(weights.weight(RankDimension::Business), 1.0);
    }

    #[test]
    fn usd_formatting_groups_thousands() {
        assert_eq!(format_usd(3090.0), "$3,090");
        assert_eq!(format_usd(950.4), "$950");
        assert_eq!(format_usd(1250000.0), "$1,250,000");
        assert_eq!(format_usd(0.0), "$0");
    }
}
