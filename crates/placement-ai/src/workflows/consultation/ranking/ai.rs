use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::warn;

use crate::workflows::catalog::Community;
use crate::workflows::consultation::domain::ClientRequirements;
use crate::workflows::consultation::gemini::{JsonRequest, LlmGateway, LlmUsage};

use super::{
    format_usd, ranks_with_ties, trailing_ties, DeterministicRankings, RankDimension,
    RankingOutcome, SortOrder,
};

/// Explanation used wherever an AI ranker could not score a community.
pub const NOT_RANKED_BY_AI: &str = "Not ranked by AI";

/// Cap on free-text amenity notes forwarded to the model.
const AMENITY_NOTES_LIMIT: usize = 150;

/// Inputs shared by the three qualitative rankers.
pub struct AiRankingContext<'a> {
    pub requirements: &'a ClientRequirements,
    pub shortlist: &'a [Community],
    pub deterministic: &'a DeterministicRankings,
}

/// The three qualitative rank vectors plus usage accounting and the
/// names of any dimensions that degraded to neutral.
#[derive(Debug, Clone)]
pub struct AiRankerReport {
    pub outcomes: BTreeMap<RankDimension, RankingOutcome>,
    pub usages: Vec<LlmUsage>,
    pub degraded: Vec<String>,
}

impl AiRankerReport {
    /// Every AI dimension neutral: used when the pipeline deadline
    /// cancels the qualitative phase outright.
    pub fn fully_degraded(shortlist: &[Community]) -> Self {
        let ids: Vec<u32> = shortlist.iter().map(|c| c.community_id).collect();
        Self {
            outcomes: RankDimension::AI
                .iter()
                .map(|dimension| {
                    (
                        *dimension,
                        RankingOutcome::neutral(*dimension, &ids, NOT_RANKED_BY_AI),
                    )
                })
                .collect(),
            usages: Vec::new(),
            degraded: RankDimension::AI
                .iter()
                .map(|dimension| dimension.key().to_string())
                .collect(),
        }
    }

    pub fn outcome(&self, dimension: RankDimension) -> &RankingOutcome {
        &self.outcomes[&dimension]
    }
}

/// Run the availability, amenity, and holistic rankers concurrently.
/// A failure in one never cancels the others: the failed dimension
/// degrades to neutral ranks and the pipeline continues.
pub async fn run_ai_rankers<L>(gateway: &L, context: &AiRankingContext<'_>) -> AiRankerReport
where
    L: LlmGateway,
{
    let (availability, amenity, holistic) = tokio::join!(
        run_one(gateway, context, RankDimension::Availability),
        run_one(gateway, context, RankDimension::Amenity),
        run_one(gateway, context, RankDimension::Holistic),
    );

    let mut outcomes = BTreeMap::new();
    let mut usages = Vec::new();
    let mut degraded = Vec::new();

    for (outcome, usage) in [availability, amenity, holistic] {
        if !outcome.applicable {
            degraded.push(outcome.dimension.key().to_string());
        }
        if let Some(usage) = usage {
            usages.push(usage);
        }
        outcomes.insert(outcome.dimension, outcome);
    }

    AiRankerReport {
        outcomes,
        usages,
        degraded,
    }
}

async fn run_one<L>(
    gateway: &L,
    context: &AiRankingContext<'_>,
    dimension: RankDimension,
) -> (RankingOutcome, Option<LlmUsage>)
where
    L: LlmGateway,
{
    let prompt = match dimension {
        RankDimension::Availability => availability_prompt(context),
        RankDimension::Amenity => amenity_prompt(context),
        RankDimension::Holistic => holistic_prompt(context),
        _ => unreachable!("only AI dimensions are dispatched here"),
    };

    let request = JsonRequest::text(prompt);
    match gateway.generate_json(&request).await {
        Ok(response) => (
            outcome_from_payload(dimension, context.shortlist, &response.payload),
            Some(response.usage),
        ),
        Err(error) => {
            warn!(
                dimension = dimension.key(),
                %error,
                "AI ranker failed, degrading to neutral ranks"
            );
            let ids: Vec<u32> = context.shortlist.iter().map(|c| c.community_id).collect();
            (
                RankingOutcome::neutral(dimension, &ids, NOT_RANKED_BY_AI),
                None,
            )
        }
    }
}

/// Normalize a `{"rankings": [...]}` payload to ranks 1..K with
/// average-rank tie handling. Communities the model skipped trail the
/// field with the placeholder explanation.
fn outcome_from_payload(
    dimension: RankDimension,
    shortlist: &[Community],
    payload: &Value,
) -> RankingOutcome {
    let mut model_ranks: BTreeMap<u32, (f64, String)> = BTreeMap::new();
    if let Some(rankings) = payload.get("rankings").and_then(Value::as_array) {
        for entry in rankings {
            let Some(community_id) = entry.get("community_id").and_then(Value::as_u64) else {
                continue;
            };
            let Some(rank) = entry.get("rank").and_then(Value::as_f64) else {
                continue;
            };
            let reason = entry
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or(NOT_RANKED_BY_AI)
                .to_string();
            model_ranks.insert(community_id as u32, (rank, reason));
        }
    }

    let mut scored = Vec::new();
    let mut skipped = Vec::new();
    let mut reasons = BTreeMap::new();

    for community in shortlist {
        match model_ranks.get(&community.community_id) {
            Some((rank, reason)) => {
                scored.push((community.community_id, *rank));
                reasons.insert(community.community_id, reason.clone());
            }
            None => {
                skipped.push(community.community_id);
                reasons.insert(community.community_id, NOT_RANKED_BY_AI.to_string());
            }
        }
    }

    if scored.is_empty() {
        let ids: Vec<u32> = shortlist.iter().map(|c| c.community_id).collect();
        return RankingOutcome::neutral(dimension, &ids, NOT_RANKED_BY_AI);
    }

    let ranked_count = scored.len();
    let mut ranks = ranks_with_ties(scored, SortOrder::Ascending, 0.0);
    trailing_ties(&mut ranks, &skipped, ranked_count);

    RankingOutcome::applicable(dimension, ranks, reasons)
}

fn community_digest(context: &AiRankingContext<'_>) -> Value {
    let communities: Vec<Value> = context
        .shortlist
        .iter()
        .map(|community| {
            json!({
                "id": community.community_id,
                "waitlist": community.waitlist_status,
                "availability_score": community.availability_score,
                "care_level": community.care_level.label(),
            })
        })
        .collect();
    Value::Array(communities)
}

fn availability_prompt(context: &AiRankingContext<'_>) -> String {
    let requirements = context.requirements;
    format!(
        r#"You are an expert at matching senior living community availability with client timeline needs.

CLIENT TIMELINE: {timeline}
CLIENT NOTES: {notes}
CLIENT CARE LEVEL: {care_level}

COMMUNITIES TO RANK:
{communities}

RANKING CRITERIA:
- Available now + immediate need = Best match (rank 1)
- Short waitlist + near-term need = Good match
- Availability sooner than needed = Neutral (middle ranks)
- Availability later than needed = Poor match (lower ranks)
- Unconfirmed availability = Risky (near the bottom)
- Lower availability_score means sooner availability

YOUR TASK:
Rank all {count} communities from 1 (best availability match) to {count} (worst match).
Consider nuances in the client's timeline description and notes.

IMPORTANT:
- Every community must get a unique rank from 1 to {count}
- Provide specific reasoning for each ranking

Return ONLY valid JSON (no markdown, no code blocks):
{{
  "rankings": [
    {{"community_id": 1, "rank": 1, "reason": "Available immediately, perfect for urgent placement need"}}
  ]
}}"#,
        timeline = requirements.timeline.label(),
        notes = requirements.special_notes.as_deref().unwrap_or("None provided"),
        care_level = requirements.care_level.label(),
        communities = community_digest(context),
        count = context.shortlist.len(),
    )
}

fn amenity_prompt(context: &AiRankingContext<'_>) -> String {
    let requirements = context.requirements;
    let communities: Vec<Value> = context
        .shortlist
        .iter()
        .map(|community| {
            let notes = community.amenity_notes.as_deref().map(|notes| {
                if notes.len() > AMENITY_NOTES_LIMIT {
                    let cut = notes
                        .char_indices()
                        .take_while(|(index, _)| *index < AMENITY_NOTES_LIMIT)
                        .last()
                        .map(|(index, c)| index + c.len_utf8())
                        .unwrap_or(0);
                    format!("{}...", &notes[..cut])
                } else {
                    notes.to_string()
                }
            });
            json!({
                "id": community.community_id,
                "apartment_type": community.apartment_type,
                "pet_fee": community.upfront.pet_fee,
                "second_person_fee": community.upfront.second_person_fee,
                "enhanced": community.enhanced,
                "enriched": community.enriched,
                "amenity_notes": notes,
            })
        })
        .collect();

    format!(
        r#"You are an expert at matching senior living community amenities with client preferences.

CLIENT PREFERENCES:
- Apartment type preference: {apartment}
- Has pets: {pets}
- Moving in as a couple: {couple}
- Enhanced services needed: {enhanced}
- Enriched housing needed: {enriched}
- Notes: {notes}

COMMUNITIES TO RANK:
{communities}

RANKING CRITERIA:
- Apartment type matches client preference exactly = Best
- Enhanced/Enriched services match client needs = Better
- Amenity notes that align with stated needs = Bonus
- A pet fee listed suggests pets are welcome
- Missing amenity data = Risky (lower ranks)

YOUR TASK:
Rank all {count} communities from 1 (best amenity match) to {count} (worst match).
Consider both explicit preferences and implicit needs from notes.

IMPORTANT:
- Every community must get a unique rank
- Provide specific reasoning mentioning which amenities matched or didn't match

Return ONLY valid JSON:
{{
  "rankings": [
    {{"community_id": 1, "rank": 1, "reason": "Preferred 1BR available plus enhanced services matching medical needs"}}
  ]
}}"#,
        apartment = requirements
            .apartment_preference
            .map(|pref| pref.label())
            .unwrap_or("None specified"),
        pets = requirements.has_pet,
        couple = requirements.is_couple,
        enhanced = requirements.needs_enhanced,
        enriched = requirements.needs_enriched,
        notes = requirements.special_notes.as_deref().unwrap_or("None provided"),
        communities = Value::Array(communities),
        count = context.shortlist.len(),
    )
}

fn holistic_prompt(context: &AiRankingContext<'_>) -> String {
    let requirements = context.requirements;
    let communities: Vec<Value> = context
        .shortlist
        .iter()
        .map(|community| {
            let prior_ranks: BTreeMap<&str, Value> = RankDimension::DETERMINISTIC
                .iter()
                .map(|dimension| {
                    let rank = context
                        .deterministic
                        .outcome(*dimension)
                        .rank_of(community.community_id);
                    (dimension.key(), json!(rank))
                })
                .collect();

            json!({
                "id": community.community_id,
                "monthly_fee": community.monthly_fee,
                "distance_miles": context
                    .deterministic
                    .distance_miles
                    .get(&community.community_id)
                    .copied()
                    .flatten(),
                "waitlist": community.waitlist_status,
                "works_with_placement": community.works_with_placement,
                "previous_ranks": prior_ranks,
            })
        })
        .collect();

    let budget = requirements
        .budget_monthly
        .map(format_usd)
        .unwrap_or_else(|| "unspecified".to_string());

    format!(
        r#"Holistic ranking of {count} senior living communities.

CLIENT: {care_level}, {budget}/mo budget, {timeline} timeline{couple}

COMMUNITIES (id, monthly_fee, distance_miles, waitlist, previous_ranks):
{communities}

TASK: Rank 1 (best overall) to {count} (worst). Consider synergies (e.g. close + available + affordable = great). Weigh the previous rule-based ranks but override them when the whole picture disagrees.

Return ONLY valid JSON:
{{
  "rankings": [
    {{"community_id": 1, "rank": 1, "reason": "Best balance of cost, distance, and availability"}}
  ]
}}"#,
        count = context.shortlist.len(),
        care_level = requirements.care_level.label(),
        budget = budget,
        timeline = requirements.timeline.label(),
        couple = if requirements.is_couple { ", couple" } else { "" },
        communities = Value::Array(communities),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::catalog::{CareLevel, UpfrontCosts};
    use crate::workflows::consultation::domain::Timeline;
    use crate::workflows::consultation::gemini::{JsonResponse, LlmError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn community(id: u32) -> Community {
        Community {
            community_id: id,
            care_level: CareLevel::AssistedLiving,
            monthly_fee: 4000.0,
            upfront: UpfrontCosts::default(),
            zip_code: None,
            apartment_type: Some("Studio".to_string()),
            apartment_category: crate::workflows::catalog::ApartmentCategory::Studio,
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
            timeline: Timeline::Immediate,
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

    fn deterministic_for(ids: &[u32]) -> DeterministicRankings {
        let outcomes = RankDimension::DETERMINISTIC
            .iter()
            .map(|dimension| {
                let ranks: BTreeMap<u32, f64> = ids
                    .iter()
                    .enumerate()
                    .map(|(index, id)| (*id, (index + 1) as f64))
                    .collect();
                (
                    *dimension,
                    RankingOutcome::applicable(*dimension, ranks, BTreeMap::new()),
                )
            })
            .collect();
        DeterministicRankings {
            outcomes,
            distance_miles: ids.iter().map(|id| (*id, Some(1.0))).collect(),
        }
    }

    /// Gateway that answers every call with the same payload, or fails.
    struct UniformGateway {
        payload: Result<Value, ()>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LlmGateway for UniformGateway {
        async fn generate_json(&self, _request: &JsonRequest) -> Result<JsonResponse, LlmError> {
            *self.calls.lock().expect("lock") += 1;
            match &self.payload {
                Ok(payload) => Ok(JsonResponse {
                    payload: payload.clone(),
                    usage: LlmUsage {
                        input_tokens: 500,
                        output_tokens: 100,
                        latency_ms: 3,
                    },
                }),
                Err(()) => Err(LlmError::Unavailable("scripted outage".to_string())),
            }
        }
    }

    #[test]
    fn payload_normalizes_to_contiguous_ranks() {
        let shortlist = vec![community(1), community(2), community(3)];
        // The model returned sparse, unordered ranks.
        let payload = json!({
            "rankings": [
                {"community_id": 3, "rank": 1, "reason": "available now"},
                {"community_id": 1, "rank": 7, "reason": "long wait"},
                {"community_id": 2, "rank": 4, "reason": "short wait"}
            ]
        });

        let outcome = outcome_from_payload(RankDimension::Availability, &shortlist, &payload);
        assert!(outcome.applicable);
        assert_eq!(outcome.rank_of(3), Some(1.0));
        assert_eq!(outcome.rank_of(2), Some(2.0));
        assert_eq!(outcome.rank_of(1), Some(3.0));
        assert_eq!(outcome.reason_of(3), "available now");
    }

    #[test]
    fn skipped_communities_trail_with_placeholder() {
        let shortlist = vec![community(1), community(2), community(3), community(4)];
        let payload = json!({
            "rankings": [
                {"community_id": 1, "rank": 1, "reason": "best"},
                {"community_id": 2, "rank": 2, "reason": "second"}
            ]
        });

        let outcome = outcome_from_payload(RankDimension::Amenity, &shortlist, &payload);
        assert_eq!(outcome.rank_of(3), Some(3.5));
        assert_eq!(outcome.rank_of(4), Some(3.5));
        assert_eq!(outcome.reason_of(3), NOT_RANKED_BY_AI);
    }

    #[test]
    fn duplicate_model_ranks_average() {
        let shortlist = vec![community(1), community(2)];
        let payload = json!({
            "rankings": [
                {"community_id": 1, "rank": 1, "reason": "a"},
                {"community_id": 2, "rank": 1, "reason": "b"}
            ]
        });

        let outcome = outcome_from_payload(RankDimension::Holistic, &shortlist, &payload);
        assert_eq!(outcome.rank_of(1), Some(1.5));
        assert_eq!(outcome.rank_of(2), Some(1.5));
    }

    #[test]
    fn empty_payload_degrades_to_neutral() {
        let shortlist = vec![community(1), community(2), community(3)];
        let payload = json!({ "rankings": [] });

        let outcome = outcome_from_payload(RankDimension::Holistic, &shortlist, &payload);
        assert!(!outcome.applicable);
        assert_eq!(outcome.rank_of(2), Some(2.0));
    }

    #[tokio::test]
    async fn three_calls_run_and_usage_is_collected() {
        let shortlist = vec![community(1), community(2)];
        let requirements = requirements();
        let deterministic = deterministic_for(&[1, 2]);
        let context = AiRankingContext {
            requirements: &requirements,
            shortlist: &shortlist,
            deterministic: &deterministic,
        };

        let gateway = UniformGateway {
            payload: Ok(json!({
                "rankings": [
                    {"community_id": 1, "rank": 1, "reason": "fits"},
                    {"community_id": 2, "rank": 2, "reason": "close"}
                ]
            })),
            calls: Mutex::new(0),
        };

        let report = run_ai_rankers(&gateway, &context).await;
        assert_eq!(*gateway.calls.lock().expect("lock"), 3);
        assert!(report.degraded.is_empty());
        assert_eq!(report.usages.len(), 3);
        for dimension in RankDimension::AI {
            assert!(report.outcome(dimension).applicable);
        }
    }

    #[tokio::test]
    async fn provider_outage_degrades_every_dimension_without_cancelling() {
        let shortlist = vec![community(1), community(2)];
        let requirements = requirements();
        let deterministic = deterministic_for(&[1, 2]);
        let context = AiRankingContext {
            requirements: &requirements,
            shortlist: &shortlist,
            deterministic: &deterministic,
        };

        let gateway = UniformGateway {
            payload: Err(()),
            calls: Mutex::new(0),
        };

        let report = run_ai_rankers(&gateway, &context).await;
        assert_eq!(report.degraded.len(), 3);
        for dimension in RankDimension::AI {
            let outcome = report.outcome(dimension);
            assert!(!outcome.applicable);
            assert_eq!(outcome.reason_of(1), NOT_RANKED_BY_AI);
            assert_eq!(outcome.rank_of(1), Some(1.5));
        }
    }

    #[test]
    fn prompts_embed_shortlist_and_client_facts() {
        let shortlist = vec![community(1), community(2)];
        let requirements = requirements();
        let deterministic = deterministic_for(&[1, 2]);
        let context = AiRankingContext {
            requirements: &requirements,
            shortlist: &shortlist,
            deterministic: &deterministic,
        };

        let availability = availability_prompt(&context);
        assert!(availability.contains("immediate"));
        assert!(availability.contains("\"availability_score\":0"));

        let amenity = amenity_prompt(&context);
        assert!(amenity.contains("Studio"));

        let holistic = holistic_prompt(&context);
        assert!(holistic.contains("$5,000"));
        assert!(holistic.contains("previous_ranks"));
    }
}
