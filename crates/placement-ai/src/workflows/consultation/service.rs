use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::workflows::catalog::CatalogStore;

use super::domain::{
    ClientRequirements, ConsultationInput, ConsultationResult, ConsultationState,
};
use super::extraction::{ExtractionError, Extractor};
use super::filters::{apply_hard_filters, FilterConfig};
use super::gemini::{LlmError, LlmGateway};
use super::location::{Geocoder, LocationResolver};
use super::metrics::{PerformanceMetrics, PhaseTimings, PricingTable, TokenCounts};
use super::ranking::{
    aggregate_recommendations, run_ai_rankers, run_deterministic_rankers, select_shortlist,
    AiRankerReport, AiRankingContext, RankingWeights,
};

/// Orchestrator dials. One instance per service; not per-call knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub filter: FilterConfig,
    pub shortlist_size: usize,
    pub recommendation_count: usize,
    /// Budget for the whole qualitative phase; on expiry the in-flight
    /// AI rankers are dropped and their dimensions degrade to neutral.
    pub ai_phase_deadline: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            shortlist_size: 10,
            recommendation_count: 5,
            ai_phase_deadline: Duration::from_secs(180),
        }
    }
}

/// Failures that prevent producing a meaningful ranking. Everything
/// else degrades to documented neutral behavior inside the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ConsultationError {
    #[error(transparent)]
    Extraction(ExtractionError),
    #[error("LLM unavailable during extraction: {0}")]
    LlmUnavailable(String),
}

/// Pipeline orchestrator: extraction, hard filters, deterministic
/// ranking, shortlist, AI ranking, aggregation. Issues exactly one
/// extraction call and three ranking calls per consultation.
pub struct ConsultationService<L> {
    catalog: Arc<CatalogStore>,
    gateway: Arc<L>,
    geocoder: Arc<Geocoder>,
    extractor: Extractor<L>,
    weights: RankingWeights,
    config: PipelineConfig,
    pricing: PricingTable,
}

impl<L> ConsultationService<L>
where
    L: LlmGateway,
{
    pub fn new(
        catalog: Arc<CatalogStore>,
        gateway: Arc<L>,
        geocoder: Arc<Geocoder>,
        resolver: Arc<LocationResolver>,
        weights: RankingWeights,
        config: PipelineConfig,
        pricing: PricingTable,
    ) -> Self {
        let extractor = Extractor::new(gateway.clone(), resolver);
        Self {
            catalog,
            gateway,
            geocoder,
            extractor,
            weights,
            config,
            pricing,
        }
    }

    /// Run one consultation end to end. The catalog snapshot is taken
    /// once and held for the whole run, so concurrent catalog mutations
    /// never skew a ranking mid-flight.
    pub async fn process(
        &self,
        input: ConsultationInput,
    ) -> Result<ConsultationResult, ConsultationError> {
        let e2e_start = Instant::now();
        let is_audio = input.is_audio();
        let mut state = ConsultationState::Created;
        let mut timings = PhaseTimings::default();
        let mut tokens = TokenCounts::default();
        let mut api_calls = 0u32;

        // Extraction is the only phase whose failure aborts the run.
        self.transition(&mut state, ConsultationState::Extracting);
        let phase_start = Instant::now();
        let (requirements, extraction_usage) =
            self.extractor.extract(&input).await.map_err(|error| match error {
                ExtractionError::Llm(LlmError::Unavailable(reason)) => {
                    ConsultationError::LlmUnavailable(reason)
                }
                ExtractionError::Llm(LlmError::MissingApiKey) => {
                    ConsultationError::LlmUnavailable("no LLM API key configured".to_string())
                }
                other => ConsultationError::Extraction(other),
            })?;
        timings.extraction_secs = phase_start.elapsed().as_secs_f64();
        tokens.extraction_input = extraction_usage.input_tokens;
        tokens.extraction_output = extraction_usage.output_tokens;
        api_calls += 1;

        self.transition(&mut state, ConsultationState::Filtering);
        let phase_start = Instant::now();
        let snapshot = self.catalog.snapshot();
        let filtered = apply_hard_filters(
            snapshot.communities(),
            &requirements,
            &self.config.filter,
        );
        timings.filtering_secs = phase_start.elapsed().as_secs_f64();

        if filtered.is_empty() {
            info!(
                care_level = requirements.care_level.label(),
                "no communities survived the hard filters"
            );
            timings.e2e_total_secs = e2e_start.elapsed().as_secs_f64();
            tokens.finalize();
            return Ok(self.empty_result(requirements, timings, tokens, api_calls, is_audio));
        }

        self.transition(&mut state, ConsultationState::RankingDeterministic);
        let phase_start = Instant::now();
        let deterministic =
            run_deterministic_rankers(&filtered, &requirements, &self.geocoder).await;
        timings.ranking_deterministic_secs = phase_start.elapsed().as_secs_f64();

        self.transition(&mut state, ConsultationState::Shortlisted);
        let shortlist = select_shortlist(
            &filtered,
            &deterministic,
            &self.weights,
            self.config.shortlist_size,
        );

        self.transition(&mut state, ConsultationState::RankingAi);
        let phase_start = Instant::now();
        let context = AiRankingContext {
            requirements: &requirements,
            shortlist: &shortlist,
            deterministic: &deterministic,
        };
        let ai_report = match tokio::time::timeout(
            self.config.ai_phase_deadline,
            run_ai_rankers(self.gateway.as_ref(), &context),
        )
        .await
        {
            Ok(report) => report,
            Err(_) => {
                warn!(
                    deadline_secs = self.config.ai_phase_deadline.as_secs(),
                    "AI ranking phase exceeded its deadline, degrading to neutral"
                );
                AiRankerReport::fully_degraded(&shortlist)
            }
        };
        timings.ranking_ai_secs = phase_start.elapsed().as_secs_f64();
        api_calls += 3;
        for usage in &ai_report.usages {
            tokens.ranking_input += usage.input_tokens;
            tokens.ranking_output += usage.output_tokens;
        }

        self.transition(&mut state, ConsultationState::Aggregating);
        let phase_start = Instant::now();
        let recommendations = aggregate_recommendations(
            &shortlist,
            &deterministic,
            &ai_report,
            &self.weights,
            self.config.recommendation_count,
        );
        timings.aggregation_secs = phase_start.elapsed().as_secs_f64();

        self.transition(&mut state, ConsultationState::Done);
        timings.e2e_total_secs = e2e_start.elapsed().as_secs_f64();
        tokens.finalize();

        let costs = self.costs(&tokens, is_audio);
        info!(
            recommendations = recommendations.len(),
            degraded = ?ai_report.degraded,
            total_secs = timings.e2e_total_secs,
            total_tokens = tokens.total_tokens,
            "consultation complete"
        );

        Ok(ConsultationResult {
            client_info: requirements,
            processed_at: chrono::Utc::now(),
            ranking_weights: self.weights.as_map(),
            recommendations,
            no_matches: false,
            performance_metrics: PerformanceMetrics {
                timings,
                token_counts: tokens,
                costs,
                api_calls,
                ai_ranker_degraded: ai_report.degraded,
            },
            crm_pushed: false,
            consultation_id: None,
        })
    }

    fn transition(&self, state: &mut ConsultationState, next: ConsultationState) {
        info!(from = state.label(), to = next.label(), "consultation state");
        *state = next;
    }

    fn empty_result(
        &self,
        requirements: ClientRequirements,
        timings: PhaseTimings,
        tokens: TokenCounts,
        api_calls: u32,
        is_audio: bool,
    ) -> ConsultationResult {
        let costs = self.costs(&tokens, is_audio);
        ConsultationResult {
            client_info: requirements,
            processed_at: chrono::Utc::now(),
            ranking_weights: self.weights.as_map(),
            recommendations: Vec::new(),
            no_matches: true,
            performance_metrics: PerformanceMetrics {
                timings,
                token_counts: tokens,
                costs,
                api_calls,
                ai_ranker_degraded: Vec::new(),
            },
            crm_pushed: false,
            consultation_id: None,
        }
    }

    fn costs(&self, tokens: &TokenCounts, is_audio: bool) -> super::metrics::CostBreakdown {
        // Extraction input is audio-priced for audio consultations; the
        // ranking prompts are always text.
        let (audio_input, text_input) = if is_audio {
            (tokens.extraction_input, tokens.ranking_input)
        } else {
            (0, tokens.extraction_input + tokens.ranking_input)
        };
        self.pricing
            .breakdown(audio_input, text_input, tokens.total_output_tokens)
    }
}
