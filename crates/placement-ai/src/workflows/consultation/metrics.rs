use serde::{Deserialize, Serialize};

/// Wall time spent in each pipeline phase, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub extraction_secs: f64,
    pub filtering_secs: f64,
    pub ranking_deterministic_secs: f64,
    pub ranking_ai_secs: f64,
    pub aggregation_secs: f64,
    pub e2e_total_secs: f64,
}

/// Token traffic per consultation, split by call site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub extraction_input: u64,
    pub extraction_output: u64,
    pub ranking_input: u64,
    pub ranking_output: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenCounts {
    pub fn finalize(&mut self) {
        self.total_input_tokens = self.extraction_input + self.ranking_input;
        self.total_output_tokens = self.extraction_output + self.ranking_output;
        self.total_tokens = self.total_input_tokens + self.total_output_tokens;
    }
}

/// USD estimate for the consultation's LLM traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub audio_input_cost: f64,
    pub text_input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub currency: String,
    pub pricing_model: String,
}

/// Per-million-token USD rates, held in configuration so price changes
/// never touch pipeline code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    pub audio_input_per_million: f64,
    pub text_input_per_million: f64,
    pub output_per_million: f64,
    pub model_label: String,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            audio_input_per_million: 1.00,
            text_input_per_million: 0.30,
            output_per_million: 2.50,
            model_label: "Gemini 2.5 Flash (2025)".to_string(),
        }
    }
}

impl PricingTable {
    pub fn breakdown(
        &self,
        audio_input_tokens: u64,
        text_input_tokens: u64,
        output_tokens: u64,
    ) -> CostBreakdown {
        let audio_input_cost =
            (audio_input_tokens as f64 / 1_000_000.0) * self.audio_input_per_million;
        let text_input_cost =
            (text_input_tokens as f64 / 1_000_000.0) * self.text_input_per_million;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * self.output_per_million;

        CostBreakdown {
            audio_input_cost: round_micro(audio_input_cost),
            text_input_cost: round_micro(text_input_cost),
            output_cost: round_micro(output_cost),
            total_cost: round_micro(audio_input_cost + text_input_cost + output_cost),
            currency: "USD".to_string(),
            pricing_model: self.model_label.clone(),
        }
    }
}

fn round_micro(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Timings, token counts, cost estimate, and degradation flags for one
/// consultation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub timings: PhaseTimings,
    pub token_counts: TokenCounts,
    pub costs: CostBreakdown,
    pub api_calls: u32,
    #[serde(default)]
    pub ai_ranker_degraded: Vec<String>,
}
