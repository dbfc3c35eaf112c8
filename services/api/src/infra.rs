use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::warn;

use placement_ai::config::AppConfig;
use placement_ai::error::AppError;
use placement_ai::workflows::catalog::{CatalogStore, LoadSummary};
use placement_ai::workflows::consultation::crm::{CrmError, CrmPublisher};
use placement_ai::workflows::consultation::gemini::GeminiClient;
use placement_ai::workflows::consultation::location::{
    Geocoder, LocationResolver, NominatimProvider,
};
use placement_ai::workflows::consultation::metrics::PricingTable;
use placement_ai::workflows::consultation::ranking::RankingWeights;
use placement_ai::workflows::consultation::{
    ConsultationResult, ConsultationService, PipelineConfig,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) llm_configured: bool,
}

/// CRM writer that records pushes in memory and hands back sequential
/// consultation ids.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCrmPublisher {
    sequence: Arc<AtomicU64>,
    pushed: Arc<Mutex<Vec<String>>>,
}

impl CrmPublisher for InMemoryCrmPublisher {
    fn publish(&self, _result: &ConsultationResult) -> Result<String, CrmError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let consultation_id = format!("consult-{id:06}");
        self.pushed
            .lock()
            .expect("crm mutex poisoned")
            .push(consultation_id.clone());
        Ok(consultation_id)
    }
}

impl InMemoryCrmPublisher {
    #[cfg(test)]
    pub(crate) fn pushed(&self) -> Vec<String> {
        self.pushed.lock().expect("crm mutex poisoned").clone()
    }
}

/// Everything the server and the one-shot CLI both need wired up.
pub(crate) struct PipelineHandles {
    pub(crate) catalog: Arc<CatalogStore>,
    pub(crate) load_summary: LoadSummary,
    pub(crate) service: Arc<ConsultationService<GeminiClient>>,
    pub(crate) llm_configured: bool,
}

pub(crate) fn build_pipeline(config: &AppConfig) -> Result<PipelineHandles, AppError> {
    let (catalog, load_summary) = CatalogStore::from_path(&config.data.catalog_path)?;
    let catalog = Arc::new(catalog);

    let resolver = match LocationResolver::from_path(&config.data.locations_path) {
        Ok(resolver) => resolver,
        Err(error) => {
            warn!(
                path = %config.data.locations_path.display(),
                %error,
                "locality table unavailable, free-text locations will not resolve"
            );
            LocationResolver::default()
        }
    };

    let gateway = GeminiClient::new(&config.llm)
        .map_err(|error| std::io::Error::other(error.to_string()))?;
    let llm_configured = gateway.is_configured();
    if !llm_configured {
        warn!("GEMINI_API_KEY not set, consultations will fail until it is configured");
    }

    let provider = NominatimProvider::new()
        .map_err(|error| std::io::Error::other(error.to_string()))?;
    let geocoder = Arc::new(Geocoder::new(Arc::new(provider), &config.geocode));

    let service = Arc::new(ConsultationService::new(
        catalog.clone(),
        Arc::new(gateway),
        geocoder,
        Arc::new(resolver),
        RankingWeights::default(),
        PipelineConfig::default(),
        PricingTable::default(),
    ));

    Ok(PipelineHandles {
        catalog,
        load_summary,
        service,
        llm_configured,
    })
}

/// Best-effort MIME guess for an uploaded consultation recording.
pub(crate) fn mime_for_audio_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "audio/mpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_result() -> ConsultationResult {
        let result_json = serde_json::json!({
            "client_info": {"care_level": "Assisted Living", "timeline": "flexible"},
            "ranking_weights": {},
            "recommendations": [],
            "no_matches": false,
            "performance_metrics": {
                "timings": {
                    "extraction_secs": 0.0, "filtering_secs": 0.0,
                    "ranking_deterministic_secs": 0.0, "ranking_ai_secs": 0.0,
                    "aggregation_secs": 0.0, "e2e_total_secs": 0.0
                },
                "token_counts": {
                    "extraction_input": 0, "extraction_output": 0,
                    "ranking_input": 0, "ranking_output": 0,
                    "total_input_tokens": 0, "total_output_tokens": 0, "total_tokens": 0
                },
                "costs": {
                    "audio_input_cost": 0.0, "text_input_cost": 0.0, "output_cost": 0.0,
                    "total_cost": 0.0, "currency": "USD", "pricing_model": "test"
                },
                "api_calls": 0
            },
            "crm_pushed": false
        });
        serde_json::from_value(result_json).expect("result deserializes")
    }

    #[test]
    fn crm_publisher_hands_out_sequential_ids() {
        let publisher = InMemoryCrmPublisher::default();
        let result = empty_result();

        let first = publisher.publish(&result).expect("publish");
        let second = publisher.publish(&result).expect("publish");
        assert_eq!(first, "consult-000001");
        assert_eq!(second, "consult-000002");
        assert_eq!(publisher.pushed().len(), 2);
    }

    #[test]
    fn audio_mime_guesses_follow_extension() {
        assert_eq!(mime_for_audio_path(Path::new("call.wav")), "audio/wav");
        assert_eq!(mime_for_audio_path(Path::new("call.M4A")), "audio/mp4");
        assert_eq!(mime_for_audio_path(Path::new("call.mp3")), "audio/mpeg");
        assert_eq!(mime_for_audio_path(Path::new("call")), "audio/mpeg");
    }
}
