use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::LlmConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const USER_AGENT: &str = "placement-ai/0.1";
/// Backoff schedule for transient provider failures.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

/// LLM gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),
    #[error("LLM provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("LLM returned malformed output: {0}")]
    Malformed(String),
    #[error("no LLM API key configured")]
    MissingApiKey,
}

/// Token and latency accounting for a single provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
}

/// Inline audio attached to a JSON-mode generation request.
#[derive(Debug, Clone)]
pub struct AudioPart {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// One JSON-mode generation request: a prompt, optional inline audio,
/// and a temperature.
#[derive(Debug, Clone)]
pub struct JsonRequest {
    pub prompt: String,
    pub audio: Option<AudioPart>,
    pub temperature: f32,
}

impl JsonRequest {
    pub fn text(prompt: String) -> Self {
        Self {
            prompt,
            audio: None,
            temperature: 0.0,
        }
    }

    pub fn with_audio(prompt: String, bytes: Vec<u8>, mime: String) -> Self {
        Self {
            prompt,
            audio: Some(AudioPart { bytes, mime }),
            temperature: 0.0,
        }
    }
}

/// Parsed JSON payload plus usage accounting.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub payload: Value,
    pub usage: LlmUsage,
}

/// Capability trait in front of the LLM vendor so the pipeline can be
/// exercised with scripted fakes.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate_json(&self, request: &JsonRequest) -> Result<JsonResponse, LlmError>;
}

/// Gemini REST client with JSON response mode and retry-with-backoff.
/// Construction succeeds without a key so the service can boot and
/// report `llm_configured: false`; calls then fail fast.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn attempt(&self, body: &Value) -> Result<(Value, Option<(u64, u64)>), LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(LlmError::Unavailable(format!(
                "provider returned {status}"
            )));
        }
        // Quota exhaustion (429) and other client errors fail fast:
        // retrying inside the same consultation cannot clear them.
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        parse_envelope(&envelope)
    }
}

#[async_trait]
impl LlmGateway for GeminiClient {
    async fn generate_json(&self, request: &JsonRequest) -> Result<JsonResponse, LlmError> {
        let body = request_body(request);
        let started = Instant::now();

        let mut delays = RETRY_DELAYS.iter();
        let (payload, usage) = loop {
            match self.attempt(&body).await {
                Ok(parsed) => break parsed,
                Err(LlmError::Unavailable(reason)) => match delays.next() {
                    Some(delay) => {
                        warn!(%reason, delay_secs = delay.as_secs(), "transient LLM failure, retrying");
                        tokio::time::sleep(*delay).await;
                    }
                    None => return Err(LlmError::Unavailable(reason)),
                },
                Err(other) => return Err(other),
            }
        };

        let (input_tokens, output_tokens) = usage.unwrap_or_else(|| {
            // Provider omitted usage metadata; fall back to the rough
            // four-characters-per-token estimate.
            (
                (request.prompt.len() / 4) as u64,
                (payload.to_string().len() / 4) as u64,
            )
        });

        Ok(JsonResponse {
            payload,
            usage: LlmUsage {
                input_tokens,
                output_tokens,
                latency_ms: started.elapsed().as_millis() as u64,
            },
        })
    }
}

fn request_body(request: &JsonRequest) -> Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    if let Some(audio) = &request.audio {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&audio.bytes);
        parts.push(json!({
            "inline_data": { "mime_type": audio.mime, "data": encoded }
        }));
    }

    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": {
            "temperature": request.temperature,
            "responseMimeType": "application/json",
        },
    })
}

/// Pull the JSON text out of the provider envelope and parse it, along
/// with usage metadata when the provider reports it.
fn parse_envelope(envelope: &Value) -> Result<(Value, Option<(u64, u64)>), LlmError> {
    let text = envelope
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::Malformed("response carried no candidate text".to_string()))?;

    let payload: Value = serde_json::from_str(text)
        .map_err(|e| LlmError::Malformed(format!("candidate text is not JSON: {e}")))?;

    // The model occasionally wraps the object in a one-element array.
    let payload = match payload {
        Value::Array(mut items) if !items.is_empty() => items.remove(0),
        other => other,
    };

    let usage = envelope.get("usageMetadata").map(|metadata| {
        (
            metadata
                .get("promptTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            metadata
                .get("candidatesTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        )
    });

    Ok((payload, usage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parsing_extracts_payload_and_usage() {
        let envelope = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"care_level\": \"Assisted Living\"}" }] }
            }],
            "usageMetadata": { "promptTokenCount": 120, "candidatesTokenCount": 30 }
        });

        let (payload, usage) = parse_envelope(&envelope).expect("parse");
        assert_eq!(payload["care_level"], "Assisted Living");
        assert_eq!(usage, Some((120, 30)));
    }

    #[test]
    fn envelope_parsing_unwraps_single_element_arrays() {
        let envelope = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "[{\"rankings\": []}]" }] }
            }]
        });

        let (payload, usage) = parse_envelope(&envelope).expect("parse");
        assert!(payload.get("rankings").is_some());
        assert_eq!(usage, None);
    }

    #[test]
    fn missing_candidate_text_is_malformed() {
        let envelope = json!({ "candidates": [] });
        assert!(matches!(
            parse_envelope(&envelope),
            Err(LlmError::Malformed(_))
        ));
    }

    #[test]
    fn audio_requests_inline_base64_payloads() {
        let request = JsonRequest::with_audio(
            "extract".to_string(),
            vec![1, 2, 3],
            "audio/mp4".to_string(),
        );
        let body = request_body(&request);
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["mime_type"], "audio/mp4");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }
}
