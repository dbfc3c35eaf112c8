use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::workflows::catalog::{apartment_category_for, ApartmentCategory, CareLevel};

use super::domain::{ClientRequirements, ConsultationInput, Timeline};
use super::gemini::{JsonRequest, LlmError, LlmGateway, LlmUsage};
use super::location::LocationResolver;

/// Extraction failures. Missing care level is unrecoverable: no
/// meaningful ranking can happen without it.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("care level missing or outside the closed set: {0:?}")]
    MissingCareLevel(Option<String>),
    #[error("extraction payload did not match the schema: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Debug, Default, Deserialize)]
struct ExtractedSpecialNeeds {
    #[serde(default)]
    pets: Option<bool>,
    #[serde(default)]
    second_person: Option<bool>,
    #[serde(default)]
    apartment_type_preference: Option<String>,
    #[serde(default)]
    other: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractedPayload {
    #[serde(default)]
    care_level: Option<String>,
    #[serde(default)]
    enhanced: Option<bool>,
    #[serde(default)]
    enriched: Option<bool>,
    #[serde(default, deserialize_with = "lenient_number")]
    budget: Option<f64>,
    #[serde(default)]
    timeline: Option<String>,
    #[serde(default)]
    location_preference: Option<String>,
    #[serde(default)]
    special_needs: Option<ExtractedSpecialNeeds>,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// Budget occasionally arrives as "$6,500" despite the schema; accept
/// numbers and numeric strings, reject the rest quietly.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => {
            let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
            cleaned.trim().parse::<f64>().ok()
        }
        _ => None,
    }))
}

/// Turns one consultation (audio or transcript) into structured client
/// requirements with a single LLM call.
pub struct Extractor<L> {
    gateway: Arc<L>,
    resolver: Arc<LocationResolver>,
}

impl<L> Extractor<L>
where
    L: LlmGateway,
{
    pub fn new(gateway: Arc<L>, resolver: Arc<LocationResolver>) -> Self {
        Self { gateway, resolver }
    }

    pub async fn extract(
        &self,
        input: &ConsultationInput,
    ) -> Result<(ClientRequirements, LlmUsage), ExtractionError> {
        let request = match input {
            ConsultationInput::Audio { bytes, mime } => {
                JsonRequest::with_audio(extraction_prompt(), bytes.clone(), mime.clone())
            }
            ConsultationInput::Text(text) => JsonRequest::text(format!(
                "{}\n\nCLIENT CONVERSATION:\n{}",
                extraction_prompt(),
                text
            )),
        };

        let response = self.gateway.generate_json(&request).await?;
        let requirements = self.requirements_from_payload(response.payload)?;
        Ok((requirements, response.usage))
    }

    fn requirements_from_payload(
        &self,
        payload: Value,
    ) -> Result<ClientRequirements, ExtractionError> {
        let extracted: ExtractedPayload = serde_json::from_value(payload)
            .map_err(|e| ExtractionError::InvalidPayload(e.to_string()))?;

        let care_level = extracted
            .care_level
            .as_deref()
            .and_then(CareLevel::parse)
            .ok_or_else(|| ExtractionError::MissingCareLevel(extracted.care_level.clone()))?;

        let timeline = extracted
            .timeline
            .as_deref()
            .and_then(Timeline::parse)
            .unwrap_or(Timeline::Flexible);

        let special_needs = extracted.special_needs.unwrap_or_default();
        let apartment_preference = special_needs
            .apartment_type_preference
            .as_deref()
            .map(|raw| apartment_category_for(Some(raw)))
            .filter(|category| *category != ApartmentCategory::Unknown);

        let location_preference = extracted
            .location_preference
            .filter(|raw| !raw.trim().is_empty() && !raw.trim().eq_ignore_ascii_case("null"));
        let resolved_zip = location_preference
            .as_deref()
            .and_then(|raw| self.resolver.resolve(raw));

        let special_notes = match (special_needs.other, extracted.notes) {
            (Some(other), Some(notes)) => Some(format!("{other}. {notes}")),
            (Some(other), None) => Some(other),
            (None, notes) => notes,
        };

        Ok(ClientRequirements {
            client_name: extracted.client_name,
            care_level,
            budget_monthly: extracted.budget.filter(|budget| *budget > 0.0),
            timeline,
            location_preference,
            resolved_zip,
            needs_enhanced: extracted.enhanced.unwrap_or(false),
            needs_enriched: extracted.enriched.unwrap_or(false),
            is_couple: special_needs.second_person.unwrap_or(false),
            has_pet: special_needs.pets.unwrap_or(false),
            apartment_preference,
            special_notes,
        })
    }
}

fn extraction_prompt() -> String {
    r#"You are analyzing a senior living client intake conversation (either audio or text).
Extract the following information and return it as JSON:

{
  "care_level": "string (must be exactly one of: 'Independent Living', 'Assisted Living', 'Memory Care')",
  "enhanced": "boolean (true if they need Enhanced Assisted Living - higher medical care, nursing support, diabetes management, oxygen, etc.)",
  "enriched": "boolean (true if they need Enriched Housing Program - apartment-style with support services, meals, housekeeping, transportation)",
  "budget": "number (maximum monthly budget in dollars, extract just the number. If not mentioned, use null)",
  "timeline": "string (must be exactly one of: 'immediate', 'near-term', 'flexible')",
  "location_preference": "string (preferred ZIP code as 5-digit string OR city/area description like 'West side of Rochester'. If not mentioned, use null)",
  "special_needs": {
    "pets": "boolean (true if they have pets)",
    "second_person": "boolean (true if a spouse or partner will move in too)",
    "apartment_type_preference": "string (if mentioned, e.g., 'studio', '1 bedroom', '2 bedroom')",
    "other": "string (any other special requirements)"
  },
  "client_name": "string (if mentioned, otherwise null)",
  "notes": "string (any additional important information)"
}

IMPORTANT DEFINITIONS:
- "Independent Living": Client is largely self-sufficient, needs minimal assistance
- "Assisted Living": Client needs help with daily activities (bathing, medication, meals)
- "Memory Care": Client has dementia/Alzheimer's requiring specialized care
- "Enhanced": Higher level medical care with nursing support (diabetes management, oxygen, injectable meds, etc.)
- "Enriched": Apartment-style supportive services (meals, housekeeping, transportation)
- "immediate": Needs to move in within a month
- "near-term": Needs to move in within one to three months
- "flexible": Timeline is three or more months out, or unspecified

CRITICAL RULES:
1. For "care_level", use EXACTLY one of the three options listed
2. For "timeline", use EXACTLY one of: "immediate", "near-term", or "flexible"
3. For "budget", extract ONLY the numeric value (no $, no commas)
4. For "location_preference", prefer a 5-digit ZIP code when one is mentioned; otherwise keep the client's own area description verbatim
5. If something is not mentioned, use null (not "unknown" or empty string)
6. Return ONLY valid JSON, no markdown formatting, no extra text

Extract all available information from the conversation."#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    use crate::workflows::consultation::gemini::JsonResponse;

    struct ScriptedGateway {
        responses: Mutex<Vec<Result<Value, LlmError>>>,
    }

    impl ScriptedGateway {
        fn returning(payload: Value) -> Self {
            Self {
                responses: Mutex::new(vec![Ok(payload)]),
            }
        }
    }

    #[async_trait]
    impl LlmGateway for ScriptedGateway {
        async fn generate_json(&self, _request: &JsonRequest) -> Result<JsonResponse, LlmError> {
            let next = self
                .responses
                .lock()
                .expect("lock")
                .pop()
                .expect("scripted response available");
            next.map(|payload| JsonResponse {
                payload,
                usage: LlmUsage {
                    input_tokens: 100,
                    output_tokens: 40,
                    latency_ms: 5,
                },
            })
        }
    }

    fn resolver() -> Arc<LocationResolver> {
        Arc::new(LocationResolver::from_entries([
            ("west side of rochester", "14611"),
            ("pittsford", "14534"),
        ]))
    }

    fn extractor(payload: Value) -> Extractor<ScriptedGateway> {
        Extractor::new(Arc::new(ScriptedGateway::returning(payload)), resolver())
    }

    #[tokio::test]
    async fn extracts_full_requirements_and_resolves_location() {
        let payload = json!({
            "care_level": "Assisted Living",
            "enhanced": true,
            "enriched": false,
            "budget": "6,500",
            "timeline": "near-term",
            "location_preference": "West side of Rochester",
            "special_needs": {
                "pets": true,
                "second_person": false,
                "apartment_type_preference": "1 bedroom",
                "other": "diabetic care"
            },
            "client_name": "Margaret",
            "notes": "recent fall, wants a safer environment"
        });

        let (requirements, usage) = extractor(payload)
            .extract(&ConsultationInput::Text("hello".to_string()))
            .await
            .expect("extraction succeeds");

        assert_eq!(requirements.care_level, CareLevel::AssistedLiving);
        assert_eq!(requirements.budget_monthly, Some(6500.0));
        assert_eq!(requirements.timeline, Timeline::NearTerm);
        assert_eq!(requirements.resolved_zip.as_deref(), Some("14611"));
        assert!(requirements.needs_enhanced);
        assert!(requirements.has_pet);
        assert_eq!(
            requirements.apartment_preference,
            Some(ApartmentCategory::OneBedroom)
        );
        assert!(requirements
            .special_notes
            .as_deref()
            .expect("notes")
            .contains("diabetic care"));
        assert_eq!(usage.input_tokens, 100);
    }

    #[tokio::test]
    async fn missing_care_level_is_fatal() {
        let payload = json!({ "budget": 5000, "timeline": "flexible" });
        let error = extractor(payload)
            .extract(&ConsultationInput::Text("hello".to_string()))
            .await
            .expect_err("care level required");
        assert!(matches!(error, ExtractionError::MissingCareLevel(None)));
    }

    #[tokio::test]
    async fn off_set_care_level_is_fatal() {
        let payload = json!({ "care_level": "Day Spa" });
        let error = extractor(payload)
            .extract(&ConsultationInput::Text("hello".to_string()))
            .await
            .expect_err("care level outside closed set");
        assert!(matches!(
            error,
            ExtractionError::MissingCareLevel(Some(raw)) if raw == "Day Spa"
        ));
    }

    #[tokio::test]
    async fn missing_budget_and_location_merely_degrade() {
        let payload = json!({
            "care_level": "Memory Care",
            "timeline": "immediate",
            "location_preference": null
        });

        let (requirements, _) = extractor(payload)
            .extract(&ConsultationInput::Text("hello".to_string()))
            .await
            .expect("extraction succeeds");

        assert_eq!(requirements.care_level, CareLevel::MemoryCare);
        assert!(requirements.budget_monthly.is_none());
        assert!(requirements.resolved_zip.is_none());
    }

    #[tokio::test]
    async fn zip_location_passes_straight_through() {
        let payload = json!({
            "care_level": "Independent Living",
            "timeline": "flexible",
            "location_preference": "14534"
        });

        let (requirements, _) = extractor(payload)
            .extract(&ConsultationInput::Text("hello".to_string()))
            .await
            .expect("extraction succeeds");
        assert_eq!(requirements.resolved_zip.as_deref(), Some("14534"));
    }
}
