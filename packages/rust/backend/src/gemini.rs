//! Gemini adapter: `models/{model}:generateContent` over REST.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use distiller_shared::{BackendConfig, DistillerError, Result};

use crate::{ModelBackend, OutputMode};

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("distiller/", env!("CARGO_PKG_VERSION"));

/// Per-request transport timeout. A hung request past this fails its call;
/// there is no other stage-level timeout.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Sampling temperatures by output mode.
const JSON_TEMPERATURE: f32 = 0.2;
const TEXT_TEMPERATURE: f32 = 0.5;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Gemini model backend.
pub struct GeminiBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_concurrency: usize,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DistillerError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_concurrency: config.max_concurrency,
        })
    }

    fn request_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

#[async_trait::async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(
        &self,
        prompt: &str,
        mode: OutputMode,
        system: Option<&str>,
    ) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: system.map(|text| Content {
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                response_mime_type: match mode {
                    OutputMode::Json => Some("application/json"),
                    OutputMode::Text => None,
                },
                temperature: match mode {
                    OutputMode::Json => JSON_TEMPERATURE,
                    OutputMode::Text => TEXT_TEMPERATURE,
                },
            },
        };

        let url = self.request_url();
        debug!(model = %self.model, ?mode, "gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DistillerError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DistillerError::Backend(format!(
                "gemini HTTP {status}: {}",
                crate::response::truncate_chars(&detail, 300)
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| DistillerError::Backend(format!("gemini response decode: {e}")))?;

        let text: String = parsed
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(DistillerError::Backend(
                "gemini returned an empty completion".into(),
            ));
        }

        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

#[cfg(test)]
mod gemini_tests {
    use super::*;
    use distiller_shared::Provider;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: &str) -> BackendConfig {
        BackendConfig {
            provider: Provider::Gemini,
            api_key: "test-key".into(),
            endpoint: endpoint.into(),
            model: "gemini-2.5-flash".into(),
            max_concurrency: 4,
        }
    }

    fn completion_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [
                { "content": { "parts": [ { "text": text } ] } }
            ]
        })
    }

    #[tokio::test]
    async fn sends_json_mode_request_and_extracts_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_string_contains("application/json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body(r#"{"categories":[]}"#)),
            )
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(&test_config(&server.uri())).unwrap();
        let text = backend
            .generate("discover", OutputMode::Json, None)
            .await
            .unwrap();
        assert_eq!(text, r#"{"categories":[]}"#);
    }

    #[tokio::test]
    async fn text_mode_omits_response_mime_type() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body("# Article")),
            )
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(&test_config(&server.uri())).unwrap();
        let text = backend
            .generate("synthesize", OutputMode::Text, Some("be terse"))
            .await
            .unwrap();
        assert_eq!(text, "# Article");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body).to_string();
        assert!(!body.contains("responseMimeType"));
        assert!(body.contains("systemInstruction"));
    }

    #[tokio::test]
    async fn non_success_status_is_backend_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(&test_config(&server.uri())).unwrap();
        let err = backend
            .generate("discover", OutputMode::Json, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DistillerError::Backend(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn empty_candidates_is_backend_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(&test_config(&server.uri())).unwrap();
        let err = backend
            .generate("discover", OutputMode::Json, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty completion"));
    }
}
