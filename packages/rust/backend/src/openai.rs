//! OpenAI-compatible adapter: `chat/completions` with JSON response format.
//!
//! Also covers Azure OpenAI deployments: an endpoint whose path contains
//! `/openai/deployments/<name>` is posted to as-is, authenticated with the
//! `api-key` header instead of a bearer token, and `<name>` overrides the
//! configured model.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use distiller_shared::{BackendConfig, DistillerError, Result};

use crate::{ModelBackend, OutputMode};

const USER_AGENT: &str = concat!("distiller/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    response_format: ResponseFormat,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// OpenAI (or Azure OpenAI / OpenAI-compatible) model backend.
pub struct OpenAiBackend {
    client: Client,
    /// Full request URL, `chat/completions` included.
    url: String,
    api_key: String,
    model: String,
    /// Azure-style deployment endpoint: use `api-key` auth.
    deployment: bool,
    max_concurrency: usize,
}

impl OpenAiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DistillerError::Network(format!("failed to build HTTP client: {e}")))?;

        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let deployment_model = deployment_name(&endpoint);
        let deployment = deployment_model.is_some();

        // Deployment URLs already address a concrete route; plain endpoints
        // get the standard path appended.
        let url = if deployment {
            endpoint
        } else {
            format!("{endpoint}/chat/completions")
        };

        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
            model: deployment_model.unwrap_or_else(|| config.model.clone()),
            deployment,
            max_concurrency: config.max_concurrency,
        })
    }
}

/// Extract the deployment name from an Azure-style endpoint path
/// (`…/openai/deployments/<name>/…`), if present.
fn deployment_name(endpoint: &str) -> Option<String> {
    let url = Url::parse(endpoint).ok()?;
    let segments: Vec<&str> = url.path_segments()?.collect();
    let at = segments.iter().position(|s| *s == "deployments")?;
    if at == 0 || segments[at - 1] != "openai" {
        return None;
    }
    segments
        .get(at + 1)
        .filter(|name| !name.is_empty())
        .map(|name| (*name).to_string())
}

#[async_trait::async_trait]
impl ModelBackend for OpenAiBackend {
    async fn generate(
        &self,
        prompt: &str,
        mode: OutputMode,
        system: Option<&str>,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(content) = system {
            messages.push(Message {
                role: "system",
                content,
            });
        }
        messages.push(Message {
            role: "user",
            content: prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            response_format: ResponseFormat {
                kind: match mode {
                    OutputMode::Json => "json_object",
                    OutputMode::Text => "text",
                },
            },
            stream: false,
        };

        debug!(model = %self.model, ?mode, deployment = self.deployment, "openai request");

        let request = self.client.post(&self.url).json(&body);
        let request = if self.deployment {
            request.header("api-key", &self.api_key)
        } else {
            request.bearer_auth(&self.api_key)
        };

        let response = request
            .send()
            .await
            .map_err(|e| DistillerError::Network(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DistillerError::Backend(format!(
                "openai HTTP {status}: {}",
                crate::response::truncate_chars(&detail, 300)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DistillerError::Backend(format!("openai response decode: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| DistillerError::Backend("openai returned an empty completion".into()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

#[cfg(test)]
mod openai_tests {
    use super::*;
    use distiller_shared::Provider;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: &str) -> BackendConfig {
        BackendConfig {
            provider: Provider::OpenAi,
            api_key: "sk-test".into(),
            endpoint: endpoint.into(),
            model: "gpt-4.1-nano".into(),
            max_concurrency: 4,
        }
    }

    fn completion_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": content } }
            ]
        })
    }

    #[test]
    fn deployment_name_extraction() {
        assert_eq!(
            deployment_name(
                "https://acme.openai.azure.com/openai/deployments/gpt4o/chat/completions"
            ),
            Some("gpt4o".to_string())
        );
        assert_eq!(deployment_name("https://api.openai.com/v1"), None);
        assert_eq!(deployment_name("not a url"), None);
    }

    #[tokio::test]
    async fn plain_endpoint_uses_bearer_and_standard_path() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_string_contains("json_object"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body(r#"{"assignments":[]}"#)),
            )
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new(&test_config(&server.uri())).unwrap();
        let text = backend
            .generate("classify", OutputMode::Json, None)
            .await
            .unwrap();
        assert_eq!(text, r#"{"assignments":[]}"#);
    }

    #[tokio::test]
    async fn deployment_endpoint_uses_api_key_header_and_model_override() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt4o/chat/completions"))
            .and(header("api-key", "sk-test"))
            .and(body_string_contains(r#""model":"gpt4o""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .mount(&server)
            .await;

        let endpoint = format!("{}/openai/deployments/gpt4o/chat/completions", server.uri());
        let backend = OpenAiBackend::new(&test_config(&endpoint)).unwrap();
        let text = backend
            .generate("classify", OutputMode::Text, None)
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn system_prompt_becomes_system_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(header_exists("authorization"))
            .and(body_string_contains(r#""role":"system""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new(&test_config(&server.uri())).unwrap();
        backend
            .generate("classify", OutputMode::Text, Some("be terse"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn error_status_surfaces_detail() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new(&test_config(&server.uri())).unwrap();
        let err = backend
            .generate("classify", OutputMode::Json, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DistillerError::Backend(_)));
        assert!(err.to_string().contains("401"));
    }
}
