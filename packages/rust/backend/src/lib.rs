//! Pluggable model backends for the distillation pipeline.
//!
//! Every generative call goes through the [`ModelBackend`] capability trait.
//! Adapters ([`GeminiBackend`], [`OpenAiBackend`]) implement only the
//! low-level `generate` surface; the capability methods (discovery,
//! classification fan-out, synthesis, prompt optimization) are provided by
//! the trait so their semantics are identical across providers and the
//! orchestrator is never provider-aware.

pub mod response;

mod gemini;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use distiller_shared::{
    Assignment, BackendConfig, Category, Provider, Result, SubAssignment, SubCategory,
};

pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;

/// How the model is asked to shape its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Structured JSON (provider JSON mode where available).
    Json,
    /// Free-text markdown.
    Text,
}

/// Per-record completion callback used by classification fan-out. Receives
/// the record's 0-based index; completions may arrive out of order.
pub type ProgressFn<'a> = &'a (dyn Fn(usize) + Send + Sync);

/// Envelope for classification responses. The `assignments` field being
/// absent is distinct from it being an empty array: absent means the call
/// produced nothing usable (`None` slot), empty means the classifier found
/// no fitting category (`Some(vec![])`).
#[derive(Debug, serde::Deserialize)]
struct AssignmentsEnvelope<T> {
    assignments: Option<Vec<T>>,
}

#[derive(Debug, serde::Deserialize)]
struct CategoriesEnvelope {
    categories: Vec<Category>,
}

#[derive(Debug, serde::Deserialize)]
struct SubCategoriesEnvelope {
    subcategories: Vec<SubCategory>,
}

/// Capability-abstracted LLM client consumed by every pipeline stage.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Issue one completion request.
    async fn generate(
        &self,
        prompt: &str,
        mode: OutputMode,
        system: Option<&str>,
    ) -> Result<String>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Upper bound on concurrent classification requests.
    fn max_concurrency(&self) -> usize;

    /// Discover a top-level taxonomy. A response without a `categories`
    /// array is a hard failure.
    async fn discover_categories(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Vec<Category>> {
        let text = self.generate(prompt, OutputMode::Json, system).await?;
        let envelope: CategoriesEnvelope = response::parse_json_payload(&text)?;
        Ok(envelope.categories)
    }

    /// Discover a sub-taxonomy scoped to one parent category.
    async fn discover_subcategories(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Vec<SubCategory>> {
        let text = self.generate(prompt, OutputMode::Json, system).await?;
        let envelope: SubCategoriesEnvelope = response::parse_json_payload(&text)?;
        Ok(envelope.subcategories)
    }

    /// Classify every prompt concurrently (fan-out), awaiting all before
    /// returning (fan-in). The output has one slot per prompt, in prompt
    /// order. Per-item failure is caught locally and becomes `None`; the
    /// progress callback fires for every index regardless of outcome, and
    /// the join itself cannot fail.
    async fn classify(
        &self,
        prompts: &[String],
        on_progress: ProgressFn<'_>,
        system: Option<&str>,
    ) -> Vec<Option<Vec<Assignment>>> {
        classify_batch(self, prompts, on_progress, system).await
    }

    /// Sub-category variant of [`ModelBackend::classify`].
    async fn classify_to_subcategories(
        &self,
        prompts: &[String],
        on_progress: ProgressFn<'_>,
        system: Option<&str>,
    ) -> Vec<Option<Vec<SubAssignment>>> {
        classify_batch(self, prompts, on_progress, system).await
    }

    /// Produce one markdown knowledge article.
    async fn synthesize(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let text = self.generate(prompt, OutputMode::Text, system).await?;
        Ok(response::parse_markdown_payload(&text))
    }

    /// Rewrite a stage prompt for the given domain. Failure here is a
    /// stage-level failure for the caller, never caught per-record.
    async fn optimize_prompt(
        &self,
        prompt: &str,
        domain: &str,
        system: Option<&str>,
    ) -> Result<String> {
        let meta = distiller_prompts::prompt_optimization(prompt, domain);
        let text = self.generate(&meta, OutputMode::Text, system).await?;
        Ok(response::parse_markdown_payload(&text))
    }
}

/// Bounded, order-preserving classification fan-out shared by both
/// classification levels. At most `max_concurrency` requests are in flight;
/// output order matches prompt order regardless of completion order.
async fn classify_batch<B, T>(
    backend: &B,
    prompts: &[String],
    on_progress: ProgressFn<'_>,
    system: Option<&str>,
) -> Vec<Option<Vec<T>>>
where
    B: ModelBackend + ?Sized,
    T: DeserializeOwned + Send,
{
    let limit = backend.max_concurrency().max(1);

    async fn classify_one<B, T>(
        backend: &B,
        index: usize,
        prompt: &str,
        on_progress: ProgressFn<'_>,
        system: Option<&str>,
    ) -> Option<Vec<T>>
    where
        B: ModelBackend + ?Sized,
        T: DeserializeOwned + Send,
    {
        let parsed = match backend.generate(prompt, OutputMode::Json, system).await {
            Ok(text) => response::parse_json_payload::<AssignmentsEnvelope<T>>(&text)
                .map(|envelope| envelope.assignments),
            Err(e) => Err(e),
        };

        let slot = match parsed {
            Ok(assignments) => assignments,
            Err(e) => {
                warn!(index, error = %e, "classification failed for record");
                None
            }
        };

        on_progress(index);
        slot
    }

    let mut futures_list: Vec<
        std::pin::Pin<Box<dyn std::future::Future<Output = Option<Vec<T>>> + Send + '_>>,
    > = Vec::with_capacity(prompts.len());
    for (index, prompt) in prompts.iter().enumerate() {
        futures_list.push(Box::pin(classify_one(
            backend,
            index,
            prompt,
            on_progress,
            system,
        )));
    }

    futures::stream::iter(futures_list)
        .buffered(limit)
        .collect()
        .await
}

/// Instantiate the configured backend. The config is resolved once per run
/// and read-only thereafter.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn ModelBackend>> {
    debug!(provider = %config.provider, model = %config.model, "creating model backend");
    match config.provider {
        Provider::Gemini => Ok(Arc::new(GeminiBackend::new(config)?)),
        Provider::OpenAi => Ok(Arc::new(OpenAiBackend::new(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted backend: responds per prompt from a lookup, exercising the
    /// real provided-method machinery.
    struct ScriptedBackend {
        replies: Vec<Result<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn generate(
            &self,
            prompt: &str,
            _mode: OutputMode,
            _system: Option<&str>,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Prompts are tagged "#<n>" so replies can be scripted per index.
            let index = prompt
                .rsplit('#')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0);
            match &self.replies[index] {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(distiller_shared::DistillerError::Network("scripted".into())),
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }

        fn max_concurrency(&self) -> usize {
            2
        }
    }

    fn assignment_json(category: &str) -> String {
        format!(
            r#"{{"assignments":[{{"category":"{category}","reasoning":"fits"}}]}}"#
        )
    }

    #[tokio::test]
    async fn classify_preserves_order_and_isolates_failure() {
        let backend = ScriptedBackend::new(vec![
            Ok(assignment_json("Access Denied")),
            Err(distiller_shared::DistillerError::Network("boom".into())),
            Ok(assignment_json("Login Failure")),
            Ok(r#"{"assignments":[]}"#.into()),
        ]);

        let prompts: Vec<String> = (0..4).map(|i| format!("record #{i}")).collect();
        let seen = Mutex::new(Vec::new());
        let on_progress = |i: usize| seen.lock().unwrap().push(i);

        let results = backend.classify(&prompts, &on_progress, None).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap()[0].category, "Access Denied");
        assert!(results[1].is_none());
        assert_eq!(results[2].as_ref().unwrap()[0].category, "Login Failure");
        // Empty array is a real result, not a failure.
        assert_eq!(results[3].as_ref().unwrap().len(), 0);

        // Progress fired once per record, failures included.
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn classify_treats_missing_assignments_field_as_null() {
        let backend = ScriptedBackend::new(vec![Ok(r#"{"notes":"no field"}"#.into())]);
        let prompts = vec!["record #0".to_string()];
        let results = backend.classify(&prompts, &|_| {}, None).await;
        assert_eq!(results, vec![None]);
    }

    #[tokio::test]
    async fn discover_categories_rejects_missing_field() {
        let backend = ScriptedBackend::new(vec![Ok(r#"{"wrong":"shape"}"#.into())]);
        let err = backend
            .discover_categories("record #0", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            distiller_shared::DistillerError::MalformedResponse { .. }
        ));
    }

    #[tokio::test]
    async fn discover_categories_unwraps_fenced_json() {
        let fenced = "```json\n{\"categories\":[{\"name\":\"Access Denied\",\"description\":\"d\",\"identifying_patterns\":[]}]}\n```";
        let backend = ScriptedBackend::new(vec![Ok(fenced.into())]);
        let categories = backend.discover_categories("record #0", None).await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "Access Denied");
    }

    #[tokio::test]
    async fn synthesize_strips_markdown_fence() {
        let backend =
            ScriptedBackend::new(vec![Ok("```markdown\n# Article\n\nBody.\n```".into())]);
        let article = backend.synthesize("record #0", None).await.unwrap();
        assert_eq!(article, "# Article\n\nBody.");
    }
}
