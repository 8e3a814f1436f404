//! End-to-end distillation pipeline: raw text → split → discover →
//! classify → (expand) → synthesize → knowledge articles.
//!
//! The [`Distiller`] owns the pipeline state machine and all partial
//! results. Stages hand their outputs forward by value; nothing is shared
//! mutable across stages, and progress reporting is the only cross-call
//! shared state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use distiller_backend::ModelBackend;
use distiller_shared::{
    AppConfig, Category, DistillerError, KnowledgeArticle, PipelineState, ProcessingMode,
    ProgressEvent, Record, Result,
};

use crate::classify::{Bucket, RoutingOutcome, route_records};
use crate::expansion::{Expansion, expand_category};
use crate::splitter;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime pipeline options — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct DistillOptions {
    /// Record separator within the raw input.
    pub separator: String,
    /// Domain label used to specialize prompts.
    pub domain: String,
    /// Prompt handling mode.
    pub mode: ProcessingMode,
    /// Maximum records sampled (from the front) for discovery calls.
    pub sample_cap: usize,
    /// Bucket size above which a category is expanded into sub-categories.
    pub subcategory_threshold: usize,
}

impl From<&AppConfig> for DistillOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            separator: config.defaults.separator.clone(),
            domain: config.defaults.domain.clone(),
            mode: config.defaults.mode,
            sample_cap: config.pipeline.sample_cap,
            subcategory_threshold: config.pipeline.subcategory_threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress sink for a pipeline run. The orchestrator is the sole emitter;
/// a UI subscribes by implementing this. Per-record completions arrive out
/// of order, so events are index-keyed and the last event for a conceptual
/// step wins for display purposes.
pub trait DistillProgress: Send + Sync {
    /// Called on every state machine transition.
    fn state_changed(&self, state: PipelineState);
    /// Called with each progress update within the current state.
    fn event(&self, event: &ProgressEvent);
}

/// No-op progress sink for headless/test usage.
pub struct SilentProgress;

impl DistillProgress for SilentProgress {
    fn state_changed(&self, _state: PipelineState) {}
    fn event(&self, _event: &ProgressEvent) {}
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct DistillSummary {
    /// Number of records after splitting.
    pub record_count: usize,
    /// Number of top-level categories discovered.
    pub category_count: usize,
    /// Number of knowledge articles produced.
    pub article_count: usize,
    /// Records that received no usable top-level assignment.
    pub unclassified: usize,
    /// Total elapsed time.
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Distiller
// ---------------------------------------------------------------------------

/// A leaf ready for synthesis: either a whole top-level bucket, a
/// large-category fallback, or one sub-category's bucket.
struct LeafBucket {
    /// Name carried by the resulting article (possibly composite).
    article_name: String,
    /// Name used inside the synthesis prompt.
    prompt_name: String,
    description: String,
    records: Vec<Record>,
}

/// Pipeline session. Owns the state machine and retains partial results
/// (discovered categories, produced articles) across an error for display;
/// a new `run` call resets them.
pub struct Distiller {
    backend: Arc<dyn ModelBackend>,
    options: DistillOptions,
    state: PipelineState,
    categories: Vec<Category>,
    articles: Vec<KnowledgeArticle>,
    error: Option<String>,
    record_count: usize,
    unclassified: usize,
}

impl Distiller {
    pub fn new(backend: Arc<dyn ModelBackend>, options: DistillOptions) -> Self {
        Self {
            backend,
            options,
            state: PipelineState::Idle,
            categories: Vec::new(),
            articles: Vec::new(),
            error: None,
            record_count: 0,
            unclassified: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Top-level categories discovered so far. Empty until discovery
    /// succeeds; retained after an error.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Articles produced so far, in leaf order.
    pub fn articles(&self) -> &[KnowledgeArticle] {
        &self.articles
    }

    /// The surfaced error message, if the last run failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Run the full pipeline over `raw_text`.
    ///
    /// On error the distiller transitions to [`PipelineState::Error`],
    /// keeps whatever partial results exist, and returns the error.
    #[instrument(skip_all, fields(backend = self.backend.name(), mode = %self.options.mode))]
    pub async fn run(
        &mut self,
        raw_text: &str,
        progress: &dyn DistillProgress,
    ) -> Result<DistillSummary> {
        let started = Instant::now();
        self.reset(progress);

        match self.execute(raw_text, progress).await {
            Ok(()) => {
                self.set_state(PipelineState::Done, progress);
                let summary = DistillSummary {
                    record_count: self.record_count,
                    category_count: self.categories.len(),
                    article_count: self.articles.len(),
                    unclassified: self.unclassified,
                    elapsed: started.elapsed(),
                };
                info!(
                    records = summary.record_count,
                    categories = summary.category_count,
                    articles = summary.article_count,
                    unclassified = summary.unclassified,
                    elapsed_ms = summary.elapsed.as_millis(),
                    "distillation complete"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "distillation failed");
                self.error = Some(e.to_string());
                self.set_state(PipelineState::Error, progress);
                Err(e)
            }
        }
    }

    /// Reset toward a fresh run. `Done`/`Error` are terminal only until the
    /// next run request, which lands back here.
    fn reset(&mut self, progress: &dyn DistillProgress) {
        self.categories.clear();
        self.articles.clear();
        self.error = None;
        self.record_count = 0;
        self.unclassified = 0;
        self.state = PipelineState::Idle;
        progress.state_changed(PipelineState::Idle);
    }

    fn set_state(&mut self, state: PipelineState, progress: &dyn DistillProgress) {
        if self.state != state {
            info!(from = %self.state, to = %state, "pipeline state transition");
            self.state = state;
            progress.state_changed(state);
        }
    }

    async fn execute(&mut self, raw_text: &str, progress: &dyn DistillProgress) -> Result<()> {
        // Splitting failures are fatal before the pipeline proper: the run
        // never enters the discovering state.
        let records = splitter::split_records(raw_text, &self.options.separator)?;
        self.record_count = records.len();
        info!(records = records.len(), "input split into records");

        // --- Discovery ---
        self.set_state(PipelineState::Discovering, progress);
        progress.event(&ProgressEvent::new(0, 1, "Discovering categories..."));

        let sample = &records[..records.len().min(self.options.sample_cap)];
        let prompt = distiller_prompts::category_discovery(&self.options.domain, sample);
        let prompt = maybe_optimize(self.backend.as_ref(), &self.options, prompt).await?;
        let categories = self.backend.discover_categories(&prompt, None).await?;

        if categories.is_empty() {
            // No categories means no meaningful downstream work.
            return Err(DistillerError::malformed(
                "taxonomy discovery returned no categories",
            ));
        }

        info!(categories = categories.len(), "taxonomy discovered");
        self.categories = categories;
        progress.event(&ProgressEvent::new(1, 1, "Categories discovered"));

        // --- Classification (fan-out / fan-in) ---
        self.set_state(PipelineState::Categorizing, progress);
        let total = records.len();
        progress.event(&ProgressEvent::new(0, total, "Categorizing records..."));

        let classification_prompts: Vec<String> = records
            .iter()
            .map(|record| {
                distiller_prompts::record_categorization(
                    &self.options.domain,
                    record,
                    &self.categories,
                )
            })
            .collect();

        let reporter = |index: usize| {
            progress.event(&ProgressEvent::new(
                index + 1,
                total,
                "Categorizing records...",
            ));
        };
        let results = self
            .backend
            .classify(&classification_prompts, &reporter, None)
            .await;

        let RoutingOutcome { buckets, unrouted } = route_records(&records, &results);
        self.unclassified = unrouted;
        if unrouted > 0 {
            warn!(unrouted, "records dropped without a usable assignment");
        }
        progress.event(&ProgressEvent::new(total, total, "Categorization complete"));

        // --- Sub-taxonomy expansion (still part of the classification pass) ---
        let leaves = self.expand_buckets(buckets.into_vec(), progress).await?;

        // --- Synthesis ---
        self.set_state(PipelineState::Synthesizing, progress);
        let leaf_total = leaves.len();

        for (i, leaf) in leaves.into_iter().enumerate() {
            progress.event(&ProgressEvent::new(
                i + 1,
                leaf_total,
                format!("Synthesizing: {}", leaf.article_name),
            ));
            let article = self.synthesize_leaf(&leaf).await?;
            self.articles.push(article);
        }

        Ok(())
    }

    /// Turn top-level buckets into synthesis leaves, expanding any bucket
    /// whose size strictly exceeds the threshold.
    async fn expand_buckets(
        &self,
        buckets: Vec<Bucket>,
        progress: &dyn DistillProgress,
    ) -> Result<Vec<LeafBucket>> {
        let bucket_total = buckets.len();
        let mut leaves = Vec::with_capacity(bucket_total);

        for (i, bucket) in buckets.into_iter().enumerate() {
            let category = self.category_by_name(&bucket.name);

            if bucket.records.len() <= self.options.subcategory_threshold {
                leaves.push(LeafBucket {
                    article_name: category.name.clone(),
                    prompt_name: category.name.clone(),
                    description: category.description.clone(),
                    records: bucket.records,
                });
                continue;
            }

            progress.event(&ProgressEvent::new(
                i + 1,
                bucket_total,
                format!("Expanding category: {}", category.name),
            ));

            match expand_category(
                self.backend.as_ref(),
                &self.options,
                &category,
                &bucket.records,
            )
            .await?
            {
                Expansion::Fallback => leaves.push(LeafBucket {
                    article_name: format!("{} (Large Category)", category.name),
                    prompt_name: category.name.clone(),
                    description: category.description.clone(),
                    records: bucket.records,
                }),
                Expansion::Split(sub_buckets) => {
                    // One coarse event per sub-category, not per record.
                    let sub_total = sub_buckets.len();
                    for (j, (subcategory, records)) in sub_buckets.into_iter().enumerate() {
                        progress.event(&ProgressEvent::new(
                            j + 1,
                            sub_total,
                            format!("Sub-category: {} > {}", category.name, subcategory.name),
                        ));
                        leaves.push(LeafBucket {
                            article_name: format!("{} > {}", category.name, subcategory.name),
                            prompt_name: subcategory.name,
                            description: subcategory.description,
                            records,
                        });
                    }
                }
            }
        }

        Ok(leaves)
    }

    /// Look up a discovered category by bucket name. The model occasionally
    /// routes to a name it never declared; such buckets synthesize with an
    /// empty description.
    fn category_by_name(&self, name: &str) -> Category {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .unwrap_or_else(|| Category {
                name: name.to_string(),
                description: String::new(),
                identifying_patterns: Vec::new(),
            })
    }

    async fn synthesize_leaf(&self, leaf: &LeafBucket) -> Result<KnowledgeArticle> {
        let prompt = distiller_prompts::knowledge_synthesis(
            &leaf.prompt_name,
            &leaf.description,
            &leaf.records,
        );
        let prompt = maybe_optimize(self.backend.as_ref(), &self.options, prompt).await?;
        let markdown_content = self.backend.synthesize(&prompt, None).await?;

        Ok(KnowledgeArticle {
            category_name: leaf.article_name.clone(),
            markdown_content,
        })
    }
}

/// In dynamic mode, rewrite a stage-global prompt for the configured domain
/// before use. Shares the failure domain of the stage that invoked it: an
/// optimization failure fails the stage's call as a whole. Never applied to
/// per-record classification prompts.
pub(crate) async fn maybe_optimize(
    backend: &dyn ModelBackend,
    options: &DistillOptions,
    prompt: String,
) -> Result<String> {
    match options.mode {
        ProcessingMode::Simple => Ok(prompt),
        ProcessingMode::Dynamic => {
            backend
                .optimize_prompt(&prompt, &options.domain, None)
                .await
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
