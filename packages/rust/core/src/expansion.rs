//! Recursive sub-taxonomy expansion for oversized category buckets.
//!
//! A category whose bucket exceeds the configured threshold gets its own
//! scoped discovery + classification pass, reusing the same two-stage
//! pattern as the top level but with the parent category as context instead
//! of the whole-dataset domain.

use tracing::{info, warn};

use distiller_backend::ModelBackend;
use distiller_shared::{Category, Record, Result, SubCategory};

use crate::classify::{RoutingOutcome, route_records};
use crate::pipeline::{DistillOptions, maybe_optimize};

/// Outcome of one over-threshold category's expansion.
#[derive(Debug)]
pub enum Expansion {
    /// No usable sub-taxonomy was found; the caller synthesizes the full
    /// (unsplit) bucket as a single large-category article.
    Fallback,
    /// Sub-buckets ready for per-leaf synthesis. Records that failed to
    /// receive a sub-assignment are already dropped (no fallback to the
    /// parent bucket).
    Split(Vec<(SubCategory, Vec<Record>)>),
}

/// Discover and apply a sub-taxonomy for one category's bucket.
///
/// Sub-discovery failures propagate (stage-level); per-record
/// sub-classification failures are absorbed by the fan-out and only shrink
/// the sub-buckets.
pub async fn expand_category(
    backend: &dyn ModelBackend,
    options: &DistillOptions,
    parent: &Category,
    records: &[Record],
) -> Result<Expansion> {
    info!(
        category = %parent.name,
        records = records.len(),
        threshold = options.subcategory_threshold,
        "bucket exceeds threshold, expanding into sub-categories"
    );

    let sample = &records[..records.len().min(options.sample_cap)];
    let prompt = distiller_prompts::subcategory_discovery(parent, sample);
    let prompt = maybe_optimize(backend, options, prompt).await?;
    let subcategories = backend.discover_subcategories(&prompt, None).await?;

    if subcategories.is_empty() {
        info!(category = %parent.name, "no sub-categories found, falling back to a single large-category article");
        return Ok(Expansion::Fallback);
    }

    info!(
        category = %parent.name,
        subcategories = subcategories.len(),
        "sub-taxonomy discovered"
    );

    let prompts: Vec<String> = records
        .iter()
        .map(|record| distiller_prompts::subcategory_categorization(parent, record, &subcategories))
        .collect();

    // Sub-stage progress is intentionally coarser than the top level: the
    // caller reports per-sub-category, so no per-record callback here.
    let results = backend
        .classify_to_subcategories(&prompts, &|_| {}, None)
        .await;

    let RoutingOutcome { buckets, unrouted } = route_records(records, &results);

    if unrouted > 0 {
        warn!(
            category = %parent.name,
            dropped = unrouted,
            "records without a sub-assignment dropped from sub-buckets"
        );
    }

    let sub_buckets = buckets
        .into_vec()
        .into_iter()
        .map(|bucket| {
            let subcategory = subcategories
                .iter()
                .find(|s| s.name == bucket.name)
                .cloned()
                .unwrap_or_else(|| SubCategory {
                    name: bucket.name.clone(),
                    description: String::new(),
                    identifying_patterns: Vec::new(),
                    parent_category: parent.name.clone(),
                });
            (subcategory, bucket.records)
        })
        .collect();

    Ok(Expansion::Split(sub_buckets))
}
