//! Bucketing of classification results into per-category record sets.
//!
//! The fan-out itself lives on the backend trait; this module applies the
//! routing rule to its output: a record lands in exactly one bucket (the one
//! named by its first assignment), and records whose slot is `None` or an
//! empty list land in no bucket at all.

use tracing::{debug, warn};

use distiller_shared::{Assignment, Record, SubAssignment};

/// Anything that names a routing target. Implemented for both assignment
/// levels so routing behaves identically at the top and sub level.
pub trait AssignmentLike {
    fn target(&self) -> &str;
}

impl AssignmentLike for Assignment {
    fn target(&self) -> &str {
        &self.category
    }
}

impl AssignmentLike for SubAssignment {
    fn target(&self) -> &str {
        &self.subcategory
    }
}

/// One category's records, in original split order.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub name: String,
    pub records: Vec<Record>,
}

/// Insertion-ordered category → records mapping. Iteration order is the
/// order categories first received a record; lookups are linear because
/// taxonomies stay small.
#[derive(Debug, Clone, Default)]
pub struct Buckets {
    buckets: Vec<Bucket>,
}

impl Buckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the named bucket, creating the bucket if absent.
    pub fn push(&mut self, name: &str, record: Record) {
        match self.buckets.iter_mut().find(|b| b.name == name) {
            Some(bucket) => bucket.records.push(record),
            None => self.buckets.push(Bucket {
                name: name.to_string(),
                records: vec![record],
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }

    pub fn into_vec(self) -> Vec<Bucket> {
        self.buckets
    }
}

/// Routing result: the buckets plus how many records were dropped.
#[derive(Debug)]
pub struct RoutingOutcome {
    pub buckets: Buckets,
    /// Records with a `None` or empty slot; they reach no bucket and no
    /// article.
    pub unrouted: usize,
}

/// Apply the first-assignment routing rule to a classification pass.
///
/// `results` must be index-aligned with `records` (one slot per record).
/// Additional assignments beyond the first are discovered but unused for
/// routing.
pub fn route_records<A: AssignmentLike>(
    records: &[Record],
    results: &[Option<Vec<A>>],
) -> RoutingOutcome {
    debug_assert_eq!(records.len(), results.len());

    let mut buckets = Buckets::new();
    let mut unrouted = 0;

    for (index, (record, slot)) in records.iter().zip(results).enumerate() {
        match slot {
            Some(assignments) if !assignments.is_empty() => {
                if assignments.len() > 1 {
                    debug!(
                        index,
                        extra = assignments.len() - 1,
                        "record received multiple assignments; routing by the first only"
                    );
                }
                buckets.push(assignments[0].target(), record.clone());
            }
            Some(_) => {
                unrouted += 1;
                debug!(index, "classifier found no fitting category; record dropped");
            }
            None => {
                unrouted += 1;
                warn!(index, "record could not be classified; record dropped");
            }
        }
    }

    RoutingOutcome { buckets, unrouted }
}
