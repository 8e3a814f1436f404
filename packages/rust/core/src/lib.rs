//! Core pipeline orchestration for the distiller.
//!
//! This crate ties together record splitting, taxonomy discovery,
//! concurrent classification, sub-taxonomy expansion, and knowledge
//! synthesis into the end-to-end distillation run, plus article export.

pub mod classify;
pub mod expansion;
pub mod export;
pub mod pipeline;
pub mod splitter;

pub use classify::{Bucket, Buckets, RoutingOutcome, route_records};
pub use export::{ExportManifest, ExportResult, export_articles, slugify};
pub use pipeline::{
    DistillOptions, DistillProgress, DistillSummary, Distiller, SilentProgress,
};
pub use splitter::split_records;
