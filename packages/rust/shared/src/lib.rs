//! Shared types, error model, and configuration for the distiller.
//!
//! This crate is the foundation depended on by all other distiller crates.
//! It provides:
//! - [`DistillerError`] — the unified error type
//! - Domain types ([`Record`], [`Category`], [`KnowledgeArticle`], [`PipelineState`])
//! - Configuration ([`AppConfig`], [`BackendConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, DefaultsConfig, GeminiConfig, OpenAiConfig, PipelineTuning,
    ProcessingMode, Provider, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_api_key,
};
pub use error::{DistillerError, Result};
pub use types::{
    Assignment, Category, KnowledgeArticle, PipelineState, ProgressEvent, Record, SubAssignment,
    SubCategory,
};
