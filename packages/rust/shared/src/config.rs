//! Application configuration for the distiller.
//!
//! User config lives at `~/.distiller/distiller.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are referenced by environment variable name and never stored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DistillerError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "distiller.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".distiller";

// ---------------------------------------------------------------------------
// Provider / mode enums
// ---------------------------------------------------------------------------

/// Which model backend serves the run. The pipeline never inspects this; it
/// is consumed once by the backend factory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    OpenAi,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = DistillerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(DistillerError::config(format!(
                "unknown provider '{other}': expected 'gemini' or 'openai'"
            ))),
        }
    }
}

/// Prompt handling mode. `Dynamic` rewrites stage-global prompts through the
/// backend for the configured domain before use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    #[default]
    Simple,
    Dynamic,
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

impl std::str::FromStr for ProcessingMode {
    type Err = DistillerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "dynamic" => Ok(Self::Dynamic),
            other => Err(DistillerError::config(format!(
                "unknown mode '{other}': expected 'simple' or 'dynamic'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Config structs (matching distiller.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Pipeline tuning knobs.
    #[serde(default)]
    pub pipeline: PipelineTuning,

    /// Gemini backend settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// OpenAI-compatible backend settings.
    #[serde(default)]
    pub openai: OpenAiConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Record separator within the raw input.
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Domain label used to specialize prompts.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Prompt handling mode.
    #[serde(default)]
    pub mode: ProcessingMode,

    /// Default model backend.
    #[serde(default)]
    pub provider: Provider,

    /// Default directory for exported articles.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            domain: default_domain(),
            mode: ProcessingMode::default(),
            provider: Provider::default(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_separator() -> String {
    "--- TICKET BREAK ---".into()
}
fn default_domain() -> String {
    "supply chain management".into()
}
fn default_output_dir() -> String {
    "articles".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineTuning {
    /// Maximum number of records sampled (from the front) for discovery.
    #[serde(default = "default_sample_cap")]
    pub sample_cap: usize,

    /// Bucket size above which a category is expanded into sub-categories.
    #[serde(default = "default_subcategory_threshold")]
    pub subcategory_threshold: usize,

    /// Maximum concurrent classification requests.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            sample_cap: default_sample_cap(),
            subcategory_threshold: default_subcategory_threshold(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_sample_cap() -> usize {
    100
}
fn default_subcategory_threshold() -> usize {
    50
}
fn default_max_concurrency() -> usize {
    8
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,

    /// Model to use.
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// API endpoint base.
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_gemini_key_env(),
            model: default_gemini_model(),
            endpoint: default_gemini_endpoint(),
        }
    }
}

fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_gemini_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Model to use. A deployment name embedded in a custom endpoint
    /// overrides this.
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// API endpoint base. A non-default value switches to Azure-style auth.
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            model: default_openai_model(),
            endpoint: default_openai_endpoint(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_model() -> String {
    "gpt-4.1-nano".into()
}
fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".into()
}

// ---------------------------------------------------------------------------
// Backend config (runtime, resolved once per run)
// ---------------------------------------------------------------------------

/// Resolved backend settings handed to the backend factory. Read-only for
/// the duration of a run.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub provider: Provider,
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub max_concurrency: usize,
}

impl BackendConfig {
    /// Resolve provider settings from the app config, reading the API key
    /// from the configured environment variable.
    pub fn resolve(config: &AppConfig, provider: Provider) -> Result<Self> {
        let (key_env, endpoint, model) = match provider {
            Provider::Gemini => (
                &config.gemini.api_key_env,
                config.gemini.endpoint.clone(),
                config.gemini.model.clone(),
            ),
            Provider::OpenAi => (
                &config.openai.api_key_env,
                config.openai.endpoint.clone(),
                config.openai.model.clone(),
            ),
        };

        let api_key = read_api_key(key_env)?;

        Ok(Self {
            provider,
            api_key,
            endpoint,
            model,
            max_concurrency: config.pipeline.max_concurrency,
        })
    }
}

/// Check that the API key env var for the given provider is set and
/// non-empty, without exposing the value.
pub fn validate_api_key(config: &AppConfig, provider: Provider) -> Result<()> {
    let var_name = match provider {
        Provider::Gemini => &config.gemini.api_key_env,
        Provider::OpenAi => &config.openai.api_key_env,
    };
    read_api_key(var_name).map(|_| ())
}

fn read_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(DistillerError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.distiller/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DistillerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.distiller/distiller.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DistillerError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        DistillerError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DistillerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DistillerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DistillerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("TICKET BREAK"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.sample_cap, 100);
        assert_eq!(parsed.pipeline.subcategory_threshold, 50);
        assert_eq!(parsed.defaults.provider, Provider::Gemini);
        assert_eq!(parsed.defaults.mode, ProcessingMode::Simple);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
domain = "IT helpdesk"
provider = "openai"

[pipeline]
subcategory_threshold = 25
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.domain, "IT helpdesk");
        assert_eq!(config.defaults.provider, Provider::OpenAi);
        assert_eq!(config.defaults.separator, "--- TICKET BREAK ---");
        assert_eq!(config.pipeline.subcategory_threshold, 25);
        assert_eq!(config.pipeline.max_concurrency, 8);
    }

    #[test]
    fn provider_and_mode_parse() {
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!("claude".parse::<Provider>().is_err());
        assert_eq!(
            "dynamic".parse::<ProcessingMode>().unwrap(),
            ProcessingMode::Dynamic
        );
        assert!("fancy".parse::<ProcessingMode>().is_err());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.gemini.api_key_env = "DISTILLER_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config, Provider::Gemini);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn backend_config_resolves_from_env() {
        let mut config = AppConfig::default();
        config.openai.api_key_env = "DISTILLER_TEST_OPENAI_KEY_67890".into();
        // SAFETY: test-local variable name, no other test reads it.
        unsafe { std::env::set_var("DISTILLER_TEST_OPENAI_KEY_67890", "sk-test") };
        let resolved = BackendConfig::resolve(&config, Provider::OpenAi).expect("resolve");
        assert_eq!(resolved.api_key, "sk-test");
        assert_eq!(resolved.model, "gpt-4.1-nano");
        assert_eq!(resolved.max_concurrency, 8);
        unsafe { std::env::remove_var("DISTILLER_TEST_OPENAI_KEY_67890") };
    }
}
