//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use distiller_backend::create_backend;
use distiller_core::pipeline::{DistillOptions, DistillProgress, Distiller};
use distiller_shared::{
    AppConfig, BackendConfig, PipelineState, ProcessingMode, ProgressEvent, Provider, init_config,
    load_config, validate_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Distiller — turn unstructured records into knowledge articles.
#[derive(Parser)]
#[command(
    name = "distiller",
    version,
    about = "Distill a batch of free-text records (e.g. support tickets) into markdown knowledge articles.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the distillation pipeline over an input file.
    Run {
        /// Input file with raw records ('-' reads stdin).
        input: String,

        /// Record separator (defaults to the configured one).
        #[arg(short, long)]
        separator: Option<String>,

        /// Domain label used to specialize prompts.
        #[arg(short, long)]
        domain: Option<String>,

        /// Prompt handling mode: simple or dynamic.
        #[arg(short, long)]
        mode: Option<ProcessingMode>,

        /// Model backend: gemini or openai.
        #[arg(short, long)]
        provider: Option<Provider>,

        /// Model override for the selected provider.
        #[arg(long)]
        model: Option<String>,

        /// Endpoint override (e.g. an Azure deployment URL).
        #[arg(long)]
        endpoint: Option<String>,

        /// Output directory for exported articles.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Discovery sample cap (first N records).
        #[arg(long)]
        sample_cap: Option<usize>,

        /// Bucket size above which a category is split into sub-categories.
        #[arg(long)]
        threshold: Option<usize>,

        /// Maximum concurrent classification requests.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "distiller=info",
        1 => "distiller=debug",
        _ => "distiller=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            input,
            separator,
            domain,
            mode,
            provider,
            model,
            endpoint,
            out,
            sample_cap,
            threshold,
            concurrency,
        } => {
            cmd_run(RunArgs {
                input,
                separator,
                domain,
                mode,
                provider,
                model,
                endpoint,
                out,
                sample_cap,
                threshold,
                concurrency,
            })
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Run command
// ---------------------------------------------------------------------------

struct RunArgs {
    input: String,
    separator: Option<String>,
    domain: Option<String>,
    mode: Option<ProcessingMode>,
    provider: Option<Provider>,
    model: Option<String>,
    endpoint: Option<String>,
    out: Option<PathBuf>,
    sample_cap: Option<usize>,
    threshold: Option<usize>,
    concurrency: Option<usize>,
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = load_config()?;
    let provider = args.provider.unwrap_or(config.defaults.provider);

    // Validate credentials before doing anything.
    validate_api_key(&config, provider)?;

    let mut backend_config = BackendConfig::resolve(&config, provider)?;
    if let Some(model) = args.model {
        backend_config.model = model;
    }
    if let Some(endpoint) = args.endpoint {
        backend_config.endpoint = endpoint;
    }
    if let Some(concurrency) = args.concurrency {
        backend_config.max_concurrency = concurrency;
    }

    let mut options = DistillOptions::from(&config);
    if let Some(separator) = args.separator {
        options.separator = separator;
    }
    if let Some(domain) = args.domain {
        options.domain = domain;
    }
    if let Some(mode) = args.mode {
        options.mode = mode;
    }
    if let Some(sample_cap) = args.sample_cap {
        options.sample_cap = sample_cap;
    }
    if let Some(threshold) = args.threshold {
        options.subcategory_threshold = threshold;
    }

    let raw_text = read_input(&args.input)?;

    info!(
        provider = %provider,
        model = %backend_config.model,
        mode = %options.mode,
        "starting distillation"
    );

    let backend = create_backend(&backend_config)?;
    let mut distiller = Distiller::new(backend, options);

    let reporter = CliProgress::new();
    let outcome = distiller.run(&raw_text, &reporter).await;
    reporter.finish();

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            // Partial results survive a failed run; surface what exists.
            if !distiller.categories().is_empty() {
                println!(
                    "  {} categories were discovered before the failure.",
                    distiller.categories().len()
                );
            }
            return Err(e.into());
        }
    };

    let out_dir = args
        .out
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));
    let export = distiller_core::export_articles(
        &out_dir,
        distiller.articles(),
        env!("CARGO_PKG_VERSION"),
    )?;

    // Print summary
    println!();
    println!("  Distillation complete!");
    println!("  Records:      {}", summary.record_count);
    println!("  Categories:   {}", summary.category_count);
    println!("  Articles:     {}", summary.article_count);
    println!("  Unclassified: {}", summary.unclassified);
    println!("  Output:       {}", export.dir.display());
    println!("  Time:         {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Read the raw input text from a file, or stdin when the path is `-`.
fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| eyre!("failed to read stdin: {e}"))?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input)
            .map_err(|e| eyre!("failed to read input file '{input}': {e}"))
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl DistillProgress for CliProgress {
    fn state_changed(&self, state: PipelineState) {
        match state {
            PipelineState::Discovering => self.spinner.set_message("Discovering categories"),
            PipelineState::Categorizing => self.spinner.set_message("Categorizing records"),
            PipelineState::Synthesizing => self.spinner.set_message("Synthesizing articles"),
            _ => {}
        }
    }

    fn event(&self, event: &ProgressEvent) {
        self.spinner.set_message(format!(
            "[{}/{}] {}",
            event.current, event.total, event.task
        ));
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
