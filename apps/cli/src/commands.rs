//! CLI command definitions, routing, and tracing setup.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use threadsync_client::{DocStore, HttpDocStore};
use threadsync_core::{MailGatewayNotifier, NoopNotifier, ProgressReporter, SyncOutcome, run_sync};
use threadsync_shared::{
    AppConfig, DocumentEntry, SyncConfig, SyncReport, config_file_path, init_config, load_config,
    resolve_api_token, validate_sync_targets,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ThreadSync — sync document comment threads into a tabular store.
#[derive(Parser)]
#[command(
    name = "threadsync",
    version,
    about = "Sync threaded document annotations into tabular records.",
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
    /// Run a sync over the configured source documents.
    Sync {
        /// Restrict the run to one document id (repeatable).
        #[arg(short, long)]
        document: Vec<String>,

        /// Discover and report without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify config, credentials, and target schema without syncing.
    Check,

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
    /// Print the config file path.
    Path,
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
        0 => "threadsync=info",
        1 => "threadsync=debug",
        _ => "threadsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
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
        Command::Sync { document, dry_run } => cmd_sync(&document, dry_run).await,
        Command::Check => cmd_check().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Path => cmd_config_path().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

async fn cmd_sync(documents: &[String], dry_run: bool) -> Result<()> {
    let config = load_config()?;
    validate_sync_targets(&config)?;
    let token = resolve_api_token(&config)?;

    let targets = select_documents(&config, documents)?;
    let store = HttpDocStore::new(&config.api, &config.store, &token)?;

    let mut sync_config = SyncConfig::from(&config);
    sync_config.dry_run = dry_run;

    info!(
        documents = targets.len(),
        dry_run, "starting sync over registered documents"
    );

    let reporter = CliProgress::new();
    let outcome = match &config.notify.gateway_url {
        Some(url) => {
            let notifier = MailGatewayNotifier::new(url, &config.notify.recipient)?;
            run_sync(&store, &notifier, &targets, &sync_config, &reporter).await?
        }
        None => run_sync(&store, &NoopNotifier, &targets, &sync_config, &reporter).await?,
    };

    print_summary(&outcome, dry_run);
    Ok(())
}

/// Resolve the `--document` filters against the registered documents.
fn select_documents(config: &AppConfig, filters: &[String]) -> Result<Vec<DocumentEntry>> {
    if filters.is_empty() {
        return Ok(config.documents.clone());
    }

    let mut selected = Vec::with_capacity(filters.len());
    for id in filters {
        let entry = config
            .documents
            .iter()
            .find(|d| &d.id == id)
            .ok_or_else(|| eyre!("document '{id}' is not registered in [[documents]]"))?;
        selected.push(entry.clone());
    }
    Ok(selected)
}

fn print_summary(outcome: &SyncOutcome, dry_run: bool) {
    let report = &outcome.report;

    println!();
    if dry_run {
        println!("  Dry run complete — nothing was written.");
    } else {
        println!("  Sync complete!");
    }
    println!("  Threads found:   {}", report.processed);
    println!("  Records written: {}", report.written);
    println!("  Errors:          {}", report.errors.len());
    println!("  Time:            {:.1}s", report.duration.as_secs_f64());

    for guard in &outcome.guards {
        if let Some(id) = &guard.created_item {
            println!("  Task created:    {} ({id})", guard.category);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("  Skipped with errors:");
        for (context, message) in &report.errors {
            println!("    - {context}: {message}");
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

async fn cmd_check() -> Result<()> {
    let config = load_config()?;
    validate_sync_targets(&config)?;
    println!("  Config:      ok ({} documents)", config.documents.len());

    let token = resolve_api_token(&config)?;
    println!("  Credentials: ok ({} set)", config.api.token_env);

    let store = HttpDocStore::new(&config.api, &config.store, &token)?;
    store.validate_schema().await?;
    println!("  Schema:      ok");

    match &config.notify.gateway_url {
        Some(url) => {
            MailGatewayNotifier::new(url, &config.notify.recipient)?;
            println!("  Notify:      ok ({url})");
        }
        None => println!("  Notify:      disabled (no gateway_url)"),
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_path() -> Result<()> {
    println!("{}", config_file_path()?.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
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
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn record_written(&self, discussion_id: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Writing [{current}/{total}] {discussion_id}"));
    }

    fn done(&self, _report: &SyncReport) {
        self.spinner.finish_and_clear();
    }
}
