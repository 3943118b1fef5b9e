//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use numsheet_core::{
    GenerateReport, LinkReport, ProgressReporter, RunContext, check_corpus, generate,
};
use numsheet_shared::{
    AppConfig, MAX_NUMBER, PolicyKind, ResourceId, ResourceKey, Source, expand_home,
    init_config, init_config_at, load_config_at, parse_id_spec,
};
use numsheet_sources::SourceHub;
use numsheet_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// numsheet: a reference page for every number from 0 to 999.
#[derive(Parser)]
#[command(
    name = "numsheet",
    version,
    about = "Generate and verify a corpus of number pages with cached Wikidata and Wikipedia data.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.numsheet/numsheet.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
    /// Generate pages for a selection of numbers.
    Generate {
        /// Numbers to generate: `444`, `0-99`, or `444,42,100-120`. Defaults to all.
        #[arg(long)]
        only: Option<String>,

        /// Corpus root (defaults to `defaults.output_dir`).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Never touch the network; use cached data only.
        #[arg(long)]
        offline: bool,

        /// Skip Wikidata entirely.
        #[arg(long)]
        no_wikidata: bool,

        /// Skip Wikipedia entirely.
        #[arg(long)]
        no_wikipedia: bool,

        /// Wikidata cache policy: use-cache, refresh, or force.
        #[arg(long)]
        wikidata_policy: Option<PolicyKind>,

        /// Wikipedia cache policy: use-cache, refresh, or force.
        #[arg(long)]
        wikipedia_policy: Option<PolicyKind>,

        /// Render pages without Wikipedia excerpts.
        #[arg(long)]
        no_excerpts: bool,

        /// Run the link check afterwards.
        #[arg(long)]
        check: bool,
    },

    /// Refresh cached data range by range, regenerate, then check links.
    Refresh {
        /// Corpus root (defaults to `defaults.output_dir`).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Numbers to refresh. Defaults to all.
        #[arg(long)]
        only: Option<String>,
    },

    /// Check navigation and relative links in a corpus.
    Check {
        /// Corpus root (defaults to `defaults.output_dir`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Inspect cached records.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Print one cache record as JSON.
    Show {
        /// `structured-data` (wikidata) or `prose-article` (wikipedia).
        source: Source,
        /// A number (`42`) or an external key (`calling-codes`).
        key: ResourceKey,
    },
    /// List cache records.
    List {
        /// Only records of this source.
        #[arg(long)]
        source: Option<Source>,
    },
    /// Show recent generation runs, newest first.
    Runs {
        #[arg(long, default_value = "10")]
        limit: u32,
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
        0 => "numsheet=info",
        1 => "numsheet=debug",
        _ => "numsheet=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Generate {
            only,
            out,
            offline,
            no_wikidata,
            no_wikipedia,
            wikidata_policy,
            wikipedia_policy,
            no_excerpts,
            check,
        } => {
            let mut config = load_config_at(config_path)?;
            if no_wikidata {
                config.sources.wikidata.enabled = false;
            }
            if no_wikipedia {
                config.sources.wikipedia.enabled = false;
            }
            if let Some(policy) = wikidata_policy {
                config.sources.wikidata.policy = policy;
            }
            if let Some(policy) = wikipedia_policy {
                config.sources.wikipedia.policy = policy;
            }
            if no_excerpts {
                config.excerpt.enabled = false;
            }
            let opts = GenerateOpts {
                only,
                out,
                offline,
                elevate_online: false,
                check,
            };
            cmd_generate(&config, opts).await
        }
        Command::Refresh { out, only } => {
            let config = load_config_at(config_path)?;
            let opts = GenerateOpts {
                only,
                out,
                offline: false,
                elevate_online: true,
                check: true,
            };
            cmd_generate(&config, opts).await
        }
        Command::Check { out } => {
            let config = load_config_at(config_path)?;
            cmd_check(&output_dir(&config, out)).await
        }
        Command::Cache { action } => {
            let config = load_config_at(config_path)?;
            match action {
                CacheAction::Show { source, key } => cmd_cache_show(&config, source, key).await,
                CacheAction::List { source } => cmd_cache_list(&config, source).await,
                CacheAction::Runs { limit } => cmd_cache_runs(&config, limit).await,
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path).await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn output_dir(config: &AppConfig, out: Option<PathBuf>) -> PathBuf {
    out.unwrap_or_else(|| expand_home(&config.defaults.output_dir))
}

// ---------------------------------------------------------------------------
// Generate / refresh
// ---------------------------------------------------------------------------

struct GenerateOpts {
    only: Option<String>,
    out: Option<PathBuf>,
    offline: bool,
    elevate_online: bool,
    check: bool,
}

async fn cmd_generate(config: &AppConfig, opts: GenerateOpts) -> Result<()> {
    let ids = match opts.only.as_deref() {
        Some(spec) => parse_id_spec(spec)?,
        None => (0..=MAX_NUMBER).collect(),
    };
    if ids.is_empty() {
        return Err(eyre!("no numbers in range 0-{MAX_NUMBER} selected"));
    }

    let out_dir = output_dir(config, opts.out);
    let mut ctx = RunContext::from_config(config, out_dir.clone())?;
    ctx.force_offline = opts.offline;
    ctx.elevate_online = opts.elevate_online;

    let storage = Storage::open(&expand_home(&config.defaults.cache_path)).await?;
    let hub = SourceHub::new(config)?;

    info!(
        ids = ids.len(),
        out = %out_dir.display(),
        offline = opts.offline,
        elevate = opts.elevate_online,
        "generating pages"
    );

    let reporter = CliProgress::new(ids.len());
    let report = generate(&ctx, &ids, &storage, &hub, &reporter).await?;
    print_generate_summary(&report, &out_dir);

    if opts.check {
        cmd_check(&out_dir).await?;
    }
    Ok(())
}

fn print_generate_summary(report: &GenerateReport, out_dir: &Path) {
    println!();
    for range in &report.ranges {
        println!(
            "  {:<8} {:<7}  written {:>3}  unchanged {:>3}  failures {:>3}  cache hits {} fetched {} fallbacks {} unavailable {}",
            range.label,
            range.mode.to_string(),
            range.written,
            range.unchanged,
            range.failures.len(),
            range.cache.hits,
            range.cache.fetched,
            range.cache.fallbacks,
            range.cache.unavailable,
        );
    }
    println!();
    println!("  Written:   {}", report.written());
    println!("  Unchanged: {}", report.unchanged());
    println!("  Failures:  {}", report.failures());
    println!("  Corpus:    {}", out_dir.display());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn page_done(&self, _id: u16, current: usize, _total: usize) {
        self.bar.set_position(current as u64);
    }

    fn done(&self, _report: &GenerateReport) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Check
// ---------------------------------------------------------------------------

async fn cmd_check(out_dir: &Path) -> Result<()> {
    let report = check_corpus(out_dir)?;
    print_link_report(&report);
    if !report.is_clean() {
        std::process::exit(report.exit_code());
    }
    Ok(())
}

fn print_link_report(report: &LinkReport) {
    const SHOWN: usize = 50;

    println!("  Pages scanned:  {}", report.pages_scanned);
    println!("  Links checked:  {}", report.links_checked);
    println!("  Violations:     {}", report.violations.len());

    if !report.violations.is_empty() {
        println!();
        for v in report.violations.iter().take(SHOWN) {
            println!("  - {v}");
        }
        if report.violations.len() > SHOWN {
            println!("  ... and {} more", report.violations.len() - SHOWN);
        }
    }
}

// ---------------------------------------------------------------------------
// Cache inspection
// ---------------------------------------------------------------------------

async fn cmd_cache_show(config: &AppConfig, source: Source, key: ResourceKey) -> Result<()> {
    let storage = Storage::open_readonly(&expand_home(&config.defaults.cache_path)).await?;
    let id = ResourceId { source, key };

    match storage.get_entry(&id).await? {
        Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
        None => return Err(eyre!("no cache record for '{id}'")),
    }
    Ok(())
}

async fn cmd_cache_list(config: &AppConfig, source: Option<Source>) -> Result<()> {
    let storage = Storage::open_readonly(&expand_home(&config.defaults.cache_path)).await?;
    let entries = storage.list_entries(source).await?;

    for e in &entries {
        println!(
            "  {:<36} {}  {:>8} B  {}",
            e.resource.to_string(),
            e.fetched_at.format("%Y-%m-%d %H:%M:%S"),
            e.payload_len,
            &e.fingerprint[..e.fingerprint.len().min(12)],
        );
    }
    println!();
    println!("  {} record(s)", entries.len());
    for s in Source::ALL {
        println!("  {:<16} {}", s.to_string(), storage.count_entries(s).await?);
    }
    Ok(())
}

async fn cmd_cache_runs(config: &AppConfig, limit: u32) -> Result<()> {
    let storage = Storage::open_readonly(&expand_home(&config.defaults.cache_path)).await?;
    let runs = storage.recent_generation_runs(limit).await?;

    if runs.is_empty() {
        println!("  no generation runs recorded");
        return Ok(());
    }
    for run in &runs {
        let finished = run
            .finished_at
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "unfinished".to_string());
        println!(
            "  {}  {:<8} {:<7} started {} finished {}",
            run.id,
            run.range_label,
            run.mode,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            finished,
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => {
            init_config_at(p)?;
            p.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config: AppConfig = load_config_at(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
