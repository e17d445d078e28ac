use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};

use tufwave::config::Settings;
use tufwave::keystore::OfflineKeyStore;
use tufwave::local::LocalFactory;
use tufwave::metadata::Expires;
use tufwave::tuf_updates::apply_staged;
use tufwave::wave::{init_wave, WaveRequest, STATIC_DELTA_ADVISORY};

#[derive(Parser)]
#[command(name = "tufwave", about = "Offline TUF signing for production Waves", version)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Production Waves
    #[command(subcommand)]
    Wave(WaveCmd),

    /// Staged TUF root updates
    #[command(subcommand)]
    Updates(UpdatesCmd),
}

#[derive(Subcommand)]
enum WaveCmd {
    /// Promote a CI Targets version to production and sign it offline
    Init(InitArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Wave name
    name: String,

    /// CI Targets version to promote
    version: u64,

    /// Production tag the Targets are promoted to
    tag: String,

    /// Factory snapshot directory
    #[arg(long)]
    factory_dir: PathBuf,

    /// Offline credentials archive (tar.gz) holding the Targets keys
    #[arg(long)]
    keys: PathBuf,

    /// Targets expire this many days from now (defaults to the settings value)
    #[arg(long)]
    expires_days: Option<u32>,

    /// Exact RFC 3339 expiration; overrides --expires-days
    #[arg(long)]
    expires_at: Option<String>,

    /// Comma-separated CI versions to remove from production Targets
    #[arg(long, value_delimiter = ',')]
    prune: Vec<String>,

    /// Only promote CI targets carrying this tag
    #[arg(long)]
    source_tag: Option<String>,

    /// Print the signed Wave instead of creating it
    #[arg(long)]
    dry_run: bool,

    /// Settings JSON (defaults to factory_dir/tufwave.json if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum UpdatesCmd {
    /// Apply the staged TUF root updates
    Apply {
        /// Factory snapshot directory
        #[arg(long)]
        factory_dir: PathBuf,

        /// Transaction to apply (defaults to the one currently staged)
        #[arg(long)]
        txid: Option<String>,

        /// Settings JSON (defaults to factory_dir/tufwave.json if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .format_timestamp(None)
        .format_level(false)
        .format_module_path(false)
        .format_target(false)
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    match cli.cmd {
        Cmd::Wave(WaveCmd::Init(args)) => create_wave(args),
        Cmd::Updates(UpdatesCmd::Apply {
            factory_dir,
            txid,
            config,
        }) => apply_updates(&factory_dir, txid.as_deref(), config.as_deref()),
    }
}

fn load_settings(explicit: Option<&Path>, factory_dir: &Path) -> Result<Settings> {
    Settings::resolve(explicit, factory_dir).context("Failed to load settings")
}

fn select_expires(args: &InitArgs, settings: &Settings) -> Result<Expires> {
    if let Some(at) = &args.expires_at {
        return Expires::parse_rfc3339(at)
            .with_context(|| format!("Invalid --expires-at timestamp: {at}"));
    }
    let days = args.expires_days.unwrap_or(settings.expires_days);
    Expires::in_days(days).with_context(|| format!("Invalid expiration of {days} days"))
}

fn create_wave(args: InitArgs) -> Result<()> {
    let settings = load_settings(args.config.as_deref(), &args.factory_dir)?;
    let expires = select_expires(&args, &settings)?;

    let factory = LocalFactory::open(&args.factory_dir, &settings)
        .context("Failed to open factory directory")?;
    let store = OfflineKeyStore::load(&args.keys, &settings)
        .with_context(|| format!("Failed to load offline keys from {}", args.keys.display()))?;

    let request = WaveRequest {
        name: args.name,
        version: args.version,
        tag: args.tag,
        expires,
        prune: args.prune,
        source_tag: args.source_tag,
    };
    let outcome = init_wave(&factory, &store, &request, args.dry_run)?;

    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&outcome.wave)?);
    } else {
        println!(
            "Created Wave {} for Targets version {} and tag {}",
            outcome.wave.name, outcome.wave.version, outcome.wave.tag
        );
        println!("→ {}", factory.wave_path(&outcome.wave.name).display());
    }
    if !outcome.pruned.is_empty() {
        eprintln!("Pruned targets: {}", outcome.pruned.join(", "));
    }
    if settings.warn_missing_static_deltas && !outcome.missing_static_deltas.is_empty() {
        eprintln!("\n{STATIC_DELTA_ADVISORY}");
    }
    Ok(())
}

fn apply_updates(factory_dir: &Path, txid: Option<&str>, config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config, factory_dir)?;
    let factory =
        LocalFactory::open(factory_dir, &settings).context("Failed to open factory directory")?;
    let outcome = apply_staged(&factory, txid)?;
    println!("{}", outcome.message());
    Ok(())
}
