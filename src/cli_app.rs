//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};

use file_integrity_sentry::baseline::store::BaselineStore;
use file_integrity_sentry::core::config::Config;
use file_integrity_sentry::core::errors::{FisError, Result};
use file_integrity_sentry::daemon::loop_main::IntegritySentry;
use file_integrity_sentry::diff::engine::{ChangeEvent, ChangeKind};
use file_integrity_sentry::honeyfile::manager::HoneyfileManager;
use file_integrity_sentry::scan::snapshot::SnapshotBuilder;
use file_integrity_sentry::scan::walker::WalkerConfig;

/// File Integrity Sentry — detects tampering in a monitored directory tree.
#[derive(Debug, Parser)]
#[command(
    name = "fis",
    author,
    version,
    about = "File Integrity Sentry - baseline, rescan, detect",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Build the baseline and plant honeyfiles.
    Init(InitArgs),
    /// Run a one-shot scan against the baseline. Exits 1 if changes found.
    Check(CheckArgs),
    /// Run the monitoring daemon.
    Daemon(DaemonArgs),
    /// Print the effective configuration.
    Config,
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct InitArgs {
    /// Directory to monitor (overrides config).
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,
    /// Replace an existing baseline.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct CheckArgs {
    /// Directory to monitor (overrides config).
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct DaemonArgs {
    /// Directory to monitor (overrides config).
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,
    /// Seconds between scan passes (overrides config).
    #[arg(long, value_name = "SECONDS")]
    interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

/// Entry point called from `main`.
pub fn run(cli: &Cli) -> Result<()> {
    if cli.no_color || !io::stdout().is_terminal() {
        control::set_override(false);
    }

    match &cli.command {
        Command::Init(args) => cmd_init(cli, args),
        Command::Check(args) => cmd_check(cli, args),
        Command::Daemon(args) => cmd_daemon(cli, args),
        Command::Config => cmd_config(cli),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "fis", &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli, root_override: Option<&PathBuf>) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = root_override {
        config.monitor.root_path = root.clone();
    }
    config.validate()?;
    Ok(config)
}

fn cmd_init(cli: &Cli, args: &InitArgs) -> Result<()> {
    let mut config = load_config(cli, args.root.as_ref())?;
    // Snapshot keys must match the daemon's canonicalized walk.
    config.monitor.root_path =
        std::fs::canonicalize(&config.monitor.root_path).map_err(|e| FisError::InvalidConfig {
            details: format!("monitor.root_path {}: {e}", config.monitor.root_path.display()),
        })?;

    let store = BaselineStore::new(config.paths.baseline_file.clone());
    if store.exists() && !args.force {
        return Err(FisError::Runtime {
            details: format!(
                "baseline already exists at {} (use --force to replace)",
                store.path().display()
            ),
        });
    }

    let manager = HoneyfileManager::new(config.honeyfile_directory(), config.honeyfile.clone());
    let honeyfiles = manager.plant()?;

    let (snapshot, stats) = SnapshotBuilder::new(WalkerConfig::from_monitor(&config.monitor))
        .build()?;
    store.save(&snapshot)?;

    if cli.json {
        let summary = serde_json::json!({
            "baseline": store.path(),
            "files": snapshot.len(),
            "skipped": stats.files_skipped,
            "honeyfiles": honeyfiles.len(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} baseline of {} files written to {} ({} honeyfiles planted)",
            "ok:".green().bold(),
            snapshot.len(),
            store.path().display(),
            honeyfiles.len(),
        );
        if stats.files_skipped > 0 {
            println!(
                "{} {} files vanished or were unreadable during the walk",
                "note:".yellow(),
                stats.files_skipped
            );
        }
    }
    Ok(())
}

fn cmd_check(cli: &Cli, args: &CheckArgs) -> Result<()> {
    let config = load_config(cli, args.root.as_ref())?;

    let mut sentry = IntegritySentry::init(config)?;
    let store = BaselineStore::new(sentry.config().paths.baseline_file.clone());
    if !store.exists() {
        return Err(FisError::Runtime {
            details: format!(
                "no baseline at {} — run `fis init` first",
                store.path().display()
            ),
        });
    }

    sentry.bootstrap()?;
    let events = sentry.scan_once()?;
    sentry.finish("one-shot check complete");
    let changes: Vec<&ChangeEvent> = events.iter().filter(|e| e.is_change()).collect();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
    } else {
        print_events(&changes);
    }

    if !changes.is_empty() {
        let _ = io::stdout().flush();
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_daemon(cli: &Cli, args: &DaemonArgs) -> Result<()> {
    let mut config = load_config(cli, args.root.as_ref())?;
    if let Some(interval) = args.interval_secs {
        config.monitor.scan_interval_secs = interval;
        config.validate()?;
    }

    let mut sentry = IntegritySentry::init(config)?;
    eprintln!(
        "[FIS-DAEMON] monitoring {} every {}s (log: {})",
        sentry.config().monitor.root_path.display(),
        sentry.config().monitor.scan_interval_secs,
        sentry.config().paths.jsonl_log.display(),
    );
    sentry.run()
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli, None)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        let rendered = toml::to_string_pretty(&config).map_err(|e| FisError::Serialization {
            context: "config_render",
            details: e.to_string(),
        })?;
        print!("{rendered}");
        println!("# effective config hash: {}", config.stable_hash()?);
    }
    Ok(())
}

fn print_events(changes: &[&ChangeEvent]) {
    if changes.is_empty() {
        println!("{} no changes detected", "ok:".green().bold());
        return;
    }

    for event in changes {
        let path = event.path.display();
        let line = match &event.kind {
            ChangeKind::Added => format!("+ added    {path}").green().to_string(),
            ChangeKind::Deleted => format!("- deleted  {path}").red().to_string(),
            ChangeKind::Modified {
                is_honeyfile,
                size_delta,
            } => {
                let tag = if *is_honeyfile { " [honeyfile]" } else { "" };
                format!("~ modified {path} ({size_delta:+} bytes){tag}")
                    .yellow()
                    .to_string()
            }
            ChangeKind::Unchanged => continue,
        };
        if event.is_elevated() {
            println!("{} {}", "!!".red().bold(), line.red().bold());
        } else {
            println!("   {line}");
        }
    }
    println!(
        "{} {} change(s) detected",
        "warning:".yellow().bold(),
        changes.len()
    );
}
