mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sheetshot_core::capture::CaptureClient;
use sheetshot_core::config::{init_logging, AppConfig};
use sheetshot_core::enhance::{self, Preset};
use sheetshot_core::stats::{self, MonthlyStats};
use sheetshot_core::{ArchiveStore, Scope};
use tokio::sync::watch;
use tracing::info;

use crate::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "sheetshot-daemon", about = "Spreadsheet screenshot archive")]
struct Cli {
    /// Config file (defaults to ~/.sheetshot/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Archive partition; `0/0` is the shared system scope.
#[derive(Args, Clone, Copy)]
struct ScopeArgs {
    #[arg(long, default_value_t = 0)]
    user: i64,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    chat: i64,
}

impl From<ScopeArgs> for Scope {
    fn from(args: ScopeArgs) -> Self {
        Scope::new(args.user, args.chat)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the capture scheduler (default when no subcommand given)
    Run,
    /// Capture the sheet now and archive it
    Capture {
        #[arg(long)]
        label: String,
        /// Enhancement preset; defaults to the configured one
        #[arg(long)]
        preset: Option<String>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// List archived screenshots visible from a scope
    List {
        #[arg(long, conflicts_with_all = ["date", "search"])]
        label: Option<String>,
        /// `YYYY-MM-DD` (or `YYYY-MM`)
        #[arg(long, conflicts_with = "search")]
        date: Option<String>,
        /// Substring search over the scope's own labels
        #[arg(long)]
        search: Option<String>,
        /// Only records created in `START..=END` (`YYYY-MM-DD`)
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        period: Option<Vec<String>>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// List distinct labels visible from a scope
    Labels {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Delete screenshots by file name
    Delete {
        #[arg(required = true)]
        filenames: Vec<String>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Delete every screenshot carrying a label
    DeleteLabel {
        label: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Show monthly usage against the configured limit
    Stats {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

#[derive(Serialize)]
struct StatsReport {
    #[serde(flatten)]
    monthly: MonthlyStats,
    total: usize,
    labels: Vec<LabelCount>,
}

#[derive(Serialize)]
struct LabelCount {
    label: String,
    count: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let store = Arc::new(ArchiveStore::open(&config.screenshots_dir()?)?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_daemon(&config, store).await,
        Command::Capture {
            label,
            preset,
            scope,
        } => run_capture(&config, &store, &label, preset.as_deref(), scope.into()).await,
        Command::List {
            label,
            date,
            search,
            period,
            scope,
        } => {
            let scope: Scope = scope.into();
            let mut records = match (label, date, search) {
                (Some(label), _, _) => store.get_by_label(&label, scope),
                (_, Some(date), _) => store.get_by_date(&date, scope),
                (_, _, Some(query)) => store.search_by_label(&query, scope),
                _ => store.get_all(scope),
            };
            if let Some(bounds) = period {
                records = stats::filter_by_period(&records, &bounds[0], &bounds[1]);
            }
            print_json(&records)
        }
        Command::Labels { scope } => print_json(&store.get_all_labels(scope.into())),
        Command::Delete { filenames, scope } => {
            let report = store.delete_selected(&filenames, scope.into());
            print_json(&report)?;
            if report.failed > 0 {
                anyhow::bail!("{} of {} deletions failed", report.failed, filenames.len());
            }
            Ok(())
        }
        Command::DeleteLabel { label, scope } => {
            let report = store.delete_by_label(&label, scope.into());
            print_json(&report)
        }
        Command::Stats { scope } => {
            let scope: Scope = scope.into();
            let all = store.get_all(scope);
            let labels = store
                .get_all_labels(scope)
                .into_iter()
                .map(|label| LabelCount {
                    count: store.get_by_label(&label, scope).len(),
                    label,
                })
                .collect();
            let report = StatsReport {
                monthly: stats::monthly_stats(
                    &all,
                    chrono::Utc::now().naive_utc(),
                    config.stats.monthly_limit,
                ),
                total: all.len(),
                labels,
            };
            print_json(&report)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_capture(
    config: &AppConfig,
    store: &ArchiveStore,
    label: &str,
    preset: Option<&str>,
    scope: Scope,
) -> anyhow::Result<()> {
    let client = CaptureClient::new(&config.capture);
    let data = client.fetch_image(&config.capture.sheet_url).await?;

    let preset = Preset::parse(preset.unwrap_or(&config.enhance.default_preset));
    let data = enhance::apply(&data, preset);

    match store.save(&data, label, scope) {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => anyhow::bail!("failed to archive screenshot"),
    }
}

async fn run_daemon(config: &AppConfig, store: Arc<ArchiveStore>) -> anyhow::Result<()> {
    info!(
        root = %store.root().display(),
        "sheetshot-daemon starting"
    );

    if !config.schedule.enabled {
        info!("scheduler disabled in config, nothing to do");
        return Ok(());
    }

    let client = CaptureClient::new(&config.capture);
    let scheduler = Scheduler::new(
        &config.schedule,
        store,
        Box::new(client),
        &config.capture.sheet_url,
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(scheduler.run(shutdown_rx));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = task.await;

    info!("sheetshot-daemon stopped");
    Ok(())
}
