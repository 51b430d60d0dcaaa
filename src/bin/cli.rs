//! Hackathon Monitor CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use hackathon_monitor::{
    error::{AppError, Result},
    models::{Config, DispatchResult, RunReport},
    pipeline::{
        Aggregator, ExportFormat, NotificationDispatcher, NotificationSummary, RunContext,
        Scheduler, StoreStats, TriggerOutcome, export, notify::notifier_for,
    },
    storage::{LocalStorage, MemoryStorage, RecordStorage},
    utils::log as console,
};
use tokio_util::sync::CancellationToken;

/// Hackathon Monitor - Devpost, MLH and Unstop in one list
#[derive(Parser, Debug)]
#[command(
    name = "hackathon-monitor",
    version,
    about = "Aggregates hackathon listings and notifies on new ones"
)]
struct Cli {
    /// Directory holding config.toml and the hackathon table
    #[arg(short, long, default_value = "hackathon-data", global = true)]
    data_dir: PathBuf,

    /// Config file (default: {data_dir}/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once
    Run {
        /// Work on an in-memory copy of the table and send nothing
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the pipeline every interval until Ctrl-C
    Monitor {
        /// Override settings.interval_hours
        #[arg(long)]
        interval_hours: Option<u64>,
    },

    /// Show table statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Export the table
    Export {
        /// json, csv or txt
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Output file (default: {data_dir}/hackathons_export.{format})
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Send a notification through the configured channel
    TestNotification {
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Validate configuration
    Validate,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Set one `section.key` value
    Set { key: String, value: String },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, stopping...");
            token.cancel();
        }
    });
}

fn print_report(report: &RunReport) {
    console::header(&format!("Run {}", report.run_id));
    for platform in &report.platforms {
        let line = match &platform.error {
            Some(error) => format!(
                "{}: {:?} ({} items) - {}",
                platform.platform, platform.status, platform.fetched, error
            ),
            None => format!(
                "{}: {:?} ({} items)",
                platform.platform, platform.status, platform.fetched
            ),
        };
        console::sub_item(&line);
    }
    let notification = match &report.notification {
        DispatchResult::Sent { attempts } => format!("sent ({attempts} attempt(s))"),
        DispatchResult::Skipped { reason } => format!("skipped ({reason:?})"),
        DispatchResult::Failed { error, .. } => format!("failed ({error})"),
    };
    console::summary(
        "Run complete",
        &[
            ("Candidates", report.candidate_count.to_string()),
            ("Filtered out", report.filtered_out.to_string()),
            ("New", report.new_count.to_string()),
            ("Refreshed", report.refreshed_count.to_string()),
            ("Total stored", report.total_count.to_string()),
            ("Notification", notification),
        ],
    );
}

async fn load_table(path: &Path) -> Result<Vec<hackathon_monitor::models::CanonicalRecord>> {
    LocalStorage::new(path).load().await
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.data_dir.join("config.toml"));

    // `config set` edits the file itself; everything else reads it.
    if let Command::Config {
        action: ConfigAction::Set { key, value },
    } = &cli.command
    {
        Config::set(&config_path, key, value)?;
        console::success(&format!("{key} = {value}"));
        return Ok(());
    }

    // Read-only commands never create a config file.
    let config = match &cli.command {
        Command::Stats { .. } | Command::Export { .. } => Config::load_or_default(&config_path),
        _ => Config::load_or_init(&config_path)?,
    };
    log::debug!("Loaded configuration from {}", config_path.display());
    let store_path = config.store_path(&cli.data_dir);

    match cli.command {
        Command::Run { dry_run, json } => {
            config.validate()?;
            console::set_quiet(json);

            let mut config = config;
            let storage: Arc<dyn RecordStorage> = if dry_run {
                config.settings.notifications_enabled = false;
                let existing = load_table(&store_path).await?;
                Arc::new(MemoryStorage::with_records(existing))
            } else {
                Arc::new(LocalStorage::new(&store_path))
            };

            let aggregator = Arc::new(Aggregator::from_config(&config, storage)?);
            let scheduler = Scheduler::from_config(aggregator, &config);

            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let ctx = RunContext::new(Utc::now()).with_cancel(cancel);

            match scheduler.trigger(&ctx).await {
                TriggerOutcome::Completed(report) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print_report(&report);
                        if dry_run {
                            console::warn("Dry run: table not written");
                        }
                    }
                }
                TriggerOutcome::Failed(e) => return Err(e),
                TriggerOutcome::Skipped => console::warn("Another run is in progress"),
            }
        }

        Command::Monitor { interval_hours } => {
            let mut config = config;
            if let Some(hours) = interval_hours {
                config.settings.interval_hours = hours;
            }
            config.validate()?;

            let storage = Arc::new(LocalStorage::new(&store_path));
            let aggregator = Arc::new(Aggregator::from_config(&config, storage)?);
            let scheduler = Scheduler::from_config(aggregator, &config);

            console::header("Hackathon Monitor");
            console::sub_item(&format!("Table: {}", store_path.display()));
            console::sub_item(&format!("Interval: {:?}", scheduler.interval()));
            console::sub_item(&format!(
                "Platforms: {}",
                config
                    .platforms
                    .enabled()
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));

            let shutdown = CancellationToken::new();
            cancel_on_ctrl_c(shutdown.clone());
            scheduler.run_loop(shutdown).await;
        }

        Command::Stats { json } => {
            let records = load_table(&store_path).await?;
            let stats = StoreStats::compute(&records, Utc::now().date_naive());
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                console::header("Hackathon Statistics");
                for line in stats.render().lines() {
                    console::sub_item(line);
                }
            }
        }

        Command::Export { format, output } => {
            let format: ExportFormat = format.parse()?;
            let records = load_table(&store_path).await?;
            let output = output.unwrap_or_else(|| {
                cli.data_dir
                    .join(format!("hackathons_export.{}", format.extension()))
            });
            export::export_to_file(&records, format, &output).await?;
            console::success(&format!(
                "Exported {} hackathons to {}",
                records.len(),
                output.display()
            ));
        }

        Command::TestNotification { message } => {
            let storage = LocalStorage::new(&store_path);
            let dispatcher = NotificationDispatcher::new(
                notifier_for(config.notifications.channel),
                &config.notifications,
            );
            let summary = NotificationSummary {
                title: "Hackathon Monitor".into(),
                body: message.unwrap_or_else(|| "Test notification - delivery works".into()),
                count: 0,
                open_action: storage.open_action(),
            };
            match dispatcher.send_direct(&summary).await {
                DispatchResult::Failed { error, .. } => {
                    return Err(AppError::notification(error));
                }
                _ => console::success("Notification sent"),
            }
        }

        Command::Config { action } => match action {
            ConfigAction::Show => print!("{}", config.to_toml()?),
            ConfigAction::Set { .. } => {}
        },

        Command::Validate => {
            console::info("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            console::success(&format!("Config OK ({})", config_path.display()));
        }
    }

    Ok(())
}
