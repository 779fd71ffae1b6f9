use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dosewatch_core::adapter::{CommandNotifier, EnvProbe, detect};
use dosewatch_core::{
    FileStore, IntakeStore, KeyValueStore, NullReporter, PassOutcome, PreferenceRepository,
    Reporter, Scheduler, TracingReporter, compile,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod intakes;
mod prefs_cmd;
mod state;

use crate::config::{Config, config_path, init_config, load_config};
use crate::console::ConsoleReporter;
use crate::intakes::JsonIntakeStore;
use crate::prefs_cmd::PrefsCommand;

#[derive(Parser, Debug)]
#[command(
    name = "dosewatch",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("DOSEWATCH_BUILD_DESCRIBE"), ")"),
    about = "Medication reminder scheduler"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start-up trigger: restore state and arm upcoming reminders silently
    Mount,

    /// Cancel every armed reminder and schedule again from scratch
    Reschedule,

    /// Reminder preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },

    /// Notification permission
    Permission {
        #[command(subcommand)]
        command: PermissionCommand,
    },

    /// Show a test notification (needs granted permission)
    Test,

    /// List armed reminders
    Armed,

    /// Show reminders that are due now (run from cron/launchd)
    Deliver,

    /// Print the reminders that would be armed, without arming anything
    Preview {
        /// Evaluate as of this RFC 3339 instant (default: now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Config file helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PermissionCommand {
    /// Ask for permission; a new grant schedules reminders
    Request,
    /// Print the backend and its permission state
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default ~/.dosewatch/config.toml
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dosewatch=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => init_config()?,
            ConfigCommand::Show => show_config(&load_config()?)?,
        },

        Command::Mount => {
            let mut scheduler = build_scheduler(&load_config()?, Arc::new(TracingReporter))?;
            let outcome = scheduler.mount(Utc::now()).await;
            print_outcome(&outcome);
            if let PassOutcome::Aborted(reason) = outcome {
                bail!("scheduling pass aborted: {reason}");
            }
        }

        Command::Reschedule => {
            let mut scheduler = build_scheduler(&load_config()?, Arc::new(ConsoleReporter))?;
            scheduler.prepare().await;
            let outcome = scheduler.reschedule_all(Utc::now(), true).await;
            if let PassOutcome::Aborted(reason) = outcome {
                bail!("scheduling pass aborted: {reason}");
            }
        }

        Command::Prefs { command } => {
            let mut scheduler = build_scheduler(&load_config()?, Arc::new(TracingReporter))?;
            prefs_cmd::run(command, &mut scheduler).await?;
        }

        Command::Permission { command } => {
            let mut scheduler = build_scheduler(&load_config()?, Arc::new(ConsoleReporter))?;
            scheduler.prepare().await;
            match command {
                PermissionCommand::Request => {
                    let granted = scheduler
                        .request_permission(Utc::now())
                        .await
                        .context("permission request failed")?;
                    println!("permission: {granted:?}");
                    println!("armed: {}", scheduler.scheduled_count());
                }
                PermissionCommand::Status => {
                    let system = scheduler.system();
                    println!("backend:   {}", system.mode);
                    println!("supported: {}", system.is_supported);
                    println!("permission: {:?}", scheduler.state().permission);
                    println!("enabled:   {}", scheduler.can_schedule());
                }
            }
        }

        Command::Test => {
            let mut scheduler = build_scheduler(&load_config()?, Arc::new(ConsoleReporter))?;
            scheduler.prepare().await;
            if !scheduler.send_test_notification().await {
                bail!("test notification was not shown");
            }
        }

        Command::Armed => {
            let scheduler = build_scheduler(&load_config()?, Arc::new(NullReporter))?;
            let device = scheduler.config().clock.device();
            let mut armed = scheduler.system().adapter.list_armed().await?;
            armed.sort_by_key(|a| a.fire_at);
            if armed.is_empty() {
                println!("No reminders armed.");
            }
            for a in armed {
                println!(
                    "{}  {:>11}  {}",
                    a.fire_at.with_timezone(&device).format("%Y-%m-%d %H:%M %Z"),
                    a.id,
                    a.title
                );
            }
        }

        Command::Deliver => {
            let scheduler = build_scheduler(&load_config()?, Arc::new(NullReporter))?;
            let shown = scheduler.system().adapter.deliver_due(Utc::now()).await?;
            println!("Delivered {shown} reminder(s)");
        }

        Command::Preview { at } => preview(&load_config()?, at.as_deref()).await?,
    }

    Ok(())
}

fn build_scheduler(cfg: &Config, reporter: Arc<dyn Reporter>) -> Result<Scheduler> {
    let root = state::storage_dir()?;
    let store: Arc<dyn KeyValueStore> = Arc::new(
        FileStore::open(&root).with_context(|| format!("open store at {}", root.display()))?,
    );
    let notifier = CommandNotifier::detect();
    let system = detect(&EnvProbe::new(notifier.clone()), store.clone(), Arc::new(notifier));
    let intakes = Arc::new(JsonIntakeStore::new(cfg.intakes_path()?));

    let mut scheduler = Scheduler::new(cfg.engine_config()?, system, intakes, store, reporter);
    scheduler.set_user(cfg.session.user_id.clone());
    Ok(scheduler)
}

async fn preview(cfg: &Config, at: Option<&str>) -> Result<()> {
    let engine = cfg.engine_config()?;
    let user_id = cfg
        .session
        .user_id
        .as_deref()
        .context("no [session] user_id in config")?;
    let now = match at {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("parse --at {s}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let root = state::storage_dir()?;
    let store = Arc::new(
        FileStore::open(&root).with_context(|| format!("open store at {}", root.display()))?,
    );
    let prefs = PreferenceRepository::open(store).current();
    let intakes = JsonIntakeStore::new(cfg.intakes_path()?)
        .pending_between(user_id, now, now + engine.lookahead)
        .await?;

    let windows = compile(&intakes, &prefs, now, &engine.clock, engine.lookahead);
    println!(
        "{} intake(s), {} reminder(s) as of {} ({})",
        intakes.len(),
        windows.len(),
        now.with_timezone(&engine.clock.reference()).format("%Y-%m-%d %H:%M %Z"),
        engine.clock.reference()
    );
    if !prefs.reminders_on() {
        println!("(reminders are switched off; nothing would be armed)");
    }
    let device = engine.clock.device();
    for w in &windows {
        println!(
            "{}  {:<6}  {:>11}  {}",
            w.fire_at.with_timezone(&device).format("%Y-%m-%d %H:%M %Z"),
            w.kind.id_suffix(),
            w.alert_id(),
            w.body.replace('\n', " / ")
        );
    }
    Ok(())
}

fn show_config(cfg: &Config) -> Result<()> {
    println!("# {}", config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg).context("serialize config")?);
    let tz_env = std::env::var("TZ").ok();
    println!("\n# device timezone in use: {}", cfg.device_timezone(tz_env.as_deref()));
    println!("# intakes file: {}", cfg.intakes_path()?.display());
    println!("# store: {}", state::storage_dir()?.display());
    Ok(())
}

pub(crate) fn print_outcome(outcome: &PassOutcome) {
    match outcome {
        PassOutcome::Completed(r) => println!(
            "Armed {} reminder(s) for {}/{} intake(s); {} already armed, {} failed, {} denied",
            r.armed, r.intakes_armed, r.intakes, r.duplicates, r.failures, r.denied
        ),
        PassOutcome::Skipped(reason) => println!("No scheduling pass ({reason:?})"),
        PassOutcome::Aborted(reason) => println!("Scheduling pass aborted: {reason}"),
    }
}
