use anyhow::{Result, bail};
use chrono::Utc;
use clap::Subcommand;
use dosewatch_core::{PassOutcome, PreferencePatch, Preferences, Scheduler};

use crate::print_outcome;

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    /// Print the stored reminder preferences
    Show,

    /// Change one or more preferences; toggling a switch re-runs scheduling
    Set {
        /// Master push switch
        #[arg(long)]
        push: Option<bool>,

        /// Medication reminder switch
        #[arg(long)]
        reminders: Option<bool>,

        /// Minutes before the dose (0 disables)
        #[arg(long)]
        before: Option<u32>,

        /// Minutes after the dose (0 disables)
        #[arg(long)]
        after: Option<u32>,
    },
}

pub async fn run(cmd: PrefsCommand, scheduler: &mut Scheduler) -> Result<()> {
    match cmd {
        PrefsCommand::Show => {
            show(&scheduler.preferences());
            Ok(())
        }
        PrefsCommand::Set {
            push,
            reminders,
            before,
            after,
        } => {
            let patch = PreferencePatch {
                push_enabled: push,
                medication_reminders_enabled: reminders,
                before_offset_minutes: before,
                after_offset_minutes: after,
            };
            if patch.is_empty() {
                bail!("nothing to change (pass --push, --reminders, --before or --after)");
            }
            scheduler.prepare().await;
            let outcome = scheduler.preferences_changed(&patch, Utc::now()).await;
            show(&scheduler.preferences());
            if matches!(outcome, PassOutcome::Completed(_) | PassOutcome::Aborted(_)) {
                print_outcome(&outcome);
            }
            Ok(())
        }
    }
}

fn show(prefs: &Preferences) {
    println!("push:      {}", on_off(prefs.push_enabled));
    println!("reminders: {}", on_off(prefs.medication_reminders_enabled));
    println!("before:    {} min", prefs.before_offset_minutes);
    println!("after:     {} min", prefs.after_offset_minutes);
}

fn on_off(v: bool) -> &'static str {
    if v { "on" } else { "off" }
}
