//! Notification commands for CLI.
//!
//! The CLI schedules into a local outbox; `notify due` plays the part of
//! the device and delivers whatever has come due.

use clap::Subcommand;
use roomshift_core::{NotificationSink, NotificationTrigger};

use super::{print_report, Context};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Turn notifications on and plan them
    Enable,
    /// Turn notifications off and clear the schedule
    Disable,
    /// Rebuild the notification schedule
    Replan {
        /// Only replan when the re-arm cooldown has passed
        #[arg(long)]
        if_due: bool,
    },
    /// List scheduled notifications
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deliver and remove notifications whose time has come
    Due,
    /// Schedule a test notification
    Test,
}

fn print_trigger(trigger: &NotificationTrigger) {
    println!(
        "[{}] {}  {}",
        trigger.id,
        trigger.fire_at.format("%Y-%m-%d %H:%M:%S"),
        trigger.title
    );
    println!("    {}", trigger.body);
}

pub async fn run(action: NotifyAction, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        NotifyAction::Enable | NotifyAction::Disable => {
            let enabled = matches!(action, NotifyAction::Enable);
            ctx.db()?.set_notifications_enabled(enabled)?;
            let report = ctx.planner().replan(ctx.now).await?;
            print_report(&report);
        }
        NotifyAction::Replan { if_due } => {
            let planner = ctx.planner();
            if if_due {
                match planner.replan_if_due(ctx.now).await? {
                    Some(report) => print_report(&report),
                    None => println!("replan not due"),
                }
            } else {
                print_report(&planner.replan(ctx.now).await?);
            }
        }
        NotifyAction::Pending { json } => {
            let pending = ctx.sink().pending().await?;
            if json {
                return super::print_json(&pending);
            }
            if pending.is_empty() {
                println!("no notifications scheduled");
            }
            for trigger in &pending {
                print_trigger(trigger);
            }
        }
        NotifyAction::Due => {
            for trigger in ctx.sink().due(ctx.now)? {
                print_trigger(&trigger);
            }
        }
        NotifyAction::Test => {
            let trigger = ctx.planner().send_test(ctx.now).await?;
            println!(
                "test notification scheduled for {}",
                trigger.fire_at.format("%H:%M:%S")
            );
        }
    }
    Ok(())
}
