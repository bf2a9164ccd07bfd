//! Announcement rule commands for CLI.

use chrono::NaiveDate;
use clap::Subcommand;
use roomshift_core::calendar::parse_local_date;
use roomshift_core::recurrence::occurrence_dates_in_horizon;
use roomshift_core::{ChangeRule, RawChangeRecord, Recurrence, RuleSet};
use serde::Serialize;
use std::path::PathBuf;

use super::Context;

#[derive(Subcommand)]
pub enum RulesAction {
    /// Replace the stored rules with records from a JSON file
    Import {
        /// JSON array of announcement records
        file: PathBuf,
    },
    /// List stored rules
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove rules whose last day has passed
    Prune,
    /// List the dates each rule applies on from today
    Expand {
        /// Last date to expand to (YYYY-MM-DD); defaults to the
        /// `[recurrence]` horizon for open-ended rules
        #[arg(long)]
        until: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Expansion {
    source_id: String,
    class_hour: u8,
    group: String,
    dates: Vec<NaiveDate>,
}

fn describe(rule: &ChangeRule) -> String {
    let when = match &rule.recurrence {
        Recurrence::Single { date } => date.to_string(),
        Recurrence::Range {
            start_date,
            end_date,
        } => format!("{} {start_date}..{end_date}", rule.weekday),
        Recurrence::Indefinite { start_date } => format!("{} from {start_date}", rule.weekday),
    };
    format!(
        "{when}  {}. hour  {}  {}  {} -> {}",
        rule.class_hour,
        rule.group,
        rule.teacher_name().unwrap_or("-"),
        rule.original_room.as_deref().unwrap_or("?"),
        rule.new_room.as_deref().unwrap_or("?"),
    )
}

pub async fn run(action: RulesAction, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        RulesAction::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let records: Vec<RawChangeRecord> = serde_json::from_str(&content)?;
            let (set, skipped) = RuleSet::from_records(records);
            ctx.db()?.set_rules(set.rules())?;
            println!("imported {} rules ({skipped} skipped)", set.len());
            ctx.replan_after_change().await;
        }
        RulesAction::List { json } => {
            let rules = ctx.db()?.rules()?;
            if json {
                super::print_json(&rules)?;
            } else if rules.is_empty() {
                println!("no rules");
            } else {
                for rule in &rules {
                    println!("{}", describe(rule));
                }
            }
        }
        RulesAction::Prune => {
            let removed = {
                let db = ctx.db()?;
                let mut set = RuleSet::new(db.rules()?);
                let removed = set.retain_active(ctx.now.date());
                if removed > 0 {
                    db.set_rules(set.rules())?;
                }
                removed
            };
            println!("removed {removed} expired rules");
            if removed > 0 {
                ctx.replan_after_change().await;
            }
        }
        RulesAction::Expand { until, json } => {
            let until = match until.as_deref() {
                Some(raw) => {
                    Some(parse_local_date(raw).ok_or_else(|| format!("invalid date: {raw}"))?)
                }
                None => None,
            };
            let today = ctx.now.date();
            let expansions: Vec<Expansion> = ctx
                .db()?
                .rules()?
                .into_iter()
                .map(|rule| Expansion {
                    dates: occurrence_dates_in_horizon(
                        &rule,
                        today,
                        until,
                        today,
                        &ctx.config.recurrence,
                    )
                    .collect(),
                    source_id: rule.source_id,
                    class_hour: rule.class_hour,
                    group: rule.group,
                })
                .collect();
            if json {
                return super::print_json(&expansions);
            }
            for expansion in &expansions {
                let dates: Vec<String> = expansion.dates.iter().map(NaiveDate::to_string).collect();
                println!(
                    "{} ({}. hour, {}): {}",
                    expansion.source_id,
                    expansion.class_hour,
                    expansion.group,
                    if dates.is_empty() { "-".to_string() } else { dates.join(", ") }
                );
            }
        }
    }
    Ok(())
}
