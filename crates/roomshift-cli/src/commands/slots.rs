//! Time slot override and ignored-hour commands for CLI.

use clap::Subcommand;
use roomshift_core::rule::CLASS_HOURS;
use roomshift_core::timeslot::{default_timetable, parse_hhmm};
use roomshift_core::{SchoolDay, TimeSlotOverride};
use serde::Serialize;
use std::collections::BTreeSet;

use super::Context;

#[derive(Subcommand)]
pub enum SlotsAction {
    /// Show the default timetable, overrides and ignored hours
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Override the time of a set of class hours on a weekday
    Override {
        /// Weekday (HETFO..PENTEK or MON..FRI)
        day: SchoolDay,
        /// Comma-separated class hours
        #[arg(long, value_delimiter = ',', required = true)]
        hours: Vec<u8>,
        /// Start time (HH:MM)
        #[arg(long)]
        start: String,
        /// End time (HH:MM)
        #[arg(long)]
        end: String,
        /// Label shown instead of the hour numbers
        #[arg(long)]
        label: Option<String>,
    },
    /// Remove every override of a weekday
    Clear { day: SchoolDay },
    /// Suppress a class hour on a weekday
    Ignore { day: SchoolDay, hour: u8 },
    /// Stop suppressing a class hour on a weekday
    Unignore { day: SchoolDay, hour: u8 },
}

#[derive(Serialize)]
struct SlotListing {
    overrides: roomshift_core::TimeSlotOverrides,
    ignored: roomshift_core::IgnoredHours,
}

fn check_hour(hour: u8) -> Result<(), Box<dyn std::error::Error>> {
    if CLASS_HOURS.contains(&hour) {
        Ok(())
    } else {
        Err(format!("class hour {hour} is outside 1..=9").into())
    }
}

pub async fn run(action: SlotsAction, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SlotsAction::List { json } => {
            let db = ctx.db()?;
            let listing = SlotListing {
                overrides: db.overrides()?,
                ignored: db.ignored_hours()?,
            };
            if json {
                return super::print_json(&listing);
            }
            println!("default timetable:");
            for period in default_timetable() {
                println!(
                    "  {}. {} - {}",
                    period.class_hour,
                    period.start.format("%H:%M"),
                    period.end.format("%H:%M")
                );
            }
            for (day, overrides) in &listing.overrides {
                for o in overrides {
                    let hours: Vec<String> = o.class_hours.iter().map(u8::to_string).collect();
                    println!(
                        "{day}: hours {} -> {} - {} (label {})",
                        hours.join(","),
                        o.start_time.format("%H:%M"),
                        o.end_time.format("%H:%M"),
                        o.label()
                    );
                }
            }
            for (day, hours) in &listing.ignored {
                let hours: Vec<String> = hours.iter().map(u8::to_string).collect();
                println!("{day}: ignored {}", hours.join(", "));
            }
            return Ok(());
        }
        SlotsAction::Override {
            day,
            hours,
            start,
            end,
            label,
        } => {
            for hour in &hours {
                check_hour(*hour)?;
            }
            let start_time = parse_hhmm(&start)?;
            let end_time = parse_hhmm(&end)?;
            if end_time <= start_time {
                return Err(format!("end {end} is not after start {start}").into());
            }
            let entry = TimeSlotOverride {
                class_hours: hours.into_iter().collect(),
                start_time,
                end_time,
                display_label: label,
            };
            let db = ctx.db()?;
            let mut overrides = db.overrides()?;
            overrides.entry(day).or_default().push(entry);
            db.set_overrides(&overrides)?;
            println!("override added for {day}");
        }
        SlotsAction::Clear { day } => {
            let db = ctx.db()?;
            let mut overrides = db.overrides()?;
            let removed = overrides.remove(&day).map_or(0, |o| o.len());
            db.set_overrides(&overrides)?;
            println!("removed {removed} overrides for {day}");
        }
        SlotsAction::Ignore { day, hour } => {
            check_hour(hour)?;
            let db = ctx.db()?;
            let mut ignored = db.ignored_hours()?;
            ignored.entry(day).or_insert_with(BTreeSet::new).insert(hour);
            db.set_ignored_hours(&ignored)?;
            println!("hour {hour} ignored on {day}");
        }
        SlotsAction::Unignore { day, hour } => {
            let db = ctx.db()?;
            let mut ignored = db.ignored_hours()?;
            if let Some(hours) = ignored.get_mut(&day) {
                hours.remove(&hour);
                if hours.is_empty() {
                    ignored.remove(&day);
                }
            }
            db.set_ignored_hours(&ignored)?;
            println!("hour {hour} no longer ignored on {day}");
        }
    }

    ctx.replan_after_change().await;
    Ok(())
}
