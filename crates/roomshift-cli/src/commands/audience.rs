use clap::Subcommand;
use roomshift_core::{AudienceDirectory, AudienceFilter};

use super::Context;

#[derive(Subcommand)]
pub enum AudienceAction {
    /// Show the current selection
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow class groups (replaces any teacher selection)
    Class {
        /// Groups such as 9.A
        #[arg(required = true)]
        groups: Vec<String>,
    },
    /// Follow teachers (replaces any class selection)
    Teacher {
        /// Teacher names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Distinct groups and teachers present in the rules
    Directory {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn describe(filter: &AudienceFilter) -> String {
    let (mode, selection) = match filter {
        AudienceFilter::Class { groups } => ("class", groups),
        AudienceFilter::Teacher { teachers } => ("teacher", teachers),
    };
    if selection.is_empty() {
        format!("{mode}: (none)")
    } else {
        let items: Vec<&str> = selection.iter().map(String::as_str).collect();
        format!("{mode}: {}", items.join(", "))
    }
}

pub async fn run(action: AudienceAction, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match action {
        AudienceAction::Show { json } => {
            let filter = ctx.db()?.audience_filter()?;
            if json {
                super::print_json(&filter)?;
            } else {
                println!("{}", describe(&filter));
            }
            return Ok(());
        }
        AudienceAction::Directory { json } => {
            let directory = AudienceDirectory::from_rules(&ctx.db()?.rules()?);
            if json {
                super::print_json(&directory)?;
            } else {
                let groups: Vec<&str> = directory.groups.iter().map(String::as_str).collect();
                let teachers: Vec<&str> = directory.teachers.iter().map(String::as_str).collect();
                println!("groups: {}", groups.join(", "));
                println!("teachers: {}", teachers.join(", "));
            }
            return Ok(());
        }
        AudienceAction::Class { groups } => AudienceFilter::classes(groups),
        AudienceAction::Teacher { names } => AudienceFilter::teachers(names),
    };

    ctx.db()?.set_audience_filter(&filter)?;
    println!("{}", describe(&filter));
    ctx.replan_after_change().await;
    Ok(())
}
