use clap::Args;
use roomshift_core::calendar::parse_local_date;
use roomshift_core::storage::load_view;
use roomshift_core::Occurrence;

use super::Context;

#[derive(Args)]
pub struct DayArgs {
    /// Date to show (YYYY-MM-DD), defaults to today
    #[arg(long)]
    date: Option<String>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// One agenda line: label, time, group, teacher and the room move.
pub fn describe(occurrence: &Occurrence) -> String {
    let rule = &occurrence.rule;
    let time = occurrence.display_time();
    format!(
        "{:>4}. {:<13}  {}  {}  {} -> {}",
        occurrence.display_class_label,
        if time.is_empty() { "--:--" } else { time.as_str() },
        rule.group,
        rule.teacher_name().unwrap_or("Unknown teacher"),
        rule.original_room.as_deref().unwrap_or("?"),
        rule.new_room.as_deref().unwrap_or("Unknown"),
    )
}

pub async fn run(args: DayArgs, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let date = match args.date.as_deref() {
        Some(raw) => parse_local_date(raw).ok_or_else(|| format!("invalid date: {raw}"))?,
        None => ctx.now.date(),
    };

    let view = load_view(ctx.store().as_ref()).await;
    let occurrences = view.occurrences_on(date);

    if args.json {
        return super::print_json(&occurrences);
    }
    if view.filter.is_empty() {
        println!("no class or teacher selected (see `roomshift audience`)");
        return Ok(());
    }
    println!("{}", date.format("%A %Y-%m-%d"));
    if occurrences.is_empty() {
        println!("  no room changes");
    }
    for occurrence in &occurrences {
        println!("  {}", describe(occurrence));
    }
    Ok(())
}
