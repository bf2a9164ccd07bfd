use clap::Args;
use roomshift_core::storage::{load_view, or_default};
use roomshift_core::{DisplayWindow, RoomChangeStore};

use super::Context;

#[derive(Args)]
pub struct AgendaArgs {
    /// Show every day of the week ahead, including today's past classes
    #[arg(long)]
    all: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: AgendaArgs, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let window = if args.all {
        DisplayWindow::AllFuture
    } else {
        ctx.config.display.window()
    };
    let days = ctx.config.display.days(window);

    let store = ctx.store();
    let view = load_view(store.as_ref()).await;
    let dismissed = or_default("dismissed notes", store.get_dismissed_notes().await);
    let sections = view.agenda(ctx.now, window, days, &dismissed);

    if args.json {
        return super::print_json(&sections);
    }
    if view.filter.is_empty() {
        println!("no class or teacher selected (see `roomshift audience`)");
        return Ok(());
    }
    if sections.is_empty() {
        println!("no upcoming room changes");
        return Ok(());
    }
    for section in &sections {
        println!("{} ({})", section.title, section.date);
        for occurrence in &section.occurrences {
            println!("  {}", super::day::describe(occurrence));
        }
        for note in &section.notes {
            println!("  note [{}]: {}", note.note_id, note.text);
        }
    }
    Ok(())
}
