use clap::Subcommand;

use super::Context;

#[derive(Subcommand)]
pub enum NotesAction {
    /// Hide a day note from the agenda
    Dismiss {
        /// Note id as printed by `roomshift agenda`
        note_id: String,
    },
}

pub async fn run(action: NotesAction, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        NotesAction::Dismiss { note_id } => {
            if ctx.db()?.dismiss_note(&note_id)? {
                println!("dismissed {note_id}");
            } else {
                println!("{note_id} was already dismissed");
            }
        }
    }
    Ok(())
}
