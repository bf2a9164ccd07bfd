use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(name = "roomshift", version, about = "Room-change planner CLI")]
struct Cli {
    /// Treat this local instant as "now" (YYYY-MM-DDTHH:MM)
    #[arg(long, global = true, value_parser = parse_now)]
    now: Option<NaiveDateTime>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Announcement rules
    Rules {
        #[command(subcommand)]
        action: commands::rules::RulesAction,
    },
    /// Occurrences on one date
    Day(commands::day::DayArgs),
    /// Upcoming changes, grouped by day
    Agenda(commands::agenda::AgendaArgs),
    /// Class or teacher selection
    Audience {
        #[command(subcommand)]
        action: commands::audience::AudienceAction,
    },
    /// Time slot overrides and ignored hours
    Slots {
        #[command(subcommand)]
        action: commands::slots::SlotsAction,
    },
    /// Day notes
    Notes {
        #[command(subcommand)]
        action: commands::notes::NotesAction,
    },
    /// Notification planning
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn parse_now(raw: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| format!("invalid instant '{raw}', expected YYYY-MM-DDTHH:MM"))
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let command = match cli.command {
        Commands::Config { action } => return commands::config::run(action),
        other => other,
    };

    let ctx = Context::open(cli.now)?;
    init_tracing(&ctx.config.log.level);

    match command {
        Commands::Rules { action } => commands::rules::run(action, &ctx).await,
        Commands::Day(args) => commands::day::run(args, &ctx).await,
        Commands::Agenda(args) => commands::agenda::run(args, &ctx).await,
        Commands::Audience { action } => commands::audience::run(action, &ctx).await,
        Commands::Slots { action } => commands::slots::run(action, &ctx).await,
        Commands::Notes { action } => commands::notes::run(action, &ctx).await,
        Commands::Notify { action } => commands::notify::run(action, &ctx).await,
        Commands::Config { .. } => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
