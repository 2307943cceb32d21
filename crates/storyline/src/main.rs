//! Storyline CLI binary.
//!
//! This binary drives a role-play session stored on disk:
//! - Write the opening record
//! - Run turns against scripted collaborators
//! - Inspect, recompute and roll back variable state

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, Session};

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    storyline::init_tracing(level, cli.json_logs)?;

    let config = match &cli.config {
        Some(path) => storyline::StorylineConfig::from_file(path)?,
        None => storyline::StorylineConfig::load()?,
    };

    match cli.command {
        Commands::Init { opening } => {
            let mut session = Session::open(config, None).await?;
            session.init(opening.as_deref()).await?;
        }

        Commands::Say {
            text,
            replies,
            raw,
        } => {
            let session = Session::open(config, Some(&replies)).await?;
            session.say(&text, !raw).await?;
        }

        Commands::State => {
            let session = Session::open(config, None).await?;
            session.print_state();
        }

        Commands::Undo { count } => {
            let mut session = Session::open(config, None).await?;
            session.undo(count).await?;
        }

        Commands::Recalc { text, phase } => {
            let session = Session::open(config, None).await?;
            session.recalc(&text, phase)?;
        }

        Commands::History { depth } => {
            let session = Session::open(config, None).await?;
            session.print_history(depth);
        }
    }

    Ok(())
}
