mod format;
mod offline;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use kiroku_core::config::AppConfig;
use kiroku_runtime::{Library, LibraryEvent, RuntimeError};

use offline::OfflineSync;

#[derive(Parser)]
#[command(name = "kiroku")]
#[command(about = "Track shows, seasons and episodes you watch", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Use this database instead of the configured one")]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List every show in rank order")]
    List,

    #[command(about = "Show one show's seasons and episodes")]
    Show { key: String },

    #[command(about = "Import shows from a JSON library file")]
    Import { file: PathBuf },

    #[command(about = "Export the library as JSON (\"-\" for stdout)")]
    Export { file: PathBuf },

    #[command(about = "Delete a show")]
    Delete {
        key: String,
        #[arg(short, long, help = "Don't ask for confirmation")]
        yes: bool,
    },

    #[command(about = "Move a show to another rank")]
    Move { key: String, rank: usize },

    #[command(about = "Mark an episode watched")]
    Watch {
        key: String,
        #[arg(help = "Season number, starting at 1")]
        season: usize,
        #[arg(help = "Episode number, starting at 0")]
        episode: u32,
        #[arg(long, help = "Mark it unwatched instead")]
        unwatch: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Usage(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kiroku=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = tokio::spawn(run(cli)).await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
        Err(join) => {
            tracing::error!("Command failed unexpectedly: {join}");
            eprintln!("error: unknown error");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = AppConfig::load().map_err(RuntimeError::from)?;
    let sync = Arc::new(OfflineSync);
    let mut library = match &cli.db {
        Some(path) => Library::open_at(path, config, sync)?,
        None => Library::open(config, sync)?,
    };

    let mut events = library.subscribe();
    library.load().await?;

    let result = execute(&mut library, cli.command).await;
    library.flush().await?;
    print_notifications(&mut events);
    result
}

async fn execute(library: &mut Library<OfflineSync>, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::List => {
            for show in library.shows() {
                println!("{}", format::show_line(show));
            }
        }
        Commands::Show { key } => {
            let show = library
                .get(&key)
                .ok_or_else(|| RuntimeError::NotFound(key.clone()))?;
            print!("{}", format::show_details(show));
        }
        Commands::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let report = library.import(&json).await?;
            println!(
                "Imported {} new, {} replaced, {} rejected, {} duplicate",
                report.added,
                report.replaced,
                report.rejected.len(),
                report.duplicates.len()
            );
        }
        Commands::Export { file } => {
            let json = library.export()?;
            if file.as_os_str() == "-" {
                println!("{json}");
            } else {
                std::fs::write(&file, json)?;
                println!("Exported {} shows to {}", library.len(), file.display());
            }
        }
        Commands::Delete { key, yes } => {
            let title = library
                .get(&key)
                .map(|show| show.title().to_string())
                .ok_or_else(|| RuntimeError::NotFound(key.clone()))?;
            if library.config().library.confirm_delete && !yes && !confirm(&format!("Delete \"{title}\"?"))? {
                return Ok(());
            }
            library.delete(&key).await?;
            println!("Deleted \"{title}\"");
        }
        Commands::Move { key, rank } => {
            let from = library
                .position(&key)
                .ok_or_else(|| RuntimeError::NotFound(key.clone()))?;
            library.move_show(from, rank).await?;
        }
        Commands::Watch {
            key,
            season,
            episode,
            unwatch,
        } => {
            let season_index = season
                .checked_sub(1)
                .ok_or_else(|| CliError::Usage("seasons are numbered from 1".into()))?;
            let transition = library.set_episode_watched(&key, season_index, episode, !unwatch)?;
            if transition.is_none() {
                println!("Nothing changed");
            }
        }
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool, CliError> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_notifications(events: &mut broadcast::Receiver<LibraryEvent>) {
    while let Ok(event) = events.try_recv() {
        if let LibraryEvent::Notify(note) = event {
            eprintln!("{}", format::notification(&note));
        }
    }
}
