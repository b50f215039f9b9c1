/// Operational CLI for the completion index engine
///
/// This binary opens the SQLite-backed engine and exposes the operational
/// controls: inspecting index diagnostics, driving backfill chunks, forcing
/// a rebuild, and verifying index consistency.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use completion_index::{
    CompletionIndexEngine, IndexStore, SqliteStore, DEFAULT_CHUNK_DAYS,
};

/// Get the default database path with robust fallback strategy
fn get_default_database_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    // Try various locations in order of preference
    let potential_paths = [
        // 1. User's home directory (preferred)
        dirs::home_dir().map(|mut p| {
            p.push(".completion_index");
            p
        }),
        // 2. User's data directory (platform-specific)
        dirs::data_dir().map(|mut p| {
            p.push("completion_index");
            p
        }),
        // 3. Current working directory (last resort)
        std::env::current_dir().ok().map(|mut p| {
            p.push(".completion_index");
            p
        }),
    ];

    for potential_path in potential_paths.iter().flatten() {
        if let Ok(()) = std::fs::create_dir_all(potential_path) {
            // Test if we can write to this directory
            let test_file = potential_path.join(".test_write");
            if std::fs::write(&test_file, "test").is_ok() {
                let _ = std::fs::remove_file(&test_file);
                let mut db_path = potential_path.clone();
                db_path.push("completions.db");
                return Ok(db_path);
            }
        }
    }

    // Ultimate fallback: use a temporary directory
    let mut temp_path = std::env::temp_dir();
    temp_path.push("completion_index");
    std::fs::create_dir_all(&temp_path)?;
    temp_path.push("completions.db");

    tracing::warn!("Using temporary directory for database: {}", temp_path.display());
    Ok(temp_path)
}

/// Command line arguments for the completion index CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    /// If not provided, uses a default location in the user's home directory
    #[arg(long)]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print index diagnostics as JSON
    Status,
    /// Extend indexed coverage further into the past
    Backfill {
        /// Days of history each chunk covers
        #[arg(long, default_value_t = DEFAULT_CHUNK_DAYS)]
        chunk_days: u32,
        /// Keep chunking until coverage reaches the oldest data
        #[arg(long)]
        all: bool,
    },
    /// Force a full index rebuild on the next session, then run it
    Rebuild,
    /// Check whether the persisted indexes validate without repair
    Verify,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up logging based on command line flags
    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("completion_index={}", log_level))
        .with_writer(std::io::stderr) // Diagnostics JSON goes to stdout alone
        .init();

    // Determine database path
    let db_path = match args.database {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            path
        }
        None => get_default_database_path()?,
    };

    info!("Using database at: {}", db_path.display());
    let store = SqliteStore::new(db_path)?;

    match args.command {
        Command::Status => {
            let mut engine = CompletionIndexEngine::new(store);
            let status = engine.optimization_status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            engine.close()?;
        }
        Command::Backfill { chunk_days, all } => {
            let mut engine = CompletionIndexEngine::new(store);
            let mut chunks = 0u32;
            while engine.backfill_next_chunk(chunk_days).await? {
                chunks += 1;
                if !all {
                    break;
                }
            }
            let status = engine.optimization_status().await;
            info!(chunks, backfill_complete = status.backfill_complete, "backfill run finished");
            println!("{}", serde_json::to_string_pretty(&status)?);
            engine.close()?;
        }
        Command::Rebuild => {
            // Flag the persisted metadata so the next session start runs
            // the rebuild, then open a session to run it now.
            if let Some(mut metadata) = store.load_index_metadata()? {
                metadata.rebuild_needed = true;
                store.save_index_metadata(&metadata)?;
            }
            let mut engine = CompletionIndexEngine::new(store);
            let status = engine.optimization_status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            engine.close()?;
        }
        Command::Verify => {
            let mut engine = CompletionIndexEngine::new(store);
            let status = engine.optimization_status().await;
            // A session that opened without a rebuild means the persisted
            // indexes validated as-is.
            match (status.use_indexes, status.last_rebuild_reason) {
                (true, None) => println!("indexes consistent"),
                (true, Some(reason)) => {
                    println!("indexes repaired (reason: {:?})", reason);
                }
                (false, _) => {
                    println!("indexes inconsistent; queries fall back to store scans");
                    engine.close()?;
                    std::process::exit(1);
                }
            }
            engine.close()?;
        }
    }

    Ok(())
}
