use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use todo_sync_core::{csv, Importance, SyncConfig, SyncError, SyncHandle, SyncState, SyncWorker, TodoItem};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "todo")]
#[command(about = "Local-first todo list synced with a REST backend", long_about = None)]
struct Cli {
    /// Config file (defaults to config.json in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show all items, most recently touched first
    List,
    /// Add an item
    Add {
        text: String,
        /// low, basic or important
        #[arg(short, long, default_value = "basic")]
        importance: Importance,
        /// Due date, YYYY-MM-DD
        #[arg(short, long)]
        deadline: Option<NaiveDate>,
    },
    /// Toggle an item's done flag
    Done { id: String },
    /// Change an item's text, and optionally its importance or deadline
    Edit {
        id: String,
        text: String,
        #[arg(short, long)]
        importance: Option<Importance>,
        #[arg(short, long)]
        deadline: Option<NaiveDate>,
    },
    /// Delete an item
    Rm { id: String },
    /// Reconcile with the server now
    Sync,
    /// Write all items to a CSV file
    ExportCsv { path: PathBuf },
    /// Add every item from a CSV file
    ImportCsv { path: PathBuf },
    /// Show revision, sync state and item count
    Status,
}

impl Commands {
    /// Commands that are pointless without the current list.
    fn needs_list(&self) -> bool {
        matches!(self, Commands::List | Commands::ExportCsv { .. })
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let coordinator = config.coordinator().context("Failed to open todo store")?;
    let worker = SyncWorker::spawn(coordinator).context("Failed to start sync worker")?;
    let handle = worker.handle();

    if let Err(e) = handle.load().wait() {
        if cli.command.needs_list() {
            return Err(e).context("Failed to load items");
        }
        warn!(error = %e, "no items loaded; continuing offline");
    }

    let result = run(&handle, cli.command);

    // Let the network leg of the last mutation finish before exiting.
    handle.flush().wait()?;
    let status = handle.status().wait()?;
    if status.state == SyncState::Dirty {
        eprintln!("Changes saved locally; they will sync on the next successful request");
    }
    worker.shutdown();
    result
}

fn run(handle: &SyncHandle, command: Commands) -> Result<()> {
    match command {
        Commands::List => {
            let items = handle.items().wait()?;
            if items.is_empty() {
                println!("No items");
            }
            for item in &items {
                println!("{}", format_item(item));
            }
        }

        Commands::Add { text, importance, deadline } => {
            let item = TodoItem::new(text, importance, deadline.map(start_of_day)).context("Invalid item")?;
            let id = item.id.clone();
            handle.add(item).wait().context("Failed to add item")?;
            println!("Added {id}");
        }

        Commands::Done { id } => {
            handle.toggle_done(&id).wait().with_context(|| format!("Failed to toggle {id}"))?;
            let item = handle.items().wait()?.into_iter().find(|i| i.id == id);
            match item {
                Some(item) if item.is_done => println!("Done: {}", item.text),
                Some(item) => println!("Not done: {}", item.text),
                None => println!("Toggled {id}"),
            }
        }

        Commands::Edit { id, text, importance, deadline } => {
            let current = find(handle, &id)?;
            let edited = current
                .edited(
                    text,
                    importance.unwrap_or(current.importance),
                    deadline.map(start_of_day).or(current.deadline),
                )
                .context("Invalid item")?;
            handle.update(edited).wait().with_context(|| format!("Failed to edit {id}"))?;
            println!("Updated {id}");
        }

        Commands::Rm { id } => {
            handle.delete(&id).wait().with_context(|| format!("Failed to delete {id}"))?;
            println!("Deleted {id}");
        }

        Commands::Sync => {
            handle.sync().wait().context("Sync failed")?;
            let status = handle.status().wait()?;
            println!("Synced at revision {}", status.revision);
        }

        Commands::ExportCsv { path } => {
            let items = handle.items().wait()?;
            csv::write_file(&path, &items).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported {} items to {}", items.len(), path.display());
        }

        Commands::ImportCsv { path } => {
            let items = csv::read_file(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let total = items.len();
            let mut added = 0;
            for item in items {
                let id = item.id.clone();
                match handle.add(item).wait() {
                    Ok(()) => added += 1,
                    Err(SyncError::DuplicateId(_)) => eprintln!("Skipped {id}: already exists"),
                    Err(e) => return Err(e).with_context(|| format!("Failed to import {id}")),
                }
            }
            println!("Imported {added} of {total} items");
        }

        Commands::Status => {
            let status = handle.status().wait()?;
            let state = match status.state {
                SyncState::Clean => "clean",
                SyncState::Dirty => "dirty",
            };
            println!("revision: {}", status.revision);
            println!("state:    {state}");
            println!("items:    {}", status.item_count);
        }
    }
    Ok(())
}

fn find(handle: &SyncHandle, id: &str) -> Result<TodoItem> {
    match handle.items().wait()?.into_iter().find(|i| i.id == id) {
        Some(item) => Ok(item),
        None => bail!("No item with id {id}"),
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn format_item(item: &TodoItem) -> String {
    let mark = if item.is_done { "x" } else { " " };
    let mut line = format!("[{mark}] {}  {}", item.id, item.text);
    match item.importance {
        Importance::Important => line.push_str("  !"),
        Importance::Low => line.push_str("  (low)"),
        Importance::Basic => {}
    }
    if let Some(deadline) = item.deadline {
        line.push_str(&format!("  due {}", deadline.format("%Y-%m-%d")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use todo_sync_core::types::from_unix;

    #[test]
    fn parses_add_with_flags() {
        let cli = Cli::try_parse_from(["todo", "add", "buy milk", "-i", "important", "--deadline", "2024-03-01"])
            .unwrap();
        match cli.command {
            Commands::Add { text, importance, deadline } => {
                assert_eq!(text, "buy milk");
                assert_eq!(importance, Importance::Important);
                assert_eq!(deadline, NaiveDate::from_ymd_opt(2024, 3, 1));
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn rejects_unknown_importance() {
        assert!(Cli::try_parse_from(["todo", "add", "x", "-i", "urgent"]).is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["todo", "status", "--config", "/tmp/c.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(!cli.command.needs_list());
    }

    #[test]
    fn deadline_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(start_of_day(date).timestamp(), 1_709_251_200);
    }

    #[test]
    fn formats_done_important_item() {
        let item = TodoItem {
            id: "1".to_string(),
            text: "file taxes".to_string(),
            importance: Importance::Important,
            deadline: Some(from_unix(1_709_251_200).unwrap()),
            is_done: true,
            date_created: from_unix(1_700_000_000).unwrap(),
            date_edited: None,
        };
        assert_eq!(format_item(&item), "[x] 1  file taxes  !  due 2024-03-01");
    }
}
