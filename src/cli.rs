//! Terminal front end: starts the scanner, prints every state change as a
//! JSON line and reads user commands from stdin.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::commands::{self, PipelineState};
use crate::config::{ScannerConfig, SourceConfig};

/// Scan physical trading cards into a deck list
#[derive(Parser, Debug)]
#[command(name = "decklist-scanner")]
#[command(about = "Identify trading cards from a camera feed and build a deck list")]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, default_value = "scanner.toml")]
    pub config: PathBuf,

    /// Card database JSON (overrides the config)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Replay still photos from a directory
    #[arg(long, conflicts_with_all = ["window", "video"])]
    pub stills: Option<PathBuf>,

    /// Capture a window whose title contains this text (repeatable)
    #[arg(long)]
    pub window: Vec<String>,

    /// Read a video file or device (needs the `video` feature)
    #[arg(long, conflicts_with = "window")]
    pub video: Option<PathBuf>,

    /// Continue a ledger saved from an earlier session
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// List capturable windows and exit
    #[arg(long)]
    pub list_windows: bool,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration.
    pub fn apply(&self, config: &mut ScannerConfig) {
        if let Some(ref catalog) = self.catalog {
            config.catalog_path = catalog.clone();
        }
        if let Some(ref path) = self.stills {
            config.source = SourceConfig::Stills { path: path.clone() };
        } else if let Some(ref path) = self.video {
            config.source = SourceConfig::Video { path: path.clone() };
        } else if !self.window.is_empty() {
            config.source = SourceConfig::Window {
                titles: self.window.clone(),
            };
        }
    }
}

/// One line of user input.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    State,
    Status,
    Commit(u32),
    Cancel,
    CancelAll,
    Name(String),
    Entry(String),
    Increment(String),
    Decrement(String),
    Delete(String),
    Dismiss,
    Candidates,
    Choices,
    Search(String),
    Debug,
    Quit,
    Help,
}

const HELP: &str = "commands: state | status | commit <n> | cancel | cancel-all | name <card name> | \
entry <id> | inc <id> | dec <id> | del <id> | dismiss | candidates | choices | search <text> | debug | quit";

fn parse_line(line: &str) -> Result<Action, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let arg = |what: &str| -> Result<String, String> {
        if rest.is_empty() {
            Err(format!("{} needs {}", word, what))
        } else {
            Ok(rest.to_string())
        }
    };

    let action = match word {
        "state" | "" => Action::State,
        "status" => Action::Status,
        "commit" => Action::Commit(
            rest.parse()
                .map_err(|_| format!("commit needs a count, got {:?}", rest))?,
        ),
        "cancel" => Action::Cancel,
        "cancel-all" => Action::CancelAll,
        "name" => Action::Name(arg("a card name")?),
        "entry" => Action::Entry(arg("an entry id")?),
        "inc" => Action::Increment(arg("an entry id")?),
        "dec" => Action::Decrement(arg("an entry id")?),
        "del" => Action::Delete(arg("an entry id")?),
        "dismiss" => Action::Dismiss,
        "candidates" => Action::Candidates,
        "choices" => Action::Choices,
        "search" => Action::Search(arg("some text")?),
        "debug" => Action::Debug,
        "quit" | "exit" => Action::Quit,
        "help" | "?" => Action::Help,
        other => return Err(format!("unknown command {:?}", other)),
    };
    Ok(action)
}

async fn dispatch(state: &PipelineState, action: Action) -> Result<serde_json::Value, String> {
    match action {
        Action::State => commands::get_scan_state(state).await,
        Action::Status => commands::get_capture_status(state).await,
        Action::Commit(count) => commands::commit_count(state, count).await,
        Action::Cancel => commands::cancel_scan(state).await,
        Action::CancelAll => commands::cancel_all(state).await,
        Action::Name(name) => commands::select_name(state, name).await,
        Action::Entry(id) => commands::select_entry(state, id).await,
        Action::Increment(id) => commands::increment_entry(state, id).await,
        Action::Decrement(id) => commands::decrement_entry(state, id).await,
        Action::Delete(id) => commands::delete_entry(state, id).await,
        Action::Dismiss => commands::dismiss_energy_hint(state).await,
        Action::Candidates => commands::candidate_entries(state).await,
        Action::Choices => commands::count_choices(state).await,
        Action::Search(query) => commands::search_names(state, query).await,
        Action::Debug => commands::save_debug_frame(state).await.map(|p| serde_json::json!(p)),
        Action::Help => Ok(serde_json::json!(HELP)),
        Action::Quit => Ok(serde_json::Value::Null),
    }
}

pub async fn run(args: Args) -> Result<()> {
    if args.list_windows {
        let windows = commands::list_windows().map_err(anyhow::Error::msg)?;
        println!("{}", windows);
        return Ok(());
    }

    let mut config = ScannerConfig::load(&args.config)?;
    args.apply(&mut config);

    let state = PipelineState::default();
    commands::start_scanning(&state, &config, args.resume.as_deref())
        .await
        .map_err(anyhow::Error::msg)
        .context("Failed to start scanning")?;

    // Print every state change
    let mut updates = state
        .0
        .lock()
        .await
        .as_ref()
        .map(|p| p.subscribe())
        .context("Scanner did not start")?;
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if let Ok(json) = serde_json::to_string(&snapshot) {
                println!("{}", json);
            }
        }
    });

    info!("Scanning. Type `help` for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match parse_line(&line) {
            Ok(Action::Quit) => break,
            Ok(action) => match dispatch(&state, action).await {
                Ok(value) => println!("{}", value),
                Err(e) => eprintln!("error: {}", e),
            },
            Err(e) => eprintln!("error: {}", e),
        }
    }

    commands::stop_scanning(&state).await.map_err(anyhow::Error::msg)?;
    info!("Scanner stopped");
    Ok(())
}
