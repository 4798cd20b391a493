//! Offline companion tool for the capture logs: look up surrogate ids in
//! the string table and sanity-check an event log before analysis. Reads
//! the data files directly and never writes to them.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use tabtrail::store::paths::{default_data_dir, EVENT_LOG_FILE, STRING_TABLE_FILE};
use tabtrail::store::LOG_VERSION;

#[derive(Parser)]
#[command(name = "tabtrail")]
#[command(about = "Inspect browsing capture logs", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory holding events.dat / strings.dat (defaults to the
    /// per-user data directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find string-table entries containing a substring
    Search {
        /// Substring to look for (case-insensitive)
        query: String,

        /// Only show entries that look like host names
        #[arg(long)]
        hosts: bool,
    },
    /// Validate an event log file and report basic statistics
    Check,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    match cli.command {
        Commands::Search { query, hosts } => search(&data_dir.join(STRING_TABLE_FILE), &query, hosts),
        Commands::Check => check(&data_dir.join(EVENT_LOG_FILE)),
    }
}

fn looks_like_host(s: &str) -> bool {
    s.contains('.') && !s.contains('/') && !s.contains(' ')
}

fn search(path: &std::path::Path, query: &str, hosts_only: bool) -> Result<()> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read string table {}", path.display()))?;
    let needle = query.to_lowercase();

    let mut matches = 0usize;
    for line in contents.lines().filter(|line| !line.trim().is_empty()) {
        let entry: Value = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let (Some(string), Some(id)) = (entry["string"].as_str(), entry["id"].as_str()) else {
            continue;
        };
        if hosts_only && !looks_like_host(string) {
            continue;
        }
        if string.to_lowercase().contains(&needle) {
            println!("{id}\t{string}");
            matches += 1;
        }
    }
    eprintln!("{matches} matching entries");
    Ok(())
}

fn check(path: &std::path::Path) -> Result<()> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read event log {}", path.display()))?;

    let mut lines = 0usize;
    let mut bad = 0usize;
    let mut version: Option<u64> = None;

    for line in contents.lines().filter(|line| !line.trim().is_empty()) {
        lines += 1;
        let parsed = line
            .split_once(' ')
            .and_then(|(millis, json)| {
                let millis: i64 = millis.parse().ok()?;
                let value: Value = serde_json::from_str(json).ok()?;
                Some((millis, value))
            });
        let Some((_, value)) = parsed else {
            eprintln!("line {lines}: unparsable entry");
            bad += 1;
            continue;
        };
        if version.is_none() {
            if let Some(v) = value["version"].as_u64() {
                version = Some(v);
            }
        }
    }

    match version {
        Some(v) if v == u64::from(LOG_VERSION) => {
            println!("log format version {v}");
        }
        Some(v) => {
            println!("log format version {v} (this tool expects {LOG_VERSION})");
        }
        None => bail!("no LOG_CREATE/LOG_OPEN header found in {}", path.display()),
    }
    println!("{lines} entries, {bad} unparsable");
    if bad > 0 {
        bail!("{bad} unparsable entries");
    }
    Ok(())
}
