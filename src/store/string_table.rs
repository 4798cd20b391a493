use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::error::LoggerError;
use crate::events::Event;
use crate::store::event_log::EventLogHandle;
use crate::utils::base36;

#[derive(Debug, Serialize, Deserialize)]
struct TableEntry {
    string: String,
    id: String,
}

/// Persistent string → surrogate-id table. Ids are assigned in first-seen
/// order, never removed or renumbered, and carry no information about the
/// raw string: recovering it requires this file.
pub struct StringTable {
    path: PathBuf,
    file: File,
    entries: HashMap<String, String>,
    /// Lines consumed so far, parsed or not. A skipped line still consumes
    /// its slot so later assignments can never collide with an id that was
    /// handed out before the file got damaged.
    count: u64,
}

impl StringTable {
    /// Load the table from disk, replaying it line by line. Unparsable
    /// lines are reported to the event log and skipped; loading never
    /// aborts on partial damage.
    pub fn open(path: &Path, event_log: &EventLogHandle) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut count: u64 = 0;

        if path.exists() {
            let reader = BufReader::new(
                File::open(path)
                    .with_context(|| format!("failed to read string table {}", path.display()))?,
            );
            for (index, line) in reader.lines().enumerate() {
                let line = line
                    .with_context(|| format!("failed to read string table {}", path.display()))?;
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<TableEntry>(&line) {
                    Ok(entry) => {
                        entries.insert(entry.string, entry.id);
                    }
                    Err(err) => {
                        let parse_err = LoggerError::Parse {
                            line: index + 1,
                            source: err,
                        };
                        error!("{parse_err}");
                        let _ = event_log.write(&Event::error(
                            format!(
                                "Exception parsing string file on line {}",
                                index + 1
                            ),
                            Some(parse_err.to_string()),
                        ));
                    }
                }
                count += 1;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open string table {}", path.display()))?;

        info!(
            "String table loaded from {} ({} entries)",
            path.display(),
            entries.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            entries,
            count,
        })
    }

    /// Map a raw string to its surrogate id, assigning and persisting a new
    /// one on first sight. Deterministic for the lifetime of the table.
    pub fn obfuscate(&mut self, raw: &str) -> crate::error::Result<String> {
        if let Some(id) = self.entries.get(raw) {
            return Ok(id.clone());
        }

        let id = base36(self.count);
        let entry = TableEntry {
            string: raw.to_string(),
            id: id.clone(),
        };
        let line = serde_json::to_string(&entry)
            .map_err(|err| self.as_write_error(io::Error::new(io::ErrorKind::InvalidData, err)))?;
        self.file
            .write_all(format!("{line}\n").as_bytes())
            .map_err(|err| self.as_write_error(err))?;

        self.entries.insert(raw.to_string(), id.clone());
        self.count += 1;
        Ok(id)
    }

    /// Case-insensitive infix search over all known pairs; unordered.
    pub fn search(&self, query: &str) -> Vec<(String, String)> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|(raw, _)| raw.to_lowercase().contains(&needle))
            .map(|(raw, id)| (raw.clone(), id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn as_write_error(&self, source: io::Error) -> LoggerError {
        LoggerError::Write {
            path: self.path.clone(),
            source,
        }
    }
}
