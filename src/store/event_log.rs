use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use serde_json::{Map, Value};

use crate::error::LoggerError;
use crate::events::Event;

/// Bumped whenever the log format changes, so offline tooling can check
/// compatibility from the first line before parsing the rest.
pub const LOG_VERSION: u32 = 20240612;

/// Append-only event log: one `<epochMillis> <JSON object>` entry per line.
pub struct EventLog {
    path: PathBuf,
    file: File,
}

impl EventLog {
    /// Open (or create) the log file and write the `LOG_CREATE` /
    /// `LOG_OPEN` header event.
    pub fn open(path: &Path, host_version: &str) -> Result<Self> {
        let existed = path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open event log {}", path.display()))?;

        let mut log = Self {
            path: path.to_path_buf(),
            file,
        };

        let date = Utc::now().to_rfc2822();
        let first = if existed {
            Event::LogOpen {
                date,
                version: LOG_VERSION,
                firefox_version: host_version.to_string(),
            }
        } else {
            Event::LogCreate {
                date,
                version: LOG_VERSION,
                firefox_version: host_version.to_string(),
            }
        };
        log.append(&first, None)
            .with_context(|| format!("failed to write log header to {}", path.display()))?;

        info!(
            "Event log {} at {}",
            if existed { "reopened" } else { "created" },
            path.display()
        );
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and append one event, merging `extra` fields on top of the
    /// event's own fields (extra wins on collision).
    pub fn append(
        &mut self,
        event: &Event,
        extra: Option<&Map<String, Value>>,
    ) -> crate::error::Result<()> {
        let value = serde_json::to_value(event)
            .map_err(|err| self.as_write_error(io::Error::new(io::ErrorKind::InvalidData, err)))?;
        let mut fields = match value {
            Value::Object(map) => map,
            other => {
                // The schema only has struct-like variants, so this is
                // unreachable in practice
                let mut map = Map::new();
                map.insert("event".to_string(), other);
                map
            }
        };
        if let Some(extra) = extra {
            for (key, val) in extra {
                fields.insert(key.clone(), val.clone());
            }
        }

        let line = format!(
            "{} {}\n",
            Utc::now().timestamp_millis(),
            Value::Object(fields)
        );
        self.file
            .write_all(line.as_bytes())
            .map_err(|err| self.as_write_error(err))
    }

    fn as_write_error(&self, source: io::Error) -> LoggerError {
        LoggerError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

/// Clone-able handle over the process-wide event log; all windows share one.
#[derive(Clone)]
pub struct EventLogHandle {
    inner: Arc<Mutex<EventLog>>,
}

impl EventLogHandle {
    pub fn open(path: &Path, host_version: &str) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(EventLog::open(path, host_version)?)),
        })
    }

    pub fn write(&self, event: &Event) -> crate::error::Result<()> {
        self.inner.lock().unwrap().append(event, None)
    }

    pub fn write_with(
        &self,
        event: &Event,
        extra: &Map<String, Value>,
    ) -> crate::error::Result<()> {
        self.inner.lock().unwrap().append(event, Some(extra))
    }

    /// Produce a writer that stamps `extra` fields onto every event. On key
    /// collision the bound fields win, so a window-scoped writer always
    /// carries its window id.
    pub fn bind(&self, extra: Map<String, Value>) -> BoundLog {
        BoundLog {
            handle: self.clone(),
            extra,
        }
    }
}

/// A window-scoped (or otherwise scoped) event writer; see
/// [`EventLogHandle::bind`].
#[derive(Clone)]
pub struct BoundLog {
    handle: EventLogHandle,
    extra: Map<String, Value>,
}

impl BoundLog {
    pub fn write(&self, event: &Event) -> crate::error::Result<()> {
        self.handle.write_with(event, &self.extra)
    }
}
