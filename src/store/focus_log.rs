use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::error::LoggerError;

/// Raw append stream for the focus log. The focus sampler owns the line
/// structure (transitions and tick runs); this type only appends bytes.
struct FocusLog {
    path: PathBuf,
    file: File,
}

#[derive(Clone)]
pub struct FocusLogHandle {
    inner: Arc<Mutex<FocusLog>>,
}

impl FocusLogHandle {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open focus log {}", path.display()))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(FocusLog {
                path: path.to_path_buf(),
                file,
            })),
        })
    }

    pub fn write(&self, text: &str) -> crate::error::Result<()> {
        let mut guard = self.inner.lock().unwrap();
        guard
            .file
            .write_all(text.as_bytes())
            .map_err(|source: io::Error| LoggerError::Write {
                path: guard.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn appends_raw_text_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focus.dat");

        let log = FocusLogHandle::open(&path).unwrap();
        log.write("\n1 W0 focus").unwrap();
        log.write(" 500").unwrap();
        drop(log);

        let log = FocusLogHandle::open(&path).unwrap();
        log.write(" 505").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "\n1 W0 focus 500 505");
    }
}
