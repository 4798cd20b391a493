use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::LoggerError;
use crate::navigation::NavRequestId;
use crate::utils::base36;

/// Opaque host-side tab key. The browser surface supplies whatever stable
/// integer it has for a live tab; the registry maps it to a logged tab id.
pub type TabHandle = u64;

/// Process-wide window-id counter. Every window created in this process
/// gets the next id, monotonic for the process lifetime.
#[derive(Clone)]
pub struct WindowRegistry {
    next: Arc<AtomicU64>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn next_window_id(&self) -> String {
        let seq = self.next.fetch_add(1, Ordering::SeqCst);
        format!("W{}", base36(seq))
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-tab state owned by the registry for the tab's lifetime.
#[derive(Debug)]
pub struct TabRecord {
    pub tab_id: String,
    /// Redirect source recorded by the navigation tracker, waiting for the
    /// next load start.
    pub pending_redirect_from: Option<String>,
    /// Correlation token of the tracked in-flight top-level request.
    pub pending_request: Option<NavRequestId>,
}

/// Per-window arena of live tabs, indexed by host handle. Records are
/// created lazily on first reference and removed exactly once on close.
pub struct TabRegistry {
    window_id: String,
    next_tab: u64,
    tabs: HashMap<TabHandle, TabRecord>,
}

impl TabRegistry {
    pub fn new(window_id: &str) -> Self {
        Self {
            window_id: window_id.to_string(),
            next_tab: 0,
            tabs: HashMap::new(),
        }
    }

    /// Look up a tab record, creating it on first reference. Returns the
    /// record and whether this call created it (so the caller can emit the
    /// registration event once).
    pub fn resolve(&mut self, handle: TabHandle) -> (&mut TabRecord, bool) {
        match self.tabs.entry(handle) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                let tab_id = format!("{}T{}", self.window_id, base36(self.next_tab));
                self.next_tab += 1;
                let record = entry.insert(TabRecord {
                    tab_id,
                    pending_redirect_from: None,
                    pending_request: None,
                });
                (record, true)
            }
        }
    }

    pub fn get_mut(&mut self, handle: TabHandle) -> Option<&mut TabRecord> {
        self.tabs.get_mut(&handle)
    }

    /// Drop the record for a closed tab. Calling this for an unknown handle
    /// is a registration error; callers log and continue.
    pub fn remove(&mut self, handle: TabHandle) -> crate::error::Result<TabRecord> {
        self.tabs.remove(&handle).ok_or_else(|| {
            LoggerError::Registration(format!("no live tab for handle {handle}"))
        })
    }

    pub fn tab_ids(&self) -> impl Iterator<Item = &str> {
        self.tabs.values().map(|record| record.tab_id.as_str())
    }

    pub fn live_tabs(&self) -> usize {
        self.tabs.len()
    }
}
