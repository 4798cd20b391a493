//! Collapses the host's load-progress notifications into logical navigation
//! events: one `load_start`, N `redirect` hops, one terminal
//! `LocationChange` per navigation, never N independent top-level loads.

use crate::events::Event;
use crate::obfuscate::UrlObfuscator;
use crate::registry::TabRecord;
use crate::store::BoundLog;
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = false;

/// Correlation token for an in-flight tracked request. The host echoes the
/// token from `on_load_start` back into `on_redirecting`; a token from an
/// older or unrelated navigation never matches, so stale notifications
/// cannot re-arm the redirect source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavRequestId(u64);

/// What a completed location change asks the surrounding session to do.
#[derive(Debug, Clone, Copy)]
pub struct LocationOutcome {
    pub is_top_level: bool,
    /// True when a pending question should be staked for this tab.
    pub stake_question: bool,
}

pub struct NavigationTracker {
    log: BoundLog,
    obf: UrlObfuscator,
    next_request: u64,
}

impl NavigationTracker {
    pub fn new(log: BoundLog, obf: UrlObfuscator) -> Self {
        Self {
            log,
            obf,
            next_request: 0,
        }
    }

    fn issue_token(&mut self) -> NavRequestId {
        let token = NavRequestId(self.next_request);
        self.next_request += 1;
        token
    }

    /// A document load started in this tab. When a redirect source is
    /// pending, the start is the next hop of a chain and is logged as a
    /// `redirect` instead of a fresh `load_start`. Returns the correlation
    /// token for the now-tracked request, if the load is tracked.
    #[allow(clippy::too_many_arguments)]
    pub fn on_load_start(
        &mut self,
        tab: &mut TabRecord,
        tab_index: usize,
        href: &str,
        cause: &str,
        is_top_level: bool,
        last_key_down_time: i64,
    ) -> crate::error::Result<Option<NavRequestId>> {
        if let Some(from) = tab.pending_redirect_from.take() {
            log_info!("{}: redirect hop {} -> {}", tab.tab_id, from, href);
            self.log.write(&Event::Redirect {
                tab_id: tab.tab_id.clone(),
                tab_index,
                from_url: self.obf.obfuscate_url(&from)?,
                to_url: self.obf.obfuscate_url(href)?,
            })?;
            // Keep tracking: the chain may have further hops
            let token = self.issue_token();
            tab.pending_request = Some(token);
            return Ok(Some(token));
        }

        log_info!("{}: load start {href} (top-level: {is_top_level})", tab.tab_id);
        self.log.write(&Event::LoadStart {
            tab_id: tab.tab_id.clone(),
            tab_index,
            href: self.obf.obfuscate_url(href)?,
            cause: self.obf.obfuscate_url(cause)?,
            is_top_level,
            last_key_down_time,
        })?;

        if is_top_level {
            tab.pending_redirect_from = None;
            let token = self.issue_token();
            tab.pending_request = Some(token);
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    /// The tracked request is being redirected. Only a token matching the
    /// tab's pending request records the redirect source.
    pub fn on_redirecting(&mut self, tab: &mut TabRecord, token: NavRequestId, url: &str) {
        if tab.pending_request == Some(token) {
            tab.pending_redirect_from = Some(url.to_string());
        } else {
            log_warn!(
                "{}: ignoring redirect notification with stale token {token:?}",
                tab.tab_id
            );
        }
    }

    /// Any other state-change notification clears the redirect source so it
    /// cannot be attributed to an unrelated later navigation.
    pub fn on_state_other(&mut self, tab: &mut TabRecord) {
        tab.pending_redirect_from = None;
    }

    /// The location bar committed: the navigation (and any redirect chain)
    /// is complete. Fires exactly once per logical navigation.
    #[allow(clippy::too_many_arguments)]
    pub fn on_location_change(
        &mut self,
        tab: &mut TabRecord,
        tab_index: usize,
        href: &str,
        cause: &str,
        is_top_level: bool,
        last_key_down_time: i64,
    ) -> crate::error::Result<LocationOutcome> {
        log_info!("{}: location change {href}", tab.tab_id);
        self.log.write(&Event::LocationChange {
            tab_id: tab.tab_id.clone(),
            tab_index,
            href: self.obf.obfuscate_url(href)?,
            cause: self.obf.obfuscate_url(cause)?,
            is_top_level,
            last_key_down_time,
        })?;

        Ok(LocationOutcome {
            is_top_level,
            stake_question: is_top_level && href != "about:blank",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TabRegistry;
    use crate::store::event_log::tests::read_entries;
    use crate::store::{EventLogHandle, StringTable};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn tracker(dir: &std::path::Path) -> (NavigationTracker, PathBuf) {
        let events = dir.join("events.dat");
        let log = EventLogHandle::open(&events, "test").unwrap();
        let table = StringTable::open(&dir.join("strings.dat"), &log).unwrap();
        // Obfuscation off keeps the asserted URLs readable
        let obf = UrlObfuscator::new(Arc::new(Mutex::new(table)), false);
        (
            NavigationTracker::new(log.bind(serde_json::Map::new()), obf),
            events,
        )
    }

    #[test]
    fn redirect_chain_collapses_to_one_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut nav, events) = tracker(dir.path());
        let mut tabs = TabRegistry::new("W0");
        let tab = tabs.resolve(0).0;

        let token = nav
            .on_load_start(tab, 0, "http://a.example/", "", true, 0)
            .unwrap()
            .unwrap();
        nav.on_redirecting(tab, token, "http://a.example/");
        let token = nav
            .on_load_start(tab, 0, "http://b.example/", "", true, 0)
            .unwrap()
            .unwrap();
        nav.on_redirecting(tab, token, "http://b.example/");
        nav.on_load_start(tab, 0, "http://c.example/", "", true, 0)
            .unwrap();
        nav.on_location_change(tab, 0, "http://c.example/", "", true, 0)
            .unwrap();

        let names: Vec<String> = read_entries(&events)
            .iter()
            .skip(1) // LOG_CREATE
            .map(|(_, json)| json["event"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["load_start", "redirect", "redirect", "LocationChange"]
        );

        let entries = read_entries(&events);
        assert_eq!(entries[2].1["from_url"], "http://a.example/");
        assert_eq!(entries[2].1["to_url"], "http://b.example/");
        assert_eq!(entries[3].1["from_url"], "http://b.example/");
        assert_eq!(entries[3].1["to_url"], "http://c.example/");
        assert_eq!(entries[4].1["href"], "http://c.example/");
    }

    #[test]
    fn stale_token_does_not_record_a_redirect_source() {
        let dir = tempfile::tempdir().unwrap();
        let (mut nav, events) = tracker(dir.path());
        let mut tabs = TabRegistry::new("W0");
        let tab = tabs.resolve(0).0;

        let stale = nav
            .on_load_start(tab, 0, "http://a.example/", "", true, 0)
            .unwrap()
            .unwrap();
        // A fresh navigation supersedes the old token
        nav.on_load_start(tab, 0, "http://b.example/", "", true, 0)
            .unwrap();
        nav.on_redirecting(tab, stale, "http://a.example/");
        assert!(tab.pending_redirect_from.is_none());

        nav.on_load_start(tab, 0, "http://c.example/", "", true, 0)
            .unwrap();
        let names: Vec<String> = read_entries(&events)
            .iter()
            .skip(1)
            .map(|(_, json)| json["event"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["load_start", "load_start", "load_start"]);
    }

    #[test]
    fn unrelated_state_change_clears_redirect_source() {
        let dir = tempfile::tempdir().unwrap();
        let (mut nav, events) = tracker(dir.path());
        let mut tabs = TabRegistry::new("W0");
        let tab = tabs.resolve(0).0;

        let token = nav
            .on_load_start(tab, 0, "http://a.example/", "", true, 0)
            .unwrap()
            .unwrap();
        nav.on_redirecting(tab, token, "http://a.example/");
        assert!(tab.pending_redirect_from.is_some());

        nav.on_state_other(tab);
        assert!(tab.pending_redirect_from.is_none());

        nav.on_load_start(tab, 0, "http://b.example/", "", true, 0)
            .unwrap();
        let entries = read_entries(&events);
        assert_eq!(entries.last().unwrap().1["event"], "load_start");
    }

    #[test]
    fn subframe_loads_are_not_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let (mut nav, _events) = tracker(dir.path());
        let mut tabs = TabRegistry::new("W0");
        let tab = tabs.resolve(0).0;

        let token = nav
            .on_load_start(tab, 0, "http://frame.example/", "", false, 0)
            .unwrap();
        assert!(token.is_none());
        assert!(tab.pending_request.is_none());
    }

    #[test]
    fn location_change_on_blank_page_stakes_no_question() {
        let dir = tempfile::tempdir().unwrap();
        let (mut nav, _events) = tracker(dir.path());
        let mut tabs = TabRegistry::new("W0");
        let tab = tabs.resolve(0).0;

        let outcome = nav
            .on_location_change(tab, 0, "about:blank", "", true, 0)
            .unwrap();
        assert!(outcome.is_top_level);
        assert!(!outcome.stake_question);
    }
}
