use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::Rng;
use serde::Serialize;

use crate::events::Event;
use crate::settings::SettingsStore;
use crate::store::BoundLog;

/// No more than one question in any 15-minute window, process-wide.
pub const QUESTION_COOLDOWN_MILLIS: i64 = 900_000;

/// A question is data, not a callback: the scheduler decides *when*, the
/// presenter (UI glue) decides *how*.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionSpec {
    pub id: String,
    pub text: Vec<String>,
    pub options: Vec<String>,
}

/// The periodic diary prompt staked on completed top-level navigations.
pub fn diary_question() -> QuestionSpec {
    QuestionSpec {
        id: "Q0".to_string(),
        text: vec![
            "Please take a moment to tell me about the web pages you have open right now."
                .to_string(),
            "- What tabs and/or windows do you have open, and why?".to_string(),
            "- What tasks are you engaged in, and how do they relate to your tabs?".to_string(),
            "- How are your tabs organized, and why?".to_string(),
        ],
        options: Vec::new(),
    }
}

/// Asked (subject to sampling) when a link is opened into a new tab.
pub fn link_in_new_tab_question() -> QuestionSpec {
    QuestionSpec {
        id: "Q1".to_string(),
        text: vec!["Why did you open this link in a new tab?".to_string()],
        options: vec![
            "To defer it until later".to_string(),
            "I want to go back to the old page".to_string(),
            "I didn't want to lose the state of the old page".to_string(),
            "I don't know".to_string(),
            "Another reason".to_string(),
        ],
    }
}

/// Presentation seam for the notification-bar widget (or a test recorder).
pub trait QuestionPresenter: Send + Sync {
    fn present(&self, spec: &QuestionSpec);
}

/// Used when no UI surface is wired up; questions are logged but not shown.
pub struct NullPresenter;

impl QuestionPresenter for NullPresenter {
    fn present(&self, _spec: &QuestionSpec) {}
}

struct PendingQuestion {
    spec: QuestionSpec,
    loaded: bool,
}

/// Per-tab pending-question state machine with a process-wide rate limit.
/// At most one pending question per tab; at most one "next-new-tab"
/// stake-out at a time; delivery is at-most-once.
pub struct QuestionScheduler {
    pending: HashMap<String, PendingQuestion>,
    /// Shared across windows: whichever tab is created next claims it.
    next_new_tab: Arc<Mutex<Option<QuestionSpec>>>,
    /// Shared across windows: epoch millis of the last question asked.
    last_question_millis: Arc<Mutex<i64>>,
    settings: Arc<SettingsStore>,
    log: BoundLog,
    presenter: Arc<dyn QuestionPresenter>,
}

impl QuestionScheduler {
    pub fn new(
        log: BoundLog,
        settings: Arc<SettingsStore>,
        next_new_tab: Arc<Mutex<Option<QuestionSpec>>>,
        last_question_millis: Arc<Mutex<i64>>,
        presenter: Arc<dyn QuestionPresenter>,
    ) -> Self {
        Self {
            pending: HashMap::new(),
            next_new_tab,
            last_question_millis,
            settings,
            log,
            presenter,
        }
    }

    /// Register a pending question for a tab, replacing any earlier one.
    pub fn set_pending_question(&mut self, tab_id: &str, spec: QuestionSpec) {
        self.pending.insert(
            tab_id.to_string(),
            PendingQuestion {
                spec,
                loaded: false,
            },
        );
    }

    /// Stake a question on whichever tab is created next.
    pub fn add_to_next_new_tab(&mut self, spec: QuestionSpec) {
        *self.next_new_tab.lock().unwrap() = Some(spec);
    }

    /// Consume the next-new-tab stake-out, if any, for a just-created tab.
    pub fn attach_to_new_tab(&mut self, tab_id: &str) {
        let staked = self.next_new_tab.lock().unwrap().take();
        if let Some(spec) = staked {
            self.set_pending_question(tab_id, spec);
        }
    }

    /// Unconditionally try the pending question for this tab. Fires at most
    /// once: the record is deleted first, and a missing record is a no-op.
    pub fn show(&mut self, tab_id: &str, now_millis: i64) -> crate::error::Result<()> {
        if let Some(record) = self.pending.remove(tab_id) {
            self.maybe_ask(&record.spec, now_millis)?;
        }
        Ok(())
    }

    /// Fire only if the tab has already finished loading.
    pub fn show_if_loaded(&mut self, tab_id: &str, now_millis: i64) -> crate::error::Result<()> {
        if self.pending.get(tab_id).map(|q| q.loaded).unwrap_or(false) {
            self.show(tab_id, now_millis)?;
        }
        Ok(())
    }

    /// On load completion: fire now if this tab is foregrounded, otherwise
    /// remember that it is loaded so selection can fire it later.
    pub fn show_if_tab_selected(
        &mut self,
        tab_id: &str,
        selected_tab_id: Option<&str>,
        now_millis: i64,
    ) -> crate::error::Result<()> {
        if !self.pending.contains_key(tab_id) {
            return Ok(());
        }
        if selected_tab_id == Some(tab_id) {
            self.show(tab_id, now_millis)?;
        } else if let Some(record) = self.pending.get_mut(tab_id) {
            record.loaded = true;
        }
        Ok(())
    }

    /// Drop any pending record for this tab (tab closed, or a link click
    /// landed in a different destination tab).
    pub fn remove_all(&mut self, tab_id: &str) {
        self.pending.remove(tab_id);
    }

    pub fn has_pending(&self, tab_id: &str) -> bool {
        self.pending.contains_key(tab_id)
    }

    /// Gate an actual prompt on the sampling draw and the process-wide
    /// cooldown. Returns whether the question was presented.
    pub fn maybe_ask(&mut self, spec: &QuestionSpec, now_millis: i64) -> crate::error::Result<bool> {
        let percentage = self.settings.get().question_sampling_percentage;
        if rand::thread_rng().gen_range(0..100) >= percentage {
            return Ok(false);
        }

        {
            let mut last = self.last_question_millis.lock().unwrap();
            let since_last = now_millis - *last;
            if *last != 0 && since_last < QUESTION_COOLDOWN_MILLIS {
                log::debug!(
                    "Not asking question {}; only {}s since the last one",
                    spec.id,
                    since_last / 1000
                );
                return Ok(false);
            }
            // Stamp before presenting so a re-entrant ask cannot slip in
            *last = now_millis;
        }

        self.log.write(&Event::Question {
            id: spec.id.clone(),
        })?;
        self.presenter.present(spec);
        Ok(true)
    }

    /// The user answered a prompt; record it against the question id.
    pub fn record_answer(&mut self, id: &str, text: &str) -> crate::error::Result<()> {
        self.log.write(&Event::Answer {
            id: id.to_string(),
            text: text.to_string(),
        })
    }
}
