//! Process-wide state ([`Globals`]) and the per-window wiring
//! ([`WindowSession`]) that feeds browser surface events into the state
//! machines. Every public operation isolates its own failures: a broken
//! feature degrades to an `ERROR` entry in the log, never a crash of the
//! host window.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use log::error;

use crate::events::{Event, MouseState};
use crate::focus::{FocusDriver, FocusSampler};
use crate::hooks::InterceptPoint;
use crate::navigation::{NavRequestId, NavigationTracker};
use crate::obfuscate::UrlObfuscator;
use crate::questions::{
    diary_question, link_in_new_tab_question, QuestionPresenter, QuestionScheduler, QuestionSpec,
};
use crate::registry::{TabHandle, TabRegistry, WindowRegistry};
use crate::settings::SettingsStore;
use crate::store::paths::{
    ensure_data_dir, EVENT_LOG_FILE, FOCUS_LOG_FILE, SETTINGS_FILE, STRING_TABLE_FILE,
};
use crate::store::{BoundLog, EventLogHandle, FocusLogHandle, StringTable};

/// Host-supplied attachment of the session-history listener. Returns false
/// when the history service is not ready yet; the session retries once at
/// the next top-level location change.
pub type HistoryAttach = Box<dyn FnMut() -> bool + Send>;

/// Everything shared across windows: the three persisted streams, the
/// window-id counter, the question cooldown, and user settings. Cheap to
/// clone handles out of; opened once per process.
pub struct Globals {
    data_dir: PathBuf,
    event_log: EventLogHandle,
    focus_log: FocusLogHandle,
    string_table: Arc<Mutex<StringTable>>,
    obfuscator: UrlObfuscator,
    windows: WindowRegistry,
    settings: Arc<SettingsStore>,
    next_new_tab: Arc<Mutex<Option<QuestionSpec>>>,
    last_question_millis: Arc<Mutex<i64>>,
    presenter: Arc<dyn QuestionPresenter>,
}

impl Globals {
    pub fn init(
        data_dir: &Path,
        host_version: &str,
        presenter: Arc<dyn QuestionPresenter>,
    ) -> Result<Self> {
        ensure_data_dir(data_dir)?;

        let event_log = EventLogHandle::open(&data_dir.join(EVENT_LOG_FILE), host_version)?;
        let string_table = Arc::new(Mutex::new(StringTable::open(
            &data_dir.join(STRING_TABLE_FILE),
            &event_log,
        )?));
        let focus_log = FocusLogHandle::open(&data_dir.join(FOCUS_LOG_FILE))?;
        let settings = Arc::new(
            SettingsStore::new(data_dir.join(SETTINGS_FILE))
                .context("failed to load user settings")?,
        );
        let obfuscator = UrlObfuscator::new(string_table.clone(), settings.get().obfuscate_urls);

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            event_log,
            focus_log,
            string_table,
            obfuscator,
            windows: WindowRegistry::new(),
            settings,
            next_new_tab: Arc::new(Mutex::new(None)),
            last_question_millis: Arc::new(Mutex::new(0)),
            presenter,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn event_log(&self) -> &EventLogHandle {
        &self.event_log
    }

    pub fn string_table(&self) -> Arc<Mutex<StringTable>> {
        self.string_table.clone()
    }

    pub fn settings(&self) -> Arc<SettingsStore> {
        self.settings.clone()
    }

    /// Wire up a new browser window. The window's first (default) tab never
    /// gets its own open notification from the host, so it is registered
    /// here.
    pub fn new_window(&self, default_tab_handle: TabHandle) -> Result<WindowSession> {
        let window_id = self.windows.next_window_id();

        let mut extra = serde_json::Map::new();
        extra.insert("win".to_string(), serde_json::Value::from(window_id.clone()));
        let log = self.event_log.bind(extra);
        log.write(&Event::WindowOnload)?;

        let sampler = Arc::new(Mutex::new(FocusSampler::new(
            &window_id,
            Utc::now().timestamp_millis(),
        )));
        let focus = FocusDriver::new(sampler.clone(), self.focus_log.clone());
        let nav = NavigationTracker::new(log.clone(), self.obfuscator.clone());
        let questions = QuestionScheduler::new(
            log.clone(),
            self.settings.clone(),
            self.next_new_tab.clone(),
            self.last_question_millis.clone(),
            self.presenter.clone(),
        );

        let mut session = WindowSession {
            log,
            obf: self.obfuscator.clone(),
            tabs: TabRegistry::new(&window_id),
            nav,
            questions,
            sampler,
            focus,
            selected_tab_id: None,
            history_attach: None,
            history_listener_attached: false,
            new_tab_command: InterceptPoint::new("cmd_newNavigatorTab"),
            new_window_command: InterceptPoint::new("cmd_newNavigator"),
            home_command: InterceptPoint::new("BrowserHome"),
            window_id,
        };
        session.register_command_hooks();
        session.on_tab_open(default_tab_handle, 0, "default");
        session.log.write(&Event::LoggerInit)?;
        Ok(session)
    }

    /// The host application is shutting down.
    pub fn on_quit(&self) -> Result<()> {
        self.event_log.write(&Event::QuitApplication)?;
        Ok(())
    }
}

/// One browser window's capture wiring. Methods mirror the notifications
/// the host surface delivers; none of them panic or propagate errors.
pub struct WindowSession {
    window_id: String,
    log: BoundLog,
    obf: UrlObfuscator,
    tabs: TabRegistry,
    nav: NavigationTracker,
    questions: QuestionScheduler,
    sampler: Arc<Mutex<FocusSampler>>,
    focus: FocusDriver,
    selected_tab_id: Option<String>,
    history_attach: Option<HistoryAttach>,
    history_listener_attached: bool,
    new_tab_command: InterceptPoint<()>,
    new_window_command: InterceptPoint<()>,
    home_command: InterceptPoint<()>,
}

impl WindowSession {
    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Log the failure of an operation on the event log itself; if even
    /// that fails, fall back to the diagnostic console.
    fn report(&self, what: &str, err: &dyn std::fmt::Display) {
        let event = Event::error(format!("Exception in {what}"), Some(err.to_string()));
        if self.log.write(&event).is_err() {
            error!("{}: {what} failed: {err}", self.window_id);
        }
    }

    fn write_or_report(&self, event: &Event, what: &str) {
        if let Err(err) = self.log.write(event) {
            self.report(what, &err);
        }
    }

    fn register_command_hooks(&mut self) {
        let log = self.log.clone();
        self.new_tab_command.before(move |_| {
            if let Err(err) = log.write(&Event::NewTab) {
                error!("NEW_TAB log failed: {err}");
            }
        });
        let log = self.log.clone();
        self.new_window_command.before(move |_| {
            if let Err(err) = log.write(&Event::NewWindow) {
                error!("NEW_WINDOW log failed: {err}");
            }
        });
        let log = self.log.clone();
        self.home_command.before(move |_| {
            if let Err(err) = log.write(&Event::GoHome) {
                error!("GoHome log failed: {err}");
            }
        });
    }

    /// Run the host's new-tab command through its interception point.
    pub fn run_new_tab_command<R>(&mut self, op: impl FnOnce(&()) -> R) -> R {
        self.new_tab_command.run(&(), op)
    }

    pub fn run_new_window_command<R>(&mut self, op: impl FnOnce(&()) -> R) -> R {
        self.new_window_command.run(&(), op)
    }

    pub fn run_home_command<R>(&mut self, op: impl FnOnce(&()) -> R) -> R {
        self.home_command.run(&(), op)
    }

    /// Provide the fallible session-history attachment; tried immediately,
    /// retried once at the next top-level location change.
    pub fn set_history_attach(&mut self, mut attach: HistoryAttach) {
        if attach() {
            self.history_listener_attached = true;
        } else {
            self.write_or_report(
                &Event::error("Failed to add session history listener", None),
                "set_history_attach",
            );
        }
        self.history_attach = Some(attach);
    }

    fn retry_history_attach(&mut self) {
        if self.history_listener_attached {
            return;
        }
        if let Some(attach) = self.history_attach.as_mut() {
            if attach() {
                self.history_listener_attached = true;
            } else {
                self.write_or_report(
                    &Event::error(
                        "After LocationChange, session history listener still not attached",
                        None,
                    ),
                    "retry_history_attach",
                );
            }
        }
    }

    /// Look up a tab id, registering the tab (with its event) on first
    /// reference.
    fn resolve_tab_id(&mut self, handle: TabHandle) -> String {
        let (record, created) = self.tabs.resolve(handle);
        let tab_id = record.tab_id.clone();
        if created {
            self.write_or_report(
                &Event::TabRegistered {
                    tab_id: tab_id.clone(),
                },
                "tab_registered",
            );
        }
        tab_id
    }

    // --- tab lifecycle ---

    pub fn on_tab_open(&mut self, handle: TabHandle, tab_index: usize, cause: &str) {
        let cause = if cause.is_empty() { "unknown" } else { cause };
        if cause == "restore" {
            return self.on_tab_restore(handle, tab_index);
        }
        let tab_id = self.resolve_tab_id(handle);
        self.write_or_report(
            &Event::TabOpen {
                cause: cause.to_string(),
                tab_id: tab_id.clone(),
                tab_index,
            },
            "TabOpen",
        );
        self.questions.attach_to_new_tab(&tab_id);
    }

    /// Restored tabs are logged like opens but never get a question.
    pub fn on_tab_restore(&mut self, handle: TabHandle, tab_index: usize) {
        let tab_id = self.resolve_tab_id(handle);
        self.write_or_report(&Event::TabRestore { tab_id, tab_index }, "TabRestore");
    }

    pub fn on_tab_select(&mut self, handle: TabHandle, tab_index: usize, url: &str) {
        if let Err(err) = self.tab_select_impl(handle, tab_index, url) {
            self.report("TabSelect", &err);
        }
    }

    fn tab_select_impl(
        &mut self,
        handle: TabHandle,
        tab_index: usize,
        url: &str,
    ) -> crate::error::Result<()> {
        let tab_id = self.resolve_tab_id(handle);
        self.log.write(&Event::TabSelect {
            tab_index,
            tab_id: tab_id.clone(),
            url: self.obf.obfuscate_url(url)?,
        })?;
        self.selected_tab_id = Some(tab_id.clone());
        self.questions.show_if_loaded(&tab_id, Self::now_millis())
    }

    pub fn on_tab_move(&mut self, handle: TabHandle, tab_index: usize) {
        let tab_id = self.resolve_tab_id(handle);
        self.write_or_report(&Event::TabMove { tab_id, tab_index }, "TabMove");
    }

    pub fn on_tab_close(&mut self, handle: TabHandle, tab_index: usize) {
        let tab_id = self.resolve_tab_id(handle);
        self.write_or_report(
            &Event::TabClose {
                tab_id: tab_id.clone(),
                tab_index,
            },
            "TabClose",
        );
        if let Err(err) = self.tabs.remove(handle) {
            self.report("TabClose teardown", &err);
        }
        // A question pending on a closed tab must never fire
        self.questions.remove_all(&tab_id);
        if self.selected_tab_id.as_deref() == Some(tab_id.as_str()) {
            self.selected_tab_id = None;
        }
    }

    /// A document finished layout (`is_dom_content_loaded`) or finished
    /// loading entirely. Top-level layout completion drives the pending
    /// question machinery; everything else is logged as a plain load.
    pub fn on_load_event(
        &mut self,
        handle: TabHandle,
        tab_index: usize,
        url: &str,
        is_top_level: bool,
        is_dom_content_loaded: bool,
    ) {
        if let Err(err) =
            self.load_event_impl(handle, tab_index, url, is_top_level, is_dom_content_loaded)
        {
            self.report("handleLoadEvent", &err);
        }
    }

    fn load_event_impl(
        &mut self,
        handle: TabHandle,
        tab_index: usize,
        url: &str,
        is_top_level: bool,
        is_dom_content_loaded: bool,
    ) -> crate::error::Result<()> {
        let tab_id = self.resolve_tab_id(handle);
        if is_top_level && is_dom_content_loaded {
            // Must run unconditionally so the question machinery learns the
            // tab has finished loading
            self.questions.show_if_tab_selected(
                &tab_id,
                self.selected_tab_id.as_deref(),
                Self::now_millis(),
            )
        } else {
            self.log.write(&Event::Load {
                tab_index,
                tab_id,
                url: self.obf.obfuscate_url(url)?,
                is_top_level,
            })
        }
    }

    // --- navigation ---

    pub fn on_load_start(
        &mut self,
        handle: TabHandle,
        tab_index: usize,
        href: &str,
        cause: &str,
        is_top_level: bool,
    ) -> Option<NavRequestId> {
        let last_key_down = self.sampler.lock().unwrap().last_key_down_millis();
        self.resolve_tab_id(handle);
        let record = self.tabs.get_mut(handle)?;
        match self
            .nav
            .on_load_start(record, tab_index, href, cause, is_top_level, last_key_down)
        {
            Ok(token) => token,
            Err(err) => {
                self.report("load_start", &err);
                None
            }
        }
    }

    pub fn on_redirecting(&mut self, handle: TabHandle, token: NavRequestId, url: &str) {
        if let Some(record) = self.tabs.get_mut(handle) {
            self.nav.on_redirecting(record, token, url);
        }
    }

    pub fn on_state_other(&mut self, handle: TabHandle) {
        if let Some(record) = self.tabs.get_mut(handle) {
            self.nav.on_state_other(record);
        }
    }

    pub fn on_location_change(
        &mut self,
        handle: TabHandle,
        tab_index: usize,
        href: &str,
        cause: &str,
        is_top_level: bool,
    ) {
        let last_key_down = self.sampler.lock().unwrap().last_key_down_millis();
        let tab_id = self.resolve_tab_id(handle);
        let Some(record) = self.tabs.get_mut(handle) else {
            return;
        };
        match self
            .nav
            .on_location_change(record, tab_index, href, cause, is_top_level, last_key_down)
        {
            Ok(outcome) => {
                if outcome.is_top_level {
                    // The attachment may have failed at window setup
                    self.retry_history_attach();
                }
                if outcome.stake_question {
                    self.questions.set_pending_question(&tab_id, diary_question());
                }
            }
            Err(err) => self.report("LocationChange", &err),
        }
    }

    // --- click stream ---

    pub fn on_link_click(&mut self, href: &str, target: &str, mouse: MouseState) {
        // A named target identifies a frame in the user's page; redact it
        let target = if !target.is_empty() && target != "_blank" {
            "<name>"
        } else {
            target
        };
        match self.obf.obfuscate_url(href) {
            Ok(href) => self.write_or_report(
                &Event::LinkClick {
                    href,
                    target: target.to_string(),
                    mouse,
                },
                "LINK_CLICK",
            ),
            Err(err) => self.report("LINK_CLICK", &err),
        }
    }

    pub fn on_document_click(&mut self, mouse: MouseState) {
        self.write_or_report(&Event::DocumentClick { mouse }, "DOCUMENT_CLICK");
    }

    pub fn on_document_mousedown(&mut self, mouse: MouseState) {
        self.write_or_report(&Event::DocumentMousedown { mouse }, "document_mousedown");
    }

    pub fn on_window_mousedown(&mut self, mouse: MouseState) {
        self.sampler
            .lock()
            .unwrap()
            .record_activity(Self::now_millis());
        self.write_or_report(&Event::WindowMousedown { mouse }, "window_mousedown");
    }

    pub fn on_right_click(&mut self, url: &str) {
        match self.obf.obfuscate_url(url) {
            Ok(url) => self.write_or_report(&Event::RightClick { url }, "RIGHT_CLICK"),
            Err(err) => self.report("RIGHT_CLICK", &err),
        }
    }

    /// A link was opened into a new tab. Any question pending on the
    /// source tab would now fire against the wrong page, so it is dropped
    /// and a new-tab question is staked for the destination instead.
    pub fn on_open_new_tab_with(&mut self, href: &str, source_url: &str) {
        if let Err(err) = self.open_new_tab_with_impl(href, source_url) {
            self.report("openNewTabWith", &err);
        }
    }

    fn open_new_tab_with_impl(
        &mut self,
        href: &str,
        source_url: &str,
    ) -> crate::error::Result<()> {
        self.log.write(&Event::OpenNewTabWith {
            href: self.obf.obfuscate_url(href)?,
            source_url: self.obf.obfuscate_url(source_url)?,
        })?;
        if let Some(tab_id) = self.selected_tab_id.clone() {
            self.questions.remove_all(&tab_id);
        }
        self.questions
            .add_to_next_new_tab(link_in_new_tab_question());
        Ok(())
    }

    pub fn on_open_new_window_with(&mut self, href: &str, source_url: &str) {
        let event = match (
            self.obf.obfuscate_url(href),
            self.obf.obfuscate_url(source_url),
        ) {
            (Ok(href), Ok(source_url)) => Event::OpenNewWindowWith { href, source_url },
            (Err(err), _) | (_, Err(err)) => {
                self.report("openNewWindowWith", &err);
                return;
            }
        };
        self.write_or_report(&event, "openNewWindowWith");
    }

    pub fn on_form_submit(&mut self, action: &str) {
        match self.obf.obfuscate_url(action) {
            Ok(action) => self.write_or_report(&Event::FormSubmit { action }, "form_submit"),
            Err(err) => self.report("form_submit", &err),
        }
    }

    // --- toolbar and search ---

    pub fn on_url_bar_command(&mut self) {
        self.write_or_report(&Event::UrlBarCommand, "URLBarCommand");
    }

    pub fn on_search_bar_search(&mut self) {
        self.write_or_report(&Event::SearchBarSearch, "SearchBarSearch");
    }

    pub fn on_right_click_search(&mut self) {
        self.write_or_report(&Event::RightClickSearch, "RightClickSearch");
    }

    // --- session history ---

    pub fn on_history_go_back(&mut self, url: &str) {
        self.history_event(url, |url| Event::HistoryGoBack { url }, "OnHistoryGoBack");
    }

    pub fn on_history_go_forward(&mut self, url: &str) {
        self.history_event(url, |url| Event::HistoryGoForward { url }, "BrowserForward");
    }

    pub fn on_history_goto_index(&mut self, index: i32, url: &str) {
        self.history_event(
            url,
            |url| Event::HistoryGotoIndex { index, url },
            "gotoHistoryIndex",
        );
    }

    pub fn on_history_reload(&mut self, url: &str) {
        self.history_event(url, |url| Event::HistoryReload { url }, "OnHistoryReload");
    }

    pub fn on_bookmark_visit(&mut self, url: &str) {
        self.history_event(url, |url| Event::BookmarkVisit { url }, "bookmark_visit");
    }

    fn history_event(&mut self, url: &str, build: impl FnOnce(String) -> Event, what: &str) {
        match self.obf.obfuscate_url(url) {
            Ok(url) => self.write_or_report(&build(url), what),
            Err(err) => self.report(what, &err),
        }
    }

    // --- input and focus ---

    pub fn on_key_down(&mut self) {
        self.sampler
            .lock()
            .unwrap()
            .record_key_down(Self::now_millis());
    }

    pub fn on_scroll(&mut self) {
        self.sampler
            .lock()
            .unwrap()
            .record_activity(Self::now_millis());
    }

    pub fn on_window_focus(&mut self) {
        if let Err(err) = self.focus.on_focus() {
            self.report("window_focus", &err);
        }
    }

    pub fn on_window_blur(&mut self) {
        if let Err(err) = self.focus.on_blur() {
            self.report("window_blur", &err);
        }
    }

    // --- questions ---

    pub fn on_question_answered(&mut self, id: &str, text: &str) {
        if let Err(err) = self.questions.record_answer(id, text) {
            self.report("answer", &err);
        }
    }

    /// The window is going away: log the unload, stop the focus ticker and
    /// drop every question still pending on its tabs.
    pub fn close(&mut self) {
        self.write_or_report(&Event::WindowUnload, "window_unload");
        self.focus.shutdown();
        let tab_ids: Vec<String> = self.tabs.tab_ids().map(str::to_string).collect();
        for tab_id in tab_ids {
            self.questions.remove_all(&tab_id);
        }
    }
}
