use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use tabtrail::events::MouseState;
use tabtrail::questions::{QuestionPresenter, QuestionSpec};
use tabtrail::session::Globals;

struct Recorder {
    shown: Mutex<Vec<String>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            shown: Mutex::new(Vec::new()),
        })
    }
}

impl QuestionPresenter for Recorder {
    fn present(&self, spec: &QuestionSpec) {
        self.shown.lock().unwrap().push(spec.id.clone());
    }
}

fn read_events(dir: &Path) -> Vec<Value> {
    fs::read_to_string(dir.join("events.dat"))
        .unwrap()
        .lines()
        .map(|line| {
            let (_, json) = line.split_once(' ').unwrap();
            serde_json::from_str(json).unwrap()
        })
        .collect()
}

fn event_names(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|e| e["event"].as_str().unwrap().to_string())
        .collect()
}

/// Preconfigure deterministic settings: no obfuscation (keeps asserted URLs
/// readable) and a 100% question sampling rate.
fn write_settings(dir: &Path) {
    fs::write(
        dir.join("settings.json"),
        r#"{"obfuscate_urls": false, "question_sampling_percentage": 100}"#,
    )
    .unwrap();
}

fn left_click() -> MouseState {
    MouseState {
        which: 1,
        ctrl_key: false,
        shift_key: false,
        alt_key: false,
        meta_key: false,
    }
}

#[test]
fn window_lifecycle_produces_a_coherent_log() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(dir.path());
    let globals = Globals::init(dir.path(), "3.0.5", Recorder::new()).unwrap();

    let mut session = globals.new_window(0).unwrap();
    assert_eq!(session.window_id(), "W0");

    session.on_tab_select(0, 0, "about:blank");

    // A navigation with a two-hop redirect chain
    let token = session
        .on_load_start(0, 0, "http://shortlink.example/x", "", true)
        .unwrap();
    session.on_redirecting(0, token, "http://shortlink.example/x");
    let token = session
        .on_load_start(0, 0, "http://a.example/", "", true)
        .unwrap();
    session.on_redirecting(0, token, "http://a.example/");
    session
        .on_load_start(0, 0, "http://b.example/", "", true)
        .unwrap();
    session.on_location_change(0, 0, "http://b.example/", "", true);

    // Second tab opened from the UI, then closed
    session.run_new_tab_command(|_| ());
    session.on_tab_open(1, 1, "menu");
    session.on_tab_move(1, 0);
    session.on_tab_close(1, 0);

    session.on_link_click("http://b.example/next", "frame_a", left_click());
    session.close();
    globals.on_quit().unwrap();

    let events = read_events(dir.path());
    let names = event_names(&events);
    assert_eq!(
        names,
        [
            "LOG_CREATE",
            "window_onload",
            "tab_registered",
            "TabOpen",
            "logger_init",
            "TabSelect",
            "load_start",
            "redirect",
            "redirect",
            "LocationChange",
            "NEW_TAB",
            "tab_registered",
            "TabOpen",
            "TabMove",
            "TabClose",
            "LINK_CLICK",
            "window_unload",
            "quit_application",
        ]
    );

    // Window-scoped entries carry the window id
    let onload = &events[1];
    assert_eq!(onload["win"], "W0");

    // Redirect chain collapsed: exactly one LocationChange, with the hops
    let redirects: Vec<&Value> = events.iter().filter(|e| e["event"] == "redirect").collect();
    assert_eq!(redirects[0]["from_url"], "http://shortlink.example/x");
    assert_eq!(redirects[0]["to_url"], "http://a.example/");
    assert_eq!(redirects[1]["from_url"], "http://a.example/");
    assert_eq!(redirects[1]["to_url"], "http://b.example/");

    // Tab ids: default tab then the second one
    let opens: Vec<&Value> = events.iter().filter(|e| e["event"] == "TabOpen").collect();
    assert_eq!(opens[0]["tabId"], "W0T0");
    assert_eq!(opens[0]["cause"], "default");
    assert_eq!(opens[1]["tabId"], "W0T1");
    assert_eq!(opens[1]["cause"], "menu");

    // Named link targets are redacted
    let click = events.iter().find(|e| e["event"] == "LINK_CLICK").unwrap();
    assert_eq!(click["target"], "<name>");
    assert_eq!(click["which"], 1);
}

#[test]
fn urls_are_obfuscated_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let globals = Globals::init(dir.path(), "3.0.5", Recorder::new()).unwrap();

    let mut session = globals.new_window(0).unwrap();
    session
        .on_load_start(0, 0, "http://secret-site.example/private/page", "", true)
        .unwrap();
    session.on_location_change(0, 0, "http://secret-site.example/private/page", "", true);

    let log = fs::read_to_string(dir.path().join("events.dat")).unwrap();
    assert!(!log.contains("secret-site"));
    assert!(!log.contains("private"));

    // The raw strings live only in the string table
    let table = fs::read_to_string(dir.path().join("strings.dat")).unwrap();
    assert!(table.contains("secret-site.example"));
}

#[test]
fn diary_question_fires_on_the_selected_loaded_tab() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(dir.path());
    let recorder = Recorder::new();
    let globals = Globals::init(dir.path(), "3.0.5", recorder.clone()).unwrap();

    let mut session = globals.new_window(0).unwrap();
    session.on_tab_select(0, 0, "about:blank");
    session
        .on_load_start(0, 0, "http://a.example/", "", true)
        .unwrap();
    // Top-level location change stakes the diary question on W0T0
    session.on_location_change(0, 0, "http://a.example/", "", true);
    assert!(recorder.shown.lock().unwrap().is_empty());

    // Layout completion on the selected tab fires it
    session.on_load_event(0, 0, "http://a.example/", true, true);
    assert_eq!(recorder.shown.lock().unwrap().as_slice(), ["Q0"]);

    session.on_question_answered("Q0", "just browsing");

    let events = read_events(dir.path());
    let question = events.iter().find(|e| e["event"] == "question").unwrap();
    assert_eq!(question["id"], "Q0");
    let answer = events.iter().find(|e| e["event"] == "answer").unwrap();
    assert_eq!(answer["text"], "just browsing");
}

#[test]
fn blank_page_never_stakes_a_question() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(dir.path());
    let recorder = Recorder::new();
    let globals = Globals::init(dir.path(), "3.0.5", recorder.clone()).unwrap();

    let mut session = globals.new_window(0).unwrap();
    session.on_tab_select(0, 0, "about:blank");
    session.on_location_change(0, 0, "about:blank", "", true);
    session.on_load_event(0, 0, "about:blank", true, true);

    assert!(recorder.shown.lock().unwrap().is_empty());
}

#[test]
fn closing_a_tab_drops_its_pending_question() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(dir.path());
    let recorder = Recorder::new();
    let globals = Globals::init(dir.path(), "3.0.5", recorder.clone()).unwrap();

    let mut session = globals.new_window(0).unwrap();
    session.on_tab_open(1, 1, "menu");
    session.on_tab_select(1, 1, "about:blank");
    session
        .on_load_start(1, 1, "http://a.example/", "", true)
        .unwrap();
    session.on_location_change(1, 1, "http://a.example/", "", true);

    session.on_tab_close(1, 1);
    session.on_load_event(1, 1, "http://a.example/", true, true);
    assert!(recorder.shown.lock().unwrap().is_empty());
}

#[test]
fn new_tab_link_stakes_a_question_on_the_destination() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(dir.path());
    let recorder = Recorder::new();
    let globals = Globals::init(dir.path(), "3.0.5", recorder.clone()).unwrap();

    let mut session = globals.new_window(0).unwrap();
    session.on_tab_select(0, 0, "http://a.example/");

    // Middle-click on a link: next tab to open claims the question
    session.on_open_new_tab_with("http://b.example/", "http://a.example/");
    session.on_tab_open(1, 1, "link");
    session.on_tab_select(1, 1, "http://b.example/");
    session.on_load_event(1, 1, "http://b.example/", true, true);

    assert_eq!(recorder.shown.lock().unwrap().as_slice(), ["Q1"]);
}

#[tokio::test]
async fn focus_and_blur_append_to_the_focus_log() {
    let dir = tempfile::tempdir().unwrap();
    let globals = Globals::init(dir.path(), "3.0.5", Recorder::new()).unwrap();

    let mut session = globals.new_window(0).unwrap();
    session.on_window_focus();
    session.on_window_blur();
    session.close();

    let focus = fs::read_to_string(dir.path().join("focus.dat")).unwrap();
    assert!(focus.contains(" W0 focus"));
    assert!(focus.contains(" W0 blur"));
}

#[test]
fn reopened_log_continues_ids_and_headers() {
    let dir = tempfile::tempdir().unwrap();
    {
        let globals = Globals::init(dir.path(), "3.0.5", Recorder::new()).unwrap();
        let mut session = globals.new_window(0).unwrap();
        session
            .on_load_start(0, 0, "http://a.example/", "", true)
            .unwrap();
        session.close();
    }

    // Second run: LOG_OPEN header, fresh window counter per process, and
    // previously obfuscated strings keep their surrogate ids
    let globals = Globals::init(dir.path(), "3.0.6", Recorder::new()).unwrap();
    let mut session = globals.new_window(0).unwrap();
    session
        .on_load_start(0, 0, "http://a.example/", "", true)
        .unwrap();

    let events = read_events(dir.path());
    assert_eq!(events[0]["event"], "LOG_CREATE");
    let open = events.iter().find(|e| e["event"] == "LOG_OPEN").unwrap();
    assert_eq!(open["firefox_version"], "3.0.6");

    let starts: Vec<&Value> = events
        .iter()
        .filter(|e| e["event"] == "load_start")
        .collect();
    assert_eq!(starts.len(), 2);
    // Same raw URL, same surrogate form across runs
    assert_eq!(starts[0]["href"], starts[1]["href"]);
}
