//! The closed per-event schema for the browsing log.
//!
//! Every entry written to the event log is one of these variants; the
//! `event` tag and the field spellings are the on-disk format, so renames
//! here are breaking changes for offline tooling.

use serde::Serialize;

/// Mouse button and modifier state attached to click events.
#[derive(Debug, Clone, Serialize)]
pub struct MouseState {
    pub which: u16,
    #[serde(rename = "ctrlKey")]
    pub ctrl_key: bool,
    #[serde(rename = "shiftKey")]
    pub shift_key: bool,
    #[serde(rename = "altKey")]
    pub alt_key: bool,
    #[serde(rename = "metaKey")]
    pub meta_key: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum Event {
    /// First entry of a newly created log file.
    #[serde(rename = "LOG_CREATE")]
    LogCreate {
        date: String,
        version: u32,
        firefox_version: String,
    },
    /// First entry after reopening an existing log file.
    #[serde(rename = "LOG_OPEN")]
    LogOpen {
        date: String,
        version: u32,
        firefox_version: String,
    },

    #[serde(rename = "ERROR")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        exception: Option<String>,
    },
    #[serde(rename = "WARNING")]
    Warning { message: String },

    #[serde(rename = "window_onload")]
    WindowOnload,
    #[serde(rename = "logger_init")]
    LoggerInit,
    #[serde(rename = "window_unload")]
    WindowUnload,
    #[serde(rename = "quit_application")]
    QuitApplication,

    #[serde(rename = "tab_registered")]
    TabRegistered {
        #[serde(rename = "tabId")]
        tab_id: String,
    },
    #[serde(rename = "TabOpen")]
    TabOpen {
        cause: String,
        #[serde(rename = "tabId")]
        tab_id: String,
        #[serde(rename = "tabIndex")]
        tab_index: usize,
    },
    #[serde(rename = "TabRestore")]
    TabRestore {
        #[serde(rename = "tabId")]
        tab_id: String,
        #[serde(rename = "tabIndex")]
        tab_index: usize,
    },
    #[serde(rename = "TabSelect")]
    TabSelect {
        #[serde(rename = "tabIndex")]
        tab_index: usize,
        #[serde(rename = "tabId")]
        tab_id: String,
        url: String,
    },
    #[serde(rename = "TabMove")]
    TabMove {
        #[serde(rename = "tabId")]
        tab_id: String,
        #[serde(rename = "tabIndex")]
        tab_index: usize,
    },
    #[serde(rename = "TabClose")]
    TabClose {
        #[serde(rename = "tabId")]
        tab_id: String,
        #[serde(rename = "tabIndex")]
        tab_index: usize,
    },

    #[serde(rename = "load_start")]
    LoadStart {
        #[serde(rename = "tabId")]
        tab_id: String,
        #[serde(rename = "tabIndex")]
        tab_index: usize,
        href: String,
        cause: String,
        #[serde(rename = "isTopLevel")]
        is_top_level: bool,
        #[serde(rename = "lastKeyDownTime")]
        last_key_down_time: i64,
    },
    #[serde(rename = "redirect")]
    Redirect {
        #[serde(rename = "tabId")]
        tab_id: String,
        #[serde(rename = "tabIndex")]
        tab_index: usize,
        from_url: String,
        to_url: String,
    },
    #[serde(rename = "LocationChange")]
    LocationChange {
        #[serde(rename = "tabId")]
        tab_id: String,
        #[serde(rename = "tabIndex")]
        tab_index: usize,
        href: String,
        cause: String,
        #[serde(rename = "isTopLevel")]
        is_top_level: bool,
        #[serde(rename = "lastKeyDownTime")]
        last_key_down_time: i64,
    },
    /// A completed subframe or non-document load.
    #[serde(rename = "load")]
    Load {
        #[serde(rename = "tabIndex")]
        tab_index: usize,
        #[serde(rename = "tabId")]
        tab_id: String,
        url: String,
        #[serde(rename = "isTopLevel")]
        is_top_level: bool,
    },

    #[serde(rename = "form_submit")]
    FormSubmit { action: String },
    #[serde(rename = "LINK_CLICK")]
    LinkClick {
        href: String,
        target: String,
        #[serde(flatten)]
        mouse: MouseState,
    },
    #[serde(rename = "DOCUMENT_CLICK")]
    DocumentClick {
        #[serde(flatten)]
        mouse: MouseState,
    },
    #[serde(rename = "document_mousedown")]
    DocumentMousedown {
        #[serde(flatten)]
        mouse: MouseState,
    },
    #[serde(rename = "window_mousedown")]
    WindowMousedown {
        #[serde(flatten)]
        mouse: MouseState,
    },
    #[serde(rename = "RIGHT_CLICK")]
    RightClick { url: String },

    #[serde(rename = "NEW_WINDOW")]
    NewWindow,
    #[serde(rename = "NEW_TAB")]
    NewTab,
    #[serde(rename = "openNewTabWith")]
    OpenNewTabWith {
        href: String,
        #[serde(rename = "sourceURL")]
        source_url: String,
    },
    #[serde(rename = "openNewWindowWith")]
    OpenNewWindowWith {
        href: String,
        #[serde(rename = "sourceURL")]
        source_url: String,
    },

    #[serde(rename = "GoHome")]
    GoHome,
    #[serde(rename = "URLBarCommand")]
    UrlBarCommand,
    #[serde(rename = "SearchBarSearch")]
    SearchBarSearch,
    #[serde(rename = "RightClickSearch")]
    RightClickSearch,

    #[serde(rename = "OnHistoryGoBack")]
    HistoryGoBack { url: String },
    #[serde(rename = "BrowserForward")]
    HistoryGoForward { url: String },
    #[serde(rename = "gotoHistoryIndex")]
    HistoryGotoIndex { index: i32, url: String },
    #[serde(rename = "OnHistoryReload")]
    HistoryReload { url: String },
    #[serde(rename = "bookmark_visit")]
    BookmarkVisit { url: String },

    #[serde(rename = "question")]
    Question { id: String },
    #[serde(rename = "answer")]
    Answer { id: String, text: String },
}

impl Event {
    /// The structured error event, used by failure isolation paths.
    pub fn error(message: impl Into<String>, exception: Option<String>) -> Self {
        Event::Error {
            message: message.into(),
            exception,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_log_format_names() {
        let value = serde_json::to_value(Event::LoadStart {
            tab_id: "W0T0".into(),
            tab_index: 0,
            href: "http://0/1".into(),
            cause: "".into(),
            is_top_level: true,
            last_key_down_time: 0,
        })
        .unwrap();
        assert_eq!(value["event"], "load_start");
        assert_eq!(value["tabId"], "W0T0");
        assert_eq!(value["isTopLevel"], true);
        assert!(value.get("lastKeyDownTime").is_some());
    }

    #[test]
    fn mouse_state_flattens_into_click_events() {
        let value = serde_json::to_value(Event::DocumentClick {
            mouse: MouseState {
                which: 1,
                ctrl_key: false,
                shift_key: false,
                alt_key: false,
                meta_key: true,
            },
        })
        .unwrap();
        assert_eq!(value["event"], "DOCUMENT_CLICK");
        assert_eq!(value["which"], 1);
        assert_eq!(value["metaKey"], true);
    }

    #[test]
    fn error_event_skips_missing_exception() {
        let value = serde_json::to_value(Event::error("boom", None)).unwrap();
        assert!(value.get("exception").is_none());
    }
}
