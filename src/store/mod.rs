pub mod event_log;
pub mod focus_log;
pub mod paths;
pub mod string_table;

pub use event_log::{BoundLog, EventLog, EventLogHandle, LOG_VERSION};
pub use focus_log::FocusLogHandle;
pub use string_table::StringTable;
