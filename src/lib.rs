//! Privacy-preserving capture of browsing activity.
//!
//! The embedding browser surface feeds window, tab, navigation and input
//! notifications into a [`session::WindowSession`]; the library persists
//! them as an append-only event log, a focus/idle stream and a string
//! table of obfuscation surrogates. Raw URLs never reach disk: the
//! [`obfuscate::UrlObfuscator`] replaces each sensitive URL component with
//! an opaque id while keeping the structure (scheme, host boundary, path
//! depth) analyzable.

pub mod error;
pub mod events;
pub mod focus;
pub mod hooks;
pub mod navigation;
pub mod obfuscate;
pub mod questions;
pub mod registry;
pub mod session;
pub mod settings;
pub mod store;
pub mod utils;

pub use error::{LoggerError, Result};
pub use session::{Globals, WindowSession};
