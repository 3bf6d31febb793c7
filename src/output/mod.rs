//! Output formatters for scan results and quarantine listings.
//!
//! - [`text`]: human-readable reports for the terminal
//! - [`json`]: machine-readable JSON for scripting

pub mod json;
pub mod text;

pub use json::{write_json, JsonOutput, JsonOutputError};
