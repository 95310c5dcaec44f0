//! Shared pieces of the gridtrack command-line tools

pub mod output;
pub mod progress;
