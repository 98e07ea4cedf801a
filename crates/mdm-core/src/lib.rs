//! Core of the `mdm` multi-protocol download manager.
//!
//! Jobs are parsed from batch files or the command line, handed to the
//! [`scheduler`], and executed by protocol [`downloaders`]. HTTP transfers
//! go through the chunked, resumable range-GET [`engine`]; every job reports
//! to the [`progress`] manager over a channel.

pub mod batch;
pub mod chunk;
pub mod config;
pub mod control;
pub mod downloaders;
pub mod engine;
pub mod fetch;
pub mod job;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod url_model;
