//! City Loader Library
//!
//! One-time migration of a bundled city list into a local SQLite store, with
//! observable progress and a completion flag that makes it run once.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod migration;
pub mod prefs;
pub mod progress;
pub mod source;
pub mod types;
