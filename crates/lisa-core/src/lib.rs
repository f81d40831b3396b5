//! Core domain + application logic for the Cyber Lisa Telegram bot.
//!
//! This crate is framework-agnostic. Telegram and SQLite live behind ports
//! (traits) implemented in adapter crates; command handlers live in
//! `lisa-commands`.

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod leveling;
pub mod logging;
pub mod memory_store;
pub mod messaging;
pub mod ports;
pub mod scheduler;
pub mod security;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{Error, Result};
