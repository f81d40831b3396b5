//! Outbound messaging abstractions (Telegram adapter lives in `lisa-telegram`).

pub mod port;
pub mod throttled;
pub mod types;
