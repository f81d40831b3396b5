/// Core error type for the bot.
///
/// Adapter crates (SQLite, Telegram, HTTP) map their specific errors into this
/// type so the dispatcher can contain failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
