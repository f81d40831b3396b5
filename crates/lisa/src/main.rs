use std::sync::Arc;

use lisa_core::{config::Config, memory_store::InMemoryStore, ports::Store};
use lisa_sqlite::SqliteStore;

async fn open_store(cfg: &Config) -> Result<Arc<dyn Store>, lisa_core::Error> {
    if cfg.database_url.eq_ignore_ascii_case("memory") {
        tracing::warn!("using in-memory store; data is lost on restart");
        return Ok(Arc::new(InMemoryStore::new()));
    }
    Ok(Arc::new(SqliteStore::connect(&cfg.database_url).await?))
}

#[tokio::main]
async fn main() -> Result<(), lisa_core::Error> {
    lisa_core::logging::init("lisa")?;

    let cfg = Arc::new(Config::load()?);
    let store = open_store(&cfg).await?;

    let commands_cfg = cfg.clone();
    lisa_telegram::router::run_polling(cfg, store, move |reporter| {
        lisa_commands::builtin(&commands_cfg, reporter)
    })
    .await
    .map_err(|e| lisa_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
