//! Built-in chat commands.

use std::sync::Arc;

use lisa_core::{commands::Command, config::Config, scheduler::WeeklyReporter, Result};

pub mod help;
pub mod info;
pub mod lisa;
pub mod rank;
pub mod report;

pub use help::HelpCommand;
pub use info::InfoCommand;
pub use lisa::{HttpLisaBackend, LisaBackend, LisaCommand};
pub use rank::RankCommand;
pub use report::ReportCommand;

/// Every built-in command, in load order.
pub fn builtin(cfg: &Config, reporter: Arc<WeeklyReporter>) -> Result<Vec<Arc<dyn Command>>> {
    let backend = HttpLisaBackend::new(&cfg.lisa_api_url, cfg.http_timeout)?;

    Ok(vec![
        Arc::new(HelpCommand),
        Arc::new(InfoCommand::new(&cfg.bot_name, &cfg.developer_name)),
        Arc::new(LisaCommand::new(Arc::new(backend))),
        Arc::new(RankCommand),
        Arc::new(ReportCommand::new(reporter)),
    ])
}
