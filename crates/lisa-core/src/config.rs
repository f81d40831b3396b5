use std::{env, time::Duration};

use crate::{errors::Error, scheduler::CronExpr, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/lisa.db";
pub const DEFAULT_REPORT_CRON: &str = "0 0 * * 0";
pub const DEFAULT_LISA_API_URL: &str = "https://www.noobs-api.000.pe/dipto/baby";

/// Typed configuration for the bot, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub owner_ids: Vec<i64>,
    pub database_url: String,

    // Dispatch
    pub command_prefix: char,

    // Leveling
    pub xp_per_message: u64,

    // Weekly report
    pub report_cron: String,
    pub report_top_n: usize,

    // Peripheral commands
    pub lisa_api_url: String,
    pub http_timeout: Duration,
    pub bot_name: String,
    pub developer_name: String,
}

impl Config {
    /// Load `.env` (if present, never overriding the real environment) and
    /// build the config from process env vars.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("BOT_TOKEN")
            .or_else(|| get("TELEGRAM_BOT_TOKEN"))
            .ok_or_else(|| {
                Error::Config("BOT_TOKEN environment variable is required".to_string())
            })?;

        let owner_ids = parse_csv_i64(get("OWNER_ID"))?;
        let database_url = get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let command_prefix = match get("COMMAND_PREFIX") {
            None => '/',
            Some(raw) => {
                let mut chars = raw.trim().chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !c.is_whitespace() => c,
                    _ => {
                        return Err(Error::Config(format!(
                            "COMMAND_PREFIX must be a single character, got {raw:?}"
                        )))
                    }
                }
            }
        };

        let xp_per_message = parse_num::<u64>("XP_PER_MESSAGE", get("XP_PER_MESSAGE"))?.unwrap_or(10);
        if xp_per_message == 0 {
            return Err(Error::Config("XP_PER_MESSAGE must be > 0".to_string()));
        }

        let report_cron = get("REPORT_CRON").unwrap_or_else(|| DEFAULT_REPORT_CRON.to_string());
        CronExpr::parse(&report_cron)
            .map_err(|e| Error::Config(format!("invalid REPORT_CRON {report_cron:?}: {e}")))?;
        let report_top_n = parse_num::<usize>("REPORT_TOP_N", get("REPORT_TOP_N"))?.unwrap_or(10);

        let lisa_api_url = get("LISA_API_URL").unwrap_or_else(|| DEFAULT_LISA_API_URL.to_string());
        let http_timeout = Duration::from_millis(
            parse_num::<u64>("HTTP_TIMEOUT_MS", get("HTTP_TIMEOUT_MS"))?.unwrap_or(5_000),
        );
        let bot_name = get("BOT_NAME").unwrap_or_else(|| "Cyber Lisa".to_string());
        let developer_name = get("DEVELOPER_NAME").unwrap_or_else(|| "N1SA9".to_string());

        Ok(Self {
            telegram_bot_token,
            owner_ids,
            database_url,
            command_prefix,
            xp_per_message,
            report_cron,
            report_top_n,
            lisa_api_url,
            http_timeout,
            bot_name,
            developer_name,
        })
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a number, got {raw:?}")))
}

fn parse_csv_i64(v: Option<String>) -> Result<Vec<i64>> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("OWNER_ID contains a non-numeric id: {s:?}")))
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
