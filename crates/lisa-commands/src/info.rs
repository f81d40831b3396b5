use async_trait::async_trait;

use lisa_core::{
    commands::{Command, CommandContext, CommandMeta},
    formatting::escape_html,
    messaging::types::{InlineButton, InlineKeyboard, SendOptions},
    Result,
};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━";

pub const LINKS: [(&str, &str); 4] = [
    ("GitHub", "https://github.com/LisaxNisan"),
    ("YouTube", "https://youtube.com/NisaN198-php"),
    ("Instagram", "https://instagram.com/nisanofficial"),
    ("Facebook", "https://facebook.com/shamsuddin.munna.2024"),
];

/// `/info`: who built the bot and how the host is doing.
pub struct InfoCommand {
    bot_name: String,
    developer_name: String,
}

impl InfoCommand {
    pub fn new(bot_name: &str, developer_name: &str) -> Self {
        Self {
            bot_name: bot_name.to_string(),
            developer_name: developer_name.to_string(),
        }
    }
}

#[async_trait]
impl Command for InfoCommand {
    fn meta(&self) -> CommandMeta {
        CommandMeta::new("info", "Utility", "Show developer information and bot stats.")
            .guide("Use /info")
    }

    async fn execute(&self, ctx: &CommandContext<'_>, _args: &[String]) -> Result<()> {
        let stats = SystemStats::collect().await;
        let html = render_info(&self.bot_name, &self.developer_name, &stats);
        ctx.reply_with(&html, SendOptions::html().with_keyboard(links_keyboard()))
            .await
    }
}

pub fn links_keyboard() -> InlineKeyboard {
    InlineKeyboard::new(
        LINKS
            .chunks(2)
            .map(|row| {
                row.iter()
                    .map(|(label, url)| InlineButton::url(*label, *url))
                    .collect()
            })
            .collect(),
    )
}

/// Host statistics. Anything that can't be read stays `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemStats {
    pub process_rss_mb: Option<f64>,
    pub total_ram_mb: Option<f64>,
    pub free_ram_mb: Option<f64>,
    pub load_1m: Option<f64>,
    pub storage: Option<StorageUsage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageUsage {
    pub used: String,
    pub total: String,
}

impl SystemStats {
    pub async fn collect() -> Self {
        let status = read_proc("/proc/self/status").await;
        let meminfo = read_proc("/proc/meminfo").await;
        let loadavg = read_proc("/proc/loadavg").await;

        Self {
            process_rss_mb: status.as_deref().and_then(|s| kb_field(s, "VmRSS:")).map(kb_to_mb),
            total_ram_mb: meminfo.as_deref().and_then(|s| kb_field(s, "MemTotal:")).map(kb_to_mb),
            free_ram_mb: meminfo
                .as_deref()
                .and_then(|s| kb_field(s, "MemAvailable:").or_else(|| kb_field(s, "MemFree:")))
                .map(kb_to_mb),
            load_1m: loadavg.as_deref().and_then(parse_loadavg),
            storage: root_storage().await,
        }
    }
}

async fn read_proc(path: &str) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::debug!(path, "failed to read stats: {e}");
            None
        }
    }
}

async fn root_storage() -> Option<StorageUsage> {
    let output = tokio::process::Command::new("df")
        .args(["-h", "/"])
        .output()
        .await
        .map_err(|e| tracing::debug!("df failed: {e}"))
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_df(&String::from_utf8_lossy(&output.stdout))
}

/// `"MemTotal:  16318412 kB"` → `16318412`.
pub fn kb_field(text: &str, key: &str) -> Option<u64> {
    text.lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

fn kb_to_mb(kb: u64) -> f64 {
    kb as f64 / 1024.0
}

pub fn parse_loadavg(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/// Second line of `df -h /`: `Filesystem Size Used Avail Use% Mounted`.
pub fn parse_df(stdout: &str) -> Option<StorageUsage> {
    let cols: Vec<&str> = stdout.lines().nth(1)?.split_whitespace().collect();
    Some(StorageUsage {
        total: cols.get(1)?.to_string(),
        used: cols.get(2)?.to_string(),
    })
}

fn mb(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2} MB")).unwrap_or_else(|| "N/A".to_string())
}

pub fn render_info(bot_name: &str, developer_name: &str, stats: &SystemStats) -> String {
    let links = LINKS
        .iter()
        .map(|(label, url)| format!("<a href=\"{url}\">{label}</a>"))
        .collect::<Vec<_>>()
        .join(" | ");
    let storage = stats
        .storage
        .as_ref()
        .map(|s| format!("{} used / {} total", escape_html(&s.used), escape_html(&s.total)))
        .unwrap_or_else(|| "N/A".to_string());
    let load = stats
        .load_1m
        .map(|l| format!("{l:.2}"))
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "<b>🤖 Bot Information:</b>\n{RULE}\n\
         <b>Bot Name:</b> {}\n\
         <b>Developer:</b> {}\n\
         <b>Description:</b> A multifunctional bot with a range of utilities and features.\n\n\
         <b>🌐 Developer Links:</b>\n{RULE}\n{links}\n\n\
         <b>📊 Bot Status:</b>\n{RULE}\n\
         <b>• RAM Usage:</b> {} / {} (Free: {})\n\
         <b>• CPU Load:</b> {load}\n\
         <b>• Storage:</b> {storage}\n\n\
         {RULE}\n<b>Connect with us on social media!</b>",
        escape_html(bot_name),
        escape_html(developer_name),
        mb(stats.process_rss_mb),
        mb(stats.total_ram_mb),
        mb(stats.free_ram_mb),
    )
}

#[cfg(test)]
mod tests {
    use lisa_core::messaging::types::ButtonAction;

    use super::*;

    #[test]
    fn parses_meminfo_fields() {
        let meminfo = "MemTotal:       16318412 kB\nMemFree:         1000000 kB\nMemAvailable:    8000000 kB\n";
        assert_eq!(kb_field(meminfo, "MemTotal:"), Some(16_318_412));
        assert_eq!(kb_field(meminfo, "MemAvailable:"), Some(8_000_000));
        assert_eq!(kb_field(meminfo, "SwapTotal:"), None);
    }

    #[test]
    fn parses_loadavg_and_df() {
        assert_eq!(parse_loadavg("0.42 0.30 0.25 1/234 5678\n"), Some(0.42));
        assert_eq!(parse_loadavg(""), None);

        let df = "Filesystem      Size  Used Avail Use% Mounted on\n/dev/sda1        50G   21G   27G  44% /\n";
        assert_eq!(
            parse_df(df),
            Some(StorageUsage {
                used: "21G".to_string(),
                total: "50G".to_string()
            })
        );
        assert_eq!(parse_df("Filesystem Size\n"), None);
    }

    #[test]
    fn render_falls_back_to_na() {
        let out = render_info("Cyber Lisa", "N1SA9", &SystemStats::default());
        assert!(out.contains("<b>Bot Name:</b> Cyber Lisa"));
        assert!(out.contains("<b>Developer:</b> N1SA9"));
        assert!(out.contains("RAM Usage:</b> N/A / N/A (Free: N/A)"));
        assert!(out.contains("Storage:</b> N/A"));
    }

    #[test]
    fn render_formats_numbers() {
        let stats = SystemStats {
            process_rss_mb: Some(12.345),
            total_ram_mb: Some(2048.0),
            free_ram_mb: Some(1024.5),
            load_1m: Some(0.5),
            storage: Some(StorageUsage {
                used: "21G".to_string(),
                total: "50G".to_string(),
            }),
        };
        let out = render_info("Cyber Lisa", "N1SA9", &stats);
        assert!(out.contains("12.35 MB / 2048.00 MB (Free: 1024.50 MB)"));
        assert!(out.contains("CPU Load:</b> 0.50"));
        assert!(out.contains("21G used / 50G total"));
    }

    #[test]
    fn keyboard_has_two_rows_of_links() {
        let kb = links_keyboard();
        assert_eq!(kb.rows.len(), 2);
        assert_eq!(kb.rows[0][0].label, "GitHub");
        assert_eq!(
            kb.rows[1][1].action,
            ButtonAction::Url("https://facebook.com/shamsuddin.munna.2024".to_string())
        );
    }
}
