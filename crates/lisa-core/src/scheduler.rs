//! Weekly activity digest, driven by a 5-field cron expression
//! (min hour dom mon dow, local time).

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Datelike, Local, LocalResult, TimeZone, Timelike};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    messaging::{port::MessagingPort, types::SendOptions},
    ports::{GroupRecord, Store, UserRecord},
    Error, Result,
};

/// How long the job loop waits before asking the schedule again when it
/// found no upcoming run.
const NO_RUN_RETRY: Duration = Duration::from_secs(60 * 60);

/// Outcome of one fan-out over all active groups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub sent: usize,
    pub failed: usize,
}

pub struct WeeklyReporter {
    store: Arc<dyn Store>,
    messenger: Arc<dyn MessagingPort>,
    top_n: usize,
    expr: CronExpr,
}

impl WeeklyReporter {
    pub fn new(
        store: Arc<dyn Store>,
        messenger: Arc<dyn MessagingPort>,
        top_n: usize,
        cron: &str,
    ) -> Result<Self> {
        Ok(Self {
            store,
            messenger,
            top_n,
            expr: CronExpr::parse(cron)?,
        })
    }

    pub fn next_run(&self) -> Option<DateTime<Local>> {
        self.expr.next_after(Local::now())
    }

    /// Send one digest to every active group. A failing group never stops
    /// the others.
    pub async fn run_once(&self) -> Result<ReportSummary> {
        let groups = self.store.list_groups().await?;
        let mut summary = ReportSummary::default();

        for group in groups.iter().filter(|g| g.active) {
            match self.report_group(group).await {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        group_id = group.group_id.0,
                        group = %group.name,
                        "failed to send weekly report: {e}"
                    );
                }
            }
        }

        tracing::info!(sent = summary.sent, failed = summary.failed, "weekly report finished");
        Ok(summary)
    }

    async fn report_group(&self, group: &GroupRecord) -> Result<()> {
        let users = self
            .store
            .top_users_in_group(group.group_id, self.top_n)
            .await?;
        let text = format_digest(&group.name, self.top_n, &users);
        self.messenger
            .send_message(group.group_id, &text, SendOptions::default())
            .await?;
        Ok(())
    }

    /// Spawn the job loop. It exits when `cancel` fires.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.job_loop(cancel).await })
    }

    async fn job_loop(&self, cancel: CancellationToken) {
        loop {
            let now = Local::now();
            let Some(next) = self.expr.next_after(now) else {
                tracing::warn!(retry_in = ?NO_RUN_RETRY, "weekly report schedule has no next run");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(NO_RUN_RETRY) => continue,
                }
            };
            let dur = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next = %next, "weekly report scheduled");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(dur) => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!("weekly report failed: {e}");
                    }
                }
            }
        }
    }
}

pub fn format_digest(group_name: &str, top_n: usize, users: &[UserRecord]) -> String {
    let mut out = format!("📊 Weekly Activity Report for {group_name}\n\nTop {top_n} Active Members:\n");
    for (i, user) in users.iter().enumerate() {
        let name = if user.display_name.trim().is_empty() {
            "Unknown User"
        } else {
            user.display_name.as_str()
        };
        out.push_str(&format!("{}. {}: {} XP\n", i + 1, name, user.xp));
    }
    out
}

// === Cron expression engine ===

#[derive(Clone, Debug)]
pub struct CronExpr {
    min: Field,
    hour: Field,
    dom: Field,
    mon: Field,
    dow: Field,
}

#[derive(Clone, Debug)]
struct Field {
    min: u32,
    max: u32,
    any: bool,
    allowed: Vec<bool>, // index = value
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let parts = expr.split_whitespace().collect::<Vec<_>>();
        if parts.len() != 5 {
            return Err(Error::Config(format!(
                "expected 5 cron fields, got {}",
                parts.len()
            )));
        }

        Ok(Self {
            min: Field::parse(parts[0], 0, 59, false)?,
            hour: Field::parse(parts[1], 0, 23, false)?,
            dom: Field::parse(parts[2], 1, 31, false)?,
            mon: Field::parse(parts[3], 1, 12, false)?,
            dow: Field::parse(parts[4], 0, 6, true)?,
        })
    }

    pub fn matches<T: Datelike + Timelike>(&self, dt: &T) -> bool {
        if !self.min.contains(dt.minute())
            || !self.hour.contains(dt.hour())
            || !self.mon.contains(dt.month())
        {
            return false;
        }

        // If both DOM and DOW are restricted, either one matching is enough.
        let dom_match = self.dom.contains(dt.day());
        let dow_match = self.dow.contains(dt.weekday().num_days_from_sunday());

        match (self.dom.any, self.dow.any) {
            (true, true) => true,
            (true, false) => dow_match,
            (false, true) => dom_match,
            (false, false) => dom_match || dow_match,
        }
    }

    /// First matching wall-clock minute strictly after `now`, in `now`'s zone.
    ///
    /// Iterates on local wall time so DST transitions cannot stall the
    /// search: minutes skipped by a spring-forward jump are passed over, and
    /// a minute repeated by a fall-back resolves to its first instant that is
    /// still after `now`.
    pub fn next_after<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = now.timezone();
        let wall = now.naive_local();
        let mut t = wall
            - chrono::Duration::seconds(i64::from(wall.second()))
            - chrono::Duration::nanoseconds(i64::from(wall.nanosecond()));

        // Cap at a year of minutes for impossible expressions (e.g. Feb 31).
        let max_iters = 366usize * 24 * 60;
        for _ in 0..max_iters {
            t += chrono::Duration::minutes(1);
            if !self.matches(&t) {
                continue;
            }
            if let Some(at) = resolve_after(tz.from_local_datetime(&t), &now) {
                return Some(at);
            }
        }
        None
    }
}

fn resolve_after<Tz: TimeZone>(
    local: LocalResult<DateTime<Tz>>,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let at = match local {
        LocalResult::Single(at) => at,
        LocalResult::Ambiguous(earliest, latest) => {
            if earliest > *now {
                earliest
            } else {
                latest
            }
        }
        LocalResult::None => return None,
    };
    (at > *now).then_some(at)
}

impl Field {
    fn parse(raw: &str, min: u32, max: u32, allow_7_as_0: bool) -> Result<Self> {
        let raw = raw.trim();
        let mut allowed = vec![false; (max + 1) as usize];

        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (base, step) = match part.split_once('/') {
                Some((a, b)) => {
                    let step: u32 = b
                        .trim()
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid cron step: {b}")))?;
                    if step == 0 {
                        return Err(Error::Config("cron step must be > 0".to_string()));
                    }
                    (a.trim(), step)
                }
                None => (part, 0),
            };

            let (start, end) = if base == "*" {
                (min, max)
            } else if let Some((a, b)) = base.split_once('-') {
                (parse_u32(a.trim(), allow_7_as_0)?, parse_u32(b.trim(), allow_7_as_0)?)
            } else {
                let a = parse_u32(base, allow_7_as_0)?;
                if step > 0 {
                    (a, max)
                } else {
                    (a, a)
                }
            };

            if start < min || end > max || start > end {
                return Err(Error::Config(format!("cron value out of range: {part}")));
            }

            let mut v = start;
            while v <= end {
                allowed[v as usize] = true;
                v += step.max(1);
            }
        }

        let any = (min..=max).all(|v| allowed[v as usize]);
        if !any && !allowed.iter().any(|a| *a) {
            return Err(Error::Config(format!("empty cron field: {raw:?}")));
        }

        Ok(Self {
            min,
            max,
            any,
            allowed,
        })
    }

    fn contains(&self, v: u32) -> bool {
        if v < self.min || v > self.max {
            return false;
        }
        self.allowed.get(v as usize).copied().unwrap_or(false)
    }
}

fn parse_u32(s: &str, allow_7_as_0: bool) -> Result<u32> {
    let v: u32 = s
        .parse()
        .map_err(|_| Error::Config(format!("invalid cron number: {s}")))?;
    Ok(if allow_7_as_0 && v == 7 { 0 } else { v })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, UserId},
        memory_store::InMemoryStore,
        testing::RecordingMessenger,
    };
    use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Utc};

    /// US Eastern around the 2026-11-01 fall-back: local 01:00-01:59 occurs
    /// twice, first at -04:00 and then at -05:00.
    #[derive(Clone, Copy, Debug)]
    struct EasternFallBack;

    impl EasternFallBack {
        fn edt() -> FixedOffset {
            FixedOffset::west_opt(4 * 3600).unwrap()
        }

        fn est() -> FixedOffset {
            FixedOffset::west_opt(5 * 3600).unwrap()
        }

        fn switch_utc() -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2026, 11, 1)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap()
        }
    }

    impl TimeZone for EasternFallBack {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            EasternFallBack
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let as_daylight = *local + chrono::Duration::hours(4) < Self::switch_utc();
            let as_standard = *local + chrono::Duration::hours(5) >= Self::switch_utc();
            match (as_daylight, as_standard) {
                (true, true) => LocalResult::Ambiguous(Self::edt(), Self::est()),
                (true, false) => LocalResult::Single(Self::edt()),
                (false, true) => LocalResult::Single(Self::est()),
                (false, false) => LocalResult::None,
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < Self::switch_utc() {
                Self::edt()
            } else {
                Self::est()
            }
        }
    }

    fn eastern_at_utc(month: u32, day: u32, hour: u32, min: u32) -> DateTime<EasternFallBack> {
        EasternFallBack.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2026, month, day)
                .unwrap()
                .and_hms_opt(hour, min, 0)
                .unwrap(),
        )
    }

    fn utc(month: u32, day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, day, hour, min, 0).unwrap()
    }

    #[test]
    fn cron_expr_parses_and_matches_basic() {
        let expr = CronExpr::parse("0 * * * *").unwrap();
        let dt = Local.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        assert!(expr.matches(&dt));
        let dt2 = Local.with_ymd_and_hms(2026, 1, 1, 10, 1, 0).unwrap();
        assert!(!expr.matches(&dt2));
    }

    #[test]
    fn cron_expr_next_after_finds_next_minute_boundary() {
        let expr = CronExpr::parse("*/5 * * * *").unwrap();
        let dt = Local.with_ymd_and_hms(2026, 1, 1, 10, 1, 30).unwrap();
        let next = expr.next_after(dt).unwrap();
        assert_eq!(next.minute(), 5);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn weekly_default_fires_sunday_midnight() {
        let expr = CronExpr::parse("0 0 * * 0").unwrap();
        // 2026-01-01 is a Thursday.
        let dt = Local.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let next = expr.next_after(dt).unwrap();
        assert_eq!((next.year(), next.month(), next.day()), (2026, 1, 4));
        assert_eq!((next.hour(), next.minute()), (0, 0));
        assert!(CronExpr::parse("0 0 * * 7").unwrap().matches(&next));
    }

    #[test]
    fn next_after_works_inside_the_repeated_hour() {
        let weekly = CronExpr::parse("0 0 * * 0").unwrap();
        // 01:20 -04:00, the first pass through the repeated hour.
        let now = eastern_at_utc(11, 1, 5, 20);
        assert_eq!(now.naive_local().hour(), 1);

        let next = weekly.next_after(now).unwrap();

        assert_eq!(next.with_timezone(&Utc), utc(11, 8, 5, 0));
        assert_eq!(next.naive_local().hour(), 0);
    }

    #[test]
    fn repeated_minute_resolves_to_the_pass_after_now() {
        let daily = CronExpr::parse("30 1 * * *").unwrap();

        let first_pass = daily.next_after(eastern_at_utc(11, 1, 5, 20)).unwrap();
        let second_pass = daily.next_after(eastern_at_utc(11, 1, 6, 20)).unwrap();
        let after_both = daily.next_after(eastern_at_utc(11, 1, 6, 40)).unwrap();

        assert_eq!(first_pass.with_timezone(&Utc), utc(11, 1, 5, 30));
        assert_eq!(second_pass.with_timezone(&Utc), utc(11, 1, 6, 30));
        assert_eq!(after_both.with_timezone(&Utc), utc(11, 2, 6, 30));
    }

    #[test]
    fn resolution_rejects_gaps_and_past_instants() {
        let at = FixedOffset::east_opt(0).unwrap();
        let now = at.with_ymd_and_hms(2026, 3, 8, 1, 0, 0).unwrap();
        assert_eq!(resolve_after(LocalResult::None, &now), None);
        let earlier = at.with_ymd_and_hms(2026, 3, 8, 0, 59, 0).unwrap();
        assert_eq!(resolve_after(LocalResult::Single(earlier), &now), None);
    }

    #[test]
    fn cron_expr_rejects_malformed_input() {
        assert!(CronExpr::parse("0 0 * *").is_err());
        assert!(CronExpr::parse("61 * * * *").is_err());
        assert!(CronExpr::parse("*/0 * * * *").is_err());
        assert!(CronExpr::parse("a * * * *").is_err());
        assert!(CronExpr::parse("5-1 * * * *").is_err());
    }

    #[test]
    fn digest_format() {
        let users = vec![
            UserRecord {
                user_id: UserId(1),
                display_name: "lisa".to_string(),
                xp: 120,
                group_id: Some(ChatId(-1)),
            },
            UserRecord {
                user_id: UserId(2),
                display_name: String::new(),
                xp: 30,
                group_id: Some(ChatId(-1)),
            },
        ];
        assert_eq!(
            format_digest("Fans", 10, &users),
            "📊 Weekly Activity Report for Fans\n\nTop 10 Active Members:\n1. lisa: 120 XP\n2. Unknown User: 30 XP\n"
        );
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (group, name) in [(-1, "A"), (-2, "B")] {
            store.upsert_group(ChatId(group), name).await.unwrap();
        }
        for (user, group, xp) in [(1, -1, 30), (2, -1, 50), (3, -2, 10)] {
            store.add_user_xp(UserId(user), &format!("u{user}"), xp).await.unwrap();
            store.set_user_group(UserId(user), ChatId(group)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn failed_group_does_not_stop_fan_out() {
        let store = seeded_store().await;
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.fail_sends_to(ChatId(-2));
        let reporter = WeeklyReporter::new(store, messenger.clone(), 10, "0 0 * * 0").unwrap();

        let summary = reporter.run_once().await.unwrap();

        assert_eq!(summary, ReportSummary { sent: 1, failed: 1 });
        let texts = messenger.texts_for(ChatId(-1));
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("1. u2: 50 XP\n2. u1: 30 XP"));
    }

    #[tokio::test]
    async fn first_group_failure_still_reaches_second() {
        let store = seeded_store().await;
        let messenger = Arc::new(RecordingMessenger::new());
        // list_groups is ordered by id, so -2 comes first.
        messenger.fail_sends_to(ChatId(-2));
        let reporter = WeeklyReporter::new(store, messenger.clone(), 10, "0 0 * * 0").unwrap();

        reporter.run_once().await.unwrap();

        assert_eq!(messenger.texts_for(ChatId(-1)).len(), 1);
    }

    #[tokio::test]
    async fn inactive_groups_are_skipped() {
        let store = seeded_store().await;
        store
            .mark_group_inactive(ChatId(-1), "kicker", chrono::Utc::now())
            .await
            .unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let reporter = WeeklyReporter::new(store, messenger.clone(), 1, "0 0 * * 0").unwrap();

        let summary = reporter.run_once().await.unwrap();

        assert_eq!(summary, ReportSummary { sent: 1, failed: 0 });
        assert!(messenger.texts_for(ChatId(-1)).is_empty());
        assert_eq!(
            messenger.texts_for(ChatId(-2)),
            vec!["📊 Weekly Activity Report for B\n\nTop 1 Active Members:\n1. u3: 10 XP\n"]
        );
    }

    #[tokio::test]
    async fn job_loop_stops_on_cancel() {
        let store = Arc::new(InMemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let reporter = Arc::new(WeeklyReporter::new(store, messenger, 10, "0 0 * * 0").unwrap());
        let cancel = CancellationToken::new();

        let handle = reporter.start(cancel.clone());
        cancel.cancel();

        handle.await.unwrap();
    }
}
