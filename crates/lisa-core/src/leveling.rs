//! XP ledger: awards XP per message and derives levels from XP.

use std::sync::Arc;

use crate::{domain::UserId, ports::Store, Result};

/// XP per "curve step": level `n + 1` starts at `n² * LEVEL_CURVE` XP.
pub const LEVEL_CURVE: u64 = 50;

/// Level for a given XP total.
///
/// `1 + floor(sqrt(xp / 50))`: 0..49 XP is level 1, 50 XP is level 2,
/// 200 XP is level 3, 450 XP is level 4 and so on. Pure and monotonic.
pub fn level_for_xp(xp: u64) -> u32 {
    let steps = xp / LEVEL_CURVE;
    let mut root = (steps as f64).sqrt() as u64;
    // Correct float rounding at perfect-square boundaries.
    while root.saturating_mul(root) > steps {
        root -= 1;
    }
    while (root + 1).saturating_mul(root + 1) <= steps {
        root += 1;
    }
    u32::try_from(root).unwrap_or(u32::MAX - 1) + 1
}

/// Minimum XP at which `level` is reached.
pub fn xp_for_level(level: u32) -> u64 {
    let n = u64::from(level.saturating_sub(1));
    n.saturating_mul(n).saturating_mul(LEVEL_CURVE)
}

/// Where a user stands within their current level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelProgress {
    pub level: u32,
    pub xp: u64,
    pub level_floor: u64,
    pub next_level_at: u64,
}

impl LevelProgress {
    pub fn for_xp(xp: u64) -> Self {
        let level = level_for_xp(xp);
        Self {
            level,
            xp,
            level_floor: xp_for_level(level),
            next_level_at: xp_for_level(level.saturating_add(1)),
        }
    }

    pub fn xp_to_next(&self) -> u64 {
        self.next_level_at.saturating_sub(self.xp)
    }
}

/// Outcome of one XP award.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelChange {
    pub level_increased: bool,
    pub old_level: u32,
    pub new_level: u32,
    pub xp: u64,
}

/// Applies the per-message award through the store's atomic increment.
#[derive(Clone)]
pub struct XpLedger {
    store: Arc<dyn Store>,
    xp_per_message: u64,
}

impl XpLedger {
    pub fn new(store: Arc<dyn Store>, xp_per_message: u64) -> Self {
        Self {
            store,
            xp_per_message,
        }
    }

    /// Award one message's worth of XP and report whether the level went up.
    ///
    /// The previous level is computed from the XP the store had right before
    /// this increment, so a redelivered event simply adds another award.
    pub async fn update_user_xp(&self, user_id: UserId, display_name: &str) -> Result<LevelChange> {
        let change = self
            .store
            .add_user_xp(user_id, display_name, self.xp_per_message)
            .await?;

        let old_level = level_for_xp(change.old_xp);
        let new_level = level_for_xp(change.new_xp);

        Ok(LevelChange {
            level_increased: new_level > old_level,
            old_level,
            new_level,
            xp: change.new_xp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::InMemoryStore;

    #[test]
    fn level_thresholds() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(49), 1);
        assert_eq!(level_for_xp(50), 2);
        assert_eq!(level_for_xp(199), 2);
        assert_eq!(level_for_xp(200), 3);
        assert_eq!(level_for_xp(450), 4);
        assert_eq!(level_for_xp(u64::MAX), level_for_xp(u64::MAX));
    }

    #[test]
    fn level_is_monotonic() {
        let mut prev = level_for_xp(0);
        for xp in 1..20_000u64 {
            let lvl = level_for_xp(xp);
            assert!(lvl >= prev, "level dropped at xp={xp}");
            prev = lvl;
        }
    }

    #[test]
    fn xp_for_level_is_inverse_of_level() {
        for level in 1..50u32 {
            let floor = xp_for_level(level);
            assert_eq!(level_for_xp(floor), level);
            if floor > 0 {
                assert_eq!(level_for_xp(floor - 1), level - 1);
            }
        }
    }

    #[test]
    fn progress_reports_distance_to_next_level() {
        let p = LevelProgress::for_xp(60);
        assert_eq!(p.level, 2);
        assert_eq!(p.level_floor, 50);
        assert_eq!(p.next_level_at, 200);
        assert_eq!(p.xp_to_next(), 140);
    }

    #[tokio::test]
    async fn fresh_user_gets_first_level_without_level_up_for_small_award() {
        let ledger = XpLedger::new(Arc::new(InMemoryStore::new()), 10);
        let change = ledger.update_user_xp(UserId(1), "lisa").await.unwrap();
        assert_eq!(change.new_level, 1);
        assert_eq!(change.xp, 10);
        assert!(!change.level_increased);
    }

    #[tokio::test]
    async fn fresh_user_levels_up_when_first_award_crosses_the_floor() {
        let ledger = XpLedger::new(Arc::new(InMemoryStore::new()), 50);
        let change = ledger.update_user_xp(UserId(1), "lisa").await.unwrap();
        assert_eq!(change.old_level, 1);
        assert_eq!(change.new_level, 2);
        assert!(change.level_increased);
    }

    #[tokio::test]
    async fn level_up_is_reported_exactly_when_crossing_a_threshold() {
        let ledger = XpLedger::new(Arc::new(InMemoryStore::new()), 10);
        let mut level_ups = Vec::new();
        for _ in 0..20 {
            let change = ledger.update_user_xp(UserId(9), "lisa").await.unwrap();
            if change.level_increased {
                level_ups.push((change.xp, change.new_level));
            }
        }
        assert_eq!(level_ups, vec![(50, 2), (200, 3)]);
    }

    #[tokio::test]
    async fn duplicate_award_never_lowers_level() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = XpLedger::new(store.clone(), 10);

        let first = ledger.update_user_xp(UserId(3), "dup").await.unwrap();
        let replay = ledger.update_user_xp(UserId(3), "dup").await.unwrap();

        assert!(replay.new_level >= first.new_level);
        assert_eq!(replay.xp, first.xp + 10);
        let stored = store.get_user(UserId(3)).await.unwrap().unwrap();
        assert_eq!(stored.level(), level_for_xp(stored.xp));
    }
}
