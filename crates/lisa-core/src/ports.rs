//! Storage port: the typed equivalent of the `users` and `groups` collections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatId, UserId},
    leveling::level_for_xp,
    Result,
};

/// A user's leveling record. Level is derived from `xp`, never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub xp: u64,
    /// Last group the user was seen active in.
    pub group_id: Option<ChatId>,
}

impl UserRecord {
    pub fn level(&self) -> u32 {
        level_for_xp(self.xp)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupRecord {
    pub group_id: ChatId,
    pub name: String,
    pub active: bool,
    pub kicked_at: Option<DateTime<Utc>>,
    pub kicked_by: Option<String>,
}

/// Result of an atomic XP increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XpChange {
    pub old_xp: u64,
    pub new_xp: u64,
}

/// Document store collaborator.
///
/// Each method is a single per-document atomic operation; callers rely on
/// nothing stronger than that.
#[async_trait]
pub trait Store: Send + Sync {
    /// Upsert the user, set the display name and add `amount` XP in one step.
    async fn add_user_xp(&self, user_id: UserId, display_name: &str, amount: u64)
        -> Result<XpChange>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>>;

    /// Record the user's current group association (upserting the user).
    async fn set_user_group(&self, user_id: UserId, group_id: ChatId) -> Result<()>;

    /// Upsert the group's display name and mark it active.
    async fn upsert_group(&self, group_id: ChatId, name: &str) -> Result<()>;

    /// Mark a group inactive after the bot was removed. No-op for unknown groups.
    async fn mark_group_inactive(
        &self,
        group_id: ChatId,
        kicked_by: &str,
        kicked_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn list_groups(&self) -> Result<Vec<GroupRecord>>;

    /// Users associated with `group_id`, XP descending, at most `limit`.
    async fn top_users_in_group(&self, group_id: ChatId, limit: usize) -> Result<Vec<UserRecord>>;
}
