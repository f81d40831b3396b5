//! In-memory `Store` used by tests and by `DATABASE_URL=memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::{
    domain::{ChatId, UserId},
    ports::{GroupRecord, Store, UserRecord, XpChange},
    Result,
};

/// DashMap-backed store. `entry()` gives the same per-document atomicity the
/// real store provides through upserts.
#[derive(Default)]
pub struct InMemoryStore {
    users: DashMap<UserId, UserRecord>,
    groups: DashMap<ChatId, GroupRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn add_user_xp(
        &self,
        user_id: UserId,
        display_name: &str,
        amount: u64,
    ) -> Result<XpChange> {
        let mut entry = self.users.entry(user_id).or_insert_with(|| UserRecord {
            user_id,
            display_name: display_name.to_string(),
            xp: 0,
            group_id: None,
        });
        let old_xp = entry.xp;
        entry.xp = old_xp.saturating_add(amount);
        entry.display_name = display_name.to_string();
        Ok(XpChange {
            old_xp,
            new_xp: entry.xp,
        })
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn set_user_group(&self, user_id: UserId, group_id: ChatId) -> Result<()> {
        self.users
            .entry(user_id)
            .and_modify(|u| u.group_id = Some(group_id))
            .or_insert_with(|| UserRecord {
                user_id,
                display_name: String::new(),
                xp: 0,
                group_id: Some(group_id),
            });
        Ok(())
    }

    async fn upsert_group(&self, group_id: ChatId, name: &str) -> Result<()> {
        self.groups
            .entry(group_id)
            .and_modify(|g| {
                g.name = name.to_string();
                g.active = true;
            })
            .or_insert_with(|| GroupRecord {
                group_id,
                name: name.to_string(),
                active: true,
                kicked_at: None,
                kicked_by: None,
            });
        Ok(())
    }

    async fn mark_group_inactive(
        &self,
        group_id: ChatId,
        kicked_by: &str,
        kicked_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(mut g) = self.groups.get_mut(&group_id) {
            g.active = false;
            g.kicked_at = Some(kicked_at);
            g.kicked_by = Some(kicked_by.to_string());
        }
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>> {
        let mut groups: Vec<GroupRecord> = self.groups.iter().map(|g| g.clone()).collect();
        groups.sort_by_key(|g| g.group_id);
        Ok(groups)
    }

    async fn top_users_in_group(&self, group_id: ChatId, limit: usize) -> Result<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self
            .users
            .iter()
            .filter(|u| u.group_id == Some(group_id))
            .map(|u| u.clone())
            .collect();
        users.sort_by(|a, b| b.xp.cmp(&a.xp).then(a.user_id.cmp(&b.user_id)));
        users.truncate(limit);
        Ok(users)
    }
}
