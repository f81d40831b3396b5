//! SQLite-backed [`Store`] over sqlx.

use std::{path::Path, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};

use lisa_core::{
    domain::{ChatId, UserId},
    errors::Error,
    ports::{GroupRecord, Store, UserRecord, XpChange},
    Result,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Store(e.to_string())
}

/// Each in-memory connection is its own database, so an in-memory pool
/// holds exactly one connection and never recycles it.
fn pool_options(in_memory: bool) -> SqlitePoolOptions {
    if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and run
    /// migrations. Accepts `sqlite://path`, `sqlite::memory:` or a bare path.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        let in_memory = conn_str.contains(":memory:");
        if !in_memory {
            let path = conn_str.trim_start_matches("sqlite://");
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(db_err)?
            .create_if_missing(true);
        let pool = pool_options(in_memory)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(database_url = %conn_str, "sqlite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL DEFAULT '',
                xp INTEGER NOT NULL DEFAULT 0,
                group_id INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS users_group_xp ON users (group_id, xp DESC);")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                group_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT 1,
                kicked_at TEXT,
                kicked_by TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

fn user_from_row(row: &SqliteRow) -> UserRecord {
    UserRecord {
        user_id: UserId(row.get::<i64, _>("user_id")),
        display_name: row.get("display_name"),
        xp: row.get::<i64, _>("xp").max(0) as u64,
        group_id: row.get::<Option<i64>, _>("group_id").map(ChatId),
    }
}

fn group_from_row(row: &SqliteRow) -> GroupRecord {
    GroupRecord {
        group_id: ChatId(row.get::<i64, _>("group_id")),
        name: row.get("name"),
        active: row.get("active"),
        kicked_at: row.get::<Option<DateTime<Utc>>, _>("kicked_at"),
        kicked_by: row.get("kicked_by"),
    }
}

fn to_i64(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| Error::Store(format!("value out of range: {v}")))
}

#[async_trait]
impl Store for SqliteStore {
    async fn add_user_xp(
        &self,
        user_id: UserId,
        display_name: &str,
        amount: u64,
    ) -> Result<XpChange> {
        let amount = to_i64(amount)?;
        let row = sqlx::query(
            r#"
            INSERT INTO users (user_id, display_name, xp)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                xp = xp + excluded.xp,
                display_name = excluded.display_name
            RETURNING xp
            "#,
        )
        .bind(user_id.0)
        .bind(display_name)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let new_xp = row.get::<i64, _>(0).max(0) as u64;
        Ok(XpChange {
            old_xp: new_xp.saturating_sub(amount as u64),
            new_xp,
        })
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT user_id, display_name, xp, group_id FROM users WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn set_user_group(&self, user_id: UserId, group_id: ChatId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, group_id)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET group_id = excluded.group_id
            "#,
        )
        .bind(user_id.0)
        .bind(group_id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_group(&self, group_id: ChatId, name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO groups (group_id, name, active)
            VALUES (?, ?, 1)
            ON CONFLICT(group_id) DO UPDATE SET
                name = excluded.name,
                active = 1
            "#,
        )
        .bind(group_id.0)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn mark_group_inactive(
        &self,
        group_id: ChatId,
        kicked_by: &str,
        kicked_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE groups SET active = 0, kicked_at = ?, kicked_by = ? WHERE group_id = ?")
            .bind(kicked_at)
            .bind(kicked_by)
            .bind(group_id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>> {
        let rows = sqlx::query(
            "SELECT group_id, name, active, kicked_at, kicked_by FROM groups ORDER BY group_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(group_from_row).collect())
    }

    async fn top_users_in_group(&self, group_id: ChatId, limit: usize) -> Result<Vec<UserRecord>> {
        let limit = to_i64(limit as u64)?;
        let rows = sqlx::query(
            r#"
            SELECT user_id, display_name, xp, group_id FROM users
            WHERE group_id = ?
            ORDER BY xp DESC, user_id ASC
            LIMIT ?
            "#,
        )
        .bind(group_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(user_from_row).collect())
    }
}
