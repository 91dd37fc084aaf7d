//! SQLite-backed group store.

use std::sync::Arc;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use messagehive_core::error::{HiveError, Result};

use super::{join_members, split_members, GroupRecord, GroupStore};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS groups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id TEXT NOT NULL,
        group_member TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_groups_group_id ON groups(group_id);
"#;

pub struct SqliteGroupStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SqliteGroupStore {
    /// Open (or create) the database at `path`. `:memory:` gives a private
    /// in-memory database on a single pooled connection.
    pub fn open(path: &str) -> Result<Self> {
        let (manager, max_size) = if path == ":memory:" {
            (SqliteConnectionManager::memory(), 1)
        } else {
            (SqliteConnectionManager::file(path), 4)
        };

        // a recycled in-memory connection would take the database with it
        let pool = Pool::builder()
            .max_size(max_size)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e| HiveError::Persistence(format!("failed to create pool: {e}")))?;

        let conn = pool
            .get()
            .map_err(|e| HiveError::Persistence(format!("failed to get connection: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| HiveError::Persistence(format!("failed to init schema: {e}")))?;
        drop(conn);

        Ok(Self { pool: Arc::new(pool) })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| HiveError::Persistence(format!("failed to get connection: {e}")))?;
            f(&conn).map_err(|e| HiveError::Persistence(e.to_string()))
        })
        .await
        .map_err(|e| HiveError::Persistence(format!("task join error: {e}")))?
    }
}

#[async_trait]
impl GroupStore for SqliteGroupStore {
    async fn load_all(&self) -> Result<Vec<GroupRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT group_id, group_member FROM groups ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                let group_id: String = row.get(0)?;
                let raw: String = row.get(1)?;
                Ok(GroupRecord {
                    group_id,
                    members: split_members(&raw),
                })
            })?;
            let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn insert_group(&self, group_id: &str, members: &[String]) -> Result<()> {
        let group_id = group_id.to_string();
        let joined = join_members(members);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO groups (id, group_id, group_member) VALUES (NULL, ?, ?)",
                params![group_id, joined],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_members(&self, group_id: &str, members: &[String]) -> Result<()> {
        let group_id = group_id.to_string();
        let joined = join_members(members);
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE groups SET group_member = ? WHERE group_id = ?",
                params![joined, group_id],
            )?;
            Ok(())
        })
        .await
    }
}
