//! Group persistence.
//!
//! Groups are persisted as one row per group with the member list joined by
//! `;`. The directory only needs three operations: bulk load at startup,
//! insert on first join, and full member-list replacement afterwards.

mod sqlite;

use async_trait::async_trait;
use dashmap::DashMap;

use messagehive_core::error::Result;

pub use sqlite::SqliteGroupStore;

pub const MEMBER_SEPARATOR: char = ';';

/// One persisted group row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub group_id: String,
    pub members: Vec<String>,
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<GroupRecord>>;
    async fn insert_group(&self, group_id: &str, members: &[String]) -> Result<()>;
    async fn update_members(&self, group_id: &str, members: &[String]) -> Result<()>;
}

pub fn join_members(members: &[String]) -> String {
    members.join(";")
}

/// Empty segments are dropped, so an empty column loads as no members.
pub fn split_members(raw: &str) -> Vec<String> {
    raw.split(MEMBER_SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// In-process store. Keeps the joined form so it behaves like the SQL table.
#[derive(Default)]
pub struct MemoryGroupStore {
    rows: DashMap<String, String>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(groups: &[(&str, &[&str])]) -> Self {
        let store = Self::new();
        for (id, members) in groups {
            let members: Vec<String> = members.iter().map(|m| m.to_string()).collect();
            store.rows.insert(id.to_string(), join_members(&members));
        }
        store
    }

    /// Persisted members of `group_id`, if a row exists.
    pub fn members_of(&self, group_id: &str) -> Option<Vec<String>> {
        self.rows.get(group_id).map(|r| split_members(r.value()))
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn load_all(&self) -> Result<Vec<GroupRecord>> {
        Ok(self
            .rows
            .iter()
            .map(|r| GroupRecord {
                group_id: r.key().clone(),
                members: split_members(r.value()),
            })
            .collect())
    }

    async fn insert_group(&self, group_id: &str, members: &[String]) -> Result<()> {
        self.rows.insert(group_id.to_string(), join_members(members));
        Ok(())
    }

    async fn update_members(&self, group_id: &str, members: &[String]) -> Result<()> {
        if let Some(mut row) = self.rows.get_mut(group_id) {
            *row = join_members(members);
        }
        Ok(())
    }
}
