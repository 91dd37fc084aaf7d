//! Presence directory: identity -> online user or group.
//!
//! One directory is built per process (in `AppState`) and shared as
//! `Arc<PresenceDirectory>`.
//!
//! Concurrency contract:
//! - at most one entity per identity; re-registering replaces it
//!   (last-write-wins). The replaced user's channel is not closed, the
//!   transport still owns it.
//! - a mutation is visible to every lookup that starts after the mutation's
//!   map update returns.
//! - group persistence happens *after* the in-memory update and outside any
//!   map lock. A failed write is reported to the caller but the in-memory
//!   change stays (optimistic insert).
//! - persisting mutations are serialized on `persist_lock`, held from the
//!   map update through the store call, so store writes land in mutation
//!   order. Lookups never take it.

use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use messagehive_core::error::{HiveError, Result};
use messagehive_core::protocol::Envelope;

use crate::store::GroupStore;

#[derive(Debug, Clone)]
pub enum EntityKind {
    /// Online user; the transport owns the receiving half.
    User { delivery: mpsc::Sender<Envelope> },
    /// Ordered member list. Duplicates are not rejected.
    Group { members: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    pub registered_at: SystemTime,
}

impl Entity {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, EntityKind::Group { .. })
    }

    pub fn delivery(&self) -> Option<&mpsc::Sender<Envelope>> {
        match &self.kind {
            EntityKind::User { delivery } => Some(delivery),
            EntityKind::Group { .. } => None,
        }
    }

    pub fn members(&self) -> Option<&[String]> {
        match &self.kind {
            EntityKind::Group { members } => Some(members),
            EntityKind::User { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipAction {
    /// Append all given members.
    Add,
    /// Remove the first case-insensitive match of the first given member.
    Delete,
}

pub struct PresenceDirectory {
    entities: DashMap<String, Entity>,
    store: Arc<dyn GroupStore>,
    persist_lock: Mutex<()>,
}

impl PresenceDirectory {
    pub fn new(store: Arc<dyn GroupStore>) -> Self {
        Self {
            entities: DashMap::new(),
            store,
            persist_lock: Mutex::new(()),
        }
    }

    /// Insert or replace an online user.
    pub fn register(&self, id: &str, delivery: mpsc::Sender<Envelope>) {
        let entity = Entity {
            id: id.to_string(),
            kind: EntityKind::User { delivery },
            registered_at: SystemTime::now(),
        };
        if self.entities.insert(id.to_string(), entity).is_some() {
            tracing::debug!(id = %id, "user entity replaced");
        } else {
            tracing::debug!(id = %id, "user entity added");
        }
    }

    pub fn lookup(&self, id: &str) -> Result<Entity> {
        self.entities
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| HiveError::NotFound(id.to_string()))
    }

    /// Insert (or replace) a group. With `persist`, the group row is written
    /// after the group is already visible; a store error is returned but does
    /// not undo the insert.
    pub async fn register_group(&self, id: &str, members: Vec<String>, persist: bool) -> Result<()> {
        let _persisting = if persist { Some(self.persist_lock.lock().await) } else { None };
        let snapshot = persist.then(|| members.clone());
        self.entities.insert(
            id.to_string(),
            Entity {
                id: id.to_string(),
                kind: EntityKind::Group { members },
                registered_at: SystemTime::now(),
            },
        );
        tracing::debug!(id = %id, persist, "group entity added");

        if let Some(members) = snapshot {
            self.store.insert_group(id, &members).await.map_err(|e| {
                tracing::error!(id = %id, error = %e, "group insert not persisted");
                e
            })?;
        }
        Ok(())
    }

    /// Mutate a group's member list and persist the full new list.
    /// Unknown identities (and users) are a silent no-op.
    pub async fn update_membership(
        &self,
        id: &str,
        action: MembershipAction,
        members: &[String],
    ) -> Result<()> {
        let _persisting = self.persist_lock.lock().await;
        let snapshot = {
            let Some(mut entry) = self.entities.get_mut(id) else {
                tracing::debug!(id = %id, "membership update for unknown group ignored");
                return Ok(());
            };
            let EntityKind::Group { members: current } = &mut entry.value_mut().kind else {
                tracing::debug!(id = %id, "membership update for user entity ignored");
                return Ok(());
            };

            match action {
                MembershipAction::Add => {
                    current.extend(members.iter().cloned());
                    tracing::debug!(id = %id, added = members.len(), now = current.len(), "group members added");
                }
                MembershipAction::Delete => {
                    let Some(target) = members.first() else {
                        return Ok(());
                    };
                    let target = target.to_lowercase();
                    match current.iter().position(|m| m.to_lowercase() == target) {
                        Some(pos) => {
                            current.remove(pos);
                            tracing::debug!(id = %id, member = %target, "group member removed");
                        }
                        None => {
                            tracing::debug!(id = %id, member = %target, "leave for non-member ignored");
                            return Ok(());
                        }
                    }
                }
            }
            current.clone()
        };

        self.store.update_members(id, &snapshot).await.map_err(|e| {
            tracing::error!(id = %id, error = %e, "group membership not persisted");
            e
        })
    }

    pub fn deregister(&self, id: &str) -> Result<()> {
        self.entities
            .remove(id)
            .map(|_| tracing::debug!(id = %id, "entity removed"))
            .ok_or_else(|| HiveError::NotFound(id.to_string()))
    }

    /// Remove `id` only if it is still the user registered with `delivery`.
    /// Returns whether an entity was removed.
    pub fn deregister_session(&self, id: &str, delivery: &mpsc::Sender<Envelope>) -> bool {
        self.entities
            .remove_if(id, |_, e| matches!(e.delivery(), Some(tx) if tx.same_channel(delivery)))
            .is_some()
    }

    /// Bulk-load persisted groups without writing them back.
    pub async fn load_from_store(&self) -> Result<usize> {
        let records = self.store.load_all().await?;
        let n = records.len();
        for rec in records {
            self.register_group(&rec.group_id, rec.members, false).await?;
        }
        tracing::info!(groups = n, "groups loaded from store");
        Ok(n)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
