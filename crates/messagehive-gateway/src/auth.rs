//! Connect-time identity resolution.

use std::sync::Arc;

use dashmap::DashMap;

use messagehive_core::error::{HiveError, Result};

use crate::config::{AuthAdapterKind, AuthSection};

pub trait AuthAdapter: Send + Sync {
    /// Turn the connect credential into an identity.
    fn resolve(&self, credential: &str) -> Result<String>;
}

/// Trusts the client: the credential is the identity.
pub struct AnonymousAuth;

impl AuthAdapter for AnonymousAuth {
    fn resolve(&self, credential: &str) -> Result<String> {
        let id = credential.trim();
        if id.is_empty() {
            return Err(HiveError::AuthFailed);
        }
        Ok(id.to_string())
    }
}

/// Single-use tickets mapped to identities.
pub struct TicketAuth {
    tickets: DashMap<String, String>,
}

impl TicketAuth {
    pub fn new() -> Self {
        Self { tickets: DashMap::new() }
    }

    pub fn insert(&self, ticket: impl Into<String>, identity: impl Into<String>) {
        self.tickets.insert(ticket.into(), identity.into());
    }
}

impl Default for TicketAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthAdapter for TicketAuth {
    fn resolve(&self, credential: &str) -> Result<String> {
        self.tickets
            .remove(credential)
            .map(|(_, uid)| uid)
            .ok_or(HiveError::AuthFailed)
    }
}

pub fn build_adapter(cfg: &AuthSection) -> Arc<dyn AuthAdapter> {
    match cfg.adapter {
        AuthAdapterKind::Anonymous => Arc::new(AnonymousAuth),
        AuthAdapterKind::Ticket => {
            let auth = TicketAuth::new();
            for (ticket, uid) in &cfg.tickets {
                auth.insert(ticket.clone(), uid.clone());
            }
            Arc::new(auth)
        }
    }
}
