use std::collections::HashMap;

use serde::Deserialize;
use messagehive_core::error::{HiveError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub dispatch: DispatchSection,

    #[serde(default)]
    pub auth: AuthSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub log: LogSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(HiveError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.dispatch.validate()?;
        self.auth.validate()?;

        Ok(())
    }

    /// `bind:port` listen address.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.gateway.bind, self.gateway.port)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            dispatch: DispatchSection::default(),
            auth: AuthSection::default(),
            store: StoreSection::default(),
            log: LogSection::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Capacity of each user's delivery channel.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if self.bind.trim().is_empty() {
            return Err(HiveError::BadRequest("gateway.bind must not be empty".into()));
        }
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(HiveError::BadRequest(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(HiveError::BadRequest(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(HiveError::BadRequest(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(HiveError::BadRequest("gateway.outbound_queue must be > 0".into()));
        }
        Ok(())
    }
}

fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    1430
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_outbound_queue() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchSection {
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default = "default_transient_capacity")]
    pub transient_capacity: usize,

    /// Bounded wait for every ack / direct delivery attempt.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    /// 0 = re-queue timed-out deliveries forever.
    #[serde(default)]
    pub max_delivery_attempts: u32,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            inbound_capacity: default_inbound_capacity(),
            event_capacity: default_event_capacity(),
            transient_capacity: default_transient_capacity(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            max_delivery_attempts: 0,
        }
    }
}

impl DispatchSection {
    pub fn validate(&self) -> Result<()> {
        if self.inbound_capacity == 0 || self.event_capacity == 0 || self.transient_capacity == 0 {
            return Err(HiveError::BadRequest("dispatch channel capacities must be > 0".into()));
        }
        if !(1..=60000).contains(&self.delivery_timeout_ms) {
            return Err(HiveError::BadRequest(
                "dispatch.delivery_timeout_ms must be between 1 and 60000".into(),
            ));
        }
        Ok(())
    }
}

fn default_inbound_capacity() -> usize {
    1024
}
fn default_event_capacity() -> usize {
    1000
}
fn default_transient_capacity() -> usize {
    1000
}
fn default_delivery_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthAdapterKind {
    /// The connect credential is the identity.
    #[default]
    Anonymous,
    /// Single-use tickets from `auth.tickets`.
    Ticket,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    #[serde(default)]
    pub adapter: AuthAdapterKind,

    /// ticket -> identity
    #[serde(default)]
    pub tickets: HashMap<String, String>,
}

impl AuthSection {
    pub fn validate(&self) -> Result<()> {
        if self.adapter == AuthAdapterKind::Ticket && self.tickets.is_empty() {
            return Err(HiveError::BadRequest(
                "auth.tickets must not be empty when adapter is ticket".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

fn default_store_path() -> String {
    "messagehive.db".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".into()
}
