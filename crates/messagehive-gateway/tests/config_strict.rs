#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use messagehive_gateway::config::{self, AuthAdapterKind};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
gateway:
  bind: "0.0.0.0"
dispatch:
  inbound_capacty: 10 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config_uses_defaults() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.gateway.port, 1430);
    assert_eq!(cfg.gateway.bind, "0.0.0.0");
    assert_eq!(cfg.dispatch.inbound_capacity, 1024);
    assert_eq!(cfg.dispatch.event_capacity, 1000);
    assert_eq!(cfg.dispatch.transient_capacity, 1000);
    assert_eq!(cfg.dispatch.delivery_timeout_ms, 1000);
    assert_eq!(cfg.dispatch.max_delivery_attempts, 0);
    assert_eq!(cfg.auth.adapter, AuthAdapterKind::Anonymous);
    assert_eq!(cfg.log.level, "info");
}

#[test]
fn unsupported_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn ticket_adapter_requires_tickets() {
    let bad = r#"
version: 1
auth:
  adapter: ticket
"#;
    assert!(config::load_from_str(bad).is_err());

    let ok = r#"
version: 1
auth:
  adapter: ticket
  tickets:
    t-1: alice
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.auth.tickets.get("t-1").map(String::as_str), Some("alice"));
}

#[test]
fn unknown_adapter_name_fails() {
    let bad = r#"
version: 1
auth:
  adapter: kerberos
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn zero_delivery_timeout_rejected() {
    let bad = r#"
version: 1
dispatch:
  delivery_timeout_ms: 0
"#;
    assert!(config::load_from_str(bad).is_err());
}
