//! Tests for the command-driven firewall backend.

#![cfg(unix)]

use feira::rdp::{CommandFirewall, Firewall, FirewallRule, RdpError};

fn rule() -> FirewallRule {
    FirewallRule {
        name: "01-RDP-10-0-0-1".to_owned(),
        ip: "10.0.0.1".to_owned(),
        port: 3389,
    }
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()]
}

#[tokio::test]
async fn substitutes_placeholders_into_arguments() {
    let dir = tempfile::tempdir().expect("should create dir");
    let log = dir.path().join("fw.log");
    let script = format!("echo $0 {{rule}} {{ip}} {{port}} >> '{}'", log.display());
    let firewall = CommandFirewall::new(sh(&script), sh(&script));

    firewall.allow(&rule()).await.expect("should allow");

    let written = std::fs::read_to_string(&log).expect("should read log");
    assert_eq!(written.trim(), "sh 01-RDP-10-0-0-1 10.0.0.1 3389");
}

#[tokio::test]
async fn nonzero_exit_carries_stderr() {
    let firewall = CommandFirewall::new(sh("echo regra recusada >&2; exit 3"), sh("exit 0"));

    let err = firewall.allow(&rule()).await.expect_err("should fail");
    assert!(matches!(err, RdpError::Firewall(ref m) if m.contains("regra recusada")));
    firewall.revoke(&rule()).await.expect("should revoke");
}

#[tokio::test]
async fn missing_program_is_a_firewall_error() {
    let firewall = CommandFirewall::new(
        vec!["/nonexistent/firewall-tool".to_owned()],
        Vec::new(),
    );
    assert!(matches!(
        firewall.allow(&rule()).await,
        Err(RdpError::Firewall(_))
    ));
    assert!(matches!(
        firewall.revoke(&rule()).await,
        Err(RdpError::Firewall(_))
    ));
}
