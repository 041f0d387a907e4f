//! Tests for [`RdpService`] grant, extension and expiry.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use feira::rdp::{Firewall, FirewallRule, RdpError, RdpService};
use feira::store::Store;

#[derive(Default)]
struct Recording {
    calls: Mutex<Vec<String>>,
    refuse: AtomicBool,
}

impl Recording {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Firewall for Recording {
    async fn allow(&self, rule: &FirewallRule) -> Result<(), RdpError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RdpError::Firewall("netsh refused".to_owned()));
        }
        self.calls
            .lock()
            .expect("lock")
            .push(format!("allow {} {} {}", rule.name, rule.ip, rule.port));
        Ok(())
    }

    async fn revoke(&self, rule: &FirewallRule) -> Result<(), RdpError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RdpError::Firewall("netsh refused".to_owned()));
        }
        self.calls
            .lock()
            .expect("lock")
            .push(format!("revoke {}", rule.name));
        Ok(())
    }
}

async fn service() -> (RdpService, Arc<Recording>, Store) {
    let store = Store::open_in_memory().await.expect("should open");
    let firewall = Arc::new(Recording::default());
    let service = RdpService::new(
        store.clone(),
        firewall.clone() as Arc<dyn Firewall>,
        3389,
        Duration::hours(12),
    );
    (service, firewall, store)
}

fn nine_am() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).single().expect("valid date")
}

#[tokio::test]
async fn grant_opens_the_firewall_once_and_extends_after() {
    let (service, firewall, _store) = service().await;
    let ip = Ipv4Addr::new(203, 0, 113, 9);

    let first = service.grant(ip, "joana", nine_am()).await.expect("should grant");
    assert!(!first.extended);
    assert_eq!(first.grant.rule_name, "01-RDP-203-0-113-9");
    assert_eq!(first.grant.expires_at, nine_am() + Duration::hours(12));

    let later = nine_am() + Duration::hours(2);
    let second = service.grant(ip, "carlos", later).await.expect("should extend");
    assert!(second.extended);
    assert_eq!(second.grant.granted_by, "carlos");
    assert_eq!(second.grant.expires_at, later + Duration::hours(12));

    assert_eq!(firewall.calls(), vec!["allow 01-RDP-203-0-113-9 203.0.113.9 3389"]);
}

#[tokio::test]
async fn refused_allow_stores_nothing() {
    let (service, firewall, store) = service().await;
    firewall.refuse.store(true, Ordering::SeqCst);

    let err = service
        .grant(Ipv4Addr::new(10, 0, 0, 1), "joana", nine_am())
        .await
        .expect_err("should fail");
    assert!(matches!(err, RdpError::Firewall(_)));
    assert!(store
        .active_rdp_grant("10.0.0.1", nine_am())
        .await
        .expect("should read")
        .is_none());
}

#[tokio::test]
async fn expired_grants_are_revoked_and_failures_retried() {
    let (service, firewall, store) = service().await;
    service
        .grant(Ipv4Addr::new(10, 0, 0, 1), "joana", nine_am())
        .await
        .expect("should grant");
    let after_expiry = nine_am() + Duration::hours(13);

    firewall.refuse.store(true, Ordering::SeqCst);
    assert_eq!(service.revoke_expired(after_expiry).await.expect("should run"), 0);
    assert_eq!(
        store.expired_rdp_grants(after_expiry).await.expect("should read").len(),
        1
    );

    firewall.refuse.store(false, Ordering::SeqCst);
    assert_eq!(service.revoke_expired(after_expiry).await.expect("should run"), 1);
    assert!(store
        .expired_rdp_grants(after_expiry)
        .await
        .expect("should read")
        .is_empty());
    assert_eq!(firewall.calls().last().map(String::as_str), Some("revoke 01-RDP-10-0-0-1"));
}

#[tokio::test]
async fn failed_store_write_closes_the_rule_again() {
    let (service, firewall, store) = service().await;
    sqlx::raw_sql(
        "CREATE TRIGGER reject_grants BEFORE INSERT ON rdp_grants
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .execute(store.pool())
    .await
    .expect("should create trigger");

    let err = service
        .grant(Ipv4Addr::new(10, 0, 0, 7), "joana", nine_am())
        .await
        .expect_err("should fail");
    assert!(matches!(err, RdpError::Store(_)));
    assert_eq!(
        firewall.calls(),
        vec![
            "allow 01-RDP-10-0-0-7 10.0.0.7 3389",
            "revoke 01-RDP-10-0-0-7",
        ]
    );
}

#[tokio::test]
async fn expired_unswept_grant_is_replaced_not_duplicated() {
    let (service, firewall, store) = service().await;
    let ip = Ipv4Addr::new(10, 0, 0, 1);
    service.grant(ip, "joana", nine_am()).await.expect("should grant");

    let after_expiry = nine_am() + Duration::hours(13);
    let renewed = service
        .grant(ip, "carlos", after_expiry)
        .await
        .expect("should grant again");

    assert!(!renewed.extended);
    assert_eq!(renewed.grant.granted_at, after_expiry);
    assert_eq!(renewed.grant.expires_at, after_expiry + Duration::hours(12));
    assert_eq!(
        firewall.calls(),
        vec![
            "allow 01-RDP-10-0-0-1 10.0.0.1 3389",
            "revoke 01-RDP-10-0-0-1",
            "allow 01-RDP-10-0-0-1 10.0.0.1 3389",
        ]
    );

    let stored = store
        .rdp_grant_for_ip("10.0.0.1")
        .await
        .expect("should read")
        .expect("should exist");
    assert_eq!(stored, renewed.grant);
    assert_eq!(service.revoke_expired(after_expiry).await.expect("should run"), 0);
}
