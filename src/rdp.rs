//! Time-boxed RDP access per source address.
//!
//! A grant opens the RDP port for one IPv4 address through a [`Firewall`]
//! backend and is persisted with its expiry. The maintenance loop calls
//! [`RdpService::revoke_expired`] to close access again, so grants survive
//! restarts.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::RdpConfig;
use crate::store::{RdpGrant, Store, StoreError};

/// Errors from RDP provisioning.
#[derive(Debug, thiserror::Error)]
pub enum RdpError {
    /// The address is not a dotted-quad IPv4 address.
    #[error("invalid IPv4 address: {0}")]
    InvalidIp(String),

    /// Neither the body, the proxy header nor the peer gave an address.
    #[error("no source address available")]
    NoSourceAddress,

    /// The firewall backend failed.
    #[error("firewall command failed: {0}")]
    Firewall(String),

    /// Grant persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parse a strict dotted-quad: four decimal octets, no leading zeros.
///
/// # Errors
///
/// Returns [`RdpError::InvalidIp`] for anything else.
pub fn parse_ipv4(raw: &str) -> Result<Ipv4Addr, RdpError> {
    let invalid = || RdpError::InvalidIp(raw.to_owned());
    let mut octets = [0u8; 4];
    let mut parts = raw.split('.');
    for octet in &mut octets {
        let part = parts.next().ok_or_else(invalid)?;
        let well_formed = !part.is_empty()
            && part.len() <= 3
            && part.bytes().all(|b| b.is_ascii_digit())
            && !(part.len() > 1 && part.starts_with('0'));
        if !well_formed {
            return Err(invalid());
        }
        *octet = part.parse().map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(Ipv4Addr::from(octets))
}

/// Firewall rule name for `ip`, e.g. `01-RDP-10-0-0-7`.
pub fn rule_name(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("01-RDP-{a}-{b}-{c}-{d}")
}

/// Pick the address to grant: explicit body value, then the first
/// `X-Forwarded-For` entry, then the socket peer.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are unwrapped.
///
/// # Errors
///
/// Returns [`RdpError::InvalidIp`] when the chosen value is not IPv4, or
/// [`RdpError::NoSourceAddress`] when nothing is available.
pub fn resolve_source_ip(
    body_ip: Option<&str>,
    forwarded_for: Option<&str>,
    peer: Option<IpAddr>,
) -> Result<Ipv4Addr, RdpError> {
    let from_header = forwarded_for
        .and_then(|h| h.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(raw) = body_ip.map(str::trim).filter(|s| !s.is_empty()).or(from_header) {
        let raw = raw.strip_prefix("::ffff:").unwrap_or(raw);
        return parse_ipv4(raw);
    }

    match peer {
        Some(IpAddr::V4(v4)) => Ok(v4),
        Some(IpAddr::V6(v6)) => v6
            .to_ipv4_mapped()
            .ok_or_else(|| RdpError::InvalidIp(v6.to_string())),
        None => Err(RdpError::NoSourceAddress),
    }
}

// ── Firewall backends ───────────────────────────────────────────

/// An inbound allow rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRule {
    /// Rule name.
    pub name: String,
    /// Remote address allowed.
    pub ip: String,
    /// Local port opened.
    pub port: u16,
}

/// Applies and removes firewall rules.
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Open access for `rule`.
    async fn allow(&self, rule: &FirewallRule) -> Result<(), RdpError>;

    /// Remove `rule`.
    async fn revoke(&self, rule: &FirewallRule) -> Result<(), RdpError>;
}

/// Records rules in the log without touching any firewall.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyFirewall;

#[async_trait]
impl Firewall for LogOnlyFirewall {
    async fn allow(&self, rule: &FirewallRule) -> Result<(), RdpError> {
        info!(rule = %rule.name, ip = %rule.ip, port = rule.port, "firewall allow (log only)");
        Ok(())
    }

    async fn revoke(&self, rule: &FirewallRule) -> Result<(), RdpError> {
        info!(rule = %rule.name, ip = %rule.ip, "firewall revoke (log only)");
        Ok(())
    }
}

/// Runs operator-configured programs to allow and revoke rules.
///
/// Each argument may contain `{rule}`, `{ip}` and `{port}`, substituted
/// before the program is spawned. No shell is involved.
#[derive(Debug, Clone)]
pub struct CommandFirewall {
    allow: Vec<String>,
    revoke: Vec<String>,
}

impl CommandFirewall {
    /// Firewall from program-plus-arguments templates.
    pub fn new(allow: Vec<String>, revoke: Vec<String>) -> Self {
        Self { allow, revoke }
    }

    async fn run(template: &[String], rule: &FirewallRule) -> Result<(), RdpError> {
        let mut argv = template.iter().map(|arg| {
            arg.replace("{rule}", &rule.name)
                .replace("{ip}", &rule.ip)
                .replace("{port}", &rule.port.to_string())
        });
        let program = argv
            .next()
            .ok_or_else(|| RdpError::Firewall("empty firewall command".to_owned()))?;

        let output = tokio::process::Command::new(&program)
            .args(argv)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RdpError::Firewall(format!("{program}: {e}")))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RdpError::Firewall(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}

#[async_trait]
impl Firewall for CommandFirewall {
    async fn allow(&self, rule: &FirewallRule) -> Result<(), RdpError> {
        Self::run(&self.allow, rule).await
    }

    async fn revoke(&self, rule: &FirewallRule) -> Result<(), RdpError> {
        Self::run(&self.revoke, rule).await
    }
}

/// Command firewall when commands are configured, log-only otherwise.
pub fn firewall_from_config(config: &RdpConfig) -> Arc<dyn Firewall> {
    if config.allow_command.is_empty() {
        Arc::new(LogOnlyFirewall)
    } else {
        Arc::new(CommandFirewall::new(
            config.allow_command.clone(),
            config.revoke_command.clone(),
        ))
    }
}

// ── Service ─────────────────────────────────────────────────────

/// Result of a grant request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantOutcome {
    /// The stored grant.
    pub grant: RdpGrant,
    /// True when an active grant was extended instead of created.
    pub extended: bool,
}

/// Grants and revokes RDP access.
#[derive(Clone)]
pub struct RdpService {
    store: Store,
    firewall: Arc<dyn Firewall>,
    port: u16,
    ttl: chrono::Duration,
}

impl std::fmt::Debug for RdpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdpService")
            .field("port", &self.port)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RdpService {
    /// Service over an explicit firewall backend.
    pub fn new(store: Store, firewall: Arc<dyn Firewall>, port: u16, ttl: chrono::Duration) -> Self {
        Self {
            store,
            firewall,
            port,
            ttl,
        }
    }

    /// Service configured from `[rdp]`.
    pub fn from_config(store: Store, config: &RdpConfig) -> Self {
        let ttl = chrono::Duration::try_seconds(config.grant_ttl_secs)
            .unwrap_or_else(|| chrono::Duration::hours(12));
        Self::new(store, firewall_from_config(config), config.port, ttl)
    }

    fn rule_for(&self, name: String, ip: String) -> FirewallRule {
        FirewallRule {
            name,
            ip,
            port: self.port,
        }
    }

    /// Open access for `ip` until `now + ttl`.
    ///
    /// An unexpired grant for the same address is extended without calling
    /// the firewall again. A grant that expired but was not swept yet has
    /// its rule revoked before access is opened afresh. If the new grant
    /// cannot be stored, the rule just opened is revoked again.
    ///
    /// # Errors
    ///
    /// Returns [`RdpError::Firewall`] when the rule cannot be applied, or
    /// [`RdpError::Store`] when the grant cannot be persisted.
    pub async fn grant(
        &self,
        ip: Ipv4Addr,
        requested_by: &str,
        now: DateTime<Utc>,
    ) -> Result<GrantOutcome, RdpError> {
        let ip_text = ip.to_string();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let existing = self.store.rdp_grant_for_ip(&ip_text).await?;
        if let Some(mut grant) = existing.clone().filter(|g| g.expires_at > now) {
            grant.expires_at = expires_at;
            grant.granted_by = requested_by.to_owned();
            self.store.upsert_rdp_grant(&grant).await?;
            info!(ip = %ip_text, user = requested_by, %expires_at, "RDP grant extended");
            return Ok(GrantOutcome {
                grant,
                extended: true,
            });
        }

        if let Some(stale) = existing {
            let stale_rule = self.rule_for(stale.rule_name, stale.ip);
            if let Err(e) = self.firewall.revoke(&stale_rule).await {
                warn!(error = %e, rule = %stale_rule.name, "failed to revoke expired RDP rule");
                return Err(e);
            }
            self.store.delete_rdp_grant(&stale_rule.name).await?;
            info!(rule = %stale_rule.name, "expired RDP grant revoked before renewal");
        }

        let rule = self.rule_for(rule_name(ip), ip_text);
        if let Err(e) = self.firewall.allow(&rule).await {
            warn!(error = %e, ip = %rule.ip, "failed to apply RDP firewall rule");
            return Err(e);
        }

        let grant = RdpGrant {
            rule_name: rule.name.clone(),
            ip: rule.ip.clone(),
            granted_by: requested_by.to_owned(),
            granted_at: now,
            expires_at,
        };
        if let Err(e) = self.store.upsert_rdp_grant(&grant).await {
            warn!(error = %e, rule = %rule.name, "failed to store RDP grant, closing rule");
            if let Err(revoke_err) = self.firewall.revoke(&rule).await {
                error!(error = %revoke_err, rule = %rule.name, "RDP rule left open without a stored grant");
            }
            return Err(e.into());
        }
        info!(ip = %grant.ip, user = requested_by, %expires_at, "RDP access granted");
        Ok(GrantOutcome {
            grant,
            extended: false,
        })
    }

    /// Revoke every grant expired at `now`; returns how many were removed.
    ///
    /// A grant whose revoke fails stays stored and is retried next time.
    ///
    /// # Errors
    ///
    /// Returns [`RdpError::Store`] when grants cannot be read or deleted.
    pub async fn revoke_expired(&self, now: DateTime<Utc>) -> Result<usize, RdpError> {
        let mut revoked = 0usize;
        for grant in self.store.expired_rdp_grants(now).await? {
            let rule = self.rule_for(grant.rule_name.clone(), grant.ip.clone());
            if let Err(e) = self.firewall.revoke(&rule).await {
                warn!(error = %e, rule = %rule.name, "RDP revoke failed, will retry");
                continue;
            }
            self.store.delete_rdp_grant(&grant.rule_name).await?;
            info!(rule = %rule.name, ip = %rule.ip, "RDP access revoked");
            revoked = revoked.saturating_add(1);
        }
        Ok(revoked)
    }
}
