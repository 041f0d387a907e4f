//! Persisted RDP access grants.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{parse_timestamp, timestamp_text, Store, StoreError};

/// An address allowed through the RDP firewall until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RdpGrant {
    /// Firewall rule name, unique per address.
    pub rule_name: String,
    /// Granted IPv4 address.
    pub ip: String,
    /// Username that requested the grant.
    pub granted_by: String,
    /// When access was first opened.
    pub granted_at: DateTime<Utc>,
    /// When access will be revoked.
    pub expires_at: DateTime<Utc>,
}

type GrantRow = (String, String, String, String, String);

fn grant_from_row(row: GrantRow) -> Result<RdpGrant, StoreError> {
    let (rule_name, ip, granted_by, granted_at, expires_at) = row;
    Ok(RdpGrant {
        granted_at: parse_timestamp("rdp_grants", "granted_at", &granted_at)?,
        expires_at: parse_timestamp("rdp_grants", "expires_at", &expires_at)?,
        rule_name,
        ip,
        granted_by,
    })
}

impl Store {
    /// Insert a grant, or replace the stored one for the same rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn upsert_rdp_grant(&self, grant: &RdpGrant) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO rdp_grants (rule_name, ip, granted_by, granted_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(rule_name) DO UPDATE SET
                ip = excluded.ip,
                granted_by = excluded.granted_by,
                granted_at = excluded.granted_at,
                expires_at = excluded.expires_at",
        )
        .bind(&grant.rule_name)
        .bind(&grant.ip)
        .bind(&grant.granted_by)
        .bind(timestamp_text(grant.granted_at))
        .bind(timestamp_text(grant.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The unexpired grant for `ip`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn active_rdp_grant(
        &self,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RdpGrant>, StoreError> {
        let row: Option<GrantRow> = sqlx::query_as(
            "SELECT rule_name, ip, granted_by, granted_at, expires_at
             FROM rdp_grants WHERE ip = ?1 AND expires_at > ?2",
        )
        .bind(ip)
        .bind(timestamp_text(now))
        .fetch_optional(&self.pool)
        .await?;
        row.map(grant_from_row).transpose()
    }

    /// The stored grant for `ip`, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn rdp_grant_for_ip(&self, ip: &str) -> Result<Option<RdpGrant>, StoreError> {
        let row: Option<GrantRow> = sqlx::query_as(
            "SELECT rule_name, ip, granted_by, granted_at, expires_at
             FROM rdp_grants WHERE ip = ?1",
        )
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;
        row.map(grant_from_row).transpose()
    }

    /// Grants whose expiry is at or before `now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn expired_rdp_grants(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RdpGrant>, StoreError> {
        let rows: Vec<GrantRow> = sqlx::query_as(
            "SELECT rule_name, ip, granted_by, granted_at, expires_at
             FROM rdp_grants WHERE expires_at <= ?1 ORDER BY expires_at",
        )
        .bind(timestamp_text(now))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(grant_from_row).collect()
    }

    /// Remove a grant by rule name.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_rdp_grant(&self, rule_name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM rdp_grants WHERE rule_name = ?1")
            .bind(rule_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
