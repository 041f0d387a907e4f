//! Configuration loading and management.
//!
//! Loads Feira configuration from `./feira.toml` (or `$FEIRA_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//! A `.env` file in the working directory is read into the environment first.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::auth::token::parse_ttl;

// ── Top-level config ────────────────────────────────────────────

/// Top-level Feira configuration loaded from TOML.
///
/// Path: `./feira.toml` or `$FEIRA_CONFIG_PATH`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener and static files (`[server]`).
    pub server: ServerConfig,
    /// Token signing and password hashing (`[auth]`).
    pub auth: AuthConfig,
    /// Local SQLite database (`[sqlite]`).
    pub sqlite: SqliteConfig,
    /// Legacy ERP connection (`[firebird]`).
    pub firebird: FirebirdConfig,
    /// External geocoder (`[geocode]`).
    pub geocode: GeocodeConfig,
    /// RDP access grants (`[rdp]`).
    pub rdp: RdpConfig,
    /// Background maintenance tasks (`[maintenance]`).
    pub maintenance: MaintenanceConfig,
    /// Log output (`[logging]`).
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// If the file does not exist, defaults are used. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, or when the
    /// merged configuration fails [`AppConfig::validate`].
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        let env = |key: &str| std::env::var(key).ok();
        let mut config = Self::load_from_file(&Self::config_path_with(env))?;
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides.
    fn load_from_file(path: &std::path::Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config path using an env resolver.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("FEIRA_CONFIG_PATH").map_or_else(|| PathBuf::from("feira.toml"), PathBuf::from)
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never touch the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Server.
        if let Some(v) = env("HOST") {
            self.server.host = v;
        }
        override_parsed(&env, "PORT", &mut self.server.port);
        if let Some(v) = env("CORS_ORIGIN") {
            self.server.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(v) = env("PDF_DIR") {
            self.server.pdf_dir = PathBuf::from(v);
        }
        if let Some(v) = env("NODE_ENV") {
            self.server.production = v.eq_ignore_ascii_case("production");
        }

        // Auth.
        if let Some(v) = env("JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = env("JWT_EXPIRES_IN") {
            self.auth.jwt_expires_in = v;
        }

        // Local store.
        if let Some(v) = env("SQLITE_PATH") {
            self.sqlite.path = PathBuf::from(v);
        }

        // ERP.
        if let Some(v) = env("DB_HOST") {
            self.firebird.host = v;
        }
        override_parsed(&env, "DB_PORT", &mut self.firebird.port);
        if let Some(v) = env("DB_DATABASE") {
            self.firebird.database = v;
        }
        if let Some(v) = env("DB_USER") {
            self.firebird.user = v;
        }
        if let Some(v) = env("DB_PASSWORD") {
            self.firebird.password = v;
        }

        // Geocoder.
        if let Some(v) = env("OPENCAGE_API_KEY") {
            self.geocode.api_key = Some(v).filter(|k| !k.trim().is_empty());
        }

        // RDP.
        if let Some(v) = env("RDP_ALLOW_COMMAND") {
            self.rdp.allow_command = split_command(&v);
        }
        if let Some(v) = env("RDP_REVOKE_COMMAND") {
            self.rdp.revoke_command = split_command(&v);
        }

        // Logging.
        if let Some(v) = env("LOG_DIR") {
            self.logging.dir = PathBuf::from(v);
        }
        if let Some(v) = env("LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.logging.level = v;
        }
    }

    /// Reject configurations the server cannot start with.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty JWT secret, a zero-sized ERP pool, an
    /// unparsable token lifetime, an unknown charset or a malformed
    /// geocoder URL.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            bail!("auth.jwt_secret (JWT_SECRET) must be set");
        }
        if self.firebird.pool_size == 0 {
            bail!("firebird.pool_size must be at least 1");
        }
        self.token_ttl()?;
        if feira_firebird::Charset::parse(&self.firebird.charset).is_none() {
            bail!("unknown firebird.charset {:?}", self.firebird.charset);
        }
        url::Url::parse(&self.geocode.base_url)
            .with_context(|| format!("invalid geocode.base_url {:?}", self.geocode.base_url))?;
        if self.rdp.allow_command.is_empty() != self.rdp.revoke_command.is_empty() {
            bail!("rdp.allow_command and rdp.revoke_command must be set together");
        }
        Ok(())
    }

    /// Token lifetime parsed from `auth.jwt_expires_in`.
    ///
    /// # Errors
    ///
    /// Returns an error when the duration string is malformed.
    pub fn token_ttl(&self) -> Result<Duration> {
        parse_ttl(&self.auth.jwt_expires_in).with_context(|| {
            format!(
                "invalid auth.jwt_expires_in {:?}",
                self.auth.jwt_expires_in
            )
        })
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error when the TOML is malformed or has wrong types.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }
}

fn override_parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut T,
) {
    if let Some(v) = env(key) {
        match v.trim().parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(var = key, value = %v, "ignoring invalid env override"),
        }
    }
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_owned).collect()
}

// ── Server config ───────────────────────────────────────────────

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
    /// Directory served under `/pdfs`.
    pub pdf_dir: PathBuf,
    /// Production mode hides internal error detail from responses.
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3002,
            cors_origins: vec!["*".to_owned()],
            pdf_dir: PathBuf::from("pdfs"),
            production: false,
        }
    }
}

// ── Auth config ─────────────────────────────────────────────────

/// Token signing and password hashing.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret.
    pub jwt_secret: String,
    /// Token lifetime, e.g. `24h`, `30m`, `7d` or bare seconds.
    pub jwt_expires_in: String,
    /// bcrypt cost for new password hashes.
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_expires_in: "24h".to_owned(),
            bcrypt_cost: 10,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_expires_in", &self.jwt_expires_in)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

// ── Storage config ──────────────────────────────────────────────

/// Local SQLite database.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file; parent directories are created on open.
    pub path: PathBuf,
    /// Where `VACUUM INTO` snapshots are written.
    pub backups_dir: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/app.db"),
            backups_dir: PathBuf::from("data/backups"),
        }
    }
}

/// Legacy Firebird ERP connection.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct FirebirdConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database path or alias on the server.
    pub database: String,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Wire charset name (`WIN1252` or `UTF8`).
    pub charset: String,
    /// Maximum concurrent connections.
    pub pool_size: usize,
}

impl Default for FirebirdConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 3050,
            database: String::new(),
            user: "SYSDBA".to_owned(),
            password: String::new(),
            charset: "WIN1252".to_owned(),
            pool_size: 5,
        }
    }
}

impl std::fmt::Debug for FirebirdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebirdConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("charset", &self.charset)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl FirebirdConfig {
    /// Connection options for the wire client.
    ///
    /// Unknown charsets fall back to the default; [`AppConfig::validate`]
    /// rejects them before this is reached in the server.
    pub fn connect_options(&self) -> feira_firebird::ConnectOptions {
        feira_firebird::ConnectOptions {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            charset: feira_firebird::Charset::parse(&self.charset).unwrap_or_default(),
        }
    }
}

// ── Geocode config ──────────────────────────────────────────────

/// External geocoder settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    /// OpenCage-compatible endpoint.
    pub base_url: String,
    /// API key; geocoding is unavailable without one.
    pub api_key: Option<String>,
    /// Result language.
    pub language: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Age after which cached coordinates are refreshed.
    pub cache_ttl_days: i64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opencagedata.com/geocode/v1/json".to_owned(),
            api_key: None,
            language: "pt-br".to_owned(),
            timeout_secs: 10,
            cache_ttl_days: 30,
        }
    }
}

impl std::fmt::Debug for GeocodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("language", &self.language)
            .field("timeout_secs", &self.timeout_secs)
            .field("cache_ttl_days", &self.cache_ttl_days)
            .finish()
    }
}

// ── RDP config ──────────────────────────────────────────────────

/// Temporary RDP access grants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RdpConfig {
    /// Port opened for granted addresses.
    pub port: u16,
    /// Grant lifetime in seconds.
    pub grant_ttl_secs: i64,
    /// Program and arguments run to open access; empty means log only.
    ///
    /// Arguments may contain `{rule}`, `{ip}` and `{port}`.
    pub allow_command: Vec<String>,
    /// Program and arguments run to remove access.
    pub revoke_command: Vec<String>,
}

impl Default for RdpConfig {
    fn default() -> Self {
        Self {
            port: 3389,
            grant_ttl_secs: 43_200,
            allow_command: Vec::new(),
            revoke_command: Vec::new(),
        }
    }
}

// ── Maintenance config ──────────────────────────────────────────

/// Built-in maintenance jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    /// Revoke RDP grants past their expiry.
    RevokeRdp,
    /// Delete geocode cache entries older than the TTL.
    PruneGeocode,
    /// Snapshot the SQLite database.
    Backup,
}

/// A cron-scheduled maintenance job.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledTask {
    /// Unique task name, used to track last run.
    pub name: String,
    /// Cron expression with a seconds field (`sec min hour dom mon dow`).
    pub cron: String,
    /// Job to run.
    pub builtin: Builtin,
    /// Disabled tasks are never due.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Background maintenance loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between due-task evaluations.
    pub interval_secs: u64,
    /// Scheduled jobs.
    pub tasks: Vec<ScheduledTask>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            tasks: vec![
                ScheduledTask {
                    name: "revoke_rdp".to_owned(),
                    cron: "0 * * * * *".to_owned(),
                    builtin: Builtin::RevokeRdp,
                    enabled: true,
                },
                ScheduledTask {
                    name: "prune_geocode".to_owned(),
                    cron: "0 30 3 * * *".to_owned(),
                    builtin: Builtin::PruneGeocode,
                    enabled: true,
                },
                ScheduledTask {
                    name: "backup".to_owned(),
                    cron: "0 0 2 * * *".to_owned(),
                    builtin: Builtin::Backup,
                    enabled: true,
                },
            ],
        }
    }
}

// ── Logging config ──────────────────────────────────────────────

/// Log output.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the rotated JSON log.
    pub dir: PathBuf,
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Daily files kept before the oldest is deleted.
    pub keep_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            level: "info".to_owned(),
            keep_files: 30,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
