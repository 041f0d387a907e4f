//! Feira CLI entry point.
//!
//! Provides `serve`, `seed-admin`, `check-erp` and `backup` subcommands for
//! running the API server, bootstrapping the first administrator, probing
//! the ERP connection, or taking a one-shot SQLite snapshot.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;
use tracing::{info, warn};

use feira::api::{self, AppState};
use feira::auth::{hash_password, Role, TokenKeys};
use feira::config::AppConfig;
use feira::erp::{Erp, FirebirdErp};
use feira::geocode::GeocodeService;
use feira::maintenance::{run_maintenance, MaintenanceDeps};
use feira::rdp::RdpService;
use feira::store::{NewUser, Store};
use feira::{logging, server};
use feira_firebird::{FirebirdConnector, Pool};

/// ERP gateway and client portal API.
#[derive(Parser)]
#[command(name = "feira", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the maintenance loop.
    Serve,
    /// Create an administrator; the password is read from stdin.
    SeedAdmin {
        /// Login name of the new administrator.
        #[arg(long, default_value = "admin")]
        username: String,
    },
    /// Open one ERP connection and report whether it succeeded.
    CheckErp,
    /// Snapshot the local database into the backups directory.
    Backup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => handle_serve().await,
        Command::SeedAdmin { username } => handle_seed_admin(&username).await,
        Command::CheckErp => handle_check_erp().await,
        Command::Backup => handle_backup().await,
    }
}

fn firebird_erp(config: &AppConfig) -> anyhow::Result<FirebirdErp> {
    let connector = FirebirdConnector::new(config.firebird.connect_options());
    let pool = Pool::new(connector, config.firebird.pool_size)
        .context("failed to create ERP connection pool")?;
    Ok(FirebirdErp::new(pool))
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Store> {
    Store::open(&config.sqlite.path)
        .await
        .with_context(|| format!("failed to open {}", config.sqlite.path.display()))
}

/// Run the API server until Ctrl-C.
async fn handle_serve() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    let _logging_guard = logging::init_production(&config.logging)?;
    feira::error::expose_error_detail(!config.server.production);

    let store = open_store(&config).await?;
    let erp: Arc<dyn Erp> = Arc::new(firebird_erp(&config)?);
    let tokens = Arc::new(TokenKeys::new(&config.auth.jwt_secret, config.token_ttl()?));
    let geocode = GeocodeService::from_config(store.clone(), &config.geocode)
        .context("failed to build geocoder")?;
    let rdp = RdpService::from_config(store.clone(), &config.rdp);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let maintenance = tokio::spawn(run_maintenance(
        MaintenanceDeps {
            config: config.maintenance.clone(),
            store: store.clone(),
            rdp: rdp.clone(),
            geocode_ttl: geocode.ttl(),
            backups_dir: config.sqlite.backups_dir.clone(),
        },
        shutdown_rx.clone(),
    ));

    let app = api::router(
        AppState {
            store: store.clone(),
            erp,
            tokens,
            geocode,
            rdp,
            bcrypt_cost: config.auth.bcrypt_cost,
        },
        &config.server,
    );
    let listener = server::bind(&config.server).await?;
    let mut http = tokio::spawn(server::serve(listener, app, shutdown_rx));

    info!(
        production = config.server.production,
        sqlite = %config.sqlite.path.display(),
        "feira started"
    );

    let served = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("received shutdown signal, initiating graceful shutdown");
            let _ = shutdown_tx.send(true);
            (&mut http).await
        }
        joined = &mut http => {
            let _ = shutdown_tx.send(true);
            joined
        }
    };

    if let Err(e) = maintenance.await {
        warn!(error = %e, "maintenance task ended abnormally");
    }
    store.close().await;
    info!("feira stopped");

    served.context("HTTP server task panicked")?
}

/// Create the first administrator account.
async fn handle_seed_admin(username: &str) -> anyhow::Result<()> {
    logging::init_cli();
    let config = AppConfig::load().context("failed to load configuration")?;
    let store = open_store(&config).await?;

    if store.find_user_by_username(username).await?.is_some() {
        bail!("user {username:?} already exists");
    }

    eprintln!("password for {username}:");
    let mut password = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut password)
        .await
        .context("failed to read password from stdin")?;
    let password = password.trim_end_matches(['\r', '\n']).to_owned();
    if password.is_empty() {
        bail!("password must not be empty");
    }

    let password_hash = hash_password(password, config.auth.bcrypt_cost).await?;
    let id = store
        .create_user(&NewUser {
            username: username.to_owned(),
            password_hash,
            role: Role::Admin,
            codigo_cliente: None,
            permissions: Vec::new(),
        })
        .await?;
    info!(id, username, "administrator created");
    store.close().await;
    Ok(())
}

/// Probe the ERP with a single connection.
async fn handle_check_erp() -> anyhow::Result<()> {
    logging::init_cli();
    let config = AppConfig::load().context("failed to load configuration")?;
    let erp = firebird_erp(&config)?;
    erp.check().await.with_context(|| {
        format!(
            "ERP unreachable at {}:{}/{}",
            config.firebird.host, config.firebird.port, config.firebird.database
        )
    })?;
    info!(host = %config.firebird.host, database = %config.firebird.database, "ERP reachable");
    Ok(())
}

/// One-shot SQLite snapshot.
async fn handle_backup() -> anyhow::Result<()> {
    logging::init_cli();
    let config = AppConfig::load().context("failed to load configuration")?;
    let store = open_store(&config).await?;
    let result = store.backup_into(&config.sqlite.backups_dir).await?;
    info!(
        dir = %result.backup_dir.display(),
        size_bytes = result.size_bytes,
        "backup complete"
    );
    store.close().await;
    Ok(())
}
