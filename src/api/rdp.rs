//! Temporary RDP access for the caller's address.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::extract::AuthUser;
use super::AppState;
use crate::auth::Permission;
use crate::error::ApiError;
use crate::rdp::resolve_source_ip;

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/liberar-rdp", post(grant))
}

#[derive(Debug, Default, Deserialize)]
struct GrantRequest {
    #[serde(default)]
    ip: Option<String>,
}

async fn grant(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Option<Json<GrantRequest>>,
) -> Result<Json<Value>, ApiError> {
    user.require(Permission::ViewLiberarRdp)?;

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let ip = resolve_source_ip(
        body.ip.as_deref(),
        forwarded,
        connect.map(|ConnectInfo(addr)| addr.ip()),
    )?;

    let outcome = state.rdp.grant(ip, &user.username, Utc::now()).await?;
    let message = if outcome.extended {
        format!("Acesso RDP do IP {ip} renovado.")
    } else {
        format!("IP {ip} liberado para RDP.")
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "expiresAt": outcome.grant.expires_at,
    })))
}
