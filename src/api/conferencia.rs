//! Conferência flags on orders.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::extract::{ApiJson, AuthUser};
use super::AppState;
use crate::auth::Permission;
use crate::error::ApiError;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/conferencia/toggle", put(toggle))
        .route("/conferencia/statuses", post(statuses))
}

#[derive(Debug, Deserialize)]
struct ToggleRequest {
    #[serde(default)]
    dav_codigo: Option<Value>,
}

/// Accepts a JSON number or a numeric string.
fn dav_code(raw: Option<&Value>) -> Result<i64, ApiError> {
    let value = match raw {
        None | Some(Value::Null) => {
            return Err(ApiError::bad_request(
                "O código DAV (dav_codigo) é obrigatório.",
            ))
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(ApiError::bad_request(
                "O código DAV (dav_codigo) é obrigatório.",
            ))
        }
        Some(value) => value,
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ApiError::bad_request("O código DAV (dav_codigo) deve ser um número."))
}

async fn toggle(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<ToggleRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require(Permission::ViewResumoVendas)?;
    let dav = dav_code(body.dav_codigo.as_ref())?;

    let outcome = state.store.toggle_conferencia(dav).await?;
    info!(dav, conferido = outcome.conferido, by = %user.username, "conferência toggled");

    let (status, message) = if outcome.created {
        (StatusCode::CREATED, "Status de conferência criado com sucesso.")
    } else {
        (StatusCode::OK, "Status de conferência atualizado com sucesso.")
    };
    Ok((
        status,
        Json(json!({ "message": message, "conferido": i64::from(outcome.conferido) })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusesRequest {
    #[serde(default)]
    dav_codigos: Option<Value>,
}

async fn statuses(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<StatusesRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require(Permission::ViewResumoVendas)?;
    let Some(Value::Array(items)) = body.dav_codigos else {
        return Err(ApiError::bad_request(
            "O corpo da requisição deve conter um array de davCodigos.",
        ));
    };
    let davs: Vec<i64> = items.iter().filter_map(|v| dav_code(Some(v)).ok()).collect();
    if davs.is_empty() {
        return Ok(Json(json!({})));
    }
    let statuses = state.store.conferencia_statuses(&davs).await?;
    Ok(Json(json!(statuses)))
}
