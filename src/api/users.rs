//! Account administration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::auth::parse_role;
use super::extract::{path_id, present, ApiJson, AuthUser};
use super::AppState;
use crate::auth::{hash_password, Role};
use crate::error::ApiError;
use crate::store::{NewUser, UserPatch, UserSummary};

const INVALID_ID: &str = "ID de usuário inválido.";

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list).post(create))
        .route("/users/:id", put(update).delete(remove))
}

async fn list(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    caller.require_admin()?;
    Ok(Json(state.store.list_users().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    codigo_cliente: Option<i64>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
}

async fn create(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    caller.require_admin()?;

    let username = body.username.as_deref().unwrap_or_default();
    let password = body.password.unwrap_or_default();
    if username.trim().is_empty() || password.is_empty() {
        return Err(ApiError::bad_request(
            "Nome de usuário e senha são obrigatórios.",
        ));
    }
    let role = match body.role.as_deref() {
        None | Some("") => Role::User,
        Some(raw) => parse_role(raw)?,
    };

    let password_hash = hash_password(password, state.bcrypt_cost).await?;
    let id = state
        .store
        .create_user(&NewUser {
            username: username.to_owned(),
            password_hash,
            role,
            codigo_cliente: body.codigo_cliente,
            permissions: body.permissions.unwrap_or_default(),
        })
        .await?;
    info!(id, username, %role, by = %caller.username, "user created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Usuário criado com sucesso.", "userId": id })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserRequest {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default, deserialize_with = "present")]
    codigo_cliente: Option<Option<i64>>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
}

async fn update(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    caller.require_admin()?;
    let id = path_id(&id, INVALID_ID)?;

    let mut patch = UserPatch {
        codigo_cliente: body.codigo_cliente,
        permissions: body.permissions,
        ..UserPatch::default()
    };
    if let Some(raw) = body.role.as_deref().filter(|r| !r.is_empty()) {
        patch.role = Some(parse_role(raw)?);
    }
    if let Some(password) = body.password.filter(|p| !p.is_empty()) {
        patch.password_hash = Some(hash_password(password, state.bcrypt_cost).await?);
    }

    state.store.update_user(id, patch).await?;
    info!(id, by = %caller.username, "user updated");
    Ok(Json(json!({ "message": "Usuário atualizado com sucesso." })))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    caller.require_admin()?;
    let id = path_id(&id, INVALID_ID)?;
    state.store.delete_user(id).await?;
    info!(id, by = %caller.username, "user deleted");
    Ok(Json(json!({ "message": "Usuário deletado com sucesso." })))
}
