//! Login, token verification and admin registration.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::extract::{ApiJson, AuthUser};
use super::AppState;
use crate::auth::{hash_password, verify_password, Principal, Role};
use crate::error::ApiError;
use crate::store::NewUser;

const INVALID_CREDENTIALS: &str = "Usuário ou senha inválidos.";

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/verify-token", get(verify_token))
        .route("/admin/register", post(register))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

fn required<'a>(value: Option<&'a str>, missing: &str, empty: &str) -> Result<&'a str, ApiError> {
    match value {
        None => Err(ApiError::bad_request(missing)),
        Some(v) if v.trim().is_empty() => Err(ApiError::bad_request(empty)),
        Some(v) => Ok(v),
    }
}

async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let username = required(
        body.username.as_deref(),
        "O nome de usuário é obrigatório.",
        "O nome de usuário não pode ser vazio.",
    )?;
    let password = required(
        body.password.as_deref(),
        "A senha é obrigatória.",
        "A senha não pode ser vazia.",
    )?;

    let Some(user) = state.store.find_user_by_username(username).await? else {
        warn!(username, "login failed: unknown user");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };
    if !verify_password(password.to_owned(), user.password_hash.clone()).await? {
        warn!(username, "login failed: wrong password");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let mut principal = Principal {
        username: user.username,
        role: user.role,
        codigo_cliente: user.codigo_cliente,
        convenio_desconto: 0.0,
        apelido: None,
        permissions: user.permissions,
    };
    if let (Role::Cliente, Some(client)) = (principal.role, principal.codigo_cliente) {
        match state.erp.client_agreement(client).await {
            Ok(Some(agreement)) => {
                principal.convenio_desconto = agreement.convenio_desconto;
                principal.apelido = agreement.apelido;
            }
            Ok(None) => warn!(client, "client not found in ERP at login"),
            Err(e) => error!(error = %e, client, "failed to load client agreement at login"),
        }
    }

    let token = state.tokens.issue(principal.clone())?;
    info!(username = %principal.username, role = %principal.role, "login");
    Ok(Json(json!({
        "message": "Login realizado com sucesso!",
        "token": token,
        "user": principal,
    })))
}

async fn verify_token(AuthUser(user): AuthUser) -> Json<Value> {
    Json(json!({
        "valid": true,
        "user": {
            "username": user.username,
            "role": user.role,
            "codigoCliente": user.codigo_cliente,
            "permissions": user.permissions,
        },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
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

fn valid_username(username: &str) -> bool {
    (3..=30).contains(&username.chars().count())
        && username.chars().all(|c| c.is_ascii_alphanumeric())
}

pub(super) fn parse_role(raw: &str) -> Result<Role, ApiError> {
    Role::parse(raw).ok_or_else(|| {
        ApiError::bad_request("Role inválida. Valores permitidos: admin, user, cliente.")
    })
}

async fn register(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    caller.require_admin()?;

    let username = body.username.as_deref().unwrap_or_default();
    if !valid_username(username) {
        return Err(ApiError::bad_request(
            "O nome de usuário deve ser alfanumérico e ter entre 3 e 30 caracteres.",
        ));
    }
    let password = body.password.unwrap_or_default();
    if password.chars().count() < 6 {
        return Err(ApiError::bad_request(
            "A senha deve ter pelo menos 6 caracteres.",
        ));
    }
    let role = match body.role.as_deref().map(str::trim) {
        None | Some("") => Role::User,
        Some(raw) => parse_role(raw)?,
    };
    let permissions = body.permissions.unwrap_or_default();

    let password_hash = hash_password(password, state.bcrypt_cost).await?;
    state
        .store
        .create_user(&NewUser {
            username: username.to_owned(),
            password_hash,
            role,
            codigo_cliente: body.codigo_cliente,
            permissions: permissions.clone(),
        })
        .await?;
    info!(username, %role, by = %caller.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Usuário '{username}' criado com sucesso com a role '{role}'."),
            "username": username,
            "role": role,
            "codigoCliente": body.codigo_cliente,
            "permissions": permissions,
        })),
    ))
}
