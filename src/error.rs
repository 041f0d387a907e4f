//! HTTP error envelope.
//!
//! Every failed request renders as `{"error": {"message": ..., "detail"?: ...}}`.
//! `detail` carries the internal cause and is only sent outside production.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::{AccessDenied, PasswordError, TokenError};
use crate::erp::ErpError;
use crate::geocode::GeocodeError;
use crate::rdp::RdpError;
use crate::store::StoreError;

static EXPOSE_DETAIL: AtomicBool = AtomicBool::new(false);

/// Choose whether error responses include the internal `detail` field.
pub fn expose_error_detail(expose: bool) {
    EXPOSE_DETAIL.store(expose, Ordering::Relaxed);
}

/// An error returned by a handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    /// Error with a status and a client-facing message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    /// Attach the internal cause.
    #[must_use]
    pub fn with_detail(mut self, detail: impl std::fmt::Display) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    /// 400 with a validation message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 401 with a message.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 403 with a message.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// 404 with a message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 409 with a message.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// 500 with a generic message and the internal cause.
    pub fn internal(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message).with_detail(cause)
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Client-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = self.status.as_u16(),
                message = %self.message,
                detail = self.detail.as_deref().unwrap_or_default(),
                "request failed"
            );
        }
        let mut error = json!({ "message": self.message });
        if let (Some(detail), true) = (self.detail, EXPOSE_DETAIL.load(Ordering::Relaxed)) {
            error["detail"] = json!(detail);
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<AccessDenied> for ApiError {
    fn from(e: AccessDenied) -> Self {
        Self::forbidden(e.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired | TokenError::Invalid(_) => {
                Self::forbidden("Token de autenticação inválido ou expirado.")
            }
            TokenError::Sign(_) | TokenError::InvalidDuration(_) => {
                Self::internal("erro ao gerar token", e)
            }
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(e: PasswordError) -> Self {
        Self::internal("erro ao processar senha", e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(message) => Self::conflict(message),
            StoreError::NotFound(message) => Self::not_found(message),
            StoreError::Invalid(message) => Self::bad_request(message),
            other => Self::internal("erro no banco de dados local", other),
        }
    }
}

impl From<ErpError> for ApiError {
    fn from(e: ErpError) -> Self {
        Self::internal("erro ao consultar o ERP", e)
    }
}

impl From<GeocodeError> for ApiError {
    fn from(e: GeocodeError) -> Self {
        match e {
            GeocodeError::NotConfigured => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Serviço de geocodificação não configurado.")
            }
            other => Self::new(StatusCode::BAD_GATEWAY, "Serviço de geocodificação indisponível.")
                .with_detail(other),
        }
    }
}

impl From<RdpError> for ApiError {
    fn from(e: RdpError) -> Self {
        match e {
            RdpError::InvalidIp(ip) => Self::bad_request("IP inválido fornecido.").with_detail(ip),
            RdpError::NoSourceAddress => {
                Self::bad_request("não foi possível determinar o endereço IP de origem")
            }
            other => Self::internal("Falha ao aplicar regra no firewall.", other),
        }
    }
}
