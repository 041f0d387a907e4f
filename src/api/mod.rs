//! HTTP surface.
//!
//! [`router`] assembles every route with the shared layers: CORS, security
//! headers, request tracing and the static PDF directory. Handlers receive
//! an [`AppState`] and authenticate through the [`extract::AuthUser`]
//! extractor; authorization checks live on [`crate::auth::Principal`].

mod auth;
mod cliente;
mod conferencia;
mod entregas;
mod erp;
pub mod extract;
mod rdp;
mod users;

use std::sync::Arc;

use axum::http::header::{
    HeaderName, HeaderValue, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_DNS_PREFETCH_CONTROL,
    X_FRAME_OPTIONS,
};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::TokenKeys;
use crate::config::ServerConfig;
use crate::erp::Erp;
use crate::geocode::GeocodeService;
use crate::rdp::RdpService;
use crate::store::Store;

/// Everything a handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Local SQLite state.
    pub store: Store,
    /// Legacy ERP.
    pub erp: Arc<dyn Erp>,
    /// Token signing and verification.
    pub tokens: Arc<TokenKeys>,
    /// Cached geocoding.
    pub geocode: GeocodeService,
    /// Temporary RDP access.
    pub rdp: RdpService,
    /// bcrypt work factor for new passwords.
    pub bcrypt_cost: u32,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("geocode", &self.geocode)
            .field("rdp", &self.rdp)
            .finish_non_exhaustive()
    }
}

/// Build the application router.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let api = Router::new()
        .merge(auth::routes())
        .merge(users::routes())
        .merge(erp::routes())
        .merge(rdp::routes())
        .merge(conferencia::routes())
        .nest("/cliente", cliente::routes())
        .nest("/entregas", entregas::routes());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .nest_service("/pdfs", ServeDir::new(&server.pdf_dir))
        .layer(header(X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(header(X_FRAME_OPTIONS, "SAMEORIGIN"))
        .layer(header(REFERRER_POLICY, "no-referrer"))
        .layer(header(X_DNS_PREFETCH_CONTROL, "off"))
        .layer(cors(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

fn cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

fn header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}
