//! Client portal: a client's own purchases, titles and catalog.
//!
//! Every route is locked to the caller's client code; replacement costs
//! never leave these handlers.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use super::extract::{path_id, AuthUser};
use super::AppState;
use crate::auth::Principal;
use crate::erp::{AvailableProduct, ClientPurchase, ClientSaleItem, ReceivableScope, SalesFilter};
use crate::error::ApiError;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/produtos-disponiveis", get(available_products))
        .route("/minhas-compras", get(my_purchases))
        .route("/minhas-compras/:orcamentoCodigo", get(my_purchase_items))
        .route("/dashboard", get(dashboard))
        .route("/meus-titulos", get(my_titles))
}

/// The caller's client code, or 403.
fn portal_client(user: &Principal) -> Result<i64, ApiError> {
    user.require_cliente()?;
    Ok(user.own_client()?)
}

async fn available_products(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<AvailableProduct>>, ApiError> {
    portal_client(&user)?;
    Ok(Json(state.erp.available_products().await?))
}

async fn my_purchases(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let client = portal_client(&user)?;
    let filter = SalesFilter {
        scope: Some(client),
        ..SalesFilter::default()
    };
    let data: Vec<ClientPurchase> = state
        .erp
        .sales_summary(&filter)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(json!({ "data": data })))
}

async fn my_purchase_items(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(order): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let client = portal_client(&user)?;
    let order = path_id(&order, "Código de orçamento inválido.")?;

    if state.erp.sale_owner(order).await? != Some(client) {
        tracing::warn!(username = %user.username, client, order, "order of another client");
        return Err(ApiError::forbidden("Acesso negado a este orçamento."));
    }

    let items: Vec<ClientSaleItem> = state
        .erp
        .sale_items(order)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(json!({ "items": items })))
}

async fn dashboard(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let client = portal_client(&user)?;
    let top = state.erp.client_top_products(client).await?;
    Ok(Json(json!({ "topProdutos": top })))
}

async fn my_titles(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let client = portal_client(&user)?;
    let data = state
        .erp
        .receivables(ReceivableScope::ClientOpen(client))
        .await?;
    Ok(Json(json!({ "data": data })))
}
