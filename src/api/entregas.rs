//! Couriers, deliveries and crate balances.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::erp::scope_of;
use super::extract::{opt_param, path_id, ApiJson, ApiQuery, AuthUser};
use super::AppState;
use crate::auth::Permission;
use crate::erp::{SaleSearchHit, SalesFilter};
use crate::error::ApiError;
use crate::store::{Courier, CrateBalance, DeliveryInput, DeliveryRecord};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(save))
        .route("/entregadores", get(couriers).post(create_courier))
        .route("/vendas/search", get(search_sales))
        .route("/vendas", get(sales_with_deliveries))
        .route("/caixas/:codigoCliente", get(crate_balance))
}

async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<DeliveryRecord>>, ApiError> {
    user.require(Permission::ViewResumoVendas)?;
    Ok(Json(state.store.list_deliveries().await?))
}

async fn couriers(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Vec<Courier>>, ApiError> {
    Ok(Json(state.store.list_couriers().await?))
}

#[derive(Debug, Deserialize)]
struct CourierRequest {
    #[serde(default)]
    nome: Option<String>,
}

async fn create_courier(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<CourierRequest>,
) -> Result<(StatusCode, Json<Courier>), ApiError> {
    user.require_admin()?;
    let courier = state
        .store
        .create_courier(body.nome.as_deref().unwrap_or_default())
        .await?;
    info!(id = courier.id, nome = %courier.nome, by = %user.username, "courier created");
    Ok((StatusCode::CREATED, Json(courier)))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default, deserialize_with = "opt_param")]
    termo: Option<String>,
}

async fn search_sales(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<SaleSearchHit>>, ApiError> {
    user.require(Permission::ViewResumoVendas)?;
    let Some(term) = query.termo else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.erp.search_sales(&term).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SalesQuery {
    #[serde(default, deserialize_with = "opt_param")]
    codigo_cliente: Option<i64>,
    #[serde(default, deserialize_with = "opt_param")]
    dav: Option<i64>,
}

async fn sales_with_deliveries(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<SalesQuery>,
) -> Result<Json<Value>, ApiError> {
    user.require(Permission::ViewResumoVendas)?;
    let filter = SalesFilter {
        client: query.codigo_cliente,
        order: query.dav,
        scope: scope_of(&user)?,
    };
    let sales = state.erp.sales_summary(&filter).await?;
    let codes: Vec<i64> = sales.iter().map(|s| s.codigo).collect();
    let mut deliveries: HashMap<i64, DeliveryRecord> = state
        .store
        .deliveries_for(&codes)
        .await?
        .into_iter()
        .map(|d| (d.venda_id, d))
        .collect();

    let data: Vec<Value> = sales
        .into_iter()
        .map(|sale| {
            let entrega = deliveries.remove(&sale.codigo);
            let mut merged = json!(sale);
            if let Some(fields) = merged.as_object_mut() {
                fields.insert("entrega".to_owned(), json!(entrega));
            }
            merged
        })
        .collect();
    Ok(Json(json!({ "data": data })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest {
    #[serde(default)]
    venda_id: Option<i64>,
    #[serde(default)]
    codigo_cliente: Option<i64>,
    #[serde(default)]
    entregador_id: Option<i64>,
    #[serde(default)]
    caixas_saida: Option<i64>,
    #[serde(default)]
    caixas_retorno: Option<i64>,
    #[serde(default)]
    conferido_por: Option<String>,
}

async fn save(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<SaveRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_admin()?;
    let (Some(venda_id), Some(codigo_cliente)) = (body.venda_id, body.codigo_cliente) else {
        return Err(ApiError::bad_request(
            "vendaId e codigoCliente são obrigatórios.",
        ));
    };
    let input = DeliveryInput {
        venda_id,
        codigo_cliente,
        entregador_id: body.entregador_id,
        caixas_saida: body.caixas_saida.unwrap_or(0),
        caixas_retorno: body.caixas_retorno.unwrap_or(0),
        conferido_por: body
            .conferido_por
            .filter(|c| !c.trim().is_empty())
            .or_else(|| Some(user.username.clone())),
    };

    let outcome = state.store.save_delivery(&input).await?;
    info!(
        venda_id,
        codigo_cliente,
        change = outcome.change,
        balance = outcome.balance,
        by = %user.username,
        "delivery saved"
    );
    Ok(Json(json!({
        "message": "Entrega salva com sucesso!",
        "caixas": { "codigoCliente": codigo_cliente, "quantidade": outcome.balance },
        "alteracao": outcome.change,
    })))
}

async fn crate_balance(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(client): Path<String>,
) -> Result<Json<CrateBalance>, ApiError> {
    user.require(Permission::ViewResumoVendas)?;
    let client = path_id(&client, "Código do cliente inválido")?;
    user.check_client_access(client)?;
    Ok(Json(state.store.crate_balance(client).await?))
}
