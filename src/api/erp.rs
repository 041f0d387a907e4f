//! Back-office ERP reports.

use axum::extract::{Path, RawQuery, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use super::extract::{opt_param, path_id, ApiQuery, AuthUser};
use super::AppState;
use crate::auth::{Permission, Principal, Role};
use crate::erp::{
    pivot_by_delivery_date, split_by_cfop, Branch, ClientAddress, ClientMatch, ClientSaleItem,
    DateRange, FiscalClosing, PriceFilter, PurchaseDetail, PurchaseDetailFilter, PurchaseFilter,
    PurchasePivot, Receivable, ReceivableScope, ReplacementCost, SalePrice, SaleSummary,
    SalesFilter, StockFilter, StockLevel, StockOrder,
};
use crate::error::ApiError;
use crate::geocode::Coordinates;

const INVALID_ORDER: &str = "Código de orçamento inválido.";

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/produtos", get(replacement_costs))
        .route("/produtos/precos", get(sale_prices))
        .route("/estoque", get(stock))
        .route("/tabela-precos/:codigoCliente", get(price_table))
        .route("/resumo-vendas", get(sales_summary))
        .route("/vendas/:orcamentoCodigo/itens", get(sale_items))
        .route("/pedido-compras", get(purchase_grid))
        .route("/pedido-detalhes", get(purchase_details))
        .route("/clientes/search", get(search_clients))
        .route("/clientes/enderecos", get(client_addresses))
        .route("/geocode", get(geocode))
        .route("/fechamento-fiscal", get(fiscal_closing))
        .route("/financeiro/titulos", get(receivables))
}

/// Branches from repeated `empresa` parameters, in request order.
fn requested_branches(query: Option<&str>) -> Result<Vec<Branch>, ApiError> {
    let values: Vec<String> = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .filter(|(key, _)| key == "empresa")
        .map(|(_, value)| value.into_owned())
        .collect();
    if values.is_empty() {
        return Err(ApiError::bad_request("Parâmetro \"empresa\" é obrigatório."));
    }

    let mut branches = Vec::new();
    for branch in values
        .iter()
        .filter_map(|v| v.trim().parse().ok())
        .filter_map(Branch::from_code)
    {
        if !branches.contains(&branch) {
            branches.push(branch);
        }
    }
    if branches.is_empty() {
        return Err(ApiError::bad_request(
            "Parâmetro \"empresa\" inválido. Valores permitidos: 1 (Matriz), 2 (Filial).",
        ));
    }
    Ok(branches)
}

async fn replacement_costs(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<ReplacementCost>>, ApiError> {
    user.require(Permission::ViewCustoReposicao)?;
    let branches = requested_branches(query.as_deref())?;
    Ok(Json(state.erp.replacement_costs(&branches).await?))
}

#[derive(Debug, Deserialize)]
struct PriceQuery {
    #[serde(default, deserialize_with = "opt_param")]
    codigo: Option<i64>,
    #[serde(default, deserialize_with = "opt_param")]
    descricao: Option<String>,
    #[serde(default, deserialize_with = "opt_param")]
    secao: Option<i64>,
    #[serde(default, deserialize_with = "opt_param")]
    grupo: Option<i64>,
    #[serde(default, deserialize_with = "opt_param")]
    filial: Option<i64>,
}

async fn sale_prices(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    ApiQuery(query): ApiQuery<PriceQuery>,
) -> Result<Json<Vec<SalePrice>>, ApiError> {
    let filter = PriceFilter {
        branch: query.filial,
        code: query.codigo,
        description: query.descricao,
        section: query.secao,
        group: query.grupo,
    };
    Ok(Json(state.erp.sale_prices(&filter).await?))
}

#[derive(Debug, Deserialize)]
struct StockQuery {
    #[serde(default, deserialize_with = "opt_param")]
    tipo_estoque: Option<String>,
    #[serde(default, deserialize_with = "opt_param")]
    apenas_negativos: Option<String>,
    #[serde(default, deserialize_with = "opt_param")]
    ordenacao: Option<String>,
}

async fn stock(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<StockQuery>,
) -> Result<Json<Vec<StockLevel>>, ApiError> {
    user.require(Permission::ViewEstoqueNegativo)?;
    let filter = StockFilter {
        branch: match query.tipo_estoque.as_deref() {
            Some("1") => Some(Branch::Matriz),
            Some("2") => Some(Branch::Filial),
            _ => None,
        },
        only_negative: query.apenas_negativos.as_deref() == Some("true"),
        order: StockOrder::parse(query.ordenacao.as_deref()),
    };
    Ok(Json(state.erp.stock(&filter).await?))
}

#[derive(Debug, Deserialize)]
struct PriceTableQuery {
    #[serde(default, deserialize_with = "opt_param")]
    filial: Option<String>,
}

async fn price_table(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(client): Path<String>,
    ApiQuery(query): ApiQuery<PriceTableQuery>,
) -> Result<Json<Value>, ApiError> {
    user.require(Permission::ViewTabelaPrecos)?;
    let client = path_id(&client, "Código do cliente inválido")?;
    let branch = query
        .filial
        .as_deref()
        .and_then(|f| f.trim().parse().ok())
        .and_then(Branch::from_code)
        .ok_or_else(|| {
            ApiError::bad_request("Filial inválida. A filial deve ser 1 (Matriz) ou 2 (Filial)")
        })?;
    user.check_client_access(client)?;

    let data = state.erp.client_price_table(client, branch).await?;
    Ok(Json(json!({
        "message": format!(
            "Tabela de preços do cliente {client} na filial {}",
            branch.code()
        ),
        "total": data.len(),
        "data": data,
    })))
}

/// Client scope of a caller; portal users without a client code are refused.
pub(super) fn scope_of(user: &Principal) -> Result<Option<i64>, ApiError> {
    if user.role == Role::Cliente {
        return Ok(Some(user.own_client()?));
    }
    Ok(None)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SalesQuery {
    #[serde(default, deserialize_with = "opt_param")]
    codigo_cliente: Option<i64>,
}

async fn sales_summary(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<SalesQuery>,
) -> Result<Json<Value>, ApiError> {
    user.require(Permission::ViewResumoVendas)?;
    let filter = SalesFilter {
        client: query.codigo_cliente,
        order: None,
        scope: scope_of(&user)?,
    };
    let data: Vec<SaleSummary> = state.erp.sales_summary(&filter).await?;
    Ok(Json(json!({ "data": data })))
}

async fn sale_items(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(order): Path<String>,
) -> Result<Json<Value>, ApiError> {
    user.require(Permission::ViewResumoVendas)?;
    let order = path_id(&order, INVALID_ORDER)?;

    let scope = scope_of(&user)?;
    if let Some(own) = scope {
        if state.erp.sale_owner(order).await? != Some(own) {
            return Err(ApiError::forbidden("Acesso negado a este orçamento."));
        }
    }

    let items = state.erp.sale_items(order).await?;
    let observacao = state.erp.sale_note(order).await?;
    let items = if scope.is_some() {
        let stripped: Vec<ClientSaleItem> = items.into_iter().map(Into::into).collect();
        json!(stripped)
    } else {
        json!(items)
    };
    Ok(Json(json!({ "items": items, "observacao": observacao })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeriodQuery {
    #[serde(default, deserialize_with = "opt_param")]
    data_inicio: Option<NaiveDate>,
    #[serde(default, deserialize_with = "opt_param")]
    data_fim: Option<NaiveDate>,
    #[serde(default, deserialize_with = "opt_param")]
    codigo_cliente: Option<i64>,
    #[serde(default, deserialize_with = "opt_param")]
    situacao_entrega: Option<String>,
    #[serde(default, deserialize_with = "opt_param")]
    codigo_produto: Option<i64>,
}

impl PeriodQuery {
    fn range(&self) -> Option<DateRange> {
        Some(DateRange {
            start: self.data_inicio?,
            end: self.data_fim?,
        })
    }

    fn filter(&self, range: DateRange, scope: Option<i64>) -> PurchaseFilter {
        PurchaseFilter {
            range,
            client: self.codigo_cliente,
            scope,
            delivery_status: self.situacao_entrega.clone(),
        }
    }
}

async fn purchase_grid(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> Result<Json<PurchasePivot>, ApiError> {
    user.require(Permission::ViewPedidoCompras)?;
    let range = query
        .range()
        .ok_or_else(|| ApiError::bad_request("As datas de início e fim são obrigatórias."))?;
    let filter = query.filter(range, scope_of(&user)?);
    let lines = state.erp.purchase_lines(&filter).await?;
    Ok(Json(pivot_by_delivery_date(lines)))
}

async fn purchase_details(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> Result<Json<Vec<PurchaseDetail>>, ApiError> {
    user.require(Permission::ViewPedidoCompras)?;
    let (Some(range), Some(product)) = (query.range(), query.codigo_produto) else {
        return Err(ApiError::bad_request(
            "As datas de início, fim e o código do produto são obrigatórios.",
        ));
    };
    let filter = PurchaseDetailFilter {
        product,
        base: query.filter(range, scope_of(&user)?),
    };
    Ok(Json(state.erp.purchase_details(&filter).await?))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default, deserialize_with = "opt_param")]
    termo: Option<String>,
}

async fn search_clients(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<ClientMatch>>, ApiError> {
    user.require(Permission::ViewMapaClientes)?;
    let term = query
        .termo
        .ok_or_else(|| ApiError::bad_request("O parâmetro \"termo\" é obrigatório."))?;
    Ok(Json(state.erp.search_clients(&term).await?))
}

async fn client_addresses(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<ClientAddress>>, ApiError> {
    user.require(Permission::ViewMapaClientes)?;
    Ok(Json(state.erp.client_addresses().await?))
}

#[derive(Debug, Deserialize)]
struct GeocodeQuery {
    #[serde(default, deserialize_with = "opt_param")]
    endereco: Option<String>,
}

async fn geocode(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<GeocodeQuery>,
) -> Result<Json<Vec<Coordinates>>, ApiError> {
    user.require(Permission::ViewMapaClientes)?;
    let address = query
        .endereco
        .ok_or_else(|| ApiError::bad_request("Endereço não fornecido."))?;
    Ok(Json(state.geocode.lookup(&address).await?))
}

async fn fiscal_closing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> Result<Json<FiscalClosing>, ApiError> {
    user.require(Permission::ViewFechamentoFiscal)?;
    let Some(range) = query.range() else {
        return Ok(Json(FiscalClosing::default()));
    };
    let operations = state.erp.fiscal_operations(range).await?;
    Ok(Json(split_by_cfop(operations)))
}

async fn receivables(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Receivable>>, ApiError> {
    user.require(Permission::ViewFinanceiro)?;
    Ok(Json(
        state.erp.receivables(ReceivableScope::AllOutstanding).await?,
    ))
}
