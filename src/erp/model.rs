//! ERP records and query filters.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Company branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// Head office, code 1.
    Matriz,
    /// Branch, code 2.
    Filial,
}

impl Branch {
    /// ERP branch code.
    pub fn code(self) -> i64 {
        match self {
            Self::Matriz => 1,
            Self::Filial => 2,
        }
    }

    /// Branch for an ERP code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Matriz),
            2 => Some(Self::Filial),
            _ => None,
        }
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Matriz => "Matriz",
            Self::Filial => "Filial",
        }
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// First day.
    pub start: NaiveDate,
    /// Last day, included up to its final second.
    pub end: NaiveDate,
}

impl DateRange {
    /// Timestamp bounds: start at midnight, end at 23:59:59.
    pub fn bounds(self) -> (NaiveDateTime, NaiveDateTime) {
        let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        (
            self.start.and_time(NaiveTime::MIN),
            self.end.and_time(last_second),
        )
    }
}

// ── Costs and stock ─────────────────────────────────────────────

/// A product's replacement cost in one branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ReplacementCost {
    /// Code.
    pub codigo: i64,
    /// Description.
    pub descricao: Option<String>,
    /// Replacement cost.
    pub f_custo_reposicao: Option<f64>,
    /// Branch code.
    pub codigo_filial: i64,
}

/// Sort column for stock listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockSortField {
    /// Product code.
    Codigo,
    /// Description.
    #[default]
    Descricao,
    /// Summed stock.
    Estoque,
}

/// Stock listing order, parsed from `campo_direcao` such as `estoque_desc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StockOrder {
    /// Column.
    pub field: StockSortField,
    /// Descending when true.
    pub descending: bool,
}

impl StockOrder {
    /// Parse a whitelisted order; anything else yields the default
    /// (`descricao_asc`).
    pub fn parse(raw: Option<&str>) -> Self {
        let Some((field, direction)) = raw.and_then(|r| r.split_once('_')) else {
            return Self::default();
        };
        let field = match field {
            "codigo" => StockSortField::Codigo,
            "descricao" => StockSortField::Descricao,
            "estoque" => StockSortField::Estoque,
            _ => return Self::default(),
        };
        let descending = match direction {
            "asc" => false,
            "desc" => true,
            _ => return Self::default(),
        };
        Self { field, descending }
    }
}

/// Stock listing filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockFilter {
    /// Restrict to one branch.
    pub branch: Option<Branch>,
    /// Only products with negative summed stock.
    pub only_negative: bool,
    /// Ordering.
    pub order: StockOrder,
}

/// Stock of one product in one branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StockLevel {
    /// Product code.
    pub codigo_produto: i64,
    /// Description.
    pub descricao: Option<String>,
    /// Summed stock; zero when unknown.
    pub estoque: f64,
    /// Branch label (`Matriz`/`Filial`).
    pub tipo_estoque: &'static str,
    /// Supplier code.
    pub codigo_fornecedor: Option<i64>,
    /// Supplier legal name.
    pub fornecedor: Option<String>,
    /// Section code.
    pub cod_secao: Option<i64>,
    /// Group code.
    pub cod_grupo: Option<i64>,
}

// ── Fiscal ──────────────────────────────────────────────────────

/// One fiscal line with its taxes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FiscalOperation {
    /// Fiscal operation code.
    pub cfop: Option<String>,
    /// Operation date.
    pub data: Option<NaiveDateTime>,
    /// Line total.
    pub total: f64,
    /// ICMS amount.
    pub valor_icms: f64,
    /// PIS amount.
    pub valor_pis: f64,
    /// COFINS amount.
    pub valor_cofins: f64,
}

// ── Pricing ─────────────────────────────────────────────────────

/// A product in a client's agreement price table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PriceTableEntry {
    /// Product code.
    pub codigo_produto: i64,
    /// Description.
    pub descricao: Option<String>,
    /// Agreement price.
    pub preco_fixo: Option<f64>,
    /// Replacement cost.
    pub f_custo_reposicao: Option<f64>,
    /// Agreement client code.
    pub codigo_cliente_convenio: i64,
    /// Last day the client bought it.
    pub data_ultima_compra: Option<NaiveDate>,
}

/// Sale price listing filters.
#[derive(Debug, Clone, Default)]
pub struct PriceFilter {
    /// Branch code.
    pub branch: Option<i64>,
    /// Exact product code.
    pub code: Option<i64>,
    /// Description fragment, matched upper-cased.
    pub description: Option<String>,
    /// Section code.
    pub section: Option<i64>,
    /// Group code.
    pub group: Option<i64>,
}

/// An active product's cost and price in one branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SalePrice {
    /// Code.
    pub codigo: i64,
    /// Description.
    pub descricao: Option<String>,
    /// Section code.
    pub cod_secao: Option<i64>,
    /// Group code.
    pub cod_grupo: Option<i64>,
    /// Replacement cost.
    pub f_custo_reposicao: Option<f64>,
    /// Sale price.
    pub preco_venda: Option<f64>,
    /// Branch code.
    pub codigo_filial: Option<i64>,
    /// Section name.
    pub secao_descricao: &'static str,
    /// Group name.
    pub grupo_descricao: &'static str,
}

/// Produce listed in the client portal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableProduct {
    /// Code.
    pub codigo: i64,
    /// Description.
    pub descricao: Option<String>,
    /// Sale price.
    pub preco_venda: Option<f64>,
    /// Product type.
    pub tipo_produto: Option<String>,
}

// ── Sales ───────────────────────────────────────────────────────

/// Order listing filters. Both client conditions apply when set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SalesFilter {
    /// Client requested by the caller.
    pub client: Option<i64>,
    /// Exact order code.
    pub order: Option<i64>,
    /// Client a portal caller is locked to.
    pub scope: Option<i64>,
}

/// An order header.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SaleSummary {
    /// Code.
    pub codigo: i64,
    /// Client code.
    pub codigo_cliente: Option<i64>,
    /// Client name.
    pub nome_cliente: Option<String>,
    /// Client alias.
    pub apelido_cliente: Option<String>,
    /// Order date.
    pub data_orcamento: Option<NaiveDate>,
    /// ERP user who entered it.
    pub usuario: Option<String>,
    /// Salesperson code.
    pub codigo_vendedor: Option<i64>,
    /// Branch code.
    pub codigo_filial: Option<i64>,
    /// Gross total.
    pub orcamento_bruto: Option<f64>,
    /// Net total.
    pub orcamento_liquido: Option<f64>,
    /// Status code.
    pub status: Option<String>,
    /// Delivery situation of its lines.
    pub situacao_entrega: Option<String>,
}

/// An order as shown to its own client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClientPurchase {
    /// Code.
    pub codigo: i64,
    /// Order date.
    pub data_orcamento: Option<NaiveDate>,
    /// Net total.
    pub orcamento_liquido: Option<f64>,
    /// Status code.
    pub status: Option<String>,
}

impl From<SaleSummary> for ClientPurchase {
    fn from(s: SaleSummary) -> Self {
        Self {
            codigo: s.codigo,
            data_orcamento: s.data_orcamento,
            orcamento_liquido: s.orcamento_liquido,
            status: s.status,
        }
    }
}

/// An order line, including the replacement cost staff may see.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SaleItem {
    /// Line number.
    pub sequencia: Option<i64>,
    /// Product code.
    pub codigo_produto: Option<i64>,
    /// Product description on the order.
    pub paf_descricao_produto: Option<String>,
    /// Quantity.
    pub quantidade: f64,
    /// Unit price.
    pub preco_unitario: Option<f64>,
    /// Discount amount; zero when unset.
    pub desconto_valor: f64,
    /// Line total.
    pub valor_total: Option<f64>,
    /// Replacement cost at sale time.
    pub custo_reposicao: Option<f64>,
}

/// An order line as shown to the client: no replacement cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClientSaleItem {
    /// Line number.
    pub sequencia: Option<i64>,
    /// Product code.
    pub codigo_produto: Option<i64>,
    /// Product description on the order.
    pub paf_descricao_produto: Option<String>,
    /// Quantity.
    pub quantidade: f64,
    /// Unit price.
    pub preco_unitario: Option<f64>,
    /// Discount amount; zero when unset.
    pub desconto_valor: f64,
    /// Line total.
    pub valor_total: Option<f64>,
}

impl From<SaleItem> for ClientSaleItem {
    fn from(i: SaleItem) -> Self {
        Self {
            sequencia: i.sequencia,
            codigo_produto: i.codigo_produto,
            paf_descricao_produto: i.paf_descricao_produto,
            quantidade: i.quantidade,
            preco_unitario: i.preco_unitario,
            desconto_valor: i.desconto_valor,
            valor_total: i.valor_total,
        }
    }
}

/// Order search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SaleSearchHit {
    /// Code.
    pub codigo: i64,
    /// Client name.
    pub nome_cliente: Option<String>,
    /// Order date.
    pub data_orcamento: Option<NaiveDate>,
}

/// A product with its total quantity bought by one client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TopProduct {
    /// Product code.
    pub codigo_produto: i64,
    /// Product description.
    pub nome_produto: Option<String>,
    /// Summed quantity.
    pub quantidade_total: f64,
}

// ── Purchasing ──────────────────────────────────────────────────

/// Purchase planning filters.
#[derive(Debug, Clone)]
pub struct PurchaseFilter {
    /// Expected delivery dates.
    pub range: DateRange,
    /// Client requested by the caller; ignored when `scope` is set.
    pub client: Option<i64>,
    /// Client a portal caller is locked to.
    pub scope: Option<i64>,
    /// Delivery situation code.
    pub delivery_status: Option<String>,
}

impl PurchaseFilter {
    /// The client condition actually applied.
    pub fn effective_client(&self) -> Option<i64> {
        self.scope.or(self.client)
    }
}

/// One order line due for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseLine {
    /// Product code.
    pub codigo_produto: i64,
    /// Product description on the order.
    pub paf_descricao_produto: Option<String>,
    /// Ordered quantity.
    pub quantidade: f64,
    /// Expected delivery day.
    pub data_previsao_entrega: Option<NaiveDate>,
    /// Purchase unit fraction.
    pub fracao_compra3: Option<f64>,
    /// Replacement cost in the order's branch.
    pub f_custo_reposicao: Option<f64>,
}

/// Filters for one product's purchase breakdown.
#[derive(Debug, Clone)]
pub struct PurchaseDetailFilter {
    /// Product code.
    pub product: i64,
    /// Base filters.
    pub base: PurchaseFilter,
}

/// One order's share of a product's pending deliveries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PurchaseDetail {
    /// Order code.
    pub codigo_orcamento: i64,
    /// Free-text note.
    pub observacao: Option<String>,
    /// Client name.
    pub nome_cliente: Option<String>,
    /// Quantity.
    pub quantidade: f64,
    /// Replacement cost at sale time.
    pub custo_reposicao: Option<f64>,
    /// Line total.
    pub valor_total: Option<f64>,
    /// Total divided by quantity.
    pub valor_unitario: f64,
}

impl PurchaseDetail {
    /// Unit value derived from the line total; zero for non-positive quantities.
    pub fn unit_value(total: Option<f64>, quantity: f64) -> f64 {
        if quantity > 0.0 {
            total.unwrap_or(0.0) / quantity
        } else {
            0.0
        }
    }
}

// ── Clients and receivables ─────────────────────────────────────

/// Client search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClientMatch {
    /// Code.
    pub codigo: i64,
    /// Trade name.
    pub nome: Option<String>,
    /// Legal name.
    pub razao_social: Option<String>,
    /// Company registry number.
    pub cnpj: Option<String>,
}

/// A client's address for the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClientAddress {
    /// Code.
    pub codigo: i64,
    /// Trade name.
    pub nome: Option<String>,
    /// Legal name.
    pub razao_social: Option<String>,
    /// Street.
    pub endereco: Option<String>,
    /// Street number.
    pub numero: Option<String>,
    /// District.
    pub bairro: Option<String>,
    /// City.
    pub cidade: Option<String>,
    /// State.
    pub uf: Option<String>,
    /// Postal code.
    pub cep: Option<String>,
}

/// A client's pricing agreement.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientAgreement {
    /// Discount percentage; zero when unset.
    pub convenio_desconto: f64,
    /// Client alias.
    pub apelido: Option<String>,
}

/// Which receivables to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceivableScope {
    /// Every open or partially paid title, latest due date first.
    AllOutstanding,
    /// One client's open titles, earliest due date first.
    ClientOpen(i64),
}

/// A receivable title.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Receivable {
    /// Code.
    pub codigo: i64,
    /// Client code.
    pub codigo_cliente: Option<i64>,
    /// Client name.
    pub nome_cliente: Option<String>,
    /// Originating order code.
    pub dav: Option<i64>,
    /// Issue date.
    pub data_emissao: Option<NaiveDate>,
    /// Due date.
    pub data_vencimento: Option<NaiveDate>,
    /// Status code.
    pub status: Option<String>,
    /// Face value.
    pub valor_nominal: Option<f64>,
    /// Outstanding amount.
    pub valor_aberto: Option<f64>,
    /// Free-text note.
    pub observacao: Option<String>,
    /// Branch code.
    pub codigo_filial: Option<i64>,
    /// Bank slip number.
    pub bloqueto_nossonumero: Option<String>,
}
