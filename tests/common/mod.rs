//! Shared fixtures: an in-process fake ERP and a server on a random port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::net::TcpListener;
use tokio::sync::watch;

use feira::api::{self, AppState};
use feira::auth::{Principal, Role, TokenKeys};
use feira::config::ServerConfig;
use feira::erp::{
    AvailableProduct, Branch, ClientAddress, ClientAgreement, ClientMatch, DateRange, Erp,
    ErpError, FiscalOperation, PriceFilter, PriceTableEntry, PurchaseDetail,
    PurchaseDetailFilter, PurchaseFilter, PurchaseLine, Receivable, ReceivableScope,
    ReplacementCost, SaleItem, SalePrice, SaleSearchHit, SaleSummary, SalesFilter, StockFilter,
    StockLevel, TopProduct,
};
use feira::geocode::GeocodeService;
use feira::rdp::{LogOnlyFirewall, RdpService};
use feira::server;
use feira::store::Store;
use feira_firebird::PoolError;

pub const SECRET: &str = "test-secret";

/// Scripted ERP. Sales drive ownership; every sales query is recorded.
#[derive(Default)]
pub struct FakeErp {
    pub sales: Vec<SaleSummary>,
    pub items: HashMap<i64, Vec<SaleItem>>,
    pub agreements: HashMap<i64, ClientAgreement>,
    pub receivables: Vec<Receivable>,
    pub fiscal: Vec<FiscalOperation>,
    pub purchase_lines: Vec<PurchaseLine>,
    pub agreement_fails: bool,
    pub sales_filters: Mutex<Vec<SalesFilter>>,
    pub branches_requested: Mutex<Vec<Vec<Branch>>>,
    pub fiscal_ranges: Mutex<Vec<DateRange>>,
}

impl FakeErp {
    pub fn last_sales_filter(&self) -> Option<SalesFilter> {
        self.sales_filters
            .lock()
            .expect("lock should not be poisoned")
            .last()
            .copied()
    }
}

fn down() -> ErpError {
    ErpError::Pool(PoolError::Connect("connection refused".to_owned()))
}

#[async_trait]
impl Erp for FakeErp {
    async fn check(&self) -> Result<(), ErpError> {
        Ok(())
    }

    async fn replacement_costs(
        &self,
        branches: &[Branch],
    ) -> Result<Vec<ReplacementCost>, ErpError> {
        self.branches_requested
            .lock()
            .expect("lock should not be poisoned")
            .push(branches.to_vec());
        Ok(branches
            .iter()
            .map(|b| ReplacementCost {
                codigo: 10,
                descricao: Some("ALFACE".to_owned()),
                f_custo_reposicao: Some(1.25),
                codigo_filial: b.code(),
            })
            .collect())
    }

    async fn stock(&self, _filter: &StockFilter) -> Result<Vec<StockLevel>, ErpError> {
        Ok(Vec::new())
    }

    async fn fiscal_operations(
        &self,
        range: DateRange,
    ) -> Result<Vec<FiscalOperation>, ErpError> {
        self.fiscal_ranges
            .lock()
            .expect("lock should not be poisoned")
            .push(range);
        Ok(self.fiscal.clone())
    }

    async fn client_price_table(
        &self,
        client: i64,
        _branch: Branch,
    ) -> Result<Vec<PriceTableEntry>, ErpError> {
        Ok(vec![PriceTableEntry {
            codigo_produto: 10,
            descricao: Some("ALFACE".to_owned()),
            preco_fixo: Some(3.5),
            f_custo_reposicao: Some(1.25),
            codigo_cliente_convenio: client,
            data_ultima_compra: None,
        }])
    }

    async fn sales_summary(&self, filter: &SalesFilter) -> Result<Vec<SaleSummary>, ErpError> {
        self.sales_filters
            .lock()
            .expect("lock should not be poisoned")
            .push(*filter);
        Ok(self
            .sales
            .iter()
            .filter(|s| filter.client.map_or(true, |c| s.codigo_cliente == Some(c)))
            .filter(|s| filter.scope.map_or(true, |c| s.codigo_cliente == Some(c)))
            .filter(|s| filter.order.map_or(true, |o| s.codigo == o))
            .cloned()
            .collect())
    }

    async fn sale_items(&self, order: i64) -> Result<Vec<SaleItem>, ErpError> {
        Ok(self.items.get(&order).cloned().unwrap_or_default())
    }

    async fn sale_note(&self, order: i64) -> Result<Option<String>, ErpError> {
        Ok(self
            .items
            .contains_key(&order)
            .then(|| "entregar cedo".to_owned()))
    }

    async fn sale_owner(&self, order: i64) -> Result<Option<i64>, ErpError> {
        Ok(self
            .sales
            .iter()
            .find(|s| s.codigo == order)
            .and_then(|s| s.codigo_cliente))
    }

    async fn purchase_lines(
        &self,
        _filter: &PurchaseFilter,
    ) -> Result<Vec<PurchaseLine>, ErpError> {
        Ok(self.purchase_lines.clone())
    }

    async fn purchase_details(
        &self,
        _filter: &PurchaseDetailFilter,
    ) -> Result<Vec<PurchaseDetail>, ErpError> {
        Ok(Vec::new())
    }

    async fn search_clients(&self, _term: &str) -> Result<Vec<ClientMatch>, ErpError> {
        Ok(Vec::new())
    }

    async fn client_addresses(&self) -> Result<Vec<ClientAddress>, ErpError> {
        Ok(Vec::new())
    }

    async fn client_agreement(&self, client: i64) -> Result<Option<ClientAgreement>, ErpError> {
        if self.agreement_fails {
            return Err(down());
        }
        Ok(self.agreements.get(&client).cloned())
    }

    async fn receivables(&self, scope: ReceivableScope) -> Result<Vec<Receivable>, ErpError> {
        Ok(self
            .receivables
            .iter()
            .filter(|r| match scope {
                ReceivableScope::AllOutstanding => true,
                ReceivableScope::ClientOpen(c) => r.codigo_cliente == Some(c),
            })
            .cloned()
            .collect())
    }

    async fn sale_prices(&self, _filter: &PriceFilter) -> Result<Vec<SalePrice>, ErpError> {
        Ok(Vec::new())
    }

    async fn available_products(&self) -> Result<Vec<AvailableProduct>, ErpError> {
        Ok(Vec::new())
    }

    async fn client_top_products(&self, _client: i64) -> Result<Vec<TopProduct>, ErpError> {
        Ok(vec![TopProduct {
            codigo_produto: 10,
            nome_produto: Some("ALFACE".to_owned()),
            quantidade_total: 42.0,
        }])
    }

    async fn search_sales(&self, term: &str) -> Result<Vec<SaleSearchHit>, ErpError> {
        Ok(self
            .sales
            .iter()
            .filter(|s| s.codigo.to_string().contains(term))
            .map(|s| SaleSearchHit {
                codigo: s.codigo,
                nome_cliente: s.nome_cliente.clone(),
                data_orcamento: s.data_orcamento,
            })
            .collect())
    }
}

pub fn sale(codigo: i64, client: i64) -> SaleSummary {
    SaleSummary {
        codigo,
        codigo_cliente: Some(client),
        nome_cliente: Some(format!("CLIENTE {client}")),
        apelido_cliente: None,
        data_orcamento: NaiveDate::from_ymd_opt(2025, 9, 1),
        usuario: Some("BALCAO".to_owned()),
        codigo_vendedor: Some(1),
        codigo_filial: Some(1),
        orcamento_bruto: Some(100.0),
        orcamento_liquido: Some(95.0),
        status: Some("F".to_owned()),
        situacao_entrega: Some("Pendente".to_owned()),
    }
}

pub fn item(sequencia: i64) -> SaleItem {
    SaleItem {
        sequencia: Some(sequencia),
        codigo_produto: Some(10),
        paf_descricao_produto: Some("ALFACE".to_owned()),
        quantidade: 2.0,
        preco_unitario: Some(3.5),
        desconto_valor: 0.0,
        valor_total: Some(7.0),
        custo_reposicao: Some(1.25),
    }
}

pub fn receivable(codigo: i64, client: i64) -> Receivable {
    Receivable {
        codigo,
        codigo_cliente: Some(client),
        nome_cliente: Some(format!("CLIENTE {client}")),
        dav: Some(1000),
        data_emissao: NaiveDate::from_ymd_opt(2025, 9, 1),
        data_vencimento: NaiveDate::from_ymd_opt(2025, 10, 1),
        status: Some("A".to_owned()),
        valor_nominal: Some(95.0),
        valor_aberto: Some(95.0),
        observacao: None,
        codigo_filial: Some(1),
        bloqueto_nossonumero: None,
    }
}

/// A running server plus handles into its state.
pub struct TestApp {
    pub base: String,
    pub http: reqwest::Client,
    pub store: Store,
    pub erp: Arc<FakeErp>,
    pub tokens: Arc<TokenKeys>,
    _shutdown: watch::Sender<bool>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn token(&self, role: Role, permissions: &[&str], client: Option<i64>) -> String {
        self.tokens
            .issue(principal(role, permissions, client))
            .expect("should sign token")
    }

    pub fn get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.http.get(self.url(path)).bearer_auth(token)
    }

    pub fn post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.http.post(self.url(path)).bearer_auth(token)
    }

    pub fn put(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.http.put(self.url(path)).bearer_auth(token)
    }
}

pub fn principal(role: Role, permissions: &[&str], client: Option<i64>) -> Principal {
    Principal {
        username: format!("{role}01"),
        role,
        codigo_cliente: client,
        convenio_desconto: 0.0,
        apelido: None,
        permissions: permissions.iter().map(|p| (*p).to_owned()).collect(),
    }
}

pub async fn spawn(erp: FakeErp) -> TestApp {
    let store = Store::open_in_memory().await.expect("should open store");
    let erp = Arc::new(erp);
    let tokens = Arc::new(TokenKeys::new(SECRET, Duration::from_secs(3600)));
    let state = AppState {
        store: store.clone(),
        erp: erp.clone(),
        tokens: Arc::clone(&tokens),
        geocode: GeocodeService::new(store.clone(), None, chrono::Duration::days(30)),
        rdp: RdpService::new(
            store.clone(),
            Arc::new(LogOnlyFirewall),
            3389,
            chrono::Duration::hours(12),
        ),
        bcrypt_cost: 4,
    };
    let pdf_dir = tempfile::tempdir().expect("should create pdf dir").into_path();
    std::fs::write(pdf_dir.join("catalogo.pdf"), b"%PDF-1.4").expect("should write pdf");
    let config = ServerConfig {
        pdf_dir,
        ..ServerConfig::default()
    };

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let base = format!("http://{}", listener.local_addr().expect("should have addr"));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server::serve(listener, api::router(state, &config), shutdown_rx));

    TestApp {
        base,
        http: reqwest::Client::new(),
        store,
        erp,
        tokens,
        _shutdown: shutdown_tx,
    }
}
