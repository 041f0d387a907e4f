//! Typed access to the legacy ERP.
//!
//! Handlers talk to the [`Erp`] trait and never see SQL. [`FirebirdErp`]
//! is the production implementation; tests substitute an in-process fake.
//! Records serialize with the ERP's upper-case column names, which is the
//! wire contract the web client expects.

mod catalog;
mod firebird;
mod fiscal;
mod model;
mod purchasing;

use async_trait::async_trait;
use feira_firebird::{PoolError, RowError};

pub use catalog::{group_name, section_name};
pub use firebird::FirebirdErp;
pub use fiscal::{split_by_cfop, FiscalClosing};
pub use model::*;
pub use purchasing::{pivot_by_delivery_date, PurchasePivot, PurchasePivotRow, UNKNOWN_DATE};

/// Errors from ERP queries.
#[derive(Debug, thiserror::Error)]
pub enum ErpError {
    /// Connection or statement failure.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A result row did not have the expected shape.
    #[error("unexpected ERP row: {0}")]
    Row(#[from] RowError),
}

/// Read-only queries against the ERP.
#[async_trait]
pub trait Erp: Send + Sync {
    /// Open a connection to prove the ERP is reachable.
    async fn check(&self) -> Result<(), ErpError>;

    /// Products with a replacement cost in any of `branches`, by code.
    async fn replacement_costs(&self, branches: &[Branch])
        -> Result<Vec<ReplacementCost>, ErpError>;

    /// Stock per product and branch.
    async fn stock(&self, filter: &StockFilter) -> Result<Vec<StockLevel>, ErpError>;

    /// Fiscal operations dated within `range`, entries and outputs mixed.
    async fn fiscal_operations(&self, range: DateRange)
        -> Result<Vec<FiscalOperation>, ErpError>;

    /// A client's agreement price table in one branch.
    async fn client_price_table(
        &self,
        client: i64,
        branch: Branch,
    ) -> Result<Vec<PriceTableEntry>, ErpError>;

    /// Orders, newest first.
    async fn sales_summary(&self, filter: &SalesFilter) -> Result<Vec<SaleSummary>, ErpError>;

    /// Lines of one order, by sequence.
    async fn sale_items(&self, order: i64) -> Result<Vec<SaleItem>, ErpError>;

    /// Free-text note of one order.
    async fn sale_note(&self, order: i64) -> Result<Option<String>, ErpError>;

    /// Client code of one order; `None` when the order does not exist.
    async fn sale_owner(&self, order: i64) -> Result<Option<i64>, ErpError>;

    /// Order lines due for delivery within a date range.
    async fn purchase_lines(&self, filter: &PurchaseFilter)
        -> Result<Vec<PurchaseLine>, ErpError>;

    /// Per-order breakdown of one product's pending deliveries.
    async fn purchase_details(
        &self,
        filter: &PurchaseDetailFilter,
    ) -> Result<Vec<PurchaseDetail>, ErpError>;

    /// Clients whose code, name, legal name or CNPJ contains `term`.
    async fn search_clients(&self, term: &str) -> Result<Vec<ClientMatch>, ErpError>;

    /// Clients with a usable address, delivery address preferred.
    async fn client_addresses(&self) -> Result<Vec<ClientAddress>, ErpError>;

    /// Agreement discount and alias of a client.
    async fn client_agreement(&self, client: i64) -> Result<Option<ClientAgreement>, ErpError>;

    /// Receivable titles.
    async fn receivables(&self, scope: ReceivableScope) -> Result<Vec<Receivable>, ErpError>;

    /// Active products with cost and sale price.
    async fn sale_prices(&self, filter: &PriceFilter) -> Result<Vec<SalePrice>, ErpError>;

    /// Produce offered in the client portal.
    async fn available_products(&self) -> Result<Vec<AvailableProduct>, ErpError>;

    /// A client's ten most bought products.
    async fn client_top_products(&self, client: i64) -> Result<Vec<TopProduct>, ErpError>;

    /// First ten orders whose code contains `term`.
    async fn search_sales(&self, term: &str) -> Result<Vec<SaleSearchHit>, ErpError>;
}
