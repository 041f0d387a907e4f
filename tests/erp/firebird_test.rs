//! `FirebirdErp` against a scripted connector: row mapping and the
//! parameters each query binds.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use feira::erp::{
    Branch, DateRange, Erp, ErpError, FirebirdErp, PriceFilter, ReceivableScope, StockFilter,
};
use feira_firebird::{Connector, Pool, PoolError, Row, Value};

type Calls = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

/// Records every statement and answers with the same canned rows.
struct Scripted {
    calls: Calls,
    rows: Vec<Row>,
}

impl Connector for Scripted {
    type Connection = ();

    fn connect(&self) -> Result<(), PoolError> {
        Ok(())
    }

    fn query(&self, _conn: &mut (), sql: &str, params: &[Value]) -> Result<Vec<Row>, PoolError> {
        self.calls
            .lock()
            .expect("calls lock should not be poisoned")
            .push((sql.to_owned(), params.to_vec()));
        Ok(self.rows.clone())
    }
}

fn erp_with(rows: Vec<Row>) -> (FirebirdErp<Scripted>, Calls) {
    let calls = Calls::default();
    let connector = Scripted {
        calls: Arc::clone(&calls),
        rows,
    };
    let pool = Pool::new(connector, 1).expect("pool should build");
    (FirebirdErp::new(pool), calls)
}

/// A row with every column in `names`, null unless given in `set`.
fn row(names: &[&str], set: Vec<(&str, Value)>) -> Row {
    Row::from_pairs(names.iter().map(|name| {
        let value = set
            .iter()
            .find(|(column, _)| column == name)
            .map_or(Value::Null, |(_, v)| v.clone());
        (*name, value)
    }))
}

const STOCK_COLUMNS: [&str; 8] = [
    "CODIGO_PRODUTO",
    "DESCRICAO",
    "ESTOQUE",
    "TIPO_ESTOQUE",
    "CODIGO_FORNECEDOR",
    "FORNECEDOR",
    "COD_SECAO",
    "COD_GRUPO",
];

const PRICE_COLUMNS: [&str; 7] = [
    "CODIGO",
    "DESCRICAO",
    "COD_SECAO",
    "COD_GRUPO",
    "F_CUSTO_REPOSICAO",
    "PRECO_VENDA",
    "CODIGO_FILIAL",
];

const RECEIVABLE_COLUMNS: [&str; 12] = [
    "CODIGO",
    "CODIGO_CLIENTE",
    "NOME_CLIENTE",
    "DAV",
    "DATA_EMISSAO",
    "DATA_VENCIMENTO",
    "STATUS",
    "VALOR_NOMINAL",
    "VALOR_ABERTO",
    "OBSERVACAO",
    "CODIGO_FILIAL",
    "BLOQUETO_NOSSONUMERO",
];

fn last_call(calls: &Calls) -> (String, Vec<Value>) {
    calls
        .lock()
        .expect("calls lock should not be poisoned")
        .last()
        .cloned()
        .expect("a query should have been issued")
}

#[tokio::test]
async fn stock_labels_branch_and_filters_by_it() {
    let (erp, calls) = erp_with(vec![
        row(
            &STOCK_COLUMNS,
            vec![
                ("CODIGO_PRODUTO", Value::Int(10)),
                ("DESCRICAO", Value::from("ALFACE")),
                ("ESTOQUE", Value::Float(-3.0)),
                ("TIPO_ESTOQUE", Value::Int(1)),
            ],
        ),
        row(
            &STOCK_COLUMNS,
            vec![
                ("CODIGO_PRODUTO", Value::Int(11)),
                ("TIPO_ESTOQUE", Value::Int(2)),
            ],
        ),
    ]);

    let stock = erp
        .stock(&StockFilter {
            branch: Some(Branch::Filial),
            only_negative: true,
            ..StockFilter::default()
        })
        .await
        .expect("stock should load");

    assert_eq!(stock[0].tipo_estoque, "Matriz");
    assert_eq!(stock[0].estoque, -3.0);
    assert_eq!(stock[1].tipo_estoque, "Filial");
    assert_eq!(stock[1].estoque, 0.0);
    assert_eq!(stock[1].descricao, None);

    let (sql, params) = last_call(&calls);
    assert!(sql.contains("PP.CODIGO_FILIAL = ?"));
    assert!(sql.contains("< 0"));
    assert_eq!(params, vec![Value::Int(2)]);
}

#[tokio::test]
async fn sale_prices_name_sections_and_upper_case_the_description() {
    let (erp, calls) = erp_with(vec![row(
        &PRICE_COLUMNS,
        vec![
            ("CODIGO", Value::Int(7)),
            ("DESCRICAO", Value::from("TOMATE")),
            ("COD_SECAO", Value::Int(6)),
            ("COD_GRUPO", Value::Int(99)),
            ("PRECO_VENDA", Value::Float(4.5)),
        ],
    )]);

    let prices = erp
        .sale_prices(&PriceFilter {
            description: Some(" tomate ".to_owned()),
            section: Some(6),
            ..PriceFilter::default()
        })
        .await
        .expect("prices should load");

    assert_eq!(prices[0].secao_descricao, "Hortifruti");
    assert_eq!(prices[0].grupo_descricao, "Desconhecido");
    assert_eq!(prices[0].preco_venda, Some(4.5));

    let (sql, params) = last_call(&calls);
    assert!(sql.ends_with("ORDER BY P.DESCRICAO"));
    assert_eq!(params, vec![Value::from("%TOMATE%"), Value::Int(6)]);
}

#[tokio::test]
async fn blank_description_adds_no_condition() {
    let (erp, calls) = erp_with(Vec::new());
    erp.sale_prices(&PriceFilter {
        description: Some("   ".to_owned()),
        ..PriceFilter::default()
    })
    .await
    .expect("prices should load");

    let (sql, params) = last_call(&calls);
    assert!(!sql.contains("LIKE"));
    assert!(params.is_empty());
}

#[tokio::test]
async fn client_receivables_bind_the_client_and_keep_open_titles() {
    let due = NaiveDate::from_ymd_opt(2025, 10, 5).expect("valid date");
    let (erp, calls) = erp_with(vec![row(
        &RECEIVABLE_COLUMNS,
        vec![
            ("CODIGO", Value::Int(501)),
            ("CODIGO_CLIENTE", Value::Int(42)),
            ("STATUS", Value::from("A")),
            ("VALOR_ABERTO", Value::Float(120.0)),
            ("DATA_VENCIMENTO", Value::from(due)),
        ],
    )]);

    let titles = erp
        .receivables(ReceivableScope::ClientOpen(42))
        .await
        .expect("receivables should load");

    assert_eq!(titles.len(), 1);
    assert_eq!(titles[0].codigo_cliente, Some(42));
    assert_eq!(titles[0].data_vencimento, Some(due));

    let (sql, params) = last_call(&calls);
    assert!(sql.contains("CR.STATUS = 'A'"));
    assert!(sql.ends_with("ASC"));
    assert_eq!(params, vec![Value::Int(42)]);
}

#[tokio::test]
async fn outstanding_receivables_bind_nothing() {
    let (erp, calls) = erp_with(Vec::new());
    erp.receivables(ReceivableScope::AllOutstanding)
        .await
        .expect("receivables should load");

    let (sql, params) = last_call(&calls);
    assert!(sql.contains("IN ('A', 'P')"));
    assert!(params.is_empty());
}

#[tokio::test]
async fn fiscal_range_covers_the_whole_last_day() {
    let (erp, calls) = erp_with(Vec::new());
    let start = NaiveDate::from_ymd_opt(2025, 9, 1).expect("valid date");
    let end = NaiveDate::from_ymd_opt(2025, 9, 30).expect("valid date");

    erp.fiscal_operations(DateRange { start, end })
        .await
        .expect("fiscal operations should load");

    let (_, params) = last_call(&calls);
    assert_eq!(
        params,
        vec![
            Value::from(start.and_hms_opt(0, 0, 0).expect("valid time")),
            Value::from(end.and_hms_opt(23, 59, 59).expect("valid time")),
        ]
    );
}

#[tokio::test]
async fn missing_agreement_is_none_and_discount_defaults_to_zero() {
    let (erp, _) = erp_with(Vec::new());
    assert_eq!(
        erp.client_agreement(42).await.expect("agreement should load"),
        None
    );

    let (erp, _) = erp_with(vec![Row::from_pairs([
        ("CONVENIO_DESCONTO", Value::Null),
        ("APELIDO", Value::from("Mercado Central")),
    ])]);
    let agreement = erp
        .client_agreement(42)
        .await
        .expect("agreement should load")
        .expect("agreement should exist");
    assert_eq!(agreement.convenio_desconto, 0.0);
    assert_eq!(agreement.apelido.as_deref(), Some("Mercado Central"));
}

#[tokio::test]
async fn replacement_costs_skip_the_query_without_branches() {
    let (erp, calls) = erp_with(Vec::new());
    let costs = erp
        .replacement_costs(&[])
        .await
        .expect("empty branch list should succeed");
    assert!(costs.is_empty());
    assert!(calls
        .lock()
        .expect("calls lock should not be poisoned")
        .is_empty());
}

#[tokio::test]
async fn schema_drift_surfaces_as_row_error() {
    let (erp, _) = erp_with(vec![Row::from_pairs([(
        "CODIGO",
        Value::from("not a number"),
    )])]);

    let result = erp.replacement_costs(&[Branch::Matriz]).await;
    assert!(matches!(result, Err(ErpError::Row(_))));
}
