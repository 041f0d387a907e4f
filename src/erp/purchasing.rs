//! Purchase planning grid: products down, delivery dates across.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::PurchaseLine;

/// Column key for lines without an expected delivery date.
pub const UNKNOWN_DATE: &str = "Data Desconhecida";

/// One product row of the grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchasePivotRow {
    /// Product code.
    #[serde(rename = "CODIGO_PRODUTO")]
    pub codigo_produto: i64,
    /// Description from the first line seen.
    #[serde(rename = "PAF_DESCRICAO_PRODUTO")]
    pub paf_descricao_produto: Option<String>,
    /// Purchase unit fraction.
    #[serde(rename = "FRACAO_COMPRA3")]
    pub fracao_compra3: Option<f64>,
    /// Replacement cost.
    #[serde(rename = "F_CUSTO_REPOSICAO")]
    pub f_custo_reposicao: Option<f64>,
    /// Quantity summed per date key.
    #[serde(rename = "quantidadesPorData")]
    pub quantidades_por_data: BTreeMap<String, f64>,
}

/// The grid plus its sorted column keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PurchasePivot {
    /// Product rows in first-seen order.
    pub data: Vec<PurchasePivotRow>,
    /// Distinct date keys, ascending.
    pub datas: Vec<String>,
}

/// Sum quantities per product and delivery day.
///
/// Dates are keyed as `YYYY-MM-DD`; lines without a date go under
/// [`UNKNOWN_DATE`], which sorts after every real date.
pub fn pivot_by_delivery_date(lines: Vec<PurchaseLine>) -> PurchasePivot {
    let mut rows: Vec<PurchasePivotRow> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();
    let mut dates = BTreeSet::new();

    for line in lines {
        let key = line
            .data_previsao_entrega
            .map_or_else(|| UNKNOWN_DATE.to_owned(), |d| d.format("%Y-%m-%d").to_string());
        dates.insert(key.clone());

        let slot = *index.entry(line.codigo_produto).or_insert_with(|| {
            rows.push(PurchasePivotRow {
                codigo_produto: line.codigo_produto,
                paf_descricao_produto: line.paf_descricao_produto.clone(),
                fracao_compra3: line.fracao_compra3,
                f_custo_reposicao: line.f_custo_reposicao,
                quantidades_por_data: BTreeMap::new(),
            });
            rows.len().saturating_sub(1)
        });
        if let Some(row) = rows.get_mut(slot) {
            *row.quantidades_por_data.entry(key).or_insert(0.0) += line.quantidade;
        }
    }

    PurchasePivot {
        data: rows,
        datas: dates.into_iter().collect(),
    }
}
