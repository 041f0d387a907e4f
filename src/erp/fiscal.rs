//! Fiscal closing: partition operations into entries and outputs by CFOP.

use serde::Serialize;

use super::FiscalOperation;

/// Operations of a period split by direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FiscalClosing {
    /// Outputs: CFOP starting with 5, 6 or 7.
    pub saidas: Vec<FiscalOperation>,
    /// Entries: CFOP starting with 1, 2 or 3.
    pub entradas: Vec<FiscalOperation>,
}

/// Split operations by the first digit of their CFOP.
///
/// Operations without a CFOP or with any other first digit are dropped.
/// Input order is kept within each side.
pub fn split_by_cfop(operations: Vec<FiscalOperation>) -> FiscalClosing {
    let mut closing = FiscalClosing::default();
    for op in operations {
        match op.cfop.as_deref().and_then(|c| c.trim().chars().next()) {
            Some('1' | '2' | '3') => closing.entradas.push(op),
            Some('5' | '6' | '7') => closing.saidas.push(op),
            _ => {}
        }
    }
    closing
}
