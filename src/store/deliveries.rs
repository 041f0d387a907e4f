//! Couriers, deliveries and returnable-crate balances.
//!
//! A client's crate balance goes down by `caixasSaida - caixasRetorno` for
//! each delivery. Saving a delivery again applies only the difference from
//! its previous numbers, so the balance always equals the negated sum over
//! the client's current delivery rows. Moving a delivery to another client
//! gives the previous client its crates back.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{now_text, Store, StoreError};

/// A delivery driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Courier {
    /// Row id.
    pub id: i64,
    /// Unique name.
    pub nome: String,
}

/// A stored delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    /// Row id, stable across saves.
    pub id: i64,
    /// ERP order (DAV) code.
    pub venda_id: i64,
    /// Client whose balance the delivery counts against; null for rows
    /// saved before the client was recorded.
    pub codigo_cliente: Option<i64>,
    /// Courier row id.
    pub entregador_id: Option<i64>,
    /// Crates sent out with the order.
    pub caixas_saida: i64,
    /// Crates brought back.
    pub caixas_retorno: i64,
    /// Who checked the delivery.
    pub conferido_por: Option<String>,
    /// When it was last saved.
    pub data_conferencia: Option<String>,
}

/// Delivery data submitted for saving.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInput {
    /// ERP order (DAV) code.
    pub venda_id: i64,
    /// Client whose crate balance is adjusted.
    pub codigo_cliente: i64,
    /// Courier row id.
    #[serde(default)]
    pub entregador_id: Option<i64>,
    /// Crates sent out.
    #[serde(default)]
    pub caixas_saida: i64,
    /// Crates brought back.
    #[serde(default)]
    pub caixas_retorno: i64,
    /// Who checked the delivery.
    #[serde(default)]
    pub conferido_por: Option<String>,
}

/// Effect of a save on the client's crate balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// Net crates out charged to the client by this save. When the
    /// delivery moved from another client this is the full new value.
    pub change: i64,
    /// Client balance after the save.
    pub balance: i64,
}

/// A client's crate balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrateBalance {
    /// ERP client code.
    pub codigo_cliente: i64,
    /// Crates owed back (negative) or credited (positive).
    pub quantidade: i64,
}

type DeliveryRow = (
    i64,
    i64,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<String>,
    Option<String>,
);

fn delivery_from_row(row: DeliveryRow) -> DeliveryRecord {
    let (id, venda_id, codigo_cliente, entregador_id, saida, retorno, conferido_por, data_conferencia) =
        row;
    DeliveryRecord {
        id,
        venda_id,
        codigo_cliente,
        entregador_id,
        caixas_saida: saida.unwrap_or(0),
        caixas_retorno: retorno.unwrap_or(0),
        conferido_por,
        data_conferencia,
    }
}

fn overflow() -> StoreError {
    StoreError::Invalid("quantidade de caixas fora do intervalo".to_owned())
}

fn net_out(saida: i64, retorno: i64) -> Result<i64, StoreError> {
    saida.checked_sub(retorno).ok_or_else(overflow)
}

impl Store {
    /// Couriers ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn list_couriers(&self) -> Result<Vec<Courier>, StoreError> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, nome FROM entregadores ORDER BY nome")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, nome)| Courier { id, nome })
            .collect())
    }

    /// Add a courier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a blank name and
    /// [`StoreError::Conflict`] when the name exists.
    pub async fn create_courier(&self, nome: &str) -> Result<Courier, StoreError> {
        let nome = nome.trim();
        if nome.is_empty() {
            return Err(StoreError::Invalid(
                "O nome do entregador é obrigatório.".to_owned(),
            ));
        }
        let result = sqlx::query("INSERT INTO entregadores (nome) VALUES (?1)")
            .bind(nome)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::conflict_on_unique(e, "Já existe um entregador com este nome."))?;
        Ok(Courier {
            id: result.last_insert_rowid(),
            nome: nome.to_owned(),
        })
    }

    /// Deliveries for the given orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn deliveries_for(&self, venda_ids: &[i64]) -> Result<Vec<DeliveryRecord>, StoreError> {
        let mut records = Vec::with_capacity(venda_ids.len());
        for chunk in venda_ids.chunks(500) {
            let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
                "SELECT id, vendaId, codigoCliente, entregadorId, caixasSaida, caixasRetorno, conferidoPor,
                        dataConferencia
                 FROM entregas WHERE vendaId IN (",
            );
            let mut ids = qb.separated(", ");
            for id in chunk {
                ids.push_bind(*id);
            }
            ids.push_unseparated(")");
            let rows: Vec<DeliveryRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            records.extend(rows.into_iter().map(delivery_from_row));
        }
        Ok(records)
    }

    /// All deliveries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn list_deliveries(&self) -> Result<Vec<DeliveryRecord>, StoreError> {
        let rows: Vec<DeliveryRow> = sqlx::query_as(
            "SELECT id, vendaId, codigoCliente, entregadorId, caixasSaida, caixasRetorno, conferidoPor,
                    dataConferencia
             FROM entregas ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(delivery_from_row).collect())
    }

    /// Save a delivery and reconcile crate balances atomically.
    ///
    /// When the delivery was last saved under another client, that client
    /// is credited its previous net and the new client is charged in full.
    /// Rows without a recorded client count as the same client. Any
    /// failure rolls the whole save back: the transaction is dropped
    /// without commit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for an unknown courier or negative
    /// crate counts, or a database error.
    pub async fn save_delivery(
        &self,
        input: &DeliveryInput,
    ) -> Result<ReconcileOutcome, StoreError> {
        if input.caixas_saida < 0 || input.caixas_retorno < 0 {
            return Err(StoreError::Invalid(
                "quantidade de caixas não pode ser negativa".to_owned(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let previous: Option<(Option<i64>, Option<i64>, Option<i64>)> = sqlx::query_as(
            "SELECT codigoCliente, caixasSaida, caixasRetorno FROM entregas WHERE vendaId = ?1",
        )
        .bind(input.venda_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (previous_client, old) = match previous {
            Some((client, saida, retorno)) => {
                (client, net_out(saida.unwrap_or(0), retorno.unwrap_or(0))?)
            }
            None => (None, 0),
        };
        let moved_from = previous_client.filter(|c| *c != input.codigo_cliente);
        let new = net_out(input.caixas_saida, input.caixas_retorno)?;
        let change = match moved_from {
            Some(_) => new,
            None => new.checked_sub(old).ok_or_else(overflow)?,
        };

        sqlx::query(
            "INSERT INTO entregas
                (vendaId, codigoCliente, entregadorId, caixasSaida, caixasRetorno, conferidoPor,
                 dataConferencia)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(vendaId) DO UPDATE SET
                codigoCliente = excluded.codigoCliente,
                entregadorId = excluded.entregadorId,
                caixasSaida = excluded.caixasSaida,
                caixasRetorno = excluded.caixasRetorno,
                conferidoPor = excluded.conferidoPor,
                dataConferencia = excluded.dataConferencia",
        )
        .bind(input.venda_id)
        .bind(input.codigo_cliente)
        .bind(input.entregador_id)
        .bind(input.caixas_saida)
        .bind(input.caixas_retorno)
        .bind(input.conferido_por.as_deref())
        .bind(now_text())
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::Invalid("Entregador não encontrado.".to_owned())
            }
            _ => StoreError::Database(e),
        })?;

        if let Some(previous_client) = moved_from {
            if old != 0 {
                sqlx::query(
                    "UPDATE caixas_cliente SET quantidade = quantidade + ?1 WHERE codigoCliente = ?2",
                )
                .bind(old)
                .bind(previous_client)
                .execute(&mut *tx)
                .await?;
            }
            info!(
                venda_id = input.venda_id,
                from = previous_client,
                to = input.codigo_cliente,
                credited = old,
                "delivery moved to another client"
            );
        }

        sqlx::query("INSERT OR IGNORE INTO caixas_cliente (codigoCliente, quantidade) VALUES (?1, 0)")
            .bind(input.codigo_cliente)
            .execute(&mut *tx)
            .await?;

        if change != 0 {
            sqlx::query(
                "UPDATE caixas_cliente SET quantidade = quantidade - ?1 WHERE codigoCliente = ?2",
            )
            .bind(change)
            .bind(input.codigo_cliente)
            .execute(&mut *tx)
            .await?;
        }

        let (balance,): (i64,) =
            sqlx::query_as("SELECT quantidade FROM caixas_cliente WHERE codigoCliente = ?1")
                .bind(input.codigo_cliente)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        if change == 0 {
            debug!(venda_id = input.venda_id, "delivery saved, crate balance unchanged");
        } else {
            info!(
                venda_id = input.venda_id,
                codigo_cliente = input.codigo_cliente,
                change,
                balance,
                "delivery saved, crate balance adjusted"
            );
        }
        Ok(ReconcileOutcome { change, balance })
    }

    /// A client's crate balance; zero when no delivery was ever saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn crate_balance(&self, codigo_cliente: i64) -> Result<CrateBalance, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT quantidade FROM caixas_cliente WHERE codigoCliente = ?1")
                .bind(codigo_cliente)
                .fetch_optional(&self.pool)
                .await?;
        Ok(CrateBalance {
            codigo_cliente,
            quantidade: row.map_or(0, |(q,)| q),
        })
    }
}
