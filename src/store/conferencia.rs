//! Per-order conferência (checked) flags.

use std::collections::BTreeMap;

use sqlx::{QueryBuilder, Sqlite};

use super::{now_text, Store, StoreError};

/// Result of flipping an order's flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    /// Flag after the toggle.
    pub conferido: bool,
    /// Whether the row was created by this call.
    pub created: bool,
}

/// Keeps each `IN (...)` well under SQLite's bound-parameter limit.
const STATUS_CHUNK: usize = 500;

impl Store {
    /// Flip the conferência flag of an order.
    ///
    /// An order without a row becomes checked. Checking stamps the time;
    /// unchecking clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn toggle_conferencia(&self, dav: i64) -> Result<ToggleOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(i64,)> =
            sqlx::query_as("SELECT conferido FROM vendas_conferencia WHERE dav_codigo = ?1")
                .bind(dav)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match current {
            None => {
                sqlx::query(
                    "INSERT INTO vendas_conferencia (dav_codigo, conferido, data_conferencia)
                     VALUES (?1, 1, ?2)",
                )
                .bind(dav)
                .bind(now_text())
                .execute(&mut *tx)
                .await?;
                ToggleOutcome {
                    conferido: true,
                    created: true,
                }
            }
            Some((flag,)) => {
                let conferido = flag == 0;
                let stamped = conferido.then(now_text);
                sqlx::query(
                    "UPDATE vendas_conferencia SET conferido = ?1, data_conferencia = ?2
                     WHERE dav_codigo = ?3",
                )
                .bind(i64::from(conferido))
                .bind(stamped)
                .bind(dav)
                .execute(&mut *tx)
                .await?;
                ToggleOutcome {
                    conferido,
                    created: false,
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Flags for the given orders; orders without a row are omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn conferencia_statuses(
        &self,
        davs: &[i64],
    ) -> Result<BTreeMap<i64, i64>, StoreError> {
        let mut statuses = BTreeMap::new();
        for chunk in davs.chunks(STATUS_CHUNK) {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "SELECT dav_codigo, conferido FROM vendas_conferencia WHERE dav_codigo IN (",
            );
            let mut ids = qb.separated(", ");
            for dav in chunk {
                ids.push_bind(*dav);
            }
            ids.push_unseparated(")");

            let rows: Vec<(i64, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
            statuses.extend(rows);
        }
        Ok(statuses)
    }
}
