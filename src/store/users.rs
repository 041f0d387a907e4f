//! Login accounts.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use tracing::warn;

use super::{Store, StoreError};
use crate::auth::Role;

/// A stored account including its password hash.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Row id.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// bcrypt hash.
    pub password_hash: String,
    /// Coarse role.
    pub role: Role,
    /// ERP client code for portal accounts.
    pub codigo_cliente: Option<i64>,
    /// Granted permission names.
    pub permissions: Vec<String>,
}

/// An account as listed to administrators; never carries the hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// Row id.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Coarse role.
    pub role: Role,
    /// ERP client code.
    pub codigo_cliente: Option<i64>,
    /// Granted permission names.
    pub permissions: Vec<String>,
}

impl From<UserRecord> for UserSummary {
    fn from(u: UserRecord) -> Self {
        Self {
            id: u.id,
            username: u.username,
            role: u.role,
            codigo_cliente: u.codigo_cliente,
            permissions: u.permissions,
        }
    }
}

/// Fields for a new account. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login name.
    pub username: String,
    /// bcrypt hash.
    pub password_hash: String,
    /// Coarse role.
    pub role: Role,
    /// ERP client code.
    pub codigo_cliente: Option<i64>,
    /// Granted permission names.
    pub permissions: Vec<String>,
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    /// New role.
    pub role: Option<Role>,
    /// New bcrypt hash.
    pub password_hash: Option<String>,
    /// New client code; `Some(None)` clears it.
    pub codigo_cliente: Option<Option<i64>>,
    /// Replacement permission list.
    pub permissions: Option<Vec<String>>,
}

impl UserPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.password_hash.is_none()
            && self.codigo_cliente.is_none()
            && self.permissions.is_none()
    }
}

type UserRow = (i64, String, String, String, Option<i64>, Option<String>);

fn user_from_row(row: UserRow) -> Result<UserRecord, StoreError> {
    let (id, username, password_hash, role, codigo_cliente, permissions) = row;
    let role = Role::parse(&role).ok_or_else(|| StoreError::Corrupt {
        table: "users",
        column: "role",
        value: role.clone(),
    })?;
    let permissions = decode_permissions(&username, permissions.as_deref());
    Ok(UserRecord {
        id,
        username,
        password_hash,
        role,
        codigo_cliente,
        permissions,
    })
}

/// Malformed permission JSON reads as no permissions.
fn decode_permissions(username: &str, raw: Option<&str>) -> Vec<String> {
    match raw {
        None => Vec::new(),
        Some(text) => serde_json::from_str(text).unwrap_or_else(|e| {
            warn!(username, error = %e, "ignoring malformed permissions");
            Vec::new()
        }),
    }
}

fn encode_permissions(permissions: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(permissions).map_err(|e| StoreError::Invalid(e.to_string()))
}

const USER_COLUMNS: &str = "id, username, password, role, codigoCliente, permissions";

impl Store {
    /// Look up an account by login name.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored role is unknown.
    pub async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        row.map(user_from_row).transpose()
    }

    /// All accounts ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|row| user_from_row(row).map(UserSummary::from))
            .collect()
    }

    /// Insert an account and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the username is taken.
    pub async fn create_user(&self, user: &NewUser) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (username, password, role, codigoCliente, permissions)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.codigo_cliente)
        .bind(encode_permissions(&user.permissions)?)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::conflict_on_unique(e, "Nome de usuário já existe."))?;
        Ok(result.last_insert_rowid())
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for an empty patch and
    /// [`StoreError::NotFound`] when no account has this id.
    pub async fn update_user(&self, id: i64, patch: UserPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Err(StoreError::Invalid(
                "Nenhum campo para atualizar fornecido.".to_owned(),
            ));
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE users SET ");
        let mut fields = qb.separated(", ");
        if let Some(role) = patch.role {
            fields.push("role = ").push_bind_unseparated(role.as_str());
        }
        if let Some(hash) = patch.password_hash {
            fields.push("password = ").push_bind_unseparated(hash);
        }
        if let Some(codigo) = patch.codigo_cliente {
            fields.push("codigoCliente = ").push_bind_unseparated(codigo);
        }
        if let Some(permissions) = patch.permissions {
            fields
                .push("permissions = ")
                .push_bind_unseparated(encode_permissions(&permissions)?);
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Usuário não encontrado.".to_owned()));
        }
        Ok(())
    }

    /// Delete an account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no account has this id.
    pub async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Usuário não encontrado.".to_owned()));
        }
        Ok(())
    }
}
