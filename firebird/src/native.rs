//! [`Connector`] for a real Firebird server over the pure-Rust wire client.

use rsfbclient::prelude::*;
use rsfbclient::{FbError, SqlType};

use crate::pool::{Connector, PoolError};
use crate::value::{Row, Value};

/// Character set used for text columns on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// Windows-1252, the ERP's native encoding.
    #[default]
    Win1252,
    /// UTF-8.
    Utf8,
}

impl Charset {
    /// Parse a charset name as written in configuration (`WIN1252`, `UTF8`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().replace(['-', '_'], "").as_str() {
            "WIN1252" => Some(Self::Win1252),
            "UTF8" => Some(Self::Utf8),
            _ => None,
        }
    }
}

/// Server address and credentials.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Server host name or address.
    pub host: String,
    /// Server TCP port (3050 by default).
    pub port: u16,
    /// Database path or alias on the server.
    pub database: String,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Wire character set.
    pub charset: Charset,
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("charset", &self.charset)
            .finish()
    }
}

/// Object-safe view over an rsfbclient connection.
trait WireQuery: Send {
    fn run(&mut self, sql: &str, params: Vec<SqlType>) -> Result<Vec<rsfbclient::Row>, FbError>;
}

impl<Q: Queryable + Send> WireQuery for Q {
    fn run(&mut self, sql: &str, params: Vec<SqlType>) -> Result<Vec<rsfbclient::Row>, FbError> {
        self.query(sql, params)
    }
}

/// An open Firebird attachment.
pub struct FirebirdConnection(Box<dyn WireQuery + Send>);

impl std::fmt::Debug for FirebirdConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FirebirdConnection")
    }
}

/// Opens attachments with the pure-Rust client (no `fbclient` library needed).
#[derive(Debug, Clone)]
pub struct FirebirdConnector {
    options: ConnectOptions,
}

impl FirebirdConnector {
    /// Create a connector for the given server.
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }
}

impl Connector for FirebirdConnector {
    type Connection = FirebirdConnection;

    fn connect(&self) -> Result<FirebirdConnection, PoolError> {
        let o = &self.options;
        let charset = match o.charset {
            Charset::Win1252 => rsfbclient::charset::WIN_1252,
            Charset::Utf8 => rsfbclient::charset::UTF_8,
        };
        let conn = rsfbclient::builder_pure_rust()
            .host(o.host.clone())
            .port(o.port)
            .db_name(o.database.clone())
            .user(o.user.clone())
            .pass(o.password.clone())
            .charset(charset)
            .connect()
            .map_err(|e| PoolError::Connect(e.to_string()))?;
        Ok(FirebirdConnection(Box::new(conn)))
    }

    fn query(
        &self,
        conn: &mut FirebirdConnection,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, PoolError> {
        let params = params.iter().cloned().map(to_wire).collect();
        let rows = conn
            .0
            .run(sql, params)
            .map_err(|e| PoolError::Query(e.to_string()))?;
        Ok(rows.into_iter().map(from_wire_row).collect())
    }
}

fn to_wire(value: Value) -> SqlType {
    match value {
        Value::Null => SqlType::Null,
        Value::Int(v) => SqlType::Integer(v),
        Value::Float(v) => SqlType::Floating(v),
        Value::Text(v) => SqlType::Text(v),
        Value::Timestamp(v) => SqlType::Timestamp(v),
        Value::Bool(v) => SqlType::Boolean(v),
    }
}

#[allow(unreachable_patterns)]
fn from_wire(value: SqlType) -> Value {
    match value {
        SqlType::Null => Value::Null,
        SqlType::Integer(v) => Value::Int(v),
        SqlType::Floating(v) => Value::Float(v),
        SqlType::Text(v) => Value::Text(v),
        SqlType::Timestamp(v) => Value::Timestamp(v),
        SqlType::Boolean(v) => Value::Bool(v),
        SqlType::Binary(bytes) => Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
        _ => Value::Null,
    }
}

fn from_wire_row(row: rsfbclient::Row) -> Row {
    Row::new(
        row.cols
            .into_iter()
            .map(|col| (col.name, from_wire(col.value)))
            .collect(),
    )
}
