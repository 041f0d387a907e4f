//! Authentication and authorization.
//!
//! A caller is identified by a signed token carrying a [`Principal`]: the
//! username, a coarse [`Role`] and a list of fine-grained permission names.
//! Handlers gate access with the `require_*` checks on [`Principal`]; every
//! denial is logged with the caller's name and role.

pub mod password;
pub mod token;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use password::{hash_password, verify_password, PasswordError};
pub use token::{parse_ttl, Claims, TokenError, TokenKeys};

/// Coarse user role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Back-office administrator.
    Admin,
    /// Back-office staff, gated by permissions.
    User,
    /// External client using the portal.
    Cliente,
}

impl Role {
    /// Stored and wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Cliente => "cliente",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            "cliente" => Some(Self::Cliente),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named capability checked by back-office endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Product replacement costs.
    ViewCustoReposicao,
    /// Stock levels, including negative stock.
    ViewEstoqueNegativo,
    /// Client agreement price tables.
    ViewTabelaPrecos,
    /// Sales summaries, order items, conferência and deliveries.
    ViewResumoVendas,
    /// Purchase planning.
    ViewPedidoCompras,
    /// Client search, addresses and geocoding.
    ViewMapaClientes,
    /// Fiscal closing.
    ViewFechamentoFiscal,
    /// Receivables.
    ViewFinanceiro,
    /// Temporary RDP access.
    ViewLiberarRdp,
    /// Delivery management.
    ManageEntregas,
}

impl Permission {
    /// Every permission, in display order.
    pub const ALL: [Self; 10] = [
        Self::ViewCustoReposicao,
        Self::ViewEstoqueNegativo,
        Self::ViewTabelaPrecos,
        Self::ViewResumoVendas,
        Self::ViewPedidoCompras,
        Self::ViewMapaClientes,
        Self::ViewFechamentoFiscal,
        Self::ViewFinanceiro,
        Self::ViewLiberarRdp,
        Self::ManageEntregas,
    ];

    /// Name as stored in permission lists.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewCustoReposicao => "VIEW_CUSTO_REPOSICAO",
            Self::ViewEstoqueNegativo => "VIEW_ESTOQUE_NEGATIVO",
            Self::ViewTabelaPrecos => "VIEW_TABELA_PRECOS",
            Self::ViewResumoVendas => "VIEW_RESUMO_VENDAS",
            Self::ViewPedidoCompras => "VIEW_PEDIDO_COMPRAS",
            Self::ViewMapaClientes => "VIEW_MAPA_CLIENTES",
            Self::ViewFechamentoFiscal => "VIEW_FECHAMENTO_FISCAL",
            Self::ViewFinanceiro => "VIEW_FINANCEIRO",
            Self::ViewLiberarRdp => "VIEW_LIBERAR_RDP",
            Self::ManageEntregas => "MANAGE_ENTREGAS",
        }
    }

    /// Parse a stored permission name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an authenticated caller was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    /// Endpoint is restricted to administrators.
    #[error("Acesso restrito: apenas administradores.")]
    AdminOnly,

    /// Endpoint is restricted to the client portal.
    #[error("Acesso restrito: apenas clientes.")]
    ClientOnly,

    /// Caller has the client role but no client code attached.
    #[error("Usuário não está associado a um cliente.")]
    NoClientCode,

    /// None of the required permissions is granted.
    #[error("Acesso negado: Você não tem permissão para acessar este recurso.")]
    MissingPermission(Vec<Permission>),

    /// Caller tried to read another client's data.
    #[error("Acesso negado: Você só pode acessar dados do seu próprio cliente.")]
    ForeignClient,
}

/// The identity carried inside a token and returned at login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Login name.
    pub username: String,
    /// Coarse role.
    pub role: Role,
    /// ERP client code for portal users.
    #[serde(default)]
    pub codigo_cliente: Option<i64>,
    /// Agreement discount for portal users.
    #[serde(default)]
    pub convenio_desconto: f64,
    /// Client alias for portal users.
    #[serde(default)]
    pub apelido: Option<String>,
    /// Granted permission names. Unknown names are kept and ignored.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Principal {
    /// Whether the permission list contains `permission`.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.iter().any(|p| p == permission.as_str())
    }

    /// Allow administrators only.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::AdminOnly`] for any other role.
    pub fn require_admin(&self) -> Result<(), AccessDenied> {
        if self.role == Role::Admin {
            return Ok(());
        }
        self.deny(AccessDenied::AdminOnly)
    }

    /// Allow portal clients and administrators.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::ClientOnly`] for back-office users.
    pub fn require_cliente(&self) -> Result<(), AccessDenied> {
        if matches!(self.role, Role::Cliente | Role::Admin) {
            return Ok(());
        }
        self.deny(AccessDenied::ClientOnly)
    }

    /// Require one permission. Administrators are not exempt.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::MissingPermission`] when it is absent.
    pub fn require(&self, permission: Permission) -> Result<(), AccessDenied> {
        self.require_any(&[permission])
    }

    /// Require at least one of `permissions`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::MissingPermission`] when none is present.
    pub fn require_any(&self, permissions: &[Permission]) -> Result<(), AccessDenied> {
        if permissions.iter().any(|p| self.has_permission(*p)) {
            return Ok(());
        }
        self.deny(AccessDenied::MissingPermission(permissions.to_vec()))
    }

    /// The client id a portal caller is locked to, `None` for staff.
    pub fn client_scope(&self) -> Option<i64> {
        match self.role {
            Role::Cliente => self.codigo_cliente,
            Role::Admin | Role::User => None,
        }
    }

    /// The caller's own client code, required by portal endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::NoClientCode`] when none is attached.
    pub fn own_client(&self) -> Result<i64, AccessDenied> {
        match self.codigo_cliente {
            Some(code) => Ok(code),
            None => self.deny(AccessDenied::NoClientCode),
        }
    }

    /// Refuse portal callers reading a client other than their own.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::ForeignClient`] on mismatch.
    pub fn check_client_access(&self, client: i64) -> Result<(), AccessDenied> {
        if self.role != Role::Cliente {
            return Ok(());
        }
        match self.codigo_cliente {
            Some(own) if own == client => Ok(()),
            _ => self.deny(AccessDenied::ForeignClient),
        }
    }

    fn deny<T>(&self, reason: AccessDenied) -> Result<T, AccessDenied> {
        warn!(
            username = %self.username,
            role = %self.role,
            reason = ?reason,
            "access denied"
        );
        Err(reason)
    }
}
