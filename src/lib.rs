//! ERP gateway for a produce distributor.
//!
//! Serves the back-office and client-portal REST API: sales summaries,
//! pricing, stock, purchase planning, fiscal closing, deliveries with
//! returnable-crate reconciliation, receivables, client geocoding and
//! temporary RDP access grants. Reads the legacy Firebird ERP through
//! [`erp::Erp`] and keeps its own state in SQLite through [`store::Store`].
//!
//! See `DESIGN.md` for the architecture and module ledger.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;

pub mod auth;
pub mod erp;
pub mod store;

pub mod geocode;
pub mod rdp;

pub mod maintenance;

pub mod api;
pub mod server;
