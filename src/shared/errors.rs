//! Shared error taxonomy used at every public contract of the engine.
//!
//! `DomainError` is returned as a value by the Lifecycle Engine, the
//! Payment Provider Adapter, and the Data-Access Gateway; the REST layer
//! (`crate::api::error`) is the only place that translates it into an HTTP
//! response.

use thiserror::Error;

/// Error kinds shared across the engine, independent of transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("client is already charging")]
    ClientBusy,

    #[error("connector is already in use")]
    ConnectorBusy,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("station unavailable: {0}")]
    StationUnavailable(String),

    #[error("payment provider failure: {0}")]
    ProviderFailure(String),

    #[error("operation timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for DomainError {
    fn from(e: sea_orm::DbErr) -> Self {
        DomainError::Internal(format!("database error: {e}"))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
