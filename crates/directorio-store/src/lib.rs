//! # directorio-store
//!
//! Storage layer for the Directorio client directory, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed operations for the two domain
//! entities: client records (with soft-delete lifecycle and per-field change
//! history) and the identities that act on them.  Every mutating operation
//! takes the acting [`Identity`](models::Identity) explicitly and is gated by
//! a single authorization predicate in [`access`].

pub mod access;
pub mod clients;
pub mod database;
pub mod history;
pub mod identities;
pub mod maintenance;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
