//! # Postgres
//!
//! Connection pooling and schema setup for the Postgres-backed promotion ledger.

/// Database connection pool and schema utilities.
pub mod database;
