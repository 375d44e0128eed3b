//! # Reservation Engine
//!
//! This crate turns raw booking input (dates, a campground, a breakfast add-on and an
//! optional promotion code) into a validated, priced reservation request, and owns the
//! promotion redemption ledger that keeps every code within its usage limit.

/// Domain types shared by every engine component
mod types;
pub use types::*;

/// Check-in / check-out normalization and the maximum stay rule
mod date_policy;
pub use date_policy::*;

/// Itemized pricing of a stay
mod pricing;
pub use pricing::*;

/// Advisory promotion checks and case-insensitive code lookup
mod promotion_validator;
pub use promotion_validator::*;

/// Authoritative redemption counters (in-memory and Postgres)
mod promotion_ledger;
pub use promotion_ledger::*;

/// Boundary traits for the external catalog and persistence API
mod gateway;
pub use gateway::*;

/// Assembly of a reservation request and the submission state machine
mod assembler;
pub use assembler::*;

/// Order-preserving local mirror of confirmed reservations
mod reservation_store;
pub use reservation_store::*;

/// Administrative create/update/delete rules for promotions
mod promotion_admin;
pub use promotion_admin::*;
