//! # Booking API
//!
//! This crate provides a client for the external document-store REST API that persists
//! campgrounds, promotions and reservations.

/// HTTP client implementing the reservation engine's gateway traits.
mod client;
pub use client::*;
