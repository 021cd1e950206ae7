//! services/api/src/lib.rs
//!
//! The portal's HTTP service: configuration, the database and identity
//! adapters, and the axum web layer. The binaries in `src/bin` wire these
//! together.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
