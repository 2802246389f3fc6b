//! Shop Sync Core - Domain types.
//!
//! This crate provides the types shared by the synchronization layer and its
//! tooling:
//! - `shop-sync` - Catalog cache, cart ledger, aggregation and hydration
//! - `shop-sync-cli` - Command-line harness
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no async,
//! no HTTP clients. Everything here is deterministic and cheap to test.
//!
//! # Modules
//!
//! - [`types`] - Product identities, fixed-point prices, catalog pages and cart lines

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
