//! KapTaze Core - Shared domain types.
//!
//! This crate provides the types shared by the KapTaze client crates:
//! - `client` - Session, favorites and order store with remote sync
//! - `integration-tests` - Cross-module scenario tests
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no storage,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, money and order statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
