//! KapTaze client library.
//!
//! Owns the signed-in session and the user's favorites and orders, keeps them
//! in durable device storage, submits orders optimistically, and reconciles
//! order status pushed by the backend.
//!
//! # Architecture
//!
//! - [`store::UserDataStore`] is the single owner of session and collections
//! - [`storage`], [`api`] and [`push`] define the collaborator seams as traits,
//!   with concrete implementations alongside
//! - [`reconcile::StatusReconciler`] keeps one push subscription per known
//!   backend order while a user is signed in
//!
//! Nothing in the public store API returns an error: failures become data
//! (`false`, `None`, `local_only: true`, empty collections) and are logged.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod push;
pub mod reconcile;
pub mod state;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod text;

pub use error::ClientError;
pub use state::ClientContext;
pub use store::{StoreOptions, UserDataStore};
