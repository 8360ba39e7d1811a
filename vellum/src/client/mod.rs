//! The document-store client.
//!
//! [DocumentClient] is the entry point. It is composed of:
//! - [ConnectionManager]: one live connection, lazy or eager, credentialed or anonymous;
//! - [CollectionAccessor]: race-safe ensure-exists for databases and collections;
//! - [DocumentOperations]: CRUD, compare-and-swap and set-union commands;
//! - [IndexManager]: idempotent TTL index replacement.

mod accessor;
mod config;
mod connection;
mod document_client;
mod index;
mod operations;

pub use accessor::*;
pub use config::*;
pub use connection::*;
pub use document_client::*;
pub use index::*;
pub use operations::*;
