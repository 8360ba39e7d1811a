//! Embedded, in-process implementation of the driver seam.
//!
//! Understands the subset of the native query dialect the client emits,
//! honours TTL indexes and can authenticate users, which makes it suitable
//! both for tests and for single-process deployments.

mod auth;
mod catalog;
mod collection;
mod config;
mod query;
mod server;
mod ttl;
mod update;

pub use config::*;
pub use server::MemoryDriver;
