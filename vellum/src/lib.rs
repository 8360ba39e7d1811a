//! # Vellum - Document Store Client
//!
//! Vellum is a client for schema-less document stores built around three
//! needs of event pipelines that many producers write to at once:
//!
//! - **Idempotent provisioning**: databases, collections and TTL indexes are
//!   created on first use, and races between concurrent creators are
//!   resolved silently.
//! - **Coordination**: a compare-and-swap replacement and an atomic
//!   find-and-modify give producers a lock over a logical record.
//! - **Verification**: a bounded-polling verifier proves that expected
//!   records eventually reached the store.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vellum::client::DocumentClient;
//! use vellum::verify::{CollectionTarget, ConsistencyVerifier, IdentityMatch};
//!
//! let client = DocumentClient::builder()
//!     .database("eiffel")
//!     .open()?;
//!
//! client.ensure_ttl_index("eiffel", "aggregated", "Time", Duration::from_secs(3600))?;
//! client.insert("eiffel", "events", r#"{"_id":"e1","meta":{"type":"ArtifactCreated"}}"#);
//!
//! let target = CollectionTarget::new(client.clone(), "eiffel", "events");
//! let missing = ConsistencyVerifier::default().verify(&target, &["e1".to_string()], &IdentityMatch);
//! assert!(missing.is_empty());
//! ```
//!
//! ## Module Organization
//!
//! - [`client`] - The client facade and its components
//! - [`common`] - Documents, values and shared helpers
//! - [`errors`] - Error types and result definitions
//! - [`fixtures`] - Fixture events and the publisher interface
//! - [`store`] - The driver seam and the embedded memory store
//! - [`verify`] - Eventual-consistency verification

pub mod client;
pub mod common;
pub mod errors;
pub mod fixtures;
pub mod store;
pub mod verify;

#[cfg(test)]
mod tests {
    // Setup only one time throughout the project.
    #[ctor::ctor]
    fn init() {
        colog::init();
    }
}
