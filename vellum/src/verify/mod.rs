//! Bounded-polling verification that expected records reached a store.

mod matcher;
mod verifier;

pub use matcher::*;
pub use verifier::*;
