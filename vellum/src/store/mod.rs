//! The driver seam between the client and a concrete document store.
//!
//! A driver is three layers of providers, each wrapped in a cheap, cloneable
//! handle: a [StoreDriver] establishes connections, a [StoreClient] resolves
//! databases and collections over one connection, and a [StoreCollection]
//! executes document and index commands. The embedded [memory] driver
//! implements all three in-process; a network driver plugs in the same way.

pub mod memory;
mod options;
mod provider;
mod results;

pub use options::*;
pub use provider::*;
pub use results::*;
