//! Transaction scoping of the entity caches.
//!
//! A [`TransactionContext`] owns one cache per entity kind it has touched,
//! created from the [`ContextRegistry`] built at startup, and one pinned
//! backend session. Commit flushes every dirty cache in one backend
//! transaction; commit and rollback both leave every cache empty.

mod context;
mod registry;

pub use context::{TransactionContext, TransactionState};
pub use registry::{ContextFactory, ContextRegistry};
