//! The analytical mirror and the replication path that feeds it.
//!
//! [`SqliteMirror`] is a denormalized, UUID-keyed projection of persons and
//! events. [`Replicator`] performs the second write after the primary store
//! commits, and can rebuild a team's mirror rows from the primary at any time.

mod schema;
mod store;

pub mod error;
pub mod reconcile;
pub mod replicator;

pub use error::{Error, ReplicationError, Result};
pub use replicator::Replicator;
pub use store::SqliteMirror;
