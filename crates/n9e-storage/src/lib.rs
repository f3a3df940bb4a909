//! Persistence for alert events, mutes, subscriptions and notification
//! records.
//!
//! [`store::Store`] wraps a SeaORM connection and runs the schema
//! migrations on open. The current and history event tables are written
//! exclusively through [`store::Store::persist`], which applies the
//! fire/refresh/recover protocol inside a single transaction.

pub mod entities;
pub mod error;
pub mod store;


pub use error::{Result, StorageError};
pub use store::Store;
