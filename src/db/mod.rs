//! Database module for the policy agent
//!
//! Store contracts, the MongoDB backend, and an in-memory backend for
//! tests and local runs.

pub mod memory;
pub mod mongo;
pub mod schemas;
pub mod store;

pub use memory::InMemoryStore;
pub use mongo::{MongoClient, MongoCollection, MongoStore};
pub use store::{PermissionsStore, SellerStore};
