//! Document stores for the availability service.
//!
//! Both stores implement `DocumentRepository` and `OutboxStore` over the same
//! storage, so a document write and its outbox entries commit together.

pub mod memory;
pub mod pg_store;
pub mod schema;

pub use memory::InMemoryStore;
pub use pg_store::PgDocumentStore;
