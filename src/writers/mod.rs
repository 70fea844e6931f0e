pub mod memory;
pub mod postgres;
pub mod schema;
pub mod store;
pub mod upsert;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::RecordStore;
pub use upsert::UpsertWriter;
