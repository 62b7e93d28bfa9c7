pub mod sqlite;

pub use sqlite::{InteractionRecord, SqliteStore, TransactionRecord};
