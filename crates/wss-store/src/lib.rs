pub mod dataset_store;
pub mod schema;
pub mod store;

pub use dataset_store::{DatasetStore, ImportStats};
pub use store::SqliteStore;
