pub mod errors;
pub mod kv;
pub mod memory;
pub mod sled_store;

pub use errors::StorageError;
pub use kv::{KvSnapshot, KvStore, WriteBatch, WriteOp};
pub use memory::MemoryKvStore;
pub use sled_store::SledKvStore;

pub type Result<T> = std::result::Result<T, StorageError>;
