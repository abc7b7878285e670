//! # Adapters
//!
//! Storage backends for the `KeyValueStore` port.

mod memory;
#[cfg(feature = "rocksdb")]
mod rocksdb_store;

pub use memory::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use rocksdb_store::{RocksDbConfig, RocksDbStore};
