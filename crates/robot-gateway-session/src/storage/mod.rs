//! Operation log storage implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub use memory::MemoryLogStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLogStore;
