//! Durable storage abstraction for attestation records
//!
//! Implementations exist for:
//!
//! - **Memory**: In-memory storage for testing (`MemoryStore`)
//! - **SQLite**: rusqlite + sqlite-vec (the `r3l-sqlite` crate)

mod error;
mod memory;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use traits::{DurableStore, Neighbor, Visibility};
