//! SQLite durable store for R3L attestations
//!
//! Implements [`r3l_core::store::DurableStore`] on a single SQLite file.
//! Embeddings live in a `FLOAT32_BLOB` column and nearest-neighbour queries
//! run through sqlite-vec's `vec_distance_cosine`.
//!
//! # Example
//!
//! ```rust,no_run
//! use r3l_core::record::AttestationRecord;
//! use r3l_core::store::DurableStore;
//! use r3l_core::ContentId;
//! use r3l_sqlite::SqliteStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("r3l.db")?;
//! let record = AttestationRecord::new(ContentId::digest(b"hello"));
//! assert!(store.insert_or_ignore(&record)?);
//! assert!(!store.insert_or_ignore(&record)?);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod migrate;
pub mod store;
pub mod vec;

pub use error::{Result, SqliteError};
pub use store::SqliteStore;
