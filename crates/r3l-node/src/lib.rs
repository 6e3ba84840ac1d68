//! R3L Node
//!
//! Async services over the R3L core: attestation submission, similarity
//! search and trust verdicts, plus the verifier and embedder collaborators
//! they drive. [`Node`] wires them to the SQLite store and the RPC ledger;
//! [`Node::from_parts`] accepts any [`r3l_core::DurableStore`] and
//! [`r3l_core::Ledger`], which is how the tests run against in-memory
//! backends.

pub mod config;
pub mod embed;
pub mod fetch;
mod node;
pub mod process;
pub mod query;
pub mod similarity;
pub mod submitter;
pub mod tracing;
pub mod verifier;
pub mod versioning;

pub use config::{ConfigError, Settings};
pub use embed::{ContentClass, Embedder, EmbedderPool, HttpEmbedder};
pub use fetch::{FetchedPage, PageFetcher};
pub use node::{Access, AttestOptions, AttestReport, Node, NodeError};
pub use query::QueryService;
pub use similarity::SimilarityService;
pub use submitter::{AttestationSubmitter, SubmitOutcome, SubmitRequest, ZkProof};
pub use verifier::{Verifier, VerifierOutput};
