//! R3L Core
//!
//! Domain kernel for content attestations: identifiers, ledger addressing and
//! payload codec, identity proofs, fuzzy hashing, similarity ranking and
//! query verdicts. Storage and ledger access sit behind traits with
//! in-memory backends; the SQLite store and the RPC ledger client live in
//! their own crates.
//!
//! # Example
//!
//! ```rust
//! use r3l_core::address::{attestation_address, ids};
//! use r3l_core::content::ContentId;
//! use r3l_core::similarity::MatchTier;
//!
//! let id = ContentId::digest(b"hello");
//! let (address, bump) = attestation_address(&id, &ids::ATTESTATION_PROGRAM).unwrap();
//! assert_eq!(address.to_string(), "HQZ2TrhHsJBDhNw6zggvtqkji9UN72SwZZe4r7jJK8LX");
//! assert_eq!(bump, 255);
//!
//! assert_eq!(MatchTier::classify(Some(100), None), MatchTier::NearDuplicate);
//! ```

pub mod address;
pub mod caller;
pub mod challenge;
pub mod codec;
pub mod content;
pub mod error;
pub mod fuzzy;
pub mod identity;
pub mod ledger;
pub mod record;
pub mod similarity;
pub mod store;
pub mod verdict;

// Re-export main types at crate root
pub use address::{AddressError, Pubkey};
pub use caller::{Caller, OrgRole};
pub use challenge::{Challenge, ChallengeStore};
pub use codec::{AttestationAccount, AttestationInstruction, CodecError, ProgramInstruction, ProofInstruction};
pub use content::ContentId;
pub use error::{ProvenanceError, Result};
pub use fuzzy::FuzzyHash;
pub use identity::IdentityProof;
pub use ledger::{Ledger, LedgerError, MemoryLedger};
pub use record::{
    AttestationRecord, AuthenticitySignals, ContentKind, ContentReference, LedgerIdentity, ProofKind,
    SimilarityFingerprint, Versioning,
};
pub use similarity::{Match, MatchTier, SimilarityMatcher};
pub use store::{DurableStore, MemoryStore, StoreError, Visibility};
pub use verdict::{TrustPolicy, Verdict, VerdictKind};
