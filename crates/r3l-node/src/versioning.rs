//! Verifier and trust-bundle versioning stamped onto every attestation.

use std::fs;
use std::io;
use std::path::Path;

use r3l_core::Versioning;
use sha2::{Digest, Sha256};

/// Version of the verifier contract this node speaks.
pub const VERIFIER_VERSION: &str = "0.1.0";

/// Trust-list categories hashed into the bundle, in order.
const BUNDLE_DIRS: [&str; 2] = ["official", "curated"];

/// SHA-256 over the `.pem` files of `official/` then `curated/`, each
/// directory in file-name order. Missing directories contribute nothing.
pub fn trust_bundle_hash(trust_dir: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    for sub in BUNDLE_DIRS {
        let dir = trust_dir.join(sub);
        if !dir.is_dir() {
            continue;
        }
        let mut pems: Vec<_> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name())
            .filter(|name| name.to_string_lossy().ends_with(".pem"))
            .collect();
        pems.sort();
        for name in pems {
            hasher.update(fs::read(dir.join(name))?);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Versioning for attestations made against the bundle in `trust_dir`.
pub fn current(trust_dir: &Path) -> io::Result<Versioning> {
    Ok(Versioning {
        verifier_version: VERIFIER_VERSION.to_string(),
        trust_bundle_hash: trust_bundle_hash(trust_dir)?,
    })
}
