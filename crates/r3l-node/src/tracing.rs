//! Logging setup with R3L segment prefixes.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with the default `info` filter.
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing, falling back to `default_filter` when RUST_LOG is unset.
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .init();
}

/// Segment prefixes for log lines.
pub mod prefix {
    /// Attestation submission
    pub const ATTEST: &str = "⚓";
    /// Ledger reads and writes
    pub const LEDGER: &str = "⛓";
    /// Similarity search
    pub const SIMILAR: &str = "≈";
    /// Verifier and frame-extraction subprocesses
    pub const VERIFY: &str = "✓";
    /// Durable store operations
    pub const DB: &str = "⊔";
}
