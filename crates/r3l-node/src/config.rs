//! Node settings.
//!
//! Every field is a clap argument that can also come from the environment,
//! so the same struct serves the CLI and service deployments.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use r3l_core::{Pubkey, TrustPolicy};
use thiserror::Error;

pub const DEFAULT_TRUST_DIR: &str = "../../data/trust";
pub const DEFAULT_VERIFIER_BIN: &str = "../verifier/target/release/verifier";
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";
pub const DEFAULT_PROGRAM_ID: &str = "63jq6M3t5NafYWcADqLDCLnhd5qPfEmCUcaA9iWh5YWz";
pub const DEFAULT_DATABASE: &str = "r3l.db";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid program id {value}: {reason}")]
    ProgramId { value: String, reason: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("no keypair path given and HOME is not set")]
    NoHome,
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Trust bundle root holding official/ and curated/ certificate dirs
    #[arg(long, env = "R3L_TRUST_DIR", default_value = DEFAULT_TRUST_DIR)]
    pub trust_dir: PathBuf,

    /// C2PA verifier executable
    #[arg(long, env = "R3L_VERIFIER_BIN", default_value = DEFAULT_VERIFIER_BIN)]
    pub verifier_bin: PathBuf,

    /// Ledger JSON-RPC endpoint
    #[arg(long, env = "SOLANA_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub solana_rpc_url: String,

    /// Payer keypair file (defaults to ~/.config/solana/id.json)
    #[arg(long, env = "SOLANA_KEYPAIR_PATH")]
    pub solana_keypair_path: Option<PathBuf>,

    /// Attestation program id
    #[arg(long, env = "R3L_PROGRAM_ID", default_value = DEFAULT_PROGRAM_ID)]
    pub program_id: String,

    /// SQLite database file
    #[arg(long, env = "R3L_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database_url: PathBuf,

    /// Verifier subprocess bound, in seconds
    #[arg(long, env = "R3L_VERIFIER_TIMEOUT", default_value_t = 30)]
    pub verifier_timeout: u64,

    /// Per-frame ffprobe/ffmpeg bound, in seconds
    #[arg(long, env = "R3L_FRAME_TIMEOUT", default_value_t = 10)]
    pub frame_timeout: u64,

    /// Ledger RPC request bound, in seconds
    #[arg(long, env = "R3L_RPC_TIMEOUT", default_value_t = 30)]
    pub rpc_timeout: u64,

    /// Compute units requested per attestation transaction
    #[arg(long, env = "R3L_COMPUTE_UNITS", default_value_t = r3l_core::ledger::DEFAULT_COMPUTE_UNITS)]
    pub compute_units: u32,

    /// Embedding endpoint; similarity falls back to fuzzy hashing without it
    #[arg(long, env = "R3L_EMBEDDER_URL")]
    pub embedder_url: Option<String>,

    /// Concurrent embedding requests
    #[arg(long, env = "R3L_EMBEDDER_WORKERS", default_value_t = 2)]
    pub embedder_workers: usize,

    /// Trust-list categories that make a verdict `trusted`
    #[arg(
        long,
        env = "R3L_TRUSTED_CATEGORIES",
        value_delimiter = ',',
        default_value = "official,curated"
    )]
    pub trusted_categories: Vec<String>,

    /// Largest accepted upload
    #[arg(long, env = "R3L_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trust_dir: DEFAULT_TRUST_DIR.into(),
            verifier_bin: DEFAULT_VERIFIER_BIN.into(),
            solana_rpc_url: DEFAULT_RPC_URL.into(),
            solana_keypair_path: None,
            program_id: DEFAULT_PROGRAM_ID.into(),
            database_url: DEFAULT_DATABASE.into(),
            verifier_timeout: 30,
            frame_timeout: 10,
            rpc_timeout: 30,
            compute_units: r3l_core::ledger::DEFAULT_COMPUTE_UNITS,
            embedder_url: None,
            embedder_workers: 2,
            trusted_categories: vec!["official".into(), "curated".into()],
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.program_id()?;
        for (name, value) in [
            ("verifier_timeout", self.verifier_timeout),
            ("frame_timeout", self.frame_timeout),
            ("rpc_timeout", self.rpc_timeout),
            ("max_upload_bytes", self.max_upload_bytes),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.compute_units == 0 {
            return Err(ConfigError::Zero("compute_units"));
        }
        if self.embedder_workers == 0 {
            return Err(ConfigError::Zero("embedder_workers"));
        }
        Ok(())
    }

    pub fn program_id(&self) -> Result<Pubkey, ConfigError> {
        self.program_id
            .parse()
            .map_err(|e: r3l_core::AddressError| ConfigError::ProgramId {
                value: self.program_id.clone(),
                reason: e.to_string(),
            })
    }

    pub fn keypair_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.solana_keypair_path {
            return Ok(path.clone());
        }
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        Ok(PathBuf::from(home).join(".config").join("solana").join("id.json"))
    }

    pub fn trust_policy(&self) -> TrustPolicy {
        TrustPolicy::new(self.trusted_categories.iter().map(|c| c.trim()))
    }

    pub fn verifier_timeout(&self) -> Duration {
        Duration::from_secs(self.verifier_timeout)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_timeout)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout)
    }
}
