//! Service wiring and the end-to-end attestation flow.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use r3l_core::{
    Caller, ContentId, ContentKind, ContentReference, DurableStore, IdentityProof, Ledger,
    ProvenanceError, Result,
};
use r3l_solana::{read_keypair_file, RpcError, RpcLedger, RpcLedgerConfig};
use r3l_sqlite::{SqliteError, SqliteStore};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, Settings};
use crate::embed::{EmbedError, EmbedderPool, FrameSampler, HttpEmbedder};
use crate::fetch::PageFetcher;
use crate::query::QueryService;
use crate::similarity::SimilarityService;
use crate::submitter::{AttestationSubmitter, SubmitOutcome, SubmitRequest};
use crate::tracing::prefix;
use crate::verifier::{validate_upload, Verifier, VerifierOutput};
use crate::versioning;

/// Embedder HTTP bound.
const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Whole-request bound on fetching a page to attest.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("durable store: {0}")]
    Store(#[from] SqliteError),

    #[error("ledger client: {0}")]
    Ledger(#[from] RpcError),

    #[error("embedder: {0}")]
    Embedder(#[from] EmbedError),

    #[error("trust bundle: {0}")]
    TrustBundle(#[source] io::Error),

    #[error("page fetcher: {0}")]
    Fetcher(#[source] reqwest::Error),
}

/// Whether the node will sign transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Reads only; the payer is a throwaway key.
    ReadOnly,
    /// Loads the payer keypair from disk.
    Submit,
}

/// Per-request attestation options.
#[derive(Debug, Clone, Default)]
pub struct AttestOptions {
    pub caller: Option<Caller>,
    pub identity_proof: Option<IdentityProof>,
    pub private: bool,
    /// Treat the upload as unsigned without running the verifier.
    pub skip_verifier: bool,
}

/// What an attestation call reports back.
#[derive(Debug, Clone, Serialize)]
pub struct AttestReport {
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub verify_output: VerifierOutput,
}

/// A running node: store, ledger and the services on top of them.
pub struct Node {
    settings: Settings,
    verifier: Verifier,
    fetcher: PageFetcher,
    submitter: AttestationSubmitter,
    query: QueryService,
    similarity: SimilarityService,
}

impl Node {
    /// Open the SQLite store and RPC ledger named by `settings`.
    pub fn open(settings: Settings, access: Access) -> std::result::Result<Self, NodeError> {
        settings.validate()?;

        let payer = match access {
            Access::Submit => read_keypair_file(settings.keypair_path()?)?,
            Access::ReadOnly => SigningKey::generate(&mut rand::rngs::OsRng),
        };
        let mut ledger_config = RpcLedgerConfig::new(&settings.solana_rpc_url, settings.program_id()?);
        ledger_config.request_timeout = settings.rpc_timeout();
        let ledger = RpcLedger::new(ledger_config, payer)?;

        let store = SqliteStore::open(&settings.database_url)?;
        info!(
            "{} node open: db={} rpc={}",
            prefix::DB,
            settings.database_url.display(),
            settings.solana_rpc_url
        );
        Self::from_parts(settings, Arc::new(store), Arc::new(ledger))
    }

    /// Assemble a node over existing backends.
    pub fn from_parts(
        settings: Settings,
        store: Arc<dyn DurableStore>,
        ledger: Arc<dyn Ledger>,
    ) -> std::result::Result<Self, NodeError> {
        let versioning = versioning::current(&settings.trust_dir).map_err(NodeError::TrustBundle)?;

        let embedder = match &settings.embedder_url {
            Some(url) => {
                let model = HttpEmbedder::new(url.clone(), EMBED_TIMEOUT)?;
                Some(EmbedderPool::new(
                    Arc::new(model),
                    settings.embedder_workers,
                    FrameSampler::new(settings.frame_timeout()),
                ))
            }
            None => None,
        };

        let fetcher =
            PageFetcher::new(FETCH_TIMEOUT, settings.max_upload_bytes).map_err(NodeError::Fetcher)?;

        Ok(Self {
            verifier: Verifier::from_settings(&settings),
            fetcher,
            submitter: AttestationSubmitter::new(ledger.clone(), store.clone(), versioning)
                .with_compute_units(settings.compute_units),
            query: QueryService::new(store.clone(), ledger, settings.trust_policy()),
            similarity: SimilarityService::new(store, embedder),
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn submitter(&self) -> &AttestationSubmitter {
        &self.submitter
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn similarity(&self) -> &SimilarityService {
        &self.similarity
    }

    /// Validate, fingerprint, verify and attest an uploaded file.
    pub async fn attest_file(
        &self,
        bytes: &[u8],
        filename: Option<&str>,
        mime: Option<&str>,
        options: AttestOptions,
    ) -> Result<AttestReport> {
        validate_upload(bytes, mime, self.settings.max_upload_bytes)?;
        let fingerprint = self.similarity.fingerprint(bytes, mime).await?;
        let verify_output = if options.skip_verifier {
            VerifierOutput::unsigned(bytes)
        } else {
            self.verifier.verify(bytes, filename).await?
        };

        let content = ContentReference {
            kind: ContentKind::File,
            mime_type: mime.map(str::to_string),
            size: Some(bytes.len() as u64),
            ..ContentReference::default()
        };
        self.attest(bytes, verify_output, content, fingerprint, options).await
    }

    /// Fetch a page and attest its bytes. The page carries no provenance; its
    /// declared MIME type drives fingerprinting and `url` is kept as the source.
    pub async fn attest_url(&self, url: &str, options: AttestOptions) -> Result<AttestReport> {
        let page = self.fetcher.fetch(url).await?;
        info!("{} fetched {url}: {} bytes of {}", prefix::ATTEST, page.bytes.len(), page.mime);
        let fingerprint = self.similarity.fingerprint(&page.bytes, Some(page.mime.as_str())).await?;

        let content = ContentReference {
            kind: ContentKind::Url,
            source_url: Some(url.to_string()),
            mime_type: Some(page.mime),
            size: Some(page.bytes.len() as u64),
            ..ContentReference::default()
        };
        let verify_output = VerifierOutput::unsigned(&page.bytes);
        self.attest(&page.bytes, verify_output, content, fingerprint, options)
            .await
    }

    /// Attest a piece of plain text. Text never carries provenance.
    pub async fn attest_text(&self, text: &str, options: AttestOptions) -> Result<AttestReport> {
        let bytes = text.as_bytes();
        if bytes.len() as u64 > self.settings.max_upload_bytes {
            return Err(ProvenanceError::Validation("text too large".into()));
        }
        let fingerprint = self.similarity.fingerprint(bytes, Some("text/plain")).await?;
        let content = ContentReference {
            kind: ContentKind::Text,
            mime_type: Some("text/plain".into()),
            size: Some(bytes.len() as u64),
            ..ContentReference::default()
        };
        self.attest(bytes, VerifierOutput::unsigned(bytes), content, fingerprint, options)
            .await
    }

    async fn attest(
        &self,
        bytes: &[u8],
        verify_output: VerifierOutput,
        content: ContentReference,
        fingerprint: r3l_core::SimilarityFingerprint,
        options: AttestOptions,
    ) -> Result<AttestReport> {
        let kind = content.kind;
        let request = SubmitRequest {
            content_id: ContentId::digest(bytes),
            signals: verify_output.signals(),
            caller: options.caller,
            identity_proof: options.identity_proof,
            zk_proof: None,
            private: options.private,
            content,
            fingerprint,
        };
        let outcome = self.submitter.submit(request).await?;
        Ok(AttestReport {
            outcome,
            kind,
            verify_output,
        })
    }
}
