//! SQLite backend implementing [`DurableStore`]

use std::path::Path;

use parking_lot::Mutex;
use r3l_core::content::ContentId;
use r3l_core::record::{
    AttestationRecord, AuthenticitySignals, ContentKind, ContentReference, ProofKind,
    SimilarityFingerprint, Versioning,
};
use r3l_core::store::{DurableStore, Neighbor, StoreResult, Visibility};
use r3l_core::Pubkey;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::warn;

use crate::error::{Result, SqliteError};
use crate::migrate::migrate;
use crate::vec::{blob_to_embedding, embedding_to_blob, init_vec_extension};

const COLUMNS: &str = "content_hash, proof_type, tx_signature, pda, has_c2pa,
    trust_list_match, validation_state, digital_source_type, issuer, common_name,
    software_agent, signing_time, cert_fingerprint, email_domain, wallet_pubkey,
    submitted_by, org_id, org_domain, verifier_version, trust_bundle_hash,
    fuzzy_hash, embedding, content_type, source_url, mime_type, content_size,
    stored, private, created_at";

/// Row exactly as SQLite hands it back, before validation.
struct RawRow {
    content_hash: String,
    proof_type: String,
    tx_signature: Option<String>,
    pda: Option<String>,
    has_c2pa: bool,
    strings: [String; 8],
    email_domain: Option<String>,
    wallet_pubkey: Option<String>,
    submitted_by: Option<String>,
    org_id: Option<i64>,
    org_domain: Option<String>,
    verifier_version: String,
    trust_bundle_hash: String,
    fuzzy_hash: Option<String>,
    embedding: Option<Vec<u8>>,
    content_type: String,
    source_url: Option<String>,
    mime_type: Option<String>,
    content_size: Option<i64>,
    stored: bool,
    private: bool,
    created_at: i64,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            content_hash: row.get(0)?,
            proof_type: row.get(1)?,
            tx_signature: row.get(2)?,
            pda: row.get(3)?,
            has_c2pa: row.get(4)?,
            strings: [
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
            ],
            email_domain: row.get(13)?,
            wallet_pubkey: row.get(14)?,
            submitted_by: row.get(15)?,
            org_id: row.get(16)?,
            org_domain: row.get(17)?,
            verifier_version: row.get(18)?,
            trust_bundle_hash: row.get(19)?,
            fuzzy_hash: row.get(20)?,
            embedding: row.get(21)?,
            content_type: row.get(22)?,
            source_url: row.get(23)?,
            mime_type: row.get(24)?,
            content_size: row.get(25)?,
            stored: row.get(26)?,
            private: row.get(27)?,
            created_at: row.get(28)?,
        })
    }

    fn into_record(self) -> Result<AttestationRecord> {
        let id = self.content_hash.clone();
        let invalid = |reason: String| SqliteError::InvalidRow {
            id: id.clone(),
            reason,
        };

        let content_id = ContentId::from_hex(&self.content_hash).map_err(|e| invalid(e.to_string()))?;
        let proof_kind = self
            .proof_type
            .parse::<ProofKind>()
            .map_err(|e| invalid(e.to_string()))?;
        let kind = self
            .content_type
            .parse::<ContentKind>()
            .map_err(|e| invalid(e.to_string()))?;
        let wallet = parse_key(self.wallet_pubkey.as_deref()).map_err(invalid)?;
        let ledger_address = parse_key(self.pda.as_deref()).map_err(invalid)?;
        let embedding = match self.embedding {
            Some(blob) => Some(
                blob_to_embedding(&blob)
                    .ok_or_else(|| invalid(format!("embedding blob of {} bytes", blob.len())))?,
            ),
            None => None,
        };

        Ok(AttestationRecord {
            content_id,
            proof_kind,
            signals: AuthenticitySignals::from_strings(self.has_c2pa, self.strings),
            submitter: self.submitted_by,
            wallet,
            email_domain: self.email_domain,
            org_id: self.org_id,
            org_domain: self.org_domain,
            versioning: Versioning {
                verifier_version: self.verifier_version,
                trust_bundle_hash: self.trust_bundle_hash,
            },
            content: ContentReference {
                kind,
                source_url: self.source_url,
                mime_type: self.mime_type,
                size: self.content_size.and_then(|s| u64::try_from(s).ok()),
                stored: self.stored,
                private: self.private,
            },
            ledger_address,
            tx_signature: self.tx_signature,
            fingerprint: SimilarityFingerprint {
                fuzzy_hash: self.fuzzy_hash,
                embedding,
            },
            created_at: self.created_at,
        })
    }
}

fn parse_key(raw: Option<&str>) -> std::result::Result<Option<Pubkey>, String> {
    raw.filter(|s| !s.is_empty())
        .map(|s| s.parse::<Pubkey>().map_err(|e| e.to_string()))
        .transpose()
}

/// SQLite-backed attestation store.
///
/// One connection behind a mutex; uniqueness of `content_hash` is enforced
/// by the primary key, so concurrent writers never need a request lock.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap a connection that already has migrations applied.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Create a new in-memory SQLite store (for testing)
    pub fn in_memory() -> Result<Self> {
        init_vec_extension();
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self::new(conn))
    }

    /// Create a new file-backed SQLite store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        init_vec_extension();
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrate(&conn)?;
        Ok(Self::new(conn))
    }

    fn insert_row(&self, r: &AttestationRecord) -> Result<bool> {
        let [tlm, vs, dst, issuer, cn, agent, st, fp] = r.signals.strings();
        let embedding = r.fingerprint.embedding.as_deref().map(embedding_to_blob);
        let size = r.content.size.and_then(|s| i64::try_from(s).ok());

        let changed = self.conn.lock().execute(
            &format!(
                "INSERT OR IGNORE INTO attestations ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)"
            ),
            params![
                r.content_id.to_hex(),
                r.proof_kind.as_str(),
                r.tx_signature,
                r.ledger_address.map(|a| a.to_string()),
                r.signals.has_c2pa,
                tlm,
                vs,
                dst,
                issuer,
                cn,
                agent,
                st,
                fp,
                r.email_domain,
                r.wallet.map(|w| w.to_string()),
                r.submitter,
                r.org_id,
                r.org_domain,
                r.versioning.verifier_version,
                r.versioning.trust_bundle_hash,
                r.fingerprint.fuzzy_hash,
                embedding,
                r.content.kind.as_str(),
                r.content.source_url,
                r.content.mime_type,
                size,
                r.content.stored,
                r.content.private,
                r.created_at,
            ],
        )?;
        Ok(changed == 1)
    }

    fn fetch(&self, clause: &str, params: impl rusqlite::Params) -> Result<Vec<RawRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM attestations {clause}"))?;
        let rows = stmt
            .query_map(params, RawRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn select(&self, clause: &str, params: impl rusqlite::Params) -> Result<Vec<AttestationRecord>> {
        self.fetch(clause, params)?
            .into_iter()
            .map(RawRow::into_record)
            .collect()
    }

    /// Like [`Self::select`] but drops rows that fail validation.
    fn select_lenient(&self, clause: &str, params: impl rusqlite::Params) -> Result<Vec<AttestationRecord>> {
        Ok(self
            .fetch(clause, params)?
            .into_iter()
            .filter_map(|raw| match raw.into_record() {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping invalid attestation row");
                    None
                }
            })
            .collect())
    }

    fn nearest_rows(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let blob = embedding_to_blob(embedding);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS}, vec_distance_cosine(embedding, ?1) AS distance
             FROM attestations
             WHERE embedding IS NOT NULL AND length(embedding) = ?2
             ORDER BY distance ASC, content_hash ASC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![blob, blob.len() as i64, k as i64], |row| {
                Ok((RawRow::read(row)?, row.get::<_, f64>(29)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter()
            .map(|(raw, distance)| {
                Ok(Neighbor {
                    record: raw.into_record()?,
                    similarity: (1.0 - distance) as f32,
                })
            })
            .collect()
    }
}

impl DurableStore for SqliteStore {
    fn insert_or_ignore(&self, record: &AttestationRecord) -> StoreResult<bool> {
        Ok(self.insert_row(record)?)
    }

    fn get(&self, id: &ContentId) -> StoreResult<Option<AttestationRecord>> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM attestations WHERE content_hash = ?1"),
                [id.to_hex()],
                RawRow::read,
            )
            .optional()
            .map_err(SqliteError::from)?
        };
        Ok(raw.map(RawRow::into_record).transpose()?)
    }

    fn exists(&self, id: &ContentId) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let found = conn
            .prepare("SELECT 1 FROM attestations WHERE content_hash = ?1")
            .and_then(|mut stmt| stmt.exists([id.to_hex()]))
            .map_err(SqliteError::from)?;
        Ok(found)
    }

    fn list(&self, visibility: Visibility, limit: usize, offset: usize) -> StoreResult<Vec<AttestationRecord>> {
        let filter = match visibility {
            Visibility::Public => "WHERE private = 0",
            Visibility::All => "",
        };
        Ok(self.select(
            &format!("{filter} ORDER BY created_at DESC, content_hash ASC LIMIT ?1 OFFSET ?2"),
            params![limit as i64, offset as i64],
        )?)
    }

    fn with_fuzzy_hash(&self) -> StoreResult<Vec<AttestationRecord>> {
        Ok(self.select_lenient(
            "WHERE fuzzy_hash IS NOT NULL ORDER BY created_at DESC",
            [],
        )?)
    }

    fn nearest(&self, embedding: &[f32], k: usize) -> StoreResult<Vec<Neighbor>> {
        Ok(self.nearest_rows(embedding, k)?)
    }

    fn count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM attestations", [], |row| row.get(0))
            .map_err(SqliteError::from)?;
        Ok(count as usize)
    }
}
