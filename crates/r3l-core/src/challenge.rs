//! Wallet login challenges.
//!
//! A challenge is a random nonce the wallet signs as `R3L-auth:{nonce}`.
//! Nonces live in an expiring store, expire after five minutes and are
//! removed the first time anyone presents them.
//!
//! The process shares one [`ChallengeStore`], installed with [`init`] at
//! startup and dropped with [`teardown`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use thiserror::Error;
use tracing::debug;

use crate::address::Pubkey;
use crate::error::ProvenanceError;
use crate::identity::IdentityProof;

/// Prefix of every challenge message.
pub const CHALLENGE_PREFIX: &str = "R3L-auth:";

/// How long an issued challenge stays valid.
pub const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("invalid challenge format")]
    Format,

    #[error("invalid or expired challenge")]
    Unknown,

    #[error("challenge expired")]
    Expired,

    #[error("challenge store not initialised")]
    Uninitialised,
}

impl From<ChallengeError> for ProvenanceError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::Uninitialised => ProvenanceError::Internal(err.to_string()),
            other => ProvenanceError::Validation(other.to_string()),
        }
    }
}

/// Millisecond clock, swappable in tests.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self(AtomicI64::new(start_millis))
    }

    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of taking a key out of an [`ExpiringStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Taken<V> {
    Live(V),
    Expired,
    Missing,
}

/// Time-indexed key/value store. Entries vanish when taken or once expired.
pub trait ExpiringStore<V>: Send + Sync {
    fn insert(&self, key: String, value: V, ttl: Duration);

    /// Remove `key`, reporting whether it was still live.
    fn take(&self, key: &str) -> Taken<V>;

    /// Drop every expired entry; returns how many were dropped.
    fn purge_expired(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process [`ExpiringStore`] behind a mutex.
pub struct MemoryExpiringStore<V> {
    entries: Mutex<HashMap<String, (i64, V)>>,
    clock: Arc<dyn Clock>,
}

impl<V> MemoryExpiringStore<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

impl<V: Send> ExpiringStore<V> for MemoryExpiringStore<V> {
    fn insert(&self, key: String, value: V, ttl: Duration) {
        let expires_at = self.clock.now_millis() + ttl.as_millis() as i64;
        self.entries.lock().insert(key, (expires_at, value));
    }

    fn take(&self, key: &str) -> Taken<V> {
        let now = self.clock.now_millis();
        match self.entries.lock().remove(key) {
            Some((expires_at, _)) if now > expires_at => Taken::Expired,
            Some((_, value)) => Taken::Live(value),
            None => Taken::Missing,
        }
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (expires_at, _)| now <= *expires_at);
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// A freshly issued challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub nonce: String,
    pub message: String,
    pub expires_in: Duration,
}

/// Issues and redeems wallet login challenges.
pub struct ChallengeStore {
    store: Box<dyn ExpiringStore<()>>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(store: Box<dyn ExpiringStore<()>>) -> Self {
        Self {
            store,
            ttl: CHALLENGE_TTL,
        }
    }

    /// In-memory store on the wall clock.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryExpiringStore::new(Arc::new(SystemClock))))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn issue(&self) -> Challenge {
        self.store.purge_expired();

        let mut raw = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut raw);
        let nonce = hex::encode(raw);
        self.store.insert(nonce.clone(), (), self.ttl);

        Challenge {
            message: format!("{CHALLENGE_PREFIX}{nonce}"),
            nonce,
            expires_in: self.ttl,
        }
    }

    /// Redeem the nonce embedded in `message`. Works at most once per nonce.
    pub fn redeem(&self, message: &str) -> Result<(), ChallengeError> {
        let nonce = message
            .strip_prefix(CHALLENGE_PREFIX)
            .ok_or(ChallengeError::Format)?;
        match self.store.take(nonce) {
            Taken::Live(()) => Ok(()),
            Taken::Expired => {
                debug!(nonce, "challenge expired");
                Err(ChallengeError::Expired)
            }
            Taken::Missing => Err(ChallengeError::Unknown),
        }
    }

    /// Wallet login: redeem the challenge, then check the signature over it.
    pub fn verify_login(&self, proof: &IdentityProof) -> Result<Pubkey, ProvenanceError> {
        self.redeem(&proof.message)?;
        crate::identity::verify(
            proof.pubkey.as_bytes(),
            proof.message.as_bytes(),
            &proof.signature,
        )?;
        Ok(proof.pubkey)
    }

    pub fn outstanding(&self) -> usize {
        self.store.len()
    }
}

lazy_static! {
    static ref GLOBAL: RwLock<Option<Arc<ChallengeStore>>> = RwLock::new(None);
}

/// Install the process-wide challenge store, replacing any previous one.
pub fn init(store: ChallengeStore) -> Arc<ChallengeStore> {
    let store = Arc::new(store);
    *GLOBAL.write() = Some(store.clone());
    store
}

/// The process-wide challenge store.
pub fn global() -> Result<Arc<ChallengeStore>, ChallengeError> {
    GLOBAL.read().clone().ok_or(ChallengeError::Uninitialised)
}

/// Drop the process-wide store and every outstanding challenge with it.
pub fn teardown() {
    *GLOBAL.write() = None;
}
