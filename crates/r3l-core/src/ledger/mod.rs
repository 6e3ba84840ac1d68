//! Ledger abstraction.
//!
//! The ledger is the authority on whether an attestation exists. Clients
//! implement [`Ledger`]; [`MemoryLedger`] emulates the attestation program
//! in-process for tests and offline use.

mod error;
pub mod instruction;
mod memory;

use async_trait::async_trait;
use tracing::warn;

use crate::address::{attestation_address, Pubkey};
use crate::codec::{discriminator, AttestationAccount};
use crate::content::ContentId;

pub use error::LedgerError;
pub use instruction::{AccountMeta, Instruction, DEFAULT_COMPUTE_UNITS};
pub use memory::MemoryLedger;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Read and write access to the attestation program's accounts.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Program owning attestation accounts.
    fn program_id(&self) -> Pubkey;

    /// Fee payer and signer of every submitted transaction.
    fn payer(&self) -> Pubkey;

    /// Raw account data, `None` if no account lives at `address`.
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Vec<u8>>>;

    /// Send one transaction holding `instructions` in order and wait for
    /// confirmation. Returns the transaction signature.
    async fn submit(&self, instructions: Vec<Instruction>) -> LedgerResult<String>;

    /// Every account owned by the program whose data starts with `prefix`.
    async fn program_accounts(&self, prefix: &[u8]) -> LedgerResult<Vec<(Pubkey, Vec<u8>)>>;
}

/// Look up the attestation account for `content`.
///
/// Undecodable data is logged and reported as absent so a corrupted or
/// foreign account cannot break the read path.
pub async fn lookup_attestation(
    ledger: &dyn Ledger,
    content: &ContentId,
) -> LedgerResult<Option<(Pubkey, AttestationAccount)>> {
    let (address, _) = attestation_address(content, &ledger.program_id())?;
    let Some(data) = ledger.get_account(&address).await? else {
        return Ok(None);
    };
    match AttestationAccount::decode(&data) {
        Ok(account) => Ok(Some((address, account))),
        Err(e) => {
            warn!(%address, error = %e, "undecodable attestation account");
            Ok(None)
        }
    }
}

/// Page through every attestation account, newest first.
pub async fn list_attestations(
    ledger: &dyn Ledger,
    offset: usize,
    limit: usize,
) -> LedgerResult<Vec<(Pubkey, AttestationAccount)>> {
    let raw = ledger
        .program_accounts(&discriminator::ATTESTATION_ACCOUNT)
        .await?;

    let mut accounts: Vec<(Pubkey, AttestationAccount)> = raw
        .into_iter()
        .filter_map(|(address, data)| match AttestationAccount::decode(&data) {
            Ok(account) => Some((address, account)),
            Err(e) => {
                warn!(%address, error = %e, "skipping undecodable account");
                None
            }
        })
        .collect();

    accounts.sort_by(|(a_addr, a), (b_addr, b)| {
        b.timestamp.cmp(&a.timestamp).then_with(|| a_addr.cmp(b_addr))
    });
    Ok(accounts.into_iter().skip(offset).take(limit).collect())
}
