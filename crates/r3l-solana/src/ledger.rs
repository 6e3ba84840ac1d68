//! [`Ledger`] backed by a JSON-RPC node.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use r3l_core::ledger::{Instruction, Ledger, LedgerResult};
use r3l_core::Pubkey;
use tracing::{debug, info};

use crate::client::RpcClient;
use crate::error::RpcError;
use crate::message::sign_transaction;

#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    pub rpc_url: String,
    pub program_id: Pubkey,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// How long to wait for a sent transaction to confirm.
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
}

impl RpcLedgerConfig {
    pub fn new(rpc_url: impl Into<String>, program_id: Pubkey) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            program_id,
            request_timeout: Duration::from_secs(30),
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

pub struct RpcLedger {
    client: RpcClient,
    payer: SigningKey,
    config: RpcLedgerConfig,
}

impl RpcLedger {
    pub fn new(config: RpcLedgerConfig, payer: SigningKey) -> Result<Self, RpcError> {
        Ok(Self {
            client: RpcClient::new(config.rpc_url.clone(), config.request_timeout)?,
            payer,
            config,
        })
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    async fn confirm(&self, signature: &str) -> Result<(), RpcError> {
        let started = Instant::now();
        loop {
            if let Some(status) = self.client.signature_status(signature).await? {
                if let Some(err) = status.err {
                    return Err(RpcError::Transaction(err.to_string()));
                }
                if status.is_confirmed() {
                    return Ok(());
                }
            }
            if started.elapsed() >= self.config.confirm_timeout {
                return Err(RpcError::Unconfirmed(self.config.confirm_timeout.as_secs()));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn send_and_confirm(&self, instructions: &[Instruction]) -> Result<String, RpcError> {
        let blockhash = self.client.latest_blockhash().await?;
        let (wire, signature) = sign_transaction(instructions, &self.payer, blockhash)?;
        let sent = self.client.send_transaction(&wire).await?;
        if sent != signature {
            debug!(expected = %signature, %sent, "node reported a different signature");
        }
        self.confirm(&sent).await?;
        Ok(sent)
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    fn program_id(&self) -> Pubkey {
        self.config.program_id
    }

    fn payer(&self) -> Pubkey {
        Pubkey::new_from_array(self.payer.verifying_key().to_bytes())
    }

    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.client.account_data(address).await?)
    }

    async fn submit(&self, instructions: Vec<Instruction>) -> LedgerResult<String> {
        let program_index = instructions
            .iter()
            .position(|ix| ix.program_id == self.config.program_id);
        let signature = self
            .send_and_confirm(&instructions)
            .await
            .map_err(|e| e.into_ledger_error(program_index))?;
        info!(%signature, "transaction confirmed");
        Ok(signature)
    }

    async fn program_accounts(&self, prefix: &[u8]) -> LedgerResult<Vec<(Pubkey, Vec<u8>)>> {
        Ok(self
            .client
            .program_accounts(&self.config.program_id, prefix)
            .await?)
    }
}
