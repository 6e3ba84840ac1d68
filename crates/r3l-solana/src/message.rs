//! Legacy transaction wire format.
//!
//! A message lists every account once, signers first and writable before
//! read-only within each group, with the fee payer at index 0. Instructions
//! then refer to accounts by index. Lengths use the compact-u16 encoding.

use std::collections::BTreeMap;

use ed25519_dalek::{Signer, SigningKey};
use r3l_core::ledger::Instruction;
use r3l_core::Pubkey;

use crate::error::{Result, RpcError};

/// Append `value` as a compact-u16 (7 bits per byte, high bit = more).
pub fn write_compact_u16(out: &mut Vec<u8>, value: u16) {
    let mut rem = value;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

fn compact_len(out: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let len = u16::try_from(len).map_err(|_| RpcError::Malformed(format!("too many {what}: {len}")))?;
    write_compact_u16(out, len);
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct KeyMeta {
    is_signer: bool,
    is_writable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// A compiled legacy message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    pub fn compile(instructions: &[Instruction], payer: &Pubkey, recent_blockhash: [u8; 32]) -> Result<Self> {
        let mut metas: BTreeMap<Pubkey, KeyMeta> = BTreeMap::new();
        for ix in instructions {
            metas.entry(ix.program_id).or_default();
            for account in &ix.accounts {
                let meta = metas.entry(account.pubkey).or_default();
                meta.is_signer |= account.is_signer;
                meta.is_writable |= account.is_writable;
            }
        }
        metas.insert(
            *payer,
            KeyMeta {
                is_signer: true,
                is_writable: true,
            },
        );

        let group = |signer: bool, writable: bool| -> Vec<Pubkey> {
            metas
                .iter()
                .filter(|(key, m)| *key != payer && m.is_signer == signer && m.is_writable == writable)
                .map(|(key, _)| *key)
                .collect()
        };
        let signed_writable = group(true, true);
        let signed_readonly = group(true, false);
        let unsigned_writable = group(false, true);
        let unsigned_readonly = group(false, false);

        let header = MessageHeader {
            num_required_signatures: count_u8(1 + signed_writable.len() + signed_readonly.len())?,
            num_readonly_signed_accounts: count_u8(signed_readonly.len())?,
            num_readonly_unsigned_accounts: count_u8(unsigned_readonly.len())?,
        };

        let mut account_keys = vec![*payer];
        account_keys.extend(signed_writable);
        account_keys.extend(signed_readonly);
        account_keys.extend(unsigned_writable);
        account_keys.extend(unsigned_readonly);
        count_u8(account_keys.len())?;

        let index_of = |key: &Pubkey| -> Result<u8> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .ok_or_else(|| RpcError::Malformed(format!("account {key} missing from message")))
        };

        let compiled = instructions
            .iter()
            .map(|ix| {
                Ok(CompiledInstruction {
                    program_id_index: index_of(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|a| index_of(&a.pubkey))
                        .collect::<Result<_>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = vec![
            self.header.num_required_signatures,
            self.header.num_readonly_signed_accounts,
            self.header.num_readonly_unsigned_accounts,
        ];
        compact_len(&mut out, self.account_keys.len(), "accounts")?;
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(&self.recent_blockhash);

        compact_len(&mut out, self.instructions.len(), "instructions")?;
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            compact_len(&mut out, ix.accounts.len(), "instruction accounts")?;
            out.extend_from_slice(&ix.accounts);
            compact_len(&mut out, ix.data.len(), "instruction data bytes")?;
            out.extend_from_slice(&ix.data);
        }
        Ok(out)
    }
}

fn count_u8(n: usize) -> Result<u8> {
    u8::try_from(n).map_err(|_| RpcError::Malformed(format!("{n} accounts exceed a legacy message")))
}

/// Compile, sign with the payer and serialize a single-signer transaction.
/// Returns the wire bytes and the base58 transaction signature.
pub fn sign_transaction(
    instructions: &[Instruction],
    payer: &SigningKey,
    recent_blockhash: [u8; 32],
) -> Result<(Vec<u8>, String)> {
    let payer_key = Pubkey::new_from_array(payer.verifying_key().to_bytes());
    let message = Message::compile(instructions, &payer_key, recent_blockhash)?;
    if message.header.num_required_signatures != 1 {
        return Err(RpcError::Malformed(format!(
            "transaction needs {} signatures, only the payer signs",
            message.header.num_required_signatures
        )));
    }

    let message_bytes = message.serialize()?;
    let signature = payer.sign(&message_bytes).to_bytes();

    let mut wire = Vec::with_capacity(1 + 64 + message_bytes.len());
    write_compact_u16(&mut wire, 1);
    wire.extend_from_slice(&signature);
    wire.extend_from_slice(&message_bytes);
    Ok((wire, bs58::encode(signature).into_string()))
}
