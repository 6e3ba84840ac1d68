//! Runtime-native instruction payloads: Ed25519 signature verification and
//! compute budget.

use super::buffer::{Reader, Writer};
use super::error::{CodecError, CodecResult};
use crate::address::Pubkey;

const SIGNATURE_OFFSET: u16 = 16;
const PUBKEY_OFFSET: u16 = SIGNATURE_OFFSET + 64;
const MESSAGE_OFFSET: u16 = PUBKEY_OFFSET + 32;
/// Instruction index meaning "this instruction's own data".
const CURRENT_INSTRUCTION: u16 = u16::MAX;

const SET_COMPUTE_UNIT_LIMIT: u8 = 2;

/// One-signature payload for the Ed25519 verification precompile.
///
/// Layout: `[count=1, pad=0]`, seven `u16` offsets, then signature, key and
/// message laid out back to back in this instruction's own data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ed25519Verification {
    pub pubkey: Pubkey,
    pub signature: [u8; 64],
    pub message: Vec<u8>,
}

impl Ed25519Verification {
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let msg_len = u16::try_from(self.message.len()).map_err(|_| {
            CodecError::InvalidPrecompile(format!("message is {} bytes", self.message.len()))
        })?;
        if usize::from(MESSAGE_OFFSET) + self.message.len() > usize::from(u16::MAX) {
            return Err(CodecError::InvalidPrecompile("message overflows offsets".into()));
        }

        let mut w = Writer::default();
        w.u8(1)
            .u8(0)
            .u16(SIGNATURE_OFFSET)
            .u16(CURRENT_INSTRUCTION)
            .u16(PUBKEY_OFFSET)
            .u16(CURRENT_INSTRUCTION)
            .u16(MESSAGE_OFFSET)
            .u16(msg_len)
            .u16(CURRENT_INSTRUCTION)
            .fixed(&self.signature)
            .fixed(self.pubkey.as_bytes())
            .fixed(&self.message);
        Ok(w.finish())
    }

    /// Decode a payload that references only its own data.
    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = Reader::new(data);
        let count = r.u8("num_signatures")?;
        let _padding = r.u8("padding")?;
        if count != 1 {
            return Err(CodecError::InvalidPrecompile(format!("{count} signatures")));
        }

        let sig_offset = r.u16("signature_offset")?;
        let sig_ix = r.u16("signature_instruction_index")?;
        let key_offset = r.u16("public_key_offset")?;
        let key_ix = r.u16("public_key_instruction_index")?;
        let msg_offset = r.u16("message_data_offset")?;
        let msg_len = r.u16("message_data_size")?;
        let msg_ix = r.u16("message_instruction_index")?;

        if [sig_ix, key_ix, msg_ix].iter().any(|ix| *ix != CURRENT_INSTRUCTION) {
            return Err(CodecError::InvalidPrecompile("cross-instruction offsets".into()));
        }

        let signature: [u8; 64] = slice_at(data, sig_offset, 64, "signature")?
            .try_into()
            .map_err(|_| CodecError::InvalidPrecompile("signature".into()))?;
        let pubkey = Pubkey::try_from(slice_at(data, key_offset, 32, "public_key")?)
            .map_err(|e| CodecError::InvalidPrecompile(e.to_string()))?;
        let message = slice_at(data, msg_offset, usize::from(msg_len), "message")?.to_vec();

        Ok(Self {
            pubkey,
            signature,
            message,
        })
    }
}

fn slice_at<'a>(data: &'a [u8], offset: u16, len: usize, field: &'static str) -> CodecResult<&'a [u8]> {
    let start = usize::from(offset);
    data.get(start..start + len).ok_or(CodecError::Truncated {
        field,
        needed: start + len,
        remaining: data.len(),
    })
}

/// Compute-budget directive raising the unit limit for the transaction.
pub fn compute_unit_limit(units: u32) -> Vec<u8> {
    let mut w = Writer::default();
    w.u8(SET_COMPUTE_UNIT_LIMIT).u32(units);
    w.finish()
}

/// Inverse of [`compute_unit_limit`].
pub fn decode_compute_unit_limit(data: &[u8]) -> CodecResult<u32> {
    let mut r = Reader::new(data);
    let tag = r.u8("compute_budget_tag")?;
    if tag != SET_COMPUTE_UNIT_LIMIT {
        return Err(CodecError::InvalidPrecompile(format!("compute budget tag {tag}")));
    }
    let units = r.u32("units")?;
    r.expect_end()?;
    Ok(units)
}
