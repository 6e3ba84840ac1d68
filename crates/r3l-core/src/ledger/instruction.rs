//! Ledger instructions and the attestation transaction layout.

use crate::address::{ids, Pubkey};
use crate::codec::{compute_unit_limit, CodecResult, Ed25519Verification, ProgramInstruction};

/// Default compute budget for an attestation transaction.
pub const DEFAULT_COMPUTE_UNITS: u32 = 200_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

pub fn compute_budget(units: u32) -> Instruction {
    Instruction {
        program_id: ids::COMPUTE_BUDGET_PROGRAM,
        accounts: Vec::new(),
        data: compute_unit_limit(units),
    }
}

pub fn ed25519_verify(payload: &Ed25519Verification) -> CodecResult<Instruction> {
    Ok(Instruction {
        program_id: ids::ED25519_PROGRAM,
        accounts: Vec::new(),
        data: payload.encode()?,
    })
}

/// Program call creating the account at `attestation` paid for by `payer`.
pub fn attestation_program(
    program_id: Pubkey,
    attestation: Pubkey,
    payer: Pubkey,
    instruction: &ProgramInstruction,
) -> CodecResult<Instruction> {
    Ok(Instruction {
        program_id,
        accounts: vec![
            AccountMeta::new(attestation, false),
            AccountMeta::new(payer, true),
            AccountMeta::new_readonly(ids::SYSTEM_PROGRAM, false),
            AccountMeta::new_readonly(ids::INSTRUCTIONS_SYSVAR, false),
        ],
        data: instruction.encode()?,
    })
}

/// Ordered instruction list for one attestation: compute budget, optional
/// signature precompile, then the program call.
pub fn attestation_transaction(
    compute_units: u32,
    identity_proof: Option<&Ed25519Verification>,
    program_call: Instruction,
) -> CodecResult<Vec<Instruction>> {
    let mut instructions = vec![compute_budget(compute_units)];
    if let Some(payload) = identity_proof {
        instructions.push(ed25519_verify(payload)?);
    }
    instructions.push(program_call);
    Ok(instructions)
}
