//! Program instruction payloads.

use super::buffer::{Reader, Writer};
use super::{discriminator, STRING_FIELDS};
use super::error::{CodecError, CodecResult};
use crate::address::Pubkey;
use crate::content::ContentId;
use crate::record::{AuthenticitySignals, LedgerIdentity, Versioning};

/// Longest string the ledger program stores per field.
pub const MAX_STRING_LEN: usize = 128;

pub(crate) fn check_len(field: &'static str, s: &str) -> CodecResult<()> {
    if s.len() > MAX_STRING_LEN {
        return Err(CodecError::StringTooLong {
            field,
            len: s.len(),
            max: MAX_STRING_LEN,
        });
    }
    Ok(())
}

/// Absent keys and hashes are written as all-zero blocks.
pub(crate) fn write_optional<const N: usize>(w: &mut Writer, value: Option<&[u8; N]>) {
    match value {
        Some(bytes) => w.fixed(bytes),
        None => w.fixed(&[0u8; N]),
    };
}

pub(crate) fn read_optional<const N: usize>(
    r: &mut Reader<'_>,
    field: &'static str,
) -> CodecResult<Option<[u8; N]>> {
    let bytes: [u8; N] = r.array(field)?;
    Ok(if bytes == [0u8; N] { None } else { Some(bytes) })
}

fn write_identity_tail(w: &mut Writer, identity: &LedgerIdentity, versioning: &Versioning) {
    write_optional(w, identity.email_hash.as_ref());
    write_optional(w, identity.wallet.as_ref().map(Pubkey::as_bytes));
    w.string(&versioning.verifier_version);
    w.string(&versioning.trust_bundle_hash);
}

fn check_identity(identity: &LedgerIdentity, versioning: &Versioning) -> CodecResult<()> {
    check_len("email_domain", &identity.email_domain)?;
    check_len("verifier_version", &versioning.verifier_version)?;
    check_len("trust_bundle_hash", &versioning.trust_bundle_hash)
}

/// `submit_attestation`: the verifier-backed attestation write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationInstruction {
    pub content_id: ContentId,
    pub signals: AuthenticitySignals,
    pub identity: LedgerIdentity,
    pub versioning: Versioning,
}

impl AttestationInstruction {
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let strings = self.signals.strings();
        for (field, value) in STRING_FIELDS.into_iter().zip(strings) {
            check_len(field, value)?;
        }
        check_identity(&self.identity, &self.versioning)?;

        let mut w = Writer::with_discriminator(&discriminator::SUBMIT_ATTESTATION);
        w.fixed(self.content_id.as_bytes()).bool(self.signals.has_c2pa);
        for value in strings {
            w.string(value);
        }
        w.string(&self.identity.email_domain);
        write_identity_tail(&mut w, &self.identity, &self.versioning);
        Ok(w.finish())
    }

    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = Reader::new(data);
        r.discriminator(&discriminator::SUBMIT_ATTESTATION)?;
        let instruction = Self::decode_body(&mut r)?;
        r.expect_end()?;
        Ok(instruction)
    }

    fn decode_body(r: &mut Reader<'_>) -> CodecResult<Self> {
        let content_id = ContentId::from_bytes(r.array("content_hash")?);
        let has_c2pa = r.bool("has_c2pa")?;
        let mut strings: [String; 8] = Default::default();
        for (slot, field) in strings.iter_mut().zip(STRING_FIELDS) {
            *slot = r.string(field)?;
        }
        let email_domain = r.string("email_domain")?;
        let email_hash = read_optional::<32>(r, "email_hash")?;
        let wallet = read_optional::<32>(r, "wallet")?.map(Pubkey::new_from_array);
        let verifier_version = r.string("verifier_version")?;
        let trust_bundle_hash = r.string("trust_bundle_hash")?;

        Ok(Self {
            content_id,
            signals: AuthenticitySignals::from_strings(has_c2pa, strings),
            identity: LedgerIdentity {
                email_domain,
                email_hash,
                wallet,
            },
            versioning: Versioning {
                verifier_version,
                trust_bundle_hash,
            },
        })
    }
}

/// `submit_proof`: a zero-knowledge proof stands in for the trusted verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofInstruction {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
    pub content_id: ContentId,
    pub identity: LedgerIdentity,
    pub versioning: Versioning,
}

impl ProofInstruction {
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        check_identity(&self.identity, &self.versioning)?;

        let mut w = Writer::with_discriminator(&discriminator::SUBMIT_PROOF);
        w.blob(&self.proof)
            .blob(&self.public_inputs)
            .fixed(self.content_id.as_bytes())
            .string(&self.identity.email_domain);
        write_identity_tail(&mut w, &self.identity, &self.versioning);
        Ok(w.finish())
    }

    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = Reader::new(data);
        r.discriminator(&discriminator::SUBMIT_PROOF)?;
        let proof = r.blob("proof")?.to_vec();
        let public_inputs = r.blob("public_inputs")?.to_vec();
        let content_id = ContentId::from_bytes(r.array("content_hash")?);
        let email_domain = r.string("email_domain")?;
        let email_hash = read_optional::<32>(&mut r, "email_hash")?;
        let wallet = read_optional::<32>(&mut r, "wallet")?.map(Pubkey::new_from_array);
        let verifier_version = r.string("verifier_version")?;
        let trust_bundle_hash = r.string("trust_bundle_hash")?;
        r.expect_end()?;

        Ok(Self {
            proof,
            public_inputs,
            content_id,
            identity: LedgerIdentity {
                email_domain,
                email_hash,
                wallet,
            },
            versioning: Versioning {
                verifier_version,
                trust_bundle_hash,
            },
        })
    }
}

/// Either program instruction, selected by discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramInstruction {
    Attestation(AttestationInstruction),
    Proof(ProofInstruction),
}

impl ProgramInstruction {
    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = Reader::new(data);
        let disc: [u8; 8] = r.array("discriminator")?;
        match disc {
            discriminator::SUBMIT_ATTESTATION => {
                AttestationInstruction::decode(data).map(ProgramInstruction::Attestation)
            }
            discriminator::SUBMIT_PROOF => ProofInstruction::decode(data).map(ProgramInstruction::Proof),
            other => Err(CodecError::UnknownDiscriminator(other)),
        }
    }

    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        match self {
            ProgramInstruction::Attestation(ix) => ix.encode(),
            ProgramInstruction::Proof(ix) => ix.encode(),
        }
    }

    pub fn content_id(&self) -> &ContentId {
        match self {
            ProgramInstruction::Attestation(ix) => &ix.content_id,
            ProgramInstruction::Proof(ix) => &ix.content_id,
        }
    }

    pub fn identity(&self) -> &LedgerIdentity {
        match self {
            ProgramInstruction::Attestation(ix) => &ix.identity,
            ProgramInstruction::Proof(ix) => &ix.identity,
        }
    }
}
