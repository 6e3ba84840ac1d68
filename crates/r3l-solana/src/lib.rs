//! JSON-RPC ledger client for the R3L attestation program
//!
//! [`RpcLedger`] implements [`r3l_core::ledger::Ledger`] against a
//! Solana-style node: it builds legacy transactions signed by the payer
//! keypair, submits them with preflight simulation and polls for
//! confirmation. "Account already in use" failures surface as
//! [`r3l_core::ledger::LedgerError::AlreadyExists`] so callers can treat a
//! lost creation race as success.

pub mod client;
pub mod error;
pub mod keypair;
pub mod ledger;
pub mod message;

pub use client::RpcClient;
pub use error::{Result, RpcError};
pub use keypair::{parse_keypair, read_keypair_file};
pub use ledger::{RpcLedger, RpcLedgerConfig};
pub use message::{sign_transaction, Message};
