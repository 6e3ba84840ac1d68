//! Payer keypair files: a JSON array of 64 bytes (secret then public half).

use std::path::Path;

use ed25519_dalek::SigningKey;

use crate::error::{Result, RpcError};

pub fn parse_keypair(json: &str) -> Result<SigningKey> {
    let bytes: Vec<u8> = serde_json::from_str(json).map_err(|e| RpcError::Keypair(e.to_string()))?;
    let bytes: [u8; 64] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| RpcError::Keypair(format!("expected 64 bytes, got {}", bytes.len())))?;
    SigningKey::from_keypair_bytes(&bytes).map_err(|e| RpcError::Keypair(e.to_string()))
}

pub fn read_keypair_file(path: impl AsRef<Path>) -> Result<SigningKey> {
    let json = std::fs::read_to_string(path)?;
    parse_keypair(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn keypair_json(seed: u8) -> String {
        let key = SigningKey::from_bytes(&[seed; 32]);
        serde_json::to_string(&key.to_keypair_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_read_keypair_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(keypair_json(5).as_bytes()).unwrap();

        let key = read_keypair_file(file.path()).unwrap();
        assert_eq!(key.to_bytes(), [5; 32]);
    }

    #[test]
    fn test_mismatched_public_half_rejected() {
        let mut bytes = SigningKey::from_bytes(&[5; 32]).to_keypair_bytes();
        bytes[63] ^= 1;
        let json = serde_json::to_string(&bytes.to_vec()).unwrap();
        assert!(matches!(parse_keypair(&json), Err(RpcError::Keypair(_))));
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(parse_keypair("[1, 2, 3]"), Err(RpcError::Keypair(_))));
        assert!(matches!(parse_keypair("not json"), Err(RpcError::Keypair(_))));
    }
}
