//! C2PA verifier subprocess.
//!
//! The verifier binary is run on a temporary copy of the upload with
//! `TRUST_DIR` pointing at the trust bundle. It prints one JSON object. A
//! non-zero exit means it could not analyse the format; that is not an error,
//! the content simply carries no provenance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use r3l_core::{AuthenticitySignals, ContentId, ProvenanceError, Result};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::process::run_bounded;
use crate::tracing::prefix;

/// MIME prefixes accepted for upload.
pub const ALLOWED_MIME_PREFIXES: [&str; 5] = ["image/", "video/", "audio/", "application/pdf", "text/"];

/// Reject oversized uploads and media types we do not attest.
pub fn validate_upload(bytes: &[u8], mime: Option<&str>, max_bytes: u64) -> Result<()> {
    if bytes.len() as u64 > max_bytes {
        return Err(ProvenanceError::Validation(format!(
            "file too large: {} bytes (max {max_bytes})",
            bytes.len()
        )));
    }
    if let Some(mime) = mime {
        let mime = mime.to_ascii_lowercase();
        if !ALLOWED_MIME_PREFIXES.iter().any(|p| mime.starts_with(p)) {
            return Err(ProvenanceError::Validation(format!("unsupported media type: {mime}")));
        }
    }
    Ok(())
}

/// What the verifier reports. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierOutput {
    pub content_hash: Option<String>,
    pub has_c2pa: bool,
    pub trust_list_match: Option<String>,
    pub validation_state: Option<String>,
    pub digital_source_type: Option<String>,
    pub issuer: Option<String>,
    pub common_name: Option<String>,
    pub software_agent: Option<String>,
    pub signing_time: Option<String>,
    pub cert_fingerprint: Option<String>,
    pub title: Option<String>,
    pub format: Option<String>,
    pub claim_generator: Option<String>,
}

impl VerifierOutput {
    /// Output for content with no provenance, keyed by its own digest.
    pub fn unsigned(bytes: &[u8]) -> Self {
        Self {
            content_hash: Some(ContentId::digest(bytes).to_hex()),
            ..Self::default()
        }
    }

    pub fn signals(&self) -> AuthenticitySignals {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        AuthenticitySignals {
            has_c2pa: self.has_c2pa,
            trust_list_match: text(&self.trust_list_match),
            validation_state: text(&self.validation_state),
            digital_source_type: text(&self.digital_source_type),
            issuer: text(&self.issuer),
            common_name: text(&self.common_name),
            software_agent: text(&self.software_agent),
            signing_time: text(&self.signing_time),
            cert_fingerprint: text(&self.cert_fingerprint),
        }
    }
}

/// Handle on the verifier binary.
#[derive(Debug, Clone)]
pub struct Verifier {
    bin: PathBuf,
    trust_dir: PathBuf,
    timeout: Duration,
}

impl Verifier {
    pub fn new(bin: impl Into<PathBuf>, trust_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            trust_dir: trust_dir.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.verifier_bin, &settings.trust_dir, settings.verifier_timeout())
    }

    /// Verify `bytes`. `filename` only contributes its extension, which the
    /// verifier uses to sniff the format.
    ///
    /// The returned `content_hash` is always the local digest of `bytes`.
    pub async fn verify(&self, bytes: &[u8], filename: Option<&str>) -> Result<VerifierOutput> {
        let suffix = filename
            .and_then(|f| Path::new(f).extension())
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let tmp = tempfile::Builder::new()
            .prefix("r3l-verify-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| ProvenanceError::Internal(format!("temp file: {e}")))?;
        tokio::fs::write(tmp.path(), bytes)
            .await
            .map_err(|e| ProvenanceError::Internal(format!("temp file: {e}")))?;

        let mut command = Command::new(&self.bin);
        command.arg(tmp.path()).env("TRUST_DIR", &self.trust_dir);
        let output = run_bounded(command, "verifier", self.timeout).await?;

        let local = ContentId::digest(bytes).to_hex();
        if !output.status.success() {
            debug!(
                "{} verifier exited with {}, treating as unsigned",
                prefix::VERIFY,
                output.status
            );
            return Ok(VerifierOutput::unsigned(bytes));
        }

        let mut parsed: VerifierOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProvenanceError::Internal(format!("unreadable verifier output: {e}")))?;
        if parsed.content_hash.as_deref() != Some(local.as_str()) {
            warn!(
                reported = parsed.content_hash.as_deref().unwrap_or(""),
                computed = %local,
                "{} verifier content hash disagrees, using local digest",
                prefix::VERIFY
            );
            parsed.content_hash = Some(local);
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validate_upload_size_cap() {
        assert!(validate_upload(&[0; 10], Some("image/png"), 10).is_ok());
        let err = validate_upload(&[0; 11], Some("image/png"), 10).unwrap_err();
        assert!(matches!(err, ProvenanceError::Validation(msg) if msg.contains("too large")));
    }

    #[test]
    fn test_validate_upload_mime_allow_list() {
        for mime in ["image/jpeg", "VIDEO/mp4", "audio/wav", "application/pdf", "text/html"] {
            assert!(validate_upload(b"x", Some(mime), 100).is_ok(), "{mime}");
        }
        assert!(validate_upload(b"x", Some("application/zip"), 100).is_err());
        assert!(validate_upload(b"x", None, 100).is_ok());
    }

    #[test]
    fn test_unsigned_output() {
        let output = VerifierOutput::unsigned(b"hello");
        assert_eq!(
            output.content_hash.as_deref(),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
        assert!(!output.has_c2pa);
        assert_eq!(output.signals(), AuthenticitySignals::default());
    }

    #[test]
    fn test_parse_verifier_json() {
        let json = r#"{
            "path": "photo.jpg",
            "content_hash": "aa",
            "has_c2pa": true,
            "trust_list_match": "official",
            "validation_state": "Trusted",
            "issuer": "Example CA",
            "signing_time": null,
            "actions": ["c2pa.created"]
        }"#;
        let output: VerifierOutput = serde_json::from_str(json).unwrap();
        let signals = output.signals();
        assert!(signals.has_c2pa);
        assert_eq!(signals.trust_list_match, "official");
        assert_eq!(signals.issuer, "Example CA");
        assert_eq!(signals.signing_time, "");
    }

    // `sh` stands in for the verifier binary: it runs the upload as a script.
    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use pretty_assertions::assert_eq;

        fn sh_verifier(trust_dir: &str, timeout: Duration) -> Verifier {
            Verifier::new("sh", trust_dir, timeout)
        }

        #[tokio::test]
        async fn test_nonzero_exit_degrades_to_unsigned() {
            let script = b"exit 3";
            let output = sh_verifier("/trust", Duration::from_secs(5))
                .verify(script, Some("doc.sh"))
                .await
                .unwrap();
            assert_eq!(output, VerifierOutput::unsigned(script));
        }

        #[tokio::test]
        async fn test_trust_dir_and_hash_override() {
            let script = br#"printf '{"content_hash":"bogus","has_c2pa":true,"issuer":"%s"}' "$TRUST_DIR""#;
            let output = sh_verifier("/trust", Duration::from_secs(5))
                .verify(script, None)
                .await
                .unwrap();
            assert!(output.has_c2pa);
            assert_eq!(output.issuer.as_deref(), Some("/trust"));
            assert_eq!(output.content_hash, Some(ContentId::digest(script).to_hex()));
        }

        #[tokio::test]
        async fn test_garbage_output_is_internal_error() {
            let err = sh_verifier("/trust", Duration::from_secs(5))
                .verify(b"echo not-json", None)
                .await
                .unwrap_err();
            assert!(matches!(err, ProvenanceError::Internal(_)));
        }

        #[tokio::test]
        async fn test_hung_verifier_times_out() {
            let err = sh_verifier("/trust", Duration::from_millis(200))
                .verify(b"sleep 5", None)
                .await
                .unwrap_err();
            assert!(matches!(err, ProvenanceError::ExternalTimeout { .. }));
        }
    }
}
