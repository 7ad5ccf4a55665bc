//! Signing and signature verification.
//!
//! The envelope layer treats signing as an opaque, swappable operation: it
//! hands raw bytes to a [`Signer`] and gets back a token it embeds verbatim.
//! The reference backend, [`GpgSigner`], shells out to the system `gpg`
//! binary the way the identity layer this crate is descended from delegated
//! key operations to an external process, and parses `gpg`'s own
//! verification report rather than re-implementing OpenPGP.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use regex::Regex;

use crate::error::{IpcError, Result};

/// Result of verifying a signature: whether it was valid, and whatever the
/// backend could determine about the signer's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerInfo {
    /// Whether the signature verified against the given bytes.
    pub valid: bool,
    /// Signer's key fingerprint, or `"unknown"` if the backend's report
    /// could not be parsed.
    pub key_fingerprint: String,
    /// Signer's email address, or `"unknown"`.
    pub email: String,
    /// Signer's display name, or `"unknown"`.
    pub name: String,
}

impl SignerInfo {
    fn unknown(valid: bool) -> Self {
        Self {
            valid,
            key_fingerprint: "unknown".to_string(),
            email: "unknown".to_string(),
            name: "unknown".to_string(),
        }
    }
}

/// A backend capable of producing and checking detached signatures.
pub trait Signer: Send + Sync {
    /// Sign `bytes`, returning an opaque, encoded signature token.
    fn sign(&self, bytes: &[u8]) -> Result<String>;

    /// Verify `encoded_signature` (as produced by [`Signer::sign`]) over
    /// `bytes`, returning what the backend could determine about the
    /// signer even when the signature does not verify.
    fn verify(&self, bytes: &[u8], encoded_signature: &str) -> Result<SignerInfo>;
}

/// Reference [`Signer`] backed by the system `gpg` binary.
///
/// Subprocess invocations are serialized behind an internal mutex: spawning
/// `gpg` concurrently from the same process is not guaranteed safe against
/// its own lock/state files, so callers may share one `GpgSigner` across
/// threads without racing it themselves.
pub struct GpgSigner {
    gpg_path: std::path::PathBuf,
    /// Optional `-u`/`--local-user` key identifier for signing.
    signing_key: Option<String>,
    call_lock: Mutex<()>,
}

impl GpgSigner {
    /// Locate `gpg` on `PATH` and build a signer around it, using the
    /// default secret key for signing.
    pub fn new() -> Result<Self> {
        let gpg_path = which::which("gpg")
            .map_err(|e| IpcError::SignerUnavailable(format!("gpg not found: {e}")))?;
        Ok(Self {
            gpg_path,
            signing_key: None,
            call_lock: Mutex::new(()),
        })
    }

    /// Build a signer that signs with a specific key identifier.
    pub fn with_signing_key(mut self, key_id: impl Into<String>) -> Self {
        self.signing_key = Some(key_id.into());
        self
    }

    fn fingerprint_regex() -> Regex {
        Regex::new(r"\b[0-9A-Fa-f]{32,}\b").expect("static regex is valid")
    }

    fn identity_regex() -> Regex {
        Regex::new(r#""([^"<]+?)\s*<([^">]+)>""#).expect("static regex is valid")
    }

    fn parse_verify_report(report: &str, valid: bool) -> SignerInfo {
        let mut info = SignerInfo::unknown(valid);

        if let Some(m) = Self::fingerprint_regex().find(report) {
            info.key_fingerprint = m.as_str().to_uppercase();
        }
        if let Some(caps) = Self::identity_regex().captures(report) {
            info.name = caps[1].trim().to_string();
            info.email = caps[2].trim().to_string();
        }
        info
    }
}

impl Signer for GpgSigner {
    fn sign(&self, bytes: &[u8]) -> Result<String> {
        let _guard = self.call_lock.lock().unwrap();

        let mut cmd = Command::new(&self.gpg_path);
        cmd.arg("--batch")
            .arg("--yes")
            .arg("--armor")
            .arg("--detach-sign");
        if let Some(key) = &self.signing_key {
            cmd.arg("--local-user").arg(key);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| IpcError::SignerUnavailable(format!("failed to spawn gpg: {e}")))?;
        child
            .stdin
            .as_mut()
            .expect("stdin was piped")
            .write_all(bytes)
            .map_err(|e| IpcError::SignerUnavailable(format!("failed to write to gpg: {e}")))?;

        let output = child
            .wait_with_output()
            .map_err(|e| IpcError::SignerUnavailable(format!("failed to run gpg: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IpcError::SignerUnavailable(format!(
                "gpg sign failed: {stderr}"
            )));
        }

        Ok(crate::codec::encode(&output.stdout))
    }

    fn verify(&self, bytes: &[u8], encoded_signature: &str) -> Result<SignerInfo> {
        let _guard = self.call_lock.lock().unwrap();

        let signature = crate::codec::decode(encoded_signature)?;

        let sig_file = tempfile::NamedTempFile::new()
            .map_err(|e| IpcError::SignerUnavailable(format!("failed to create tempfile: {e}")))?;
        std::fs::write(sig_file.path(), &signature)
            .map_err(|e| IpcError::SignerUnavailable(format!("failed to write signature: {e}")))?;

        let mut cmd = Command::new(&self.gpg_path);
        cmd.arg("--batch")
            .arg("--verify")
            .arg(sig_file.path())
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| IpcError::SignerUnavailable(format!("failed to spawn gpg: {e}")))?;
        child
            .stdin
            .as_mut()
            .expect("stdin was piped")
            .write_all(bytes)
            .map_err(|e| IpcError::SignerUnavailable(format!("failed to write to gpg: {e}")))?;

        let output = child
            .wait_with_output()
            .map_err(|e| IpcError::SignerUnavailable(format!("failed to run gpg: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(Self::parse_verify_report(&stderr, output.status.success()))
    }
}
