//! The two-level wire envelope: an outer `{message, signature}` and an
//! inner `{version, source, destination, user, timestamp, topic?, data}`.
//!
//! Signing and verification always operate on the encoded inner exactly as
//! it is stored, never on a re-serialized copy — re-serializing before
//! verifying would make verification depend on this process's field
//! ordering rather than the bytes the sender actually signed, the same
//! pitfall the certificate-signing code this crate is descended from took
//! care to avoid by signing a fixed byte layout up front.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::config::Config;
use crate::error::{IpcError, Result};
use crate::logger::Logger;
use crate::signer::Signer;

/// Inner message: the authenticated content of an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    version: u64,
    source: String,
    destination: String,
    user: String,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
    data: String,
}

/// Outer envelope: the inner message plus a detached signature over its
/// exact encoded bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Outer {
    message: String,
    signature: String,
}

/// Result of [`validate`]: distinguishes version mismatch from a failed
/// signature, per the spec's edge case that a valid signature on a future
/// version is still rejected, but as `UnsupportedVersion`, not
/// `BadSignature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid,
    BadSignature,
    UnsupportedVersion,
}

/// Build a new envelope token.
///
/// If `topic` is empty, the field is omitted from the inner JSON entirely
/// rather than serialized as an empty string.
pub fn new(
    source: &str,
    destination: &str,
    data: &[u8],
    topic: Option<&str>,
    config: &Config,
    signer: &dyn Signer,
) -> Result<String> {
    let user = whoami::username();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let message = Message {
        version: config.protocol_version as u64,
        source: source.to_string(),
        destination: destination.to_string(),
        user,
        timestamp,
        topic: topic.filter(|t| !t.is_empty()).map(str::to_string),
        data: codec::encode(data),
    };

    let encoded_inner =
        serde_json::to_string(&message).map_err(|e| IpcError::MalformedJson(e.to_string()))?;
    let signature = signer.sign(encoded_inner.as_bytes())?;

    let outer = Outer {
        message: encoded_inner,
        signature,
    };
    let encoded_outer =
        serde_json::to_string(&outer).map_err(|e| IpcError::MalformedJson(e.to_string()))?;

    Ok(codec::encode(encoded_outer.as_bytes()))
}

fn decode_outer(token: &str) -> Result<Outer> {
    let bytes = codec::decode(token)?;
    serde_json::from_slice(&bytes).map_err(|e| IpcError::MalformedJson(e.to_string()))
}

fn decode_inner(outer: &Outer) -> Result<Message> {
    serde_json::from_str(&outer.message).map_err(|e| IpcError::MalformedJson(e.to_string()))
}

/// Decode the outer envelope, re-verify the signature over the encoded
/// inner exactly as stored, and check the protocol version.
///
/// A future or otherwise unrecognized version is reported as
/// [`Validation::UnsupportedVersion`] even when the signature verifies —
/// version and authenticity are distinct failure classes.
pub fn validate(token: &str, config: &Config, signer: &dyn Signer) -> Result<Validation> {
    let outer = decode_outer(token)?;
    let info = signer.verify(outer.message.as_bytes(), &outer.signature)?;

    let message = decode_inner(&outer)?;
    if message.version != config.protocol_version as u64 {
        return Ok(Validation::UnsupportedVersion);
    }
    if !info.valid {
        return Ok(Validation::BadSignature);
    }
    Ok(Validation::Valid)
}

macro_rules! string_accessor {
    ($name:ident, $field:ident) => {
        /// Read `$field` from the inner message without re-verifying the
        /// signature. Callers needing authenticity must call [`validate`]
        /// first.
        pub fn $name(token: &str) -> Result<String> {
            let outer = decode_outer(token)?;
            let message = decode_inner(&outer)?;
            Ok(message.$field)
        }
    };
}

string_accessor!(get_source, source);
string_accessor!(get_destination, destination);
string_accessor!(get_user, user);

/// Protocol version stamped on the envelope.
pub fn get_version(token: &str) -> Result<u64> {
    let outer = decode_outer(token)?;
    let message = decode_inner(&outer)?;
    Ok(message.version)
}

/// Unix timestamp recorded at send time.
pub fn get_timestamp(token: &str) -> Result<i64> {
    let outer = decode_outer(token)?;
    let message = decode_inner(&outer)?;
    Ok(message.timestamp)
}

/// Decoded payload bytes.
pub fn get_data(token: &str) -> Result<Vec<u8>> {
    let outer = decode_outer(token)?;
    let message = decode_inner(&outer)?;
    codec::decode(&message.data)
}

/// Topic the envelope was published under, if any.
pub fn get_topic(token: &str) -> Result<String> {
    let outer = decode_outer(token)?;
    let message = decode_inner(&outer)?;
    message.topic.ok_or(IpcError::FieldMissing("topic"))
}

/// Signer's display name, as reported by `verify`. Requires re-verifying,
/// since identity is only known after the signature check runs.
pub fn get_signer_name(token: &str, signer: &dyn Signer) -> Result<String> {
    let outer = decode_outer(token)?;
    let info = signer.verify(outer.message.as_bytes(), &outer.signature)?;
    Ok(info.name)
}

/// Signer's email, as reported by `verify`.
pub fn get_signer_email(token: &str, signer: &dyn Signer) -> Result<String> {
    let outer = decode_outer(token)?;
    let info = signer.verify(outer.message.as_bytes(), &outer.signature)?;
    Ok(info.email)
}

/// Signer's key fingerprint, as reported by `verify`.
pub fn get_signer_key(token: &str, signer: &dyn Signer) -> Result<String> {
    let outer = decode_outer(token)?;
    let info = signer.verify(outer.message.as_bytes(), &outer.signature)?;
    Ok(info.key_fingerprint)
}

/// Render a diagnostic block: version and support status, signature
/// validity, signer identity, and pretty-printed payload.
///
/// Never fails on a malformed envelope; every field that cannot be
/// recovered renders as `(unknown)`, and any validation failure is logged
/// rather than propagated.
pub fn dump(token: &str, config: &Config, signer: &dyn Signer, logger: &dyn Logger) -> String {
    let unknown = "(unknown)";

    let outer = match decode_outer(token) {
        Ok(outer) => outer,
        Err(e) => {
            logger.log_warn(&format!("dump: could not decode envelope: {e}"));
            return format!("envelope: {unknown} (could not decode outer envelope)");
        }
    };

    let message = decode_inner(&outer).ok();
    let version = message
        .as_ref()
        .map(|m| m.version.to_string())
        .unwrap_or_else(|| unknown.to_string());
    let version_supported = message
        .as_ref()
        .map(|m| m.version == config.protocol_version as u64)
        .unwrap_or(false);

    let verify_result = signer.verify(outer.message.as_bytes(), &outer.signature);
    let (valid, name, email, key) = match &verify_result {
        Ok(info) => (
            info.valid,
            info.name.clone(),
            info.email.clone(),
            info.key_fingerprint.clone(),
        ),
        Err(e) => {
            logger.log_warn(&format!("dump: signer verification failed: {e}"));
            (false, unknown.to_string(), unknown.to_string(), unknown.to_string())
        }
    };

    let payload = message
        .as_ref()
        .and_then(|m| codec::decode(&m.data).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_else(|| unknown.to_string());

    format!(
        "envelope:\n  version: {version} (supported: {version_supported})\n  signature valid: {valid}\n  signer: {name} <{email}> [{key}]\n  payload: {payload}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{Signer, SignerInfo};

    struct StubSigner {
        valid: bool,
        info: SignerInfo,
    }

    impl Signer for StubSigner {
        fn sign(&self, bytes: &[u8]) -> Result<String> {
            Ok(codec::encode(bytes))
        }

        fn verify(&self, bytes: &[u8], encoded_signature: &str) -> Result<SignerInfo> {
            let expected = codec::encode(bytes);
            let mut info = self.info.clone();
            info.valid = self.valid && expected == encoded_signature;
            Ok(info)
        }
    }

    fn stub_signer() -> StubSigner {
        StubSigner {
            valid: true,
            info: SignerInfo {
                valid: true,
                key_fingerprint: "ABCDEF0123456789ABCDEF0123456789".to_string(),
                email: "ada@example.com".to_string(),
                name: "Ada Lovelace".to_string(),
            },
        }
    }

    #[test]
    fn test_round_trip_with_topic() {
        let config = Config::with_root("/tmp/envelope-test");
        let signer = stub_signer();
        let token = new(
            "svc/a",
            "svc/b",
            b"  spaces survive  ",
            Some("news"),
            &config,
            &signer,
        )
        .unwrap();

        assert_eq!(validate(&token, &config, &signer).unwrap(), Validation::Valid);
        assert_eq!(get_source(&token).unwrap(), "svc/a");
        assert_eq!(get_destination(&token).unwrap(), "svc/b");
        assert_eq!(get_data(&token).unwrap(), b"  spaces survive  ");
        assert_eq!(get_topic(&token).unwrap(), "news");
    }

    #[test]
    fn test_empty_topic_is_omitted() {
        let config = Config::with_root("/tmp/envelope-test");
        let signer = stub_signer();
        let token = new("svc/a", "svc/b", b"hi", Some(""), &config, &signer).unwrap();
        let err = get_topic(&token).unwrap_err();
        assert!(matches!(err, IpcError::FieldMissing("topic")));
    }

    #[test]
    fn test_no_topic_is_field_missing() {
        let config = Config::with_root("/tmp/envelope-test");
        let signer = stub_signer();
        let token = new("svc/a", "svc/b", b"hi", None, &config, &signer).unwrap();
        assert!(get_topic(&token).is_err());
    }

    #[test]
    fn test_tampered_signature_is_bad_signature() {
        let config = Config::with_root("/tmp/envelope-test");
        let mut signer = stub_signer();
        let token = new("svc/a", "svc/b", b"hi", None, &config, &signer).unwrap();
        signer.valid = false;
        assert_eq!(
            validate(&token, &config, &signer).unwrap(),
            Validation::BadSignature
        );
    }

    #[test]
    fn test_future_version_is_unsupported_even_with_valid_signature() {
        let config = Config::with_root("/tmp/envelope-test");
        let signer = stub_signer();
        let token = new("svc/a", "svc/b", b"hi", None, &config, &signer).unwrap();

        let mut future_config = config.clone();
        future_config.protocol_version = config.protocol_version + 1;
        assert_eq!(
            validate(&token, &future_config, &signer).unwrap(),
            Validation::UnsupportedVersion
        );
    }

    #[test]
    fn test_accessors_do_not_require_validation() {
        let config = Config::with_root("/tmp/envelope-test");
        let mut signer = stub_signer();
        let token = new("svc/a", "svc/b", b"hi", None, &config, &signer).unwrap();
        signer.valid = false;
        // Accessors still work even though the signature would now fail.
        assert_eq!(get_source(&token).unwrap(), "svc/a");
    }

    #[test]
    fn test_dump_never_fails_on_garbage() {
        let config = Config::default();
        let signer = stub_signer();
        let logger = crate::logger::TracingLogger;
        let output = dump("not a valid envelope token", &config, &signer, &logger);
        assert!(output.contains("unknown"));
    }

    #[test]
    fn test_dump_renders_signer_identity() {
        let config = Config::with_root("/tmp/envelope-test");
        let signer = stub_signer();
        let logger = crate::logger::TracingLogger;
        let token = new("svc/a", "svc/b", b"payload", None, &config, &signer).unwrap();
        let output = dump(&token, &config, &signer, &logger);
        assert!(output.contains("Ada Lovelace"));
        assert!(output.contains("payload"));
    }
}
