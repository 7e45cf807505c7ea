//! Audit signing and verification.
//!
//! Audits are signed with a local Ed25519 key over their canonical binary
//! encoding. Keys are identified by the SHA-256 hex fingerprint of the
//! 32-byte public key; verification looks the claimed fingerprint up in a
//! local trusted-keys file (one hex-encoded public key per line).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::codec;
use crate::model::{Audit, SignedAudit};
use crate::platform::data_dir;

const SIGNING_KEY_FILE: &str = "signing.key";
const TRUSTED_KEYS_FILE: &str = "trusted_keys";

#[derive(Debug, Error)]
pub enum SignError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no signing key at {0}; run `hexprov keygen` first")]
    NoSigningKey(PathBuf),
    #[error("malformed key material: {0}")]
    MalformedKey(String),
    #[error("no trusted key matches fingerprint {0}")]
    UnknownFingerprint(String),
    #[error("signature verification failed")]
    BadSignature,
}

/// SHA-256 hex fingerprint of a public key.
pub fn fingerprint(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Signs an audit's canonical encoding.
pub fn sign_audit(audit: Audit, key: &SigningKey) -> SignedAudit {
    let signature = key.sign(&codec::encode_audit(&audit));
    SignedAudit {
        audit,
        signature: signature.to_bytes().to_vec(),
    }
}

/// Verifies a signed audit against the trusted key matching its claimed
/// fingerprint.
pub fn verify_audit(signed: &SignedAudit, trusted: &[VerifyingKey]) -> Result<(), SignError> {
    let claimed = &signed.audit.public_key_fingerprint;
    let key = trusted
        .iter()
        .find(|key| &fingerprint(key) == claimed)
        .ok_or_else(|| SignError::UnknownFingerprint(claimed.clone()))?;

    let signature = Signature::from_slice(&signed.signature)
        .map_err(|_| SignError::BadSignature)?;
    key.verify(&codec::encode_audit(&signed.audit), &signature)
        .map_err(|_| SignError::BadSignature)
}

/// On-disk home of the local signing key and the trusted-keys file.
pub struct Keystore {
    dir: PathBuf,
}

impl Keystore {
    pub fn new() -> Self {
        Self { dir: data_dir() }
    }

    pub fn with_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn signing_key_path(&self) -> PathBuf {
        self.dir.join(SIGNING_KEY_FILE)
    }

    fn trusted_keys_path(&self) -> PathBuf {
        self.dir.join(TRUSTED_KEYS_FILE)
    }

    /// Generates a fresh signing key, stores its seed, registers its
    /// public half as trusted, and returns the fingerprint.
    pub fn generate(&self) -> Result<String, SignError> {
        fs::create_dir_all(&self.dir)?;
        let signing_key = SigningKey::generate(&mut OsRng);
        fs::write(self.signing_key_path(), hex::encode(signing_key.to_bytes()))?;

        let verifying_key = signing_key.verifying_key();
        self.trust(&verifying_key)?;
        Ok(fingerprint(&verifying_key))
    }

    /// Loads the local signing key.
    pub fn signing_key(&self) -> Result<SigningKey, SignError> {
        let path = self.signing_key_path();
        if !path.exists() {
            return Err(SignError::NoSigningKey(path));
        }
        let seed_hex = fs::read_to_string(&path)?;
        let seed_bytes = hex::decode(seed_hex.trim())
            .map_err(|e| SignError::MalformedKey(e.to_string()))?;
        let seed: [u8; 32] = seed_bytes
            .try_into()
            .map_err(|_| SignError::MalformedKey("seed must be 32 bytes".to_string()))?;
        Ok(SigningKey::from_bytes(&seed))
    }

    /// All trusted public keys. Missing file means nothing is trusted.
    pub fn trusted_keys(&self) -> Result<Vec<VerifyingKey>, SignError> {
        let path = self.trusted_keys_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for line in fs::read_to_string(&path)?.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let bytes = hex::decode(line).map_err(|e| SignError::MalformedKey(e.to_string()))?;
            let bytes: [u8; 32] = bytes
                .try_into()
                .map_err(|_| SignError::MalformedKey("public key must be 32 bytes".to_string()))?;
            let key = VerifyingKey::from_bytes(&bytes)
                .map_err(|e| SignError::MalformedKey(e.to_string()))?;
            keys.push(key);
        }
        Ok(keys)
    }

    /// Appends a public key to the trusted-keys file if not already there.
    pub fn trust(&self, key: &VerifyingKey) -> Result<(), SignError> {
        fs::create_dir_all(&self.dir)?;
        let line = hex::encode(key.as_bytes());
        let path = self.trusted_keys_path();
        let existing = if path.exists() {
            fs::read_to_string(&path)?
        } else {
            String::new()
        };
        if existing.lines().any(|l| l.trim() == line) {
            return Ok(());
        }
        fs::write(&path, format!("{}{}\n", existing, line))?;
        Ok(())
    }
}

impl Default for Keystore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Package, Verdict};

    fn sample_audit(fingerprint: String) -> Audit {
        Audit::new(Package::new("plug", "1.14.2"), fingerprint, 1_700_000_000)
            .with_verdict(Verdict::Lgtm)
            .with_message("diffed against v1.14.2")
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let audit = sample_audit(fingerprint(&verifying_key));
        let signed = sign_audit(audit, &signing_key);

        verify_audit(&signed, &[verifying_key]).unwrap();
    }

    #[test]
    fn test_verify_rejects_tampered_audit() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let audit = sample_audit(fingerprint(&verifying_key));
        let mut signed = sign_audit(audit, &signing_key);
        signed.audit.package.version = "1.14.3".to_string();

        assert!(matches!(
            verify_audit(&signed, &[verifying_key]),
            Err(SignError::BadSignature)
        ));
    }

    #[test]
    fn test_verify_rejects_unknown_fingerprint() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let audit = sample_audit("deadbeef".to_string());
        let signed = sign_audit(audit, &signing_key);

        assert!(matches!(
            verify_audit(&signed, &[signing_key.verifying_key()]),
            Err(SignError::UnknownFingerprint(_))
        ));
    }

    #[test]
    fn test_keystore_generate_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let keystore = Keystore::with_dir(dir.path());

        let generated_fingerprint = keystore.generate().unwrap();
        let signing_key = keystore.signing_key().unwrap();
        assert_eq!(
            fingerprint(&signing_key.verifying_key()),
            generated_fingerprint
        );

        // The new key is trusted immediately
        let trusted = keystore.trusted_keys().unwrap();
        assert_eq!(trusted.len(), 1);
        assert_eq!(fingerprint(&trusted[0]), generated_fingerprint);
    }

    #[test]
    fn test_trust_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let keystore = Keystore::with_dir(dir.path());
        let key = SigningKey::generate(&mut OsRng).verifying_key();

        keystore.trust(&key).unwrap();
        keystore.trust(&key).unwrap();
        assert_eq!(keystore.trusted_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_signing_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let keystore = Keystore::with_dir(dir.path());
        assert!(matches!(
            keystore.signing_key(),
            Err(SignError::NoSigningKey(_))
        ));
    }
}
