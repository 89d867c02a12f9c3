//! Credential Vault (spec §4.2 "encrypts credentials", §9 "Credential
//! encryption placeholder").
//!
//! The source system this engine replaces "encrypts" credentials with
//! base64, which is not encryption. The open issue the design notes
//! record is explicit: the production system must integrate a real
//! KMS; this crate's only binding contract is that `encrypt`/`decrypt`
//! round-trip and that plaintext secrets never leave this module. What
//! follows is an HMAC-keystream stream cipher plus an authentication
//! tag — meaningfully more honest than a bare base64 encode, but still
//! explicitly not a KMS-backed AEAD, and callers must not treat it as
//! one.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("ciphertext failed tag verification, possible tampering")]
    TamperedCiphertext,
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),
    #[error("master key must be non-empty")]
    EmptyKey,
}

/// Symmetric master key the vault derives per-secret keystreams from.
/// Never logged, never serialized.
#[derive(Clone)]
pub struct VaultKey(Vec<u8>);

impl VaultKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, VaultError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(VaultError::EmptyKey);
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, VaultError> {
        let bytes = hex::decode(s).map_err(|e| VaultError::MalformedEncoding(e.to_string()))?;
        Self::new(bytes)
    }

    /// Generates a fresh random 32-byte key, for bootstrapping a vault
    /// when no key is configured (tests, first-run dev setups).
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(REDACTED)")
    }
}

/// An encrypted secret at rest. Only this triple is ever persisted by
/// the Integration Registry; the plaintext credentials JSON never is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub ciphertext_b64: String,
    pub nonce_hex: String,
    pub tag_hex: String,
}

/// HMAC-SHA256 counter-mode keystream: block_i = HMAC(key, nonce || i),
/// concatenated and truncated to `len` bytes.
fn keystream(key: &[u8], nonce: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
        mac.update(nonce);
        mac.update(&counter.to_be_bytes());
        out.extend_from_slice(&mac.finalize().into_bytes());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn authentication_tag(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(nonce);
    mac.update(ciphertext);
    mac.finalize().into_bytes().into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// The Credential Vault. Holds the master key and performs the only
/// encrypt/decrypt operations the engine is allowed to perform on
/// integration credentials.
pub struct CredentialVault {
    key: VaultKey,
}

impl CredentialVault {
    pub fn new(key: VaultKey) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> EncryptedSecret {
        let mut nonce = vec![0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let stream = keystream(&self.key.0, &nonce, plaintext.len());
        let ciphertext: Vec<u8> = plaintext.iter().zip(stream.iter()).map(|(p, s)| p ^ s).collect();
        let tag = authentication_tag(&self.key.0, &nonce, &ciphertext);
        EncryptedSecret {
            ciphertext_b64: BASE64.encode(&ciphertext),
            nonce_hex: hex::encode(&nonce),
            tag_hex: hex::encode(tag),
        }
    }

    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<Vec<u8>, VaultError> {
        let nonce = hex::decode(&secret.nonce_hex).map_err(|e| VaultError::MalformedEncoding(e.to_string()))?;
        let ciphertext = BASE64.decode(&secret.ciphertext_b64).map_err(|e| VaultError::MalformedEncoding(e.to_string()))?;
        let expected_tag = hex::decode(&secret.tag_hex).map_err(|e| VaultError::MalformedEncoding(e.to_string()))?;

        let actual_tag = authentication_tag(&self.key.0, &nonce, &ciphertext);
        if !constant_time_eq(&actual_tag, &expected_tag) {
            return Err(VaultError::TamperedCiphertext);
        }

        let stream = keystream(&self.key.0, &nonce, ciphertext.len());
        Ok(ciphertext.iter().zip(stream.iter()).map(|(c, s)| c ^ s).collect())
    }

    /// Encrypts a credentials JSON blob for storage on an
    /// `Integration::connection_config.credentials` field (spec §4.2
    /// "encrypts credentials").
    pub fn encrypt_json(&self, value: &serde_json::Value) -> EncryptedSecret {
        self.encrypt(value.to_string().as_bytes())
    }

    /// Recovers the plaintext credentials JSON. Callers must not persist
    /// or log the result; it exists only for the lifetime of the
    /// adapter construction call that needs it.
    pub fn decrypt_json(&self, secret: &EncryptedSecret) -> Result<serde_json::Value, VaultError> {
        let bytes = self.decrypt(secret)?;
        serde_json::from_slice(&bytes).map_err(|e| VaultError::MalformedEncoding(e.to_string()))
    }
}
