//! Key pairs for the three roles.
//!
//! Two kinds exist: X25519 encryption pairs (Source, Contact, Mixer) and an
//! Ed25519 signing pair (Mixer only). Public keys travel as lowercase hex;
//! private keys never leave their owning process except through the explicit
//! key-file helpers in the node binary.
//!
//! # Security
//!
//! `Debug` impls redact secret material so key pairs can appear in logs and
//! error context without leaking. Always keep that property when extending
//! these types.

use covermix_proto::{KEY_LEN, wire};
use rand::{CryptoRng, RngCore};

use crate::error::CryptoError;

fn parse_key_bytes(s: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = wire::decode_hex(s.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    <[u8; KEY_LEN]>::try_from(bytes.as_slice())
        .map_err(|_| CryptoError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", bytes.len())))
}

/// A published X25519 public encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionPublicKey(crypto_box::PublicKey);

impl EncryptionPublicKey {
    /// Construct from raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(crypto_box::PublicKey::from(bytes))
    }

    /// Construct from a byte slice of exactly [`KEY_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        <[u8; KEY_LEN]>::try_from(bytes)
            .map(Self::from_bytes)
            .map_err(|_| CryptoError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", bytes.len())))
    }

    /// Parse from the published hex form.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        parse_key_bytes(s).map(Self::from_bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        self.0.as_bytes()
    }

    /// Hex form for publication.
    pub fn to_hex(&self) -> String {
        wire::encode_hex(self.as_bytes())
    }

    pub(crate) fn inner(&self) -> &crypto_box::PublicKey {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EncryptionPublicKey").field(&self.to_hex()).finish()
    }
}

impl std::fmt::Display for EncryptionPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// An X25519 encryption key pair.
#[derive(Clone)]
pub struct EncryptionKeyPair {
    secret: crypto_box::SecretKey,
    public: EncryptionPublicKey,
}

impl EncryptionKeyPair {
    /// Generate a fresh pair from caller-provided entropy.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let secret = crypto_box::SecretKey::generate(rng);
        Self::from_secret(secret)
    }

    /// Rebuild a pair from stored secret bytes.
    pub fn from_secret_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self::from_secret(crypto_box::SecretKey::from(bytes))
    }

    /// Rebuild a pair from a stored single-line hex secret.
    pub fn from_secret_hex(s: &str) -> Result<Self, CryptoError> {
        parse_key_bytes(s).map(Self::from_secret_bytes)
    }

    fn from_secret(secret: crypto_box::SecretKey) -> Self {
        let public = EncryptionPublicKey(secret.public_key());
        Self { secret, public }
    }

    /// The matching public key.
    pub fn public(&self) -> &EncryptionPublicKey {
        &self.public
    }

    /// Hex form of the secret, for key-file persistence only.
    pub fn secret_hex(&self) -> String {
        wire::encode_hex(&self.secret.to_bytes())
    }

    pub(crate) fn secret(&self) -> &crypto_box::SecretKey {
        &self.secret
    }
}

impl std::fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("public", &self.public.to_hex())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A published Ed25519 verify key.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyKey(ed25519_dalek::VerifyingKey);

impl VerifyKey {
    /// Parse from the published hex form.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = parse_key_bytes(s)?;
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        self.0.as_bytes()
    }

    /// Hex form for publication.
    pub fn to_hex(&self) -> String {
        wire::encode_hex(self.as_bytes())
    }

    pub(crate) fn inner(&self) -> &ed25519_dalek::VerifyingKey {
        &self.0
    }
}

impl std::fmt::Debug for VerifyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("VerifyKey").field(&self.to_hex()).finish()
    }
}

/// An Ed25519 signing key pair. Only the mixer holds one.
#[derive(Clone)]
pub struct SigningKeyPair {
    signing: ed25519_dalek::SigningKey,
    verify: VerifyKey,
}

impl SigningKeyPair {
    /// Generate a fresh pair from caller-provided entropy.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut seed = [0u8; KEY_LEN];
        rng.fill_bytes(&mut seed);
        Self::from_secret_bytes(seed)
    }

    /// Rebuild a pair from stored secret bytes.
    pub fn from_secret_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let signing = ed25519_dalek::SigningKey::from_bytes(&bytes);
        let verify = VerifyKey(signing.verifying_key());
        Self { signing, verify }
    }

    /// Rebuild a pair from a stored single-line hex secret.
    pub fn from_secret_hex(s: &str) -> Result<Self, CryptoError> {
        parse_key_bytes(s).map(Self::from_secret_bytes)
    }

    /// The matching verify key.
    pub fn verify_key(&self) -> &VerifyKey {
        &self.verify
    }

    /// Hex form of the secret, for key-file persistence only.
    pub fn secret_hex(&self) -> String {
        wire::encode_hex(&self.signing.to_bytes())
    }

    pub(crate) fn signing(&self) -> &ed25519_dalek::SigningKey {
        &self.signing
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("verify", &self.verify.to_hex())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The mixer's complete private key material.
///
/// The mixer is the only principal holding both an encryption secret (to
/// strip outer layers) and the signing secret (to stamp outgoing drops).
#[derive(Debug, Clone)]
pub struct MixerKeySet {
    /// Encryption pair whose public half every sender seals to.
    pub encryption: EncryptionKeyPair,
    /// Signing pair whose verify half every receiver checks against.
    pub signing: SigningKeyPair,
}

impl MixerKeySet {
    /// Generate both pairs from caller-provided entropy.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self {
            encryption: EncryptionKeyPair::generate(rng),
            signing: SigningKeyPair::generate(rng),
        }
    }
}
