//! Envelope construction and parsing.
//!
//! Four shapes exist, two per direction. On the way in (toward the mixer)
//! an envelope is `seal_mixer( flag ‖ inner )`: the mixer can strip its own
//! layer and read the flag, but the inner ciphertext is addressed to the far
//! role and stays opaque. On the way out the mixer signs the inner
//! ciphertext as-is; receivers verify, strip the signature, and open the
//! inner layer with their own keys.
//!
//! The inner layer differs per direction. A source has no published
//! identity, so its padded plaintext carries its own public key and the
//! whole thing is sealed anonymously to the contact. A contact's key is
//! published, so the reply lane drops the embedded key and uses an
//! authenticated box between the contact's secret and the source's public
//! key instead.
//!
//! Plaintexts are length-prefixed and zero-padded to a fixed field, so no
//! ciphertext length ever depends on message content.

use bytes::Bytes;
use covermix_proto::{
    CONTACT_ENVELOPE_LEN, CONTACT_LANE_PAYLOAD_LEN, CONTACT_PADDED_LEN, Direction, FLAG_DUMMY,
    FLAG_REAL, KEY_LEN, MAX_MESSAGE_LEN, SIGNATURE_LEN, SOURCE_ENVELOPE_LEN,
    SOURCE_LANE_PAYLOAD_LEN, SOURCE_PADDED_LEN, WireError,
};
use crypto_box::{
    SalsaBox,
    aead::{Aead, AeadCore},
};
use ed25519_dalek::Signer;
use rand::{CryptoRng, RngCore};

use crate::{
    error::CryptoError,
    keys::{EncryptionKeyPair, EncryptionPublicKey, SigningKeyPair, VerifyKey},
};

/// Outcome of the mixer stripping an envelope's outer layer.
///
/// Returned by value: every variant except `Forward` is an expected,
/// per-envelope drop, not an error condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Real traffic; the inner ciphertext to sign and forward.
    Forward(Bytes),
    /// Dropped without forwarding.
    Discard(DiscardReason),
}

/// Why the mixer dropped an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Not the one valid length for this direction.
    BadLength,
    /// Outer unseal failed (corrupted, or sealed to a different key).
    Undecryptable,
    /// Well-formed cover traffic; discarded by design.
    Dummy,
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadLength => write!(f, "bad length"),
            Self::Undecryptable => write!(f, "undecryptable"),
            Self::Dummy => write!(f, "dummy"),
        }
    }
}

/// Why a receiving agent dropped a signed drop.
///
/// All of these are silent drops on the agent side: the deaddrop carries
/// dummy traffic by design, so failures to open are the common case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not the one valid length for this direction.
    BadLength,
    /// Mixer signature did not verify.
    BadSignature,
    /// Inner layer would not open with this agent's keys.
    Undecryptable,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadLength => write!(f, "bad length"),
            Self::BadSignature => write!(f, "bad signature"),
            Self::Undecryptable => write!(f, "undecryptable"),
        }
    }
}

/// Append the one-byte length prefix, `body`, and zero padding up to the
/// fixed 255-byte field.
fn pad_into(buf: &mut Vec<u8>, body: &[u8]) {
    debug_assert!(body.len() <= MAX_MESSAGE_LEN);
    buf.push(body.len() as u8);
    buf.extend_from_slice(body);
    buf.resize(buf.len() + (MAX_MESSAGE_LEN - body.len()), 0x00);
}

fn ensure_fits(body: &[u8]) -> Result<(), CryptoError> {
    if body.len() > MAX_MESSAGE_LEN {
        return Err(CryptoError::ContentTooLarge { len: body.len() });
    }
    Ok(())
}

fn expect_len(bytes: &[u8], expected: usize) -> Result<(), CryptoError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(CryptoError::Wire(WireError::LengthMismatch { expected, actual: bytes.len() }))
    }
}

/// Build a Source -> Mixer envelope (385 bytes).
///
/// The padded plaintext embeds `sender_pub` so the contact can address a
/// reply; it is sealed anonymously to `contact_pub`, flagged, and sealed
/// anonymously to `mixer_pub`. Cover traffic uses `is_real = false` and a
/// fresh ephemeral `contact_pub` so it carries no reusable identity.
pub fn seal_source_message(
    rng: &mut (impl RngCore + CryptoRng),
    sender_pub: &EncryptionPublicKey,
    mixer_pub: &EncryptionPublicKey,
    contact_pub: &EncryptionPublicKey,
    body: &[u8],
    is_real: bool,
) -> Result<Bytes, CryptoError> {
    ensure_fits(body)?;

    let mut padded = Vec::with_capacity(SOURCE_PADDED_LEN);
    padded.extend_from_slice(sender_pub.as_bytes());
    pad_into(&mut padded, body);
    debug_assert_eq!(padded.len(), SOURCE_PADDED_LEN);

    let inner = contact_pub.inner().seal(rng, &padded)
        .map_err(|_| CryptoError::Encryption)?;
    expect_len(&inner, SOURCE_LANE_PAYLOAD_LEN)?;

    let mut outer = Vec::with_capacity(1 + inner.len());
    outer.push(if is_real { FLAG_REAL } else { FLAG_DUMMY });
    outer.extend_from_slice(&inner);

    let sealed =
        mixer_pub.inner().seal(rng, &outer).map_err(|_| CryptoError::Encryption)?;
    expect_len(&sealed, SOURCE_ENVELOPE_LEN)?;

    Ok(Bytes::from(sealed))
}

/// Build a Contact -> Mixer envelope (345 bytes).
///
/// The padded plaintext omits the sender key (the contact's is published)
/// and uses an authenticated box between `contact.secret` and `remote_pub`,
/// with the random nonce prefixed to the ciphertext. The flagged result is
/// sealed anonymously to `mixer_pub` as on the source lane.
pub fn seal_contact_message(
    rng: &mut (impl RngCore + CryptoRng),
    contact: &EncryptionKeyPair,
    mixer_pub: &EncryptionPublicKey,
    remote_pub: &EncryptionPublicKey,
    body: &[u8],
    is_real: bool,
) -> Result<Bytes, CryptoError> {
    ensure_fits(body)?;

    let mut padded = Vec::with_capacity(CONTACT_PADDED_LEN);
    pad_into(&mut padded, body);
    debug_assert_eq!(padded.len(), CONTACT_PADDED_LEN);

    let salsa = SalsaBox::new(remote_pub.inner(), contact.secret());
    let nonce = SalsaBox::generate_nonce(&mut *rng);
    let ciphertext = salsa.encrypt(&nonce, padded.as_slice()).map_err(|_| CryptoError::Encryption)?;

    let mut inner = Vec::with_capacity(CONTACT_LANE_PAYLOAD_LEN);
    inner.extend_from_slice(&nonce);
    inner.extend_from_slice(&ciphertext);
    expect_len(&inner, CONTACT_LANE_PAYLOAD_LEN)?;

    let mut outer = Vec::with_capacity(1 + inner.len());
    outer.push(if is_real { FLAG_REAL } else { FLAG_DUMMY });
    outer.extend_from_slice(&inner);

    let sealed =
        mixer_pub.inner().seal(rng, &outer).map_err(|_| CryptoError::Encryption)?;
    expect_len(&sealed, CONTACT_ENVELOPE_LEN)?;

    Ok(Bytes::from(sealed))
}

/// Mixer side: strip the outer layer and classify the envelope.
///
/// Never fails the caller's loop: malformed, undecryptable, and dummy
/// envelopes all come back as [`Classified::Discard`].
pub fn classify_envelope(
    mixer: &EncryptionKeyPair,
    direction: Direction,
    envelope: &[u8],
) -> Classified {
    if envelope.len() != direction.envelope_len() {
        return Classified::Discard(DiscardReason::BadLength);
    }

    let Ok(outer) = mixer.secret().unseal(envelope) else {
        return Classified::Discard(DiscardReason::Undecryptable);
    };

    if outer.len() != 1 + direction.lane_payload_len() {
        return Classified::Discard(DiscardReason::BadLength);
    }

    if outer[0] == FLAG_REAL {
        Classified::Forward(Bytes::copy_from_slice(&outer[1..]))
    } else {
        Classified::Discard(DiscardReason::Dummy)
    }
}

/// Mixer side: sign an inner ciphertext for forwarding.
///
/// Output is `signature(64) ‖ payload`, giving the fixed 400/360-byte drop
/// for the direction. The payload length is checked loudly: handing this
/// function a wrong-sized payload is a bug in the batcher, not traffic.
pub fn sign_drop(
    signing: &SigningKeyPair,
    direction: Direction,
    payload: &[u8],
) -> Result<Bytes, CryptoError> {
    expect_len(payload, direction.lane_payload_len())?;

    let signature = signing.signing().sign(payload);

    let mut out = Vec::with_capacity(direction.signed_len());
    out.extend_from_slice(&signature.to_bytes());
    out.extend_from_slice(payload);
    Ok(Bytes::from(out))
}

/// Far-role side: verify the mixer's signature and strip it.
pub fn verify_drop(
    verify: &VerifyKey,
    direction: Direction,
    drop: &[u8],
) -> Result<Bytes, DropReason> {
    if drop.len() != direction.signed_len() {
        return Err(DropReason::BadLength);
    }

    let (sig_bytes, payload) = drop.split_at(SIGNATURE_LEN);
    let sig_bytes: [u8; SIGNATURE_LEN] = sig_bytes.try_into().map_err(|_| DropReason::BadLength)?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    verify
        .inner()
        .verify_strict(payload, &signature)
        .map_err(|_| DropReason::BadSignature)?;

    Ok(Bytes::copy_from_slice(payload))
}

/// Contact side: open a Mixer -> Contact drop (400 bytes).
///
/// Recovers the source's embedded public key and the plaintext, truncated
/// to the length prefix.
pub fn open_contact_drop(
    contact: &EncryptionKeyPair,
    mixer_verify: &VerifyKey,
    drop: &[u8],
) -> Result<(EncryptionPublicKey, Vec<u8>), DropReason> {
    let payload = verify_drop(mixer_verify, Direction::SourceToContact, drop)?;

    let padded =
        contact.secret().unseal(&payload).map_err(|_| DropReason::Undecryptable)?;
    if padded.len() != SOURCE_PADDED_LEN {
        return Err(DropReason::BadLength);
    }

    let sender =
        EncryptionPublicKey::from_slice(&padded[..KEY_LEN]).map_err(|_| DropReason::BadLength)?;
    let len = usize::from(padded[KEY_LEN]);
    let body = padded[KEY_LEN + 1..KEY_LEN + 1 + len].to_vec();

    Ok((sender, body))
}

/// Source side: open a Mixer -> Source drop (360 bytes).
pub fn open_source_drop(
    source: &EncryptionKeyPair,
    contact_pub: &EncryptionPublicKey,
    mixer_verify: &VerifyKey,
    drop: &[u8],
) -> Result<Vec<u8>, DropReason> {
    let payload = verify_drop(mixer_verify, Direction::ContactToSource, drop)?;

    let (nonce, ciphertext) = payload.split_at(24);
    let salsa = SalsaBox::new(contact_pub.inner(), source.secret());
    let padded = salsa
        .decrypt(crypto_box::Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| DropReason::Undecryptable)?;
    if padded.len() != CONTACT_PADDED_LEN {
        return Err(DropReason::BadLength);
    }

    let len = usize::from(padded[0]);
    Ok(padded[1..1 + len].to_vec())
}

/// Mixer side: an encrypted dummy filler for one output slot.
///
/// Fillers are sealed to fresh ephemeral keys with random padded contents,
/// so they are indistinguishable from real inner ciphertexts under
/// inspection; no receiver holds a key that opens them.
pub fn dummy_lane_payload(
    rng: &mut (impl RngCore + CryptoRng),
    direction: Direction,
) -> Result<Bytes, CryptoError> {
    match direction {
        Direction::SourceToContact => {
            let ephemeral = crypto_box::SecretKey::generate(rng).public_key();
            let mut padded = vec![0u8; SOURCE_PADDED_LEN];
            rng.fill_bytes(&mut padded);

            let sealed =
                ephemeral.seal(rng, &padded).map_err(|_| CryptoError::Encryption)?;
            expect_len(&sealed, SOURCE_LANE_PAYLOAD_LEN)?;
            Ok(Bytes::from(sealed))
        },
        Direction::ContactToSource => {
            let ours = crypto_box::SecretKey::generate(rng);
            let theirs = crypto_box::SecretKey::generate(rng).public_key();
            let mut padded = vec![0u8; CONTACT_PADDED_LEN];
            rng.fill_bytes(&mut padded);

            let salsa = SalsaBox::new(&theirs, &ours);
            let nonce = SalsaBox::generate_nonce(&mut *rng);
            let ciphertext =
                salsa.encrypt(&nonce, padded.as_slice()).map_err(|_| CryptoError::Encryption)?;

            let mut out = Vec::with_capacity(CONTACT_LANE_PAYLOAD_LEN);
            out.extend_from_slice(&nonce);
            out.extend_from_slice(&ciphertext);
            expect_len(&out, CONTACT_LANE_PAYLOAD_LEN)?;
            Ok(Bytes::from(out))
        },
    }
}
