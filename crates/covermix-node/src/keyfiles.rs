//! Key-file persistence.
//!
//! Keys live as single-line lowercase hex files in one directory:
//!
//! ```text
//! keys/
//!   mixer_key_private.hex        mixer_key.hex
//!   mixer_sign_key_private.hex   mixer_sign_key.hex
//!   contact_1_key_private.hex    contact_1_key.hex
//!   source_key_private.hex       source_key.hex
//! ```
//!
//! Public `.hex` files are what gets published through the relay; the
//! `_private` files never leave the owning role's machine.

use std::{
    fs,
    path::{Path, PathBuf},
};

use covermix_crypto::{EncryptionKeyPair, MixerKeySet, SigningKeyPair};
use rand::{CryptoRng, RngCore};

use crate::error::NodeError;

/// Handle to a key directory.
#[derive(Debug, Clone)]
pub struct KeyDir {
    root: PathBuf,
}

impl KeyDir {
    /// Wrap a directory path; nothing is touched until read or seed.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn write_line(&self, name: &str, value: &str) -> Result<(), NodeError> {
        fs::write(self.path(name), format!("{value}\n"))?;
        Ok(())
    }

    fn read_line(&self, name: &str) -> Result<String, NodeError> {
        let content = fs::read_to_string(self.path(name))?;
        Ok(content.lines().next().unwrap_or_default().to_string())
    }

    /// Generate and persist a complete key set: mixer encryption + signing,
    /// `contacts` contact pairs, and one source pair.
    pub fn seed(
        &self,
        rng: &mut (impl RngCore + CryptoRng),
        contacts: u32,
    ) -> Result<(), NodeError> {
        fs::create_dir_all(&self.root)?;

        let mixer = MixerKeySet::generate(rng);
        self.write_line("mixer_key_private.hex", &mixer.encryption.secret_hex())?;
        self.write_line("mixer_key.hex", &mixer.encryption.public().to_hex())?;
        self.write_line("mixer_sign_key_private.hex", &mixer.signing.secret_hex())?;
        self.write_line("mixer_sign_key.hex", &mixer.signing.verify_key().to_hex())?;

        for id in 1..=contacts {
            let pair = EncryptionKeyPair::generate(rng);
            self.write_line(&format!("contact_{id}_key_private.hex"), &pair.secret_hex())?;
            self.write_line(&format!("contact_{id}_key.hex"), &pair.public().to_hex())?;
        }

        let source = EncryptionKeyPair::generate(rng);
        self.write_line("source_key_private.hex", &source.secret_hex())?;
        self.write_line("source_key.hex", &source.public().to_hex())?;

        tracing::info!(dir = %self.root.display(), contacts, "seeded key directory");
        Ok(())
    }

    /// Load the mixer's private key set.
    pub fn load_mixer(&self) -> Result<MixerKeySet, NodeError> {
        let encryption =
            EncryptionKeyPair::from_secret_hex(&self.read_line("mixer_key_private.hex")?)?;
        let signing =
            SigningKeyPair::from_secret_hex(&self.read_line("mixer_sign_key_private.hex")?)?;
        Ok(MixerKeySet { encryption, signing })
    }

    /// Load one contact's private pair.
    pub fn load_contact(&self, id: u32) -> Result<EncryptionKeyPair, NodeError> {
        let line = self.read_line(&format!("contact_{id}_key_private.hex"))?;
        Ok(EncryptionKeyPair::from_secret_hex(&line)?)
    }

    /// Load the source's private pair.
    pub fn load_source(&self) -> Result<EncryptionKeyPair, NodeError> {
        Ok(EncryptionKeyPair::from_secret_hex(&self.read_line("source_key_private.hex")?)?)
    }

    /// The directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn seed_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyDir::new(dir.path());

        let mut rng = ChaCha20Rng::seed_from_u64(5);
        keys.seed(&mut rng, 2).unwrap();

        let mixer = keys.load_mixer().unwrap();
        assert_eq!(
            mixer.encryption.public().to_hex(),
            keys.read_line("mixer_key.hex").unwrap()
        );
        assert_eq!(
            mixer.signing.verify_key().to_hex(),
            keys.read_line("mixer_sign_key.hex").unwrap()
        );

        let contact = keys.load_contact(2).unwrap();
        assert_eq!(contact.public().to_hex(), keys.read_line("contact_2_key.hex").unwrap());

        let source = keys.load_source().unwrap();
        assert_eq!(source.public().to_hex(), keys.read_line("source_key.hex").unwrap());
    }

    #[test]
    fn missing_key_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyDir::new(dir.path());

        assert!(matches!(keys.load_mixer(), Err(NodeError::Io(_))));
    }
}
