//! Wire keys and the authenticated encryption of garbled table rows.

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, Nonce},
    Aes256Gcm,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

/// Length of a wire key in bytes (an AES-256 key).
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// Errors from row encryption and decryption.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// Decryption failed the integrity check, i.e. the key was wrong.
    #[error("ciphertext failed the integrity check")]
    Integrity,
    #[error("expected a {KEY_LEN} byte key, got {0} bytes")]
    InvalidKeyLength(usize),
}

/// A symmetric key representing one clear value on one wire.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(#[serde_as(as = "Base64")] [u8; KEY_LEN]);

impl Key {
    /// Public marker for a clear 0 on the sink wire.
    pub const CLEAR_ZERO: Key = Key::marker(b'0');
    /// Public marker for a clear 1 on the sink wire.
    pub const CLEAR_ONE: Key = Key::marker(b'1');

    const fn marker(byte: u8) -> Key {
        let mut bytes = [0u8; KEY_LEN];
        bytes[KEY_LEN - 1] = byte;
        Key(bytes)
    }

    /// Generates a fresh random key.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let key = Aes256Gcm::generate_key(&mut *rng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&key);
        Key(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Key(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = CipherError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; KEY_LEN]>::try_from(bytes)
            .map(Key)
            .map_err(|_| CipherError::InvalidKeyLength(bytes.len()))
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Only a short suffix is printed so that logs never carry whole keys.
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(..")?;
        for byte in &self.0[KEY_LEN - 3..] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// The two keys of a wire, for clear values 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair(pub Key, pub Key);

impl KeyPair {
    /// Draws two independent random keys.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        KeyPair(Key::random(rng), Key::random(rng))
    }

    /// The fixed pair carried by the sink wire.
    pub fn clear_markers() -> Self {
        KeyPair(Key::CLEAR_ZERO, Key::CLEAR_ONE)
    }

    /// Returns the key for clear value `bit`.
    pub fn select(&self, bit: bool) -> Key {
        if bit {
            self.1
        } else {
            self.0
        }
    }

    /// Maps a key back to its clear value, if it belongs to this pair.
    pub fn decode(&self, key: &Key) -> Option<bool> {
        if *key == self.0 {
            Some(false)
        } else if *key == self.1 {
            Some(true)
        } else {
            None
        }
    }
}

/// Encrypts `plaintext` under `key`, returning `nonce || ciphertext`.
pub fn encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &Key,
    plaintext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let nonce = Aes256Gcm::generate_nonce(&mut *rng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, plaintext)
        .map_err(|_| CipherError::Integrity)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts `nonce || ciphertext` produced by [`encrypt`].
pub fn decrypt(key: &Key, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    if ciphertext.len() < NONCE_LEN {
        return Err(CipherError::Integrity);
    }
    let (nonce, ciphertext) = ciphertext.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::<Aes256Gcm>::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::Integrity)
}

/// Encrypts an output key for one truth table row.
///
/// The payload is encrypted under `inner` first (when the gate has a second
/// input) and the result under `outer`.
pub fn encrypt_row<R: RngCore + CryptoRng>(
    rng: &mut R,
    outer: &Key,
    inner: Option<&Key>,
    payload: &Key,
) -> Result<Vec<u8>, CipherError> {
    match inner {
        Some(inner) => {
            let layer = encrypt(rng, inner, payload.as_ref())?;
            encrypt(rng, outer, &layer)
        }
        None => encrypt(rng, outer, payload.as_ref()),
    }
}

/// Reverses [`encrypt_row`]. Fails with [`CipherError::Integrity`] if either
/// key does not match the row.
pub fn decrypt_row(outer: &Key, inner: Option<&Key>, row: &[u8]) -> Result<Key, CipherError> {
    let layer = decrypt(outer, row)?;
    let payload = match inner {
        Some(inner) => decrypt(inner, &layer)?,
        None => layer,
    };
    Key::try_from(payload.as_slice())
}
