//! AES-128-CBC encryption keyed by the session secret.
//!
//! The scheme carries no authentication tag. A forged or corrupted datagram
//! that still unpads cleanly is accepted; this matches the voice server and
//! must stay wire compatible.

use std::fmt;

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::ProtocolError;
use crate::uuid::Uuid;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const KEY_LENGTH: usize = 16;
pub const IV_LENGTH: usize = 16;

/// The secret's halves, big-endian, used directly as the AES key.
#[must_use]
pub fn derive_key(secret: Uuid) -> [u8; KEY_LENGTH] {
    secret.to_bytes()
}

/// Symmetric cipher for one session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCrypto {
    key: [u8; KEY_LENGTH],
}

impl SessionCrypto {
    #[must_use]
    pub fn new(secret: Uuid) -> Self {
        Self {
            key: derive_key(secret),
        }
    }

    /// Encrypts under a fresh random IV and returns `iv ++ ciphertext`.
    #[must_use]
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let iv: [u8; IV_LENGTH] = rand::random();
        self.encrypt_with_iv(plaintext, iv)
    }

    fn encrypt_with_iv(&self, plaintext: &[u8], iv: [u8; IV_LENGTH]) -> Vec<u8> {
        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut blob = Vec::with_capacity(IV_LENGTH + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        blob
    }

    /// Splits off the leading IV and decrypts the remainder.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decryption`] when the blob is shorter than an IV,
    /// is not block aligned, or has invalid padding.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if blob.len() < IV_LENGTH {
            return Err(ProtocolError::Decryption);
        }
        let (iv, ciphertext) = blob.split_at(IV_LENGTH);
        let iv: [u8; IV_LENGTH] = iv.try_into().map_err(|_| ProtocolError::Decryption)?;

        Aes128CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ProtocolError::Decryption)
    }
}

impl fmt::Debug for SessionCrypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCrypto").finish_non_exhaustive()
    }
}
