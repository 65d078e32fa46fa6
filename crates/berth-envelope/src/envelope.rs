//! Symmetric cipher over workflow continuations.
//!
//! Key material is derived exactly once, at construction; the derived key
//! is immutable and shared read-only across all envelope operations for
//! the life of the process.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;

use crate::error::{EnvelopeError, EnvelopeResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const DERIVATION_ITERATIONS: u32 = 65_536;

/// An encrypted payload plus the IV it was encrypted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// AES-256-CBC envelope keyed from a passphrase+salt pair.
#[derive(Clone)]
pub struct Envelope {
    key: Option<[u8; KEY_LEN]>,
}

impl Envelope {
    /// Derive the key from passphrase and salt (PBKDF2-HMAC-SHA256).
    pub fn derive(passphrase: &str, salt: &str) -> Self {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<sha2::Sha256>(
            passphrase.as_bytes(),
            salt.as_bytes(),
            DERIVATION_ITERATIONS,
            &mut key,
        );
        Self { key: Some(key) }
    }

    /// An envelope with no key material. Every operation fails with
    /// `EnvelopeError::KeyMaterial`; used when the crypto configuration
    /// file is absent so the failure surfaces per-message rather than at
    /// startup.
    pub fn uninitialized() -> Self {
        Self { key: None }
    }

    fn key(&self) -> EnvelopeResult<&[u8; KEY_LEN]> {
        self.key.as_ref().ok_or(EnvelopeError::KeyMaterial)
    }

    /// Encrypt a plaintext under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> EnvelopeResult<Sealed> {
        let key = self.key()?;

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext =
            Aes256CbcEnc::new(key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        Ok(Sealed {
            iv: iv.to_vec(),
            ciphertext,
        })
    }

    /// Decrypt a sealed payload.
    pub fn decrypt(&self, sealed: &Sealed) -> EnvelopeResult<Vec<u8>> {
        let key = self.key()?;

        let iv: [u8; IV_LEN] = sealed
            .iv
            .as_slice()
            .try_into()
            .map_err(|_| EnvelopeError::Malformed(format!("iv is {} bytes", sealed.iv.len())))?;

        Aes256CbcDec::new(key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&sealed.ciphertext)
            .map_err(|e| EnvelopeError::Crypto(e.to_string()))
    }
}
