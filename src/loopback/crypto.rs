use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum LoopbackCryptoError {
    #[error("AEAD operation failed")]
    Aead,
    #[error("Sealed value is shorter than its IV")]
    Truncated,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Fill a fresh 256-bit key from the OS RNG
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// AES-256-GCM under a single key; sealed values are `iv || ciphertext`
pub struct SealingKey {
    key: [u8; KEY_LEN],
}

impl SealingKey {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn from_slice(key: &[u8]) -> Result<Self, LoopbackCryptoError> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| LoopbackCryptoError::InvalidKeyLength)?;
        Ok(Self { key })
    }

    pub fn generate() -> Self {
        Self::new(generate_key())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn seal(&self, data: &[u8]) -> Result<Vec<u8>, LoopbackCryptoError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), data)
            .map_err(|_| LoopbackCryptoError::Aead)?;

        Ok([iv.as_slice(), ciphertext.as_slice()].concat())
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, LoopbackCryptoError> {
        if sealed.len() < IV_LEN {
            return Err(LoopbackCryptoError::Truncated);
        }
        let (iv, ciphertext) = sealed.split_at(IV_LEN);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| LoopbackCryptoError::Aead)
    }

    pub fn seal_base64(&self, data: &[u8]) -> Result<String, LoopbackCryptoError> {
        Ok(BASE64.encode(self.seal(data)?))
    }

    pub fn open_base64(&self, sealed: &str) -> Result<Vec<u8>, LoopbackCryptoError> {
        self.open(&BASE64.decode(sealed)?)
    }

    /// Wrap another key under this one
    pub fn wrap(&self, key: &SealingKey) -> Result<String, LoopbackCryptoError> {
        self.seal_base64(key.as_bytes())
    }

    pub fn unwrap_key(&self, wrapped: &str) -> Result<SealingKey, LoopbackCryptoError> {
        SealingKey::from_slice(&self.open_base64(wrapped)?)
    }
}
