pub mod aescbc_hmac;
pub mod aesgcm;

use std::fmt::Debug;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::crypto::CryptoProvider;
use crate::jwe::{Cek, Ciphertext, Iv, Tag};
use crate::JoseError;

pub use crate::jwe::enc::aescbc_hmac::AesCbcHmacJweEncryption;
pub use crate::jwe::enc::aesgcm::AesGcmJweEncryption;

/// The enc header values registered by RFC7518.
pub(crate) const REGISTERED_NAMES: &[&str] = &[
    "A128CBC-HS256",
    "A192CBC-HS384",
    "A256CBC-HS512",
    "A128GCM",
    "A192GCM",
    "A256GCM",
];

/// Represent a algorithm of JWE enc header claim.
#[async_trait]
pub trait JweContentEncryption: Debug + Send + Sync {
    /// Return the "enc" (encryption) header parameter value of JWE.
    fn name(&self) -> &str;

    /// Return the content encryption key size in bytes.
    fn key_len(&self) -> usize;

    fn iv_len(&self) -> usize;

    fn tag_len(&self) -> usize;

    /// Generate a random content encryption key of the required size.
    async fn generate_cek(&self, provider: &dyn CryptoProvider) -> Result<Cek, JoseError> {
        let key = provider
            .random_bytes(self.key_len())
            .await
            .map_err(JoseError::CryptoFailure)?;
        Ok(Cek::new(key))
    }

    async fn encrypt(
        &self,
        provider: &dyn CryptoProvider,
        cek: &Cek,
        iv: &Iv,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Ciphertext, Tag), JoseError>;

    /// Authenticate and decrypt. Every failure is reported as `IntegrityCheckFailed`.
    async fn decrypt(
        &self,
        provider: &dyn CryptoProvider,
        cek: &Cek,
        iv: &Iv,
        aad: &[u8],
        ciphertext: &Ciphertext,
        tag: &Tag,
    ) -> Result<Vec<u8>, JoseError>;

    fn box_clone(&self) -> Box<dyn JweContentEncryption>;
}

impl Clone for Box<dyn JweContentEncryption> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Check the CEK and IV sizes shared by every content encryption.
pub(crate) fn check_key_and_iv(
    cencryption: &dyn JweContentEncryption,
    cek: &Cek,
    iv: &Iv,
) -> Result<(), JoseError> {
    if cek.len() < cencryption.key_len() {
        return Err(JoseError::InsufficientKeyLength(anyhow!(
            "The {} key must be {} bytes: {}",
            cencryption.name(),
            cencryption.key_len(),
            cek.len()
        )));
    }
    if cek.len() != cencryption.key_len() {
        return Err(JoseError::InvalidKeyFormat(anyhow!(
            "The {} key must be {} bytes: {}",
            cencryption.name(),
            cencryption.key_len(),
            cek.len()
        )));
    }
    if iv.len() != cencryption.iv_len() {
        return Err(JoseError::InvalidOptions(anyhow!(
            "The {} initialization vector must be {} bytes: {}",
            cencryption.name(),
            cencryption.iv_len(),
            iv.len()
        )));
    }
    Ok(())
}
