use async_trait::async_trait;

use crate::crypto::CryptoProvider;
use crate::jwe::enc::{check_key_and_iv, JweContentEncryption};
use crate::jwe::{Cek, Ciphertext, Iv, Tag};
use crate::util;
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AesGcmJweEncryption {
    /// AES GCM using 128-bit key
    A128Gcm,
    /// AES GCM using 192-bit key
    A192Gcm,
    /// AES GCM using 256-bit key
    A256Gcm,
}

impl AesGcmJweEncryption {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "A128GCM" => Some(Self::A128Gcm),
            "A192GCM" => Some(Self::A192Gcm),
            "A256GCM" => Some(Self::A256Gcm),
            _ => None,
        }
    }
}

#[async_trait]
impl JweContentEncryption for AesGcmJweEncryption {
    fn name(&self) -> &str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    fn key_len(&self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm => 32,
        }
    }

    fn iv_len(&self) -> usize {
        12
    }

    fn tag_len(&self) -> usize {
        16
    }

    async fn encrypt(
        &self,
        provider: &dyn CryptoProvider,
        cek: &Cek,
        iv: &Iv,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Ciphertext, Tag), JoseError> {
        check_key_and_iv(self, cek, iv)?;

        let mut encrypted = provider
            .aes_gcm_encrypt(cek.as_ref(), iv.as_ref(), aad, plaintext)
            .await
            .map_err(JoseError::CryptoFailure)?;
        if encrypted.len() < self.tag_len() {
            return Err(JoseError::CryptoFailure(anyhow::anyhow!(
                "The AES-GCM output is shorter than the tag."
            )));
        }
        let tag = encrypted.split_off(encrypted.len() - self.tag_len());
        Ok((Ciphertext::new(encrypted), Tag::new(tag)))
    }

    async fn decrypt(
        &self,
        provider: &dyn CryptoProvider,
        cek: &Cek,
        iv: &Iv,
        aad: &[u8],
        ciphertext: &Ciphertext,
        tag: &Tag,
    ) -> Result<Vec<u8>, JoseError> {
        check_key_and_iv(self, cek, iv)?;
        if tag.len() != self.tag_len() {
            return Err(JoseError::IntegrityCheckFailed);
        }

        let combined = util::concat(&[ciphertext.as_ref(), tag.as_ref()]);
        provider
            .aes_gcm_decrypt(cek.as_ref(), iv.as_ref(), aad, &combined)
            .await
            .map_err(|_| JoseError::IntegrityCheckFailed)
    }

    fn box_clone(&self) -> Box<dyn JweContentEncryption> {
        Box::new(*self)
    }
}
