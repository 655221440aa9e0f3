use async_trait::async_trait;
use openssl::memcmp;

use crate::crypto::{CryptoProvider, HashAlgorithm};
use crate::jwe::enc::{check_key_and_iv, JweContentEncryption};
use crate::jwe::{Cek, Ciphertext, Iv, Tag};
use crate::util;
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AesCbcHmacJweEncryption {
    /// AES_128_CBC_HMAC_SHA_256 authenticated encryption algorithm
    A128CbcHs256,
    /// AES_192_CBC_HMAC_SHA_384 authenticated encryption algorithm
    A192CbcHs384,
    /// AES_256_CBC_HMAC_SHA_512 authenticated encryption algorithm
    A256CbcHs512,
}

impl AesCbcHmacJweEncryption {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "A128CBC-HS256" => Some(Self::A128CbcHs256),
            "A192CBC-HS384" => Some(Self::A192CbcHs384),
            "A256CBC-HS512" => Some(Self::A256CbcHs512),
            _ => None,
        }
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Self::A128CbcHs256 => HashAlgorithm::Sha256,
            Self::A192CbcHs384 => HashAlgorithm::Sha384,
            Self::A256CbcHs512 => HashAlgorithm::Sha512,
        }
    }

    fn mac_key_len(&self) -> usize {
        match self {
            Self::A128CbcHs256 => 16,
            Self::A192CbcHs384 => 24,
            Self::A256CbcHs512 => 32,
        }
    }

    async fn compute_tag(
        &self,
        provider: &dyn CryptoProvider,
        mac_key: &[u8],
        aad: &[u8],
        iv: &Iv,
        ciphertext: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let al = util::be64(aad.len() * 8);
        let mut mac = provider
            .hmac_sign(
                self.hash_algorithm(),
                mac_key,
                &[aad, iv.as_ref(), ciphertext, &al],
            )
            .await?;
        mac.truncate(self.tag_len());
        Ok(mac)
    }
}

#[async_trait]
impl JweContentEncryption for AesCbcHmacJweEncryption {
    fn name(&self) -> &str {
        match self {
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
        }
    }

    fn key_len(&self) -> usize {
        self.mac_key_len() * 2
    }

    fn iv_len(&self) -> usize {
        16
    }

    fn tag_len(&self) -> usize {
        self.mac_key_len()
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
        let (mac_key, enc_key) = cek.as_ref().split_at(self.mac_key_len());

        (async {
            let ciphertext = provider.aes_cbc_encrypt(enc_key, iv.as_ref(), plaintext).await?;
            let tag = self
                .compute_tag(provider, mac_key, aad, iv, &ciphertext)
                .await?;
            anyhow::Ok((Ciphertext::new(ciphertext), Tag::new(tag)))
        })
        .await
        .map_err(JoseError::CryptoFailure)
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
        let (mac_key, enc_key) = cek.as_ref().split_at(self.mac_key_len());

        if tag.len() != self.tag_len() {
            return Err(JoseError::IntegrityCheckFailed);
        }

        let expected = self
            .compute_tag(provider, mac_key, aad, iv, ciphertext.as_ref())
            .await
            .map_err(|_| JoseError::IntegrityCheckFailed)?;
        if !memcmp::eq(&expected, tag.as_ref()) {
            return Err(JoseError::IntegrityCheckFailed);
        }

        provider
            .aes_cbc_decrypt(enc_key, iv.as_ref(), ciphertext.as_ref())
            .await
            .map_err(|_| JoseError::IntegrityCheckFailed)
    }

    fn box_clone(&self) -> Box<dyn JweContentEncryption> {
        Box::new(*self)
    }
}
