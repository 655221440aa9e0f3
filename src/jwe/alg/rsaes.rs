use std::fmt::Display;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::crypto::{CryptoProvider, RsaPadding};
use crate::jwe::{Cek, EncryptedKey, JweAlgorithm, KeyEncryption, KeyManagementMode};
use crate::jwk::{RsaPrivateKey, RsaPublicKey};
use crate::util;
use crate::JoseError;

const MIN_KEY_SIZE: usize = 2048;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum RsaesJweAlgorithm {
    /// RSAES-PKCS1-v1_5
    #[deprecated(note = "This algorithm is no longer recommended.")]
    Rsa1_5,
    /// RSAES OAEP using default parameters
    RsaOaep,
    /// RSAES OAEP using SHA-256 and MGF1 with SHA-256
    RsaOaep256,
}

#[allow(deprecated)]
impl RsaesJweAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RSA1_5" => Some(Self::Rsa1_5),
            "RSA-OAEP" => Some(Self::RsaOaep),
            "RSA-OAEP-256" => Some(Self::RsaOaep256),
            _ => None,
        }
    }

    fn padding(&self) -> RsaPadding {
        match self {
            Self::Rsa1_5 => RsaPadding::Pkcs1,
            Self::RsaOaep => RsaPadding::Oaep,
            Self::RsaOaep256 => RsaPadding::Oaep256,
        }
    }

    fn check_key_size(&self, key_size: usize) -> Result<(), JoseError> {
        if key_size < MIN_KEY_SIZE {
            return Err(JoseError::InsufficientKeyLength(anyhow!(
                "The {} key must be {} bits or more: {}",
                self.name(),
                MIN_KEY_SIZE,
                key_size
            )));
        }
        Ok(())
    }
}

#[allow(deprecated)]
impl JweAlgorithm for RsaesJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::Rsa1_5 => "RSA1_5",
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
        }
    }

    fn mode(&self) -> KeyManagementMode {
        KeyManagementMode::KeyEncryption
    }
}

#[allow(deprecated)]
#[async_trait]
impl KeyEncryption for RsaesJweAlgorithm {
    async fn encrypt_key(
        &self,
        provider: &dyn CryptoProvider,
        key: &RsaPublicKey,
        cek: &Cek,
    ) -> Result<EncryptedKey, JoseError> {
        self.check_key_size(key.key_size())?;

        let encrypted_key = provider
            .rsa_encrypt(key, self.padding(), cek.as_ref())
            .await
            .map_err(JoseError::CryptoFailure)?;
        Ok(EncryptedKey::new(encrypted_key))
    }

    async fn decrypt_key(
        &self,
        provider: &dyn CryptoProvider,
        key: &RsaPrivateKey,
        encrypted_key: &EncryptedKey,
        cek_len: usize,
    ) -> Result<Cek, JoseError> {
        self.check_key_size(key.key_size())?;

        match self {
            Self::Rsa1_5 => {
                // RFC7516 section 11.5: a padding failure must be indistinguishable from
                // a tag mismatch, so a random key stands in and content decryption fails.
                let fallback = provider
                    .random_bytes(cek_len)
                    .await
                    .map_err(JoseError::CryptoFailure)?;
                let decrypted = if encrypted_key.len() == util::ceiling(key.key_size(), 8) {
                    provider
                        .rsa_decrypt(key, self.padding(), encrypted_key.as_ref())
                        .await
                        .ok()
                } else {
                    None
                };
                match decrypted {
                    Some(val) if val.len() == cek_len => Ok(Cek::new(val)),
                    _ => Ok(Cek::new(fallback)),
                }
            }
            _ => {
                let decrypted = provider
                    .rsa_decrypt(key, self.padding(), encrypted_key.as_ref())
                    .await
                    .map_err(|_| JoseError::IntegrityCheckFailed)?;
                Ok(Cek::new(decrypted))
            }
        }
    }
}

impl Display for RsaesJweAlgorithm {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::crypto::OpensslProvider;

    const ALGORITHMS: [RsaesJweAlgorithm; 3] = [
        RsaesJweAlgorithm::Rsa1_5,
        RsaesJweAlgorithm::RsaOaep,
        RsaesJweAlgorithm::RsaOaep256,
    ];

    #[tokio::test]
    async fn encrypt_and_decrypt_rsaes() -> Result<()> {
        let provider = OpensslProvider::new();
        let private_key = provider.generate_rsa_key(2048).await?;
        let public_key = private_key.to_public_key();

        for alg in ALGORITHMS {
            let cek = Cek::new(provider.random_bytes(32).await?);
            let encrypted_key = alg.encrypt_key(&provider, &public_key, &cek).await?;
            assert_eq!(encrypted_key.len(), 256);

            let decrypted = alg
                .decrypt_key(&provider, &private_key, &encrypted_key, 32)
                .await?;
            assert_eq!(decrypted, cek);
        }
        Ok(())
    }

    #[tokio::test]
    async fn reject_keys_under_2048_bits() -> Result<()> {
        let provider = OpensslProvider::new();
        let private_key = provider.generate_rsa_key(1024).await?;
        let public_key = private_key.to_public_key();
        let cek = Cek::new(vec![0; 16]);

        for alg in ALGORITHMS {
            assert!(matches!(
                alg.encrypt_key(&provider, &public_key, &cek).await,
                Err(JoseError::InsufficientKeyLength(_))
            ));
            assert!(matches!(
                alg.decrypt_key(&provider, &private_key, &EncryptedKey::new(vec![0; 128]), 16)
                    .await,
                Err(JoseError::InsufficientKeyLength(_))
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn wrong_key_fails_without_oracle() -> Result<()> {
        let provider = OpensslProvider::new();
        let sender_key = provider.generate_rsa_key(2048).await?;
        let other_key = provider.generate_rsa_key(2048).await?;
        let cek = Cek::new(provider.random_bytes(16).await?);

        let encrypted_key = RsaesJweAlgorithm::RsaOaep
            .encrypt_key(&provider, sender_key.public_key(), &cek)
            .await?;
        assert!(matches!(
            RsaesJweAlgorithm::RsaOaep
                .decrypt_key(&provider, &other_key, &encrypted_key, 16)
                .await,
            Err(JoseError::IntegrityCheckFailed)
        ));

        let encrypted_key = RsaesJweAlgorithm::Rsa1_5
            .encrypt_key(&provider, sender_key.public_key(), &cek)
            .await?;
        let substituted = RsaesJweAlgorithm::Rsa1_5
            .decrypt_key(&provider, &other_key, &encrypted_key, 16)
            .await?;
        assert_eq!(substituted.len(), 16);
        assert_ne!(substituted, cek);
        Ok(())
    }
}
