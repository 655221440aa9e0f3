use std::fmt::Display;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use crate::crypto::CryptoProvider;
use crate::jwe::{
    Cek, EncryptedKey, HeaderUpdates, JweAlgorithm, JweHeader, KeyManagementMode, KeyWrapping,
};
use crate::util;
use crate::JoseError;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AesgcmkwJweAlgorithm {
    /// Key wrapping with AES GCM using 128-bit key
    A128gcmkw,
    /// Key wrapping with AES GCM using 192-bit key
    A192gcmkw,
    /// Key wrapping with AES GCM using 256-bit key
    A256gcmkw,
}

impl AesgcmkwJweAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "A128GCMKW" => Some(Self::A128gcmkw),
            "A192GCMKW" => Some(Self::A192gcmkw),
            "A256GCMKW" => Some(Self::A256gcmkw),
            _ => None,
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            Self::A128gcmkw => 16,
            Self::A192gcmkw => 24,
            Self::A256gcmkw => 32,
        }
    }

    /// Wrap the CEK reusing the initialization vector already set in the iv header claim.
    ///
    /// The caller is responsible for never reusing an iv with the same key.
    ///
    /// # Arguments
    ///
    /// * `provider` - The crypto provider
    /// * `key` - The key encryption key
    /// * `cek` - The content encryption key
    /// * `header` - The effective header, which must contain iv
    pub async fn wrap_with_fixed_iv(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        cek: &Cek,
        header: &JweHeader,
    ) -> Result<(EncryptedKey, HeaderUpdates), JoseError> {
        let iv = match header.initialization_vector() {
            Some(val) => val,
            None => {
                return Err(JoseError::InvalidOptions(anyhow!(
                    "The iv header claim is required to wrap with a fixed iv."
                )))
            }
        };
        self.wrap_with_iv(provider, key, cek, &iv).await
    }

    fn check_key(&self, key: &[u8]) -> Result<(), JoseError> {
        if key.len() < self.key_len() {
            return Err(JoseError::InsufficientKeyLength(anyhow!(
                "The {} key must be {} bytes: {}",
                self.name(),
                self.key_len(),
                key.len()
            )));
        }
        if key.len() != self.key_len() {
            return Err(JoseError::InvalidKeyFormat(anyhow!(
                "The {} key must be {} bytes: {}",
                self.name(),
                self.key_len(),
                key.len()
            )));
        }
        Ok(())
    }

    async fn wrap_with_iv(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        cek: &Cek,
        iv: &[u8],
    ) -> Result<(EncryptedKey, HeaderUpdates), JoseError> {
        self.check_key(key)?;
        if iv.len() != IV_LEN {
            return Err(JoseError::InvalidOptions(anyhow!(
                "The {} iv must be {} bytes: {}",
                self.name(),
                IV_LEN,
                iv.len()
            )));
        }

        let mut encrypted = provider
            .aes_gcm_encrypt(key, iv, &[], cek.as_ref())
            .await
            .map_err(JoseError::CryptoFailure)?;
        if encrypted.len() < TAG_LEN {
            return Err(JoseError::CryptoFailure(anyhow!(
                "The AES-GCM output is shorter than the tag."
            )));
        }
        let tag = encrypted.split_off(encrypted.len() - TAG_LEN);

        let mut updates = HeaderUpdates::new();
        updates.insert(
            "iv".to_string(),
            Value::String(util::encode_base64_urlsafe_nopad(iv)),
        );
        updates.insert(
            "tag".to_string(),
            Value::String(util::encode_base64_urlsafe_nopad(&tag)),
        );
        Ok((EncryptedKey::new(encrypted), updates))
    }
}

impl JweAlgorithm for AesgcmkwJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::A128gcmkw => "A128GCMKW",
            Self::A192gcmkw => "A192GCMKW",
            Self::A256gcmkw => "A256GCMKW",
        }
    }

    fn mode(&self) -> KeyManagementMode {
        KeyManagementMode::KeyWrapping
    }
}

#[async_trait]
impl KeyWrapping for AesgcmkwJweAlgorithm {
    async fn wrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        cek: &Cek,
        header: &JweHeader,
    ) -> Result<(EncryptedKey, HeaderUpdates), JoseError> {
        if header.contains("iv") {
            return Err(JoseError::InvalidOptions(anyhow!(
                "The iv header claim must not be set unless a fixed iv is requested."
            )));
        }

        let iv = provider
            .random_bytes(IV_LEN)
            .await
            .map_err(JoseError::CryptoFailure)?;
        self.wrap_with_iv(provider, key, cek, &iv).await
    }

    async fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        encrypted_key: &EncryptedKey,
        header: &JweHeader,
    ) -> Result<Cek, JoseError> {
        self.check_key(key)?;

        let iv = match header.initialization_vector() {
            Some(val) => val,
            None => {
                return Err(JoseError::MalformedHeader(anyhow!(
                    "The iv header claim is required for {}.",
                    self.name()
                )))
            }
        };
        let tag = match header.authentication_tag() {
            Some(val) => val,
            None => {
                return Err(JoseError::MalformedHeader(anyhow!(
                    "The tag header claim is required for {}.",
                    self.name()
                )))
            }
        };
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(JoseError::IntegrityCheckFailed);
        }

        let combined = util::concat(&[encrypted_key.as_ref(), &tag]);
        let unwrapped = provider
            .aes_gcm_decrypt(key, &iv, &[], &combined)
            .await
            .map_err(|_| JoseError::IntegrityCheckFailed)?;
        Ok(Cek::new(unwrapped))
    }
}

impl Display for AesgcmkwJweAlgorithm {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::crypto::OpensslProvider;

    fn apply(header: &mut JweHeader, updates: HeaderUpdates) -> Result<()> {
        let mut map = header.clone().into_map();
        map.extend(updates);
        *header = JweHeader::from_map(map)?;
        Ok(())
    }

    #[tokio::test]
    async fn wrap_and_unwrap_aesgcmkw() -> Result<()> {
        let provider = OpensslProvider::new();

        for alg in [
            AesgcmkwJweAlgorithm::A128gcmkw,
            AesgcmkwJweAlgorithm::A192gcmkw,
            AesgcmkwJweAlgorithm::A256gcmkw,
        ] {
            let key = provider.random_bytes(alg.key_len()).await?;
            let cek = Cek::new(provider.random_bytes(32).await?);
            let mut header = JweHeader::new();

            let (encrypted_key, updates) = alg.wrap(&provider, &key, &cek, &header).await?;
            assert_eq!(encrypted_key.len(), 32);
            assert!(updates.contains_key("iv"));
            assert!(updates.contains_key("tag"));

            apply(&mut header, updates)?;
            assert_eq!(header.initialization_vector().map(|v| v.len()), Some(12));
            assert_eq!(header.authentication_tag().map(|v| v.len()), Some(16));

            let unwrapped = alg.unwrap(&provider, &key, &encrypted_key, &header).await?;
            assert_eq!(unwrapped, cek);

            let mut tampered = header.clone();
            tampered.set_authentication_tag(vec![0; 16]);
            assert!(matches!(
                alg.unwrap(&provider, &key, &encrypted_key, &tampered).await,
                Err(JoseError::IntegrityCheckFailed)
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn unwrap_requires_iv_and_tag() -> Result<()> {
        let provider = OpensslProvider::new();
        let alg = AesgcmkwJweAlgorithm::A128gcmkw;
        let key = vec![0; 16];

        let mut header = JweHeader::new();
        let encrypted_key = EncryptedKey::new(vec![0; 16]);
        assert!(matches!(
            alg.unwrap(&provider, &key, &encrypted_key, &header).await,
            Err(JoseError::MalformedHeader(_))
        ));

        header.set_initialization_vector(vec![0; 12]);
        assert!(matches!(
            alg.unwrap(&provider, &key, &encrypted_key, &header).await,
            Err(JoseError::MalformedHeader(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn fixed_iv_is_reused() -> Result<()> {
        let provider = OpensslProvider::new();
        let alg = AesgcmkwJweAlgorithm::A256gcmkw;
        let key = provider.random_bytes(32).await?;
        let cek = Cek::new(provider.random_bytes(16).await?);

        let mut header = JweHeader::new();
        header.set_initialization_vector(vec![7; 12]);

        assert!(matches!(
            alg.wrap(&provider, &key, &cek, &header).await,
            Err(JoseError::InvalidOptions(_))
        ));

        let (encrypted_key, updates) = alg.wrap_with_fixed_iv(&provider, &key, &cek, &header).await?;
        assert_eq!(
            updates.get("iv").and_then(|v| v.as_str()),
            Some(util::encode_base64_urlsafe_nopad(vec![7; 12]).as_str())
        );

        apply(&mut header, updates)?;
        let unwrapped = alg.unwrap(&provider, &key, &encrypted_key, &header).await?;
        assert_eq!(unwrapped, cek);

        assert!(matches!(
            alg.wrap_with_fixed_iv(&provider, &key, &cek, &JweHeader::new()).await,
            Err(JoseError::InvalidOptions(_))
        ));
        Ok(())
    }
}
