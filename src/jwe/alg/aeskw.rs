use std::fmt::Display;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::crypto::CryptoProvider;
use crate::jwe::{
    Cek, EncryptedKey, HeaderUpdates, JweAlgorithm, JweHeader, KeyManagementMode, KeyWrapping,
};
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AeskwJweAlgorithm {
    /// AES Key Wrap with default initial value using 128-bit key
    A128kw,
    /// AES Key Wrap with default initial value using 192-bit key
    A192kw,
    /// AES Key Wrap with default initial value using 256-bit key
    A256kw,
}

impl AeskwJweAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "A128KW" => Some(Self::A128kw),
            "A192KW" => Some(Self::A192kw),
            "A256KW" => Some(Self::A256kw),
            _ => None,
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            Self::A128kw => 16,
            Self::A192kw => 24,
            Self::A256kw => 32,
        }
    }

    pub(crate) fn check_key(&self, key: &[u8]) -> Result<(), JoseError> {
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

    /// Wrap a key with RFC3394 AES Key Wrap.
    pub(crate) async fn wrap_key(
        &self,
        provider: &dyn CryptoProvider,
        kek: &[u8],
        cek: &Cek,
    ) -> Result<EncryptedKey, JoseError> {
        self.check_key(kek)?;
        let wrapped = provider
            .aes_kw_wrap(kek, cek.as_ref())
            .await
            .map_err(JoseError::CryptoFailure)?;
        Ok(EncryptedKey::new(wrapped))
    }

    /// Unwrap a key. A failed integrity check is reported as `IntegrityCheckFailed`.
    pub(crate) async fn unwrap_key(
        &self,
        provider: &dyn CryptoProvider,
        kek: &[u8],
        encrypted_key: &EncryptedKey,
    ) -> Result<Cek, JoseError> {
        self.check_key(kek)?;
        let unwrapped = provider
            .aes_kw_unwrap(kek, encrypted_key.as_ref())
            .await
            .map_err(|_| JoseError::IntegrityCheckFailed)?;
        Ok(Cek::new(unwrapped))
    }
}

impl JweAlgorithm for AeskwJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::A128kw => "A128KW",
            Self::A192kw => "A192KW",
            Self::A256kw => "A256KW",
        }
    }

    fn mode(&self) -> KeyManagementMode {
        KeyManagementMode::KeyWrapping
    }
}

#[async_trait]
impl KeyWrapping for AeskwJweAlgorithm {
    async fn wrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        cek: &Cek,
        _header: &JweHeader,
    ) -> Result<(EncryptedKey, HeaderUpdates), JoseError> {
        let encrypted_key = self.wrap_key(provider, key, cek).await?;
        Ok((encrypted_key, HeaderUpdates::new()))
    }

    async fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        encrypted_key: &EncryptedKey,
        _header: &JweHeader,
    ) -> Result<Cek, JoseError> {
        self.unwrap_key(provider, key, encrypted_key).await
    }
}

impl Display for AeskwJweAlgorithm {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}
