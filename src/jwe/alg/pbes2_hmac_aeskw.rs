use std::fmt::Display;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{Number, Value};
use zeroize::Zeroizing;

use crate::crypto::{CryptoProvider, HashAlgorithm};
use crate::jwe::alg::aeskw::AeskwJweAlgorithm;
use crate::jwe::{
    Cek, EncryptedKey, HeaderUpdates, JweAlgorithm, JweHeader, KeyManagementMode, KeyWrapping,
};
use crate::util;
use crate::JoseError;

/// The p2s length generated when the header does not carry one.
pub const DEFAULT_SALT_LEN: usize = 16;

/// The p2c value used when the header does not carry one.
pub const DEFAULT_ITERATIONS: u64 = 1000;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Pbes2HmacAeskwJweAlgorithm {
    /// PBES2 with HMAC SHA-256 and "A128KW" wrapping
    Pbes2Hs256A128kw,
    /// PBES2 with HMAC SHA-384 and "A192KW" wrapping
    Pbes2Hs384A192kw,
    /// PBES2 with HMAC SHA-512 and "A256KW" wrapping
    Pbes2Hs512A256kw,
}

impl Pbes2HmacAeskwJweAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "PBES2-HS256+A128KW" => Some(Self::Pbes2Hs256A128kw),
            "PBES2-HS384+A192KW" => Some(Self::Pbes2Hs384A192kw),
            "PBES2-HS512+A256KW" => Some(Self::Pbes2Hs512A256kw),
            _ => None,
        }
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Pbes2Hs256A128kw => HashAlgorithm::Sha256,
            Self::Pbes2Hs384A192kw => HashAlgorithm::Sha384,
            Self::Pbes2Hs512A256kw => HashAlgorithm::Sha512,
        }
    }

    fn keywrap(&self) -> AeskwJweAlgorithm {
        match self {
            Self::Pbes2Hs256A128kw => AeskwJweAlgorithm::A128kw,
            Self::Pbes2Hs384A192kw => AeskwJweAlgorithm::A192kw,
            Self::Pbes2Hs512A256kw => AeskwJweAlgorithm::A256kw,
        }
    }

    /// Return the PBKDF2 salt: UTF8(alg) || 0x00 || p2s.
    fn salt(&self, p2s: &[u8]) -> Vec<u8> {
        util::concat(&[self.name().as_bytes(), &[0], p2s])
    }

    async fn derive_key(
        &self,
        provider: &dyn CryptoProvider,
        password: &[u8],
        p2s: &[u8],
        p2c: u64,
    ) -> Result<Zeroizing<Vec<u8>>, JoseError> {
        if password.is_empty() {
            return Err(JoseError::InvalidKeyFormat(anyhow!(
                "The {} password must not be empty.",
                self.name()
            )));
        }
        if p2c == 0 {
            return Err(JoseError::MalformedHeader(anyhow!(
                "The p2c header claim must be 1 or more."
            )));
        }
        let iterations = usize::try_from(p2c).map_err(|_| {
            JoseError::MalformedHeader(anyhow!("The p2c header claim is too large: {}", p2c))
        })?;

        provider
            .pbkdf2_hmac(
                self.hash_algorithm(),
                password,
                &self.salt(p2s),
                iterations,
                self.keywrap().key_len(),
            )
            .await
            .map(Zeroizing::new)
            .map_err(JoseError::CryptoFailure)
    }
}

impl JweAlgorithm for Pbes2HmacAeskwJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::Pbes2Hs256A128kw => "PBES2-HS256+A128KW",
            Self::Pbes2Hs384A192kw => "PBES2-HS384+A192KW",
            Self::Pbes2Hs512A256kw => "PBES2-HS512+A256KW",
        }
    }

    fn mode(&self) -> KeyManagementMode {
        KeyManagementMode::KeyWrapping
    }
}

#[async_trait]
impl KeyWrapping for Pbes2HmacAeskwJweAlgorithm {
    async fn wrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        cek: &Cek,
        header: &JweHeader,
    ) -> Result<(EncryptedKey, HeaderUpdates), JoseError> {
        let p2s = match header.pbes2_salt_input() {
            Some(val) => val,
            None => provider
                .random_bytes(DEFAULT_SALT_LEN)
                .await
                .map_err(JoseError::CryptoFailure)?,
        };
        let p2c = header.pbes2_count().unwrap_or(DEFAULT_ITERATIONS);

        let derived_key = self.derive_key(provider, key, &p2s, p2c).await?;
        let encrypted_key = self.keywrap().wrap_key(provider, &derived_key, cek).await?;

        let mut updates = HeaderUpdates::new();
        updates.insert(
            "p2s".to_string(),
            Value::String(util::encode_base64_urlsafe_nopad(&p2s)),
        );
        updates.insert("p2c".to_string(), Value::Number(Number::from(p2c)));
        Ok((encrypted_key, updates))
    }

    async fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        encrypted_key: &EncryptedKey,
        header: &JweHeader,
    ) -> Result<Cek, JoseError> {
        let p2s = match header.pbes2_salt_input() {
            Some(val) => val,
            None => {
                return Err(JoseError::MalformedHeader(anyhow!(
                    "The p2s header claim is required."
                )))
            }
        };
        let p2c = match header.pbes2_count() {
            Some(val) => val,
            None => {
                return Err(JoseError::MalformedHeader(anyhow!(
                    "The p2c header claim is required."
                )))
            }
        };

        let derived_key = self.derive_key(provider, key, &p2s, p2c).await?;
        self.keywrap()
            .unwrap_key(provider, &derived_key, encrypted_key)
            .await
    }
}

impl Display for Pbes2HmacAeskwJweAlgorithm {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}
