use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::crypto::CryptoProvider;
use crate::jwe::alg::aesgcmkw::AesgcmkwJweAlgorithm;
use crate::jwe::alg::aeskw::AeskwJweAlgorithm;
use crate::jwe::alg::direct::DirectJweAlgorithm;
use crate::jwe::alg::ecdh_es::EcdhEsJweAlgorithm;
use crate::jwe::alg::ecdh_es_aeskw::EcdhEsAeskwJweAlgorithm;
use crate::jwe::alg::pbes2_hmac_aeskw::Pbes2HmacAeskwJweAlgorithm;
use crate::jwe::alg::rsaes::RsaesJweAlgorithm;
use crate::jwe::{Cek, EncryptedKey, JweHeader};
use crate::jwk::{EcPrivateKey, EcPublicKey, RsaPrivateKey, RsaPublicKey};
use crate::JoseError;

/// Header parameters produced by a key management algorithm, to be merged into the message.
pub type HeaderUpdates = Map<String, Value>;

/// The strategy by which a recipient's key yields the content encryption key.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum KeyManagementMode {
    KeyEncryption,
    KeyWrapping,
    DirectKeyAgreement,
    KeyAgreementWithKeyWrapping,
    DirectEncryption,
}

impl KeyManagementMode {
    pub fn name(&self) -> &str {
        match self {
            Self::KeyEncryption => "Key Encryption",
            Self::KeyWrapping => "Key Wrapping",
            Self::DirectKeyAgreement => "Direct Key Agreement",
            Self::KeyAgreementWithKeyWrapping => "Key Agreement with Key Wrapping",
            Self::DirectEncryption => "Direct Encryption",
        }
    }

    /// Return true if this mode carries an encrypted key in the message.
    pub fn has_encrypted_key(&self) -> bool {
        !matches!(self, Self::DirectKeyAgreement | Self::DirectEncryption)
    }

    /// Return true if the content encryption key is chosen by the producer.
    pub fn accepts_cek(&self) -> bool {
        self.has_encrypted_key()
    }
}

impl Display for KeyManagementMode {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}

/// Represent a algorithm of JWE alg header claim.
pub trait JweAlgorithm: Debug + Send + Sync {
    /// Return the "alg" (algorithm) header parameter value of JWE.
    fn name(&self) -> &str;

    /// Return the key management mode the algorithm belongs to.
    fn mode(&self) -> KeyManagementMode;
}

/// Key Encryption: the CEK is encrypted to the recipient's public key.
#[async_trait]
pub trait KeyEncryption: JweAlgorithm {
    async fn encrypt_key(
        &self,
        provider: &dyn CryptoProvider,
        key: &RsaPublicKey,
        cek: &Cek,
    ) -> Result<EncryptedKey, JoseError>;

    /// Recover the CEK. `cek_len` is the key size the content encryption expects.
    async fn decrypt_key(
        &self,
        provider: &dyn CryptoProvider,
        key: &RsaPrivateKey,
        encrypted_key: &EncryptedKey,
        cek_len: usize,
    ) -> Result<Cek, JoseError>;
}

/// Key Wrapping: the CEK is wrapped with a symmetric key (or a key derived from a password).
#[async_trait]
pub trait KeyWrapping: JweAlgorithm {
    async fn wrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        cek: &Cek,
        header: &JweHeader,
    ) -> Result<(EncryptedKey, HeaderUpdates), JoseError>;

    async fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        encrypted_key: &EncryptedKey,
        header: &JweHeader,
    ) -> Result<Cek, JoseError>;
}

/// Direct Key Agreement: the agreed key is the CEK.
#[async_trait]
pub trait DirectKeyAgreement: JweAlgorithm {
    /// Producer side. An ephemeral key is generated when `ephemeral_key` is None.
    async fn party_u(
        &self,
        provider: &dyn CryptoProvider,
        key: &EcPublicKey,
        ephemeral_key: Option<&EcPrivateKey>,
        header: &JweHeader,
        cek_len: usize,
    ) -> Result<(Cek, HeaderUpdates), JoseError>;

    /// Consumer side. The ephemeral public key is read from the epk header claim.
    async fn party_v(
        &self,
        provider: &dyn CryptoProvider,
        key: &EcPrivateKey,
        header: &JweHeader,
        cek_len: usize,
    ) -> Result<Cek, JoseError>;
}

/// Key Agreement with Key Wrapping: the agreed key wraps the CEK.
#[async_trait]
pub trait KeyAgreementWithKeyWrapping: JweAlgorithm {
    async fn wrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &EcPublicKey,
        ephemeral_key: Option<&EcPrivateKey>,
        cek: &Cek,
        header: &JweHeader,
    ) -> Result<(EncryptedKey, HeaderUpdates), JoseError>;

    async fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &EcPrivateKey,
        encrypted_key: &EncryptedKey,
        header: &JweHeader,
    ) -> Result<Cek, JoseError>;
}

/// Direct Encryption: the shared symmetric key is the CEK.
pub trait DirectEncryption: JweAlgorithm {
    fn extract_cek(&self, key: &[u8], cek_len: usize) -> Result<Cek, JoseError>;
}

/// The algorithms usable in Key Wrapping mode.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum KeyWrappingAlgorithm {
    Aeskw(AeskwJweAlgorithm),
    Aesgcmkw(AesgcmkwJweAlgorithm),
    Pbes2HmacAeskw(Pbes2HmacAeskwJweAlgorithm),
}

impl JweAlgorithm for KeyWrappingAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::Aeskw(alg) => alg.name(),
            Self::Aesgcmkw(alg) => alg.name(),
            Self::Pbes2HmacAeskw(alg) => alg.name(),
        }
    }

    fn mode(&self) -> KeyManagementMode {
        KeyManagementMode::KeyWrapping
    }
}

#[async_trait]
impl KeyWrapping for KeyWrappingAlgorithm {
    async fn wrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        cek: &Cek,
        header: &JweHeader,
    ) -> Result<(EncryptedKey, HeaderUpdates), JoseError> {
        match self {
            Self::Aeskw(alg) => alg.wrap(provider, key, cek, header).await,
            Self::Aesgcmkw(alg) => alg.wrap(provider, key, cek, header).await,
            Self::Pbes2HmacAeskw(alg) => alg.wrap(provider, key, cek, header).await,
        }
    }

    async fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
        encrypted_key: &EncryptedKey,
        header: &JweHeader,
    ) -> Result<Cek, JoseError> {
        match self {
            Self::Aeskw(alg) => alg.unwrap(provider, key, encrypted_key, header).await,
            Self::Aesgcmkw(alg) => alg.unwrap(provider, key, encrypted_key, header).await,
            Self::Pbes2HmacAeskw(alg) => alg.unwrap(provider, key, encrypted_key, header).await,
        }
    }
}

/// A key management algorithm, tagged by the mode whose contract it implements.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum KeyManagementAlgorithm {
    KeyEncryption(RsaesJweAlgorithm),
    KeyWrapping(KeyWrappingAlgorithm),
    DirectKeyAgreement(EcdhEsJweAlgorithm),
    KeyAgreementWithKeyWrapping(EcdhEsAeskwJweAlgorithm),
    DirectEncryption(DirectJweAlgorithm),
}

impl KeyManagementAlgorithm {
    /// Resolve an alg header value.
    pub fn from_name(name: &str) -> Result<Self, JoseError> {
        if let Some(alg) = RsaesJweAlgorithm::from_name(name) {
            return Ok(Self::KeyEncryption(alg));
        }
        if let Some(alg) = AeskwJweAlgorithm::from_name(name) {
            return Ok(Self::KeyWrapping(KeyWrappingAlgorithm::Aeskw(alg)));
        }
        if let Some(alg) = AesgcmkwJweAlgorithm::from_name(name) {
            return Ok(Self::KeyWrapping(KeyWrappingAlgorithm::Aesgcmkw(alg)));
        }
        if let Some(alg) = Pbes2HmacAeskwJweAlgorithm::from_name(name) {
            return Ok(Self::KeyWrapping(KeyWrappingAlgorithm::Pbes2HmacAeskw(alg)));
        }
        if let Some(alg) = EcdhEsJweAlgorithm::from_name(name) {
            return Ok(Self::DirectKeyAgreement(alg));
        }
        if let Some(alg) = EcdhEsAeskwJweAlgorithm::from_name(name) {
            return Ok(Self::KeyAgreementWithKeyWrapping(alg));
        }
        if let Some(alg) = DirectJweAlgorithm::from_name(name) {
            return Ok(Self::DirectEncryption(alg));
        }
        Err(JoseError::UnsupportedAlgorithm(format!(
            "Unknown JWE algorithm: {}",
            name
        )))
    }

    /// Return the key type (kty) a recipient key must have for this algorithm.
    pub fn key_type(&self) -> &str {
        match self {
            Self::KeyEncryption(_) => "RSA",
            Self::KeyWrapping(_) | Self::DirectEncryption(_) => "oct",
            Self::DirectKeyAgreement(_) | Self::KeyAgreementWithKeyWrapping(_) => "EC",
        }
    }

    pub fn algorithm(&self) -> &dyn JweAlgorithm {
        match self {
            Self::KeyEncryption(alg) => alg,
            Self::KeyWrapping(alg) => alg,
            Self::DirectKeyAgreement(alg) => alg,
            Self::KeyAgreementWithKeyWrapping(alg) => alg,
            Self::DirectEncryption(alg) => alg,
        }
    }
}

impl JweAlgorithm for KeyManagementAlgorithm {
    fn name(&self) -> &str {
        self.algorithm().name()
    }

    fn mode(&self) -> KeyManagementMode {
        self.algorithm().mode()
    }
}

impl Display for KeyManagementAlgorithm {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_every_registered_algorithm() {
        let expected = [
            ("RSA1_5", KeyManagementMode::KeyEncryption, "RSA"),
            ("RSA-OAEP", KeyManagementMode::KeyEncryption, "RSA"),
            ("RSA-OAEP-256", KeyManagementMode::KeyEncryption, "RSA"),
            ("A128KW", KeyManagementMode::KeyWrapping, "oct"),
            ("A192KW", KeyManagementMode::KeyWrapping, "oct"),
            ("A256KW", KeyManagementMode::KeyWrapping, "oct"),
            ("A128GCMKW", KeyManagementMode::KeyWrapping, "oct"),
            ("A192GCMKW", KeyManagementMode::KeyWrapping, "oct"),
            ("A256GCMKW", KeyManagementMode::KeyWrapping, "oct"),
            ("PBES2-HS256+A128KW", KeyManagementMode::KeyWrapping, "oct"),
            ("PBES2-HS384+A192KW", KeyManagementMode::KeyWrapping, "oct"),
            ("PBES2-HS512+A256KW", KeyManagementMode::KeyWrapping, "oct"),
            ("ECDH-ES", KeyManagementMode::DirectKeyAgreement, "EC"),
            ("ECDH-ES+A128KW", KeyManagementMode::KeyAgreementWithKeyWrapping, "EC"),
            ("ECDH-ES+A192KW", KeyManagementMode::KeyAgreementWithKeyWrapping, "EC"),
            ("ECDH-ES+A256KW", KeyManagementMode::KeyAgreementWithKeyWrapping, "EC"),
            ("dir", KeyManagementMode::DirectEncryption, "oct"),
        ];

        for (name, mode, key_type) in expected {
            let alg = KeyManagementAlgorithm::from_name(name).unwrap();
            assert_eq!(alg.name(), name);
            assert_eq!(alg.mode(), mode);
            assert_eq!(alg.key_type(), key_type);
        }

        assert!(matches!(
            KeyManagementAlgorithm::from_name("RSA-OAEP-384"),
            Err(JoseError::UnsupportedAlgorithm(_))
        ));
    }
}
