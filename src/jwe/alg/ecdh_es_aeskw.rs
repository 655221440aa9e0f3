use std::fmt::Display;

use async_trait::async_trait;

use crate::crypto::CryptoProvider;
use crate::jwe::alg::aeskw::AeskwJweAlgorithm;
use crate::jwe::alg::ecdh_es;
use crate::jwe::{
    Cek, EncryptedKey, HeaderUpdates, JweAlgorithm, JweHeader, KeyAgreementWithKeyWrapping,
    KeyManagementMode,
};
use crate::jwk::{EcPrivateKey, EcPublicKey};
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum EcdhEsAeskwJweAlgorithm {
    /// ECDH-ES using Concat KDF and CEK wrapped with "A128KW"
    EcdhEsA128kw,
    /// ECDH-ES using Concat KDF and CEK wrapped with "A192KW"
    EcdhEsA192kw,
    /// ECDH-ES using Concat KDF and CEK wrapped with "A256KW"
    EcdhEsA256kw,
}

impl EcdhEsAeskwJweAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ECDH-ES+A128KW" => Some(Self::EcdhEsA128kw),
            "ECDH-ES+A192KW" => Some(Self::EcdhEsA192kw),
            "ECDH-ES+A256KW" => Some(Self::EcdhEsA256kw),
            _ => None,
        }
    }

    fn keywrap(&self) -> AeskwJweAlgorithm {
        match self {
            Self::EcdhEsA128kw => AeskwJweAlgorithm::A128kw,
            Self::EcdhEsA192kw => AeskwJweAlgorithm::A192kw,
            Self::EcdhEsA256kw => AeskwJweAlgorithm::A256kw,
        }
    }
}

impl JweAlgorithm for EcdhEsAeskwJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::EcdhEsA128kw => "ECDH-ES+A128KW",
            Self::EcdhEsA192kw => "ECDH-ES+A192KW",
            Self::EcdhEsA256kw => "ECDH-ES+A256KW",
        }
    }

    fn mode(&self) -> KeyManagementMode {
        KeyManagementMode::KeyAgreementWithKeyWrapping
    }
}

#[async_trait]
impl KeyAgreementWithKeyWrapping for EcdhEsAeskwJweAlgorithm {
    async fn wrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &EcPublicKey,
        ephemeral_key: Option<&EcPrivateKey>,
        cek: &Cek,
        header: &JweHeader,
    ) -> Result<(EncryptedKey, HeaderUpdates), JoseError> {
        let keywrap = self.keywrap();
        let (kek, updates) = ecdh_es::agree_as_party_u(
            provider,
            key,
            ephemeral_key,
            header,
            self.name(),
            keywrap.key_len(),
        )
        .await?;
        let encrypted_key = keywrap.wrap_key(provider, &kek, cek).await?;
        Ok((encrypted_key, updates))
    }

    async fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        key: &EcPrivateKey,
        encrypted_key: &EncryptedKey,
        header: &JweHeader,
    ) -> Result<Cek, JoseError> {
        let keywrap = self.keywrap();
        let kek =
            ecdh_es::agree_as_party_v(provider, key, header, self.name(), keywrap.key_len())
                .await?;
        keywrap.unwrap_key(provider, &kek, encrypted_key).await
    }
}

impl Display for EcdhEsAeskwJweAlgorithm {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::crypto::OpensslProvider;
    use crate::jwk::EcCurve;

    #[tokio::test]
    async fn wrap_and_unwrap_ecdh_es_aeskw() -> Result<()> {
        let provider = OpensslProvider::new();

        for alg in [
            EcdhEsAeskwJweAlgorithm::EcdhEsA128kw,
            EcdhEsAeskwJweAlgorithm::EcdhEsA192kw,
            EcdhEsAeskwJweAlgorithm::EcdhEsA256kw,
        ] {
            for curve in [EcCurve::P256, EcCurve::P384, EcCurve::P521] {
                let recipient = provider.generate_ec_key(curve).await?;
                let cek = Cek::new(provider.random_bytes(32).await?);

                let mut header = JweHeader::new();
                header.set_algorithm(alg.name());
                header.set_content_encryption("A256GCM");

                let (encrypted_key, updates) = alg
                    .wrap(&provider, recipient.public_key(), None, &cek, &header)
                    .await?;
                assert_eq!(encrypted_key.len(), 40);

                let mut map = header.into_map();
                map.extend(updates);
                let header = JweHeader::from_map(map)?;

                let unwrapped = alg
                    .unwrap(&provider, &recipient, &encrypted_key, &header)
                    .await?;
                assert_eq!(unwrapped, cek);

                let stranger = provider.generate_ec_key(curve).await?;
                assert!(matches!(
                    alg.unwrap(&provider, &stranger, &encrypted_key, &header).await,
                    Err(JoseError::IntegrityCheckFailed)
                ));
            }
        }
        Ok(())
    }
}
