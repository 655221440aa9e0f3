use std::fmt::Display;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::crypto::{CryptoProvider, HashAlgorithm};
use crate::jwe::{
    Cek, DirectKeyAgreement, HeaderUpdates, JweAlgorithm, JweHeader, KeyManagementMode,
};
use crate::jwk::{EcPrivateKey, EcPublicKey};
use crate::util;
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum EcdhEsJweAlgorithm {
    /// Elliptic Curve Diffie-Hellman Ephemeral Static key agreement using Concat KDF
    EcdhEs,
}

impl EcdhEsJweAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ECDH-ES" => Some(Self::EcdhEs),
            _ => None,
        }
    }
}

impl JweAlgorithm for EcdhEsJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::EcdhEs => "ECDH-ES",
        }
    }

    fn mode(&self) -> KeyManagementMode {
        KeyManagementMode::DirectKeyAgreement
    }
}

#[async_trait]
impl DirectKeyAgreement for EcdhEsJweAlgorithm {
    async fn party_u(
        &self,
        provider: &dyn CryptoProvider,
        key: &EcPublicKey,
        ephemeral_key: Option<&EcPrivateKey>,
        header: &JweHeader,
        cek_len: usize,
    ) -> Result<(Cek, HeaderUpdates), JoseError> {
        let algorithm_id = content_encryption(header)?;
        let (derived_key, updates) =
            agree_as_party_u(provider, key, ephemeral_key, header, algorithm_id, cek_len).await?;
        Ok((Cek::new(derived_key.to_vec()), updates))
    }

    async fn party_v(
        &self,
        provider: &dyn CryptoProvider,
        key: &EcPrivateKey,
        header: &JweHeader,
        cek_len: usize,
    ) -> Result<Cek, JoseError> {
        let algorithm_id = content_encryption(header)?;
        let derived_key = agree_as_party_v(provider, key, header, algorithm_id, cek_len).await?;
        Ok(Cek::new(derived_key.to_vec()))
    }
}

impl Display for EcdhEsJweAlgorithm {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}

fn content_encryption(header: &JweHeader) -> Result<&str, JoseError> {
    header.content_encryption().ok_or_else(|| {
        JoseError::MalformedHeader(anyhow!("The enc header claim is required."))
    })
}

/// Derive a key with the Concat KDF of NIST SP 800-56A section 5.8.1, using SHA-256.
///
/// # Arguments
///
/// * `provider` - The crypto provider
/// * `z` - The shared secret
/// * `algorithm_id` - The AlgorithmID value (enc for ECDH-ES, alg otherwise)
/// * `apu` - The PartyUInfo value
/// * `apv` - The PartyVInfo value
/// * `key_len` - The derived key size in bytes
pub(crate) async fn concat_kdf(
    provider: &dyn CryptoProvider,
    z: &[u8],
    algorithm_id: &str,
    apu: &[u8],
    apv: &[u8],
    key_len: usize,
) -> anyhow::Result<Vec<u8>> {
    let algorithm_id = algorithm_id.as_bytes();
    let other_info = util::concat(&[
        &util::be32(algorithm_id.len())?,
        algorithm_id,
        &util::be32(apu.len())?,
        apu,
        &util::be32(apv.len())?,
        apv,
        &util::be32(key_len * 8)?,
    ]);

    let hash = HashAlgorithm::Sha256;
    let reps = util::ceiling(key_len, hash.output_len());
    let mut derived_key = Vec::with_capacity(reps * hash.output_len());
    for i in 1..=reps {
        let round = Zeroizing::new(util::concat(&[&util::be32(i)?, z, &other_info]));
        derived_key.extend(provider.digest(hash, &round).await?);
    }
    derived_key.truncate(key_len);
    Ok(derived_key)
}

/// Run the producer side of ECDH-ES and derive `key_len` bytes.
///
/// The updates carry the ephemeral public key as the epk header claim unless the header
/// already has it.
pub(crate) async fn agree_as_party_u(
    provider: &dyn CryptoProvider,
    key: &EcPublicKey,
    ephemeral_key: Option<&EcPrivateKey>,
    header: &JweHeader,
    algorithm_id: &str,
    key_len: usize,
) -> Result<(Zeroizing<Vec<u8>>, HeaderUpdates), JoseError> {
    let generated;
    let ephemeral_key = match ephemeral_key {
        Some(val) => {
            if val.curve() != key.curve() {
                return Err(JoseError::InvalidOptions(anyhow!(
                    "The ephemeral key curve must be {}: {}",
                    key.curve(),
                    val.curve()
                )));
            }
            val
        }
        None => {
            generated = provider
                .generate_ec_key(key.curve())
                .await
                .map_err(JoseError::CryptoFailure)?;
            &generated
        }
    };

    let z = Zeroizing::new(
        provider
            .ecdh_derive(ephemeral_key, key)
            .await
            .map_err(JoseError::CryptoFailure)?,
    );
    let apu = header.agreement_partyuinfo().unwrap_or_default();
    let apv = header.agreement_partyvinfo().unwrap_or_default();
    let derived_key = concat_kdf(provider, &z, algorithm_id, &apu, &apv, key_len)
        .await
        .map_err(JoseError::CryptoFailure)?;

    let epk = ephemeral_key.public_key().to_jwk();
    let mut updates = HeaderUpdates::new();
    match header.ephemeral_public_key() {
        Some(val) if val == epk => {}
        Some(_) => {
            return Err(JoseError::InvalidOptions(anyhow!(
                "The epk header claim does not match the ephemeral key."
            )))
        }
        None => {
            updates.insert("epk".to_string(), Value::Object(epk.into()));
        }
    }
    Ok((Zeroizing::new(derived_key), updates))
}

/// Run the consumer side of ECDH-ES with the ephemeral key found in the epk header claim.
pub(crate) async fn agree_as_party_v(
    provider: &dyn CryptoProvider,
    key: &EcPrivateKey,
    header: &JweHeader,
    algorithm_id: &str,
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let epk = match header.ephemeral_public_key() {
        Some(val) => val,
        None => {
            return Err(JoseError::MalformedHeader(anyhow!(
                "The epk header claim is required."
            )))
        }
    };
    let epk = EcPublicKey::from_jwk(&epk).map_err(|err| match err {
        JoseError::InvalidKeyFormat(err) => JoseError::MalformedHeader(err),
        err => err,
    })?;
    if epk.curve() != key.curve() {
        return Err(JoseError::MalformedHeader(anyhow!(
            "The epk curve must be {}: {}",
            key.curve(),
            epk.curve()
        )));
    }

    let z = Zeroizing::new(provider.ecdh_derive(key, &epk).await.map_err(|err| {
        JoseError::MalformedHeader(anyhow!("The epk header claim is not a valid point: {}", err))
    })?);
    let apu = header.agreement_partyuinfo().unwrap_or_default();
    let apv = header.agreement_partyvinfo().unwrap_or_default();
    let derived_key = concat_kdf(provider, &z, algorithm_id, &apu, &apv, key_len)
        .await
        .map_err(JoseError::CryptoFailure)?;
    Ok(Zeroizing::new(derived_key))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::crypto::OpensslProvider;
    use crate::jwk::{EcCurve, Jwk};

    const EXPECTED: [u8; 16] = [
        86, 170, 141, 234, 248, 35, 109, 32, 92, 34, 40, 205, 113, 167, 16, 26,
    ];

    fn alice_key() -> Result<EcPrivateKey> {
        let jwk = Jwk::from_bytes(
            br#"{"kty":"EC","crv":"P-256",
            "x":"gI0GAILBdu7T53akrFmMyGcsF3n5dO7MmwNBHKW5SV0",
            "y":"SLW_xSffzlPWrHEVI30DHM_4egVwt3NQqeUD7nMFpps",
            "d":"0_NxaRPUMQoAJt50Gz8YiTr8gRTwyEaCumd-MToTmIo"}"#,
        )?;
        Ok(EcPrivateKey::from_jwk(&jwk)?)
    }

    fn bob_key() -> Result<EcPrivateKey> {
        let jwk = Jwk::from_bytes(
            br#"{"kty":"EC","crv":"P-256",
            "x":"weNJy2HscCSM6AEDTDg04biOvhFhyyWvOHQfeF_PxMQ",
            "y":"e8lnCO-AlStT-NJVX-crhB7QRYhiix03illJOVAOyck",
            "d":"VEmDZpDXXK8p8N0Cndsxs924q6nS1RXFASRl6BfUqdw"}"#,
        )?;
        Ok(EcPrivateKey::from_jwk(&jwk)?)
    }

    #[tokio::test]
    async fn concat_kdf_rfc7518_appendix_c() -> Result<()> {
        let provider = OpensslProvider::new();
        let z = [
            158, 86, 217, 29, 129, 113, 53, 211, 114, 131, 66, 131, 191, 132, 38, 156, 251, 49,
            110, 163, 218, 128, 106, 72, 246, 218, 167, 121, 140, 254, 144, 196,
        ];
        let derived = concat_kdf(&provider, &z, "A128GCM", b"Alice", b"Bob", 16).await?;
        assert_eq!(derived, EXPECTED);

        let long = concat_kdf(&provider, &z, "A256CBC-HS512", b"", b"", 64).await?;
        assert_eq!(long.len(), 64);
        Ok(())
    }

    #[tokio::test]
    async fn key_agreement_rfc7518_appendix_c() -> Result<()> {
        let provider = OpensslProvider::new();
        let alice = alice_key()?;
        let bob = bob_key()?;

        let mut header = JweHeader::new();
        header.set_algorithm("ECDH-ES");
        header.set_content_encryption("A128GCM");
        header.set_agreement_partyuinfo(b"Alice");
        header.set_agreement_partyvinfo(b"Bob");

        let (cek, updates) = EcdhEsJweAlgorithm::EcdhEs
            .party_u(&provider, bob.public_key(), Some(&alice), &header, 16)
            .await?;
        assert_eq!(cek.as_ref(), &EXPECTED);

        let mut map = header.into_map();
        map.extend(updates);
        let header = JweHeader::from_map(map)?;
        assert_eq!(
            header.ephemeral_public_key(),
            Some(alice.public_key().to_jwk())
        );

        let cek = EcdhEsJweAlgorithm::EcdhEs
            .party_v(&provider, &bob, &header, 16)
            .await?;
        assert_eq!(cek.as_ref(), &EXPECTED);
        Ok(())
    }

    #[tokio::test]
    async fn party_v_rejects_missing_or_foreign_epk() -> Result<()> {
        let provider = OpensslProvider::new();
        let bob = bob_key()?;

        let mut header = JweHeader::new();
        header.set_content_encryption("A128GCM");
        assert!(matches!(
            EcdhEsJweAlgorithm::EcdhEs
                .party_v(&provider, &bob, &header, 16)
                .await,
            Err(JoseError::MalformedHeader(_))
        ));

        let other = provider.generate_ec_key(EcCurve::P384).await?;
        header.set_ephemeral_public_key(other.public_key().to_jwk());
        assert!(matches!(
            EcdhEsJweAlgorithm::EcdhEs
                .party_v(&provider, &bob, &header, 16)
                .await,
            Err(JoseError::MalformedHeader(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn ephemeral_key_curve_must_match() -> Result<()> {
        let provider = OpensslProvider::new();
        let bob = bob_key()?;
        let ephemeral = provider.generate_ec_key(EcCurve::P521).await?;

        let mut header = JweHeader::new();
        header.set_content_encryption("A256GCM");
        assert!(matches!(
            EcdhEsJweAlgorithm::EcdhEs
                .party_u(&provider, bob.public_key(), Some(&ephemeral), &header, 32)
                .await,
            Err(JoseError::InvalidOptions(_))
        ));
        Ok(())
    }
}
