pub mod alg;
pub mod enc;
mod jwe_algorithm;
mod jwe_context;
mod jwe_header;
mod jwe_header_set;
mod jwe_message;
mod octets;

use once_cell::sync::Lazy;

use crate::jwk;
use crate::JoseError;

pub use crate::jwe::jwe_algorithm::{
    DirectEncryption, DirectKeyAgreement, HeaderUpdates, JweAlgorithm,
    KeyAgreementWithKeyWrapping, KeyEncryption, KeyManagementAlgorithm, KeyManagementMode,
    KeyWrapping, KeyWrappingAlgorithm,
};
pub use crate::jwe::jwe_context::{
    EncryptOptions, JweContext, JweHeaders, DEFAULT_PBES2_MAX_ITERATIONS,
};
pub use crate::jwe::jwe_header::JweHeader;
pub use crate::jwe::jwe_header_set::JweHeaderSet;
pub use crate::jwe::jwe_message::{JweMessage, Recipient, SerializationFormat};
pub use crate::jwe::octets::{Cek, Ciphertext, EncryptedKey, Iv, Tag};
pub use crate::jwe::enc::JweContentEncryption;

pub use crate::jwe::alg::direct::DirectJweAlgorithm::Dir;

pub use crate::jwe::alg::ecdh_es::EcdhEsJweAlgorithm::EcdhEs;

pub use crate::jwe::alg::aeskw::AeskwJweAlgorithm::A128kw;
pub use crate::jwe::alg::aeskw::AeskwJweAlgorithm::A192kw;
pub use crate::jwe::alg::aeskw::AeskwJweAlgorithm::A256kw;

pub use crate::jwe::alg::aesgcmkw::AesgcmkwJweAlgorithm::A128gcmkw;
pub use crate::jwe::alg::aesgcmkw::AesgcmkwJweAlgorithm::A192gcmkw;
pub use crate::jwe::alg::aesgcmkw::AesgcmkwJweAlgorithm::A256gcmkw;

pub use crate::jwe::alg::ecdh_es_aeskw::EcdhEsAeskwJweAlgorithm::EcdhEsA128kw;
pub use crate::jwe::alg::ecdh_es_aeskw::EcdhEsAeskwJweAlgorithm::EcdhEsA192kw;
pub use crate::jwe::alg::ecdh_es_aeskw::EcdhEsAeskwJweAlgorithm::EcdhEsA256kw;

pub use crate::jwe::alg::pbes2_hmac_aeskw::Pbes2HmacAeskwJweAlgorithm::Pbes2Hs256A128kw;
pub use crate::jwe::alg::pbes2_hmac_aeskw::Pbes2HmacAeskwJweAlgorithm::Pbes2Hs384A192kw;
pub use crate::jwe::alg::pbes2_hmac_aeskw::Pbes2HmacAeskwJweAlgorithm::Pbes2Hs512A256kw;

#[allow(deprecated)]
pub use crate::jwe::alg::rsaes::RsaesJweAlgorithm::Rsa1_5;
pub use crate::jwe::alg::rsaes::RsaesJweAlgorithm::RsaOaep;
pub use crate::jwe::alg::rsaes::RsaesJweAlgorithm::RsaOaep256;

pub use crate::jwe::enc::aescbc_hmac::AesCbcHmacJweEncryption::A128CbcHs256;
pub use crate::jwe::enc::aescbc_hmac::AesCbcHmacJweEncryption::A192CbcHs384;
pub use crate::jwe::enc::aescbc_hmac::AesCbcHmacJweEncryption::A256CbcHs512;

pub use crate::jwe::enc::aesgcm::AesGcmJweEncryption::A128Gcm;
pub use crate::jwe::enc::aesgcm::AesGcmJweEncryption::A192Gcm;
pub use crate::jwe::enc::aesgcm::AesGcmJweEncryption::A256Gcm;

static DEFAULT_CONTEXT: Lazy<JweContext> = Lazy::new(JweContext::default);

/// Encrypt a payload to the keys of a JWK set with the default context.
///
/// # Arguments
///
/// * `keys` - The recipients' keys
/// * `plaintext` - The payload
/// * `headers` - The header fragments
pub async fn encrypt(
    keys: &jwk::JwkSet,
    plaintext: &[u8],
    headers: &JweHeaders,
) -> Result<JweMessage, JoseError> {
    DEFAULT_CONTEXT
        .encrypt(keys, plaintext, headers, None, None, &EncryptOptions::default())
        .await
}

/// Encrypt a payload to a single key and return the compact serialization.
///
/// # Arguments
///
/// * `key` - The recipient's key
/// * `plaintext` - The payload
/// * `header` - The protected header, with alg and enc header claims
pub async fn encrypt_compact(
    key: &jwk::Jwk,
    plaintext: &[u8],
    header: &JweHeader,
) -> Result<String, JoseError> {
    let keys: jwk::JwkSet = vec![key.clone()].into_iter().collect();
    let message = encrypt(&keys, plaintext, &JweHeaders::protected(header.clone())).await?;
    message.serialize(SerializationFormat::Compact)
}

/// Parse a compact or JSON serialized message and decrypt it with the default context.
///
/// # Arguments
///
/// * `input` - The serialized message
/// * `keys` - The candidate keys
pub async fn decrypt(input: &str, keys: &jwk::JwkSet) -> Result<Vec<u8>, JoseError> {
    let message = JweMessage::deserialize(input)?;
    DEFAULT_CONTEXT.decrypt(&message, keys).await
}
