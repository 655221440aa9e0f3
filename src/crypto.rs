//! The cryptographic primitive boundary.
//!
//! Every algorithm in this crate reaches primitives only through a
//! [`CryptoProvider`] handle, so the implementation can be swapped (HSM, KMS,
//! test doubles) without touching the JWE engine.
pub mod openssl;

use std::fmt::{Debug, Display};

use async_trait::async_trait;

use crate::jwk::{EcCurve, EcPrivateKey, EcPublicKey, RsaPrivateKey, RsaPublicKey};

pub use crate::crypto::openssl::OpensslProvider;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Return the digest size in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}

/// RSA encryption padding schemes used for key encryption.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum RsaPadding {
    /// RSAES-PKCS1-v1_5
    Pkcs1,
    /// RSAES-OAEP with SHA-1 and MGF1 with SHA-1
    Oaep,
    /// RSAES-OAEP with SHA-256 and MGF1 with SHA-256
    Oaep256,
}

/// Primitive operations required by the JWE engine.
///
/// All operations are fallible and may suspend. Implementations must report
/// authentication failures (AES-GCM tag mismatch, AES-KW integrity check) as
/// errors and must not return partially decrypted data.
#[async_trait]
pub trait CryptoProvider: Debug + Send + Sync {
    /// Return `len` bytes from a cryptographically secure generator.
    async fn random_bytes(&self, len: usize) -> anyhow::Result<Vec<u8>>;

    async fn digest(&self, hash: HashAlgorithm, data: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Compute a full-length HMAC over the concatenation of `parts`.
    async fn hmac_sign(
        &self,
        hash: HashAlgorithm,
        key: &[u8],
        parts: &[&[u8]],
    ) -> anyhow::Result<Vec<u8>>;

    async fn pbkdf2_hmac(
        &self,
        hash: HashAlgorithm,
        password: &[u8],
        salt: &[u8],
        iterations: usize,
        key_len: usize,
    ) -> anyhow::Result<Vec<u8>>;

    /// AES-CBC with PKCS#7 padding. The key size selects AES-128/192/256.
    async fn aes_cbc_encrypt(&self, key: &[u8], iv: &[u8], data: &[u8])
        -> anyhow::Result<Vec<u8>>;

    async fn aes_cbc_decrypt(&self, key: &[u8], iv: &[u8], data: &[u8])
        -> anyhow::Result<Vec<u8>>;

    /// AES-GCM encryption returning `ciphertext || tag` with a 128-bit tag.
    async fn aes_gcm_encrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        data: &[u8],
    ) -> anyhow::Result<Vec<u8>>;

    /// AES-GCM decryption of `ciphertext || tag`.
    async fn aes_gcm_decrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        data: &[u8],
    ) -> anyhow::Result<Vec<u8>>;

    /// RFC3394 AES Key Wrap with the default initial value.
    async fn aes_kw_wrap(&self, kek: &[u8], key: &[u8]) -> anyhow::Result<Vec<u8>>;

    async fn aes_kw_unwrap(&self, kek: &[u8], wrapped: &[u8]) -> anyhow::Result<Vec<u8>>;

    async fn rsa_encrypt(
        &self,
        key: &RsaPublicKey,
        padding: RsaPadding,
        data: &[u8],
    ) -> anyhow::Result<Vec<u8>>;

    async fn rsa_decrypt(
        &self,
        key: &RsaPrivateKey,
        padding: RsaPadding,
        data: &[u8],
    ) -> anyhow::Result<Vec<u8>>;

    async fn generate_rsa_key(&self, bits: u32) -> anyhow::Result<RsaPrivateKey>;

    async fn generate_ec_key(&self, curve: EcCurve) -> anyhow::Result<EcPrivateKey>;

    /// Raw ECDH shared secret `Z` (the x coordinate of the shared point).
    async fn ecdh_derive(
        &self,
        private_key: &EcPrivateKey,
        public_key: &EcPublicKey,
    ) -> anyhow::Result<Vec<u8>>;
}
