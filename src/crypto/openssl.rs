use anyhow::bail;
use async_trait::async_trait;

use ::openssl::aes::{self, AesKey};
use ::openssl::bn::{BigNum, BigNumContext, BigNumRef};
use ::openssl::derive::Deriver;
use ::openssl::ec::{EcGroup, EcKey};
use ::openssl::encrypt::{Decrypter, Encrypter};
use ::openssl::hash::{self, MessageDigest};
use ::openssl::nid::Nid;
use ::openssl::pkcs5;
use ::openssl::pkey::{PKey, Private, Public};
use ::openssl::rand;
use ::openssl::rsa::{Padding, Rsa, RsaPrivateKeyBuilder};
use ::openssl::sign::Signer;
use ::openssl::symm::{self, Cipher};
use zeroize::Zeroizing;

use crate::crypto::{CryptoProvider, HashAlgorithm, RsaPadding};
use crate::jwk::{EcCurve, EcPrivateKey, EcPublicKey, RsaPrimes, RsaPrivateKey, RsaPublicKey};
use crate::util;

const GCM_TAG_LEN: usize = 16;

/// A [`CryptoProvider`] backed by the system OpenSSL library.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpensslProvider;

impl OpensslProvider {
    pub fn new() -> Self {
        Self
    }
}

fn message_digest(hash: HashAlgorithm) -> MessageDigest {
    match hash {
        HashAlgorithm::Sha1 => MessageDigest::sha1(),
        HashAlgorithm::Sha256 => MessageDigest::sha256(),
        HashAlgorithm::Sha384 => MessageDigest::sha384(),
        HashAlgorithm::Sha512 => MessageDigest::sha512(),
    }
}

fn cbc_cipher(key: &[u8]) -> anyhow::Result<Cipher> {
    match key.len() {
        16 => Ok(Cipher::aes_128_cbc()),
        24 => Ok(Cipher::aes_192_cbc()),
        32 => Ok(Cipher::aes_256_cbc()),
        len => bail!("The AES key size must be 16, 24 or 32: {}", len),
    }
}

fn gcm_cipher(key: &[u8]) -> anyhow::Result<Cipher> {
    match key.len() {
        16 => Ok(Cipher::aes_128_gcm()),
        24 => Ok(Cipher::aes_192_gcm()),
        32 => Ok(Cipher::aes_256_gcm()),
        len => bail!("The AES key size must be 16, 24 or 32: {}", len),
    }
}

fn curve_nid(curve: EcCurve) -> Nid {
    match curve {
        EcCurve::P256 => Nid::X9_62_PRIME256V1,
        EcCurve::P384 => Nid::SECP384R1,
        EcCurve::P521 => Nid::SECP521R1,
    }
}

fn rsa_public_pkey(key: &RsaPublicKey) -> anyhow::Result<PKey<Public>> {
    let rsa = Rsa::from_public_components(BigNum::from_slice(key.n())?, BigNum::from_slice(key.e())?)?;
    Ok(PKey::from_rsa(rsa)?)
}

fn rsa_private_pkey(key: &RsaPrivateKey) -> anyhow::Result<PKey<Private>> {
    let public_key = key.public_key();
    let mut builder = RsaPrivateKeyBuilder::new(
        BigNum::from_slice(public_key.n())?,
        BigNum::from_slice(public_key.e())?,
        BigNum::from_slice(key.d())?,
    )?;
    if let Some(primes) = key.primes() {
        builder = builder
            .set_factors(BigNum::from_slice(&primes.p)?, BigNum::from_slice(&primes.q)?)?
            .set_crt_params(
                BigNum::from_slice(&primes.dp)?,
                BigNum::from_slice(&primes.dq)?,
                BigNum::from_slice(&primes.qi)?,
            )?;
    }
    Ok(PKey::from_rsa(builder.build())?)
}

fn ec_public_key(key: &EcPublicKey) -> anyhow::Result<EcKey<Public>> {
    let group = EcGroup::from_curve_name(curve_nid(key.curve()))?;
    let x = BigNum::from_slice(key.x())?;
    let y = BigNum::from_slice(key.y())?;
    // Rejects points that are not on the curve.
    let ec_key = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
    ec_key.check_key()?;
    Ok(ec_key)
}

fn ec_private_key(key: &EcPrivateKey) -> anyhow::Result<EcKey<Private>> {
    let group = EcGroup::from_curve_name(curve_nid(key.curve()))?;
    let public_key = ec_public_key(key.public_key())?;
    let d = BigNum::from_slice(key.d())?;
    let ec_key = EcKey::from_private_components(&group, &d, public_key.public_key())?;
    ec_key.check_key()?;
    Ok(ec_key)
}

fn bn_bytes(num: &BigNumRef) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(num.to_vec())
}

#[async_trait]
impl CryptoProvider for OpensslProvider {
    async fn random_bytes(&self, len: usize) -> anyhow::Result<Vec<u8>> {
        let mut vec = vec![0; len];
        rand::rand_bytes(&mut vec)?;
        Ok(vec)
    }

    async fn digest(&self, hash: HashAlgorithm, data: &[u8]) -> anyhow::Result<Vec<u8>> {
        let digest = hash::hash(message_digest(hash), data)?;
        Ok(digest.to_vec())
    }

    async fn hmac_sign(
        &self,
        hash: HashAlgorithm,
        key: &[u8],
        parts: &[&[u8]],
    ) -> anyhow::Result<Vec<u8>> {
        let pkey = PKey::hmac(key)?;
        let mut signer = Signer::new(message_digest(hash), &pkey)?;
        for part in parts {
            signer.update(part)?;
        }
        Ok(signer.sign_to_vec()?)
    }

    async fn pbkdf2_hmac(
        &self,
        hash: HashAlgorithm,
        password: &[u8],
        salt: &[u8],
        iterations: usize,
        key_len: usize,
    ) -> anyhow::Result<Vec<u8>> {
        let mut key = vec![0; key_len];
        pkcs5::pbkdf2_hmac(password, salt, iterations, message_digest(hash), &mut key)?;
        Ok(key)
    }

    async fn aes_cbc_encrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let cipher = cbc_cipher(key)?;
        Ok(symm::encrypt(cipher, key, Some(iv), data)?)
    }

    async fn aes_cbc_decrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let cipher = cbc_cipher(key)?;
        Ok(symm::decrypt(cipher, key, Some(iv), data)?)
    }

    async fn aes_gcm_encrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        data: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let cipher = gcm_cipher(key)?;
        let mut tag = [0; GCM_TAG_LEN];
        let mut encrypted = symm::encrypt_aead(cipher, key, Some(iv), aad, data, &mut tag)?;
        encrypted.extend_from_slice(&tag);
        Ok(encrypted)
    }

    async fn aes_gcm_decrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        data: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let cipher = gcm_cipher(key)?;
        if data.len() < GCM_TAG_LEN {
            bail!("The AES-GCM input is shorter than the tag.");
        }
        let (encrypted, tag) = data.split_at(data.len() - GCM_TAG_LEN);
        Ok(symm::decrypt_aead(cipher, key, Some(iv), aad, encrypted, tag)?)
    }

    async fn aes_kw_wrap(&self, kek: &[u8], key: &[u8]) -> anyhow::Result<Vec<u8>> {
        if key.len() < 16 || key.len() % 8 != 0 {
            bail!("The key to wrap must be a multiple of 8 bytes and at least 16 bytes.");
        }
        let aes = match AesKey::new_encrypt(kek) {
            Ok(val) => val,
            Err(_) => bail!("Failed to set encrypt key."),
        };

        let mut wrapped = vec![0; key.len() + 8];
        match aes::wrap_key(&aes, None, &mut wrapped, key) {
            Ok(len) => wrapped.truncate(len),
            Err(_) => bail!("Failed to wrap key."),
        }
        Ok(wrapped)
    }

    async fn aes_kw_unwrap(&self, kek: &[u8], wrapped: &[u8]) -> anyhow::Result<Vec<u8>> {
        if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
            bail!("The wrapped key must be a multiple of 8 bytes and at least 24 bytes.");
        }
        let aes = match AesKey::new_decrypt(kek) {
            Ok(val) => val,
            Err(_) => bail!("Failed to set decrypt key."),
        };

        let mut key = vec![0; wrapped.len() - 8];
        match aes::unwrap_key(&aes, None, &mut key, wrapped) {
            Ok(len) => key.truncate(len),
            Err(_) => bail!("Failed to unwrap key."),
        }
        Ok(key)
    }

    async fn rsa_encrypt(
        &self,
        key: &RsaPublicKey,
        padding: RsaPadding,
        data: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let pkey = rsa_public_pkey(key)?;
        let mut encrypter = Encrypter::new(&pkey)?;
        match padding {
            RsaPadding::Pkcs1 => encrypter.set_rsa_padding(Padding::PKCS1)?,
            RsaPadding::Oaep => encrypter.set_rsa_padding(Padding::PKCS1_OAEP)?,
            RsaPadding::Oaep256 => {
                encrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
                encrypter.set_rsa_oaep_md(MessageDigest::sha256())?;
                encrypter.set_rsa_mgf1_md(MessageDigest::sha256())?;
            }
        }

        let mut encrypted = vec![0; encrypter.encrypt_len(data)?];
        let len = encrypter.encrypt(data, &mut encrypted)?;
        encrypted.truncate(len);
        Ok(encrypted)
    }

    async fn rsa_decrypt(
        &self,
        key: &RsaPrivateKey,
        padding: RsaPadding,
        data: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let pkey = rsa_private_pkey(key)?;
        let mut decrypter = Decrypter::new(&pkey)?;
        match padding {
            RsaPadding::Pkcs1 => decrypter.set_rsa_padding(Padding::PKCS1)?,
            RsaPadding::Oaep => decrypter.set_rsa_padding(Padding::PKCS1_OAEP)?,
            RsaPadding::Oaep256 => {
                decrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
                decrypter.set_rsa_oaep_md(MessageDigest::sha256())?;
                decrypter.set_rsa_mgf1_md(MessageDigest::sha256())?;
            }
        }

        let mut decrypted = vec![0; decrypter.decrypt_len(data)?];
        let len = decrypter.decrypt(data, &mut decrypted)?;
        decrypted.truncate(len);
        Ok(decrypted)
    }

    async fn generate_rsa_key(&self, bits: u32) -> anyhow::Result<RsaPrivateKey> {
        let rsa = Rsa::generate(bits)?;
        let public_key = RsaPublicKey::new(&rsa.n().to_vec(), &rsa.e().to_vec())?;
        let primes = match (rsa.p(), rsa.q(), rsa.dmp1(), rsa.dmq1(), rsa.iqmp()) {
            (Some(p), Some(q), Some(dp), Some(dq), Some(qi)) => Some(RsaPrimes {
                p: bn_bytes(p),
                q: bn_bytes(q),
                dp: bn_bytes(dp),
                dq: bn_bytes(dq),
                qi: bn_bytes(qi),
            }),
            _ => None,
        };
        let d = bn_bytes(rsa.d());
        Ok(RsaPrivateKey::new(public_key, &d, primes))
    }

    async fn generate_ec_key(&self, curve: EcCurve) -> anyhow::Result<EcPrivateKey> {
        let group = EcGroup::from_curve_name(curve_nid(curve))?;
        let ec_key = EcKey::generate(&group)?;

        let mut ctx = BigNumContext::new()?;
        let mut x = BigNum::new()?;
        let mut y = BigNum::new()?;
        ec_key
            .public_key()
            .affine_coordinates_gfp(&group, &mut x, &mut y, &mut ctx)?;

        let public_key = EcPublicKey::new(curve, &x.to_vec(), &y.to_vec())?;
        let d = bn_bytes(ec_key.private_key());
        Ok(EcPrivateKey::new(public_key, &d)?)
    }

    async fn ecdh_derive(
        &self,
        private_key: &EcPrivateKey,
        public_key: &EcPublicKey,
    ) -> anyhow::Result<Vec<u8>> {
        if private_key.curve() != public_key.curve() {
            bail!(
                "The curves of the key agreement keys differ: {} and {}",
                private_key.curve(),
                public_key.curve()
            );
        }

        let private_pkey = PKey::from_ec_key(ec_private_key(private_key)?)?;
        let public_pkey = PKey::from_ec_key(ec_public_key(public_key)?)?;

        let mut deriver = Deriver::new(&private_pkey)?;
        deriver.set_peer(&public_pkey)?;
        let z = deriver.derive_to_vec()?;
        Ok(util::pad_left(&z, private_key.curve().coordinate_size()))
    }
}
