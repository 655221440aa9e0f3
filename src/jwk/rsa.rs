use std::fmt::Debug;

use anyhow::bail;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::jwk::Jwk;
use crate::util;
use crate::JoseError;

/// An RSA public key as big-endian modulus and exponent.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct RsaPublicKey {
    n: Vec<u8>,
    e: Vec<u8>,
}

impl RsaPublicKey {
    pub fn new(n: &[u8], e: &[u8]) -> Result<Self, JoseError> {
        (|| -> anyhow::Result<Self> {
            let n = strip_leading_zeros(n);
            let e = strip_leading_zeros(e);
            if n.is_empty() || e.is_empty() {
                bail!("The RSA modulus and exponent must not be zero.");
            }
            Ok(Self {
                n: n.to_vec(),
                e: e.to_vec(),
            })
        })()
        .map_err(|err| JoseError::InvalidKeyFormat(err))
    }

    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JoseError> {
        (|| -> anyhow::Result<Self> {
            match jwk.key_type() {
                val if val == "RSA" => {}
                val => bail!("A parameter kty must be RSA: {}", val),
            }
            let n = jwk_integer(jwk, "n")?;
            let e = jwk_integer(jwk, "e")?;
            Ok(Self::new(&n, &e)?)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    pub fn to_jwk(&self) -> Jwk {
        let mut jwk = Jwk::new("RSA");
        jwk.set_base64_parameter("n", &self.n);
        jwk.set_base64_parameter("e", &self.e);
        jwk
    }

    /// Return the modulus length in bits.
    pub fn key_size(&self) -> usize {
        match self.n.first() {
            Some(first) => (self.n.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
            None => 0,
        }
    }

    pub fn n(&self) -> &[u8] {
        &self.n
    }

    pub fn e(&self) -> &[u8] {
        &self.e
    }
}

/// The CRT parameters of an RSA private key.
#[derive(Clone)]
pub struct RsaPrimes {
    pub p: Zeroizing<Vec<u8>>,
    pub q: Zeroizing<Vec<u8>>,
    pub dp: Zeroizing<Vec<u8>>,
    pub dq: Zeroizing<Vec<u8>>,
    pub qi: Zeroizing<Vec<u8>>,
}

#[derive(Clone)]
pub struct RsaPrivateKey {
    public_key: RsaPublicKey,
    d: Zeroizing<Vec<u8>>,
    primes: Option<RsaPrimes>,
}

impl RsaPrivateKey {
    pub fn new(public_key: RsaPublicKey, d: &[u8], primes: Option<RsaPrimes>) -> Self {
        Self {
            public_key,
            d: Zeroizing::new(strip_leading_zeros(d).to_vec()),
            primes,
        }
    }

    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JoseError> {
        let public_key = RsaPublicKey::from_jwk(jwk)?;
        (|| -> anyhow::Result<Self> {
            let d = jwk_integer(jwk, "d")?;

            let names = ["p", "q", "dp", "dq", "qi"];
            let present = names
                .iter()
                .filter(|name| jwk.parameter(name).is_some())
                .count();
            let primes = match present {
                0 => None,
                5 => Some(RsaPrimes {
                    p: Zeroizing::new(jwk_integer(jwk, "p")?),
                    q: Zeroizing::new(jwk_integer(jwk, "q")?),
                    dp: Zeroizing::new(jwk_integer(jwk, "dp")?),
                    dq: Zeroizing::new(jwk_integer(jwk, "dq")?),
                    qi: Zeroizing::new(jwk_integer(jwk, "qi")?),
                }),
                _ => bail!("The RSA CRT parameters p, q, dp, dq and qi must be given together."),
            };

            Ok(Self::new(public_key, &d, primes))
        })()
        .map_err(|err| JoseError::InvalidKeyFormat(err))
    }

    pub fn to_jwk(&self) -> Jwk {
        let mut jwk = self.public_key.to_jwk();
        jwk.set_base64_parameter("d", &self.d);
        if let Some(primes) = &self.primes {
            jwk.set_base64_parameter("p", &primes.p);
            jwk.set_base64_parameter("q", &primes.q);
            jwk.set_base64_parameter("dp", &primes.dp);
            jwk.set_base64_parameter("dq", &primes.dq);
            jwk.set_base64_parameter("qi", &primes.qi);
        }
        jwk
    }

    pub fn to_public_key(&self) -> RsaPublicKey {
        self.public_key.clone()
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn key_size(&self) -> usize {
        self.public_key.key_size()
    }

    pub fn d(&self) -> &[u8] {
        &self.d
    }

    pub fn primes(&self) -> Option<&RsaPrimes> {
        self.primes.as_ref()
    }
}

impl Debug for RsaPrivateKey {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("RsaPrivateKey")
            .field("key_size", &self.key_size())
            .finish_non_exhaustive()
    }
}

fn strip_leading_zeros(input: &[u8]) -> &[u8] {
    let start = input
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(input.len());
    &input[start..]
}

fn jwk_integer(jwk: &Jwk, name: &str) -> anyhow::Result<Vec<u8>> {
    match jwk.parameter(name) {
        Some(Value::String(val)) => util::decode_base64_urlsafe_strict(val),
        Some(val) => bail!("A parameter {} must be string type but {:?}", name, val),
        None => bail!("A parameter {} is required.", name),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn key_size_counts_significant_bits() -> Result<()> {
        let mut n = vec![0u8; 256];
        n[0] = 0x80;
        assert_eq!(RsaPublicKey::new(&n, &[1, 0, 1])?.key_size(), 2048);

        n[0] = 0x7f;
        assert_eq!(RsaPublicKey::new(&n, &[1, 0, 1])?.key_size(), 2047);

        let mut padded = vec![0u8];
        padded.extend_from_slice(&n);
        assert_eq!(RsaPublicKey::new(&padded, &[1, 0, 1])?.n().len(), 256);
        Ok(())
    }

    #[test]
    fn private_key_requires_all_crt_parameters() -> Result<()> {
        let jwk = Jwk::from_bytes(br#"{"kty":"RSA","n":"AQAB","e":"AQAB","d":"AQ","p":"AQ"}"#)?;
        assert!(matches!(
            RsaPrivateKey::from_jwk(&jwk),
            Err(JoseError::InvalidKeyFormat(_))
        ));

        let jwk = Jwk::from_bytes(br#"{"kty":"RSA","n":"AQAB","e":"AQAB","d":"AQ"}"#)?;
        let key = RsaPrivateKey::from_jwk(&jwk)?;
        assert!(key.primes().is_none());
        assert_eq!(RsaPrivateKey::from_jwk(&key.to_jwk())?.d(), key.d());
        Ok(())
    }
}
