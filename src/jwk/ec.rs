use std::fmt::{Debug, Display};

use anyhow::bail;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::jwk::Jwk;
use crate::util;
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    pub fn from_name(name: &str) -> Result<Self, JoseError> {
        match name {
            "P-256" => Ok(Self::P256),
            "P-384" => Ok(Self::P384),
            "P-521" => Ok(Self::P521),
            _ => Err(JoseError::UnsupportedAlgorithm(format!(
                "Unknown curve: {}",
                name
            ))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    pub fn coordinate_size(&self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }
}

impl Display for EcCurve {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}

/// An EC public key as affine coordinates, each left-padded to the curve's coordinate size.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct EcPublicKey {
    curve: EcCurve,
    x: Vec<u8>,
    y: Vec<u8>,
}

impl EcPublicKey {
    pub fn new(curve: EcCurve, x: &[u8], y: &[u8]) -> Result<Self, JoseError> {
        (|| -> anyhow::Result<Self> {
            let size = curve.coordinate_size();
            if x.len() > size || y.len() > size {
                bail!("The coordinates must be at most {} bytes for {}.", size, curve);
            }

            Ok(Self {
                curve,
                x: util::pad_left(x, size),
                y: util::pad_left(y, size),
            })
        })()
        .map_err(|err| JoseError::InvalidKeyFormat(err))
    }

    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JoseError> {
        let curve = jwk_curve(jwk)?;
        (|| -> anyhow::Result<Self> {
            let x = jwk_coordinate(jwk, "x", curve)?;
            let y = jwk_coordinate(jwk, "y", curve)?;
            Ok(Self { curve, x, y })
        })()
        .map_err(|err| JoseError::InvalidKeyFormat(err))
    }

    pub fn to_jwk(&self) -> Jwk {
        let mut jwk = Jwk::new("EC");
        jwk.set_curve(self.curve.name());
        jwk.set_base64_parameter("x", &self.x);
        jwk.set_base64_parameter("y", &self.y);
        jwk
    }

    pub fn curve(&self) -> EcCurve {
        self.curve
    }

    pub fn x(&self) -> &[u8] {
        &self.x
    }

    pub fn y(&self) -> &[u8] {
        &self.y
    }
}

#[derive(Clone)]
pub struct EcPrivateKey {
    public_key: EcPublicKey,
    d: Zeroizing<Vec<u8>>,
}

impl EcPrivateKey {
    pub fn new(public_key: EcPublicKey, d: &[u8]) -> Result<Self, JoseError> {
        (|| -> anyhow::Result<Self> {
            let size = public_key.curve.coordinate_size();
            if d.len() > size {
                bail!("The private scalar must be at most {} bytes.", size);
            }
            Ok(Self {
                d: Zeroizing::new(util::pad_left(d, size)),
                public_key,
            })
        })()
        .map_err(|err| JoseError::InvalidKeyFormat(err))
    }

    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JoseError> {
        let public_key = EcPublicKey::from_jwk(jwk)?;
        (|| -> anyhow::Result<Self> {
            let d = jwk_coordinate(jwk, "d", public_key.curve)?;
            Ok(Self {
                public_key,
                d: Zeroizing::new(d),
            })
        })()
        .map_err(|err| JoseError::InvalidKeyFormat(err))
    }

    pub fn to_jwk(&self) -> Jwk {
        let mut jwk = self.public_key.to_jwk();
        jwk.set_base64_parameter("d", &self.d);
        jwk
    }

    pub fn to_public_key(&self) -> EcPublicKey {
        self.public_key.clone()
    }

    pub fn public_key(&self) -> &EcPublicKey {
        &self.public_key
    }

    pub fn curve(&self) -> EcCurve {
        self.public_key.curve
    }

    pub fn d(&self) -> &[u8] {
        &self.d
    }
}

impl Debug for EcPrivateKey {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("EcPrivateKey")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl PartialEq for EcPrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key && *self.d == *other.d
    }
}

impl Eq for EcPrivateKey {}

fn jwk_curve(jwk: &Jwk) -> Result<EcCurve, JoseError> {
    if jwk.key_type() != "EC" {
        return Err(JoseError::InvalidKeyFormat(anyhow::anyhow!(
            "A parameter kty must be EC: {}",
            jwk.key_type()
        )));
    }
    match jwk.curve() {
        Some(val) => EcCurve::from_name(val),
        None => Err(JoseError::InvalidKeyFormat(anyhow::anyhow!(
            "A parameter crv is required."
        ))),
    }
}

fn jwk_coordinate(jwk: &Jwk, name: &str, curve: EcCurve) -> anyhow::Result<Vec<u8>> {
    let val = match jwk.parameter(name) {
        Some(Value::String(val)) => util::decode_base64_urlsafe_strict(val)?,
        Some(val) => bail!("A parameter {} must be string type but {:?}", name, val),
        None => bail!("A parameter {} is required.", name),
    };
    if val.len() != curve.coordinate_size() {
        bail!(
            "A parameter {} must be {} bytes for {}: {}",
            name,
            curve.coordinate_size(),
            curve,
            val.len()
        );
    }
    Ok(val)
}
