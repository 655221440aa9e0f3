//! JWK data model: the key container, key sets, and typed key material.
pub mod ec;
mod jwk;
mod jwk_set;
pub mod rsa;

pub use crate::jwk::ec::{EcCurve, EcPrivateKey, EcPublicKey};
pub use crate::jwk::jwk::Jwk;
pub use crate::jwk::jwk_set::JwkSet;
pub use crate::jwk::rsa::{RsaPrimes, RsaPrivateKey, RsaPublicKey};
