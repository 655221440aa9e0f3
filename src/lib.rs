//! # jwekit
//!
//! `jwekit` is a JWE (JSON Web Encryption) engine covering the key management and
//! content encryption algorithms of RFC 7518, with compact, general JSON and
//! flattened JSON serializations.
//!
//! Cryptographic primitives are reached through [`crypto::CryptoProvider`]; the
//! default provider is backed by OpenSSL.
pub mod crypto;
pub mod jose;
pub mod jwe;
pub mod jwk;

mod error;
mod util;

pub use crate::error::JoseError;

pub use serde_json::{Map, Number, Value};
