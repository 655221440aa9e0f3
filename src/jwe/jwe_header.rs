use std::fmt::Display;

use anyhow::bail;
use serde_json::{Map, Number, Value};

use crate::jose::JoseHeader;
use crate::jwk::Jwk;
use crate::util;
use crate::JoseError;

/// Header parameter names registered for JWE by RFC7516 and RFC7518.
pub(crate) const REGISTERED_NAMES: &[&str] = &[
    "alg", "enc", "zip", "jku", "jwk", "kid", "x5u", "x5c", "x5t", "x5t#S256", "typ", "cty",
    "crit", "epk", "apu", "apv", "p2s", "p2c", "iv", "tag",
];

/// Represent a single JWE header fragment (protected, shared unprotected or per-recipient).
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct JweHeader {
    claims: Map<String, Value>,
}

impl JweHeader {
    /// Return a new JweHeader instance.
    pub fn new() -> Self {
        Self { claims: Map::new() }
    }

    /// Return a new header instance from json style header.
    ///
    /// # Arguments
    ///
    /// * `value` - The json style header claims
    pub fn from_bytes(value: &[u8]) -> Result<Self, JoseError> {
        (|| -> anyhow::Result<Self> {
            let claims: Map<String, Value> = serde_json::from_slice(value)?;
            Ok(Self::from_map(claims)?)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::MalformedHeader(err),
        })
    }

    /// Return a new header instance from map.
    ///
    /// # Arguments
    ///
    /// * `claims` - The header claims
    pub fn from_map(claims: Map<String, Value>) -> Result<Self, JoseError> {
        for (key, value) in &claims {
            Self::check_claim(key, value)?;
        }
        Ok(Self { claims })
    }

    /// Set a value for algorithm header claim (alg).
    ///
    /// # Arguments
    ///
    /// * `value` - a algorithm
    pub fn set_algorithm(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("alg".to_string(), Value::String(value));
    }

    /// Set a value for content encryption header claim (enc).
    ///
    /// # Arguments
    ///
    /// * `value` - a content encryption
    pub fn set_content_encryption(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("enc".to_string(), Value::String(value));
    }

    /// Return the value for content encryption header claim (enc).
    pub fn content_encryption(&self) -> Option<&str> {
        self.string_claim("enc")
    }

    /// Set a value for compression header claim (zip).
    ///
    /// The payload is never compressed by this crate; the claim is carried as declared.
    pub fn set_compression(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("zip".to_string(), Value::String(value));
    }

    /// Return the value for compression header claim (zip).
    pub fn compression(&self) -> Option<&str> {
        self.string_claim("zip")
    }

    /// Set a value for JWK set URL header claim (jku).
    pub fn set_jwk_set_url(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("jku".to_string(), Value::String(value));
    }

    /// Return the value for JWK set URL header claim (jku).
    pub fn jwk_set_url(&self) -> Option<&str> {
        self.string_claim("jku")
    }

    /// Set a value for JWK header claim (jwk).
    pub fn set_jwk(&mut self, value: Jwk) {
        self.claims
            .insert("jwk".to_string(), Value::Object(value.into()));
    }

    /// Return the value for JWK header claim (jwk).
    pub fn jwk(&self) -> Option<Jwk> {
        self.jwk_claim("jwk")
    }

    /// Set a value for X.509 URL header claim (x5u).
    pub fn set_x509_url(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("x5u".to_string(), Value::String(value));
    }

    /// Return the value for X.509 URL header claim (x5u).
    pub fn x509_url(&self) -> Option<&str> {
        self.string_claim("x5u")
    }

    /// Return the value for X.509 certificate SHA-1 thumbprint header claim (x5t).
    pub fn x509_certificate_sha1_thumbprint(&self) -> Option<Vec<u8>> {
        self.base64_claim("x5t")
    }

    /// Return the value for X.509 certificate SHA-256 thumbprint header claim (x5t#S256).
    pub fn x509_certificate_sha256_thumbprint(&self) -> Option<Vec<u8>> {
        self.base64_claim("x5t#S256")
    }

    /// Set a value for key ID header claim (kid).
    ///
    /// # Arguments
    ///
    /// * `value` - a key ID
    pub fn set_key_id(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("kid".to_string(), Value::String(value));
    }

    /// Set a value for token type header claim (typ).
    pub fn set_token_type(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("typ".to_string(), Value::String(value));
    }

    /// Return the value for token type header claim (typ).
    pub fn token_type(&self) -> Option<&str> {
        self.string_claim("typ")
    }

    /// Set a value for content type header claim (cty).
    pub fn set_content_type(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("cty".to_string(), Value::String(value));
    }

    /// Return the value for content type header claim (cty).
    pub fn content_type(&self) -> Option<&str> {
        self.string_claim("cty")
    }

    /// Set values for critical header claim (crit).
    ///
    /// # Arguments
    ///
    /// * `values` - critical claim names
    pub fn set_critical(&mut self, values: Vec<impl Into<String>>) {
        let mut vec = Vec::with_capacity(values.len());
        for val in values {
            let val: String = val.into();
            vec.push(Value::String(val));
        }
        self.claims.insert("crit".to_string(), Value::Array(vec));
    }

    /// Return values for critical header claim (crit).
    pub fn critical(&self) -> Option<Vec<&str>> {
        match self.claims.get("crit") {
            Some(Value::Array(vals)) => Some(vals.iter().filter_map(|val| val.as_str()).collect()),
            _ => None,
        }
    }

    /// Set a value for ephemeral public key header claim (epk).
    pub fn set_ephemeral_public_key(&mut self, value: Jwk) {
        self.claims
            .insert("epk".to_string(), Value::Object(value.into()));
    }

    /// Return the value for ephemeral public key header claim (epk).
    pub fn ephemeral_public_key(&self) -> Option<Jwk> {
        self.jwk_claim("epk")
    }

    /// Set a value for agreement PartyUInfo header claim (apu).
    pub fn set_agreement_partyuinfo(&mut self, value: impl AsRef<[u8]>) {
        self.set_base64_claim("apu", value.as_ref());
    }

    /// Return the value for agreement PartyUInfo header claim (apu).
    pub fn agreement_partyuinfo(&self) -> Option<Vec<u8>> {
        self.base64_claim("apu")
    }

    /// Set a value for agreement PartyVInfo header claim (apv).
    pub fn set_agreement_partyvinfo(&mut self, value: impl AsRef<[u8]>) {
        self.set_base64_claim("apv", value.as_ref());
    }

    /// Return the value for agreement PartyVInfo header claim (apv).
    pub fn agreement_partyvinfo(&self) -> Option<Vec<u8>> {
        self.base64_claim("apv")
    }

    /// Set a value for PBES2 salt input header claim (p2s).
    pub fn set_pbes2_salt_input(&mut self, value: impl AsRef<[u8]>) {
        self.set_base64_claim("p2s", value.as_ref());
    }

    /// Return the value for PBES2 salt input header claim (p2s).
    pub fn pbes2_salt_input(&self) -> Option<Vec<u8>> {
        self.base64_claim("p2s")
    }

    /// Set a value for PBES2 count header claim (p2c).
    pub fn set_pbes2_count(&mut self, value: u64) {
        self.claims
            .insert("p2c".to_string(), Value::Number(Number::from(value)));
    }

    /// Return the value for PBES2 count header claim (p2c).
    pub fn pbes2_count(&self) -> Option<u64> {
        match self.claims.get("p2c") {
            Some(Value::Number(val)) => val.as_u64(),
            _ => None,
        }
    }

    /// Set a value for initialization vector header claim (iv).
    pub fn set_initialization_vector(&mut self, value: impl AsRef<[u8]>) {
        self.set_base64_claim("iv", value.as_ref());
    }

    /// Return the value for initialization vector header claim (iv).
    pub fn initialization_vector(&self) -> Option<Vec<u8>> {
        self.base64_claim("iv")
    }

    /// Set a value for authentication tag header claim (tag).
    pub fn set_authentication_tag(&mut self, value: impl AsRef<[u8]>) {
        self.set_base64_claim("tag", value.as_ref());
    }

    /// Return the value for authentication tag header claim (tag).
    pub fn authentication_tag(&self) -> Option<Vec<u8>> {
        self.base64_claim("tag")
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.claims.contains_key(key)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.claims
    }

    fn string_claim(&self, key: &str) -> Option<&str> {
        match self.claims.get(key) {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    fn base64_claim(&self, key: &str) -> Option<Vec<u8>> {
        match self.claims.get(key) {
            Some(Value::String(val)) => util::decode_base64_urlsafe_no_pad(val).ok(),
            _ => None,
        }
    }

    fn set_base64_claim(&mut self, key: &str, value: &[u8]) {
        self.claims.insert(
            key.to_string(),
            Value::String(util::encode_base64_urlsafe_nopad(value)),
        );
    }

    fn jwk_claim(&self, key: &str) -> Option<Jwk> {
        match self.claims.get(key) {
            Some(Value::Object(vals)) => Jwk::from_map(vals.clone()).ok(),
            _ => None,
        }
    }

    fn check_claim(key: &str, value: &Value) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            match key {
                "alg" | "enc" | "zip" | "jku" | "x5u" | "kid" | "typ" | "cty" => match value {
                    Value::String(_) => {}
                    _ => bail!("The JWE {} header claim must be a string.", key),
                },
                "x5t" | "x5t#S256" | "apu" | "apv" | "p2s" | "iv" | "tag" => match value {
                    Value::String(val) => {
                        if !util::is_base64_urlsafe_nopad(val) {
                            bail!("The JWE {} header claim must be a base64url string.", key);
                        }
                    }
                    _ => bail!("The JWE {} header claim must be a string.", key),
                },
                "p2c" => match value {
                    Value::Number(val) => match val.as_u64() {
                        Some(val) if val > 0 => {}
                        _ => bail!("The JWE {} header claim must be a positive integer.", key),
                    },
                    _ => bail!("The JWE {} header claim must be a number.", key),
                },
                "jwk" | "epk" => match value {
                    Value::Object(vals) => {
                        if let Err(err) = Jwk::from_map(vals.clone()) {
                            bail!("The JWE {} header claim must be a JWK: {}", key, err);
                        }
                    }
                    _ => bail!("The JWE {} header claim must be a object.", key),
                },
                "x5c" | "crit" => match value {
                    Value::Array(vals) => {
                        if key == "crit" && vals.is_empty() {
                            bail!("The JWE {} header claim must not be empty.", key);
                        }
                        for val in vals {
                            match val {
                                Value::String(_) => {}
                                _ => bail!(
                                    "An element of the JWE {} header claim must be a string.",
                                    key
                                ),
                            }
                        }
                    }
                    _ => bail!("The JWE {} header claim must be a array.", key),
                },
                _ => {}
            }

            Ok(())
        })()
        .map_err(|err| JoseError::MalformedHeader(err))
    }
}

impl JoseHeader for JweHeader {
    fn claims_set(&self) -> &Map<String, Value> {
        &self.claims
    }

    fn set_claim(&mut self, key: &str, value: Option<Value>) -> Result<(), JoseError> {
        match value {
            Some(val) => {
                Self::check_claim(key, &val)?;
                self.claims.insert(key.to_string(), val);
            }
            None => {
                self.claims.remove(key);
            }
        }
        Ok(())
    }
}

impl AsRef<Map<String, Value>> for JweHeader {
    fn as_ref(&self) -> &Map<String, Value> {
        &self.claims
    }
}

impl From<JweHeader> for Map<String, Value> {
    fn from(header: JweHeader) -> Self {
        header.into_map()
    }
}

impl Display for JweHeader {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let val = serde_json::to_string(self.claims_set()).map_err(|_e| std::fmt::Error {})?;
        fmt.write_str(&val)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;

    use super::*;

    #[test]
    fn typed_claims_round_trip() -> Result<()> {
        let mut header = JweHeader::new();
        header.set_algorithm("PBES2-HS256+A128KW");
        header.set_content_encryption("A128GCM");
        header.set_pbes2_salt_input(b"salt");
        header.set_pbes2_count(4096);
        header.set_critical(vec!["exp"]);

        let parsed = JweHeader::from_bytes(header.to_string().as_bytes())?;
        assert_eq!(parsed, header);
        assert_eq!(parsed.algorithm(), Some("PBES2-HS256+A128KW"));
        assert_eq!(parsed.content_encryption(), Some("A128GCM"));
        assert_eq!(parsed.pbes2_salt_input(), Some(b"salt".to_vec()));
        assert_eq!(parsed.pbes2_count(), Some(4096));
        assert_eq!(parsed.critical(), Some(vec!["exp"]));
        Ok(())
    }

    #[test]
    fn rejects_wrongly_typed_claims() {
        for (key, value) in [
            ("alg", json!(1)),
            ("p2c", json!(0)),
            ("p2c", json!("1000")),
            ("iv", json!("not base64!")),
            ("epk", json!({"crv": "P-256"})),
            ("crit", json!([])),
            ("crit", json!([1])),
        ] {
            let mut header = JweHeader::new();
            assert!(
                matches!(
                    header.set_claim(key, Some(value)),
                    Err(JoseError::MalformedHeader(_))
                ),
                "{} must be rejected",
                key
            );
        }

        assert!(matches!(
            JweHeader::from_bytes(b"[]"),
            Err(JoseError::MalformedHeader(_))
        ));
    }
}
