use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Read;
use std::ops::Bound::Included;
use std::sync::Arc;

use anyhow::bail;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::jwk::Jwk;
use crate::JoseError;

/// Represents JWK set.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct JwkSet {
    keys: Vec<Arc<Jwk>>,
    params: Map<String, Value>,

    kid_map: BTreeMap<(String, usize), Arc<Jwk>>,
}

impl JwkSet {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            params: {
                let mut map = Map::new();
                map.insert("keys".to_string(), Value::Array(Vec::new()));
                map
            },
            kid_map: BTreeMap::new(),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Result<Self, JoseError> {
        (|| -> anyhow::Result<Self> {
            let mut kid_map = BTreeMap::new();
            let keys = match map.get("keys") {
                Some(Value::Array(vals)) => {
                    let mut vec = Vec::new();
                    for (i, val) in vals.iter().enumerate() {
                        match val {
                            Value::Object(val) => {
                                let jwk = Arc::new(Jwk::from_map(val.clone())?);
                                if let Some(kid) = jwk.key_id() {
                                    kid_map.insert((kid.to_string(), i), Arc::clone(&jwk));
                                }
                                vec.push(jwk);
                            }
                            _ => bail!("An element of the JWK set keys parameter must be a object."),
                        }
                    }
                    vec
                }
                Some(_) => bail!("The JWK set keys parameter must be a array."),
                None => bail!("The JWK set must have a keys parameter."),
            };

            Ok(Self {
                keys,
                params: map,
                kid_map,
            })
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    pub fn from_reader(input: &mut dyn Read) -> Result<Self, JoseError> {
        (|| -> anyhow::Result<Self> {
            let keys: Map<String, Value> = serde_json::from_reader(input)?;
            Ok(Self::from_map(keys)?)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    pub fn from_bytes(input: impl AsRef<[u8]>) -> Result<Self, JoseError> {
        (|| -> anyhow::Result<Self> {
            let keys: Map<String, Value> = serde_json::from_slice(input.as_ref())?;
            Ok(Self::from_map(keys)?)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    /// Return keys with the specified key ID.
    pub fn get(&self, key_id: &str) -> Vec<&Jwk> {
        let mut vec = Vec::new();
        for (_, val) in self.kid_map.range((
            Included((key_id.to_string(), 0)),
            Included((key_id.to_string(), usize::MAX)),
        )) {
            let jwk: &Jwk = val;
            vec.push(jwk);
        }
        vec
    }

    /// Return the keys of a key type, narrowed by key ID when one is given.
    ///
    /// # Arguments
    /// * `key_type` - A key type (kty)
    /// * `key_id` - A key ID (kid)
    pub fn find(&self, key_type: &str, key_id: Option<&str>) -> Vec<&Jwk> {
        let candidates = match key_id {
            Some(val) => self.get(val),
            None => self.keys(),
        };
        candidates
            .into_iter()
            .filter(|jwk| jwk.key_type() == key_type)
            .collect()
    }

    pub fn keys(&self) -> Vec<&Jwk> {
        self.keys.iter().map(|e| e.as_ref()).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn push_key(&mut self, jwk: Jwk) {
        if let Some(Value::Array(keys)) = self.params.get_mut("keys") {
            keys.push(Value::Object(jwk.as_ref().clone()));
        }

        let jwk = Arc::new(jwk);
        if let Some(kid) = jwk.key_id() {
            self.kid_map
                .insert((kid.to_string(), self.keys.len()), Arc::clone(&jwk));
        }
        self.keys.push(jwk);
    }

    pub fn remove_key(&mut self, jwk: &Jwk) {
        let index = self.keys.iter().position(|e| e.as_ref() == jwk);
        if let Some(index) = index {
            if let Some(Value::Array(keys)) = self.params.get_mut("keys") {
                keys.remove(index);
            }
            self.keys.remove(index);
            self.rebuild_kid_map();
        }
    }

    fn rebuild_kid_map(&mut self) {
        self.kid_map.clear();
        for (i, jwk) in self.keys.iter().enumerate() {
            if let Some(kid) = jwk.key_id() {
                self.kid_map.insert((kid.to_string(), i), Arc::clone(jwk));
            }
        }
    }
}

impl Default for JwkSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Jwk> for JwkSet {
    fn from_iter<I: IntoIterator<Item = Jwk>>(iter: I) -> Self {
        let mut set = Self::new();
        for jwk in iter {
            set.push_key(jwk);
        }
        set
    }
}

impl AsRef<Map<String, Value>> for JwkSet {
    fn as_ref(&self) -> &Map<String, Value> {
        &self.params
    }
}

impl Serialize for JwkSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.params.len()))?;
        for (k, v) in &self.params {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl Display for JwkSet {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let val = serde_json::to_string(&self).map_err(|_e| std::fmt::Error {})?;
        fmt.write_str(&val)
    }
}
