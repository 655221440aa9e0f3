use std::fmt::Display;

use anyhow::bail;
use serde_json::{Map, Value};

use crate::jose::JoseHeader;
use crate::jwe::{Ciphertext, EncryptedKey, Iv, JweHeader, Tag};
use crate::util;
use crate::JoseError;

/// The wire formats of a JWE message.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SerializationFormat {
    /// Five base64url parts separated by dots.
    Compact,
    /// General JSON serialization with a recipients array.
    Json,
    /// Flattened JSON serialization of a single recipient.
    FlattenedJson,
}

/// The per-recipient part of a JWE message.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct Recipient {
    header: Option<JweHeader>,
    encrypted_key: Option<EncryptedKey>,
}

impl Recipient {
    pub fn new(header: Option<JweHeader>, encrypted_key: Option<EncryptedKey>) -> Self {
        Self {
            header,
            encrypted_key,
        }
    }

    /// Return the per-recipient unprotected header.
    pub fn header(&self) -> Option<&JweHeader> {
        self.header.as_ref()
    }

    pub fn encrypted_key(&self) -> Option<&EncryptedKey> {
        self.encrypted_key.as_ref()
    }
}

/// An encrypted JWE message.
///
/// A message is produced by `JweContext::encrypt` or `JweMessage::deserialize`
/// and is not modified afterwards. The protected header keeps the base64url text
/// it was read from, because the authenticated data is computed over that text.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct JweMessage {
    protected: Option<(JweHeader, String)>,
    unprotected: Option<JweHeader>,
    aad: Option<Vec<u8>>,
    iv: Iv,
    ciphertext: Ciphertext,
    tag: Tag,
    recipients: Vec<Recipient>,
}

impl JweMessage {
    pub(crate) fn new(
        protected: Option<(JweHeader, String)>,
        unprotected: Option<JweHeader>,
        aad: Option<Vec<u8>>,
        iv: Iv,
        ciphertext: Ciphertext,
        tag: Tag,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            protected,
            unprotected,
            aad,
            iv,
            ciphertext,
            tag,
            recipients,
        }
    }

    /// Return the integrity protected header.
    pub fn protected(&self) -> Option<&JweHeader> {
        self.protected.as_ref().map(|(header, _)| header)
    }

    /// Return the base64url text of the protected header, or an empty string.
    pub fn encoded_protected(&self) -> &str {
        match &self.protected {
            Some((_, val)) => val,
            None => "",
        }
    }

    /// Return the shared unprotected header.
    pub fn unprotected(&self) -> Option<&JweHeader> {
        self.unprotected.as_ref()
    }

    /// Return the additional authenticated data supplied by the producer.
    pub fn aad(&self) -> Option<&[u8]> {
        self.aad.as_deref()
    }

    pub fn iv(&self) -> &Iv {
        &self.iv
    }

    pub fn ciphertext(&self) -> &Ciphertext {
        &self.ciphertext
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    /// Return the bytes authenticated by the content encryption.
    pub fn authenticated_data(&self) -> Vec<u8> {
        authenticated_data(self.encoded_protected(), self.aad())
    }

    /// Serialize the message.
    ///
    /// # Arguments
    ///
    /// * `format` - The serialization format
    pub fn serialize(&self, format: SerializationFormat) -> Result<String, JoseError> {
        (|| -> anyhow::Result<String> {
            match format {
                SerializationFormat::Compact => self.serialize_compact(),
                SerializationFormat::Json => self.serialize_json(false),
                SerializationFormat::FlattenedJson => self.serialize_json(true),
            }
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::SerializationFormatError(err),
        })
    }

    /// Deserialize a message in any of the serialization formats.
    ///
    /// JSON is detected by a leading `{`; anything else is read as compact.
    ///
    /// # Arguments
    ///
    /// * `input` - The serialized message
    pub fn deserialize(input: &str) -> Result<Self, JoseError> {
        (|| -> anyhow::Result<Self> {
            let input = input.trim();
            if input.starts_with('{') {
                Self::deserialize_json(input)
            } else {
                Self::deserialize_compact(input)
            }
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::SerializationFormatError(err),
        })
    }

    fn serialize_compact(&self) -> anyhow::Result<String> {
        if self.recipients.len() != 1 {
            bail!("The compact serialization form of JWE must have exactly one recipient.");
        }
        if self.unprotected.is_some() {
            bail!("The compact serialization form of JWE cannot carry a shared unprotected header.");
        }
        if self.aad.is_some() {
            bail!("The compact serialization form of JWE cannot carry additional authenticated data.");
        }
        let recipient = &self.recipients[0];
        if recipient.header.is_some() {
            bail!("The compact serialization form of JWE cannot carry a per-recipient header.");
        }
        let protected_b64 = match &self.protected {
            Some((_, val)) => val,
            None => bail!("The compact serialization form of JWE requires a protected header."),
        };

        let mut compact = String::new();
        compact.push_str(protected_b64);
        compact.push('.');
        if let Some(val) = &recipient.encrypted_key {
            compact.push_str(&val.to_base64());
        }
        compact.push('.');
        compact.push_str(&self.iv.to_base64());
        compact.push('.');
        compact.push_str(&self.ciphertext.to_base64());
        compact.push('.');
        compact.push_str(&self.tag.to_base64());
        Ok(compact)
    }

    fn serialize_json(&self, flattened: bool) -> anyhow::Result<String> {
        if flattened && self.recipients.len() != 1 {
            bail!("The flattened serialization form of JWE must have exactly one recipient.");
        }

        let mut json = String::new();
        json.push('{');

        if let Some((_, val)) = &self.protected {
            json.push_str("\"protected\":\"");
            json.push_str(val);
            json.push_str("\",");
        }

        if let Some(val) = &self.unprotected {
            json.push_str("\"unprotected\":");
            json.push_str(&serde_json::to_string(val.claims_set())?);
            json.push(',');
        }

        if flattened {
            push_recipient_members(&mut json, &self.recipients[0])?;
        } else {
            json.push_str("\"recipients\":[");
            for (i, recipient) in self.recipients.iter().enumerate() {
                if i > 0 {
                    json.push(',');
                }
                json.push('{');
                push_recipient_members(&mut json, recipient)?;
                if json.ends_with(',') {
                    json.pop();
                }
                json.push('}');
            }
            json.push_str("],");
        }

        if let Some(val) = &self.aad {
            json.push_str("\"aad\":\"");
            json.push_str(&util::encode_base64_urlsafe_nopad(val));
            json.push_str("\",");
        }

        json.push_str("\"iv\":\"");
        json.push_str(&self.iv.to_base64());
        json.push_str("\",\"ciphertext\":\"");
        json.push_str(&self.ciphertext.to_base64());
        json.push_str("\",\"tag\":\"");
        json.push_str(&self.tag.to_base64());
        json.push_str("\"}");
        Ok(json)
    }

    fn deserialize_compact(input: &str) -> anyhow::Result<Self> {
        let parts: Vec<&str> = input.split('.').collect();
        if parts.len() != 5 {
            bail!("The compact serialization form of JWE must be five parts separated by dots.");
        }

        if parts[0].is_empty() {
            bail!("The protected header of a compact JWE must not be empty.");
        }
        let protected = decode_protected(parts[0])?;

        let encrypted_key = if parts[1].is_empty() {
            None
        } else {
            Some(EncryptedKey::new(util::decode_base64_urlsafe_strict(parts[1])?))
        };
        let iv = Iv::new(decode_required(parts[2], "iv")?);
        let ciphertext = Ciphertext::new(util::decode_base64_urlsafe_strict(parts[3])?);
        let tag = Tag::new(decode_required(parts[4], "tag")?);

        Ok(Self {
            protected: Some((protected, parts[0].to_string())),
            unprotected: None,
            aad: None,
            iv,
            ciphertext,
            tag,
            recipients: vec![Recipient::new(None, encrypted_key)],
        })
    }

    fn deserialize_json(input: &str) -> anyhow::Result<Self> {
        let mut map: Map<String, Value> = serde_json::from_str(input)?;

        let protected = match map.remove("protected") {
            Some(Value::String(val)) => {
                if val.is_empty() {
                    bail!("The protected field must not be empty.");
                }
                Some((decode_protected(&val)?, val))
            }
            Some(_) => bail!("The protected field must be string."),
            None => None,
        };
        let unprotected = match map.remove("unprotected") {
            Some(Value::Object(val)) => Some(JweHeader::from_map(val)?),
            Some(_) => bail!("The unprotected field must be a object."),
            None => None,
        };
        let aad = match map.remove("aad") {
            Some(Value::String(val)) => Some(util::decode_base64_urlsafe_strict(&val)?),
            Some(_) => bail!("The aad field must be string."),
            None => None,
        };
        let iv = match map.remove("iv") {
            Some(Value::String(val)) => Iv::new(decode_required(&val, "iv")?),
            Some(_) => bail!("The iv field must be string."),
            None => bail!("The iv field is required."),
        };
        let ciphertext = match map.remove("ciphertext") {
            Some(Value::String(val)) => Ciphertext::new(util::decode_base64_urlsafe_strict(&val)?),
            Some(_) => bail!("The ciphertext field must be string."),
            None => bail!("The ciphertext field is required."),
        };
        let tag = match map.remove("tag") {
            Some(Value::String(val)) => Tag::new(decode_required(&val, "tag")?),
            Some(_) => bail!("The tag field must be string."),
            None => bail!("The tag field is required."),
        };

        let recipients = match map.remove("recipients") {
            Some(Value::Array(vals)) => {
                if vals.is_empty() {
                    bail!("The recipients field must not be empty.");
                }
                if map.contains_key("header") || map.contains_key("encrypted_key") {
                    bail!("The recipients field cannot be mixed with flattened members.");
                }
                let mut vec = Vec::with_capacity(vals.len());
                for val in vals {
                    match val {
                        Value::Object(mut val) => vec.push(read_recipient_members(&mut val)?),
                        _ => bail!("The recipients field must be a array of object."),
                    }
                }
                vec
            }
            Some(_) => bail!("The recipients field must be a array."),
            None => vec![read_recipient_members(&mut map)?],
        };

        Ok(Self {
            protected,
            unprotected,
            aad,
            iv,
            ciphertext,
            tag,
            recipients,
        })
    }
}

impl Display for JweMessage {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let val = self
            .serialize(SerializationFormat::Json)
            .map_err(|_e| std::fmt::Error {})?;
        fmt.write_str(&val)
    }
}

/// Build the content encryption AAD: ASCII(protected_b64), then "." and the
/// base64url of the caller's AAD when there is one.
pub(crate) fn authenticated_data(protected_b64: &str, aad: Option<&[u8]>) -> Vec<u8> {
    match aad {
        Some(val) => {
            let mut full = String::with_capacity(protected_b64.len() + 1 + val.len() * 4 / 3 + 4);
            full.push_str(protected_b64);
            full.push('.');
            full.push_str(&util::encode_base64_urlsafe_nopad(val));
            full.into_bytes()
        }
        None => protected_b64.as_bytes().to_vec(),
    }
}

fn push_recipient_members(json: &mut String, recipient: &Recipient) -> anyhow::Result<()> {
    if let Some(val) = &recipient.header {
        json.push_str("\"header\":");
        json.push_str(&serde_json::to_string(val.claims_set())?);
        json.push(',');
    }
    if let Some(val) = &recipient.encrypted_key {
        json.push_str("\"encrypted_key\":\"");
        json.push_str(&val.to_base64());
        json.push_str("\",");
    }
    Ok(())
}

fn read_recipient_members(map: &mut Map<String, Value>) -> anyhow::Result<Recipient> {
    let header = match map.remove("header") {
        Some(Value::Object(val)) => Some(JweHeader::from_map(val)?),
        Some(_) => bail!("The header field must be a object."),
        None => None,
    };
    let encrypted_key = match map.remove("encrypted_key") {
        Some(Value::String(val)) if val.is_empty() => None,
        Some(Value::String(val)) => Some(EncryptedKey::new(util::decode_base64_urlsafe_strict(
            &val,
        )?)),
        Some(_) => bail!("The encrypted_key field must be string."),
        None => None,
    };
    Ok(Recipient::new(header, encrypted_key))
}

fn decode_protected(input: &str) -> anyhow::Result<JweHeader> {
    let json = util::decode_base64_urlsafe_strict(input)?;
    Ok(JweHeader::from_bytes(&json)?)
}

fn decode_required(input: &str, name: &str) -> anyhow::Result<Vec<u8>> {
    if input.is_empty() {
        bail!("The {} part must not be empty.", name);
    }
    util::decode_base64_urlsafe_strict(input)
}
