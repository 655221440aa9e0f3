use anyhow::bail;
use base64::DecodeError;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex;

pub(crate) fn ceiling(len: usize, div: usize) -> usize {
    (len + (div - 1)) / div
}

pub(crate) fn is_base64_urlsafe_nopad(input: &str) -> bool {
    static RE_BASE64_URL_SAFE_NOPAD: Lazy<regex::Regex> = Lazy::new(|| {
        regex::Regex::new(
            r"^(?:[A-Za-z0-9_-]{4})*(?:[A-Za-z0-9_-][AQgw]|[A-Za-z0-9_-]{2}[AEIMQUYcgkosw048])?$",
        )
        .unwrap()
    });

    RE_BASE64_URL_SAFE_NOPAD.is_match(input)
}

pub(crate) fn encode_base64_urlsafe_nopad(input: impl AsRef<[u8]>) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(input)
}

pub(crate) fn decode_base64_urlsafe_no_pad(
    input: impl AsRef<[u8]>,
) -> Result<Vec<u8>, DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(input)
}

/// Decode a base64url string, rejecting padding and non-canonical trailing bits.
pub(crate) fn decode_base64_urlsafe_strict(input: &str) -> anyhow::Result<Vec<u8>> {
    if !is_base64_urlsafe_nopad(input) {
        bail!("The value is not a canonical base64url string.");
    }
    Ok(decode_base64_urlsafe_no_pad(input)?)
}

pub(crate) fn be32(value: usize) -> anyhow::Result<[u8; 4]> {
    match u32::try_from(value) {
        Ok(val) => Ok(val.to_be_bytes()),
        Err(_) => bail!("The value is too large for a 32-bit length: {}", value),
    }
}

pub(crate) fn be64(value: usize) -> [u8; 8] {
    (value as u64).to_be_bytes()
}

pub(crate) fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let len = parts.iter().map(|part| part.len()).sum();
    let mut vec = Vec::with_capacity(len);
    for part in parts {
        vec.extend_from_slice(part);
    }
    vec
}

/// Left-pad a big-endian unsigned integer to a fixed length.
pub(crate) fn pad_left(input: &[u8], len: usize) -> Vec<u8> {
    if input.len() >= len {
        input.to_vec()
    } else {
        let mut vec = vec![0; len - input.len()];
        vec.extend_from_slice(input);
        vec
    }
}
