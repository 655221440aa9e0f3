//! Distinct byte buffer types for the parts of a JWE message.
use std::fmt::Debug;

use zeroize::Zeroizing;

use crate::util;

macro_rules! octets {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Eq, PartialEq, Clone, Default)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn new(value: impl Into<Vec<u8>>) -> Self {
                Self(value.into())
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn to_base64(&self) -> String {
                util::encode_base64_urlsafe_nopad(&self.0)
            }

            pub fn into_vec(self) -> Vec<u8> {
                self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(value: Vec<u8>) -> Self {
                Self(value)
            }
        }
    };
}

octets!(
    /// An encrypted (or wrapped) content encryption key.
    EncryptedKey
);
octets!(
    /// A content encryption initialization vector.
    Iv
);
octets!(
    /// An authentication tag.
    Tag
);
octets!(Ciphertext);

/// A content encryption key. The buffer is wiped when dropped.
#[derive(Clone, Eq, PartialEq)]
pub struct Cek(Zeroizing<Vec<u8>>);

impl Cek {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Cek {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Cek {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl Debug for Cek {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "Cek({} bytes)", self.0.len())
    }
}
