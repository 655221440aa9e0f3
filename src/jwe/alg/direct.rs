use std::fmt::Display;

use anyhow::anyhow;

use crate::jwe::{Cek, DirectEncryption, JweAlgorithm, KeyManagementMode};
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum DirectJweAlgorithm {
    /// Direct use of a shared symmetric key as the CEK
    Dir,
}

impl DirectJweAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "dir" => Some(Self::Dir),
            _ => None,
        }
    }
}

impl JweAlgorithm for DirectJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::Dir => "dir",
        }
    }

    fn mode(&self) -> KeyManagementMode {
        KeyManagementMode::DirectEncryption
    }
}

impl DirectEncryption for DirectJweAlgorithm {
    fn extract_cek(&self, key: &[u8], cek_len: usize) -> Result<Cek, JoseError> {
        if key.len() < cek_len {
            return Err(JoseError::InsufficientKeyLength(anyhow!(
                "The shared key must be {} bytes: {}",
                cek_len,
                key.len()
            )));
        }
        if key.len() != cek_len {
            return Err(JoseError::InvalidKeyFormat(anyhow!(
                "The shared key must be {} bytes: {}",
                cek_len,
                key.len()
            )));
        }
        Ok(Cek::new(key.to_vec()))
    }
}

impl Display for DirectJweAlgorithm {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}
