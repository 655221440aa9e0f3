use anyhow::bail;
use serde_json::{Map, Value};

use crate::jose::JoseHeader;
use crate::jwe::{
    enc, jwe_header, JweAlgorithm, JweHeader, KeyManagementAlgorithm, KeyManagementMode,
};
use crate::jwk::EcCurve;
use crate::JoseError;

/// The JOSE header of one recipient: the protected, shared unprotected and
/// per-recipient fragments together with their merged view.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct JweHeaderSet {
    protected: Option<JweHeader>,
    unprotected: Option<JweHeader>,
    recipient: Option<JweHeader>,
    effective: JweHeader,
    key_management: KeyManagementAlgorithm,
}

impl JweHeaderSet {
    /// Merge and validate header fragments.
    ///
    /// # Arguments
    ///
    /// * `protected` - The integrity protected header
    /// * `unprotected` - The shared unprotected header
    /// * `recipient` - The per-recipient unprotected header
    pub fn new(
        protected: Option<&JweHeader>,
        unprotected: Option<&JweHeader>,
        recipient: Option<&JweHeader>,
    ) -> Result<Self, JoseError> {
        let mut merged = Map::new();
        (|| -> anyhow::Result<()> {
            let fragments = [(protected, true), (unprotected, false), (recipient, false)];
            for (fragment, is_protected) in fragments {
                let fragment = match fragment {
                    Some(val) => val,
                    None => continue,
                };
                for (key, value) in fragment.claims_set() {
                    if !is_protected && (key == "crit" || key == "zip") {
                        bail!("The {} header claim must be integrity protected.", key);
                    }
                    if merged.contains_key(key) {
                        bail!("The {} header claim appears in more than one header.", key);
                    }
                    merged.insert(key.clone(), value.clone());
                }
            }
            Ok(())
        })()
        .map_err(|err| JoseError::MalformedHeader(err))?;

        let effective = JweHeader::from_map(merged)?;

        let alg = match effective.claim("alg") {
            Some(Value::String(val)) => val,
            _ => {
                return Err(JoseError::MalformedHeader(anyhow::anyhow!(
                    "The alg header claim is required."
                )))
            }
        };
        let key_management = KeyManagementAlgorithm::from_name(alg)?;

        let enc = match effective.content_encryption() {
            Some(val) => val,
            None => {
                return Err(JoseError::MalformedHeader(anyhow::anyhow!(
                    "The enc header claim is required."
                )))
            }
        };
        if !enc::REGISTERED_NAMES.contains(&enc) {
            return Err(JoseError::UnsupportedAlgorithm(format!(
                "Unknown JWE content encryption: {}",
                enc
            )));
        }

        if let Some(epk) = effective.ephemeral_public_key() {
            if let Some(crv) = epk.curve() {
                EcCurve::from_name(crv)?;
            }
        }

        if let Some(critical) = effective.critical() {
            (|| -> anyhow::Result<()> {
                for name in critical {
                    if jwe_header::REGISTERED_NAMES.contains(&name) {
                        bail!("The crit header claim must not list a registered name: {}", name);
                    }
                    if !effective.contains(name) {
                        bail!("The critical header claim is missing: {}", name);
                    }
                }
                Ok(())
            })()
            .map_err(|err| JoseError::MalformedHeader(err))?;
        }

        Ok(Self {
            protected: protected.cloned(),
            unprotected: unprotected.cloned(),
            recipient: recipient.cloned(),
            effective,
            key_management,
        })
    }

    /// Return the merged header.
    pub fn effective(&self) -> &JweHeader {
        &self.effective
    }

    pub fn protected(&self) -> Option<&JweHeader> {
        self.protected.as_ref()
    }

    pub fn unprotected(&self) -> Option<&JweHeader> {
        self.unprotected.as_ref()
    }

    pub fn recipient(&self) -> Option<&JweHeader> {
        self.recipient.as_ref()
    }

    /// Return the key management algorithm named by the alg header claim.
    pub fn key_management(&self) -> KeyManagementAlgorithm {
        self.key_management
    }

    /// Return the enc header claim.
    pub fn content_encryption(&self) -> &str {
        self.effective.content_encryption().unwrap_or_default()
    }

    /// Test whether the alg header claim belongs to a key management mode.
    pub fn cast_to_mode(&self, mode: KeyManagementMode) -> bool {
        self.key_management.mode() == mode
    }
}
