use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::try_join_all;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::crypto::{CryptoProvider, OpensslProvider};
use crate::jose::JoseHeader;
use crate::jwe::alg::pbes2_hmac_aeskw::{DEFAULT_ITERATIONS, DEFAULT_SALT_LEN};
use crate::jwe::enc::JweContentEncryption;
use crate::jwe::jwe_message::{self, Recipient};
use crate::jwe::{
    A128CbcHs256, A128Gcm, A192CbcHs384, A192Gcm, A256CbcHs512, A256Gcm, Cek, DirectEncryption,
    DirectKeyAgreement, EncryptedKey, HeaderUpdates, Iv, JweAlgorithm, JweHeader, JweHeaderSet,
    JweMessage, KeyAgreementWithKeyWrapping, KeyEncryption, KeyManagementAlgorithm,
    KeyManagementMode, KeyWrapping, KeyWrappingAlgorithm,
};
use crate::jwk::{EcPrivateKey, EcPublicKey, Jwk, JwkSet, RsaPrivateKey, RsaPublicKey};
use crate::util;
use crate::JoseError;

/// The p2c value accepted at most on decryption.
pub const DEFAULT_PBES2_MAX_ITERATIONS: u64 = 1_000_000;

/// The header fragments of a message to encrypt.
///
/// `recipients` holds one per-recipient header for each recipient. An empty list
/// stands for a single recipient without a per-recipient header.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct JweHeaders {
    pub protected: Option<JweHeader>,
    pub unprotected: Option<JweHeader>,
    pub recipients: Vec<Option<JweHeader>>,
}

impl JweHeaders {
    /// Return headers for a single recipient with only a protected header.
    pub fn protected(header: JweHeader) -> Self {
        Self {
            protected: Some(header),
            ..Default::default()
        }
    }

    fn recipient_count(&self) -> usize {
        self.recipients.len().max(1)
    }
}

/// Caller supplied values that make encryption reproducible.
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    /// The content encryption key, for modes that encrypt or wrap a CEK.
    pub cek: Option<Cek>,
    /// The ephemeral key for ECDH-ES based algorithms.
    pub ephemeral_key: Option<EcPrivateKey>,
    /// Reuse the iv header claim for AES GCM key wrapping instead of drawing a fresh one.
    pub fixed_key_wrap_iv: bool,
}

#[derive(Debug, Clone)]
pub struct JweContext {
    provider: Arc<dyn CryptoProvider>,
    acceptable_criticals: BTreeSet<String>,
    content_encryptions: BTreeMap<String, Box<dyn JweContentEncryption>>,
    pbes2_salt_len: usize,
    pbes2_default_iterations: u64,
    pbes2_max_iterations: u64,
}

impl JweContext {
    /// Return a new context using a crypto provider.
    ///
    /// # Arguments
    ///
    /// * `provider` - The provider of the cryptographic primitives
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            provider,
            acceptable_criticals: BTreeSet::new(),
            content_encryptions: {
                let content_encryptions: Vec<Box<dyn JweContentEncryption>> = vec![
                    Box::new(A128CbcHs256),
                    Box::new(A192CbcHs384),
                    Box::new(A256CbcHs512),
                    Box::new(A128Gcm),
                    Box::new(A192Gcm),
                    Box::new(A256Gcm),
                ];

                let mut map = BTreeMap::new();
                for content_encryption in content_encryptions {
                    map.insert(content_encryption.name().to_string(), content_encryption);
                }
                map
            },
            pbes2_salt_len: DEFAULT_SALT_LEN,
            pbes2_default_iterations: DEFAULT_ITERATIONS,
            pbes2_max_iterations: DEFAULT_PBES2_MAX_ITERATIONS,
        }
    }

    pub fn provider(&self) -> &dyn CryptoProvider {
        self.provider.as_ref()
    }

    /// Test a critical header claim name is acceptable.
    ///
    /// # Arguments
    ///
    /// * `name` - a critical header claim name
    pub fn is_acceptable_critical(&self, name: &str) -> bool {
        self.acceptable_criticals.contains(name)
    }

    /// Add a acceptable critical header claim name
    ///
    /// # Arguments
    ///
    /// * `name` - a acceptable critical header claim name
    pub fn add_acceptable_critical(&mut self, name: &str) {
        self.acceptable_criticals.insert(name.to_string());
    }

    /// Remove a acceptable critical header claim name
    ///
    /// # Arguments
    ///
    /// * `name` - a acceptable critical header claim name
    pub fn remove_acceptable_critical(&mut self, name: &str) {
        self.acceptable_criticals.remove(name);
    }

    /// Get a content encryption algorithm for enc header claim value.
    ///
    /// # Arguments
    ///
    /// * `name` - a content encryption header claim name
    pub fn get_content_encryption(&self, name: &str) -> Option<&dyn JweContentEncryption> {
        match self.content_encryptions.get(name) {
            Some(val) => Some(val.as_ref()),
            None => None,
        }
    }

    /// Add a content encryption algorithm for enc header claim name.
    ///
    /// Only the enc values registered by RFC7518 pass header validation, so a
    /// registration replaces the implementation of one of them.
    ///
    /// # Arguments
    ///
    /// * `content_encryption` - a content encryption algorithm
    pub fn add_content_encryption(&mut self, content_encryption: Box<dyn JweContentEncryption>) {
        self.content_encryptions
            .insert(content_encryption.name().to_string(), content_encryption);
    }

    /// Remove a content encryption algorithm for enc header claim name.
    ///
    /// # Arguments
    ///
    /// * `name` - a enc header claim name
    pub fn remove_content_encryption(&mut self, name: &str) {
        self.content_encryptions.remove(name);
    }

    /// Set the length of the p2s value generated for PBES2 recipients.
    pub fn set_pbes2_salt_len(&mut self, value: usize) {
        self.pbes2_salt_len = value;
    }

    pub fn pbes2_salt_len(&self) -> usize {
        self.pbes2_salt_len
    }

    /// Set the p2c value used for PBES2 recipients without one.
    pub fn set_pbes2_default_iterations(&mut self, value: u64) {
        self.pbes2_default_iterations = value;
    }

    pub fn pbes2_default_iterations(&self) -> u64 {
        self.pbes2_default_iterations
    }

    /// Set the largest p2c value accepted on decryption.
    pub fn set_pbes2_max_iterations(&mut self, value: u64) {
        self.pbes2_max_iterations = value;
    }

    pub fn pbes2_max_iterations(&self) -> u64 {
        self.pbes2_max_iterations
    }

    /// Encrypt a payload to one or more recipients.
    ///
    /// Every recipient gets a key from `keys`, selected by the key type of its alg
    /// header claim and its kid header claim. All recipients share one content
    /// encryption key and one ciphertext.
    ///
    /// # Arguments
    ///
    /// * `keys` - The recipients' keys
    /// * `plaintext` - The payload
    /// * `headers` - The header fragments
    /// * `iv` - The content encryption iv, random when None
    /// * `aad` - The additional authenticated data
    /// * `options` - Caller supplied CEK, ephemeral key and key wrapping iv policy
    #[instrument(skip_all, fields(recipients = headers.recipient_count()))]
    pub async fn encrypt(
        &self,
        keys: &JwkSet,
        plaintext: &[u8],
        headers: &JweHeaders,
        iv: Option<&Iv>,
        aad: Option<&[u8]>,
        options: &EncryptOptions,
    ) -> Result<JweMessage, JoseError> {
        let mut protected = headers.protected.clone().filter(|val| !val.is_empty());
        let unprotected = headers.unprotected.clone().filter(|val| !val.is_empty());
        let mut recipient_headers: Vec<Option<JweHeader>> = if headers.recipients.is_empty() {
            vec![None]
        } else {
            headers
                .recipients
                .iter()
                .map(|val| val.clone().filter(|val| !val.is_empty()))
                .collect()
        };

        let mut sets = Vec::with_capacity(recipient_headers.len());
        for recipient in &recipient_headers {
            sets.push(JweHeaderSet::new(
                protected.as_ref(),
                unprotected.as_ref(),
                recipient.as_ref(),
            )?);
        }

        let enc = sets[0].content_encryption().to_string();
        if sets.iter().any(|set| set.content_encryption() != enc) {
            return Err(JoseError::MalformedHeader(anyhow!(
                "All recipients must have the same enc header claim."
            )));
        }
        let cencryption = self.content_encryption(&enc)?;
        debug!(enc = %enc, "resolved content encryption");

        self.check_encrypt_options(&sets, cencryption, options)?;

        let cek = match &options.cek {
            Some(val) => Some(val.clone()),
            None if sets.iter().any(|set| set.key_management().mode().accepts_cek()) => {
                Some(cencryption.generate_cek(self.provider()).await?)
            }
            None => None,
        };

        let mut recipients = Vec::with_capacity(sets.len());
        for set in &sets {
            let jwk = self.select_key(keys, set, false)?;
            let effective = self.prepare_effective_header(set).await?;
            recipients.push((set.key_management(), jwk, effective));
        }

        let established = try_join_all(recipients.iter().map(|(alg, jwk, effective)| {
            self.establish_cek(*alg, jwk, effective, cek.as_ref(), cencryption.key_len(), options)
        }))
        .await?;
        debug!(count = established.len(), "established content encryption keys");

        let cek = match established.first() {
            Some((val, _, _)) => val.clone(),
            None => return Err(JoseError::InconsistentCek),
        };
        if established.iter().any(|(val, _, _)| *val != cek) {
            return Err(JoseError::InconsistentCek);
        }

        let place_in_protected = recipient_headers.len() == 1 && recipient_headers[0].is_none();
        let mut encrypted_keys = Vec::with_capacity(established.len());
        for (i, (_, encrypted_key, updates)) in established.into_iter().enumerate() {
            let target = if place_in_protected {
                protected.get_or_insert_with(JweHeader::new)
            } else {
                recipient_headers[i].get_or_insert_with(JweHeader::new)
            };
            apply_updates(target, sets[i].effective(), updates)?;
            encrypted_keys.push(encrypted_key);
        }

        for recipient in &recipient_headers {
            JweHeaderSet::new(protected.as_ref(), unprotected.as_ref(), recipient.as_ref())?;
        }

        let protected = match protected {
            Some(header) => {
                let json = serde_json::to_vec(header.claims_set())
                    .map_err(|err| JoseError::MalformedHeader(err.into()))?;
                let b64 = util::encode_base64_urlsafe_nopad(json);
                Some((header, b64))
            }
            None => None,
        };
        let protected_b64 = match &protected {
            Some((_, val)) => val.as_str(),
            None => "",
        };

        let iv = match iv {
            Some(val) => val.clone(),
            None => Iv::new(
                self.provider
                    .random_bytes(cencryption.iv_len())
                    .await
                    .map_err(JoseError::CryptoFailure)?,
            ),
        };
        let full_aad = jwe_message::authenticated_data(protected_b64, aad);
        let (ciphertext, tag) = cencryption
            .encrypt(self.provider(), &cek, &iv, &full_aad, plaintext)
            .await?;
        debug!("encrypted content");

        let recipients = recipient_headers
            .into_iter()
            .zip(encrypted_keys)
            .map(|(header, encrypted_key)| Recipient::new(header, encrypted_key))
            .collect();

        Ok(JweMessage::new(
            protected,
            unprotected,
            aad.map(|val| val.to_vec()),
            iv,
            ciphertext,
            tag,
            recipients,
        ))
    }

    /// Decrypt a message with the only recipient that has a matching key.
    ///
    /// Authentication failures of the key management or the content encryption
    /// are reported as `DecryptionFailed`.
    ///
    /// # Arguments
    ///
    /// * `message` - The message
    /// * `keys` - The candidate private or shared keys
    #[instrument(skip_all, fields(recipients = message.recipients().len()))]
    pub async fn decrypt(&self, message: &JweMessage, keys: &JwkSet) -> Result<Vec<u8>, JoseError> {
        let multiple = message.recipients().len() > 1;
        let mut matches = Vec::new();
        for recipient in message.recipients() {
            let set = match JweHeaderSet::new(
                message.protected(),
                message.unprotected(),
                recipient.header(),
            ) {
                Ok(val) => val,
                Err(JoseError::UnsupportedAlgorithm(_)) if multiple => continue,
                Err(err) => return Err(err),
            };

            let candidates = self.candidate_keys(keys, &set, true);
            if !candidates.is_empty() {
                matches.push((recipient, set, candidates));
            }
        }

        let (recipient, set, candidates) = match matches.len() {
            0 => {
                return Err(JoseError::NoMatchingKey(anyhow!(
                    "No recipient has a matching key."
                )))
            }
            1 => matches.remove(0),
            n => return Err(JoseError::AmbiguousRecipient(n)),
        };
        let jwk = match candidates.as_slice() {
            [val] => *val,
            vals => {
                return Err(JoseError::AmbiguousKey(anyhow!(
                    "{} keys match the recipient.",
                    vals.len()
                )))
            }
        };

        if let Some(critical) = set.effective().critical() {
            for name in critical {
                if !self.is_acceptable_critical(name) {
                    return Err(JoseError::MalformedHeader(anyhow!(
                        "The critical name '{}' is not supported.",
                        name
                    )));
                }
            }
        }

        let alg = set.key_management();
        let cencryption = self.content_encryption(set.content_encryption())?;
        debug!(alg = %alg, enc = cencryption.name(), "selected recipient");

        if let KeyManagementAlgorithm::KeyWrapping(KeyWrappingAlgorithm::Pbes2HmacAeskw(_)) = alg {
            if let Some(p2c) = set.effective().pbes2_count() {
                if p2c > self.pbes2_max_iterations {
                    return Err(JoseError::MalformedHeader(anyhow!(
                        "The p2c header claim must be {} or less: {}",
                        self.pbes2_max_iterations,
                        p2c
                    )));
                }
            }
        }

        let encrypted_key = recipient.encrypted_key();
        match (alg.mode().has_encrypted_key(), encrypted_key) {
            (true, None) => {
                return Err(JoseError::MalformedHeader(anyhow!(
                    "The encrypted_key is required for {}.",
                    alg
                )))
            }
            (false, Some(_)) => {
                return Err(JoseError::MalformedHeader(anyhow!(
                    "The encrypted_key must be empty for {}.",
                    alg
                )))
            }
            _ => {}
        }

        let cek = self
            .recover_cek(alg, jwk, set.effective(), encrypted_key, cencryption.key_len())
            .await
            .map_err(into_decryption_failure)?;
        if cek.len() != cencryption.key_len() || message.iv().len() != cencryption.iv_len() {
            return Err(JoseError::DecryptionFailed);
        }

        let full_aad = message.authenticated_data();
        let plaintext = cencryption
            .decrypt(
                self.provider(),
                &cek,
                message.iv(),
                &full_aad,
                message.ciphertext(),
                message.tag(),
            )
            .await
            .map_err(into_decryption_failure)?;
        debug!("decrypted content");
        Ok(plaintext)
    }

    fn content_encryption(&self, name: &str) -> Result<&dyn JweContentEncryption, JoseError> {
        match self.get_content_encryption(name) {
            Some(val) => Ok(val),
            None => Err(JoseError::UnsupportedAlgorithm(format!(
                "The content encryption is not registered: {}",
                name
            ))),
        }
    }

    fn check_encrypt_options(
        &self,
        sets: &[JweHeaderSet],
        cencryption: &dyn JweContentEncryption,
        options: &EncryptOptions,
    ) -> Result<(), JoseError> {
        for set in sets {
            let alg = set.key_management();
            let mode = alg.mode();
            if options.cek.is_some() && !mode.accepts_cek() {
                return Err(JoseError::InvalidOptions(anyhow!(
                    "A content encryption key cannot be supplied in {} mode ({}).",
                    mode,
                    alg
                )));
            }
            if options.ephemeral_key.is_some()
                && !matches!(
                    mode,
                    KeyManagementMode::DirectKeyAgreement
                        | KeyManagementMode::KeyAgreementWithKeyWrapping
                )
            {
                return Err(JoseError::InvalidOptions(anyhow!(
                    "An ephemeral key cannot be supplied in {} mode ({}).",
                    mode,
                    alg
                )));
            }
            if let KeyManagementAlgorithm::KeyWrapping(KeyWrappingAlgorithm::Aesgcmkw(_)) = alg {
                if set.effective().contains("iv") && !options.fixed_key_wrap_iv {
                    return Err(JoseError::InvalidOptions(anyhow!(
                        "The iv header claim of {} requires the fixed key wrap iv option.",
                        alg
                    )));
                }
            }
        }

        if let Some(cek) = &options.cek {
            if cek.len() < cencryption.key_len() {
                return Err(JoseError::InsufficientKeyLength(anyhow!(
                    "The content encryption key must be {} bytes: {}",
                    cencryption.key_len(),
                    cek.len()
                )));
            }
            if cek.len() != cencryption.key_len() {
                return Err(JoseError::InvalidKeyFormat(anyhow!(
                    "The content encryption key must be {} bytes: {}",
                    cencryption.key_len(),
                    cek.len()
                )));
            }
        }
        Ok(())
    }

    /// Return the effective header handed to the key management algorithm,
    /// with PBES2 parameters filled in from the context settings.
    async fn prepare_effective_header(&self, set: &JweHeaderSet) -> Result<JweHeader, JoseError> {
        let mut effective = set.effective().clone();
        if let KeyManagementAlgorithm::KeyWrapping(KeyWrappingAlgorithm::Pbes2HmacAeskw(_)) =
            set.key_management()
        {
            if !effective.contains("p2s") {
                let p2s = self
                    .provider
                    .random_bytes(self.pbes2_salt_len)
                    .await
                    .map_err(JoseError::CryptoFailure)?;
                effective.set_pbes2_salt_input(p2s);
            }
            if !effective.contains("p2c") {
                effective.set_pbes2_count(self.pbes2_default_iterations);
            }
        }
        Ok(effective)
    }

    fn select_key<'a>(
        &self,
        keys: &'a JwkSet,
        set: &JweHeaderSet,
        decrypting: bool,
    ) -> Result<&'a Jwk, JoseError> {
        let candidates = self.candidate_keys(keys, set, decrypting);
        match candidates.as_slice() {
            [val] => Ok(*val),
            [] => Err(JoseError::NoMatchingKey(anyhow!(
                "No {} key matches {}{}.",
                set.key_management().key_type(),
                set.key_management(),
                match set.effective().key_id() {
                    Some(kid) => format!(" with kid {}", kid),
                    None => String::new(),
                }
            ))),
            vals => Err(JoseError::AmbiguousKey(anyhow!(
                "{} keys match {}; set a kid header claim.",
                vals.len(),
                set.key_management()
            ))),
        }
    }

    fn candidate_keys<'a>(
        &self,
        keys: &'a JwkSet,
        set: &JweHeaderSet,
        decrypting: bool,
    ) -> Vec<&'a Jwk> {
        let alg = set.key_management();
        keys.find(alg.key_type(), set.effective().key_id())
            .into_iter()
            .filter(|jwk| is_usable_key(jwk, alg, decrypting))
            .collect()
    }

    async fn establish_cek(
        &self,
        alg: KeyManagementAlgorithm,
        jwk: &Jwk,
        header: &JweHeader,
        cek: Option<&Cek>,
        cek_len: usize,
        options: &EncryptOptions,
    ) -> Result<(Cek, Option<EncryptedKey>, HeaderUpdates), JoseError> {
        let provider = self.provider();
        let ephemeral_key = options.ephemeral_key.as_ref();

        match alg {
            KeyManagementAlgorithm::KeyEncryption(alg) => {
                let cek = required_cek(cek)?;
                let key = RsaPublicKey::from_jwk(jwk)?;
                let encrypted_key = alg.encrypt_key(provider, &key, cek).await?;
                Ok((cek.clone(), Some(encrypted_key), HeaderUpdates::new()))
            }
            KeyManagementAlgorithm::KeyWrapping(alg) => {
                let cek = required_cek(cek)?;
                let key = Zeroizing::new(jwk.octets()?);
                let (encrypted_key, updates) = match alg {
                    KeyWrappingAlgorithm::Aesgcmkw(gcmkw) if options.fixed_key_wrap_iv => {
                        gcmkw.wrap_with_fixed_iv(provider, &key, cek, header).await?
                    }
                    _ => alg.wrap(provider, &key, cek, header).await?,
                };
                Ok((cek.clone(), Some(encrypted_key), updates))
            }
            KeyManagementAlgorithm::DirectKeyAgreement(alg) => {
                let key = EcPublicKey::from_jwk(jwk)?;
                let (cek, updates) = alg
                    .party_u(provider, &key, ephemeral_key, header, cek_len)
                    .await?;
                Ok((cek, None, updates))
            }
            KeyManagementAlgorithm::KeyAgreementWithKeyWrapping(alg) => {
                let cek = required_cek(cek)?;
                let key = EcPublicKey::from_jwk(jwk)?;
                let (encrypted_key, updates) = alg
                    .wrap(provider, &key, ephemeral_key, cek, header)
                    .await?;
                Ok((cek.clone(), Some(encrypted_key), updates))
            }
            KeyManagementAlgorithm::DirectEncryption(alg) => {
                let key = Zeroizing::new(jwk.octets()?);
                let cek = alg.extract_cek(&key, cek_len)?;
                Ok((cek, None, HeaderUpdates::new()))
            }
        }
    }

    async fn recover_cek(
        &self,
        alg: KeyManagementAlgorithm,
        jwk: &Jwk,
        header: &JweHeader,
        encrypted_key: Option<&EncryptedKey>,
        cek_len: usize,
    ) -> Result<Cek, JoseError> {
        let provider = self.provider();
        let empty = EncryptedKey::default();
        let encrypted_key = encrypted_key.unwrap_or(&empty);

        match alg {
            KeyManagementAlgorithm::KeyEncryption(alg) => {
                let key = RsaPrivateKey::from_jwk(jwk)?;
                alg.decrypt_key(provider, &key, encrypted_key, cek_len).await
            }
            KeyManagementAlgorithm::KeyWrapping(alg) => {
                let key = Zeroizing::new(jwk.octets()?);
                alg.unwrap(provider, &key, encrypted_key, header).await
            }
            KeyManagementAlgorithm::DirectKeyAgreement(alg) => {
                let key = EcPrivateKey::from_jwk(jwk)?;
                alg.party_v(provider, &key, header, cek_len).await
            }
            KeyManagementAlgorithm::KeyAgreementWithKeyWrapping(alg) => {
                let key = EcPrivateKey::from_jwk(jwk)?;
                alg.unwrap(provider, &key, encrypted_key, header).await
            }
            KeyManagementAlgorithm::DirectEncryption(alg) => {
                let key = Zeroizing::new(jwk.octets()?);
                alg.extract_cek(&key, cek_len)
            }
        }
    }
}

impl Default for JweContext {
    fn default() -> Self {
        Self::new(Arc::new(OpensslProvider::new()))
    }
}

/// Return the key_ops value a key needs for a key management mode.
fn key_operation(mode: KeyManagementMode, decrypting: bool) -> &'static str {
    match (mode, decrypting) {
        (KeyManagementMode::KeyEncryption | KeyManagementMode::KeyWrapping, false) => "wrapKey",
        (KeyManagementMode::KeyEncryption | KeyManagementMode::KeyWrapping, true) => "unwrapKey",
        (
            KeyManagementMode::DirectKeyAgreement | KeyManagementMode::KeyAgreementWithKeyWrapping,
            _,
        ) => "deriveKey",
        (KeyManagementMode::DirectEncryption, false) => "encrypt",
        (KeyManagementMode::DirectEncryption, true) => "decrypt",
    }
}

fn is_usable_key(jwk: &Jwk, alg: KeyManagementAlgorithm, decrypting: bool) -> bool {
    if let Some(val) = jwk.algorithm() {
        if val != alg.name() {
            return false;
        }
    }
    if let Some(val) = jwk.key_use() {
        if val != "enc" {
            return false;
        }
    }
    if !jwk.is_for_key_operation(key_operation(alg.mode(), decrypting)) {
        return false;
    }

    match (alg.mode(), decrypting) {
        (KeyManagementMode::KeyEncryption, false) => RsaPublicKey::from_jwk(jwk).is_ok(),
        (KeyManagementMode::KeyEncryption, true) => RsaPrivateKey::from_jwk(jwk).is_ok(),
        (KeyManagementMode::KeyWrapping | KeyManagementMode::DirectEncryption, _) => {
            jwk.octets().is_ok()
        }
        (
            KeyManagementMode::DirectKeyAgreement | KeyManagementMode::KeyAgreementWithKeyWrapping,
            false,
        ) => EcPublicKey::from_jwk(jwk).is_ok(),
        (
            KeyManagementMode::DirectKeyAgreement | KeyManagementMode::KeyAgreementWithKeyWrapping,
            true,
        ) => EcPrivateKey::from_jwk(jwk).is_ok(),
    }
}

/// Merge key management header updates into the fragment that receives them.
///
/// A claim that already has the same value anywhere in the recipient's header is
/// left alone; a different value is an error.
fn apply_updates(
    target: &mut JweHeader,
    effective: &JweHeader,
    updates: HeaderUpdates,
) -> Result<(), JoseError> {
    for (key, value) in updates {
        match effective.claim(&key) {
            Some(existing) if *existing == value => continue,
            Some(_) => {
                return Err(JoseError::MalformedHeader(anyhow!(
                    "The {} header claim conflicts with the key management result.",
                    key
                )))
            }
            None => target.set_claim(&key, Some(value))?,
        }
    }
    Ok(())
}

fn required_cek(cek: Option<&Cek>) -> Result<&Cek, JoseError> {
    cek.ok_or_else(|| JoseError::InvalidOptions(anyhow!("A content encryption key is required.")))
}

fn into_decryption_failure(err: JoseError) -> JoseError {
    if err.is_integrity_failure() {
        JoseError::DecryptionFailed
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::Value;

    use super::*;
    use crate::jwe::{Ciphertext, SerializationFormat, Tag};
    use crate::jwk::EcCurve;

    const ALGORITHMS: [&str; 17] = [
        "RSA1_5",
        "RSA-OAEP",
        "RSA-OAEP-256",
        "A128KW",
        "A192KW",
        "A256KW",
        "A128GCMKW",
        "A192GCMKW",
        "A256GCMKW",
        "PBES2-HS256+A128KW",
        "PBES2-HS384+A192KW",
        "PBES2-HS512+A256KW",
        "ECDH-ES",
        "ECDH-ES+A128KW",
        "ECDH-ES+A192KW",
        "ECDH-ES+A256KW",
        "dir",
    ];

    const ENCRYPTIONS: [&str; 6] = [
        "A128CBC-HS256",
        "A192CBC-HS384",
        "A256CBC-HS512",
        "A128GCM",
        "A192GCM",
        "A256GCM",
    ];

    fn octet_key(len: usize, kid: Option<&str>) -> Jwk {
        let mut jwk = Jwk::from_octets((0..len).map(|i| i as u8).collect::<Vec<u8>>());
        if let Some(val) = kid {
            jwk.set_key_id(val);
        }
        jwk
    }

    fn key_set(keys: Vec<Jwk>) -> JwkSet {
        keys.into_iter().collect()
    }

    /// Return a private key set for an algorithm and enc pair.
    async fn private_keys(context: &JweContext, alg: &str, enc: &str) -> Result<JwkSet> {
        let key_management = KeyManagementAlgorithm::from_name(alg)?;
        let jwk = match key_management {
            KeyManagementAlgorithm::KeyEncryption(_) => {
                context.provider().generate_rsa_key(2048).await?.to_jwk()
            }
            KeyManagementAlgorithm::KeyWrapping(KeyWrappingAlgorithm::Aeskw(alg)) => {
                octet_key(alg.key_len(), None)
            }
            KeyManagementAlgorithm::KeyWrapping(KeyWrappingAlgorithm::Aesgcmkw(alg)) => {
                octet_key(alg.key_len(), None)
            }
            KeyManagementAlgorithm::KeyWrapping(KeyWrappingAlgorithm::Pbes2HmacAeskw(_)) => {
                Jwk::from_octets(b"correct horse battery staple")
            }
            KeyManagementAlgorithm::DirectKeyAgreement(_)
            | KeyManagementAlgorithm::KeyAgreementWithKeyWrapping(_) => {
                context.provider().generate_ec_key(EcCurve::P384).await?.to_jwk()
            }
            KeyManagementAlgorithm::DirectEncryption(_) => {
                let key_len = match context.get_content_encryption(enc) {
                    Some(val) => val.key_len(),
                    None => unreachable!(),
                };
                octet_key(key_len, None)
            }
        };
        Ok(key_set(vec![jwk]))
    }

    fn public_keys(keys: &JwkSet) -> Result<JwkSet> {
        let mut vec = Vec::new();
        for jwk in keys.keys() {
            let public = match jwk.key_type() {
                "RSA" => RsaPrivateKey::from_jwk(jwk)?.to_public_key().to_jwk(),
                "EC" => EcPrivateKey::from_jwk(jwk)?.to_public_key().to_jwk(),
                _ => jwk.clone(),
            };
            vec.push(public);
        }
        Ok(key_set(vec))
    }

    fn header(alg: &str, enc: &str) -> JweHeader {
        let mut header = JweHeader::new();
        header.set_algorithm(alg);
        header.set_content_encryption(enc);
        header
    }

    #[tokio::test]
    async fn encrypt_and_decrypt_every_algorithm() -> Result<()> {
        let context = JweContext::default();
        let mut rsa_cache: Option<JwkSet> = None;

        for alg in ALGORITHMS {
            for enc in ENCRYPTIONS {
                let private = if alg.starts_with("RSA") {
                    if rsa_cache.is_none() {
                        rsa_cache = Some(private_keys(&context, alg, enc).await?);
                    }
                    rsa_cache.clone().unwrap_or_default()
                } else {
                    private_keys(&context, alg, enc).await?
                };
                let public = public_keys(&private)?;

                let payload = format!("payload for {} and {}", alg, enc);
                let message = context
                    .encrypt(
                        &public,
                        payload.as_bytes(),
                        &JweHeaders::protected(header(alg, enc)),
                        None,
                        None,
                        &EncryptOptions::default(),
                    )
                    .await?;

                for format in [
                    SerializationFormat::Compact,
                    SerializationFormat::Json,
                    SerializationFormat::FlattenedJson,
                ] {
                    let serialized = message.serialize(format)?;
                    let parsed = JweMessage::deserialize(&serialized)?;
                    assert_eq!(parsed, message);

                    let decrypted = context.decrypt(&parsed, &private).await?;
                    assert_eq!(decrypted, payload.as_bytes(), "{} {}", alg, enc);
                }
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn tampering_is_detected() -> Result<()> {
        let context = JweContext::default();
        let keys = key_set(vec![octet_key(16, None)]);
        let message = context
            .encrypt(
                &keys,
                b"attack at dawn",
                &JweHeaders::protected(header("A128KW", "A128CBC-HS256")),
                None,
                Some(b"context"),
                &EncryptOptions::default(),
            )
            .await?;
        assert_eq!(context.decrypt(&message, &keys).await?, b"attack at dawn");

        let flip = |bytes: &[u8]| -> Vec<u8> {
            let mut vec = bytes.to_vec();
            vec[0] ^= 0x01;
            vec
        };
        let rebuild = |protected: Option<(JweHeader, String)>,
                       aad: Option<Vec<u8>>,
                       iv: Iv,
                       ciphertext: Ciphertext,
                       tag: Tag| {
            JweMessage::new(
                protected,
                message.unprotected().cloned(),
                aad,
                iv,
                ciphertext,
                tag,
                message.recipients().to_vec(),
            )
        };
        let original_protected = message
            .protected()
            .map(|val| (val.clone(), message.encoded_protected().to_string()));
        let original_aad = message.aad().map(|val| val.to_vec());

        let tampered = [
            rebuild(
                original_protected.clone(),
                original_aad.clone(),
                message.iv().clone(),
                Ciphertext::new(flip(message.ciphertext().as_ref())),
                message.tag().clone(),
            ),
            rebuild(
                original_protected.clone(),
                original_aad.clone(),
                message.iv().clone(),
                message.ciphertext().clone(),
                Tag::new(flip(message.tag().as_ref())),
            ),
            rebuild(
                original_protected.clone(),
                original_aad.clone(),
                Iv::new(flip(message.iv().as_ref())),
                message.ciphertext().clone(),
                message.tag().clone(),
            ),
            rebuild(
                original_protected.clone(),
                Some(b"contexu".to_vec()),
                message.iv().clone(),
                message.ciphertext().clone(),
                message.tag().clone(),
            ),
            {
                let mut protected = header("A128KW", "A128CBC-HS256");
                protected.set_content_type("text/plain");
                let json = serde_json::to_vec(protected.claims_set())?;
                let b64 = util::encode_base64_urlsafe_nopad(json);
                rebuild(
                    Some((protected, b64)),
                    original_aad.clone(),
                    message.iv().clone(),
                    message.ciphertext().clone(),
                    message.tag().clone(),
                )
            },
        ];

        for message in tampered {
            assert!(matches!(
                context.decrypt(&message, &keys).await,
                Err(JoseError::DecryptionFailed)
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn multiple_recipients_share_one_cek() -> Result<()> {
        let context = JweContext::default();
        let keys = key_set(vec![octet_key(16, Some("a")), octet_key(32, Some("b"))]);

        let mut recipient_a = JweHeader::new();
        recipient_a.set_algorithm("A128KW");
        recipient_a.set_key_id("a");
        let mut recipient_b = JweHeader::new();
        recipient_b.set_algorithm("A256GCMKW");
        recipient_b.set_key_id("b");

        let mut protected = JweHeader::new();
        protected.set_content_encryption("A256GCM");
        let headers = JweHeaders {
            protected: Some(protected),
            unprotected: None,
            recipients: vec![Some(recipient_a), Some(recipient_b)],
        };

        let message = context
            .encrypt(&keys, b"shared", &headers, None, None, &EncryptOptions::default())
            .await?;
        assert_eq!(message.recipients().len(), 2);
        assert!(message.recipients()[1]
            .header()
            .map_or(false, |val| val.contains("iv") && val.contains("tag")));

        assert!(matches!(
            message.serialize(SerializationFormat::Compact),
            Err(JoseError::SerializationFormatError(_))
        ));
        let json = message.serialize(SerializationFormat::Json)?;
        let parsed = JweMessage::deserialize(&json)?;

        for kid in ["a", "b"] {
            let only: JwkSet = keys
                .get(kid)
                .into_iter()
                .cloned()
                .collect();
            assert_eq!(context.decrypt(&parsed, &only).await?, b"shared");
        }

        assert!(matches!(
            context.decrypt(&parsed, &keys).await,
            Err(JoseError::AmbiguousRecipient(2))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn rsa_oaep_compact_and_wrong_key() -> Result<()> {
        let context = JweContext::default();
        let private = key_set(vec![context.provider().generate_rsa_key(2048).await?.to_jwk()]);
        let public = public_keys(&private)?;

        let message = context
            .encrypt(
                &public,
                b"secret",
                &JweHeaders::protected(header("RSA-OAEP", "A128GCM")),
                None,
                None,
                &EncryptOptions::default(),
            )
            .await?;
        let compact = message.serialize(SerializationFormat::Compact)?;
        assert_eq!(compact.split('.').count(), 5);

        let parsed = JweMessage::deserialize(&compact)?;
        assert_eq!(context.decrypt(&parsed, &private).await?, b"secret");

        let other = key_set(vec![context.provider().generate_rsa_key(2048).await?.to_jwk()]);
        assert!(matches!(
            context.decrypt(&parsed, &other).await,
            Err(JoseError::DecryptionFailed)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn reject_short_rsa_keys() -> Result<()> {
        let context = JweContext::default();
        let private = key_set(vec![context.provider().generate_rsa_key(1024).await?.to_jwk()]);
        let public = public_keys(&private)?;

        assert!(matches!(
            context
                .encrypt(
                    &public,
                    b"secret",
                    &JweHeaders::protected(header("RSA-OAEP", "A128GCM")),
                    None,
                    None,
                    &EncryptOptions::default(),
                )
                .await,
            Err(JoseError::InsufficientKeyLength(_))
        ));

        let compact = format!(
            "{}.{}.{}.{}.{}",
            util::encode_base64_urlsafe_nopad(header("RSA-OAEP", "A128GCM").to_string()),
            util::encode_base64_urlsafe_nopad(vec![0; 128]),
            util::encode_base64_urlsafe_nopad(vec![0; 12]),
            util::encode_base64_urlsafe_nopad(b"data"),
            util::encode_base64_urlsafe_nopad(vec![0; 16]),
        );
        let message = JweMessage::deserialize(&compact)?;
        assert!(matches!(
            context.decrypt(&message, &private).await,
            Err(JoseError::InsufficientKeyLength(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn caller_cek_is_rejected_for_direct_modes() -> Result<()> {
        let context = JweContext::default();
        let options = EncryptOptions {
            cek: Some(Cek::new(vec![0; 16])),
            ..Default::default()
        };

        let ec_key = context.provider().generate_ec_key(EcCurve::P256).await?;
        let ec = key_set(vec![ec_key.to_jwk()]);
        assert!(matches!(
            context
                .encrypt(
                    &public_keys(&ec)?,
                    b"data",
                    &JweHeaders::protected(header("ECDH-ES", "A128GCM")),
                    None,
                    None,
                    &options,
                )
                .await,
            Err(JoseError::InvalidOptions(_))
        ));

        let oct = key_set(vec![octet_key(16, None)]);
        assert!(matches!(
            context
                .encrypt(
                    &oct,
                    b"data",
                    &JweHeaders::protected(header("dir", "A128GCM")),
                    None,
                    None,
                    &options,
                )
                .await,
            Err(JoseError::InvalidOptions(_))
        ));

        let ephemeral = EncryptOptions {
            ephemeral_key: Some(context.provider().generate_ec_key(EcCurve::P256).await?),
            ..Default::default()
        };
        assert!(matches!(
            context
                .encrypt(
                    &oct,
                    b"data",
                    &JweHeaders::protected(header("A128KW", "A128GCM")),
                    None,
                    None,
                    &ephemeral,
                )
                .await,
            Err(JoseError::InvalidOptions(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn caller_cek_is_used_for_key_wrapping() -> Result<()> {
        let context = JweContext::default();
        let keys = key_set(vec![octet_key(16, None)]);
        let cek = Cek::new(vec![7; 32]);
        let iv = Iv::new(vec![1; 12]);
        let options = EncryptOptions {
            cek: Some(cek.clone()),
            ..Default::default()
        };
        let headers = JweHeaders::protected(header("A128KW", "A256GCM"));

        let first = context
            .encrypt(&keys, b"data", &headers, Some(&iv), None, &options)
            .await?;
        let second = context
            .encrypt(&keys, b"data", &headers, Some(&iv), None, &options)
            .await?;
        assert_eq!(first, second);

        let dir = key_set(vec![Jwk::from_octets(cek.as_ref())]);
        let direct = context
            .encrypt(
                &dir,
                b"data",
                &JweHeaders::protected(header("dir", "A256GCM")),
                Some(&iv),
                None,
                &EncryptOptions::default(),
            )
            .await?;
        assert_eq!(direct.ciphertext(), first.ciphertext());
        Ok(())
    }

    #[tokio::test]
    async fn gcmkw_fixed_iv_requires_option() -> Result<()> {
        let context = JweContext::default();
        let keys = key_set(vec![octet_key(16, None)]);

        let mut protected = header("A128GCMKW", "A128GCM");
        protected.set_initialization_vector(vec![9; 12]);
        let headers = JweHeaders::protected(protected);

        assert!(matches!(
            context
                .encrypt(&keys, b"data", &headers, None, None, &EncryptOptions::default())
                .await,
            Err(JoseError::InvalidOptions(_))
        ));

        let options = EncryptOptions {
            fixed_key_wrap_iv: true,
            ..Default::default()
        };
        let message = context
            .encrypt(&keys, b"data", &headers, None, None, &options)
            .await?;
        assert_eq!(
            message.protected().and_then(|val| val.initialization_vector()),
            Some(vec![9; 12])
        );
        assert!(message
            .protected()
            .map_or(false, |val| val.contains("tag")));
        assert_eq!(context.decrypt(&message, &keys).await?, b"data");
        Ok(())
    }

    #[tokio::test]
    async fn key_selection() -> Result<()> {
        let context = JweContext::default();
        let headers = JweHeaders::protected(header("A128KW", "A128GCM"));

        assert!(matches!(
            context
                .encrypt(&JwkSet::new(), b"data", &headers, None, None, &EncryptOptions::default())
                .await,
            Err(JoseError::NoMatchingKey(_))
        ));

        let two = key_set(vec![octet_key(16, Some("x")), octet_key(16, Some("y"))]);
        assert!(matches!(
            context
                .encrypt(&two, b"data", &headers, None, None, &EncryptOptions::default())
                .await,
            Err(JoseError::AmbiguousKey(_))
        ));

        let mut with_kid = header("A128KW", "A128GCM");
        with_kid.set_key_id("y");
        let message = context
            .encrypt(
                &two,
                b"data",
                &JweHeaders::protected(with_kid),
                None,
                None,
                &EncryptOptions::default(),
            )
            .await?;
        assert_eq!(context.decrypt(&message, &two).await?, b"data");

        let mut restricted = octet_key(16, None);
        restricted.set_algorithm("A256KW");
        assert!(matches!(
            context
                .encrypt(
                    &key_set(vec![restricted]),
                    b"data",
                    &headers,
                    None,
                    None,
                    &EncryptOptions::default()
                )
                .await,
            Err(JoseError::NoMatchingKey(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_sibling_algorithm_is_skipped() -> Result<()> {
        let context = JweContext::default();
        let keys = key_set(vec![octet_key(16, Some("a")), octet_key(32, Some("z"))]);

        let mut recipient_z = JweHeader::new();
        recipient_z.set_algorithm("A256KW");
        recipient_z.set_key_id("z");
        let mut recipient_a = JweHeader::new();
        recipient_a.set_algorithm("A128KW");
        recipient_a.set_key_id("a");

        let mut protected = JweHeader::new();
        protected.set_content_encryption("A128GCM");
        let headers = JweHeaders {
            protected: Some(protected),
            unprotected: None,
            recipients: vec![Some(recipient_z), Some(recipient_a)],
        };
        let message = context
            .encrypt(&keys, b"for a", &headers, None, None, &EncryptOptions::default())
            .await?;

        let serialized = message.serialize(SerializationFormat::Json)?;
        let mut json: Value = serde_json::from_str(&serialized)?;
        json["recipients"][0]["header"]["alg"] = Value::from("RSA-OAEP-384");
        let parsed = JweMessage::deserialize(&json.to_string())?;

        let only_a: JwkSet = keys.get("a").into_iter().cloned().collect();
        assert_eq!(context.decrypt(&parsed, &only_a).await?, b"for a");

        let recipients = json["recipients"].as_array().cloned().unwrap_or_default();
        json["recipients"] = Value::Array(recipients.into_iter().take(1).collect());
        let single = JweMessage::deserialize(&json.to_string())?;
        assert!(matches!(
            context.decrypt(&single, &only_a).await,
            Err(JoseError::UnsupportedAlgorithm(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn diverging_ceks_are_rejected() -> Result<()> {
        let context = JweContext::default();
        let mut protected = JweHeader::new();
        protected.set_content_encryption("A128GCM");

        let keys = key_set(vec![octet_key(16, Some("a")), octet_key(16, Some("b"))]);
        let mut wrapped = JweHeader::new();
        wrapped.set_algorithm("A128KW");
        wrapped.set_key_id("a");
        let mut direct = JweHeader::new();
        direct.set_algorithm("dir");
        direct.set_key_id("b");
        let headers = JweHeaders {
            protected: Some(protected.clone()),
            unprotected: None,
            recipients: vec![Some(wrapped), Some(direct)],
        };
        assert!(matches!(
            context
                .encrypt(&keys, b"data", &headers, None, None, &EncryptOptions::default())
                .await,
            Err(JoseError::InconsistentCek)
        ));

        let mut ec_keys = Vec::new();
        let mut recipients = Vec::new();
        for kid in ["a", "b"] {
            let mut jwk = context
                .provider()
                .generate_ec_key(EcCurve::P256)
                .await?
                .to_public_key()
                .to_jwk();
            jwk.set_key_id(kid);
            ec_keys.push(jwk);

            let mut recipient = JweHeader::new();
            recipient.set_algorithm("ECDH-ES");
            recipient.set_key_id(kid);
            recipients.push(Some(recipient));
        }
        let headers = JweHeaders {
            protected: Some(protected),
            unprotected: None,
            recipients,
        };
        assert!(matches!(
            context
                .encrypt(
                    &key_set(ec_keys),
                    b"data",
                    &headers,
                    None,
                    None,
                    &EncryptOptions::default()
                )
                .await,
            Err(JoseError::InconsistentCek)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn critical_names_must_be_acceptable() -> Result<()> {
        let mut context = JweContext::default();
        let keys = key_set(vec![octet_key(16, None)]);

        let mut protected = header("A128KW", "A128GCM");
        protected.set_claim("exp", Some(Value::from(1)))?;
        protected.set_critical(vec!["exp"]);
        let message = context
            .encrypt(
                &keys,
                b"data",
                &JweHeaders::protected(protected),
                None,
                None,
                &EncryptOptions::default(),
            )
            .await?;

        assert!(matches!(
            context.decrypt(&message, &keys).await,
            Err(JoseError::MalformedHeader(_))
        ));

        context.add_acceptable_critical("exp");
        assert_eq!(context.decrypt(&message, &keys).await?, b"data");
        Ok(())
    }

    #[tokio::test]
    async fn pbes2_settings_apply() -> Result<()> {
        let mut context = JweContext::default();
        context.set_pbes2_salt_len(32);
        context.set_pbes2_default_iterations(2000);
        let keys = key_set(vec![Jwk::from_octets(b"password")]);

        let message = context
            .encrypt(
                &keys,
                b"data",
                &JweHeaders::protected(header("PBES2-HS256+A128KW", "A128GCM")),
                None,
                None,
                &EncryptOptions::default(),
            )
            .await?;
        let protected = message.protected().cloned().unwrap_or_default();
        assert_eq!(protected.pbes2_salt_input().map(|v| v.len()), Some(32));
        assert_eq!(protected.pbes2_count(), Some(2000));
        assert_eq!(context.decrypt(&message, &keys).await?, b"data");

        context.set_pbes2_max_iterations(1000);
        assert!(matches!(
            context.decrypt(&message, &keys).await,
            Err(JoseError::MalformedHeader(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn conflicting_header_update_is_rejected() -> Result<()> {
        let context = JweContext::default();
        let private_key = context.provider().generate_ec_key(EcCurve::P256).await?;
        let private = key_set(vec![private_key.to_jwk()]);
        let public = public_keys(&private)?;

        let ephemeral = context.provider().generate_ec_key(EcCurve::P256).await?;
        let options = EncryptOptions {
            ephemeral_key: Some(ephemeral.clone()),
            ..Default::default()
        };

        let mut protected = header("ECDH-ES", "A128GCM");
        protected.set_ephemeral_public_key(ephemeral.public_key().to_jwk());
        let message = context
            .encrypt(
                &public,
                b"data",
                &JweHeaders::protected(protected),
                None,
                None,
                &options,
            )
            .await?;
        assert_eq!(context.decrypt(&message, &private).await?, b"data");

        let other = context.provider().generate_ec_key(EcCurve::P256).await?;
        let mut protected = header("ECDH-ES", "A128GCM");
        protected.set_ephemeral_public_key(other.public_key().to_jwk());
        assert!(context
            .encrypt(
                &public,
                b"data",
                &JweHeaders::protected(protected),
                None,
                None,
                &options,
            )
            .await
            .is_err());
        Ok(())
    }
}
