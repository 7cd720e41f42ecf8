//! Customer store lifecycle: load, save, encryption changes and wipe.
//!
//! The customer list is rewritten whole on every save. Which representation
//! gets written depends on the secret and on what is already on disk:
//!
//! | records | secret | on disk   | result                              |
//! |---------|--------|-----------|-------------------------------------|
//! | empty   | any    | encrypted | refused, nothing written            |
//! | any     | yes    | any       | encrypted payload + id set          |
//! | any     | no     | encrypted | id set only, payload untouched      |
//! | any     | no     | otherwise | plaintext list                      |
//!
//! Encrypted data only goes back to plaintext through
//! [`CustomerStore::disable_encryption`].

use std::collections::BTreeSet;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::crypto::Secret;
use crate::error::{Result, StoreError};
use crate::storage::codec::{ensure_unique_ids, EncodedCustomers, SplitCodec};
use crate::storage::document::{Document, DocumentStore};
use crate::storage::migration::{self, MigrationOutcome};
use crate::storage::types::{
    Customer, IdentifierSet, LoadedCustomers, RefusalReason, Representation, SaveOutcome,
};
use crate::storage::wipe::{BackoffPolicy, FileOps, FixedBackoff, TokioFileOps, WipeReport, Wiper};

/// Plaintext customer list.
pub const CUSTOMERS_KEY: &str = "customers";
/// Encrypted, id-less customer payload.
pub const ENCRYPTED_KEY: &str = "customers_encrypted";
/// Plaintext identifier set for the encrypted payload.
pub const IDS_KEY: &str = "customer_ids";

/// Every key that belongs to the customer collection.
pub(crate) const CUSTOMER_KEYS: [&str; 3] = [CUSTOMERS_KEY, ENCRYPTED_KEY, IDS_KEY];

pub(crate) fn representation_of(doc: &Document) -> Representation {
    if doc.contains(ENCRYPTED_KEY) {
        Representation::Encrypted
    } else if doc.contains(CUSTOMERS_KEY) {
        Representation::Plaintext
    } else {
        Representation::Empty
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

fn cipher_task_error(err: tokio::task::JoinError) -> StoreError {
    StoreError::Crypto(format!("Cipher task failed: {}", err))
}

/// Apply a secret-less save to the identifier set.
///
/// Removed ids become tombstones so later payload positions do not shift.
/// New ids can only be appended after the highest existing key.
fn update_ids(existing: &IdentifierSet, records: &[Customer]) -> Result<IdentifierSet> {
    let wanted: BTreeSet<u64> = records.iter().map(|customer| customer.id).collect();
    let highest = existing.max_key();
    let mut updated = existing.clone();

    for (id, live) in existing.slots() {
        if live && !wanted.contains(&id) {
            updated.insert(id, false);
        }
    }

    for id in wanted {
        if existing.contains_key(id) {
            if !existing.is_live(id) {
                updated.insert(id, true);
            }
            continue;
        }
        if let Some(highest) = highest {
            if id < highest {
                return Err(StoreError::SecretRequired(format!(
                    "Customer id {} sorts before existing ids; unlock the store to add it",
                    id
                )));
            }
        }
        updated.insert(id, true);
    }

    Ok(updated)
}

/// Persistent customer record store.
pub struct CustomerStore {
    docs: Arc<DocumentStore>,
    codec: SplitCodec,
    config: StoreConfig,
}

impl CustomerStore {
    /// Store over `config.data_dir` using Age encryption.
    pub fn new(config: StoreConfig) -> Self {
        let docs = Arc::new(DocumentStore::new(config.data_dir.clone()));
        Self::with_parts(docs, SplitCodec::default(), config)
    }

    /// Store sharing an existing document context and codec.
    pub fn with_parts(docs: Arc<DocumentStore>, codec: SplitCodec, config: StoreConfig) -> Self {
        Self {
            docs,
            codec,
            config,
        }
    }

    pub fn documents(&self) -> &Arc<DocumentStore> {
        &self.docs
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn customer_file(&self) -> &str {
        &self.config.files.customers
    }

    pub(crate) fn data_file(&self) -> &str {
        &self.config.files.data
    }

    pub(crate) async fn encode_blocking(
        &self,
        records: Vec<Customer>,
        secret: &SecretString,
    ) -> Result<EncodedCustomers> {
        let codec = self.codec.clone();
        let secret = copy_secret(secret);
        tokio::task::spawn_blocking(move || codec.encode(&records, &secret))
            .await
            .map_err(cipher_task_error)?
    }

    pub(crate) async fn decode_blocking(
        &self,
        payload: String,
        ids: Option<IdentifierSet>,
        secret: &SecretString,
    ) -> Result<Vec<Customer>> {
        let codec = self.codec.clone();
        let secret = copy_secret(secret);
        tokio::task::spawn_blocking(move || codec.decode(&payload, ids.as_ref(), &secret))
            .await
            .map_err(cipher_task_error)?
    }

    /// Current on-disk representation of the customer collection.
    pub async fn representation(&self) -> Result<Representation> {
        match self.docs.open(self.customer_file()).await {
            Ok(handle) => Ok(representation_of(&*handle.lock().await)),
            Err(StoreError::StoreNotFound(_)) => Ok(Representation::Empty),
            Err(err) => Err(err),
        }
    }

    /// Load the customer list.
    ///
    /// A missing customer file triggers the legacy migration first.
    ///
    /// # Arguments
    ///
    /// * `secret` - The encryption secret, or `Secret::NoSecret`
    ///
    /// # Returns
    ///
    /// Returns [`LoadedCustomers::Unlocked`] with full records for plaintext
    /// data or a correct secret. Encrypted data read without a secret yields
    /// [`LoadedCustomers::Locked`] with one placeholder per known id.
    /// Filesystem failures degrade to an empty unlocked list.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DecryptionFailed` for a wrong secret; it is never
    /// turned into an empty list. Returns `StoreError::Corrupted` for a
    /// damaged customer file.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use quotedesk_store::{CustomerStore, Secret, StoreConfig};
    ///
    /// # async fn run() -> quotedesk_store::Result<()> {
    /// let store = CustomerStore::new(StoreConfig::new("/tmp/quotedesk"));
    ///
    /// let loaded = store.load(&Secret::NoSecret).await?;
    /// if loaded.is_locked() {
    ///     println!("{} customers, locked", loaded.len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load(&self, secret: &Secret) -> Result<LoadedCustomers> {
        match self.load_inner(secret).await {
            Err(err) if err.is_io() => {
                warn!(error = %err, "customer load failed, treating as empty");
                Ok(LoadedCustomers::Unlocked(Vec::new()))
            }
            other => other,
        }
    }

    /// Load the full customer list, refusing the degraded view.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SecretRequired` if the data is encrypted and no
    /// secret was supplied.
    pub async fn load_full(&self, secret: &Secret) -> Result<Vec<Customer>> {
        match self.load(secret).await? {
            LoadedCustomers::Unlocked(records) => Ok(records),
            LoadedCustomers::Locked(_) => Err(StoreError::SecretRequired(
                "Customer data is encrypted".to_string(),
            )),
        }
    }

    async fn load_inner(&self, secret: &Secret) -> Result<LoadedCustomers> {
        let handle = match self.docs.open(self.customer_file()).await {
            Ok(handle) => handle,
            Err(StoreError::StoreNotFound(_)) => {
                match migration::migrate_legacy(self, secret).await? {
                    MigrationOutcome::Migrated { .. } => {
                        self.docs.open(self.customer_file()).await?
                    }
                    MigrationOutcome::NothingToMigrate | MigrationOutcome::AlreadyMigrated => {
                        debug!("no customer data persisted yet");
                        return Ok(LoadedCustomers::Unlocked(Vec::new()));
                    }
                }
            }
            Err(err) => return Err(err),
        };

        let mut doc = handle.lock().await;
        self.read_locked(&mut doc, secret).await
    }

    async fn read_locked(&self, doc: &mut Document, secret: &Secret) -> Result<LoadedCustomers> {
        let Some(payload) = doc.get_as::<String>(ENCRYPTED_KEY)? else {
            let records = doc
                .get_as::<Vec<Customer>>(CUSTOMERS_KEY)?
                .unwrap_or_default();
            debug!(records = records.len(), "customers loaded from plaintext");
            return Ok(LoadedCustomers::Unlocked(records));
        };
        let ids = doc.get_as::<IdentifierSet>(IDS_KEY)?;

        let secret = match secret {
            Secret::NoSecret => {
                let placeholders = ids
                    .as_ref()
                    .map(SplitCodec::decode_without_secret)
                    .unwrap_or_default();
                debug!(records = placeholders.len(), "customers loaded locked");
                return Ok(LoadedCustomers::Locked(placeholders));
            }
            Secret::Passphrase(secret) => secret,
        };

        let needs_upgrade = ids.is_none();
        let records = self.decode_blocking(payload, ids, secret).await?;

        if needs_upgrade {
            // Embedded-id payload: move the ids out now that we can read it.
            match self.write_encrypted(doc, records.clone(), secret).await {
                Ok(()) => info!(records = records.len(), "legacy payload upgraded to split ids"),
                Err(err) => {
                    doc.discard_changes();
                    warn!(error = %err, "legacy payload upgrade failed");
                }
            }
        }

        debug!(records = records.len(), "customers loaded from encrypted payload");
        Ok(LoadedCustomers::Unlocked(records))
    }

    async fn write_encrypted(
        &self,
        doc: &mut Document,
        records: Vec<Customer>,
        secret: &SecretString,
    ) -> Result<()> {
        let encoded = self.encode_blocking(records, secret).await?;
        doc.set(ENCRYPTED_KEY, &encoded.payload)?;
        doc.set(IDS_KEY, &encoded.ids)?;
        doc.delete(CUSTOMERS_KEY);
        doc.save().await
    }

    /// Persist the full customer list.
    ///
    /// The list is written whole. Which representation ends up on disk
    /// depends on `secret` and on what is already stored (see the module
    /// table).
    ///
    /// # Arguments
    ///
    /// * `records` - The complete customer list, ids unique
    /// * `secret` - The encryption secret, or `Secret::NoSecret`
    ///
    /// # Returns
    ///
    /// Returns `SaveOutcome::Written` with the representation written,
    /// `SaveOutcome::IdsUpdated` when only the identifier set changed, or
    /// `SaveOutcome::Refused` when an empty list would erase stored data.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` for duplicate ids,
    /// `StoreError::SecretRequired` when a secret-less save would have to
    /// re-order the encrypted payload, and I/O errors from the flush. After
    /// an error the store still reports what is on disk.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use quotedesk_store::{Customer, CustomerDraft, CustomerStore, SaveOutcome, Secret, StoreConfig};
    ///
    /// # async fn run() -> quotedesk_store::Result<()> {
    /// let store = CustomerStore::new(StoreConfig::new("/tmp/quotedesk"));
    /// let records = vec![Customer::new(1, CustomerDraft::new("Acme Prototyping"))];
    ///
    /// let outcome = store.save(&records, &Secret::passphrase("pw-1234")).await?;
    /// assert!(matches!(outcome, SaveOutcome::Written(_)));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn save(&self, records: &[Customer], secret: &Secret) -> Result<SaveOutcome> {
        ensure_unique_ids(records)?;
        let name = self.customer_file();
        let handle = self.docs.open_or_create(name).await?;
        let mut doc = handle.lock().await;

        let result = self.save_locked(&mut doc, records, secret).await;
        if result.is_err() {
            doc.discard_changes();
            drop(doc);
            self.forget_unwritten(name).await;
        }
        result
    }

    /// Drop the cached handle of `name` if the file was never written.
    pub(crate) async fn forget_unwritten(&self, name: &str) {
        if let Err(err) = self.docs.forget_if_unsaved(name).await {
            warn!(document = name, error = %err, "could not drop handle of unwritten document");
        }
    }

    pub(crate) async fn save_locked(
        &self,
        doc: &mut Document,
        records: &[Customer],
        secret: &Secret,
    ) -> Result<SaveOutcome> {
        let encrypted_exists = doc.contains(ENCRYPTED_KEY);

        if records.is_empty() {
            if encrypted_exists {
                warn!("refusing to replace encrypted customers with an empty list");
                return Ok(SaveOutcome::Refused(RefusalReason::WouldEraseEncrypted));
            }
            if self.config.guard_plaintext_overwrite {
                let existing = doc
                    .get_as::<Vec<Customer>>(CUSTOMERS_KEY)?
                    .unwrap_or_default();
                if !existing.is_empty() {
                    warn!(
                        existing = existing.len(),
                        "refusing to replace plaintext customers with an empty list"
                    );
                    return Ok(SaveOutcome::Refused(RefusalReason::WouldErasePlaintext));
                }
            }
        }

        match secret {
            Secret::Passphrase(secret) => {
                self.write_encrypted(doc, records.to_vec(), secret).await?;
                info!(records = records.len(), "customers saved encrypted");
                Ok(SaveOutcome::Written(Representation::Encrypted))
            }
            Secret::NoSecret if encrypted_exists => {
                let existing = doc.get_as::<IdentifierSet>(IDS_KEY)?.ok_or_else(|| {
                    StoreError::SecretRequired(
                        "Encrypted customers predate the id set; unlock them once first"
                            .to_string(),
                    )
                })?;
                let updated = update_ids(&existing, records)?;
                if records.iter().any(|customer| !customer.is_placeholder()) {
                    debug!("customer fields are not persisted without the secret");
                }
                if updated != existing {
                    doc.set(IDS_KEY, &updated)?;
                    doc.save().await?;
                }
                info!(ids = records.len(), "customer ids updated without secret");
                Ok(SaveOutcome::IdsUpdated)
            }
            Secret::NoSecret => {
                Self::write_plaintext(doc, records).await?;
                info!(records = records.len(), "customers saved as plaintext");
                Ok(SaveOutcome::Written(Representation::Plaintext))
            }
        }
    }

    /// Decrypt the stored customers and write them back as plaintext.
    ///
    /// This is the only path from the encrypted to the plaintext
    /// representation.
    pub async fn disable_encryption(&self, secret: &Secret) -> Result<SaveOutcome> {
        let Secret::Passphrase(secret) = secret else {
            return Err(StoreError::SecretRequired(
                "Disabling encryption needs the current secret".to_string(),
            ));
        };

        let handle = self.docs.open(self.customer_file()).await?;
        let mut doc = handle.lock().await;
        let (payload, ids) = Self::encrypted_parts(&doc)?;
        let records = self.decode_blocking(payload, ids, secret).await?;

        if let Err(err) = Self::write_plaintext(&mut doc, &records).await {
            doc.discard_changes();
            return Err(err);
        }
        info!(records = records.len(), "customer encryption disabled");
        Ok(SaveOutcome::Written(Representation::Plaintext))
    }

    async fn write_plaintext(doc: &mut Document, records: &[Customer]) -> Result<()> {
        doc.set(CUSTOMERS_KEY, records)?;
        doc.delete(ENCRYPTED_KEY);
        doc.delete(IDS_KEY);
        doc.save().await
    }

    /// Re-encrypt the stored customers under a new secret.
    pub async fn change_secret(&self, old: &Secret, new: &Secret) -> Result<SaveOutcome> {
        let (Secret::Passphrase(old), Secret::Passphrase(new)) = (old, new) else {
            return Err(StoreError::SecretRequired(
                "Changing the secret needs both the current and the new secret".to_string(),
            ));
        };

        let handle = self.docs.open(self.customer_file()).await?;
        let mut doc = handle.lock().await;
        let (payload, ids) = Self::encrypted_parts(&doc)?;
        let records = self.decode_blocking(payload, ids, old).await?;

        if let Err(err) = self.write_encrypted(&mut doc, records, new).await {
            doc.discard_changes();
            return Err(err);
        }
        info!("customer secret changed");
        Ok(SaveOutcome::Written(Representation::Encrypted))
    }

    fn encrypted_parts(doc: &Document) -> Result<(String, Option<IdentifierSet>)> {
        let payload = doc.get_as::<String>(ENCRYPTED_KEY)?.ok_or_else(|| {
            StoreError::InvalidInput("Customer data is not encrypted".to_string())
        })?;
        Ok((payload, doc.get_as::<IdentifierSet>(IDS_KEY)?))
    }

    /// Fresh id above every record id and every identifier-set key.
    ///
    /// Tombstoned ids are never reused, so a new customer cannot inherit a
    /// removed customer's encrypted fields.
    pub async fn next_id(&self, records: &[Customer]) -> Result<u64> {
        let mut highest = records.iter().map(|customer| customer.id).max().unwrap_or(0);

        match self.docs.open(self.customer_file()).await {
            Ok(handle) => {
                let doc = handle.lock().await;
                if let Some(ids) = doc.get_as::<IdentifierSet>(IDS_KEY)? {
                    highest = highest.max(ids.max_key().unwrap_or(0));
                }
            }
            Err(StoreError::StoreNotFound(_)) => {}
            Err(err) => return Err(err),
        }

        highest
            .checked_add(1)
            .ok_or_else(|| StoreError::Validation("Customer id space exhausted".to_string()))
    }

    /// Import customers from the legacy location, if any are still there.
    pub async fn migrate(&self, secret: &Secret) -> Result<MigrationOutcome> {
        migration::migrate_legacy(self, secret).await
    }

    /// Delete every file the store owns, verifying each deletion.
    pub async fn wipe(&self) -> WipeReport {
        let backoff = FixedBackoff::from(&self.config.wipe);
        self.wipe_with(TokioFileOps, backoff).await
    }

    /// [`wipe`](Self::wipe) with injected filesystem and delays.
    pub async fn wipe_with<F: FileOps, B: BackoffPolicy>(&self, ops: F, backoff: B) -> WipeReport {
        let wiper = Wiper::new(
            Arc::clone(&self.docs),
            ops,
            backoff,
            self.config.wipe.max_retries,
        );
        wiper.wipe(&[self.data_file(), self.customer_file()]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::CustomerDraft;

    fn ids(pairs: &[(u64, bool)]) -> IdentifierSet {
        let mut set = IdentifierSet::new();
        for (id, live) in pairs {
            set.insert(*id, *live);
        }
        set
    }

    #[test]
    fn test_update_ids_tombstones_removed() {
        let existing = IdentifierSet::from_ids([1, 2, 3]);
        let records = vec![Customer::placeholder(1), Customer::placeholder(3)];

        let updated = update_ids(&existing, &records).unwrap();

        assert_eq!(updated, ids(&[(1, true), (2, false), (3, true)]));
    }

    #[test]
    fn test_update_ids_appends_and_revives() {
        let existing = ids(&[(1, true), (2, false)]);
        let records = vec![
            Customer::placeholder(1),
            Customer::placeholder(2),
            Customer::new(5, CustomerDraft::new("New")),
        ];

        let updated = update_ids(&existing, &records).unwrap();

        assert_eq!(updated, ids(&[(1, true), (2, true), (5, true)]));
    }

    #[test]
    fn test_update_ids_rejects_out_of_order_id() {
        let existing = IdentifierSet::from_ids([10, 20]);
        let records = vec![
            Customer::placeholder(10),
            Customer::placeholder(15),
            Customer::placeholder(20),
        ];

        let result = update_ids(&existing, &records);
        assert!(matches!(result, Err(StoreError::SecretRequired(_))));
    }
}
