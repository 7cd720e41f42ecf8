//! Import of customers from the legacy combined location.
//!
//! Older releases kept the customer keys inside the primary data file next
//! to printers, filaments and settings, with ids embedded in the encrypted
//! payload. Migration moves them into the customer file through the normal
//! save path, then deletes the legacy keys (and only those keys) from the
//! data file.
//!
//! The legacy keys are the marker: once they are gone there is nothing left
//! to do, so running the migration again is a no-op.

use tracing::{debug, info, warn};

use crate::crypto::Secret;
use crate::error::{Result, StoreError};
use crate::storage::customers::{
    representation_of, CustomerStore, CUSTOMERS_KEY, CUSTOMER_KEYS, ENCRYPTED_KEY, IDS_KEY,
};
use crate::storage::document::Document;
use crate::storage::types::{Customer, IdentifierSet, Representation, SaveOutcome};

/// What a migration run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy file or no legacy customer keys.
    NothingToMigrate,
    /// Legacy data imported and retired.
    Migrated {
        /// Records imported; `None` when an encrypted payload was moved
        /// without being decrypted.
        records: Option<usize>,
        representation: Representation,
    },
    /// The customer file already held data; legacy keys were retired.
    AlreadyMigrated,
}

fn retire_legacy_keys(legacy: &mut Document) {
    for key in CUSTOMER_KEYS {
        legacy.delete(key);
    }
}

/// Run the migration for `store`.
///
/// # Errors
///
/// Decryption and write failures propagate. The legacy keys stay in place
/// and no empty customer document is left cached, so the next load runs
/// the migration again.
pub(crate) async fn migrate_legacy(store: &CustomerStore, secret: &Secret) -> Result<MigrationOutcome> {
    let docs = store.documents();

    let legacy_handle = match docs.open(store.data_file()).await {
        Ok(handle) => handle,
        Err(StoreError::StoreNotFound(_)) => return Ok(MigrationOutcome::NothingToMigrate),
        Err(err) => return Err(err),
    };
    let mut legacy = legacy_handle.lock().await;

    if !CUSTOMER_KEYS.iter().any(|key| legacy.contains(key)) {
        debug!("no legacy customer keys");
        return Ok(MigrationOutcome::NothingToMigrate);
    }

    let current_handle = docs.open_or_create(store.customer_file()).await?;
    let mut current = current_handle.lock().await;

    let result = import(store, &mut legacy, &mut current, secret).await;
    if let Err(err) = &result {
        warn!(error = %err, "legacy customer migration failed");
        legacy.discard_changes();
        current.discard_changes();
        drop(current);
        store.forget_unwritten(store.customer_file()).await;
    }
    result
}

async fn import(
    store: &CustomerStore,
    legacy: &mut Document,
    current: &mut Document,
    secret: &Secret,
) -> Result<MigrationOutcome> {
    if representation_of(current) != Representation::Empty {
        retire_legacy_keys(legacy);
        legacy.save().await?;
        info!("customer file already populated, legacy customer keys retired");
        return Ok(MigrationOutcome::AlreadyMigrated);
    }

    let outcome = match legacy.get_as::<String>(ENCRYPTED_KEY)? {
        Some(payload) => {
            let ids = legacy.get_as::<IdentifierSet>(IDS_KEY)?;
            match secret {
                Secret::Passphrase(key) => {
                    let records = store.decode_blocking(payload, ids, key).await?;
                    let count = records.len();
                    let written = store.save_locked(current, &records, secret).await?;
                    MigrationOutcome::Migrated {
                        records: Some(count),
                        representation: written_representation(written)?,
                    }
                }
                Secret::NoSecret => {
                    // Cannot decrypt: move the payload as-is. Embedded ids are
                    // split out on the first keyed load.
                    current.set(ENCRYPTED_KEY, &payload)?;
                    if let Some(ids) = ids {
                        current.set(IDS_KEY, &ids)?;
                    }
                    current.save().await?;
                    MigrationOutcome::Migrated {
                        records: None,
                        representation: Representation::Encrypted,
                    }
                }
            }
        }
        None => {
            let records = legacy
                .get_as::<Vec<Customer>>(CUSTOMERS_KEY)?
                .unwrap_or_default();
            let count = records.len();
            let written = store.save_locked(current, &records, secret).await?;
            MigrationOutcome::Migrated {
                records: Some(count),
                representation: written_representation(written)?,
            }
        }
    };

    retire_legacy_keys(legacy);
    legacy.save().await?;
    info!(?outcome, "legacy customers migrated");
    Ok(outcome)
}

fn written_representation(outcome: SaveOutcome) -> Result<Representation> {
    match outcome {
        SaveOutcome::Written(representation) => Ok(representation),
        SaveOutcome::IdsUpdated => Ok(Representation::Encrypted),
        SaveOutcome::Refused(reason) => Err(StoreError::Storage(format!(
            "Migration write refused: {:?}",
            reason
        ))),
    }
}
