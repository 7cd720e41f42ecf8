//! Split codec: customer list <-> encrypted payload + plaintext id set.
//!
//! Ids never enter the encrypted payload. The payload is the JSON array of
//! id-less records sorted by ascending id, and the identifier set, read in
//! ascending key order, says which id belongs to which position. That
//! positional correspondence is what lets the id set be read and edited
//! without the secret.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crypto::{AgeCipher, Cipher};
use crate::error::{Result, StoreError};
use crate::storage::types::{Customer, IdentifierSet};

/// Output of [`SplitCodec::encode`].
#[derive(Debug, Clone)]
pub struct EncodedCustomers {
    pub payload: String,
    pub ids: IdentifierSet,
}

/// Payload element as written: every field except the id.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayloadRecordRef<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
}

impl<'a> From<&'a Customer> for PayloadRecordRef<'a> {
    fn from(customer: &'a Customer) -> Self {
        Self {
            name: &customer.name,
            contact: customer.contact.as_deref(),
            company: customer.company.as_deref(),
            address: customer.address.as_deref(),
            notes: customer.notes.as_deref(),
            created_at: &customer.created_at,
            updated_at: &customer.updated_at,
        }
    }
}

/// Payload element as read. Legacy payloads still carry `id`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadRecord {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    contact: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: DateTime<Utc>,
}

impl PayloadRecord {
    fn into_customer(self, id: u64) -> Customer {
        Customer {
            id,
            name: self.name,
            contact: self.contact,
            company: self.company,
            address: self.address,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Reject lists that reuse an id.
pub fn ensure_unique_ids(records: &[Customer]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for customer in records {
        if !seen.insert(customer.id) {
            return Err(StoreError::Validation(format!(
                "Duplicate customer id: {}",
                customer.id
            )));
        }
    }
    Ok(())
}

/// Encoder/decoder for the split representation.
#[derive(Clone)]
pub struct SplitCodec {
    cipher: Arc<dyn Cipher>,
}

impl Default for SplitCodec {
    fn default() -> Self {
        Self::new(Arc::new(AgeCipher))
    }
}

impl SplitCodec {
    pub fn new(cipher: Arc<dyn Cipher>) -> Self {
        Self { cipher }
    }

    /// Strip ids, encrypt the records in ascending id order, and build the
    /// matching identifier set.
    ///
    /// # Arguments
    ///
    /// * `records` - The customer list, in any order
    /// * `secret` - The passphrase for the payload
    ///
    /// # Returns
    ///
    /// Returns the printable encrypted payload and the identifier set. No id
    /// is ever written into the payload.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if two records share an id.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use quotedesk_store::storage::SplitCodec;
    /// use quotedesk_store::{Customer, CustomerDraft};
    /// use secrecy::SecretString;
    ///
    /// let codec = SplitCodec::default();
    /// let secret = SecretString::from("pw-1234".to_string());
    /// let records = vec![Customer::new(7, CustomerDraft::new("Acme"))];
    ///
    /// let encoded = codec.encode(&records, &secret).unwrap();
    /// assert_eq!(encoded.ids.live_ids().collect::<Vec<_>>(), vec![7]);
    /// ```
    pub fn encode(&self, records: &[Customer], secret: &SecretString) -> Result<EncodedCustomers> {
        ensure_unique_ids(records)?;

        let mut ordered: Vec<&Customer> = records.iter().collect();
        ordered.sort_by_key(|customer| customer.id);

        let stripped: Vec<PayloadRecordRef<'_>> =
            ordered.iter().map(|customer| (*customer).into()).collect();
        let json = serde_json::to_vec(&stripped)?;
        let payload = self.cipher.encrypt(&json, secret)?;

        debug!(records = ordered.len(), "customer payload encoded");
        Ok(EncodedCustomers {
            payload,
            ids: IdentifierSet::from_ids(ordered.iter().map(|customer| customer.id)),
        })
    }

    fn decrypt_records(&self, payload: &str, secret: &SecretString) -> Result<Vec<PayloadRecord>> {
        let json = self.cipher.decrypt(payload, secret)?;
        serde_json::from_slice(&json).map_err(|e| {
            StoreError::DecryptionFailed(format!("Decrypted payload is not a customer list: {}", e))
        })
    }

    /// Decrypt and re-attach ids.
    ///
    /// With an identifier set, ids are zipped positionally in ascending
    /// order: tombstoned slots are skipped and live ids past the end of the
    /// payload come back as placeholders. Without one (legacy data), ids
    /// embedded in the payload are used.
    ///
    /// # Arguments
    ///
    /// * `payload` - The encrypted payload produced by [`encode`](Self::encode)
    /// * `ids` - The stored identifier set, or `None` for legacy data
    /// * `secret` - The passphrase the payload was encrypted with
    ///
    /// # Returns
    ///
    /// Returns the live records in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DecryptionFailed` for a wrong secret or a damaged
    /// payload, and `StoreError::Corrupted` if the payload holds more records
    /// than the identifier set has slots.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use quotedesk_store::storage::SplitCodec;
    /// use quotedesk_store::{Customer, CustomerDraft, StoreError};
    /// use secrecy::SecretString;
    ///
    /// let codec = SplitCodec::default();
    /// let secret = SecretString::from("pw-1234".to_string());
    /// let records = vec![Customer::new(7, CustomerDraft::new("Acme"))];
    /// let encoded = codec.encode(&records, &secret).unwrap();
    ///
    /// let decoded = codec.decode(&encoded.payload, Some(&encoded.ids), &secret).unwrap();
    /// assert_eq!(decoded, records);
    ///
    /// let wrong = SecretString::from("nope".to_string());
    /// let result = codec.decode(&encoded.payload, Some(&encoded.ids), &wrong);
    /// assert!(matches!(result, Err(StoreError::DecryptionFailed(_))));
    /// ```
    pub fn decode(
        &self,
        payload: &str,
        ids: Option<&IdentifierSet>,
        secret: &SecretString,
    ) -> Result<Vec<Customer>> {
        let records = self.decrypt_records(payload, secret)?;

        match ids {
            Some(ids) => Self::zip_with_ids(records, ids),
            None => Self::from_embedded_ids(records),
        }
    }

    fn zip_with_ids(records: Vec<PayloadRecord>, ids: &IdentifierSet) -> Result<Vec<Customer>> {
        if records.len() > ids.len() {
            return Err(StoreError::Corrupted(format!(
                "Identifier set has {} slots but payload holds {} records",
                ids.len(),
                records.len()
            )));
        }

        let mut records = records.into_iter();
        let mut customers = Vec::with_capacity(ids.len());
        for (id, live) in ids.slots() {
            match (records.next(), live) {
                (Some(record), true) => customers.push(record.into_customer(id)),
                (Some(_), false) => {}
                (None, true) => customers.push(Customer::placeholder(id)),
                (None, false) => {}
            }
        }
        Ok(customers)
    }

    fn from_embedded_ids(records: Vec<PayloadRecord>) -> Result<Vec<Customer>> {
        let mut next_id = records
            .iter()
            .filter_map(|record| record.id)
            .max()
            .unwrap_or(0);

        let mut customers = Vec::with_capacity(records.len());
        for record in records {
            let id = match record.id {
                Some(id) => id,
                None => {
                    next_id += 1;
                    warn!(id = next_id, "payload record without id, assigning a new one");
                    next_id
                }
            };
            customers.push(record.into_customer(id));
        }

        ensure_unique_ids(&customers)
            .map_err(|e| StoreError::Corrupted(format!("Legacy payload: {}", e)))?;
        Ok(customers)
    }

    /// Degraded view: one placeholder per live id, no secret needed.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotedesk_store::storage::{IdentifierSet, SplitCodec};
    ///
    /// let mut ids = IdentifierSet::from_ids([3, 1]);
    /// ids.insert(2, false);
    ///
    /// let locked = SplitCodec::decode_without_secret(&ids);
    /// assert_eq!(locked.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);
    /// assert!(locked.iter().all(|c| c.name.is_empty()));
    /// ```
    pub fn decode_without_secret(ids: &IdentifierSet) -> Vec<Customer> {
        ids.live_ids().map(Customer::placeholder).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::CustomerDraft;
    use secrecy::ExposeSecret;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn customer(id: u64, name: &str) -> Customer {
        let mut draft = CustomerDraft::new(name);
        draft.company = Some(format!("{} Ltd", name));
        Customer::new(id, draft)
    }

    /// Reversible stand-in so these tests exercise the codec, not scrypt.
    struct ReverseCipher;

    impl Cipher for ReverseCipher {
        fn encrypt(&self, plaintext: &[u8], secret: &SecretString) -> Result<String> {
            let body: String = String::from_utf8_lossy(plaintext).chars().rev().collect();
            Ok(format!("{}|{}", secret.expose_secret(), body))
        }

        fn decrypt(&self, payload: &str, secret: &SecretString) -> Result<Vec<u8>> {
            let (key, body) = payload
                .split_once('|')
                .ok_or_else(|| StoreError::DecryptionFailed("malformed".to_string()))?;
            if key != secret.expose_secret() {
                return Err(StoreError::DecryptionFailed("Incorrect secret".to_string()));
            }
            Ok(body.chars().rev().collect::<String>().into_bytes())
        }
    }

    fn codec() -> SplitCodec {
        SplitCodec::new(Arc::new(ReverseCipher))
    }

    #[test]
    fn test_round_trip_restores_ids() {
        let records = vec![customer(30, "C"), customer(4, "A"), customer(12, "B")];

        let encoded = codec().encode(&records, &secret("pw")).unwrap();
        let decoded = codec()
            .decode(&encoded.payload, Some(&encoded.ids), &secret("pw"))
            .unwrap();

        let mut expected = records.clone();
        expected.sort_by_key(|c| c.id);
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_payload_carries_no_ids() {
        let records = vec![customer(987654321, "A"), customer(123456789, "B")];

        let encoded = codec().encode(&records, &secret("pw")).unwrap();
        let plaintext = ReverseCipher.decrypt(&encoded.payload, &secret("pw")).unwrap();
        let plaintext = String::from_utf8(plaintext).unwrap();

        assert!(!plaintext.contains("987654321"));
        assert!(!plaintext.contains("123456789"));
        assert!(!plaintext.contains("\"id\""));
        assert_eq!(
            encoded.ids.live_ids().collect::<Vec<_>>(),
            vec![123456789, 987654321]
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let records = vec![customer(1, "A"), customer(1, "B")];
        let result = codec().encode(&records, &secret("pw"));
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_wrong_secret_is_decryption_failure() {
        let encoded = codec().encode(&[customer(1, "A")], &secret("pw")).unwrap();
        let result = codec().decode(&encoded.payload, Some(&encoded.ids), &secret("nope"));
        assert!(matches!(result, Err(StoreError::DecryptionFailed(_))));
    }

    #[test]
    fn test_tombstones_and_appended_ids() {
        let records = vec![customer(1, "A"), customer(2, "B"), customer(3, "C")];
        let encoded = codec().encode(&records, &secret("pw")).unwrap();

        let mut ids = encoded.ids.clone();
        ids.insert(2, false);
        ids.insert(9, true);

        let decoded = codec()
            .decode(&encoded.payload, Some(&ids), &secret("pw"))
            .unwrap();

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].name, "A");
        assert_eq!(decoded[1].id, 3);
        assert_eq!(decoded[1].name, "C");
        assert_eq!(decoded[2], Customer::placeholder(9));
    }

    #[test]
    fn test_more_records_than_ids_is_corrupted() {
        let records = vec![customer(1, "A"), customer(2, "B")];
        let encoded = codec().encode(&records, &secret("pw")).unwrap();

        let result = codec().decode(
            &encoded.payload,
            Some(&IdentifierSet::from_ids([1])),
            &secret("pw"),
        );
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn test_legacy_payload_with_embedded_ids() {
        let legacy = vec![customer(5, "A"), customer(8, "B")];
        let payload = ReverseCipher
            .encrypt(&serde_json::to_vec(&legacy).unwrap(), &secret("pw"))
            .unwrap();

        let decoded = codec().decode(&payload, None, &secret("pw")).unwrap();

        assert_eq!(decoded, legacy);
    }

    #[test]
    fn test_legacy_payload_missing_ids_gets_fresh_ones() {
        let json = br#"[{"id":4,"name":"A"},{"name":"B"}]"#;
        let payload = ReverseCipher.encrypt(json, &secret("pw")).unwrap();

        let decoded = codec().decode(&payload, None, &secret("pw")).unwrap();

        assert_eq!(decoded[0].id, 4);
        assert_eq!(decoded[1].id, 5);
        assert_eq!(decoded[1].name, "B");
    }

    #[test]
    fn test_decode_without_secret() {
        let mut ids = IdentifierSet::from_ids([2, 1]);
        ids.insert(3, false);

        let degraded = SplitCodec::decode_without_secret(&ids);

        assert_eq!(
            degraded,
            vec![Customer::placeholder(1), Customer::placeholder(2)]
        );
    }

    #[test]
    fn test_age_cipher_round_trip() {
        let records = vec![customer(1, "A"), customer(2, "B")];
        let codec = SplitCodec::default();

        let encoded = codec.encode(&records, &secret("pw")).unwrap();
        let decoded = codec
            .decode(&encoded.payload, Some(&encoded.ids), &secret("pw"))
            .unwrap();

        assert_eq!(decoded, records);
    }
}
