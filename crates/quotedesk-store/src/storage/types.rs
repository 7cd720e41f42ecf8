//! Core data types for the customer store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A customer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Unique identifier within one store
    pub id: u64,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default)]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for creating or editing a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerDraft {
    pub name: String,
    pub contact: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl CustomerDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Customer {
    /// Create a record with fresh timestamps.
    pub fn new(id: u64, draft: CustomerDraft) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: draft.name,
            contact: draft.contact,
            company: draft.company,
            address: draft.address,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Degraded record carrying only its id.
    ///
    /// Returned when the payload cannot be read without the secret; every
    /// other field is empty and both timestamps sit at the Unix epoch.
    pub fn placeholder(id: u64) -> Self {
        Self {
            id,
            name: String::new(),
            contact: None,
            company: None,
            address: None,
            notes: None,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    /// Replace the editable fields and bump `updated_at`.
    pub fn update(&mut self, draft: CustomerDraft) {
        self.name = draft.name;
        self.contact = draft.contact;
        self.company = draft.company;
        self.address = draft.address;
        self.notes = draft.notes;
        self.updated_at = Utc::now().max(self.created_at);
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder(self.id)
    }
}

/// Insert `customer`, replacing any record with the same id in place.
pub fn upsert_customer(records: &mut Vec<Customer>, customer: Customer) {
    match records.iter_mut().find(|existing| existing.id == customer.id) {
        Some(existing) => *existing = customer,
        None => records.push(customer),
    }
}

/// Remove the record with `id`, returning it if present.
pub fn remove_customer(records: &mut Vec<Customer>, id: u64) -> Option<Customer> {
    let index = records.iter().position(|customer| customer.id == id)?;
    Some(records.remove(index))
}

/// Plaintext id bookkeeping stored beside the encrypted payload.
///
/// Serialized as a JSON object of stringified ids. Ascending id order gives
/// each key its position in the decrypted payload. `true` marks a live
/// record; `false` marks a tombstone whose payload slot is still occupied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierSet(BTreeMap<u64, bool>);

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier set with every id live.
    pub fn from_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        Self(ids.into_iter().map(|id| (id, true)).collect())
    }

    /// All keys in positional (ascending) order, tombstones included.
    pub fn slots(&self) -> impl Iterator<Item = (u64, bool)> + '_ {
        self.0.iter().map(|(id, live)| (*id, *live))
    }

    /// Live ids in ascending order.
    pub fn live_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.0
            .iter()
            .filter(|(_, live)| **live)
            .map(|(id, _)| *id)
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.0.get(&id).copied().unwrap_or(false)
    }

    pub fn contains_key(&self, id: u64) -> bool {
        self.0.contains_key(&id)
    }

    pub fn max_key(&self) -> Option<u64> {
        self.0.keys().next_back().copied()
    }

    pub fn insert(&mut self, id: u64, live: bool) {
        self.0.insert(id, live);
    }

    /// Number of keys, tombstones included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which on-disk representation currently holds the customer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Empty,
    Plaintext,
    Encrypted,
}

/// Result of a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedCustomers {
    /// Full records.
    Unlocked(Vec<Customer>),
    /// Encrypted data read without the secret: one placeholder per known id.
    Locked(Vec<Customer>),
}

impl LoadedCustomers {
    pub fn records(&self) -> &[Customer] {
        match self {
            LoadedCustomers::Unlocked(records) | LoadedCustomers::Locked(records) => records,
        }
    }

    pub fn into_records(self) -> Vec<Customer> {
        match self {
            LoadedCustomers::Unlocked(records) | LoadedCustomers::Locked(records) => records,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, LoadedCustomers::Locked(_))
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

/// Why a save was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefusalReason {
    /// Empty list would replace encrypted data.
    WouldEraseEncrypted,
    /// Empty list would replace a non-empty plaintext list (opt-in guard).
    WouldErasePlaintext,
}

/// Result of a save that did not fail with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The full list was written in the given representation.
    Written(Representation),
    /// Only the identifier set changed; the encrypted payload is untouched.
    IdsUpdated,
    /// Safety interlock: nothing was written.
    Refused(RefusalReason),
}

impl SaveOutcome {
    pub fn is_refused(&self) -> bool {
        matches!(self, SaveOutcome::Refused(_))
    }
}
