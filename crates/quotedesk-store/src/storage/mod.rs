//! Customer storage for quotedesk.
//!
//! ## Layout
//!
//! Every persisted artifact is a JSON key/value document in the data
//! directory:
//!
//! - `customers.json` holds either `customers` (plaintext list) or
//!   `customers_encrypted` plus `customer_ids` (split scheme)
//! - `data.json` is the primary application document and the legacy
//!   location of the same customer keys
//!
//! ## Modules
//!
//! - **document**: cached handles to file-backed documents
//! - **codec**: split encoding of ids and encrypted payload
//! - **migration**: legacy location import
//! - **customers**: load/save lifecycle and representation rules
//! - **wipe**: verified deletion state machine

pub mod codec;
pub mod customers;
pub mod document;
pub mod migration;
pub mod types;
pub mod wipe;

pub use codec::{EncodedCustomers, SplitCodec};
pub use customers::{CustomerStore, CUSTOMERS_KEY, ENCRYPTED_KEY, IDS_KEY};
pub use document::{Document, DocumentHandle, DocumentStore};
pub use migration::MigrationOutcome;
pub use types::{
    remove_customer, upsert_customer, Customer, CustomerDraft, IdentifierSet, LoadedCustomers,
    RefusalReason, Representation, SaveOutcome,
};
pub use wipe::{
    ArtifactReport, BackoffPolicy, FileOps, FixedBackoff, NoBackoff, TokioFileOps, WipeOutcome,
    WipeReport, WipeState, Wiper,
};
