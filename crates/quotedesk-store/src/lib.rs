//! # Quotedesk Store
//!
//! Persistent customer record store for the quotedesk 3D-printing quote tool.
//!
//! Customers are kept in a JSON document on disk, either as a plaintext list
//! or encrypted. In encrypted form the record ids stay in a separate
//! plaintext identifier set, so the application can show how many customers
//! exist (and which ids) before the user unlocks the data.
//!
//! ## Architecture
//!
//! - **storage**: documents, split codec, lifecycle, migration, wipe
//! - **crypto**: secret model, session secret provider, payload cipher
//! - **config**: data directory, file names, wipe policy
//! - **error**: classified failures
//!
//! ## Example
//!
//! ```no_run
//! use quotedesk_store::{Customer, CustomerDraft, CustomerStore, Secret, StoreConfig};
//!
//! # async fn run() -> quotedesk_store::Result<()> {
//! let store = CustomerStore::new(StoreConfig::new("/tmp/quotedesk"));
//! let secret = Secret::passphrase("correct horse");
//!
//! let mut customers = store.load(&secret).await?.into_records();
//! let id = store.next_id(&customers).await?;
//! customers.push(Customer::new(id, CustomerDraft::new("Acme Prototyping")));
//! store.save(&customers, &secret).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod storage;

pub use config::StoreConfig;
pub use crypto::{Secret, SecretProvider, SessionSecrets};
pub use error::{Result, StoreError};
pub use storage::{
    Customer, CustomerDraft, CustomerStore, LoadedCustomers, MigrationOutcome, Representation,
    SaveOutcome, WipeOutcome, WipeReport,
};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
