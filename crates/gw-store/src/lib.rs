//! `gw-store` — the typed store façade.
//!
//! Higher components see one async [`Store`] trait with per-entity
//! operations and no join semantics; relationship assembly happens above.
//! Two backends implement it:
//!
//! | Feature  | Backend       | Where state lives                          |
//! |----------|---------------|--------------------------------------------|
//! | *(none)* | [`MemStore`]  | Process-local hash tables                  |
//! | `sqlite` | [`SqliteStore`] | A single `genworld.db` file (WAL)        |
//!
//! # Write semantics
//!
//! Every entity carries a `version`.  `put_*` with `version == 0` is a
//! create, conditional on the id being absent; any other version is an
//! update, conditional on the stored version matching.  Both failures are
//! [`StoreError::Conflict`] — the caller refetches and retries.  The store
//! bumps the version on every successful write and returns the stored copy.
//!
//! Failures divide into *retryable* (`Conflict`, `Transient`) and permanent
//! (`Validation`, `*NotFound`, `Fatal`); see [`StoreError::is_retryable`].

pub mod error;
pub mod inmem;
pub mod store;

#[cfg(any(test, feature = "sqlite"))]
pub mod sqlite;


pub use error::{StoreError, StoreResult};
pub use inmem::MemStore;
pub use store::Store;

#[cfg(any(test, feature = "sqlite"))]
pub use sqlite::SqliteStore;
