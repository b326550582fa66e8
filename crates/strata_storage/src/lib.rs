//! # Strata Storage
//!
//! The storage contract for Strata and its in-memory implementation.
//!
//! Backends hold object instances and answer three kinds of request:
//! batched reads by id (and version), filtered sorted queries returned as
//! one or more independently paged sources, and atomic batched writes with
//! optimistic version checks.
//!
//! ## Contents
//!
//! - [`Storage`], the async backend trait, with [`ReadTransaction`] and
//!   [`WriteTransaction`] builders
//! - [`StorageTraits`], what a backend declares it supports
//! - [`Pager`], merging sorted sources into resumable pages
//! - [`MemoryStorage`], a snapshot-based in-memory backend
//!
//! ## Failure semantics
//!
//! - creating an existing id fails with [`StorageError::ObjectExists`]
//! - a stale `before` fails with [`StorageError::VersionMismatch`]
//! - `before = None` skips the version check
//! - a failed check aborts the whole transaction

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod key;
mod memory;
mod page;
mod pager;
mod source;
mod storage;
mod traits;
mod transaction;

pub use error::{StorageError, StorageResult};
pub use key::RefKey;
pub use memory::MemoryStorage;
pub use page::{Page, PagingToken};
pub use pager::{sort_comparator, with_id_tiebreak, Pager};
pub use source::{ListSource, PagedSource};
pub use storage::Storage;
pub use strata_schema::Consistency;
pub use traits::{ConcurrencyControl, StorageTraits, Versioning};
pub use transaction::{ReadRequest, ReadResponse, ReadTransaction, WriteAction, WriteTransaction};
