//! # Strata Core
//!
//! Reading, expanding and writing objects over a [`Storage`] backend.
//!
//! This crate provides:
//! - [`ReadProcessor`], which casts stored records to their concrete
//!   schema and expands references, links and transients level by level
//!   with one batched read per level
//! - [`Database`], a facade that stamps metadata on writes and parses
//!   query text
//! - [`Config`], page sizes and consistency settings
//!
//! ## Expansion
//!
//! Expansion is driven by an [`Expand`] set of dotted paths. A reference
//! named in the set is replaced with the full referenced object (itself
//! expanded to the nested paths); any other reference stays `{id}`.
//! A reference to an object that no longer exists becomes `null`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod key;
mod processor;

pub use config::Config;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use key::ExpandKey;
pub use processor::ReadProcessor;

pub use strata_codec::Value;
pub use strata_schema::{Expand, Expression, Instance, Namespace, Sort};
pub use strata_storage::{
    Consistency, MemoryStorage, Page, PagingToken, RefKey, Storage, StorageError, Versioning,
};
