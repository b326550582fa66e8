//! # Strata Testkit
//!
//! Test utilities for Strata.
//!
//! This crate provides:
//! - Sample namespaces and database fixtures
//! - Property-based test generators using proptest
//! - A storage wrapper that records every batched read
//! - A conformance suite any [`strata_storage::Storage`] backend can run
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn reads_are_batched() {
//!     let db = TestDatabase::blog();
//!     db.create("Post", &json(r#"{"id": "p1", "title": "a"}"#)).await.unwrap();
//!     // ... test operations
//!     assert_eq!(db.storage.batches(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conformance;
pub mod counting;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::conformance::*;
    pub use crate::counting::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use counting::*;
pub use fixtures::*;
pub use generators::*;
