//! # Strata Schema
//!
//! The typed model behind Strata: schemas, value types and namespaces.
//!
//! This crate provides:
//! - [`Use`], the closed set of value types, with coercion
//!   ([`Use::create`]), defaults and binary serialization
//! - [`Schema`] in four kinds: enum, struct, object and view
//! - [`Namespace`], resolving a map of descriptors (possibly cyclic)
//!   into immutable shared schemas
//! - [`Expression`], the small language used by links, transients,
//!   filters and views
//! - [`Consistency`], the read/write consistency ladder
//!
//! ## Usage
//!
//! ```
//! use strata_schema::{Expand, Namespace};
//! use strata_codec::Value;
//!
//! let ns = Namespace::from_yaml(r#"
//! Post:
//!   type: object
//!   properties:
//!     title: string
//!     ref: Post
//! "#).unwrap();
//!
//! let post = ns.require_object("Post").unwrap();
//! let raw: Value = serde_json::from_str(r#"{"id": "p1", "title": "hi", "ref": "p0"}"#).unwrap();
//! let instance = post.create(&ns, &raw, &Expand::empty(), false).unwrap();
//! assert_eq!(instance.id(), Some("p1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod consistency;
pub mod descriptor;
mod error;
pub mod expression;
mod instance;
mod name;
mod namespace;
mod schema;
pub mod types;

pub use consistency::Consistency;
pub use descriptor::{NamespaceDescriptor, SchemaDescriptor};
pub use error::{SchemaError, SchemaResult};
pub use expression::{Context, Expression, Order, Sort};
pub use instance::{is_reserved, Instance, CREATED, HASH, ID, KEY, RESERVED, SCHEMA, UPDATED, VERSION};
pub use name::{Expand, Name};
pub use namespace::{Namespace, NamespaceBuilder};
pub use schema::{
    EnumSchema, History, Index, Link, ObjectSchema, Permission, Property, Schema, SchemaKind,
    StructSchema, Transient, ViewFrom, ViewSchema,
};
pub use types::{TypeRef, Use, UseVisitor};
