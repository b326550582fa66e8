//! Test fixtures and database helpers.
//!
//! Provides sample namespaces and in-memory databases wired through a
//! [`CountingStorage`].

use std::sync::Arc;
use strata_codec::Value;
use strata_core::{Config, Database};
use strata_schema::Namespace;
use strata_storage::MemoryStorage;

use crate::counting::CountingStorage;

/// Users writing posts that reference other posts.
///
/// `Post.ref` points back at `Post`, `Post.author` and `User.favorite`
/// close a cycle between the two schemas.
pub const BLOG: &str = r#"
User:
  type: object
  properties:
    name:
      type: string
      required: true
    favorite: Post
  links:
    posts:
      schema: Post
      expression: "author.id == this.id"
      sort: [title]
    latest:
      schema: Post
      expression: "author.id == this.id"
      sort: ["created:desc"]
      single: true
Post:
  type: object
  history:
    enabled: true
  properties:
    title:
      type: string
      required: true
    ref: Post
    author: User
    tags: set<Tag>
    related: array<Post>
  transients:
    summary:
      type: string
      expression: "upper(title)"
    author_name:
      type: string
      expression: "author.name"
      expand: [author]
Tag:
  type: enum
  values: [news, tech, misc]
PostsByAuthor:
  type: view
  from: Post
  group: [author.id]
  properties:
    author:
      type: string
      expression: "author.id"
    count:
      type: integer
      expression: "count()"
  sort: ["count:desc"]
"#;

/// An abstract base with two concrete subtypes and a holder referencing
/// the base.
pub const ZOO: &str = r#"
Animal:
  type: object
  concrete: false
  history:
    enabled: true
  properties:
    name:
      type: string
      required: true
Dog:
  type: object
  extend: Animal
  properties:
    breed: string
Cat:
  type: object
  extend: Animal
  properties:
    lives:
      type: integer
      default: 9
Keeper:
  type: object
  properties:
    name: string
    pets: array<Animal>
"#;

/// The [`BLOG`] namespace.
pub fn blog_namespace() -> Namespace {
    Namespace::from_yaml(BLOG).expect("Failed to build blog namespace")
}

/// The [`ZOO`] namespace.
pub fn zoo_namespace() -> Namespace {
    Namespace::from_yaml(ZOO).expect("Failed to build zoo namespace")
}

/// Parses JSON text into a [`Value`].
pub fn json(text: &str) -> Value {
    serde_json::from_str(text).expect("Invalid JSON fixture")
}

/// An in-memory database whose storage counts its traffic.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The storage behind `db`.
    pub storage: Arc<CountingStorage<MemoryStorage>>,
}

impl TestDatabase {
    /// Creates a database over `namespace` with `config`.
    pub fn new(namespace: Namespace, config: Config) -> Self {
        let namespace = Arc::new(namespace);
        let storage = Arc::new(CountingStorage::new(MemoryStorage::new(Arc::clone(
            &namespace,
        ))));
        Self {
            db: Database::new(namespace, storage.clone(), config),
            storage,
        }
    }

    /// A database over [`BLOG`].
    pub fn blog() -> Self {
        Self::new(blog_namespace(), Config::default())
    }

    /// A database over [`ZOO`].
    pub fn zoo() -> Self {
        Self::new(zoo_namespace(), Config::default())
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_build() {
        assert_eq!(blog_namespace().len(), 4);
        assert_eq!(zoo_namespace().len(), 4);
        assert!(zoo_namespace().is_subtype("Cat", "Animal"));
    }

    #[test]
    fn blog_round_trips_through_yaml() {
        let ns = blog_namespace();
        let again = Namespace::from_yaml(&ns.to_yaml().unwrap()).unwrap();
        assert_eq!(ns, again);
    }
}
