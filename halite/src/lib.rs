#![allow(dead_code, unused_imports)]
//! # Halite - Embeddable In-Memory Document Store
//!
//! Halite is a lightweight, embeddable document store written in Rust. It
//! holds a collection of JSON-like documents in memory, speaks a
//! MongoDB-flavoured query and update language, and maintains ordered
//! secondary indexes over document fields.
//!
//! ## Key Features
//!
//! - **Embedded**: No separate server process required
//! - **Document Model**: Recursive values with a cross-type total order,
//!   dotted-path addressing and structural equality
//! - **Rich Querying**: Logical combinators, comparison operators, regular
//!   expressions, array matching and callable predicates
//! - **Update Modifiers**: `$set`, `$unset`, `$inc`, `$min`, `$max`,
//!   `$push` (with `$each`/`$slice`/`$sort`), `$pop`, `$addToSet`, `$pull`
//! - **Indexing**: Unique and sparse ordered indexes, including over
//!   array-valued and dotted fields, with all-or-nothing batch commits
//! - **Serialised Writes**: A single-consumer task queue gives every
//!   mutation atomicity and a defined interleaving with reads
//! - **Pluggable Persistence**: An external collaborator receives every
//!   committed change and replays them on load
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use halite::store::{DataStore, StoreOptions, UpdateOptions};
//! use halite::doc;
//!
//! # fn main() -> halite::errors::HaliteResult<()> {
//! let store = DataStore::open(StoreOptions::new())?;
//!
//! store.insert(doc! { name: "Mars", kind: "planet", moons: 2 })?;
//! store.insert(doc! { name: "Earth", kind: "planet", moons: 1 })?;
//!
//! // find planets with at least one moon, heaviest first
//! let planets = store
//!     .find(doc! { moons: { "$gte": 1 } })
//!     .sort(doc! { moons: (-1) })
//!     .exec()?;
//!
//! store.update(
//!     doc! { name: "Mars" },
//!     doc! { "$inc": { moons: 1 } },
//!     UpdateOptions::new(),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`common`] - Values, the total order, shared helpers and constants
//! - [`document`] - Documents, dotted paths, validation, update modifiers
//! - [`errors`] - Error types and result definitions
//! - [`filter`] - Queries and predicate matching
//! - [`index`] - Ordered secondary indexes
//! - [`executor`] - The serial task queue
//! - [`persistence`] - Persistence collaborator and storage interfaces
//! - [`store`] - The store facade and cursors

pub mod common;
pub mod document;
pub mod errors;
pub mod executor;
pub mod filter;
pub mod index;
pub mod persistence;
pub mod store;

pub use common::{
    atomic, Atomic, ReadExecutor, SortOrder, StringComparator, Value, WriteExecutor,
};
pub use document::Document;
pub use errors::{ErrorKind, HaliteError, HaliteResult};
pub use filter::Query;
pub use store::{
    Cursor, DataStore, IndexOptions, StoreOptions, UpdateOptions, UpdateResult,
};
