mod matcher;

pub use matcher::*;

use crate::document::Document;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A callable predicate attached to a query through `$where` semantics.
pub type WherePredicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// A query against a store.
///
/// The bulk of a query is a data-driven specification [Document]: top-level
/// keys are either logical combinators (`$or`, `$and`, `$nor`) over arrays
/// of sub-queries, or dotted field paths mapped to a plain value (direct
/// equality) or to an object of comparison operators (`$lt`, `$lte`, `$gt`,
/// `$gte`, `$ne`, `$in`, `$nin`, `$exists`, `$regex`, `$size`,
/// `$elemMatch`).
///
/// Since the value model carries no function type, `$where` predicates are
/// attached with [Query::and_where] instead of riding inside the
/// specification document.
///
/// # Examples
///
/// ```ignore
/// // every planet heavier than 100 units
/// let query: Query = doc! { mass: { "$gt": 100 } }.into();
///
/// // with a callable predicate
/// let query = Query::new(doc! { kind: "planet" })
///     .and_where(|doc| doc.get("name").is_some());
/// ```
#[derive(Clone, Default)]
pub struct Query {
    pub(crate) spec: Document,
    pub(crate) predicates: Vec<WherePredicate>,
}

impl Query {
    /// Creates a query from a specification document.
    pub fn new(spec: Document) -> Self {
        Query {
            spec,
            predicates: Vec::new(),
        }
    }

    /// Attaches a predicate evaluated against each candidate document after
    /// the specification matches. All attached predicates must accept a
    /// document for it to match.
    pub fn and_where<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// The data-driven part of the query.
    pub fn spec(&self) -> &Document {
        &self.spec
    }
}

impl From<Document> for Query {
    fn from(spec: Document) -> Self {
        Query::new(spec)
    }
}

impl Debug for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("spec", &self.spec)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
