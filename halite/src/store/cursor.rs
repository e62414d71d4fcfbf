//! Deferred queries.
//!
//! A [Cursor] is a query bound to a store together with optional skip,
//! limit, sort and projection settings. Nothing runs until a finisher
//! (`exec`, `count`, `first`) pushes the execution onto the store's
//! executor.

use super::{DataStore, DataStoreInner};
use crate::common::{SortOrder, Value, DOC_ID};
use crate::document::{get_path, remove_path, set_path, Document};
use crate::errors::{ErrorKind, HaliteError, HaliteResult};
use crate::filter::{matches, Query};
use std::cmp::Ordering;

/// A deferred query with fluent builders.
///
/// # Examples
///
/// ```ignore
/// let second_smallest = store
///     .find(doc! {})
///     .sort(doc! { n: 1 })
///     .skip(1)
///     .limit(1)
///     .exec()?;
/// ```
pub struct Cursor {
    store: DataStore,
    query: Query,
    skip: Option<usize>,
    limit: Option<usize>,
    sort_spec: Option<Document>,
    projection: Option<Document>,
}

impl Cursor {
    pub(crate) fn new(store: DataStore, query: Query) -> Cursor {
        Cursor {
            store,
            query,
            skip: None,
            limit: None,
            sort_spec: None,
            projection: None,
        }
    }

    /// Sorts the results by the given specification: a mapping from dotted
    /// paths to `1` (ascending) or `-1` (descending), applied in
    /// declaration order. String comparisons use the store's comparator.
    pub fn sort(mut self, spec: Document) -> Self {
        self.sort_spec = Some(spec);
        self
    }

    /// Skips the first `n` matching documents.
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    /// Limits the result to at most `n` documents.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Projects each result: `{path: 1}` keeps only the named paths
    /// (plus `_id` unless excluded with `_id: 0`), `{path: 0}` omits the
    /// named paths. Mixing both styles fails at execution time.
    pub fn projection(mut self, spec: Document) -> Self {
        self.projection = Some(spec);
        self
    }

    /// Executes the query through the store's executor and returns the
    /// matching documents.
    pub fn exec(self) -> HaliteResult<Vec<Document>> {
        let store = self.store.clone();
        store.execute(move |inner| execute_plan(inner, &self))
    }

    /// Executes the query and returns the number of matching documents
    /// (after skip and limit).
    pub fn count(mut self) -> HaliteResult<usize> {
        self.projection = None;
        Ok(self.exec()?.len())
    }

    /// Executes the query and returns the first result, if any.
    pub fn first(self) -> HaliteResult<Option<Document>> {
        let mut docs = self.limit(1).exec()?;
        if docs.is_empty() {
            Ok(None)
        } else {
            Ok(Some(docs.remove(0)))
        }
    }
}

fn execute_plan(inner: &DataStoreInner, cursor: &Cursor) -> HaliteResult<Vec<Document>> {
    let candidates = inner.get_candidates(&cursor.query, false)?;
    let skip = cursor.skip.unwrap_or(0);

    let mut results = Vec::new();
    match &cursor.sort_spec {
        None => {
            // skip and limit apply during the scan; limit terminates it early
            let mut skipped = 0;
            for candidate in candidates {
                if matches(&candidate, &cursor.query)? {
                    if skipped < skip {
                        skipped += 1;
                        continue;
                    }
                    results.push(candidate);
                    if let Some(limit) = cursor.limit {
                        if results.len() >= limit {
                            break;
                        }
                    }
                }
            }
        }
        Some(spec) => {
            let keys = parse_sort_spec(spec)?;
            for candidate in candidates {
                if matches(&candidate, &cursor.query)? {
                    results.push(candidate);
                }
            }
            let comparator = inner.compare_strings.as_ref();
            results.sort_by(|a, b| {
                for (path, order) in &keys {
                    let left = get_path(a, path);
                    let right = get_path(b, path);
                    let ordering = match order {
                        SortOrder::Ascending => left.cmp_with(&right, comparator),
                        SortOrder::Descending => right.cmp_with(&left, comparator),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
            results = results
                .into_iter()
                .skip(skip)
                .take(cursor.limit.unwrap_or(usize::MAX))
                .collect();
        }
    }

    match &cursor.projection {
        Some(projection) => results
            .iter()
            .map(|doc| project(doc, projection))
            .collect(),
        None => Ok(results),
    }
}

fn parse_sort_spec(spec: &Document) -> HaliteResult<Vec<(String, SortOrder)>> {
    let mut keys = Vec::with_capacity(spec.len());
    for (path, direction) in spec.iter() {
        let order = direction
            .as_number()
            .and_then(SortOrder::from_direction)
            .ok_or_else(|| {
                log::error!("Sort direction for {} must be 1 or -1", path);
                HaliteError::new(
                    &format!("Sort direction for {} must be 1 or -1", path),
                    ErrorKind::FilterError,
                )
            })?;
        keys.push((path.clone(), order));
    }
    Ok(keys)
}

/// Applies a projection specification to one document.
pub(crate) fn project(doc: &Document, projection: &Document) -> HaliteResult<Document> {
    if projection.is_empty() {
        return Ok(doc.clone());
    }

    let mut keep: Option<bool> = None;
    let mut keep_id = true;
    for (path, value) in projection.iter() {
        let included = match value.as_integer() {
            Some(0) => false,
            Some(1) => true,
            _ => {
                log::error!("Projection values must be 0 or 1");
                return Err(HaliteError::new(
                    "Projection values must be 0 or 1",
                    ErrorKind::FilterError,
                ));
            }
        };
        if path == DOC_ID {
            keep_id = included;
            continue;
        }
        match keep {
            None => keep = Some(included),
            Some(style) if style != included => {
                log::error!("Cannot both keep and omit fields except for _id");
                return Err(HaliteError::new(
                    "Cannot both keep and omit fields except for _id",
                    ErrorKind::InconsistentProjection,
                ));
            }
            _ => {}
        }
    }

    match keep {
        // only _id appeared in the projection
        None => {
            let mut projected = doc.clone();
            if !keep_id {
                projected.remove(DOC_ID);
            }
            Ok(projected)
        }
        Some(true) => {
            let mut projected = Document::new();
            if keep_id {
                if let Some(id) = doc.get(DOC_ID) {
                    projected.put(DOC_ID, id.clone())?;
                }
            }
            for (path, value) in projection.iter() {
                if path == DOC_ID || value.as_integer() != Some(1) {
                    continue;
                }
                let read = get_path(doc, path);
                if read.is_defined() {
                    set_path(&mut projected, path, read)?;
                }
            }
            Ok(projected)
        }
        Some(false) => {
            let mut projected = doc.clone();
            for (path, _) in projection.iter() {
                if path == DOC_ID {
                    continue;
                }
                remove_path(&mut projected, path);
            }
            if !keep_id {
                projected.remove(DOC_ID);
            }
            Ok(projected)
        }
    }
}
