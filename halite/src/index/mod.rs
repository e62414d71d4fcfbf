//! Ordered secondary indexes.
//!
//! An [Index] is an ordered multimap from a field's value to the documents
//! carrying that value, backed by a balanced tree under the store's total
//! order. Array-valued fields expand to one entry per distinct element.
//! Every mutation is rollback-capable: a failed insert, update or batch
//! update leaves the tree exactly as it was before the call.

use crate::common::Value;
use crate::document::{get_path, Document};
use crate::errors::{ErrorKind, HaliteError, HaliteResult};
use smallvec::{smallvec, SmallVec};
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

type Bucket = SmallVec<[Document; 1]>;
type KeySet = SmallVec<[Value; 1]>;

/// Range bounds for an index scan, extracted from the `$lt`/`$lte`/`$gt`/
/// `$gte` operators of a query entry.
#[derive(Clone, Debug)]
pub struct Bounds {
    lower: Bound<Value>,
    upper: Bound<Value>,
}

impl Bounds {
    /// Extracts range bounds from an operator object. Returns `None` when no
    /// range operator is present.
    pub fn from_operators(operators: &Document) -> Option<Bounds> {
        let mut lower = Bound::Unbounded;
        let mut upper = Bound::Unbounded;
        let mut found = false;
        for (operator, operand) in operators.iter() {
            match operator.as_str() {
                "$gt" => {
                    lower = Bound::Excluded(operand.clone());
                    found = true;
                }
                "$gte" => {
                    lower = Bound::Included(operand.clone());
                    found = true;
                }
                "$lt" => {
                    upper = Bound::Excluded(operand.clone());
                    found = true;
                }
                "$lte" => {
                    upper = Bound::Included(operand.clone());
                    found = true;
                }
                _ => {}
            }
        }
        if found {
            Some(Bounds { lower, upper })
        } else {
            None
        }
    }

    /// True when the bounds describe an empty interval.
    fn is_empty_interval(&self) -> bool {
        let lower = match &self.lower {
            Bound::Unbounded => return false,
            Bound::Included(v) | Bound::Excluded(v) => v,
        };
        let upper = match &self.upper {
            Bound::Unbounded => return false,
            Bound::Included(v) | Bound::Excluded(v) => v,
        };
        match lower.cmp(upper) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => {
                matches!(self.lower, Bound::Excluded(_)) || matches!(self.upper, Bound::Excluded(_))
            }
            std::cmp::Ordering::Less => false,
        }
    }
}

/// An ordered keyed multimap over one document field.
///
/// Carries the *unique* flag (at most one document per key) and the *sparse*
/// flag (documents whose field reads undefined are not indexed). Non-sparse
/// indexes store documents lacking the field under the undefined key, which
/// is the lowest key in the total order.
pub struct Index {
    field: String,
    unique: bool,
    sparse: bool,
    tree: BTreeMap<Value, Bucket>,
}

impl Index {
    pub fn new(field: impl Into<String>, unique: bool, sparse: bool) -> Self {
        Index {
            field: field.into(),
            unique,
            sparse,
            tree: BTreeMap::new(),
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    /// Number of (key, document) entries in the index. A document indexed
    /// under several distinct array elements counts once per element.
    pub fn size(&self) -> usize {
        self.tree.values().map(|bucket| bucket.len()).sum()
    }

    /// The keys this document occupies: the value at the indexed field, or
    /// its distinct elements when that value is an array. `None` means the
    /// document does not participate in this index.
    fn keys_for(&self, doc: &Document) -> Option<KeySet> {
        let key = get_path(doc, &self.field);
        if key.is_undefined() && self.sparse {
            return None;
        }
        match key {
            Value::Array(elements) => {
                let mut distinct: KeySet = SmallVec::new();
                for element in elements {
                    if !distinct.contains(&element) {
                        distinct.push(element);
                    }
                }
                Some(distinct)
            }
            other => Some(smallvec![other]),
        }
    }

    /// Inserts a document. On a mid-expansion failure every entry added by
    /// this call is removed before the error propagates.
    pub fn insert(&mut self, doc: &Document) -> HaliteResult<()> {
        let keys = match self.keys_for(doc) {
            Some(keys) => keys,
            None => return Ok(()),
        };
        let mut inserted: KeySet = SmallVec::new();
        for key in keys {
            if let Err(err) = self.insert_one(key.clone(), doc) {
                for done in &inserted {
                    self.remove_one(done, doc);
                }
                return Err(err);
            }
            inserted.push(key);
        }
        Ok(())
    }

    fn insert_one(&mut self, key: Value, doc: &Document) -> HaliteResult<()> {
        if self.unique {
            if let Some(bucket) = self.tree.get(&key) {
                if !bucket.is_empty() {
                    log::error!("Unique constraint violated for field {}", self.field);
                    return Err(HaliteError::new(
                        &format!("Unique constraint violated for field {}", self.field),
                        ErrorKind::UniqueConstraintViolation,
                    ));
                }
            }
        }
        self.tree.entry(key).or_default().push(doc.clone());
        Ok(())
    }

    fn remove_one(&mut self, key: &Value, doc: &Document) {
        if let Some(bucket) = self.tree.get_mut(key) {
            let position = bucket.iter().position(|entry| match (entry.id(), doc.id()) {
                (Some(a), Some(b)) => a == b,
                _ => entry == doc,
            });
            if let Some(position) = position {
                bucket.remove(position);
            }
            if bucket.is_empty() {
                self.tree.remove(key);
            }
        }
    }

    /// Removes a document. Removing a document that is not present is a
    /// no-op.
    pub fn remove(&mut self, doc: &Document) {
        if let Some(keys) = self.keys_for(doc) {
            for key in keys {
                self.remove_one(&key, doc);
            }
        }
    }

    /// Replaces `old_doc` with `new_doc`. If inserting the new document
    /// fails, the old one is restored before the error propagates.
    pub fn update(&mut self, old_doc: &Document, new_doc: &Document) -> HaliteResult<()> {
        self.remove(old_doc);
        if let Err(err) = self.insert(new_doc) {
            if let Err(restore) = self.insert(old_doc) {
                log::error!(
                    "Failed to restore document in index {} after update failure: {}",
                    self.field,
                    restore
                );
            }
            return Err(err);
        }
        Ok(())
    }

    /// Applies a batch of (old, new) replacements in two phases: every old
    /// document is removed, then every new one inserted. If insertion fails
    /// at position `i`, the new documents inserted before `i` are removed
    /// and every old document re-inserted, returning the index to its exact
    /// pre-call state.
    pub fn update_multiple(&mut self, pairs: &[(Document, Document)]) -> HaliteResult<()> {
        for (old_doc, _) in pairs {
            self.remove(old_doc);
        }
        let mut failure = None;
        for (position, (_, new_doc)) in pairs.iter().enumerate() {
            if let Err(err) = self.insert(new_doc) {
                failure = Some((position, err));
                break;
            }
        }
        if let Some((position, err)) = failure {
            for (_, new_doc) in &pairs[..position] {
                self.remove(new_doc);
            }
            for (old_doc, _) in pairs {
                if let Err(restore) = self.insert(old_doc) {
                    log::error!(
                        "Failed to restore document in index {} after batch failure: {}",
                        self.field,
                        restore
                    );
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Applies the inverse of a previously committed [Index::update_multiple],
    /// used to unwind multi-index commits.
    pub fn revert_update(&mut self, pairs: &[(Document, Document)]) {
        for (_, new_doc) in pairs {
            self.remove(new_doc);
        }
        for (old_doc, _) in pairs {
            if let Err(err) = self.insert(old_doc) {
                log::error!(
                    "Failed to restore document in index {} during revert: {}",
                    self.field,
                    err
                );
            }
        }
    }

    /// Documents stored under a key. For an array argument (the `$in` case)
    /// the per-element results are unioned, deduplicated by document
    /// identity.
    pub fn get_matching(&self, value: &Value) -> Vec<Document> {
        match value {
            Value::Array(values) => {
                let mut seen: HashSet<String> = HashSet::new();
                let mut result = Vec::new();
                for member in values {
                    for doc in self.get_matching(member) {
                        match doc.id() {
                            Some(id) => {
                                if seen.insert(id.to_string()) {
                                    result.push(doc);
                                }
                            }
                            None => result.push(doc),
                        }
                    }
                }
                result
            }
            _ => self
                .tree
                .get(value)
                .map(|bucket| bucket.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }

    /// Ordered range scan between the given bounds.
    pub fn get_between_bounds(&self, bounds: &Bounds) -> Vec<Document> {
        if bounds.is_empty_interval() {
            return Vec::new();
        }
        self.tree
            .range((bounds.lower.clone(), bounds.upper.clone()))
            .flat_map(|(_, bucket)| bucket.iter().cloned())
            .collect()
    }

    /// All documents, in key order.
    pub fn get_all(&self) -> Vec<Document> {
        self.tree
            .values()
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, val};

    fn doc_a() -> Document {
        doc! { "_id": "a", n: 1, tags: ["x", "y", "x"] }
    }

    fn doc_b() -> Document {
        doc! { "_id": "b", n: 2 }
    }

    fn doc_c() -> Document {
        doc! { "_id": "c", n: 1 }
    }

    /// In-order serialization of the tree for bit-identical comparisons.
    fn traversal(index: &Index) -> Vec<(Value, Vec<String>)> {
        index
            .tree
            .iter()
            .map(|(key, bucket)| {
                (
                    key.clone(),
                    bucket
                        .iter()
                        .map(|d| d.id().unwrap_or_default().to_string())
                        .collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_insert_and_get_matching() {
        let mut index = Index::new("n", false, false);
        index.insert(&doc_a()).unwrap();
        index.insert(&doc_b()).unwrap();
        index.insert(&doc_c()).unwrap();

        let ones = index.get_matching(&val!(1));
        assert_eq!(ones.len(), 2);
        assert_eq!(index.get_matching(&val!(2)).len(), 1);
        assert!(index.get_matching(&val!(3)).is_empty());
    }

    #[test]
    fn test_unique_violation() {
        let mut index = Index::new("n", true, false);
        index.insert(&doc_a()).unwrap();
        let err = index.insert(&doc_c()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UniqueConstraintViolation);
        // the failed insert left no residue
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn test_sparse_skips_missing_field() {
        let mut index = Index::new("absent", false, true);
        index.insert(&doc_a()).unwrap();
        assert_eq!(index.size(), 0);
        // removing the unindexed document is a no-op
        index.remove(&doc_a());
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_non_sparse_indexes_undefined() {
        let mut index = Index::new("absent", false, false);
        index.insert(&doc_a()).unwrap();
        assert_eq!(index.get_matching(&Value::Undefined).len(), 1);
    }

    #[test]
    fn test_non_sparse_unique_conflicts_on_undefined() {
        let mut index = Index::new("absent", true, false);
        index.insert(&doc_a()).unwrap();
        assert!(index.insert(&doc_b()).is_err());
    }

    #[test]
    fn test_array_expansion_dedupes_elements() {
        let mut index = Index::new("tags", false, false);
        index.insert(&doc_a()).unwrap();
        // tags are ["x", "y", "x"]: one entry under "x", one under "y"
        assert_eq!(index.size(), 2);
        assert_eq!(index.get_matching(&val!("x")).len(), 1);
        assert_eq!(index.get_matching(&val!("y")).len(), 1);
    }

    #[test]
    fn test_empty_array_is_not_indexed() {
        let mut index = Index::new("tags", false, false);
        index.insert(&doc! { "_id": "e", tags: [] }).unwrap();
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_array_expansion_rolls_back_on_failure() {
        let mut index = Index::new("tags", true, false);
        index.insert(&doc! { "_id": "1", tags: ["y"] }).unwrap();
        let before = traversal(&index);

        // "x" inserts fine, then "y" conflicts; the "x" entry must be undone
        let err = index
            .insert(&doc! { "_id": "2", tags: ["x", "y"] })
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UniqueConstraintViolation);
        assert_eq!(traversal(&index), before);
    }

    #[test]
    fn test_remove_then_insert_restores_traversal() {
        let mut index = Index::new("n", false, false);
        index.insert(&doc_a()).unwrap();
        index.insert(&doc_b()).unwrap();
        let before = traversal(&index);

        index.remove(&doc_b());
        index.insert(&doc_b()).unwrap();
        assert_eq!(traversal(&index), before);
    }

    #[test]
    fn test_update_moves_document() {
        let mut index = Index::new("n", false, false);
        index.insert(&doc_b()).unwrap();
        let updated = doc! { "_id": "b", n: 9 };
        index.update(&doc_b(), &updated).unwrap();
        assert!(index.get_matching(&val!(2)).is_empty());
        assert_eq!(index.get_matching(&val!(9)).len(), 1);
    }

    #[test]
    fn test_update_restores_old_doc_on_failure() {
        let mut index = Index::new("n", true, false);
        index.insert(&doc_a()).unwrap();
        index.insert(&doc_b()).unwrap();
        let before = traversal(&index);

        // moving b onto n=1 collides with a
        let err = index.update(&doc_b(), &doc! { "_id": "b", n: 1 }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UniqueConstraintViolation);
        assert_eq!(traversal(&index), before);
    }

    #[test]
    fn test_update_multiple_commits_all_pairs() {
        let mut index = Index::new("n", false, false);
        index.insert(&doc_a()).unwrap();
        index.insert(&doc_b()).unwrap();

        let pairs = vec![
            (doc_a(), doc! { "_id": "a", n: 10 }),
            (doc_b(), doc! { "_id": "b", n: 20 }),
        ];
        index.update_multiple(&pairs).unwrap();
        assert_eq!(index.get_matching(&val!(10)).len(), 1);
        assert_eq!(index.get_matching(&val!(20)).len(), 1);
        assert!(index.get_matching(&val!(1)).is_empty());
    }

    #[test]
    fn test_update_multiple_rolls_back_to_pre_call_state() {
        let mut index = Index::new("n", true, false);
        index.insert(&doc_a()).unwrap();
        index.insert(&doc_b()).unwrap();
        let blocker = doc! { "_id": "z", n: 50 };
        index.insert(&blocker).unwrap();
        let before = traversal(&index);

        // first pair lands on a fresh key, second collides with the blocker
        let pairs = vec![
            (doc_a(), doc! { "_id": "a", n: 10 }),
            (doc_b(), doc! { "_id": "b", n: 50 }),
        ];
        let err = index.update_multiple(&pairs).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UniqueConstraintViolation);
        assert_eq!(traversal(&index), before);
    }

    #[test]
    fn test_revert_update_is_the_inverse_of_update_multiple() {
        let mut index = Index::new("n", false, false);
        index.insert(&doc_a()).unwrap();
        index.insert(&doc_b()).unwrap();
        let before = traversal(&index);

        let pairs = vec![
            (doc_a(), doc! { "_id": "a", n: 10 }),
            (doc_b(), doc! { "_id": "b", n: 20 }),
        ];
        index.update_multiple(&pairs).unwrap();
        index.revert_update(&pairs);
        assert_eq!(traversal(&index), before);
    }

    #[test]
    fn test_get_matching_array_unions_and_dedupes() {
        let mut index = Index::new("tags", false, false);
        index.insert(&doc_a()).unwrap();
        // doc a is indexed under both "x" and "y"; the $in union reports it once
        let result = index.get_matching(&Value::Array(vec![val!("x"), val!("y")]));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id(), Some("a"));
    }

    #[test]
    fn test_get_between_bounds() {
        let mut index = Index::new("n", false, false);
        for (id, n) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            index.insert(&doc! { "_id": id, n: n }).unwrap();
        }

        let bounds = Bounds::from_operators(&doc! { "$gte": 2, "$lt": 4 }).unwrap();
        let result = index.get_between_bounds(&bounds);
        let ids: Vec<&str> = result.iter().filter_map(|d| d.id()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let bounds = Bounds::from_operators(&doc! { "$gt": 4 }).unwrap();
        assert!(index.get_between_bounds(&bounds).is_empty());
    }

    #[test]
    fn test_get_between_bounds_empty_interval() {
        let mut index = Index::new("n", false, false);
        index.insert(&doc_b()).unwrap();
        let bounds = Bounds::from_operators(&doc! { "$gt": 5, "$lt": 3 }).unwrap();
        assert!(index.get_between_bounds(&bounds).is_empty());
        let bounds = Bounds::from_operators(&doc! { "$gt": 3, "$lt": 3 }).unwrap();
        assert!(index.get_between_bounds(&bounds).is_empty());
    }

    #[test]
    fn test_bounds_from_operators_none_without_range() {
        assert!(Bounds::from_operators(&doc! { "$ne": 1 }).is_none());
        assert!(Bounds::from_operators(&doc! {}).is_none());
    }

    #[test]
    fn test_get_all_in_key_order() {
        let mut index = Index::new("n", false, false);
        index.insert(&doc! { "_id": "hi", n: 9 }).unwrap();
        index.insert(&doc! { "_id": "lo", n: 1 }).unwrap();
        let docs = index.get_all();
        let ids: Vec<&str> = docs.iter().filter_map(|d| d.id()).collect();
        assert_eq!(ids, vec!["lo", "hi"]);
    }
}
