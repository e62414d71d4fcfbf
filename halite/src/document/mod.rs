mod ids;
mod path;

pub use ids::*;
pub use path::*;

use crate::common::Value;
use crate::errors::{ErrorKind, HaliteError, HaliteResult};
use indexmap::IndexMap;
use std::fmt::{Debug, Formatter};

pub mod modify;

/// Represents a document: an insertion-ordered mapping from string keys to
/// [Value]s.
///
/// Documents are composed of key-value pairs. The key is always a [String]
/// and the value is a [Value]. Key order is the declaration order, which is
/// semantically significant: update modifiers apply in declaration order and
/// document comparison walks (key, value) pairs in sequence.
///
/// Keys are plain strings; nested values are addressed with dotted paths via
/// [get_path], [set_path] and [remove_path], where integer segments index
/// arrays. Keys containing `.` or beginning with `$` are rejected by
/// [check_document] before a document is persisted.
///
/// The unique primary key lives under `_id` and is assigned on insertion if
/// absent.
///
/// # Examples
///
/// ```ignore
/// let mut doc = doc! {
///     name: "Alice",
///     address: { city: "Paris" },
///     tags: ["a", "b"]
/// };
/// assert_eq!(doc.get("name"), Some(&Value::String("Alice".into())));
/// assert_eq!(get_path(&doc, "address.city"), Value::String("Paris".into()));
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Document {
    data: IndexMap<String, Value>,
}

impl Document {
    /// Creates a new empty document.
    pub fn new() -> Self {
        Document {
            data: IndexMap::new(),
        }
    }

    /// Checks if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of top-level entries in the document.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Associates the specified [Value] with the specified key.
    ///
    /// If the key already exists its value is replaced in place, keeping its
    /// position in the declaration order. The key is stored literally; dotted
    /// keys are not split (use [set_path] to write through a dotted path).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty.
    pub fn put<T: Into<Value>>(&mut self, key: impl Into<String>, value: T) -> HaliteResult<()> {
        let key = key.into();
        if key.is_empty() {
            log::error!("Document does not support empty key");
            return Err(HaliteError::new(
                "Document does not support empty key",
                ErrorKind::InvalidOperation,
            ));
        }
        self.data.insert(key, value.into());
        Ok(())
    }

    /// Returns the value associated with the key, or `None` if absent.
    ///
    /// The key is looked up literally; use [get_path] for dotted-path reads.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.data.get_mut(key)
    }

    /// Removes the key and its value from the document, preserving the
    /// relative order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    /// Checks if the document contains the given top-level key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns an iterator over (key, value) pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Returns an iterator over the document's keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    /// Returns the primary key of this document, if assigned.
    pub fn id(&self) -> Option<&str> {
        self.data.get(crate::common::DOC_ID).and_then(Value::as_str)
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.data.iter()).finish()
    }
}

/// Validates a document for persistence: every key, recursively, must not
/// contain the field separator and must not begin with `$`.
///
/// # Errors
///
/// Returns an [ErrorKind::InvalidDocument] error naming the offending key.
pub fn check_document(doc: &Document) -> HaliteResult<()> {
    for (key, value) in doc.iter() {
        if key.starts_with('$') {
            log::error!("Field name {} begins with the $ character", key);
            return Err(HaliteError::new(
                &format!("Field names cannot begin with the $ character: {}", key),
                ErrorKind::InvalidDocument,
            ));
        }
        if key.contains(crate::common::FIELD_SEPARATOR) {
            log::error!("Field name {} contains a .", key);
            return Err(HaliteError::new(
                &format!("Field names cannot contain a .: {}", key),
                ErrorKind::InvalidDocument,
            ));
        }
        check_value(value)?;
    }
    Ok(())
}

fn check_value(value: &Value) -> HaliteResult<()> {
    match value {
        Value::Document(doc) => check_document(doc),
        Value::Array(values) => {
            for value in values {
                check_value(value)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Normalizes a stringified macro key, stripping surrounding quotes so that
/// both identifier and string-literal keys work in `doc!`.
pub fn normalize(key: &str) -> String {
    key.trim_matches('"').to_string()
}

/// Creates a [Document] from a sequence of key-value pairs.
///
/// Keys can be identifiers or string literals; values can be literals,
/// parenthesized expressions, nested `{ .. }` documents or `[ .. ]` arrays.
///
/// # Examples
///
/// ```ignore
/// let simple = doc! { name: "Alice", age: 30 };
///
/// let complex = doc! {
///     user: {
///         name: "Charlie",
///         tags: ["admin", "user"]
///     },
///     values: [1, 2, 3]
/// };
/// ```
#[macro_export]
macro_rules! doc {
    // match an empty document (with braces)
    ({}) => {
        $crate::document::Document::new()
    };

    // match an empty document
    () => {
        $crate::document::Document::new()
    };

    // match a document with key value pairs (outer braces)
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::doc!($($key : $value),*)
    };

    // match a document with key value pairs
    ($($key:tt : $value:tt),* $(,)?) => {
        {
            #[allow(unused_imports)]
            use $crate::doc_value;

            let mut doc = $crate::document::Document::new();
            $(
                doc.put($crate::document::normalize(stringify!($key)), $crate::doc_value!($value))
                    .expect(&format!("Failed to put value {} in document", stringify!($value)));
            )*
            doc
        }
    };
}

/// Helper macro to convert values for the doc! macro.
/// Handles nested documents, arrays, and expressions.
#[macro_export]
macro_rules! doc_value {
    // match a nested document
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
    };

    // match an array of values
    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    // match an expression (variable, literal, arithmetic in parens, etc.)
    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::val;

    fn set_up() -> Document {
        doc! {
            score: 1034,
            location: {
                state: "NY",
                city: "New York",
                address: {
                    line1: "40",
                    zip: 10001,
                },
            },
            category: ["food", "produce", "grocery"],
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("\"ABC\""), "ABC");
        assert_eq!(normalize("ABC"), "ABC");
    }

    #[test]
    fn test_new_is_empty() {
        let doc = Document::new();
        assert!(doc.is_empty());
        assert_eq!(doc.len(), 0);
    }

    #[test]
    fn test_doc_macro() {
        let doc = set_up();
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.get("score"), Some(&val!(1034)));
        let location = doc.get("location").and_then(|v| v.as_document()).unwrap();
        assert_eq!(location.get("state"), Some(&val!("NY")));
        let category = doc.get("category").and_then(|v| v.as_array()).unwrap();
        assert_eq!(category.len(), 3);
    }

    #[test]
    fn test_doc_macro_string_keys() {
        let doc = doc! { "first name": "John", "_id": "abc" };
        assert_eq!(doc.get("first name"), Some(&val!("John")));
        assert_eq!(doc.id(), Some("abc"));
    }

    #[test]
    fn test_put_replaces_in_place() {
        let mut doc = doc! { a: 1, b: 2 };
        doc.put("a", 3).unwrap();
        let keys: Vec<&String> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(doc.get("a"), Some(&val!(3)));
    }

    #[test]
    fn test_put_empty_key_fails() {
        let mut doc = Document::new();
        let result = doc.put("", 1);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            &crate::errors::ErrorKind::InvalidOperation
        );
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut doc = doc! { a: 1, b: 2, c: 3 };
        assert_eq!(doc.remove("b"), Some(val!(2)));
        let keys: Vec<&String> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(doc.remove("missing"), None);
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let doc = doc! { z: 1, a: 2, m: 3 };
        let keys: Vec<&String> = doc.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_check_document_accepts_plain_keys() {
        let doc = set_up();
        assert!(check_document(&doc).is_ok());
    }

    #[test]
    fn test_check_document_rejects_dollar_keys() {
        let doc = doc! { "$bad": 1 };
        let err = check_document(&doc).unwrap_err();
        assert_eq!(err.kind(), &crate::errors::ErrorKind::InvalidDocument);
    }

    #[test]
    fn test_check_document_rejects_dotted_keys() {
        let doc = doc! { "a.b": 1 };
        let err = check_document(&doc).unwrap_err();
        assert_eq!(err.kind(), &crate::errors::ErrorKind::InvalidDocument);
    }

    #[test]
    fn test_check_document_recurses_into_nested_values() {
        let mut inner = Document::new();
        inner.put("$nested", 1).unwrap();
        let mut doc = Document::new();
        doc.put("outer", inner).unwrap();
        assert!(check_document(&doc).is_err());

        let mut in_array = Document::new();
        in_array.put("a.b", 1).unwrap();
        let mut doc = Document::new();
        doc.put("list", vec![Value::Document(in_array)]).unwrap();
        assert!(check_document(&doc).is_err());
    }

    #[test]
    fn test_document_equality_ignores_key_order() {
        let a = doc! { x: 1, y: 2 };
        let b = doc! { y: 2, x: 1 };
        assert_eq!(a, b);
    }
}
