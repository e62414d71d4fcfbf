use crate::document::Document;
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Caller-supplied string comparison, overriding the default lexicographic
/// code-point order inside the string bucket of the total order. Applied by
/// cursor sorting; index trees always use the default order.
pub type StringComparator = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// Compare two floats under the total order used for tree keys and sorting.
/// NaN is ordered above every other number and equal to itself, so that the
/// ordering stays lawful for container keys.
#[inline]
fn num_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compare two floats for the ordering-consistent equality used by tree keys
/// and array-element deduplication. Distinct from [`values_equal`], where
/// NaN never equals anything.
#[inline]
fn num_eq(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        true
    } else {
        a == b
    }
}

/// A single value stored inside a [Document]. It can be a scalar like
/// [Value::Number] or [Value::String], or a compound value like
/// [Value::Array] or [Value::Document].
///
/// # Variants
/// - `Undefined`: the result of reading a missing path; lowest in the total
///   order and never stored inside a persisted document
/// - `Null`: an explicit null
/// - `Bool(bool)`: boolean true/false
/// - `Number(f64)`: IEEE-754 double, the single numeric type of the model
/// - `String(String)`: text value
/// - `DateTime(i64)`: millisecond-precision instant (epoch milliseconds)
/// - `Array(Vec<Value>)`: ordered collection of values
/// - `Document(Document)`: nested document
///
/// # Ordering
/// `Value` carries the store's total order: values are first ranked by type
/// bucket (`Undefined < Null < Number < String < Bool < DateTime < Array <
/// Document`), then compared within the bucket. The same order drives index
/// trees, range queries, comparison operators and sorting.
///
/// # Usage
/// Create values using the `From` trait or the `val!` macro:
/// ```ignore
/// let v1: Value = 42.into();
/// let v2 = Value::from("hello");
/// let v3 = val!(true);
/// ```
#[derive(Clone, Default)]
pub enum Value {
    /// The value read at a missing path. Lowest in the total order.
    Undefined,
    /// Represents a null value.
    #[default]
    Null,
    /// Represents a boolean value.
    Bool(bool),
    /// Represents a numeric value (IEEE-754 double).
    Number(f64),
    /// Represents a string value.
    String(String),
    /// Represents a millisecond-precision instant.
    DateTime(i64),
    /// Represents an array value.
    Array(Vec<Value>),
    /// Represents a nested document.
    Document(Document),
}

impl Value {
    /// Rank of the value's type bucket in the cross-type total order.
    #[inline]
    fn type_order(&self) -> u8 {
        match self {
            Value::Undefined => 0,
            Value::Null => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Bool(_) => 4,
            Value::DateTime(_) => 5,
            Value::Array(_) => 6,
            Value::Document(_) => 7,
        }
    }

    /// Compares two values under the total order, with an optional
    /// caller-supplied comparator for the string bucket.
    ///
    /// The comparator only affects direct string-to-string comparison (and
    /// the keys of compared documents); every other bucket uses its natural
    /// order. Pass `None` for the default lexicographic code-point order.
    pub fn cmp_with(&self, other: &Value, comparator: Option<&StringComparator>) -> Ordering {
        let rank = self.type_order().cmp(&other.type_order());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Value::Undefined, Value::Undefined) => Ordering::Equal,
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => num_cmp(*a, *b),
            (Value::String(a), Value::String(b)) => match comparator {
                Some(compare) => compare(a, b),
                None => a.cmp(b),
            },
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.cmp_with(y, comparator);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Document(a), Value::Document(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let key_ord = match comparator {
                        Some(compare) => compare(ka, kb),
                        None => ka.cmp(kb),
                    };
                    if key_ord != Ordering::Equal {
                        return key_ord;
                    }
                    let val_ord = va.cmp_with(vb, comparator);
                    if val_ord != Ordering::Equal {
                        return val_ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            // unreachable: ranks already matched
            _ => Ordering::Equal,
        }
    }

    /// Checks if the value is defined (anything but [Value::Undefined]).
    #[inline]
    pub fn is_defined(&self) -> bool {
        !matches!(self, Value::Undefined)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    #[inline]
    pub fn is_datetime(&self) -> bool {
        matches!(self, Value::DateTime(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    #[inline]
    pub fn is_document(&self) -> bool {
        matches!(self, Value::Document(_))
    }

    /// Checks if the value is a scalar usable for a direct index lookup:
    /// null, boolean, number, string or timestamp.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::Bool(_)
                | Value::Number(_)
                | Value::String(_)
                | Value::DateTime(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as an integer when it is a number with no
    /// fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<i64> {
        match self {
            Value::DateTime(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }
}

/// Structural query equality: the rule behind direct-value matching, `$in`
/// membership, `$addToSet` deduplication and unique-conflict tests.
///
/// Unlike the ordering-consistent `PartialEq`, NaN never equals anything,
/// including itself. Timestamps are equal iff they denote the same instant.
/// Documents compare without regard to key order.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => true,
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => !x.is_nan() && !y.is_nan() && x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::DateTime(x), Value::DateTime(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(u, v)| values_equal(u, v))
        }
        (Value::Document(x), Value::Document(y)) => {
            x.len() == y.len()
                && x.iter().all(|(key, xv)| match y.get(key) {
                    Some(yv) => values_equal(xv, yv),
                    None => false,
                })
        }
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => num_eq(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_with(other, None)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::DateTime(ms) => write!(f, "DateTime({})", ms),
            Value::Array(values) => f.debug_list().entries(values.iter()).finish(),
            Value::Document(doc) => Debug::fmt(doc, f),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl From<SystemTime> for Value {
    fn from(value: SystemTime) -> Self {
        let millis = value
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Value::DateTime(millis)
    }
}

/// A macro to create a `Value` from a given expression.
///
/// This macro simplifies the creation of `Value` instances by automatically
/// converting the provided expression into a `Value` using the `From` trait.
///
/// # Examples
///
/// ```rust
/// use halite::common::Value;
/// use halite::val;
///
/// let int_value = val!(42);
/// assert_eq!(int_value, Value::Number(42.0));
///
/// let string_value = val!("hello");
/// assert_eq!(string_value, Value::String("hello".to_string()));
/// ```
#[macro_export]
macro_rules! val {
    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_type_bucket_order() {
        // undefined < null < 0 < "" < false < true < earliest timestamp < [] < {}
        let ladder = vec![
            Value::Undefined,
            Value::Null,
            Value::Number(0.0),
            Value::String("".to_string()),
            Value::Bool(false),
            Value::Bool(true),
            Value::DateTime(i64::MIN),
            Value::Array(vec![]),
            Value::Document(Document::new()),
        ];
        for window in ladder.windows(2) {
            assert_eq!(
                window[0].cmp(&window[1]),
                Ordering::Less,
                "{:?} should sort below {:?}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn test_number_order() {
        assert_eq!(val!(1).cmp(&val!(2)), Ordering::Less);
        assert_eq!(val!(2.5).cmp(&val!(2.5)), Ordering::Equal);
        assert_eq!(val!(-1).cmp(&val!(-2)), Ordering::Greater);
    }

    #[test]
    fn test_nan_orders_above_numbers() {
        assert_eq!(val!(f64::NAN).cmp(&val!(f64::MAX)), Ordering::Greater);
        assert_eq!(val!(f64::NAN).cmp(&val!(f64::NAN)), Ordering::Equal);
    }

    #[test]
    fn test_nan_never_query_equal() {
        assert!(!values_equal(&val!(f64::NAN), &val!(f64::NAN)));
        // but ordering equality holds, so NaN stays lawful as a tree key
        assert_eq!(val!(f64::NAN), val!(f64::NAN));
    }

    #[test]
    fn test_string_order_default() {
        assert_eq!(val!("abc").cmp(&val!("abd")), Ordering::Less);
        assert_eq!(val!("b").cmp(&val!("a")), Ordering::Greater);
    }

    #[test]
    fn test_string_order_with_comparator() {
        // reverse comparator flips string ordering only
        let reverse: StringComparator = Arc::new(|a, b| b.cmp(a));
        assert_eq!(
            val!("a").cmp_with(&val!("b"), Some(&reverse)),
            Ordering::Greater
        );
        // other buckets unaffected
        assert_eq!(val!(1).cmp_with(&val!(2), Some(&reverse)), Ordering::Less);
    }

    #[test]
    fn test_array_order_elementwise_then_length() {
        let short = Value::Array(vec![val!(1), val!(2)]);
        let long = Value::Array(vec![val!(1), val!(2), val!(3)]);
        let bigger = Value::Array(vec![val!(1), val!(3)]);
        assert_eq!(short.cmp(&long), Ordering::Less);
        assert_eq!(short.cmp(&bigger), Ordering::Less);
        assert_eq!(bigger.cmp(&long), Ordering::Greater);
    }

    #[test]
    fn test_document_order_by_pairs_then_length() {
        let a = Value::Document(doc! { a: 1 });
        let b = Value::Document(doc! { a: 2 });
        let c = Value::Document(doc! { a: 1, b: 1 });
        assert_eq!(a.cmp(&b), Ordering::Less);
        assert_eq!(a.cmp(&c), Ordering::Less);
    }

    #[test]
    fn test_values_equal_structural() {
        assert!(values_equal(&val!(1), &val!(1.0)));
        assert!(!values_equal(&val!(1), &val!("1")));
        assert!(values_equal(&Value::DateTime(42), &Value::DateTime(42)));
        assert!(!values_equal(&Value::DateTime(42), &val!(42)));
        assert!(values_equal(
            &Value::Array(vec![val!(1), val!("x")]),
            &Value::Array(vec![val!(1), val!("x")])
        ));
        assert!(!values_equal(
            &Value::Array(vec![val!(1)]),
            &Value::Array(vec![val!(1), val!(2)])
        ));
    }

    #[test]
    fn test_values_equal_documents_ignore_key_order() {
        let a = doc! { x: 1, y: 2 };
        let b = doc! { y: 2, x: 1 };
        assert!(values_equal(&Value::Document(a), &Value::Document(b)));
    }

    #[test]
    fn test_is_scalar() {
        assert!(Value::Null.is_scalar());
        assert!(val!(1).is_scalar());
        assert!(val!("x").is_scalar());
        assert!(val!(true).is_scalar());
        assert!(Value::DateTime(0).is_scalar());
        assert!(!Value::Undefined.is_scalar());
        assert!(!Value::Array(vec![]).is_scalar());
        assert!(!Value::Document(Document::new()).is_scalar());
    }

    #[test]
    fn test_as_integer() {
        assert_eq!(val!(3).as_integer(), Some(3));
        assert_eq!(val!(-2).as_integer(), Some(-2));
        assert_eq!(val!(3.5).as_integer(), None);
        assert_eq!(val!(f64::NAN).as_integer(), None);
        assert_eq!(val!("3").as_integer(), None);
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(val!(true), Value::Bool(true));
        assert_eq!(val!(7i64), Value::Number(7.0));
        assert_eq!(val!("hi"), Value::String("hi".to_string()));
        let arr: Value = vec![val!(1), val!(2)].into();
        assert!(arr.is_array());
    }

    #[test]
    fn test_default_is_null() {
        assert_eq!(Value::default(), Value::Null);
    }
}
