use crate::common::StringComparator;
use crate::persistence::Persistence;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Options for opening a [crate::store::DataStore].
///
/// Supports method chaining for convenient configuration:
///
/// ```ignore
/// let options = StoreOptions::new()
///     .timestamp_data(true)
///     .compare_strings(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
/// let store = DataStore::open(options)?;
/// ```
#[derive(Clone, Default)]
pub struct StoreOptions {
    pub(crate) timestamp_data: bool,
    pub(crate) skip_autoload: bool,
    pub(crate) compare_strings: Option<StringComparator>,
    pub(crate) persistence: Option<Arc<dyn Persistence>>,
}

impl StoreOptions {
    pub fn new() -> StoreOptions {
        StoreOptions::default()
    }

    /// When enabled, inserted documents receive `createdAt`/`updatedAt`
    /// timestamps if absent, and updates refresh `updatedAt`.
    pub fn timestamp_data(mut self, enabled: bool) -> Self {
        self.timestamp_data = enabled;
        self
    }

    /// Skips the automatic `load_database` performed by
    /// [crate::store::DataStore::open]. Until the store is loaded,
    /// synchronous operations fail with `StoreNotLoaded` while
    /// callback-style operations are buffered and run after the load.
    pub fn skip_autoload(mut self, skip: bool) -> Self {
        self.skip_autoload = skip;
        self
    }

    /// Installs a string comparator overriding the default lexicographic
    /// order for sorting.
    pub fn compare_strings<F>(mut self, compare: F) -> Self
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        self.compare_strings = Some(Arc::new(compare));
        self
    }

    /// Installs the persistence collaborator. Defaults to a private
    /// in-memory journal.
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }
}

impl Debug for StoreOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreOptions")
            .field("timestamp_data", &self.timestamp_data)
            .field("skip_autoload", &self.skip_autoload)
            .field("compare_strings", &self.compare_strings.is_some())
            .finish()
    }
}

/// Options for [crate::store::DataStore::update].
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateOptions {
    pub(crate) multi: bool,
    pub(crate) upsert: bool,
    pub(crate) return_updated_docs: bool,
}

impl UpdateOptions {
    pub fn new() -> UpdateOptions {
        UpdateOptions::default()
    }

    /// Updates every matching document instead of only the first.
    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    /// Inserts a document built from the query and the update when nothing
    /// matches.
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    /// Returns the updated documents in the update result.
    pub fn return_updated_docs(mut self, return_docs: bool) -> Self {
        self.return_updated_docs = return_docs;
        self
    }
}

/// Options for [crate::store::DataStore::ensure_index].
#[derive(Clone, Debug, Default)]
pub struct IndexOptions {
    pub(crate) field_name: String,
    pub(crate) unique: bool,
    pub(crate) sparse: bool,
    pub(crate) expire_after_seconds: Option<i64>,
}

impl IndexOptions {
    /// Starts an index descriptor over the given dotted field path.
    pub fn field(field_name: impl Into<String>) -> IndexOptions {
        IndexOptions {
            field_name: field_name.into(),
            ..IndexOptions::default()
        }
    }

    /// Enforces at most one document per key.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Omits documents lacking the indexed field.
    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Registers a time-to-live on the indexed timestamp field: documents
    /// whose value is older than this many seconds are dropped from
    /// candidate sets and scheduled for removal.
    pub fn expire_after_seconds(mut self, seconds: i64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }
}
