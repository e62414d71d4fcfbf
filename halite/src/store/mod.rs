//! The collection facade.
//!
//! A [DataStore] owns the index set (always including the unique `_id`
//! index), the TTL registry, the serial executor and the persistence
//! collaborator, and composes the document model, index and query layers
//! into the public CRUD surface. Every mutating operation runs as one
//! executor task, which is the atomicity boundary: concurrent callers
//! observe operations in enqueue order, never interleaved.

mod cursor;
mod options;

pub use cursor::*;
pub use options::*;

use crate::common::{
    atomic, current_time_millis_or_zero, Atomic, ReadExecutor, StringComparator, Value,
    WriteExecutor, CREATED_AT, DELETED_MARKER, DOC_ID, INDEX_CREATED_MARKER, INDEX_EXPIRE_AFTER,
    INDEX_FIELD_NAME, INDEX_REMOVED_MARKER, INDEX_SPARSE, INDEX_UNIQUE, UPDATED_AT,
};
use crate::document::{check_document, generate_id, get_path, modify::modify, Document};
use crate::errors::{ErrorKind, HaliteError, HaliteResult};
use crate::executor::Executor;
use crate::filter::{matches, Query};
use crate::index::{Bounds, Index};
use crate::persistence::{MemoryPersistence, Persistence};
use indexmap::IndexMap;
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::{mpsc, Arc, Weak};

/// The result of an update operation.
#[derive(Clone, Debug, Default)]
pub struct UpdateResult {
    /// Number of documents affected (1 for an upsert).
    pub num_affected: usize,
    /// Whether the operation inserted a new document instead of updating.
    pub upsert: bool,
    /// The new documents: always populated on upsert, otherwise only when
    /// `return_updated_docs` was requested.
    pub updated: Vec<Document>,
}

/// An embeddable in-memory document store.
///
/// All clones share the same underlying state through `Arc`. Mutating
/// operations (`insert`, `update`, `remove`, index lifecycle) and reads that
/// execute a cursor are serialised through the store's executor; snapshot
/// reads ([DataStore::get_all_data]) bypass it.
///
/// # Examples
///
/// ```ignore
/// let store = DataStore::open(StoreOptions::new())?;
/// store.insert(doc! { name: "Mars", kind: "planet" })?;
/// let planets = store.find(doc! { kind: "planet" }).exec()?;
/// ```
#[derive(Clone)]
pub struct DataStore {
    inner: Arc<DataStoreInner>,
}

pub(crate) struct DataStoreInner {
    state: Atomic<StoreState>,
    executor: Executor,
    persistence: Arc<dyn Persistence>,
    timestamp_data: bool,
    pub(crate) compare_strings: Option<StringComparator>,
    weak_self: Weak<DataStoreInner>,
}

struct StoreState {
    indexes: HashMap<String, Index>,
    ttl_indexes: HashMap<String, i64>,
}

impl StoreState {
    fn new() -> StoreState {
        let mut indexes = HashMap::new();
        indexes.insert(DOC_ID.to_string(), Index::new(DOC_ID, true, false));
        StoreState {
            indexes,
            ttl_indexes: HashMap::new(),
        }
    }
}

impl DataStore {
    /// Opens a store with the given options. Unless `skip_autoload` is set,
    /// the persistence collaborator's record stream is replayed before this
    /// returns and the store is ready for synchronous use.
    pub fn open(options: StoreOptions) -> HaliteResult<DataStore> {
        let persistence = options
            .persistence
            .clone()
            .unwrap_or_else(|| Arc::new(MemoryPersistence::new()));
        let timestamp_data = options.timestamp_data;
        let compare_strings = options.compare_strings.clone();
        let inner = Arc::new_cyclic(|weak| DataStoreInner {
            state: atomic(StoreState::new()),
            executor: Executor::new(),
            persistence,
            timestamp_data,
            compare_strings,
            weak_self: weak.clone(),
        });
        let store = DataStore { inner };
        if !options.skip_autoload {
            store.load_database()?;
        }
        Ok(store)
    }

    /// Loads (or reloads) the store from the persistence collaborator.
    ///
    /// The boot task jumps ahead of any buffered operations; once it
    /// completes, the executor becomes ready and the buffered operations
    /// run in their arrival order.
    pub fn load_database(&self) -> HaliteResult<()> {
        let inner = self.inner.clone();
        let (sender, receiver) = mpsc::channel();
        self.inner.executor.push(
            Box::new(move || {
                let _ = sender.send(inner.do_load());
            }),
            true,
        );
        let result = receiver.recv().unwrap_or_else(|_| {
            Err(HaliteError::new(
                "Load task was dropped by the executor",
                ErrorKind::InternalError,
            ))
        });
        if result.is_ok() {
            self.inner.executor.process_buffer();
        }
        result
    }

    /// Runs a job as an executor task and waits for its completion signal.
    pub(crate) fn execute<R, F>(&self, job: F) -> HaliteResult<R>
    where
        F: FnOnce(&DataStoreInner) -> HaliteResult<R> + Send + 'static,
        R: Send + 'static,
    {
        if !self.inner.executor.is_ready() {
            log::error!("Store has not been loaded; call load_database first");
            return Err(HaliteError::new(
                "Store has not been loaded; call load_database first",
                ErrorKind::StoreNotLoaded,
            ));
        }
        let inner = self.inner.clone();
        let (sender, receiver) = mpsc::channel();
        self.inner.executor.push(
            Box::new(move || {
                let _ = sender.send(job(&inner));
            }),
            false,
        );
        receiver.recv().unwrap_or_else(|_| {
            Err(HaliteError::new(
                "Task was dropped by the executor",
                ErrorKind::InternalError,
            ))
        })
    }

    /// Inserts one document and returns it as stored (with its `_id` and
    /// any injected timestamps).
    pub fn insert(&self, doc: Document) -> HaliteResult<Document> {
        let mut inserted = self.insert_many(vec![doc])?;
        inserted.pop().ok_or_else(|| {
            HaliteError::new("Insert returned no document", ErrorKind::InternalError)
        })
    }

    /// Inserts a batch of documents atomically: a failure on any document
    /// leaves the store exactly as before the call.
    pub fn insert_many(&self, docs: Vec<Document>) -> HaliteResult<Vec<Document>> {
        self.execute(move |inner| inner.do_insert(docs))
    }

    /// Callback form of [DataStore::insert_many], usable before the store
    /// is loaded: the operation is buffered and completes after
    /// `load_database`.
    pub fn insert_with<F>(&self, docs: Vec<Document>, callback: F)
    where
        F: FnOnce(HaliteResult<Vec<Document>>) + Send + 'static,
    {
        let inner = self.inner.clone();
        self.inner
            .executor
            .push(Box::new(move || callback(inner.do_insert(docs))), false);
    }

    /// Updates documents matching the query.
    pub fn update(
        &self,
        query: impl Into<Query>,
        update: Document,
        options: UpdateOptions,
    ) -> HaliteResult<UpdateResult> {
        let query = query.into();
        self.execute(move |inner| inner.do_update(&query, &update, &options))
    }

    /// Callback form of [DataStore::update].
    pub fn update_with<F>(
        &self,
        query: impl Into<Query>,
        update: Document,
        options: UpdateOptions,
        callback: F,
    ) where
        F: FnOnce(HaliteResult<UpdateResult>) + Send + 'static,
    {
        let query = query.into();
        let inner = self.inner.clone();
        self.inner.executor.push(
            Box::new(move || callback(inner.do_update(&query, &update, &options))),
            false,
        );
    }

    /// Removes documents matching the query (the first match only, unless
    /// `multi`). Returns the number of removed documents.
    pub fn remove(&self, query: impl Into<Query>, multi: bool) -> HaliteResult<usize> {
        let query = query.into();
        self.execute(move |inner| inner.do_remove(&query, multi))
    }

    /// Callback form of [DataStore::remove].
    pub fn remove_with<F>(&self, query: impl Into<Query>, multi: bool, callback: F)
    where
        F: FnOnce(HaliteResult<usize>) + Send + 'static,
    {
        let query = query.into();
        let inner = self.inner.clone();
        self.inner
            .executor
            .push(Box::new(move || callback(inner.do_remove(&query, multi))), false);
    }

    /// Returns a deferred cursor over the documents matching the query.
    /// Nothing executes until a finisher (`exec`, `count`, `first`) runs.
    pub fn find(&self, query: impl Into<Query>) -> Cursor {
        Cursor::new(self.clone(), query.into())
    }

    /// Returns the first document matching the query.
    pub fn find_one(&self, query: impl Into<Query>) -> HaliteResult<Option<Document>> {
        self.find(query).first()
    }

    /// Counts the documents matching the query.
    pub fn count(&self, query: impl Into<Query>) -> HaliteResult<usize> {
        self.find(query).count()
    }

    /// Creates a secondary index if it does not exist yet. The `_id` index
    /// always exists and never needs ensuring.
    pub fn ensure_index(&self, options: IndexOptions) -> HaliteResult<()> {
        self.execute(move |inner| inner.do_ensure_index(&options))
    }

    /// Drops a secondary index. The `_id` index cannot be removed.
    pub fn remove_index(&self, field_name: &str) -> HaliteResult<()> {
        let field_name = field_name.to_string();
        self.execute(move |inner| inner.do_remove_index(&field_name))
    }

    /// Names of the indexed fields, `_id` included, in lexicographic order.
    pub fn index_names(&self) -> Vec<String> {
        self.inner
            .state
            .read_with(|state| state.indexes.keys().cloned().sorted().collect())
    }

    /// Synchronous snapshot of every live document, bypassing the executor.
    /// Callers interleaving this with mutations accept snapshot semantics.
    pub fn get_all_data(&self) -> Vec<Document> {
        self.inner.state.read_with(|state| {
            state
                .indexes
                .get(DOC_ID)
                .map(|index| index.get_all())
                .unwrap_or_default()
        })
    }
}

impl DataStoreInner {
    fn now_value(&self) -> Value {
        Value::DateTime(current_time_millis_or_zero())
    }

    fn do_load(&self) -> HaliteResult<()> {
        let records = self.persistence.load()?;

        // start from the index definitions currently ensured, then let the
        // record stream add and remove definitions
        let mut definitions: Vec<IndexOptions> = self.state.read_with(|state| {
            state
                .indexes
                .values()
                .filter(|index| index.field_name() != DOC_ID)
                .map(|index| {
                    let mut options = IndexOptions::field(index.field_name())
                        .unique(index.is_unique())
                        .sparse(index.is_sparse());
                    if let Some(seconds) = state.ttl_indexes.get(index.field_name()) {
                        options = options.expire_after_seconds(*seconds);
                    }
                    options
                })
                .collect()
        });

        let mut dataset: IndexMap<String, Document> = IndexMap::new();
        for record in records {
            if record.contains_key(DELETED_MARKER) {
                if let Some(id) = record.id() {
                    let id = id.to_string();
                    dataset.shift_remove(&id);
                }
            } else if let Some(marker) = record.get(INDEX_CREATED_MARKER) {
                let options = index_options_from_marker(marker)?;
                definitions.retain(|existing| existing.field_name != options.field_name);
                definitions.push(options);
            } else if let Some(marker) = record.get(INDEX_REMOVED_MARKER) {
                let field_name = marker.as_str().ok_or_else(|| {
                    HaliteError::new(
                        "Malformed $$indexRemoved record",
                        ErrorKind::PersistenceError,
                    )
                })?;
                definitions.retain(|existing| existing.field_name != field_name);
            } else {
                let id = record
                    .id()
                    .ok_or_else(|| {
                        HaliteError::new(
                            "Journal document without an _id",
                            ErrorKind::PersistenceError,
                        )
                    })?
                    .to_string();
                dataset.shift_remove(&id);
                dataset.insert(id, record);
            }
        }

        // rebuild into fresh indexes; the live state is only swapped in on
        // success, so a failed load leaves the store untouched
        let mut indexes = HashMap::new();
        indexes.insert(DOC_ID.to_string(), Index::new(DOC_ID, true, false));
        let mut ttl_indexes = HashMap::new();
        for definition in &definitions {
            indexes.insert(
                definition.field_name.clone(),
                Index::new(&definition.field_name, definition.unique, definition.sparse),
            );
            if let Some(seconds) = definition.expire_after_seconds {
                ttl_indexes.insert(definition.field_name.clone(), seconds);
            }
        }
        for doc in dataset.values() {
            for index in indexes.values_mut() {
                index.insert(doc)?;
            }
        }

        self.state.write_with(|state| {
            state.indexes = indexes;
            state.ttl_indexes = ttl_indexes;
        });
        Ok(())
    }

    fn do_insert(&self, docs: Vec<Document>) -> HaliteResult<Vec<Document>> {
        let prepared = self.state.write_with(|state| -> HaliteResult<Vec<Document>> {
            let mut prepared = Vec::with_capacity(docs.len());
            for mut doc in docs {
                if doc.get(DOC_ID).is_none() {
                    doc.put(DOC_ID, Self::fresh_id(state))?;
                }
                check_document(&doc)?;
                if self.timestamp_data {
                    if doc.get(CREATED_AT).is_none() {
                        doc.put(CREATED_AT, self.now_value())?;
                    }
                    if doc.get(UPDATED_AT).is_none() {
                        doc.put(UPDATED_AT, self.now_value())?;
                    }
                }
                prepared.push(doc);
            }

            // one document at a time across every index; a failure at
            // position i undoes positions < i entirely
            let mut failure = None;
            for (position, doc) in prepared.iter().enumerate() {
                if let Err(err) = Self::add_to_indexes(state, doc) {
                    failure = Some((position, err));
                    break;
                }
            }
            if let Some((position, err)) = failure {
                for doc in &prepared[..position] {
                    Self::remove_from_indexes(state, doc);
                }
                return Err(err);
            }
            Ok(prepared)
        })?;

        self.persistence.persist_new_state(&prepared)?;
        Ok(prepared)
    }

    fn do_update(
        &self,
        query: &Query,
        update: &Document,
        options: &UpdateOptions,
    ) -> HaliteResult<UpdateResult> {
        let candidates = self.get_candidates(query, false)?;

        let mut pairs: Vec<(Document, Document)> = Vec::new();
        for candidate in candidates {
            if !options.multi && !pairs.is_empty() {
                break;
            }
            if matches(&candidate, query)? {
                let mut new_doc = modify(&candidate, update)?;
                if self.timestamp_data {
                    if let Some(created) = candidate.get(CREATED_AT) {
                        new_doc.put(CREATED_AT, created.clone())?;
                    }
                    new_doc.put(UPDATED_AT, self.now_value())?;
                }
                pairs.push((candidate, new_doc));
            }
        }

        if pairs.is_empty() {
            if options.upsert {
                let has_modifiers = update.keys().any(|key| key.starts_with('$'));
                let to_insert = if has_modifiers {
                    modify(&strip_query_operators(query.spec()), update)?
                } else {
                    update.clone()
                };
                let inserted = self.do_insert(vec![to_insert])?;
                return Ok(UpdateResult {
                    num_affected: 1,
                    upsert: true,
                    updated: inserted,
                });
            }
            return Ok(UpdateResult::default());
        }

        // commit the pairs to every index as a batch; a failing index
        // unwinds the ones already committed
        self.state.write_with(|state| -> HaliteResult<()> {
            let names: Vec<String> = state.indexes.keys().cloned().collect();
            for (position, name) in names.iter().enumerate() {
                let result = match state.indexes.get_mut(name) {
                    Some(index) => index.update_multiple(&pairs),
                    None => Ok(()),
                };
                if let Err(err) = result {
                    for prior in &names[..position] {
                        if let Some(index) = state.indexes.get_mut(prior) {
                            index.revert_update(&pairs);
                        }
                    }
                    return Err(err);
                }
            }
            Ok(())
        })?;

        let new_docs: Vec<Document> = pairs.into_iter().map(|(_, new_doc)| new_doc).collect();
        self.persistence.persist_new_state(&new_docs)?;
        Ok(UpdateResult {
            num_affected: new_docs.len(),
            upsert: false,
            updated: if options.return_updated_docs {
                new_docs
            } else {
                Vec::new()
            },
        })
    }

    fn do_remove(&self, query: &Query, multi: bool) -> HaliteResult<usize> {
        let candidates = self.get_candidates(query, true)?;

        let mut removed: Vec<Document> = Vec::new();
        for candidate in candidates {
            if !multi && !removed.is_empty() {
                break;
            }
            if matches(&candidate, query)? {
                removed.push(candidate);
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }

        self.state.write_with(|state| {
            for doc in &removed {
                Self::remove_from_indexes(state, doc);
            }
        });

        let mut tombstones = Vec::with_capacity(removed.len());
        for doc in &removed {
            let mut tombstone = Document::new();
            tombstone.put(DELETED_MARKER, true)?;
            if let Some(id) = doc.id() {
                tombstone.put(DOC_ID, id)?;
            }
            tombstones.push(tombstone);
        }
        self.persistence.persist_new_state(&tombstones)?;
        Ok(removed.len())
    }

    fn do_ensure_index(&self, options: &IndexOptions) -> HaliteResult<()> {
        if options.field_name.is_empty() {
            log::error!("ensure_index requires a field name");
            return Err(HaliteError::new(
                "ensure_index requires a field name",
                ErrorKind::MissingRequiredField,
            ));
        }

        let created = self.state.write_with(|state| -> HaliteResult<bool> {
            if let Some(seconds) = options.expire_after_seconds {
                state
                    .ttl_indexes
                    .insert(options.field_name.clone(), seconds);
            }
            if state.indexes.contains_key(&options.field_name) {
                return Ok(false);
            }
            let mut index = Index::new(&options.field_name, options.unique, options.sparse);
            let docs = state
                .indexes
                .get(DOC_ID)
                .map(|primary| primary.get_all())
                .unwrap_or_default();
            for doc in &docs {
                // a failure here drops the half-built index on the floor
                index.insert(doc)?;
            }
            state.indexes.insert(options.field_name.clone(), index);
            Ok(true)
        })?;

        if created {
            let mut descriptor = Document::new();
            descriptor.put(INDEX_FIELD_NAME, options.field_name.clone())?;
            descriptor.put(INDEX_UNIQUE, options.unique)?;
            descriptor.put(INDEX_SPARSE, options.sparse)?;
            if let Some(seconds) = options.expire_after_seconds {
                descriptor.put(INDEX_EXPIRE_AFTER, seconds)?;
            }
            let mut marker = Document::new();
            marker.put(INDEX_CREATED_MARKER, descriptor)?;
            self.persistence.persist_new_state(&[marker])?;
        }
        Ok(())
    }

    fn do_remove_index(&self, field_name: &str) -> HaliteResult<()> {
        if field_name == DOC_ID {
            log::error!("The _id index cannot be removed");
            return Err(HaliteError::new(
                "The _id index cannot be removed",
                ErrorKind::InvalidOperation,
            ));
        }
        self.state.write_with(|state| {
            state.ttl_indexes.remove(field_name);
            state.indexes.remove(field_name);
        });
        let mut marker = Document::new();
        marker.put(INDEX_REMOVED_MARKER, field_name)?;
        self.persistence.persist_new_state(&[marker])
    }

    /// Candidate acquisition: probes at most one index, preferring direct
    /// scalar equality, then `$in`, then a range, falling back to a full
    /// scan of the `_id` index. With `allow_stale` unset, TTL-expired
    /// candidates are dropped and a remove task is enqueued for each.
    pub(crate) fn get_candidates(
        &self,
        query: &Query,
        allow_stale: bool,
    ) -> HaliteResult<Vec<Document>> {
        let (candidates, ttl_indexes) = self.state.read_with(|state| {
            (
                Self::candidates_from_indexes(state, query.spec()),
                state.ttl_indexes.clone(),
            )
        });
        let candidates = candidates?;
        if allow_stale || ttl_indexes.is_empty() {
            return Ok(candidates);
        }

        let now = current_time_millis_or_zero();
        let mut fresh = Vec::with_capacity(candidates.len());
        let mut expired = Vec::new();
        for doc in candidates {
            let mut valid = true;
            for (field, seconds) in &ttl_indexes {
                if let Value::DateTime(stamp) = get_path(&doc, field) {
                    if stamp + seconds * 1000 < now {
                        valid = false;
                        break;
                    }
                }
            }
            if valid {
                fresh.push(doc);
            } else if let Some(id) = doc.id() {
                expired.push(id.to_string());
            }
        }

        // each cascaded expiry remove is its own task, run after the
        // current one
        for id in expired {
            if let Some(inner) = self.weak_self.upgrade() {
                self.executor.push(
                    Box::new(move || {
                        let query = Query::new(id_query(&id));
                        if let Err(err) = inner.do_remove(&query, false) {
                            log::error!("Failed to remove expired document {}: {}", id, err);
                        }
                    }),
                    false,
                );
            }
        }
        Ok(fresh)
    }

    fn candidates_from_indexes(
        state: &StoreState,
        spec: &Document,
    ) -> HaliteResult<Vec<Document>> {
        // direct scalar equality
        for (key, value) in spec.iter() {
            if key.starts_with('$') {
                continue;
            }
            if value.is_scalar() {
                if let Some(index) = state.indexes.get(key) {
                    return Ok(index.get_matching(value));
                }
            }
        }
        // $in membership
        for (key, value) in spec.iter() {
            if key.starts_with('$') {
                continue;
            }
            if let Some(operators) = value.as_document() {
                if let Some(members) = operators.get("$in") {
                    if let Some(index) = state.indexes.get(key) {
                        let members = members.as_array().ok_or_else(|| {
                            log::error!("$in operator called with a non-array");
                            HaliteError::new(
                                "$in operator called with a non-array",
                                ErrorKind::FilterError,
                            )
                        })?;
                        return Ok(index.get_matching(&Value::Array(members.clone())));
                    }
                }
            }
        }
        // range scan
        for (key, value) in spec.iter() {
            if key.starts_with('$') {
                continue;
            }
            if let Some(operators) = value.as_document() {
                if let Some(index) = state.indexes.get(key) {
                    if let Some(bounds) = Bounds::from_operators(operators) {
                        return Ok(index.get_between_bounds(&bounds));
                    }
                }
            }
        }
        // full scan
        Ok(state
            .indexes
            .get(DOC_ID)
            .map(|index| index.get_all())
            .unwrap_or_default())
    }

    fn fresh_id(state: &StoreState) -> String {
        loop {
            let id = generate_id();
            let taken = state
                .indexes
                .get(DOC_ID)
                .map(|index| !index.get_matching(&Value::String(id.clone())).is_empty())
                .unwrap_or(false);
            if !taken {
                return id;
            }
        }
    }

    fn add_to_indexes(state: &mut StoreState, doc: &Document) -> HaliteResult<()> {
        let names: Vec<String> = state.indexes.keys().cloned().collect();
        for (position, name) in names.iter().enumerate() {
            let result = match state.indexes.get_mut(name) {
                Some(index) => index.insert(doc),
                None => Ok(()),
            };
            if let Err(err) = result {
                for prior in &names[..position] {
                    if let Some(index) = state.indexes.get_mut(prior) {
                        index.remove(doc);
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn remove_from_indexes(state: &mut StoreState, doc: &Document) {
        for index in state.indexes.values_mut() {
            index.remove(doc);
        }
    }
}

fn id_query(id: &str) -> Document {
    let mut query = Document::new();
    let _ = query.put(DOC_ID, id);
    query
}

fn index_options_from_marker(marker: &Value) -> HaliteResult<IndexOptions> {
    let descriptor = marker.as_document().ok_or_else(|| {
        HaliteError::new(
            "Malformed $$indexCreated record",
            ErrorKind::PersistenceError,
        )
    })?;
    let field_name = descriptor
        .get(INDEX_FIELD_NAME)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            HaliteError::new(
                "$$indexCreated record without a field name",
                ErrorKind::PersistenceError,
            )
        })?;
    let mut options = IndexOptions::field(field_name)
        .unique(descriptor.get(INDEX_UNIQUE).and_then(Value::as_bool) == Some(true))
        .sparse(descriptor.get(INDEX_SPARSE).and_then(Value::as_bool) == Some(true));
    if let Some(seconds) = descriptor.get(INDEX_EXPIRE_AFTER).and_then(Value::as_integer) {
        options = options.expire_after_seconds(seconds);
    }
    Ok(options)
}

/// Deep copy of a query specification with every `$`-prefixed key dropped,
/// used as the base document of a modifier-driven upsert.
fn strip_query_operators(spec: &Document) -> Document {
    let mut stripped = Document::new();
    for (key, value) in spec.iter() {
        if key.starts_with('$') {
            continue;
        }
        let value = match value {
            Value::Document(sub) => Value::Document(strip_query_operators(sub)),
            other => other.clone(),
        };
        let _ = stripped.put(key.clone(), value);
    }
    stripped
}
