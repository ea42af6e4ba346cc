use async_trait::async_trait;
use mcq_core::Clock;
use mcq_core::model::DocumentId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::content::{ContentSource, StaticContent};
use crate::local::{LocalProgressStore, MemoryKeyValueStore};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Schemaless document body, as held by the remote store.
pub type Document = serde_json::Map<String, Value>;

/// A document together with the id the store knows it by.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub data: Document,
}

/// Field-equality condition used by `DocumentStore::query`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        document.get(&self.field) == Some(&self.value)
    }
}

/// Encode a record as a document.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the value does not serialize to a
/// JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StorageError> {
    match serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::Serialization(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Decode a document into a typed record.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the document does not match `T`.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, StorageError> {
    serde_json::from_value(Value::Object(document))
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Shallow merge: top-level fields in `patch` overwrite those in `target`.
pub(crate) fn merge_into(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

/// Remote document persistence, addressed by collection name and document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document under a store-assigned id.
    async fn add(&self, collection: &str, document: Document) -> Result<DocumentId, StorageError>;

    async fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StorageError>;

    /// Create the document or merge `document` into the existing one.
    async fn set_merge(
        &self,
        collection: &str,
        id: &DocumentId,
        document: Document,
    ) -> Result<(), StorageError>;

    /// Documents matching every filter, in insertion order.
    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<StoredDocument>, StorageError>;

    /// Merge `patch` into an existing document; `NotFound` if it is missing.
    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        patch: Document,
    ) -> Result<(), StorageError>;

    /// Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StorageError>;
}

pub(crate) fn new_document_id() -> DocumentId {
    DocumentId::new(uuid::Uuid::new_v4().simple().to_string())
}

/// Simple in-memory document store for prototyping and tests.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<Mutex<HashMap<String, Vec<StoredDocument>>>>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn add(&self, collection: &str, document: Document) -> Result<DocumentId, StorageError> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let id = new_document_id();
        guard
            .entry(collection.to_owned())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                data: document,
            });
        Ok(id)
    }

    async fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StorageError> {
        let guard = self
            .collections
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| &d.id == id))
            .map(|d| d.data.clone()))
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &DocumentId,
        document: Document,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let docs = guard.entry(collection.to_owned()).or_default();
        match docs.iter_mut().find(|d| &d.id == id) {
            Some(existing) => merge_into(&mut existing.data, document),
            None => docs.push(StoredDocument {
                id: id.clone(),
                data: document,
            }),
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<StoredDocument>, StorageError> {
        let guard = self
            .collections
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| filters.iter().all(|f| f.matches(&d.data)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        patch: Document,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let existing = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| &d.id == id))
            .ok_or(StorageError::NotFound)?;
        merge_into(&mut existing.data, patch);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StorageError> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if let Some(docs) = guard.get_mut(collection) {
            docs.retain(|d| &d.id != id);
        }
        Ok(())
    }
}

/// Aggregates the three persistence seams the services build on.
#[derive(Clone)]
pub struct Storage {
    pub documents: Arc<dyn DocumentStore>,
    pub local: LocalProgressStore,
    pub content: Arc<dyn ContentSource>,
}

impl Storage {
    /// Everything in memory, with an empty content catalog.
    #[must_use]
    pub fn in_memory() -> Self {
        let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let content: Arc<dyn ContentSource> = Arc::new(StaticContent::default());
        Self {
            documents,
            local: LocalProgressStore::new(Arc::new(MemoryKeyValueStore::new())),
            content,
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: Arc<dyn ContentSource>) -> Self {
        self.content = content;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.local = self.local.with_clock(clock);
        self
    }
}
