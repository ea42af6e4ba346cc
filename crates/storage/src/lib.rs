#![forbid(unsafe_code)]

pub mod content;
pub mod local;
pub mod repository;
pub mod sqlite;

pub use repository::{Document, DocumentStore, Filter, Storage, StorageError, StoredDocument};
