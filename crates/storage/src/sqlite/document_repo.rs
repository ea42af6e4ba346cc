use chrono::Utc;
use mcq_core::model::DocumentId;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::warn;

use super::SqliteDocumentStore;
use crate::repository::{
    Document, DocumentStore, Filter, StorageError, StoredDocument, merge_into, new_document_id,
};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn encode(document: &Document) -> Result<String, StorageError> {
    serde_json::to_string(document).map_err(ser)
}

fn decode(body: &str) -> Result<Document, StorageError> {
    serde_json::from_str(body).map_err(ser)
}

fn map_row(row: &SqliteRow) -> Result<StoredDocument, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let body: String = row.try_get("body").map_err(ser)?;
    Ok(StoredDocument {
        id: DocumentId::new(id),
        data: decode(&body)?,
    })
}

fn push_path(builder: &mut QueryBuilder<'_, Sqlite>, field: &str) {
    builder.push(" AND CASE WHEN json_valid(body) THEN json_extract(body, ");
    builder.push_bind(format!("$.\"{field}\""));
    builder.push(") END = ");
}

/// Push an equality filter on a top-level body field. Non-scalar values are
/// left to the in-process check.
fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    match &filter.value {
        Value::String(s) => {
            push_path(builder, &filter.field);
            builder.push_bind(s.clone());
        }
        Value::Bool(b) => {
            push_path(builder, &filter.field);
            builder.push_bind(i64::from(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                push_path(builder, &filter.field);
                builder.push_bind(i);
            } else if let Some(f) = n.as_f64() {
                push_path(builder, &filter.field);
                builder.push_bind(f);
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => {}
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn add(&self, collection: &str, document: Document) -> Result<DocumentId, StorageError> {
        let id = new_document_id();
        sqlx::query(
            r"
            INSERT INTO documents (collection, id, body, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(collection)
        .bind(id.as_str())
        .bind(encode(&document)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(id)
    }

    async fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StorageError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.map(|r| {
            let body: String = r.try_get("body").map_err(ser)?;
            decode(&body)
        })
        .transpose()
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &DocumentId,
        document: Document,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let existing = sqlx::query("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;

        let merged = match existing {
            Some(row) => {
                let body: String = row.try_get("body").map_err(ser)?;
                let mut current = decode(&body)?;
                merge_into(&mut current, document);
                current
            }
            None => document,
        };

        sqlx::query(
            r"
            INSERT INTO documents (collection, id, body, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            ",
        )
        .bind(collection)
        .bind(id.as_str())
        .bind(encode(&merged)?)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<StoredDocument>, StorageError> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT id, body FROM documents WHERE collection = ");
        builder.push_bind(collection.to_owned());
        for filter in filters {
            push_filter(&mut builder, filter);
        }
        builder.push(" ORDER BY seq");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            match map_row(row) {
                Ok(doc) if filters.iter().all(|f| f.matches(&doc.data)) => out.push(doc),
                Ok(_) => {}
                Err(err) => {
                    let id: String = row.try_get("id").unwrap_or_default();
                    warn!(collection, %id, error = %err, "skipping undecodable document");
                }
            }
        }
        Ok(out)
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        patch: Document,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        let body: String = row.try_get("body").map_err(ser)?;
        let mut current = decode(&body)?;
        merge_into(&mut current, patch);

        sqlx::query(
            "UPDATE documents SET body = ?3, updated_at = ?4 WHERE collection = ?1 AND id = ?2",
        )
        .bind(collection)
        .bind(id.as_str())
        .bind(encode(&current)?)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
