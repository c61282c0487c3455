//! Pluggable document store boundary.
//!
//! The service layer speaks a small portable dialect: predicate documents
//! (`$eq`/`$ne`/`$gt`/`$gte`/`$lt`/`$lte`/`$in`/`$nin`/`$regex`/`$not`,
//! `$and`/`$or`/`$nor` combinators) and aggregation pipelines
//! (`$match`/`$sort`/`$skip`/`$limit`/`$count`/`$facet`/`$sample`). Any
//! adapter exposing these primitives satisfies the trait; [`MemoryStore`]
//! is the in-process reference implementation.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::filter::FindOptions;

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        predicate: &Value,
        options: Option<&FindOptions>,
    ) -> Result<Vec<Value>, StoreError>;

    async fn find_one(
        &self,
        collection: &str,
        predicate: &Value,
    ) -> Result<Option<Value>, StoreError>;

    async fn aggregate(&self, collection: &str, pipeline: &[Value])
        -> Result<Vec<Value>, StoreError>;

    /// Insert a document, assigning an `id` when absent. Returns the stored
    /// document.
    async fn insert_one(&self, collection: &str, document: Value) -> Result<Value, StoreError>;

    /// Apply a `{"$set": {...}}` update to the first matching document.
    /// Returns the updated document, or `None` when nothing matched.
    async fn update_one(
        &self,
        collection: &str,
        predicate: &Value,
        update: &Value,
    ) -> Result<Option<Value>, StoreError>;

    /// Delete the first matching document. Returns whether one was removed.
    async fn delete_one(&self, collection: &str, predicate: &Value) -> Result<bool, StoreError>;

    async fn count(&self, collection: &str, predicate: &Value) -> Result<i64, StoreError>;
}
