use bson::{Document, doc, oid::ObjectId};
use futures::TryStreamExt;
use mongodb::{Collection, Database};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaoError {
    #[error("not found")]
    NotFound,
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("bson serialize error: {0}")]
    BsonSer(#[from] bson::ser::Error),
    #[error("bson deserialize error: {0}")]
    BsonDe(#[from] bson::de::Error),
}

pub type DaoResult<T> = Result<T, DaoError>;

/// Duplicate-key writes come back as a distinct variant so callers can
/// run the create-or-refetch dance instead of bubbling a 500.
fn map_mongo_err(e: mongodb::error::Error) -> DaoError {
    if is_duplicate_key(&e) {
        DaoError::DuplicateKey(e.to_string())
    } else {
        DaoError::Mongo(e)
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match *e.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref we)) => we.code == 11000,
        ErrorKind::Command(ref ce) => ce.code == 11000,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationParams {
    pub page: i64,
    pub limit: i64,
}

impl PaginationParams {
    pub const DEFAULT_LIMIT: i64 = 50;

    /// Clamps raw query values: page floors at 1, limit to [1, max_limit].
    pub fn from_query(page: Option<i64>, limit: Option<i64>, default_limit: i64, max_limit: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit),
        }
    }

    pub fn skip(&self) -> u64 {
        ((self.page - 1) * self.limit) as u64
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

fn total_pages(total: u64, limit: i64) -> i64 {
    total.div_ceil(limit.max(1) as u64) as i64
}

#[derive(Clone)]
pub struct BaseDao<T>
where
    T: Send + Sync,
{
    collection: Collection<T>,
}

impl<T> BaseDao<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Unpin,
{
    pub fn new(db: &Database, name: &str) -> Self {
        Self {
            collection: db.collection::<T>(name),
        }
    }

    pub fn collection(&self) -> &Collection<T> {
        &self.collection
    }

    pub async fn insert_one(&self, doc: &T) -> DaoResult<ObjectId> {
        let result = self.collection.insert_one(doc).await.map_err(map_mongo_err)?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| DaoError::Validation("inserted _id is not an ObjectId".to_string()))
    }

    pub async fn insert_many(&self, docs: &[T]) -> DaoResult<usize> {
        if docs.is_empty() {
            return Ok(0);
        }
        let result = self.collection.insert_many(docs).await.map_err(map_mongo_err)?;
        Ok(result.inserted_ids.len())
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<T> {
        self.collection
            .find_one(doc! { "_id": id })
            .await
            .map_err(DaoError::Mongo)?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_by_id_in_tenant(&self, tenant_id: ObjectId, id: ObjectId) -> DaoResult<T> {
        self.collection
            .find_one(doc! { "_id": id, "tenant_id": tenant_id })
            .await
            .map_err(DaoError::Mongo)?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_one(&self, filter: Document) -> DaoResult<Option<T>> {
        self.collection.find_one(filter).await.map_err(DaoError::Mongo)
    }

    pub async fn find_many(&self, filter: Document, sort: Option<Document>) -> DaoResult<Vec<T>> {
        let mut find = self.collection.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        let cursor = find.await.map_err(DaoError::Mongo)?;
        cursor.try_collect().await.map_err(DaoError::Mongo)
    }

    pub async fn find_many_limited(
        &self,
        filter: Document,
        sort: Document,
        limit: i64,
    ) -> DaoResult<Vec<T>> {
        let cursor = self
            .collection
            .find(filter)
            .sort(sort)
            .limit(limit)
            .await
            .map_err(DaoError::Mongo)?;
        cursor.try_collect().await.map_err(DaoError::Mongo)
    }

    pub async fn find_paginated(
        &self,
        filter: Document,
        sort: Option<Document>,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<T>> {
        let total = self
            .collection
            .count_documents(filter.clone())
            .await
            .map_err(DaoError::Mongo)?;

        let mut find = self
            .collection
            .find(filter)
            .skip(params.skip())
            .limit(params.limit);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        let items: Vec<T> = find
            .await
            .map_err(DaoError::Mongo)?
            .try_collect()
            .await
            .map_err(DaoError::Mongo)?;

        Ok(PaginatedResult {
            items,
            total,
            page: params.page,
            limit: params.limit,
            total_pages: total_pages(total, params.limit),
        })
    }

    pub async fn count(&self, filter: Document) -> DaoResult<u64> {
        self.collection
            .count_documents(filter)
            .await
            .map_err(DaoError::Mongo)
    }

    pub async fn update_one(&self, filter: Document, update: Document) -> DaoResult<bool> {
        let result = self
            .collection
            .update_one(filter, update)
            .await
            .map_err(map_mongo_err)?;
        Ok(result.modified_count > 0)
    }

    pub async fn update_by_id(&self, id: ObjectId, update: Document) -> DaoResult<bool> {
        self.update_one(doc! { "_id": id }, update).await
    }

    pub async fn hard_delete(&self, filter: Document) -> DaoResult<u64> {
        let result = self
            .collection
            .delete_many(filter)
            .await
            .map_err(DaoError::Mongo)?;
        Ok(result.deleted_count)
    }
}
