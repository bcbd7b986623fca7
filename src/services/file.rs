//! File storage service
//!
//! Keeps a metadata row and its payload in the object store in step.
//! There is no transaction spanning both, so every operation orders its
//! two writes so that a crash leaves at worst an orphan row, which the
//! next `get` removes.

use anyhow::Context;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use crate::db::repositories::FileRepository;
use crate::models::{FileRecord, NewFile, StoredFile};
use crate::storage::{file_key, DynObjectStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum FileServiceError {
    #[error("File not found: {0}")]
    NotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(StorageError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct FileStorageService {
    repo: Arc<dyn FileRepository>,
    store: DynObjectStore,
    max_size: Option<u64>,
}

impl FileStorageService {
    pub fn new(repo: Arc<dyn FileRepository>, store: DynObjectStore) -> Self {
        Self {
            repo,
            store,
            max_size: None,
        }
    }

    /// Reject payloads larger than `max_size` bytes
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Store a new file.
    ///
    /// The row is written first. If the upload then fails the row is
    /// deleted again and the upload error is returned.
    pub async fn create<R>(&self, stub: NewFile, reader: R) -> Result<StoredFile, FileServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let data = self.buffer(reader).await?;
        let record = FileRecord {
            id: Uuid::new_v4(),
            content_type: stub.content_type,
            size: data.len() as i64,
            user_id: stub.user_id,
            created_at: Utc::now(),
        };

        let record = self.repo.create(&record).await.context("Failed to insert file row")?;
        let key = file_key(record.id);

        if let Err(e) = self
            .store
            .put(&key, data.clone(), record.content_type_or_default())
            .await
        {
            tracing::warn!(file_id = %record.id, error = %e, "Upload failed, removing file row");
            if let Err(rollback) = self.repo.delete(record.id).await {
                tracing::error!(file_id = %record.id, error = %rollback, "Failed to remove file row after upload failure");
            }
            return Err(FileServiceError::Storage(e));
        }

        tracing::info!(file_id = %record.id, size = record.size, backend = self.store.backend(), "File stored");
        Ok(StoredFile { record, data })
    }

    /// Load a file with its payload.
    ///
    /// A row whose object has vanished is deleted and reported as not found.
    pub async fn get(&self, id: Uuid) -> Result<StoredFile, FileServiceError> {
        let record = self.get_record(id).await?;

        match self.store.get(&file_key(id)).await {
            Ok(object) => Ok(StoredFile {
                record,
                data: object.data,
            }),
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(file_id = %id, "File object missing, removing orphan row");
                if let Err(e) = self.repo.delete(id).await {
                    tracing::error!(file_id = %id, error = %e, "Failed to remove orphan file row");
                }
                Err(FileServiceError::NotFound(id))
            }
            Err(e) => Err(FileServiceError::Storage(e)),
        }
    }

    /// Metadata only
    pub async fn get_record(&self, id: Uuid) -> Result<FileRecord, FileServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get file row")?
            .ok_or(FileServiceError::NotFound(id))
    }

    /// Delete the object, then the row. A missing object is not an error;
    /// any other storage failure leaves the row in place.
    pub async fn delete(&self, id: Uuid) -> Result<(), FileServiceError> {
        self.get_record(id).await?;

        match self.store.delete(&file_key(id)).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(FileServiceError::Storage(e)),
        }

        self.repo.delete(id).await.context("Failed to delete file row")?;
        tracing::info!(file_id = %id, "File deleted");
        Ok(())
    }

    /// Replace the payload under the same key, then overwrite type, size
    /// and owner on the row.
    pub async fn update<R>(&self, id: Uuid, stub: NewFile, reader: R) -> Result<StoredFile, FileServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let existing = self.get_record(id).await?;
        let data = self.buffer(reader).await?;

        let record = FileRecord {
            content_type: stub.content_type,
            size: data.len() as i64,
            user_id: stub.user_id,
            ..existing
        };

        self.store
            .put(&file_key(id), data.clone(), record.content_type_or_default())
            .await
            .map_err(FileServiceError::Storage)?;
        self.repo.update(&record).await.context("Failed to update file row")?;

        tracing::info!(file_id = %id, size = record.size, "File replaced");
        Ok(StoredFile { record, data })
    }

    async fn buffer<R>(&self, reader: R) -> Result<Bytes, FileServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buf = Vec::new();
        match self.max_size {
            Some(max) => {
                reader
                    .take(max + 1)
                    .read_to_end(&mut buf)
                    .await
                    .context("Failed to read upload")?;
                if buf.len() as u64 > max {
                    return Err(FileServiceError::Validation(format!(
                        "File exceeds the maximum size of {} bytes",
                        max
                    )));
                }
            }
            None => {
                let mut reader = reader;
                reader
                    .read_to_end(&mut buf)
                    .await
                    .context("Failed to read upload")?;
            }
        }
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxFileRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::storage::{MemoryObjectStore, ObjectStore, StoredObject};
    use async_trait::async_trait;

    /// Store whose every call fails with an upstream error
    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn put(&self, _key: &str, _data: Bytes, _content_type: &str) -> Result<(), StorageError> {
            Err(StorageError::upstream("put refused"))
        }

        async fn get(&self, _key: &str) -> Result<StoredObject, StorageError> {
            Err(StorageError::upstream("get refused"))
        }

        async fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::upstream("delete refused"))
        }

        fn backend(&self) -> &'static str {
            "failing"
        }
    }

    async fn setup_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    async fn setup_test_service() -> (DynDatabasePool, Arc<MemoryObjectStore>, FileStorageService) {
        let pool = setup_pool().await;
        let store = Arc::new(MemoryObjectStore::new());
        let service = FileStorageService::new(SqlxFileRepository::boxed(pool.clone()), store.clone());
        (pool, store, service)
    }

    fn png() -> NewFile {
        NewFile::new(Some("image/png".to_string()), None)
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (_pool, store, service) = setup_test_service().await;

        let created = service.create(png(), &b"\x89PNG data"[..]).await.unwrap();
        assert_eq!(created.record.size, 9);
        assert_eq!(created.data, Bytes::from_static(b"\x89PNG data"));
        assert!(store.contains(&file_key(created.record.id)).await);

        let loaded = service.get(created.record.id).await.unwrap();
        assert_eq!(loaded.record, created.record);
        assert_eq!(loaded.data, created.data);
    }

    #[tokio::test]
    async fn test_create_without_content_type_uses_default() {
        let (_pool, store, service) = setup_test_service().await;

        let created = service
            .create(NewFile::new(Some("  ".to_string()), None), &b"x"[..])
            .await
            .unwrap();
        assert!(created.record.content_type.is_none());

        let object = store.get(&file_key(created.record.id)).await.unwrap();
        assert_eq!(object.content_type.as_deref(), Some("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_create_rolls_back_row_when_upload_fails() {
        let pool = setup_pool().await;
        let repo = SqlxFileRepository::boxed(pool.clone());
        let service = FileStorageService::new(repo.clone(), Arc::new(FailingStore));

        let result = service.create(png(), &b"data"[..]).await;
        assert!(matches!(result, Err(FileServiceError::Storage(_))));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_not_found() {
        let (_pool, _store, service) = setup_test_service().await;
        let id = Uuid::new_v4();
        assert!(matches!(service.get(id).await, Err(FileServiceError::NotFound(e)) if e == id));
    }

    #[tokio::test]
    async fn test_get_removes_row_with_missing_object() {
        let (_pool, store, service) = setup_test_service().await;
        let created = service.create(png(), &b"data"[..]).await.unwrap();
        let id = created.record.id;

        store.delete(&file_key(id)).await.unwrap();

        assert!(matches!(service.get(id).await, Err(FileServiceError::NotFound(_))));
        assert!(matches!(service.get_record(id).await, Err(FileServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_surfaces_upstream_errors_and_keeps_row() {
        let pool = setup_pool().await;
        let repo = SqlxFileRepository::boxed(pool.clone());
        let good = FileStorageService::new(repo.clone(), Arc::new(MemoryObjectStore::new()));
        let id = good.create(png(), &b"data"[..]).await.unwrap().record.id;

        let broken = FileStorageService::new(repo, Arc::new(FailingStore));
        assert!(matches!(broken.get(id).await, Err(FileServiceError::Storage(_))));
        assert!(broken.get_record(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_removes_object_and_row() {
        let (_pool, store, service) = setup_test_service().await;
        let id = service.create(png(), &b"data"[..]).await.unwrap().record.id;

        service.delete(id).await.unwrap();

        assert!(store.is_empty().await);
        assert!(matches!(service.get(id).await, Err(FileServiceError::NotFound(_))));
        assert!(matches!(service.delete(id).await, Err(FileServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_object() {
        let (_pool, store, service) = setup_test_service().await;
        let id = service.create(png(), &b"data"[..]).await.unwrap().record.id;
        store.delete(&file_key(id)).await.unwrap();

        service.delete(id).await.unwrap();
        assert!(matches!(service.get_record(id).await, Err(FileServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_keeps_row_on_storage_failure() {
        let pool = setup_pool().await;
        let repo = SqlxFileRepository::boxed(pool.clone());
        let good = FileStorageService::new(repo.clone(), Arc::new(MemoryObjectStore::new()));
        let id = good.create(png(), &b"data"[..]).await.unwrap().record.id;

        let broken = FileStorageService::new(repo, Arc::new(FailingStore));
        assert!(matches!(broken.delete(id).await, Err(FileServiceError::Storage(_))));
        assert!(broken.get_record(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_overwrites_payload_under_same_key() {
        let (_pool, store, service) = setup_test_service().await;
        let id = service.create(png(), &b"old"[..]).await.unwrap().record.id;

        let updated = service
            .update(id, NewFile::new(Some("text/plain".to_string()), None), &b"brand new"[..])
            .await
            .unwrap();

        assert_eq!(updated.record.id, id);
        assert_eq!(updated.record.size, 9);
        assert_eq!(updated.record.content_type.as_deref(), Some("text/plain"));
        assert_eq!(store.len().await, 1);

        let loaded = service.get(id).await.unwrap();
        assert_eq!(loaded.data, Bytes::from_static(b"brand new"));
        assert_eq!(loaded.record.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let (_pool, store, service) = setup_test_service().await;
        let result = service.update(Uuid::new_v4(), png(), &b"data"[..]).await;
        assert!(matches!(result, Err(FileServiceError::NotFound(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_max_size_enforced() {
        let (pool, store, _) = setup_test_service().await;
        let service = FileStorageService::new(SqlxFileRepository::boxed(pool), store.clone())
            .with_max_size(4);

        assert!(service.create(png(), &b"1234"[..]).await.is_ok());
        let result = service.create(png(), &b"12345"[..]).await;
        assert!(matches!(result, Err(FileServiceError::Validation(_))));
        assert_eq!(store.len().await, 1);
    }
}
