use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use crate::domain::{ArtifactName, ChunkId, ContentHash};
use crate::error::AppError;
use crate::storage::Storage;
use crate::utils::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub file_hash: String,
    pub filename: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    pub should_upload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_list: Option<Vec<String>>,
}

/// Reports whether `artifact` is already complete and, if not, which chunk
/// entries are staged for `hash`, in ascending index order.
pub async fn check_status(
    storage: &dyn Storage,
    hash: &ContentHash,
    artifact: &ArtifactName,
) -> Result<UploadStatus, AppError> {
    if storage.artifact_exists(artifact).await? {
        return Ok(UploadStatus {
            should_upload: false,
            uploaded_list: None,
        });
    }

    let mut uploaded = storage.list_chunks(hash).await?.unwrap_or_default();
    // Unparsable names sort last; merge reports them.
    uploaded.sort_by_key(|name| match name.parse::<ChunkId>() {
        Ok(chunk) => (false, chunk.index),
        Err(_) => (true, 0),
    });
    Ok(UploadStatus {
        should_upload: true,
        uploaded_list: Some(uploaded),
    })
}

/// POST /verify
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(req), _): WithRejection<Json<VerifyRequest>, AppError>,
) -> Result<Json<UploadStatus>, AppError> {
    let hash = ContentHash::parse(req.file_hash)?;
    let artifact = ArtifactName::new(&hash, &req.filename)?;

    let status = check_status(state.storage.as_ref(), &hash, &artifact).await?;
    tracing::debug!(
        hash = %hash,
        should_upload = status.should_upload,
        staged = status.uploaded_list.as_ref().map_or(0, Vec::len),
        "checked upload status"
    );
    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ByteStream;
    use crate::storage::driver::memory::MemoryStorage;
    use axum::body::Bytes;
    use tokio::io;

    fn one(data: &'static [u8]) -> ByteStream<'static> {
        Box::pin(futures::stream::once(async move {
            Ok::<_, io::Error>(Bytes::from_static(data))
        }))
    }

    #[tokio::test]
    async fn test_fresh_hash_should_upload_with_empty_list() {
        let storage = MemoryStorage::new();
        let hash = ContentHash::parse("abc").unwrap();
        let artifact = ArtifactName::new(&hash, "a.bin").unwrap();

        let status = check_status(&storage, &hash, &artifact).await.unwrap();
        assert_eq!(
            status,
            UploadStatus {
                should_upload: true,
                uploaded_list: Some(vec![]),
            }
        );
    }

    #[tokio::test]
    async fn test_staged_chunks_listed_in_index_order() {
        let storage = MemoryStorage::new();
        let hash = ContentHash::parse("abc").unwrap();
        let artifact = ArtifactName::new(&hash, "a.bin").unwrap();
        storage.create_staging(&hash).await.unwrap();
        for index in [10, 2, 0] {
            storage
                .write_chunk(&ChunkId::new(hash.clone(), index), one(b"x"))
                .await
                .unwrap();
        }

        let status = check_status(&storage, &hash, &artifact).await.unwrap();
        assert_eq!(
            status.uploaded_list.unwrap(),
            vec!["abc-0", "abc-2", "abc-10"]
        );
    }

    #[tokio::test]
    async fn test_existing_artifact_skips_upload() {
        let storage = MemoryStorage::new();
        let hash = ContentHash::parse("abc").unwrap();
        let artifact = ArtifactName::new(&hash, "a.bin").unwrap();
        storage.create_staging(&hash).await.unwrap();
        storage
            .write_chunk(&ChunkId::new(hash.clone(), 0), one(b"left over"))
            .await
            .unwrap();
        storage.prepare_scratch(&artifact, 0).await.unwrap();
        storage.commit_scratch(&artifact).await.unwrap();

        let status = check_status(&storage, &hash, &artifact).await.unwrap();
        assert!(!status.should_upload);
        assert_eq!(status.uploaded_list, None);
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({ "shouldUpload": false })
        );
    }
}
