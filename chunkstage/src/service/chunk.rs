use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures::{Stream, TryStreamExt};
use thiserror::Error;
use tokio::io;

use crate::domain::{ArtifactName, ChunkId, ContentHash};
use crate::error::AppError;
use crate::storage::ByteStream;
use crate::utils::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored { bytes: u64 },
    /// The artifact was already complete, nothing was written.
    AlreadyMerged,
}

/// Where an uploaded chunk goes.
#[derive(Debug, Clone)]
pub struct ChunkTarget {
    pub chunk: ChunkId,
    pub artifact: ArtifactName,
}

impl ChunkTarget {
    pub fn parse(chunk_name: &str, file_hash: &str, filename: &str) -> Result<Self, AppError> {
        let hash = ContentHash::parse(file_hash)?;
        let chunk: ChunkId = chunk_name
            .parse()
            .map_err(|e| AppError::Validation(format!("{e}")))?;
        if !chunk.belongs_to(&hash) {
            return Err(AppError::Validation(format!(
                "chunk `{chunk_name}` does not belong to file hash `{hash}`"
            )));
        }
        let artifact = ArtifactName::new(&hash, filename)?;
        Ok(ChunkTarget { chunk, artifact })
    }
}

#[derive(Error, Debug)]
#[error("{0}")]
struct ChunkRejected(String);

/// Rejects empty payloads and payloads above `limit` bytes while streaming.
struct GuardedChunk<'a> {
    inner: ByteStream<'a>,
    seen: u64,
    limit: u64,
    finished: bool,
}

impl Stream for GuardedChunk<'_> {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                self.seen += bytes.len() as u64;
                if self.limit > 0 && self.seen > self.limit {
                    self.finished = true;
                    let limit = self.limit;
                    return Poll::Ready(Some(Err(rejected(format!(
                        "chunk exceeds the {limit} byte limit"
                    )))));
                }
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                if self.seen == 0 {
                    return Poll::Ready(Some(Err(rejected("chunk is empty".to_string()))));
                }
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

fn rejected(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, ChunkRejected(msg))
}

/// Sorts a failed chunk write into the client's fault or ours.
fn classify(err: io::Error) -> AppError {
    if let Some(inner) = err.get_ref() {
        if let Some(rejected) = inner.downcast_ref::<ChunkRejected>() {
            return AppError::Validation(rejected.0.clone());
        }
        if let Some(multipart) = inner.downcast_ref::<MultipartError>() {
            return AppError::BadRequest(multipart.body_text());
        }
    }
    AppError::Storage(err)
}

/// Persists one chunk into the staging area of its hash.
///
/// Re-uploading an index replaces the staged entry. Chunks arriving after
/// the artifact is complete are acknowledged and dropped.
pub async fn store_chunk(
    state: &AppState,
    target: &ChunkTarget,
    stream: ByteStream<'_>,
) -> Result<StoreOutcome, AppError> {
    let hash = &target.chunk.hash;
    let _guard = state.locks.shared(hash).await;
    let storage = state.storage.as_ref();

    if storage.artifact_exists(&target.artifact).await? {
        tracing::debug!(chunk = %target.chunk, "artifact complete, chunk skipped");
        return Ok(StoreOutcome::AlreadyMerged);
    }

    storage.create_staging(hash).await?;
    let guarded = GuardedChunk {
        inner: stream,
        seen: 0,
        limit: state.config.max_chunk_size,
        finished: false,
    };
    let bytes = storage
        .write_chunk(&target.chunk, Box::pin(guarded))
        .await
        .map_err(classify)?;

    tracing::debug!(chunk = %target.chunk, bytes, "chunk stored");
    Ok(StoreOutcome::Stored { bytes })
}

#[derive(Default)]
struct UploadFields {
    chunk_name: Option<String>,
    file_hash: Option<String>,
    filename: Option<String>,
}

impl UploadFields {
    fn is_complete(&self) -> bool {
        self.chunk_name.is_some() && self.file_hash.is_some() && self.filename.is_some()
    }

    fn target(&self) -> Result<ChunkTarget, AppError> {
        let missing = |field: &str| AppError::Validation(format!("missing field `{field}`"));
        ChunkTarget::parse(
            self.chunk_name.as_deref().ok_or_else(|| missing("hash"))?,
            self.file_hash.as_deref().ok_or_else(|| missing("fileHash"))?,
            self.filename.as_deref().ok_or_else(|| missing("filename"))?,
        )
    }
}

/// POST /upload
///
/// Multipart fields: `hash` (chunk name), `fileHash`, `filename` and the
/// binary `chunk`. The chunk is streamed to storage when the other fields
/// precede it, and buffered otherwise.
///
/// A second `chunk` field fails the request with 400. If the first one was
/// already streamed, it stays staged; it is a complete chunk and a later
/// upload of the same index replaces it.
pub async fn upload_chunk_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut fields = UploadFields::default();
    let mut outcome = None;
    let mut buffered: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "hash" => fields.chunk_name = Some(field.text().await?),
            "fileHash" => fields.file_hash = Some(field.text().await?),
            "filename" => fields.filename = Some(field.text().await?),
            "chunk" => {
                if outcome.is_some() || buffered.is_some() {
                    return Err(AppError::Validation("duplicate field `chunk`".into()));
                }
                if fields.is_complete() {
                    let target = fields.target()?;
                    let stream: ByteStream<'_> = Box::pin(field.map_err(io::Error::other));
                    outcome = Some(store_chunk(&state, &target, stream).await?);
                } else {
                    buffered = Some(field.bytes().await?);
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let outcome = match (outcome, buffered) {
        (Some(outcome), _) => outcome,
        (None, Some(bytes)) => {
            let target = fields.target()?;
            let stream: ByteStream<'_> =
                Box::pin(futures::stream::once(async move { Ok::<_, io::Error>(bytes) }));
            store_chunk(&state, &target, stream).await?
        }
        (None, None) => return Err(AppError::Validation("missing field `chunk`".into())),
    };

    let message = match outcome {
        StoreOutcome::Stored { .. } => "received file chunk",
        StoreOutcome::AlreadyMerged => "file already merged, chunk skipped",
    };
    Ok((StatusCode::OK, message))
}
