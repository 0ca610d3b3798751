use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum_extra::extract::WithRejection;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::domain::{ArtifactName, ChunkId, ContentHash};
use crate::error::AppError;
use crate::storage::Storage;
use crate::utils::state::AppState;

/// Upper bound on how many missing indices an error reports.
const MAX_REPORTED_MISSING: usize = 32;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub filename: String,
    pub file_hash: String,
    /// Bytes per chunk.
    pub size: u64,
    /// Total file size, checked against the staged chunks when present.
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged { chunks: usize, bytes: u64 },
    /// The artifact already existed; leftover staging was cleared.
    AlreadyMerged,
}

/// One chunk's byte range in the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub chunk: ChunkId,
    pub offset: u64,
    pub len: u64,
}

impl Segment {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Ordered, validated layout of an artifact.
///
/// Segments are sorted by index, contiguous from index 0 and pairwise
/// disjoint, so they can be written concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub segments: Vec<Segment>,
    pub total_len: u64,
}

impl MergePlan {
    /// Lays out `chunks` (id and staged length, in any order) at
    /// `index * chunk_size`.
    ///
    /// Every chunk except the last must be exactly `chunk_size` bytes and the
    /// last at most that, otherwise ranges could overlap or leave holes.
    pub fn build(
        hash: &ContentHash,
        mut chunks: Vec<(ChunkId, u64)>,
        chunk_size: u64,
        expected_total: Option<u64>,
    ) -> Result<Self, AppError> {
        if chunk_size == 0 {
            return Err(AppError::Validation("chunk size must be greater than zero".into()));
        }
        if chunks.is_empty() {
            return Err(AppError::UploadUnknown(hash.to_string()));
        }
        if let Some((chunk, _)) = chunks.iter().find(|(chunk, _)| !chunk.belongs_to(hash)) {
            return Err(AppError::CorruptState(format!(
                "chunk {chunk} is staged under {hash}"
            )));
        }

        chunks.sort_by_key(|(chunk, _)| chunk.index);
        if let Some(pair) = chunks.windows(2).find(|w| w[0].0.index == w[1].0.index) {
            return Err(AppError::CorruptState(format!(
                "multiple entries for chunk index {}",
                pair[0].0.index
            )));
        }
        if chunks
            .iter()
            .enumerate()
            .any(|(pos, (chunk, _))| chunk.index != pos as u64)
        {
            return Err(AppError::IncompleteUpload {
                hash: hash.to_string(),
                missing: missing_indices(&chunks),
            });
        }

        let last = chunks.len() - 1;
        let mut segments = Vec::with_capacity(chunks.len());
        for (pos, (chunk, len)) in chunks.into_iter().enumerate() {
            if (pos < last && len != chunk_size) || len > chunk_size {
                return Err(AppError::ChunkSizeMismatch(format!(
                    "chunk {chunk} holds {len} bytes but the chunk size is {chunk_size}"
                )));
            }
            let offset = chunk.index.checked_mul(chunk_size).ok_or_else(|| {
                AppError::ChunkSizeMismatch(format!("offset of chunk {chunk} overflows"))
            })?;
            segments.push(Segment { chunk, offset, len });
        }

        let total_len = segments.last().map_or(0, Segment::end);
        if let Some(expected) = expected_total {
            if expected != total_len {
                return Err(AppError::ChunkSizeMismatch(format!(
                    "staged chunks add up to {total_len} bytes, expected {expected}"
                )));
            }
        }

        let plan = MergePlan {
            segments,
            total_len,
        };
        if !plan.is_disjoint() {
            return Err(AppError::CorruptState(format!(
                "segments of {hash} overlap"
            )));
        }
        Ok(plan)
    }

    /// True when no two segments share a byte.
    pub fn is_disjoint(&self) -> bool {
        self.segments
            .windows(2)
            .all(|w| w[0].end() <= w[1].offset)
    }
}

fn missing_indices(sorted: &[(ChunkId, u64)]) -> Vec<u64> {
    let mut missing = Vec::new();
    let mut expected = 0u64;
    for (chunk, _) in sorted {
        for index in expected..chunk.index {
            if missing.len() == MAX_REPORTED_MISSING {
                return missing;
            }
            missing.push(index);
        }
        expected = chunk.index + 1;
    }
    missing
}

fn parse_entries(hash: &ContentHash, names: &[String]) -> Result<Vec<ChunkId>, AppError> {
    names
        .iter()
        .map(|name| {
            let chunk: ChunkId = name
                .parse()
                .map_err(|e| AppError::CorruptState(format!("{e}")))?;
            // Entries are always written under their canonical name.
            if chunk.name() != *name {
                return Err(AppError::CorruptState(format!(
                    "entry `{name}` is not a canonical chunk name"
                )));
            }
            if !chunk.belongs_to(hash) {
                return Err(AppError::CorruptState(format!(
                    "entry `{name}` does not belong to {hash}"
                )));
            }
            Ok(chunk)
        })
        .collect()
}

async fn copy_segment(
    storage: &dyn Storage,
    artifact: &ArtifactName,
    segment: &Segment,
) -> Result<(), AppError> {
    let copied = storage
        .copy_chunk_to_scratch(&segment.chunk, artifact, segment.offset)
        .await?;
    if copied != segment.len {
        return Err(AppError::CorruptState(format!(
            "chunk {} changed during merge: copied {copied} of {} bytes",
            segment.chunk, segment.len
        )));
    }
    Ok(())
}

async fn write_segments(
    storage: &dyn Storage,
    artifact: &ArtifactName,
    plan: &MergePlan,
    concurrency: usize,
) -> Result<(), AppError> {
    let copies: Vec<_> = plan
        .segments
        .iter()
        .map(|segment| copy_segment(storage, artifact, segment))
        .collect();
    futures::stream::iter(copies)
        .buffer_unordered(concurrency.max(1))
        .try_collect::<Vec<()>>()
        .await?;
    Ok(())
}

async fn clear_staging(
    storage: &dyn Storage,
    hash: &ContentHash,
    chunks: &[ChunkId],
) -> Result<(), AppError> {
    for chunk in chunks {
        storage.delete_chunk(chunk).await?;
    }
    storage.remove_staging(hash).await?;
    Ok(())
}

/// Reassembles the staged chunks of `hash` into `artifact`.
///
/// The artifact is built in scratch space and published by rename; staged
/// chunks are deleted only after that, so a failed merge leaves staging
/// intact and can be retried as is. Concurrent merges of one hash fail with
/// [`AppError::MergeInProgress`].
pub async fn merge_chunks(
    state: &AppState,
    hash: &ContentHash,
    artifact: &ArtifactName,
    chunk_size: u64,
    expected_total: Option<u64>,
) -> Result<MergeOutcome, AppError> {
    let _guard = state
        .locks
        .try_exclusive(hash)
        .await
        .ok_or_else(|| AppError::MergeInProgress(hash.to_string()))?;
    let storage = state.storage.as_ref();

    let names = storage.list_chunks(hash).await?;
    if storage.artifact_exists(artifact).await? {
        // A previous merge published the artifact but did not finish cleanup.
        if let Some(names) = names {
            let chunks = parse_entries(hash, &names)?;
            clear_staging(storage, hash, &chunks).await?;
            tracing::info!(hash = %hash, leftovers = chunks.len(), "cleared staging of merged file");
        }
        return Ok(MergeOutcome::AlreadyMerged);
    }
    let names = names.unwrap_or_default();

    let chunks = parse_entries(hash, &names)?;
    let mut sized = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let len = storage.chunk_len(&chunk).await?;
        sized.push((chunk, len));
    }
    let plan = MergePlan::build(hash, sized, chunk_size, expected_total)?;

    storage.prepare_scratch(artifact, plan.total_len).await?;
    let written = match write_segments(storage, artifact, &plan, state.config.merge_concurrency).await {
        Ok(()) => storage.commit_scratch(artifact).await.map_err(AppError::from),
        Err(err) => Err(err),
    };
    if let Err(err) = written {
        if let Err(discard_err) = storage.discard_scratch(artifact).await {
            tracing::warn!(artifact = %artifact, "failed to discard scratch artifact: {discard_err}");
        }
        return Err(err);
    }

    let merged: Vec<ChunkId> = plan.segments.iter().map(|s| s.chunk.clone()).collect();
    clear_staging(storage, hash, &merged).await?;
    tracing::info!(
        hash = %hash,
        artifact = %artifact,
        chunks = plan.segments.len(),
        bytes = plan.total_len,
        "file merged"
    );
    Ok(MergeOutcome::Merged {
        chunks: plan.segments.len(),
        bytes: plan.total_len,
    })
}

/// POST /merge
pub async fn merge_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(req), _): WithRejection<Json<MergeRequest>, AppError>,
) -> Result<Json<MergeResponse>, AppError> {
    let hash = ContentHash::parse(req.file_hash)?;
    let artifact = ArtifactName::new(&hash, &req.filename)?;

    let outcome = merge_chunks(&state, &hash, &artifact, req.size, req.file_size).await?;
    let message = match outcome {
        MergeOutcome::Merged { .. } => "file merged success",
        MergeOutcome::AlreadyMerged => "file already merged",
    };
    Ok(Json(MergeResponse {
        code: 0,
        message: message.to_string(),
    }))
}
