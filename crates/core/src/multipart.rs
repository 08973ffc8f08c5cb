//! Resumable multipart uploads
//!
//! Large uploads are split into independently retriable parts. An interrupted
//! upload leaves its uploaded parts on the store; [`resume`] reconstructs that
//! state from the store's own listing (nothing is persisted locally), uploads
//! the remaining parts concurrently, and completes with the full ordered part
//! list. Completed objects are verified against the local source and repaired
//! by delete-and-restart, bounded by [`MAX_INTEGRITY_RETRIES`].

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use futures::{stream, StreamExt, TryStreamExt};

use crate::context::MirrorContext;
use crate::error::{Error, Result};
use crate::mirror::MirrorPath;
use crate::progress::TransferProgress;
use crate::traits::{CompletedPart, UploadedPart};

/// One mebibyte
pub const MB: u64 = 1024 * 1024;

/// Default part size: 64 MiB
pub const DEFAULT_PART_SIZE: u64 = 64 * MB;

/// Minimum part size: 5 MiB (S3 requirement)
pub const MIN_PART_SIZE: u64 = 5 * MB;

/// Maximum part size: 5 GiB
pub const MAX_PART_SIZE: u64 = 5 * 1024 * MB;

/// Maximum number of parts: 10,000 (S3 limit)
pub const MAX_PARTS: usize = 10_000;

/// Default number of concurrent part uploads
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Completed-object size tolerance before a repair is triggered
pub const SIZE_MISMATCH_TOLERANCE: u64 = MB;

/// Delete-and-restart attempts before surfacing the mismatch
pub const MAX_INTEGRITY_RETRIES: u32 = 3;

/// Multipart upload configuration
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Part size in bytes
    pub part_size: u64,

    /// Number of concurrent part uploads
    pub concurrency: usize,

    /// File size at which uploads switch to multipart
    pub threshold: u64,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            threshold: DEFAULT_PART_SIZE,
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part_size(mut self, size: u64) -> Self {
        self.part_size = size.clamp(MIN_PART_SIZE, MAX_PART_SIZE);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn threshold(mut self, bytes: u64) -> Self {
        self.threshold = bytes;
        self
    }

    /// Calculate appropriate part size for a file
    pub fn calculate_part_size(&self, file_size: u64) -> u64 {
        // If file fits in one part, use minimum
        if file_size <= MIN_PART_SIZE {
            return MIN_PART_SIZE;
        }

        let parts = file_size.div_ceil(self.part_size);
        if parts <= MAX_PARTS as u64 {
            self.part_size
        } else {
            // Need larger parts to fit within the 10,000 limit
            let required_size = file_size.div_ceil(MAX_PARTS as u64);
            required_size.clamp(MIN_PART_SIZE, MAX_PART_SIZE)
        }
    }
}

/// An in-progress multipart upload, as tracked by the remote store
#[derive(Debug, Clone)]
pub struct MultipartUploadState {
    /// Store-assigned upload id
    pub upload_id: String,

    /// Target key
    pub key: String,

    /// Fixed part size, inferred from the uploaded parts
    pub part_size: u64,

    /// Parts uploaded so far, in part-number order
    pub parts: Vec<UploadedPart>,
}

/// Calculate number of parts for a file
pub fn calculate_parts(file_size: u64, part_size: u64) -> usize {
    file_size.div_ceil(part_size) as usize
}

/// Get byte range for a part
pub fn part_byte_range(part_number: i32, part_size: u64, total_size: u64) -> (u64, u64) {
    let start = (part_number as u64 - 1) * part_size;
    let end = (start + part_size).min(total_size);
    (start, end)
}

/// Find the open multipart upload for a mirror path, if a resumable one
/// exists.
///
/// An open upload with zero parts is stale: it is aborted and skipped rather
/// than resumed.
pub async fn find_open_upload(
    ctx: &MirrorContext,
    mirror_path: &MirrorPath,
) -> Result<Option<MultipartUploadState>> {
    let key = mirror_path.bare_key();
    for upload in ctx.store().list_multipart_uploads(ctx.bucket()).await? {
        if upload.key != key {
            continue;
        }
        let mut parts = ctx
            .store()
            .list_parts(ctx.bucket(), &key, &upload.upload_id)
            .await?;
        if parts.is_empty() {
            tracing::warn!(%key, upload_id = %upload.upload_id, "aborting stale multipart upload with no parts");
            ctx.store()
                .abort_multipart_upload(ctx.bucket(), &key, &upload.upload_id)
                .await?;
            continue;
        }
        parts.sort_by_key(|part| part.part_number);
        let part_size = parts[0].size;
        return Ok(Some(MultipartUploadState {
            upload_id: upload.upload_id,
            key,
            part_size,
            parts,
        }));
    }
    Ok(None)
}

/// Resume the open multipart upload for a mirror path.
///
/// With no resumable upload this degrades to a plain
/// `upload_from_mirror_if_not_present`. Otherwise the remaining parts are
/// uploaded concurrently and the upload is completed and verified; a size
/// mismatch beyond [`SIZE_MISMATCH_TOLERANCE`] deletes the object and
/// restarts the procedure from `find_open_upload`.
pub async fn resume(
    ctx: &MirrorContext,
    mirror_path: &MirrorPath,
    progress: Option<&TransferProgress>,
) -> Result<()> {
    let mut attempts = 0;
    loop {
        attempts += 1;

        let Some(state) = find_open_upload(ctx, mirror_path).await? else {
            tracing::info!(
                key = %mirror_path.bare_key(),
                "no resumable multipart upload found, uploading directly"
            );
            return mirror_path
                .upload_from_mirror_if_not_present(ctx, progress)
                .await;
        };

        // All uploaded parts except possibly the last must share one size
        for part in &state.parts[..state.parts.len() - 1] {
            if part.size != state.part_size {
                return Err(Error::MultipartResume(format!(
                    "part {} of {} has size {} instead of {}",
                    part.part_number, state.key, part.size, state.part_size
                )));
            }
        }

        match upload_remaining_parts(ctx, mirror_path, &state, progress).await? {
            None => return Ok(()),
            Some((expected, actual)) => {
                tracing::warn!(
                    key = %state.key,
                    attempts,
                    expected,
                    actual,
                    "completed object size mismatch, deleting and restarting"
                );
                ctx.store().delete_object(ctx.bucket(), &state.key).await?;
                if attempts >= MAX_INTEGRITY_RETRIES {
                    return Err(Error::TransferIntegrity {
                        key: state.key,
                        expected,
                        actual,
                    });
                }
            }
        }
    }
}

/// Upload a file as a fresh multipart upload, with the same completion
/// verification and bounded delete-and-restart repair as [`resume`].
pub async fn upload_via_multipart(
    ctx: &MirrorContext,
    mirror_path: &MirrorPath,
    progress: Option<&TransferProgress>,
) -> Result<()> {
    let key = mirror_path.bare_key();
    let total_size = std::fs::metadata(mirror_path.local_path(ctx))?.len();
    let part_size = ctx.multipart().calculate_part_size(total_size);

    let mut attempts = 0;
    loop {
        attempts += 1;

        let upload_id = ctx.store().create_multipart_upload(ctx.bucket(), &key).await?;
        let state = MultipartUploadState {
            upload_id,
            key: key.clone(),
            part_size,
            parts: Vec::new(),
        };

        match upload_remaining_parts(ctx, mirror_path, &state, progress).await? {
            None => return Ok(()),
            Some((expected, actual)) => {
                tracing::warn!(
                    key = %key,
                    attempts,
                    expected,
                    actual,
                    "completed object size mismatch, deleting and restarting"
                );
                ctx.store().delete_object(ctx.bucket(), &key).await?;
                if attempts >= MAX_INTEGRITY_RETRIES {
                    return Err(Error::TransferIntegrity {
                        key,
                        expected,
                        actual,
                    });
                }
            }
        }
    }
}

/// Upload every part past the already-uploaded prefix, complete, and verify.
///
/// Returns None on success, or the (expected, actual) sizes of a completed
/// object that failed verification.
async fn upload_remaining_parts(
    ctx: &MirrorContext,
    mirror_path: &MirrorPath,
    state: &MultipartUploadState,
    progress: Option<&TransferProgress>,
) -> Result<Option<(u64, u64)>> {
    let local = mirror_path.local_path(ctx);
    let total_size = std::fs::metadata(&local)?.len();
    let part_size = state.part_size;

    let total_parts = calculate_parts(total_size, part_size).max(1) as i32;
    let uploaded_parts = state.parts.len() as i32;
    if uploaded_parts > total_parts {
        return Err(Error::MultipartResume(format!(
            "{} has {uploaded_parts} uploaded parts but the local file only provides {total_parts}",
            state.key
        )));
    }

    // The uploaded prefix counts toward this batch immediately
    let resumed_bytes = (part_size * uploaded_parts as u64).min(total_size);
    if let Some(progress) = progress {
        progress.advance(resumed_bytes);
    }

    let new_parts: Vec<(i32, String)> = stream::iter(uploaded_parts + 1..=total_parts)
        .map(|part_number| {
            let local = local.clone();
            async move {
                let (start, end) = part_byte_range(part_number, part_size, total_size);
                let data = read_file_range(&local, start, end)?;
                let len = data.len() as u64;
                let etag = ctx
                    .store()
                    .upload_part(ctx.bucket(), &state.key, &state.upload_id, part_number, data)
                    .await?;
                if let Some(progress) = progress {
                    progress.advance(len);
                }
                Ok::<_, Error>((part_number, etag))
            }
        })
        .buffer_unordered(ctx.multipart().concurrency)
        .try_collect()
        .await?;

    // Old and new parts together, always in part-number order regardless of
    // completion order
    let mut completed: Vec<CompletedPart> = state
        .parts
        .iter()
        .map(|part| CompletedPart {
            part_number: part.part_number,
            etag: part.etag.clone(),
        })
        .collect();
    completed.extend(
        new_parts
            .into_iter()
            .map(|(part_number, etag)| CompletedPart { part_number, etag }),
    );
    completed.sort_by_key(|part| part.part_number);

    ctx.store()
        .complete_multipart_upload(ctx.bucket(), &state.key, &state.upload_id, completed)
        .await?;

    let info = ctx.store().head_object(ctx.bucket(), &state.key).await?;
    let actual = info.size_bytes.unwrap_or(0).max(0) as u64;
    if actual.abs_diff(total_size) > SIZE_MISMATCH_TOLERANCE {
        return Ok(Some((total_size, actual)));
    }
    Ok(None)
}

fn read_file_range(path: &Path, start: u64, end: u64) -> Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; (end - start) as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
