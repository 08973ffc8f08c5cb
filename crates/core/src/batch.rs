//! Bulk transfers over sets of mirror paths
//!
//! Each path is one task; tasks run concurrently up to a bounded width with
//! no ordering guaranteed across paths. The progress sink is passed in
//! explicitly and shared by every task in the batch.

use futures::{stream, StreamExt, TryStreamExt};

use crate::context::MirrorContext;
use crate::error::Result;
use crate::mirror::MirrorPath;
use crate::progress::TransferProgress;

/// Default number of concurrent transfers in a batch
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// Download every path in the batch to the mirror
pub async fn download_all(
    ctx: &MirrorContext,
    paths: &[MirrorPath],
    overwrite: bool,
    concurrency: usize,
    progress: Option<&TransferProgress>,
) -> Result<()> {
    stream::iter(paths)
        .map(|path| path.download_to_mirror(ctx, overwrite, progress))
        .buffer_unordered(concurrency.max(1))
        .try_collect::<Vec<()>>()
        .await?;
    Ok(())
}

/// Upload every path in the batch from the mirror
pub async fn upload_all(
    ctx: &MirrorContext,
    paths: &[MirrorPath],
    overwrite: bool,
    concurrency: usize,
    progress: Option<&TransferProgress>,
) -> Result<()> {
    stream::iter(paths)
        .map(|path| path.upload_from_mirror(ctx, overwrite, progress))
        .buffer_unordered(concurrency.max(1))
        .try_collect::<Vec<()>>()
        .await?;
    Ok(())
}
