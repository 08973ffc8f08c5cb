//! Byte-accurate transfer progress
//!
//! A [`TransferProgress`] is a per-batch sink: it is constructed for an
//! explicit set of mirror paths, carries the total expected bytes for that
//! set, and is advanced by every transfer that moves or skips one of its
//! tracked items. Skipped transfers still credit their bytes, so totals stay
//! accurate when most of a batch is already synchronized.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::MirrorContext;
use crate::error::Result;
use crate::mirror::MirrorPath;
use crate::query;

/// Progress sink for one batch of transfers
#[derive(Debug)]
pub struct TransferProgress {
    total_bytes: u64,
    transferred: AtomicU64,
    tracked: HashSet<String>,
    bar: Option<indicatif::ProgressBar>,
}

impl TransferProgress {
    /// Build a sink from known (key, size) pairs, with no progress bar
    pub fn from_sizes(items: impl IntoIterator<Item = (String, u64)>) -> Self {
        let mut total_bytes = 0;
        let mut tracked = HashSet::new();
        for (key, size) in items {
            total_bytes += size;
            tracked.insert(key);
        }
        Self {
            total_bytes,
            transferred: AtomicU64::new(0),
            tracked,
            bar: None,
        }
    }

    /// Attach a progress bar with the given description
    pub fn with_bar(mut self, desc: &str) -> Self {
        let bar = indicatif::ProgressBar::new(self.total_bytes);
        bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .expect("valid template")
                .progress_chars("#>-"),
        );
        bar.set_message(desc.to_string());
        self.bar = Some(bar);
        self
    }

    /// Sink for downloading a set of paths: totals come from remote sizes
    pub async fn for_download(ctx: &MirrorContext, paths: &[MirrorPath]) -> Result<Self> {
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            let key = path.bare_key();
            let size = query::key_size(ctx.store(), ctx.bucket(), &key).await?;
            items.push((key, size));
        }
        Ok(Self::from_sizes(items).with_bar("Download progress"))
    }

    /// Sink for uploading a set of paths: totals come from local sizes
    pub fn for_upload(ctx: &MirrorContext, paths: &[MirrorPath]) -> Result<Self> {
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            items.push((path.bare_key(), path.local_size(ctx)?));
        }
        Ok(Self::from_sizes(items).with_bar("Upload progress"))
    }

    /// Whether a key belongs to this sink's tracked set
    pub fn tracks(&self, key: &str) -> bool {
        self.tracked.contains(key)
    }

    /// Advance the transferred byte count
    pub fn advance(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
        if let Some(bar) = &self.bar {
            bar.inc(bytes);
        }
    }

    /// Credit a skipped transfer, if its key is tracked here
    pub fn credit_skip(&self, key: &str, bytes: u64) {
        if self.tracks(key) {
            self.advance(bytes);
        }
    }

    /// Bytes transferred (or credited) so far
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    /// Total expected bytes for the tracked set
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Finish and clear the progress bar, if visible
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_and_advance() {
        let progress =
            TransferProgress::from_sizes([("a/x".to_string(), 10), ("a/y".to_string(), 5)]);
        assert_eq!(progress.total_bytes(), 15);
        assert_eq!(progress.transferred(), 0);

        progress.advance(10);
        progress.advance(5);
        assert_eq!(progress.transferred(), 15);
    }

    #[test]
    fn test_credit_skip_only_tracked() {
        let progress = TransferProgress::from_sizes([("a/x".to_string(), 10)]);

        progress.credit_skip("a/x", 10);
        assert_eq!(progress.transferred(), 10);

        // Untracked keys don't count toward this batch
        progress.credit_skip("other/key", 99);
        assert_eq!(progress.transferred(), 10);
    }

    #[test]
    fn test_tracks() {
        let progress = TransferProgress::from_sizes([("a/x".to_string(), 1)]);
        assert!(progress.tracks("a/x"));
        assert!(!progress.tracks("a/y"));
    }
}
