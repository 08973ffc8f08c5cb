//! Mirror paths
//!
//! A [`MirrorPath`] binds a remote key to its projection under the local
//! mirror root and orchestrates transfers between the two. Derived-path
//! operations (sibling, child, parent, trim, segment replacement) are pure
//! functions over the segment list; anything touching the store or the
//! filesystem takes an explicit [`MirrorContext`].

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;

use crate::codec::CodecRegistry;
use crate::context::MirrorContext;
use crate::error::{Error, Result};
use crate::matching;
use crate::multipart;
use crate::progress::TransferProgress;
use crate::query;
use crate::segment::{segments_from_key, KeySegment};

/// A remote key and its local mirror location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPath {
    segments: Vec<KeySegment>,
    local_override: Option<PathBuf>,
}

impl MirrorPath {
    /// Create from a segment list
    pub fn new(segments: Vec<KeySegment>) -> Self {
        Self {
            segments,
            local_override: None,
        }
    }

    /// Create from a remote key
    pub fn from_key(key: &str) -> Self {
        Self::new(segments_from_key(key))
    }

    /// Create from a path under the mirror root
    pub fn from_local_path(local_path: &Path, ctx: &MirrorContext) -> Result<Self> {
        let relative = local_path.strip_prefix(ctx.mirror_root()).map_err(|_| {
            Error::InvalidKey(format!(
                "{} is not under the mirror root {}",
                local_path.display(),
                ctx.mirror_root().display()
            ))
        })?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Ok(Self::from_key(&key))
    }

    /// Pin the local side to an explicit path instead of the mirror root
    pub fn with_local_path(mut self, local_path: impl Into<PathBuf>) -> Self {
        self.local_override = Some(local_path.into());
        self
    }

    /// The remote key without folder decoration
    ///
    /// This is the canonical form used for every remote query and as the
    /// progress-tracking identity.
    pub fn bare_key(&self) -> String {
        self.segments
            .iter()
            .map(|seg| seg.name.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The rendered remote key
    ///
    /// A name without a `.` in the deepest segment renders with a trailing
    /// slash. This decides only how the key prints; file-vs-folder behavior
    /// always follows remote metadata.
    pub fn key(&self) -> String {
        let key = self.bare_key();
        match self.segments.last().and_then(|seg| seg.name.as_deref()) {
            Some(name) if !name.contains('.') => format!("{key}/"),
            _ => key,
        }
    }

    /// The local path this key projects onto
    pub fn local_path(&self, ctx: &MirrorContext) -> PathBuf {
        match &self.local_override {
            Some(path) => path.clone(),
            None => ctx.mirror_root().join(self.bare_key()),
        }
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    pub fn key_segment(&self, index: usize) -> Option<&KeySegment> {
        self.segments.get(index)
    }

    /// Keep only the first `max_depth` segments
    pub fn trim(&self, max_depth: usize) -> Self {
        Self::new(self.segments[..max_depth.min(self.segments.len())].to_vec())
    }

    /// Replace segments by absolute depth, padding gaps with empty names
    pub fn replace_key_segments(&self, replacements: &[KeySegment]) -> Result<Self> {
        let mut segments = self.segments.clone();
        for seg in replacements {
            let depth = usize::try_from(seg.depth).map_err(|_| {
                Error::InvalidKey(format!("negative absolute depth {}", seg.depth))
            })?;
            while depth >= segments.len() {
                segments.push(KeySegment::named(segments.len() as i32, ""));
            }
            segments[depth] = seg.clone();
        }
        Ok(Self::new(segments))
    }

    /// Replace segments at depth relative to the deepest segment
    /// (0 = deepest, 1 = child, -1 = second-deepest)
    pub fn replace_at_relative_depth(&self, replacements: &[KeySegment]) -> Result<Self> {
        let offset = self.segments.len() as i32 - 1;
        let absolute: Vec<KeySegment> = replacements
            .iter()
            .map(|seg| {
                let mut seg = seg.clone();
                seg.depth += offset;
                seg
            })
            .collect();
        self.replace_key_segments(&absolute)
    }

    /// A path with the same parent and a different deepest name
    pub fn sibling(&self, name: impl Into<String>) -> Result<Self> {
        self.replace_at_relative_depth(&[KeySegment::named(0, name)])
    }

    /// A path one level below this one
    pub fn child(&self, name: impl Into<String>) -> Result<Self> {
        self.replace_at_relative_depth(&[KeySegment::named(1, name)])
    }

    /// The path one level above this one, if any
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self::new(
            self.segments[..self.segments.len() - 1].to_vec(),
        ))
    }

    /// Check if anything exists at the local path
    pub fn exists_in_mirror(&self, ctx: &MirrorContext) -> bool {
        self.local_path(ctx).exists()
    }

    /// Local size in bytes; directories sum their files recursively
    pub fn local_size(&self, ctx: &MirrorContext) -> Result<u64> {
        let local = self.local_path(ctx);
        if local.is_dir() {
            dir_size(&local)
        } else {
            Ok(std::fs::metadata(&local)?.len())
        }
    }

    /// Check if the key has any listing entry on the remote store
    pub async fn exists_on_s3(&self, ctx: &MirrorContext) -> Result<bool> {
        query::key_exists(ctx.store(), ctx.bucket(), &self.bare_key()).await
    }

    /// Classify the key as file or folder via remote metadata
    pub async fn is_file_on_s3(&self, ctx: &MirrorContext) -> Result<bool> {
        query::key_is_file(ctx.store(), ctx.bucket(), &self.bare_key()).await
    }

    /// Remote size in bytes
    pub async fn remote_size(&self, ctx: &MirrorContext) -> Result<u64> {
        query::key_size(ctx.store(), ctx.bucket(), &self.bare_key()).await
    }

    /// All direct children of this key on the remote store
    pub async fn children_on_s3(&self, ctx: &MirrorContext) -> Result<Vec<Self>> {
        let keys = query::list_child_keys(ctx.store(), ctx.bucket(), &self.bare_key()).await?;
        Ok(keys.iter().map(|key| Self::from_key(key)).collect())
    }

    /// Download this key into the mirror.
    ///
    /// An existing local file short-circuits (still crediting its bytes to a
    /// tracking sink) unless `overwrite` is set. Folders recurse over every
    /// remote child into the corresponding local subpath.
    pub async fn download_to_mirror(
        &self,
        ctx: &MirrorContext,
        overwrite: bool,
        progress: Option<&TransferProgress>,
    ) -> Result<()> {
        self.download_inner(ctx, overwrite, progress).await
    }

    /// Download only when the local side is missing
    pub async fn download_to_mirror_if_not_present(
        &self,
        ctx: &MirrorContext,
        progress: Option<&TransferProgress>,
    ) -> Result<()> {
        self.download_to_mirror(ctx, false, progress).await
    }

    fn download_inner<'a>(
        &'a self,
        ctx: &'a MirrorContext,
        overwrite: bool,
        progress: Option<&'a TransferProgress>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !overwrite && self.exists_in_mirror(ctx) {
                if let Some(progress) = progress {
                    progress.credit_skip(&self.bare_key(), self.local_size(ctx)?);
                }
                return Ok(());
            }

            let key = self.bare_key();
            if query::key_is_file(ctx.store(), ctx.bucket(), &key).await? {
                let data = ctx.store().get_object(ctx.bucket(), &key).await?;
                let local = self.local_path(ctx);
                if let Some(parent) = local.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&local, &data)?;
                if let Some(progress) = progress {
                    progress.advance(data.len() as u64);
                }
                return Ok(());
            }

            let local = self.local_path(ctx);
            for child_key in query::list_child_keys(ctx.store(), ctx.bucket(), &key).await? {
                let mut child = Self::from_key(&child_key);
                if self.local_override.is_some() {
                    let relative = child
                        .bare_key()
                        .strip_prefix(&format!("{key}/"))
                        .map(str::to_string)
                        .unwrap_or_else(|| child.bare_key());
                    child = child.with_local_path(local.join(relative));
                }
                child.download_inner(ctx, overwrite, progress).await?;
            }
            Ok(())
        })
    }

    /// Upload the local side of this path to the remote store.
    ///
    /// An existing remote key short-circuits (still crediting local bytes to
    /// a tracking sink) unless `overwrite` is set. Local directories recurse,
    /// uploading each file under its relative key suffix. Files at or above
    /// the multipart threshold go through the multipart engine.
    pub async fn upload_from_mirror(
        &self,
        ctx: &MirrorContext,
        overwrite: bool,
        progress: Option<&TransferProgress>,
    ) -> Result<()> {
        self.upload_inner(ctx, overwrite, progress).await
    }

    /// Upload only when the remote side is missing
    pub async fn upload_from_mirror_if_not_present(
        &self,
        ctx: &MirrorContext,
        progress: Option<&TransferProgress>,
    ) -> Result<()> {
        self.upload_from_mirror(ctx, false, progress).await
    }

    fn upload_inner<'a>(
        &'a self,
        ctx: &'a MirrorContext,
        overwrite: bool,
        progress: Option<&'a TransferProgress>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !overwrite && self.exists_on_s3(ctx).await? {
                if let Some(progress) = progress {
                    progress.credit_skip(&self.bare_key(), self.local_size(ctx)?);
                }
                return Ok(());
            }

            let local = self.local_path(ctx);
            if local.is_dir() {
                for entry in std::fs::read_dir(&local)? {
                    let entry = entry?;
                    let name = entry.file_name().to_string_lossy().to_string();
                    let child = self.child(name)?.with_local_path(entry.path());
                    child.upload_inner(ctx, overwrite, progress).await?;
                }
                return Ok(());
            }

            let size = std::fs::metadata(&local)?.len();
            if size >= ctx.multipart().threshold {
                return multipart::upload_via_multipart(ctx, self, progress).await;
            }

            let data = std::fs::read(&local)?;
            let content_type = mime_guess::from_path(&local)
                .first()
                .map(|m| m.essence_str().to_string());
            ctx.store()
                .put_object(ctx.bucket(), &self.bare_key(), data, content_type)
                .await?;
            if let Some(progress) = progress {
                progress.advance(size);
            }
            Ok(())
        })
    }

    /// Server-side copy of this key to another mirror path
    pub async fn copy_s3_only(&self, ctx: &MirrorContext, dest: &Self) -> Result<()> {
        ctx.store()
            .copy_object(ctx.bucket(), &self.bare_key(), &dest.bare_key())
            .await?;
        Ok(())
    }

    /// Copy the local file of this path onto another path's local file
    pub fn copy_mirror_only(&self, ctx: &MirrorContext, dest: &Self) -> Result<()> {
        let dest_path = dest.local_path(ctx);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(self.local_path(ctx), dest_path)?;
        Ok(())
    }

    /// Copy this path to a destination on both sides.
    ///
    /// With the mirror as source: local copy, then force-upload the
    /// destination. Otherwise: server-side copy, then force-download the
    /// destination. The two legs are not atomic; re-running the copy repairs
    /// a crash between them.
    pub async fn copy_to_mirror_path(
        &self,
        ctx: &MirrorContext,
        dest: &Self,
        use_mirror_as_source: bool,
        progress: Option<&TransferProgress>,
    ) -> Result<()> {
        if use_mirror_as_source {
            self.copy_mirror_only(ctx, dest)?;
            dest.upload_from_mirror(ctx, true, progress).await
        } else {
            self.copy_s3_only(ctx, dest).await?;
            dest.download_to_mirror(ctx, true, progress).await
        }
    }

    /// Remove the local side, recursing through directories
    pub fn delete_local(&self, ctx: &MirrorContext) -> Result<()> {
        let local = self.local_path(ctx);
        if !local.exists() {
            return Ok(());
        }
        if local.is_dir() {
            std::fs::remove_dir_all(&local)?;
        } else {
            std::fs::remove_file(&local)?;
        }
        Ok(())
    }

    /// Remove the remote side (files singly, folders by descendant sweep)
    pub async fn delete_s3(&self, ctx: &MirrorContext) -> Result<()> {
        query::delete_key(ctx.store(), ctx.bucket(), &self.bare_key()).await
    }

    /// Remove both sides
    pub async fn delete_all(&self, ctx: &MirrorContext) -> Result<()> {
        self.delete_local(ctx)?;
        self.delete_s3(ctx).await
    }

    /// Load the local file through the registered codec for its suffix,
    /// downloading it first when requested or missing
    pub async fn load_local(
        &self,
        ctx: &MirrorContext,
        codecs: &CodecRegistry,
        download: bool,
        overwrite: bool,
    ) -> Result<serde_json::Value> {
        if download || overwrite || !self.exists_in_mirror(ctx) {
            self.download_to_mirror(ctx, overwrite, None).await?;
        }
        let local = self.local_path(ctx);
        codecs.for_path(&local)?.load(&local)
    }

    /// Save data through the registered codec for this path's suffix, then
    /// upload it unless asked not to
    pub async fn save_local(
        &self,
        ctx: &MirrorContext,
        codecs: &CodecRegistry,
        data: &serde_json::Value,
        upload: bool,
        overwrite: bool,
    ) -> Result<()> {
        let local = self.local_path(ctx);
        if let Some(parent) = local.parent() {
            // Concurrent uploaders may race on creation; already-exists is fine
            std::fs::create_dir_all(parent)?;
        }
        codecs.for_path(&local)?.save(&local, data)?;
        if upload {
            self.upload_from_mirror(ctx, overwrite, None).await?;
        }
        Ok(())
    }
}

impl std::fmt::Display for MirrorPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

fn dir_size(path: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();
        if entry_path.is_dir() {
            total += dir_size(&entry_path)?;
        } else {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Mirror paths for every remote key matching a segment list
pub async fn matching_mirror_paths(
    ctx: &MirrorContext,
    segments: &[KeySegment],
) -> Result<Vec<MirrorPath>> {
    let keys = matching::matching_keys(ctx.store(), ctx.bucket(), segments).await?;
    Ok(keys.iter().map(|key| MirrorPath::from_key(key)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockObjectStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_ctx(store: MockObjectStore, root: &Path) -> MirrorContext {
        MirrorContext::new(Arc::new(store), "bucket", root)
    }

    #[test]
    fn test_key_rendering() {
        assert_eq!(MirrorPath::from_key("a/b/data.json").key(), "a/b/data.json");
        // Dotless deepest names render as folders
        assert_eq!(MirrorPath::from_key("a/b").key(), "a/b/");
        assert_eq!(MirrorPath::from_key("a/b/").key(), "a/b/");
        assert_eq!(MirrorPath::from_key("a/b").bare_key(), "a/b");
    }

    #[test]
    fn test_sibling_child_parent() {
        let mp = MirrorPath::from_key("a/x");

        assert_eq!(mp.sibling("y").unwrap().bare_key(), "a/y");
        assert_eq!(mp.child("b").unwrap().bare_key(), "a/x/b");
        assert_eq!(mp.parent().unwrap().bare_key(), "a");
        assert!(MirrorPath::from_key("a").parent().is_none());
    }

    #[test]
    fn test_chained_relative_derivations() {
        let mp = MirrorPath::from_key("a/x");

        // Child then sibling stays at the child's depth
        let derived = mp.child("b").unwrap().sibling("c").unwrap();
        assert_eq!(derived.bare_key(), "a/x/c");
        assert_eq!(derived, mp.child("c").unwrap());

        // Three chained levels of nesting, then walk back up
        let deep = mp
            .child("b")
            .unwrap()
            .child("c")
            .unwrap()
            .child("d")
            .unwrap();
        assert_eq!(deep.bare_key(), "a/x/b/c/d");
        assert_eq!(deep.parent().unwrap().parent().unwrap().bare_key(), "a/x/b");
    }

    #[test]
    fn test_trim_and_segment_access() {
        let mp = MirrorPath::from_key("a/b/c/d");
        assert_eq!(mp.trim(2).bare_key(), "a/b");
        assert_eq!(mp.key_segment(1).unwrap().name.as_deref(), Some("b"));
        assert!(mp.key_segment(9).is_none());
    }

    #[test]
    fn test_replace_key_segments_pads_gaps() {
        let mp = MirrorPath::from_key("a/b");
        let replaced = mp
            .replace_key_segments(&[KeySegment::named(3, "d")])
            .unwrap();
        assert_eq!(replaced.bare_key(), "a/b//d");
    }

    #[test]
    fn test_from_local_path() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(MockObjectStore::new(), temp.path());

        let local = temp.path().join("a/b/data.json");
        let mp = MirrorPath::from_local_path(&local, &ctx).unwrap();
        assert_eq!(mp.bare_key(), "a/b/data.json");
        assert_eq!(mp.local_path(&ctx), local);

        let outside = Path::new("/elsewhere/data.json");
        assert!(MirrorPath::from_local_path(outside, &ctx).is_err());
    }

    #[tokio::test]
    async fn test_download_skip_credits_progress_without_network() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("a")).unwrap();
        std::fs::write(temp.path().join("a/data.json"), b"0123456789").unwrap();

        // No expectations: any store call panics
        let ctx = test_ctx(MockObjectStore::new(), temp.path());
        let mp = MirrorPath::from_key("a/data.json");
        let progress = TransferProgress::from_sizes([("a/data.json".to_string(), 10)]);

        mp.download_to_mirror(&ctx, false, Some(&progress))
            .await
            .unwrap();
        assert_eq!(progress.transferred(), 10);
    }

    #[tokio::test]
    async fn test_download_skip_ignores_untracked_path() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("other.json"), b"123").unwrap();

        let ctx = test_ctx(MockObjectStore::new(), temp.path());
        let mp = MirrorPath::from_key("other.json");
        let progress = TransferProgress::from_sizes([("a/data.json".to_string(), 10)]);

        mp.download_to_mirror(&ctx, false, Some(&progress))
            .await
            .unwrap();
        assert_eq!(progress.transferred(), 0);
    }

    #[tokio::test]
    async fn test_upload_skip_credits_progress() {
        use crate::traits::{ListResult, ObjectInfo};

        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("data.json"), b"01234").unwrap();

        let mut store = MockObjectStore::new();
        store.expect_list_objects().times(1).returning(|_, _| {
            Ok(ListResult {
                items: vec![ObjectInfo::file("data.json", 5)],
                truncated: false,
                continuation_token: None,
            })
        });

        let ctx = test_ctx(store, temp.path());
        let mp = MirrorPath::from_key("data.json");
        let progress = TransferProgress::from_sizes([("data.json".to_string(), 5)]);

        mp.upload_from_mirror(&ctx, false, Some(&progress))
            .await
            .unwrap();
        assert_eq!(progress.transferred(), 5);
    }

    #[test]
    fn test_display_uses_rendered_key() {
        let mp = MirrorPath::from_key("a/b");
        assert_eq!(mp.to_string(), "a/b/");
    }
}
