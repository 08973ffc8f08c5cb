//! Mirror context
//!
//! Every transfer-layer call takes an explicit [`MirrorContext`] carrying the
//! object store, target bucket, mirror root, and multipart settings. There is
//! no process-wide mutable configuration anywhere in this workspace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::MirrorConfig;
use crate::multipart::MultipartConfig;
use crate::traits::ObjectStore;

/// Shared state for mirror operations
#[derive(Clone)]
pub struct MirrorContext {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    mirror_root: PathBuf,
    multipart: MultipartConfig,
}

impl MirrorContext {
    /// Create a context from a store, bucket, and mirror root
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        mirror_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            mirror_root: mirror_root.into(),
            multipart: MultipartConfig::default(),
        }
    }

    /// Create a context from a loaded configuration
    pub fn from_config(store: Arc<dyn ObjectStore>, config: &MirrorConfig) -> Self {
        Self::new(store, &config.bucket, &config.mirror_root)
            .with_multipart(config.multipart.to_config())
    }

    /// Override the multipart settings
    pub fn with_multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn mirror_root(&self) -> &Path {
        &self.mirror_root
    }

    pub fn multipart(&self) -> &MultipartConfig {
        &self.multipart
    }
}

impl std::fmt::Debug for MirrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorContext")
            .field("bucket", &self.bucket)
            .field("mirror_root", &self.mirror_root)
            .field("multipart", &self.multipart)
            .finish_non_exhaustive()
    }
}
