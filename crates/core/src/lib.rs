//! sm-core: Core library for the s3-mirror sync engine
//!
//! This crate provides the core functionality for mirroring a local
//! filesystem subtree against an S3-like object store, including:
//! - Key segments and pattern matching over remote hierarchies
//! - Remote existence/size/classification queries over paginated listings
//! - MirrorPath transfer orchestration with skip-with-credit progress
//! - Resumable multipart uploads with completion verification
//!
//! This crate is designed to be independent of any specific S3 SDK,
//! allowing for easy testing and potential future support for other
//! backends.

pub mod batch;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod matching;
pub mod mirror;
pub mod multipart;
pub mod progress;
pub mod query;
pub mod segment;
pub mod traits;

pub use batch::{download_all, upload_all, DEFAULT_BATCH_CONCURRENCY};
pub use codec::{CodecRegistry, FileCodec, JsonCodec, TomlCodec};
pub use config::{ConfigManager, ConnectionConfig, MirrorConfig, MultipartSettings};
pub use context::MirrorContext;
pub use error::{Error, Result};
pub use matching::{matching_keys, KeyMatches};
pub use mirror::{matching_mirror_paths, MirrorPath};
pub use multipart::{
    find_open_upload, resume, upload_via_multipart, MultipartConfig, MultipartUploadState,
};
pub use progress::TransferProgress;
pub use segment::{
    build_key, replace_key_segments, replace_key_segments_at_relative_depth, segments_from_key,
    segments_from_names, KeySegment,
};
pub use traits::{
    CompletedPart, ListOptions, ListResult, MultipartUpload, ObjectInfo, ObjectStore,
    UploadedPart,
};
