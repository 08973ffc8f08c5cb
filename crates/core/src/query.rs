//! Remote key queries
//!
//! Translates existence, size, and file-vs-folder questions into paginated
//! listing calls. Pagination is handled here and nowhere else; callers always
//! see fully accumulated results.

use crate::error::{Error, Result};
use crate::traits::{ListOptions, ListResult, ObjectStore};

/// Batch size accepted by S3 DeleteObjects
const DELETE_BATCH: usize = 1000;

/// Folder listings require a trailing slash; a bare key is a prefix that can
/// also match sibling keys sharing it.
fn normalize_folder_key(key: &str) -> String {
    if key.is_empty() || key.ends_with('/') {
        key.to_string()
    } else {
        tracing::warn!(key, "listing children of a key without a trailing slash");
        format!("{key}/")
    }
}

/// List details of a single key: one page, one result, delimiter-grouped.
/// The cheapest possible existence probe.
pub async fn list_single_key(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<ListResult> {
    store
        .list_objects(
            bucket,
            ListOptions {
                prefix: Some(key.to_string()),
                delimiter: Some("/".to_string()),
                max_keys: Some(1),
                continuation_token: None,
            },
        )
        .await
}

/// Check whether a key has any listing entry (content or common prefix)
pub async fn key_exists(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<bool> {
    let res = list_single_key(store, bucket, key).await?;
    Ok(!res.items.is_empty())
}

/// Check whether a key is a file.
///
/// Errors with [`Error::NotFound`] when the key has no listing entry at all.
/// A trailing-slash key is always a folder, even when a zero-byte folder
/// marker resolves to it. A key that is simultaneously a file and a folder
/// prefix is an explicit [`Error::AmbiguousKey`] rather than a silent pick.
pub async fn key_is_file(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<bool> {
    // The literal key sorts before every other key sharing it as a prefix,
    // so a one-entry probe decides the literal match
    let res = list_single_key(store, bucket, key).await?;

    if res.items.is_empty() {
        return Err(Error::NotFound(key.to_string()));
    }
    if key.ends_with('/') {
        return Ok(false);
    }

    let literal = res.contents().any(|item| item.key == key);
    if literal {
        // The folder twin needs its own probe: siblings like `key.ext` sort
        // between the literal entry and `key/`, so sharing a page with the
        // literal match is not guaranteed
        if key_exists(store, bucket, &format!("{key}/")).await? {
            return Err(Error::AmbiguousKey(key.to_string()));
        }
    }
    Ok(literal)
}

/// Size of a key in bytes.
///
/// Errors with [`Error::NotFound`] when absent; folder-only matches are 0.
pub async fn key_size(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<u64> {
    let res = list_single_key(store, bucket, key).await?;
    if res.items.is_empty() {
        return Err(Error::NotFound(key.to_string()));
    }
    let size = res
        .contents()
        .next()
        .filter(|item| item.key == key)
        .and_then(|item| item.size_bytes)
        .unwrap_or(0);
    Ok(size.max(0) as u64)
}

/// List every direct child of a folder key: content entries (excluding the
/// folder marker itself) plus common prefixes, across the full
/// continuation-token chain.
pub async fn list_child_keys(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<Vec<String>> {
    let folder = normalize_folder_key(key);
    let mut keys = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let res = store
            .list_objects(
                bucket,
                ListOptions {
                    prefix: Some(folder.clone()),
                    delimiter: Some("/".to_string()),
                    max_keys: None,
                    continuation_token: continuation_token.take(),
                },
            )
            .await?;

        keys.extend(
            res.items
                .iter()
                .filter(|item| item.key != folder)
                .map(|item| item.key.clone()),
        );

        if res.truncated && res.continuation_token.is_some() {
            continuation_token = res.continuation_token;
        } else {
            break;
        }
    }

    Ok(keys)
}

/// Delete a key: single delete for files, full descendant sweep for folders.
///
/// Absent keys are a no-op. Folder deletion enumerates every descendant under
/// the slash-normalized prefix and removes them in batches.
pub async fn delete_key(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<()> {
    if !key_exists(store, bucket, key).await? {
        return Ok(());
    }
    if key_is_file(store, bucket, key).await? {
        store.delete_object(bucket, key).await
    } else {
        delete_child_keys(store, bucket, key).await
    }
}

/// Delete every key under a folder prefix, including its zero-byte marker
pub async fn delete_child_keys(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<()> {
    let folder = normalize_folder_key(key);
    let mut keys = Vec::new();
    let mut continuation_token: Option<String> = None;

    // Enumerate fully before deleting; removing keys mid-pagination can
    // shift the continuation chain out from under the listing
    loop {
        let res = store
            .list_objects(
                bucket,
                ListOptions {
                    prefix: Some(folder.clone()),
                    delimiter: None,
                    max_keys: None,
                    continuation_token: continuation_token.take(),
                },
            )
            .await?;

        keys.extend(res.contents().map(|item| item.key.clone()));

        if res.truncated && res.continuation_token.is_some() {
            continuation_token = res.continuation_token;
        } else {
            break;
        }
    }

    for batch in keys.chunks(DELETE_BATCH) {
        store.delete_objects(bucket, batch.to_vec()).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockObjectStore, ObjectInfo};

    fn page(items: Vec<ObjectInfo>, token: Option<&str>) -> ListResult {
        ListResult {
            items,
            truncated: token.is_some(),
            continuation_token: token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_key_exists() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|bucket, opts| {
                bucket == "b"
                    && opts.prefix.as_deref() == Some("a/x")
                    && opts.max_keys == Some(1)
                    && opts.delimiter.as_deref() == Some("/")
            })
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::file("a/x", 3)], None)));

        assert!(key_exists(&store, "b", "a/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_key_exists_false() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(1)
            .returning(|_, _| Ok(page(vec![], None)));

        assert!(!key_exists(&store, "b", "a/missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_key_is_file() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("a/x"))
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::file("a/x", 3)], None)));
        // Literal matches are followed by a probe of the folder twin
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("a/x/"))
            .times(1)
            .returning(|_, _| Ok(page(vec![], None)));

        assert!(key_is_file(&store, "b", "a/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_key_is_file_folder() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::dir("a/sub/")], None)));

        assert!(!key_is_file(&store, "b", "a/sub").await.unwrap());
    }

    #[tokio::test]
    async fn test_key_is_file_trailing_slash_marker() {
        // A zero-byte folder marker resolving to itself is a folder
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::file("a/sub/", 0)], None)));

        assert!(!key_is_file(&store, "b", "a/sub/").await.unwrap());
    }

    #[tokio::test]
    async fn test_key_is_file_not_found() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(1)
            .returning(|_, _| Ok(page(vec![], None)));

        let err = key_is_file(&store, "b", "a/missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_key_is_file_ambiguous() {
        // A sibling like "a/x.json" sorts between "a/x" and "a/x/", so the
        // twin is detected through its own probe, not page adjacency
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("a/x"))
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::file("a/x", 3)], None)));
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("a/x/"))
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::file("a/x/c", 1)], None)));

        let err = key_is_file(&store, "b", "a/x").await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousKey(_)));
    }

    #[tokio::test]
    async fn test_key_size() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::file("a/x", 42)], None)));

        assert_eq!(key_size(&store, "b", "a/x").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_key_size_folder_is_zero() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::dir("a/sub/")], None)));

        assert_eq!(key_size(&store, "b", "a/sub").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_key_size_not_found() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(1)
            .returning(|_, _| Ok(page(vec![], None)));

        assert!(matches!(
            key_size(&store, "b", "a/missing").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_child_keys_paginates() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|_, opts| {
                opts.prefix.as_deref() == Some("f/") && opts.continuation_token.is_none()
            })
            .times(1)
            .returning(|_, _| {
                Ok(page(
                    vec![ObjectInfo::file("f/", 0), ObjectInfo::file("f/a", 1)],
                    Some("tok"),
                ))
            });
        store
            .expect_list_objects()
            .withf(|_, opts| opts.continuation_token.as_deref() == Some("tok"))
            .times(1)
            .returning(|_, _| {
                Ok(page(
                    vec![ObjectInfo::file("f/b", 1), ObjectInfo::dir("f/sub/")],
                    None,
                ))
            });

        // "f" is normalized to "f/"; the marker itself is excluded
        let keys = list_child_keys(&store, "b", "f").await.unwrap();
        assert_eq!(keys, vec!["f/a", "f/b", "f/sub/"]);
    }

    #[tokio::test]
    async fn test_delete_key_file() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("f/a"))
            .times(2) // exists probe + classification
            .returning(|_, _| Ok(page(vec![ObjectInfo::file("f/a", 1)], None)));
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("f/a/"))
            .times(1) // folder-twin probe during classification
            .returning(|_, _| Ok(page(vec![], None)));
        store
            .expect_delete_object()
            .withf(|bucket, key| bucket == "b" && key == "f/a")
            .times(1)
            .returning(|_, _| Ok(()));

        delete_key(&store, "b", "f/a").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_key_folder_batches() {
        let mut store = MockObjectStore::new();
        // exists + classification probes see the folder prefix
        store
            .expect_list_objects()
            .withf(|_, opts| opts.max_keys.is_some())
            .times(2)
            .returning(|_, _| Ok(page(vec![ObjectInfo::dir("f/")], None)));
        // recursive sweep: flat listing without delimiter
        store
            .expect_list_objects()
            .withf(|_, opts| opts.delimiter.is_none() && opts.prefix.as_deref() == Some("f/"))
            .times(1)
            .returning(|_, _| {
                Ok(page(
                    vec![
                        ObjectInfo::file("f/", 0),
                        ObjectInfo::file("f/a", 1),
                        ObjectInfo::file("f/sub/c", 1),
                    ],
                    None,
                ))
            });
        store
            .expect_delete_objects()
            .withf(|_, keys| keys == &["f/", "f/a", "f/sub/c"])
            .times(1)
            .returning(|_, keys| Ok(keys));

        delete_key(&store, "b", "f").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_key_absent_is_noop() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(1)
            .returning(|_, _| Ok(page(vec![], None)));

        delete_key(&store, "b", "missing").await.unwrap();
    }
}
