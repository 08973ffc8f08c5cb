//! Pattern matching over remote keys
//!
//! Resolves a segment list into the concrete keys it matches. The longest
//! unbroken fully-named prefix becomes the starting path; each deeper level
//! is resolved by listing one folder at a time, filtering by exact name or
//! substring, and expanding only the paths that matched. A level with zero
//! matches prunes its branch, so listing calls are bounded by the number of
//! matches at each depth rather than the size of the tree.

use crate::error::{Error, Result};
use crate::segment::{build_key, KeySegment};
use crate::traits::{ListOptions, ObjectStore};

#[derive(Debug, Clone)]
enum NameFilter {
    Exact(String),
    Substring(String),
}

fn filter_at(segments: &[KeySegment], depth: i32) -> Option<NameFilter> {
    segments.iter().find(|seg| seg.depth == depth).and_then(|seg| {
        seg.name
            .clone()
            .map(NameFilter::Exact)
            .or_else(|| seg.incomplete_name.clone().map(NameFilter::Substring))
    })
}

fn matches_filter(relative: &str, filter: &Option<NameFilter>) -> bool {
    match filter {
        None => true,
        Some(NameFilter::Exact(name)) => relative.trim_end_matches('/') == name,
        Some(NameFilter::Substring(fragment)) => relative.contains(fragment),
    }
}

/// One level of expansion: the matching children of a single folder, as full
/// keys, across the complete continuation-token chain.
async fn children_at(
    store: &dyn ObjectStore,
    bucket: &str,
    folder: &str,
    filter: &Option<NameFilter>,
    files: bool,
) -> Result<Vec<String>> {
    let folder = if folder.is_empty() || folder.ends_with('/') {
        folder.to_string()
    } else {
        format!("{folder}/")
    };

    let mut out = Vec::new();
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

        for item in &res.items {
            if item.is_dir == files || item.key == folder {
                continue;
            }
            let relative = item.key.strip_prefix(&folder).unwrap_or(&item.key);
            if matches_filter(relative, filter) {
                out.push(item.key.clone());
            }
        }

        if res.truncated && res.continuation_token.is_some() {
            continuation_token = res.continuation_token;
        } else {
            break;
        }
    }
    Ok(out)
}

/// Lazy depth-first matcher over remote keys.
///
/// Holds an explicit worklist instead of recursing, so arbitrarily deep
/// hierarchies traverse in constant stack space and the caller can stop
/// consuming at any point without issuing further listing calls.
pub struct KeyMatches<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    segments: Vec<KeySegment>,
    max_depth: i32,
    file_leaf: bool,
    stack: Vec<(String, i32)>,
}

impl<'a> KeyMatches<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        bucket: &'a str,
        segments: &[KeySegment],
    ) -> Result<Self> {
        if let Some(seg) = segments.iter().find(|seg| seg.depth < 0) {
            return Err(Error::InvalidKey(format!(
                "match segment at negative depth {}",
                seg.depth
            )));
        }
        let mut sorted = segments.to_vec();
        sorted.sort_by_key(|seg| seg.depth);

        let (max_depth, file_leaf, stack) = match sorted.last() {
            Some(last) => {
                let (prefix, next_depth) = build_key(&sorted);
                (last.depth, last.is_file, vec![(prefix, next_depth)])
            }
            None => (0, false, Vec::new()),
        };

        Ok(Self {
            store,
            bucket,
            segments: sorted,
            max_depth,
            file_leaf,
            stack,
        })
    }

    /// Produce the next matching key, or None when the traversal is done
    pub async fn try_next(&mut self) -> Result<Option<String>> {
        loop {
            let Some((path, depth)) = self.stack.pop() else {
                return Ok(None);
            };
            if depth > self.max_depth {
                return Ok(Some(path));
            }

            let files = depth == self.max_depth && self.file_leaf;
            let filter = filter_at(&self.segments, depth);
            let children = children_at(self.store, self.bucket, &path, &filter, files).await?;

            // Reverse so the first child is expanded first (depth-first order)
            for child in children.into_iter().rev() {
                self.stack.push((child, depth + 1));
            }
        }
    }
}

/// All keys matching a segment list
pub async fn matching_keys(
    store: &dyn ObjectStore,
    bucket: &str,
    segments: &[KeySegment],
) -> Result<Vec<String>> {
    let mut matches = Vec::new();
    let mut iter = KeyMatches::new(store, bucket, segments)?;
    while let Some(key) = iter.try_next().await? {
        matches.push(key);
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::segments_from_names;
    use crate::traits::{ListResult, MockObjectStore, ObjectInfo};

    fn page(items: Vec<ObjectInfo>) -> ListResult {
        ListResult {
            items,
            truncated: false,
            continuation_token: None,
        }
    }

    #[tokio::test]
    async fn test_fully_named_segments_match_without_listing() {
        // No expectations: any listing call would panic
        let store = MockObjectStore::new();
        let segments = segments_from_names(&["a", "b", "c"]);

        let keys = matching_keys(&store, "bucket", &segments).await.unwrap();
        assert_eq!(keys, vec!["a/b/c"]);
    }

    #[tokio::test]
    async fn test_empty_segments_match_nothing() {
        let store = MockObjectStore::new();
        let keys = matching_keys(&store, "bucket", &[]).await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_pruning_stops_after_first_empty_depth() {
        let mut store = MockObjectStore::new();
        // The named prefix extends through "missing", so exactly one listing
        // call happens there; it matches nothing and the unconstrained depth
        // below is never listed.
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("root/missing/"))
            .times(1)
            .returning(|_, _| Ok(page(vec![])));

        let segments = vec![
            KeySegment::named(0, "root"),
            KeySegment::named(1, "missing"),
            KeySegment::new(2),
        ];
        let keys = matching_keys(&store, "bucket", &segments).await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_substring_filter_on_files() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("root/"))
            .times(1)
            .returning(|_, _| {
                Ok(page(vec![
                    ObjectInfo::file("root/a.json", 1),
                    ObjectInfo::file("root/b.txt", 1),
                    ObjectInfo::dir("root/sub/"),
                ]))
            });

        let segments = vec![
            KeySegment::named(0, "root"),
            KeySegment::new(1).matching(".json").file(),
        ];
        let keys = matching_keys(&store, "bucket", &segments).await.unwrap();
        assert_eq!(keys, vec!["root/a.json"]);
    }

    #[tokio::test]
    async fn test_unconstrained_depth_expands_all_folders() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("root/"))
            .times(1)
            .returning(|_, _| {
                Ok(page(vec![
                    ObjectInfo::dir("root/s1/"),
                    ObjectInfo::dir("root/s2/"),
                ]))
            });
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("root/s1/"))
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::file("root/s1/data.json", 1)])));
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("root/s2/"))
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::file("root/s2/data.json", 1)])));

        let segments = vec![
            KeySegment::named(0, "root"),
            KeySegment::new(1),
            KeySegment::named(2, "data.json").file(),
        ];
        let keys = matching_keys(&store, "bucket", &segments).await.unwrap();
        assert_eq!(keys, vec!["root/s1/data.json", "root/s2/data.json"]);
    }

    #[tokio::test]
    async fn test_lazy_traversal_stops_on_demand() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("root/"))
            .times(1)
            .returning(|_, _| {
                Ok(page(vec![
                    ObjectInfo::dir("root/s1/"),
                    ObjectInfo::dir("root/s2/"),
                ]))
            });
        // Only the first branch is listed; abandoning the iterator must not
        // touch root/s2/.
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("root/s1/"))
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::file("root/s1/x", 1)])));

        let segments = vec![
            KeySegment::named(0, "root"),
            KeySegment::new(1),
            KeySegment::new(2).file(),
        ];
        let mut iter = KeyMatches::new(&store, "bucket", &segments).unwrap();
        let first = iter.try_next().await.unwrap();
        assert_eq!(first.as_deref(), Some("root/s1/x"));
        drop(iter);
    }

    #[tokio::test]
    async fn test_exact_folder_name_filter() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("root/"))
            .times(1)
            .returning(|_, _| Ok(page(vec![ObjectInfo::dir("root/a/")])));
        store
            .expect_list_objects()
            .withf(|_, opts| opts.prefix.as_deref() == Some("root/a/"))
            .times(1)
            .returning(|_, _| {
                Ok(page(vec![
                    ObjectInfo::dir("root/a/runs/"),
                    ObjectInfo::dir("root/a/runs-old/"),
                ]))
            });

        let segments = vec![
            KeySegment::named(0, "root"),
            KeySegment::new(1),
            KeySegment::named(2, "runs"),
        ];
        // Exact names match whole components, not substrings
        let keys = matching_keys(&store, "bucket", &segments).await.unwrap();
        assert_eq!(keys, vec!["root/a/runs/"]);
    }

    #[tokio::test]
    async fn test_negative_depth_rejected() {
        let store = MockObjectStore::new();
        let segments = vec![KeySegment::named(-1, "x")];
        assert!(KeyMatches::new(&store, "bucket", &segments).is_err());
    }
}
