//! Key segments and key-string manipulation
//!
//! Remote keys are slash-delimited strings. A [`KeySegment`] addresses one
//! component of a key by zero-based depth, optionally constraining it by an
//! exact name or a substring (`incomplete_name`). A segment with no name is
//! unconstrained and matches anything at its depth.

use crate::error::{Error, Result};

/// One slash-delimited component of a remote key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySegment {
    /// Zero-based position in the key. Relative-depth operations interpret
    /// this as an offset from the deepest existing segment (0 = deepest,
    /// 1 = child, -1 = second-deepest).
    pub depth: i32,

    /// Exact name at this depth. `None` means unconstrained.
    pub name: Option<String>,

    /// Only meaningful on the deepest segment: match file listings instead
    /// of folder listings.
    pub is_file: bool,

    /// Substring filter at this depth (e.g. a file extension).
    pub incomplete_name: Option<String>,
}

impl KeySegment {
    /// Create an unconstrained segment at a depth
    pub fn new(depth: i32) -> Self {
        Self {
            depth,
            name: None,
            is_file: false,
            incomplete_name: None,
        }
    }

    /// Create a named segment at a depth
    pub fn named(depth: i32, name: impl Into<String>) -> Self {
        Self {
            depth,
            name: Some(name.into()),
            is_file: false,
            incomplete_name: None,
        }
    }

    /// Return a copy with the given name set
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        let mut seg = self.clone();
        seg.name = Some(name.into());
        seg
    }

    /// Return a copy with a substring filter set
    pub fn matching(&self, incomplete_name: impl Into<String>) -> Self {
        let mut seg = self.clone();
        seg.incomplete_name = Some(incomplete_name.into());
        seg
    }

    /// Return a copy marked as matching files rather than folders
    pub fn file(mut self) -> Self {
        self.is_file = true;
        self
    }
}

/// Named segments for every component of a key
pub fn segments_from_key(key: &str) -> Vec<KeySegment> {
    if key.is_empty() {
        return Vec::new();
    }
    key.trim_end_matches('/')
        .split('/')
        .enumerate()
        .map(|(idx, name)| KeySegment::named(idx as i32, name))
        .collect()
}

/// Named segments from an ordered list of names
pub fn segments_from_names<S: AsRef<str>>(names: &[S]) -> Vec<KeySegment> {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| KeySegment::named(idx as i32, name.as_ref()))
        .collect()
}

fn sorted_by_depth(segments: &[KeySegment]) -> Vec<KeySegment> {
    let mut sorted = segments.to_vec();
    sorted.sort_by_key(|seg| seg.depth);
    sorted
}

/// Build a key from segments, truncating at the first depth gap.
///
/// Returns the joined key and the first unassigned depth. A depth is a gap
/// when no segment at it carries a name, so an unnamed internal segment
/// truncates the key exactly like a missing one. An empty segment list, or a
/// gap at depth 0, yields the empty key (the unconstrained root).
pub fn build_key(segments: &[KeySegment]) -> (String, i32) {
    let sorted = sorted_by_depth(segments);
    let Some(last) = sorted.last() else {
        return (String::new(), 0);
    };

    let max_depth = last.depth;
    let named_at = |depth: i32| {
        sorted
            .iter()
            .find(|seg| seg.depth == depth)
            .and_then(|seg| seg.name.as_deref())
    };

    let next_depth = (0..=max_depth)
        .find(|depth| named_at(*depth).is_none())
        .unwrap_or(max_depth + 1);

    let path = (0..next_depth)
        .filter_map(named_at)
        .collect::<Vec<_>>()
        .join("/");
    (path, next_depth)
}

/// Replace components of a key by absolute depth.
///
/// Depths past the current key length are padded with empty placeholders;
/// trailing empty components are stripped afterwards. Replacing a component
/// with its current value is a no-op.
pub fn replace_key_segments(key: &str, segments: &[KeySegment]) -> Result<String> {
    let mut parts: Vec<String> = if key.is_empty() {
        Vec::new()
    } else {
        key.split('/').map(str::to_string).collect()
    };

    for seg in sorted_by_depth(segments) {
        let name = named_or_err(&seg)?;
        let depth = usize::try_from(seg.depth)
            .map_err(|_| Error::InvalidKey(format!("negative absolute depth {}", seg.depth)))?;
        while depth >= parts.len() {
            parts.push(String::new());
        }
        parts[depth] = name;
    }

    while parts.last().is_some_and(|part| part.is_empty()) {
        parts.pop();
    }
    Ok(parts.join("/"))
}

/// Replace components of a key by depth relative to its deepest component.
///
/// Offset 0 addresses the deepest component, 1 appends a child, -1 addresses
/// the second-deepest. An offset resolving below the key root is an error.
pub fn replace_key_segments_at_relative_depth(
    key: &str,
    segments: &[KeySegment],
) -> Result<String> {
    let mut parts: Vec<String> = key
        .split('/')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    let original_len = parts.len() as i32;

    for seg in sorted_by_depth(segments) {
        let name = named_or_err(&seg)?;
        let absolute = seg.depth + original_len - 1;
        let depth = usize::try_from(absolute).map_err(|_| {
            Error::InvalidKey(format!(
                "relative depth {} resolves past the root of {key:?}",
                seg.depth
            ))
        })?;
        while depth >= parts.len() {
            parts.push(String::new());
        }
        parts[depth] = name;
    }

    Ok(parts.join("/"))
}

fn named_or_err(seg: &KeySegment) -> Result<String> {
    seg.name
        .clone()
        .ok_or_else(|| Error::InvalidKey(format!("replacement segment at depth {} has no name", seg.depth)))
}
