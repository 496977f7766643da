//! Slash-separated path resolution from the root directory.

use crate::Ext2Fs;
use crate::ops::{InodeAttr, inode_to_attr};
use e2r_error::{Ext2Error, Result};
use e2r_ondisk::{Ext2DirEntry, Ext2FileType, Ext2Inode};
use e2r_types::InodeNumber;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// What the final path component must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathExpect {
    #[default]
    Any,
    /// A directory here fails with `IsDirectory`.
    File,
    /// A non-directory here fails with `NotDirectory`.
    Directory,
}

/// Normalize `path` into its segments.
///
/// Empty and `.` segments are dropped; `..` removes the previous segment and
/// is a no-op at the root. Resolution is purely lexical.
#[must_use]
pub fn parse_path_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }
    segments
}

/// A resolved path: inode number, inode and attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext2Entity {
    pub path: String,
    pub ino: InodeNumber,
    pub inode: Ext2Inode,
    pub attr: InodeAttr,
}

impl Ext2Fs {
    /// Resolve `path` to an inode number, starting at the root directory.
    pub fn resolve_path(&self, path: &str, expect: PathExpect) -> Result<InodeNumber> {
        let segments = parse_path_segments(path);
        let mut current = InodeNumber::ROOT;

        if segments.is_empty() && expect == PathExpect::File {
            return Err(Ext2Error::IsDirectory);
        }

        for (i, segment) in segments.iter().enumerate() {
            let is_final = i + 1 == segments.len();
            trace!(parent = current.0, segment, "resolve path segment");

            let entry = self
                .lookup_name(current, segment.as_bytes())?
                .ok_or_else(|| Ext2Error::NotFound(format!("{path}: no entry {segment:?}")))?;
            let is_dir = self.entry_is_dir(&entry)?;

            if !is_final && !is_dir {
                return Err(Ext2Error::NotDirectory);
            }
            if is_final {
                match expect {
                    PathExpect::File if is_dir => return Err(Ext2Error::IsDirectory),
                    PathExpect::Directory if !is_dir => return Err(Ext2Error::NotDirectory),
                    _ => {}
                }
            }
            current = entry.inode;
        }
        Ok(current)
    }

    /// Resolve `path` and load its inode and attributes.
    pub fn open_entity(&self, path: &str) -> Result<Ext2Entity> {
        let ino = self.resolve_path(path, PathExpect::Any)?;
        let inode = self.read_inode(ino)?;
        let attr = inode_to_attr(self.superblock(), ino, &inode);
        Ok(Ext2Entity {
            path: path.to_owned(),
            ino,
            inode,
            attr,
        })
    }

    /// Unknown type indicators fall back to the target inode's mode.
    fn entry_is_dir(&self, entry: &Ext2DirEntry) -> Result<bool> {
        match entry.file_type {
            Ext2FileType::Dir => Ok(true),
            Ext2FileType::Unknown => Ok(self.read_inode(entry.inode)?.is_dir()),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn segments_drop_empty_and_dot() {
        assert_eq!(parse_path_segments("/a//b/./c/"), vec!["a", "b", "c"]);
        assert!(parse_path_segments("/").is_empty());
        assert!(parse_path_segments("").is_empty());
    }

    #[test]
    fn dotdot_pops_and_stops_at_root() {
        assert_eq!(parse_path_segments("/a/b/../c"), vec!["a", "c"]);
        assert_eq!(parse_path_segments("/../../a"), vec!["a"]);
        assert!(parse_path_segments("a/..").is_empty());
    }

    proptest! {
        #[test]
        fn segments_never_contain_separators_or_dots(path in "[a-c./]{0,24}") {
            for segment in parse_path_segments(&path) {
                prop_assert!(!segment.is_empty());
                prop_assert!(!segment.contains('/'));
                prop_assert!(segment != "." && segment != "..");
            }
        }

        #[test]
        fn normalization_is_idempotent(path in "[a-c./]{0,24}") {
            let once = parse_path_segments(&path).join("/");
            let twice = parse_path_segments(&once).join("/");
            prop_assert_eq!(once, twice);
        }
    }
}
