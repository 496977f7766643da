#![forbid(unsafe_code)]
//! Error types for e2r.
//!
//! # Error Taxonomy
//!
//! e2r uses a two-layer error model:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `e2r-types` | On-disk format violations detected during byte parsing |
//! | Runtime | `Ext2Error` | `e2r-error` (this crate) | User-facing errors for the CLI, mount adapters and API consumers |
//!
//! ## Mapping Policy: ParseError → Ext2Error
//!
//! `e2r-error` does not depend on `e2r-types` or `e2r-ondisk`. The conversion
//! from `ParseError` to `Ext2Error` lives in `e2r-core`, which depends on both.
//! Every parse failure of metadata read from the image becomes
//! `Corruption { block, detail }`: a wrong magic number, a truncated record
//! and an inconsistent directory record are all reported as a corrupt image.
//!
//! ## errno Mapping
//!
//! Every variant maps to exactly one POSIX errno via [`Ext2Error::to_errno`].
//! The mapping is exhaustive (no wildcard arms).
//!
//! | Variant | errno |
//! |---------|-------|
//! | `Io` | raw OS error, else `EIO` |
//! | `Corruption` | `EPROTO` |
//! | `InvalidArgument` | `EINVAL` |
//! | `NotFound` | `ENOENT` |
//! | `NotDirectory` | `ENOTDIR` |
//! | `IsDirectory` | `EISDIR` |
//! | `ReadOnly` | `EROFS` |

use thiserror::Error;

/// Unified error type for all e2r operations.
#[derive(Debug, Error)]
pub enum Ext2Error {
    /// Operating system I/O error, including short reads of data blocks and
    /// short writes to a content sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk metadata is inconsistent: bad magic, truncated superblock,
    /// descriptor or inode, malformed directory record, or a block pointer
    /// outside the image.
    #[error("corrupt filesystem at block {block}: {detail}")]
    Corruption { block: u64, detail: String },

    /// Caller supplied a value outside the valid range (e.g. inode 0).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unused inode slot or missing path component.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path component is not a directory.
    #[error("not a directory")]
    NotDirectory,

    /// A file was expected but a directory was found.
    #[error("is a directory")]
    IsDirectory,

    /// A write was requested through the read-only mount boundary.
    #[error("read-only filesystem")]
    ReadOnly,
}

impl Ext2Error {
    /// Convert this error into a POSIX errno suitable for mount adapters.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::Corruption { .. } => libc::EPROTO,
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::NotFound(_) => libc::ENOENT,
            Self::NotDirectory => libc::ENOTDIR,
            Self::IsDirectory => libc::EISDIR,
            Self::ReadOnly => libc::EROFS,
        }
    }

    /// Shorthand for building a [`Ext2Error::Corruption`].
    #[must_use]
    pub fn corruption(block: u64, detail: impl Into<String>) -> Self {
        Self::Corruption {
            block,
            detail: detail.into(),
        }
    }
}

/// Result alias using `Ext2Error`.
pub type Result<T> = std::result::Result<T, Ext2Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_covers_all_variants() {
        let cases: Vec<(Ext2Error, libc::c_int)> = vec![
            (Ext2Error::Io(std::io::Error::other("test")), libc::EIO),
            (Ext2Error::corruption(0, "test"), libc::EPROTO),
            (Ext2Error::InvalidArgument("ino 0".into()), libc::EINVAL),
            (Ext2Error::NotFound("test".into()), libc::ENOENT),
            (Ext2Error::NotDirectory, libc::ENOTDIR),
            (Ext2Error::IsDirectory, libc::EISDIR),
            (Ext2Error::ReadOnly, libc::EROFS),
        ];

        for (error, expected_errno) in &cases {
            assert_eq!(
                error.to_errno(),
                *expected_errno,
                "wrong errno for {error:?}",
            );
        }
    }

    #[test]
    fn io_error_preserves_raw_os_error() {
        let raw = std::io::Error::from_raw_os_error(libc::EPERM);
        let err = Ext2Error::Io(raw);
        assert_eq!(err.to_errno(), libc::EPERM);
    }

    #[test]
    fn display_formatting() {
        let err = Ext2Error::corruption(42, "rec_len 6 below header size");
        assert_eq!(
            err.to_string(),
            "corrupt filesystem at block 42: rec_len 6 below header size"
        );
        assert_eq!(Ext2Error::ReadOnly.to_string(), "read-only filesystem");
        assert_eq!(
            Ext2Error::NotFound("missing".into()).to_string(),
            "not found: missing"
        );
        assert_eq!(Ext2Error::NotDirectory.to_string(), "not a directory");
    }
}
