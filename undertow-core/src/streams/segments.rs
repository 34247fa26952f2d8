//! Resolution of requested segment files to paths on disk

use std::path::{Component, Path};

use super::types::StreamId;

/// Why a segment request cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentError {
    #[error("Invalid file name: {name}")]
    InvalidFileName { name: String },

    #[error("Stream {id} not found")]
    StreamNotFound { id: StreamId },

    #[error("Stream {id} has no servable output")]
    NotAvailable { id: StreamId },
}

/// Checks that a requested name stays inside the stream directory.
///
/// Only a single plain path component is allowed: no separators, no `..`,
/// nothing absolute.
///
/// # Errors
/// - `SegmentError::InvalidFileName` - Name is empty, contains a separator or a traversal segment
pub fn validate_file_name(name: &str) -> Result<(), SegmentError> {
    let invalid = || SegmentError::InvalidFileName {
        name: name.to_string(),
    };

    if name.is_empty() || name.contains("..") || name.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        for name in ["playlist.m3u8", "segment000.ts", "segment123.ts"] {
            assert!(validate_file_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_rejects_traversal() {
        for name in [
            "../../etc/passwd",
            "..",
            "../playlist.m3u8",
            "..\\secret",
            "sub/segment000.ts",
            "/etc/passwd",
            "C:\\Windows",
            "segment..ts",
            "",
            ".",
        ] {
            assert!(
                matches!(
                    validate_file_name(name),
                    Err(SegmentError::InvalidFileName { .. })
                ),
                "{name:?} should be rejected"
            );
        }
    }
}
