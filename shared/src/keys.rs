use crate::geometry::ResizeMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRef {
    pub bucket: String,
    pub key: String,
}

/// `<directory>/<file_id>.<extension>`, or `<file_id>.<extension>` without a directory.
pub fn upload_key(directory: &str, file_id: &str, extension: &str) -> String {
    if directory.is_empty() {
        format!("{}.{}", file_id, extension)
    } else {
        format!("{}/{}.{}", directory, file_id, extension)
    }
}

/// `<mode-tag>/<width>x<height>/<original key>`.
pub fn variant_key(mode: ResizeMode, size: &str, original_key: &str) -> String {
    format!("{}/{}/{}", mode.tag(), size, original_key)
}

/// Emitted after a finalized upload lands in the public bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub bucket: String,
    pub directory: String,
    pub file_extension: String,
    pub file_id: String,
    pub height: u32,
    pub size_bytes: u64,
    pub width: u32,
}

/// Emitted after a serve-time variant is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantEvent {
    pub destination: DestinationRef,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
}
