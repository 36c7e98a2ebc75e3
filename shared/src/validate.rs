use crate::error::PipelineError;
use crate::geometry::SizeToken;
use image::ImageFormat;
use regex::Regex;
use std::sync::OnceLock;

/// Number of leading bytes inspected when sniffing content.
pub const SNIFF_LEN: usize = 512;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Content types accepted for transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }

    pub fn format(self) -> ImageFormat {
        match self {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
        }
    }

    fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(ImageKind::Png),
            "image/jpeg" => Some(ImageKind::Jpeg),
            _ => None,
        }
    }
}

/// Fails with every name whose value is empty, in the order given.
pub fn require_present(fields: &[(&'static str, &str)]) -> Result<(), PipelineError> {
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingFields(missing))
    }
}

fn size_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]+x[0-9]+$").expect("size pattern is valid"))
}

pub fn parse_size_token(token: &str) -> Result<SizeToken, PipelineError> {
    if !size_pattern().is_match(token) {
        return Err(PipelineError::BadSizeToken(token.to_string()));
    }

    let (width, height) = token
        .split_once('x')
        .ok_or_else(|| PipelineError::BadSizeToken(token.to_string()))?;
    let width = width
        .parse()
        .map_err(|_| PipelineError::InvalidInput("Could not convert width to int.".to_string()))?;
    let height = height
        .parse()
        .map_err(|_| PipelineError::InvalidInput("Could not convert height to int.".to_string()))?;

    Ok(SizeToken { width, height })
}

/// Requested sides arrive signed so that negative values can be rejected
/// rather than wrapped or clamped.
pub fn requested_side(name: &str, value: Option<i64>) -> Result<Option<u32>, PipelineError> {
    match value {
        None => Ok(None),
        Some(v) => u32::try_from(v).map(Some).map_err(|_| {
            PipelineError::InvalidInput(format!(
                "Bad parameter format, cannot complete request; {name}: {v}"
            ))
        }),
    }
}

pub fn check_size(size: u64, max_bytes: u64, key: &str) -> Result<(), PipelineError> {
    if size > max_bytes {
        return Err(PipelineError::TooLarge {
            size,
            key: key.to_string(),
        });
    }

    Ok(())
}

/// Content-based mime detection; never looks at the key or declared type.
pub fn sniff_mime(head: &[u8]) -> &'static str {
    let head = &head[..head.len().min(SNIFF_LEN)];

    infer::get(head)
        .map(|kind| kind.mime_type())
        .unwrap_or(FALLBACK_MIME)
}

pub fn check_type(head: &[u8], key: &str) -> Result<ImageKind, PipelineError> {
    let mime = sniff_mime(head);

    ImageKind::from_mime(mime).ok_or_else(|| PipelineError::UnsupportedType {
        mime: mime.to_string(),
        key: key.to_string(),
    })
}
