use crate::geometry::{fit_within, Fit, ResizeMode, TargetGeometry};
use crate::validate::ImageKind;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError, ImageReader};
use std::io::Cursor;

const FILTER: FilterType = FilterType::Lanczos3;

/// Decoded pixels together with the sniffed content type they came from.
pub struct ImageAsset {
    pub kind: ImageKind,
    pub pixels: DynamicImage,
}

impl ImageAsset {
    pub fn decode(bytes: &[u8], kind: ImageKind) -> Result<Self, ImageError> {
        let mut reader = ImageReader::new(Cursor::new(bytes));
        reader.set_format(kind.format());

        Ok(ImageAsset {
            kind,
            pixels: reader.decode()?,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn encode(&self) -> Result<Vec<u8>, ImageError> {
        let mut buf = Cursor::new(Vec::new());

        match self.kind {
            // jpeg has no alpha channel
            ImageKind::Jpeg => DynamicImage::ImageRgb8(self.pixels.to_rgb8())
                .write_to(&mut buf, self.kind.format())?,
            ImageKind::Png => self.pixels.write_to(&mut buf, self.kind.format())?,
        }

        Ok(buf.into_inner())
    }
}

/// Uniform scale to cover `width x height`, then centre crop to exactly that size.
pub fn resize_exact(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    img.resize_to_fill(width, height, FILTER)
}

/// Scale to dimensions already computed by [`fit_within`].
pub fn resize_fit(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    img.resize_exact(width, height, FILTER)
}

/// What a transform produced.
pub enum Transformed {
    /// No resize was needed; the original bytes are reused as-is.
    PassThrough { width: u32, height: u32 },
    Encoded {
        width: u32,
        height: u32,
        bytes: Vec<u8>,
    },
}

impl Transformed {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Transformed::PassThrough { width, height }
            | Transformed::Encoded { width, height, .. } => (*width, *height),
        }
    }
}

/// Applies `target` to `asset`, consuming the decoded pixels.
pub fn transform(asset: ImageAsset, target: TargetGeometry) -> Result<Transformed, ImageError> {
    let (src_w, src_h) = asset.dimensions();

    let pixels = match target.mode {
        ResizeMode::ExactCrop => resize_exact(&asset.pixels, target.width, target.height),
        ResizeMode::FitWithin => match fit_within(src_w, src_h, target.width, target.height) {
            Fit::Unchanged { width, height } => {
                return Ok(Transformed::PassThrough { width, height })
            }
            Fit::Resize { width, height } => resize_fit(&asset.pixels, width, height),
        },
    };

    let (width, height) = pixels.dimensions();
    let bytes = ImageAsset {
        kind: asset.kind,
        pixels,
    }
    .encode()?;

    Ok(Transformed::Encoded {
        width,
        height,
        bytes,
    })
}
