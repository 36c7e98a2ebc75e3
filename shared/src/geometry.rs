//! Target sizes and the arithmetic that turns a requested size into a final one.

use std::fmt;

/// Process-wide limits every requested geometry is clamped against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    pub max_width: u32,
    pub max_height: u32,
    pub max_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Uniform scale then centre crop to exactly `width x height`.
    ExactCrop,
    /// Uniform scale so neither side exceeds the bound. Never enlarges.
    FitWithin,
}

impl ResizeMode {
    /// Leading path segment of derived variant keys.
    pub fn tag(self) -> &'static str {
        match self {
            ResizeMode::ExactCrop => "crop",
            ResizeMode::FitWithin => "ratio",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "crop" => Some(ResizeMode::ExactCrop),
            "ratio" => Some(ResizeMode::FitWithin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetGeometry {
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
}

impl TargetGeometry {
    /// Clamps a caller request against the configured maxima.
    /// A zero or absent side defers entirely to the configured maximum.
    pub fn resolve(
        requested_width: Option<u32>,
        requested_height: Option<u32>,
        mode: ResizeMode,
        constraint: &Constraint,
    ) -> Self {
        TargetGeometry {
            width: clamp_side(requested_width, constraint.max_width),
            height: clamp_side(requested_height, constraint.max_height),
            mode,
        }
    }
}

fn clamp_side(requested: Option<u32>, max: u32) -> u32 {
    match requested {
        Some(side) if side > 0 => side.min(max),
        _ => max,
    }
}

/// Result of fitting a source image into a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// The source already fits; its bytes are used unchanged.
    Unchanged { width: u32, height: u32 },
    Resize { width: u32, height: u32 },
}

impl Fit {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Fit::Unchanged { width, height } | Fit::Resize { width, height } => (width, height),
        }
    }
}

/// `ratio = min(bound_w / src_w, bound_h / src_h)`; when `ratio < 1` both
/// sides are scaled by it and floored.
///
/// Computed in integer arithmetic so the side that drives the ratio lands
/// exactly on its bound. Sides never collapse below one pixel.
pub fn fit_within(src_w: u32, src_h: u32, bound_w: u32, bound_h: u32) -> Fit {
    if src_w <= bound_w && src_h <= bound_h {
        return Fit::Unchanged {
            width: src_w,
            height: src_h,
        };
    }

    let (sw, sh, bw, bh) = (src_w as u64, src_h as u64, bound_w as u64, bound_h as u64);

    // bw/sw <= bh/sh  <=>  bw*sh <= bh*sw
    let (width, height) = if bw * sh <= bh * sw {
        (bw, sh * bw / sw)
    } else {
        (sw * bh / sh, bh)
    };

    Fit::Resize {
        width: (width as u32).max(1),
        height: (height as u32).max(1),
    }
}

/// A `<width>x<height>` path token, e.g. `400x300`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeToken {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for SizeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
