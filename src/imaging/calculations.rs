//! Pure calculation functions for derivative dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::CropRect;
use crate::types::{Dimensions, ShapeRequest};

/// Round a pixel length to the nearest integer (half away from zero).
///
/// Every branch of [`resolve_dimensions`] goes through this helper, so the
/// same logical shape always rounds the same way and lands on the same key.
fn round_px(value: f64) -> u32 {
    value.round() as u32
}

/// Whether [`resolve_dimensions`] needs the original's real dimensions.
///
/// Only two shapes are fully determined without the original: explicit width
/// and height, or an aspect ratio together with exactly one of them.
pub fn needs_original_dimensions(shape: &ShapeRequest) -> bool {
    match shape.aspect_ratio {
        Some(_) => shape.width.is_none() && shape.height.is_none(),
        None => shape.width.is_none() || shape.height.is_none(),
    }
}

/// Resolve a partial shape to concrete dimensions.
///
/// `original` is only read when [`needs_original_dimensions`] is true; pass
/// `Dimensions::default()` otherwise.
///
/// | ratio | width | height | result |
/// |---|---|---|---|
/// | yes | yes | yes | `(w, h)` verbatim, ratio ignored |
/// | yes | yes | – | `h = w / ar` |
/// | yes | – | yes | `w = h * ar` |
/// | yes | – | – | largest `ar` box inside the original |
/// | – | yes | yes | `(w, h)` verbatim |
/// | – | yes | – | `h = w / original_ar` |
/// | – | – | yes | `w = h * original_ar` |
/// | – | – | – | original dimensions |
///
/// ```
/// # use derivo::imaging::resolve_dimensions;
/// # use derivo::{AspectRatio, Dimensions, ShapeRequest};
/// let shape = ShapeRequest {
///     aspect_ratio: Some(AspectRatio::reduce(3, 4)),
///     ..ShapeRequest::default()
/// };
/// assert_eq!(
///     resolve_dimensions(&shape, Dimensions::new(500, 500)),
///     Dimensions::new(375, 500)
/// );
/// ```
pub fn resolve_dimensions(shape: &ShapeRequest, original: Dimensions) -> Dimensions {
    let original_ar = original.aspect_ratio().to_f64();

    match (shape.aspect_ratio, shape.width, shape.height) {
        (_, Some(w), Some(h)) => Dimensions::new(w, h),
        (Some(ar), Some(w), None) => Dimensions::new(w, round_px(w as f64 / ar.to_f64())),
        (Some(ar), None, Some(h)) => Dimensions::new(round_px(h as f64 * ar.to_f64()), h),
        (Some(ar), None, None) => {
            let target_ar = ar.to_f64();
            if original_ar > target_ar {
                // Original is wider: keep its height, narrow the width
                Dimensions::new(round_px(original.height as f64 * target_ar), original.height)
            } else {
                Dimensions::new(original.width, round_px(original.width as f64 / target_ar))
            }
        }
        (None, Some(w), None) => Dimensions::new(w, round_px(w as f64 / original_ar)),
        (None, None, Some(h)) => Dimensions::new(round_px(h as f64 * original_ar), h),
        (None, None, None) => original,
    }
}

/// Uniform scale factor that makes the original cover the target box.
///
/// With both target sides bound this is the larger of the two per-axis
/// ratios, so the scaled image is never smaller than the box on either axis.
/// With one side bound it is that side's ratio; with none it is `1.0`.
pub fn cover_scale(original: Dimensions, width: Option<u32>, height: Option<u32>) -> f64 {
    let scale_w = width.map(|w| w as f64 / original.width as f64);
    let scale_h = height.map(|h| h as f64 / original.height as f64);
    match (scale_w, scale_h) {
        (Some(sw), Some(sh)) => sw.max(sh),
        (Some(s), None) | (None, Some(s)) => s,
        (None, None) => 1.0,
    }
}

/// Size of an image after scaling by `scale`, as a provider computes it.
pub fn scaled_dimensions(original: Dimensions, scale: f64) -> Dimensions {
    Dimensions::new(
        round_px(original.width as f64 * scale).max(1),
        round_px(original.height as f64 * scale).max(1),
    )
}

/// What to do after the cover resize to reach the exact target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropPlan {
    /// Already the target size.
    Exact,
    /// Trim the overflowing axis equally on both sides.
    Crop(CropRect),
    /// Neither axis matches, or the image is smaller than the box.
    Inconsistent,
}

/// Plan the center crop from the resized size `actual` to `target`.
///
/// One axis must already match exactly; the other is trimmed by
/// `(actual - target) / 2` on the leading side.
pub fn plan_center_crop(actual: Dimensions, target: Dimensions) -> CropPlan {
    if actual == target {
        return CropPlan::Exact;
    }
    if actual.width == target.width && actual.height > target.height {
        return CropPlan::Crop(CropRect {
            left: 0,
            top: (actual.height - target.height) / 2,
            width: target.width,
            height: target.height,
        });
    }
    if actual.height == target.height && actual.width > target.width {
        return CropPlan::Crop(CropRect {
            left: (actual.width - target.width) / 2,
            top: 0,
            width: target.width,
            height: target.height,
        });
    }
    CropPlan::Inconsistent
}

/// Centered region of the original that still covers `target` once scaled
/// by `scale`, or `None` when the whole original is needed.
///
/// Trimming before the resize keeps the intermediate image within about
/// `target + scale` pixels per side. Without it a thin strip scaled to cover
/// a square box would be resized to an enormous intermediate first.
pub fn plan_source_trim(original: Dimensions, target: Dimensions, scale: f64) -> Option<CropRect> {
    // ceil keeps the scaled region at least as large as the target
    let needed = |target: u32, available: u32| {
        ((target as f64 / scale).ceil() as u32).clamp(1, available)
    };
    let width = needed(target.width, original.width);
    let height = needed(target.height, original.height);
    if width == original.width && height == original.height {
        return None;
    }
    Some(CropRect {
        left: (original.width - width) / 2,
        top: (original.height - height) / 2,
        width,
        height,
    })
}
