//! High-level image operations.
//!
//! [`build_derivative`] turns an original into one derivative: trim the
//! original to the region the target keeps, cover-scale resize, center crop
//! to the exact box, encode. The math lives in
//! [`calculations`](super::calculations); the pixels in the backend.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{CropPlan, cover_scale, plan_center_crop, plan_source_trim};
use crate::types::{Dimensions, ImageSpec};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The resized image cannot be center-cropped to the target. The cover
    /// scale rules this out, so seeing it means the backend misbehaved.
    #[error("cannot center-crop {actual} to {target}")]
    Inconsistent {
        actual: Dimensions,
        target: Dimensions,
    },
}

/// Build the derivative `target` from the original bytes.
///
/// When `target` equals the original's own spec the original bytes are
/// returned untouched, so an unconstrained request is byte-identical to the
/// upload.
///
/// The original is trimmed to the centered region that survives the final
/// crop before it is resized, so the resize never produces more than about
/// `target + scale` pixels per side.
pub fn build_derivative<B: ImageBackend>(
    backend: &B,
    original: &[u8],
    source: &ImageSpec,
    target: &ImageSpec,
) -> Result<Vec<u8>, BuildError> {
    if source == target {
        debug!(spec = %target, "derivative matches original, copying bytes");
        return Ok(original.to_vec());
    }

    let decoded = backend.decode(original)?;
    let original_dims = backend.dimensions(&decoded);
    let target_dims = target.dimensions();

    let scale = cover_scale(
        original_dims,
        Some(target_dims.width),
        Some(target_dims.height),
    );
    let trimmed = match plan_source_trim(original_dims, target_dims, scale) {
        Some(rect) => Some(backend.crop(&decoded, rect)?),
        None => None,
    };
    let region = trimmed.as_ref().unwrap_or(&decoded);

    let resized = if scale == 1.0 {
        None
    } else {
        Some(backend.resize(region, scale)?)
    };
    let scaled = resized.as_ref().unwrap_or(region);
    let scaled_dims = backend.dimensions(scaled);

    debug!(
        from = %original_dims,
        region = %backend.dimensions(region),
        scaled = %scaled_dims,
        to = %target_dims,
        scale,
        "resized for center crop"
    );

    let encoded = match plan_center_crop(scaled_dims, target_dims) {
        CropPlan::Exact => backend.encode(scaled, target.format)?,
        CropPlan::Crop(rect) => {
            let cropped = backend.crop(scaled, rect)?;
            backend.encode(&cropped, target.format)?
        }
        CropPlan::Inconsistent => {
            return Err(BuildError::Inconsistent {
                actual: scaled_dims,
                target: target_dims,
            });
        }
    };
    Ok(encoded)
}
