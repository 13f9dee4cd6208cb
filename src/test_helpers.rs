//! Shared test utilities for the derivo test suite.
//!
//! Synthetic images are generated in memory with the `image` crate, so no
//! binary fixtures are checked in. The gradient pattern makes every pixel
//! position distinguishable, which keeps crops and resizes honest.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let bytes = png_bytes(64, 48);
//! let (cache, _store) = mock_cache();
//! let name = cache.upload(&bytes, &scope("acme", "web")).unwrap();
//! ```

use image::{ImageEncoder, RgbImage};

use crate::cache::DerivativeCache;
use crate::imaging::backend::tests::MockBackend;
use crate::storage::tests::MemoryBlobStore;
use crate::types::TenantScope;

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// A valid JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// A valid PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

// =========================================================================
// Service fixtures
// =========================================================================

/// Tenant scope shorthand. Panics on invalid codes.
pub fn scope(tenant: &str, org: &str) -> TenantScope {
    TenantScope::new(tenant, org).unwrap()
}

/// A cache over the recording mock backend and an in-memory store.
///
/// The store is shared, so the returned handle sees every write the cache
/// makes.
pub fn mock_cache() -> (DerivativeCache<MockBackend, MemoryBlobStore>, MemoryBlobStore) {
    let store = MemoryBlobStore::new();
    let cache = DerivativeCache::new(MockBackend::new(), store.clone(), "images");
    (cache, store)
}
