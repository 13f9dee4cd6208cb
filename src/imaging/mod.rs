//! Image processing in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Inspect** | `image::ImageReader::into_dimensions`, `avif-parse` |
//! | **Resize** | Lanczos3 by a uniform scale factor |
//! | **Crop** | `crop_imm` to the exact target box |
//! | **Encode** | JPEG, PNG, WebP (lossless), AVIF (rav1e) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
pub mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use calculations::{needs_original_dimensions, resolve_dimensions};
pub use operations::{BuildError, build_derivative};
pub use params::{CropRect, Quality};
pub use rust_backend::RustBackend;
