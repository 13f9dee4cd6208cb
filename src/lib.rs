//! # Derivo
//!
//! On-demand image derivatives backed by a write-once storage cache.
//! Originals are uploaded once per tenant scope and named by the hash of
//! their bytes. Any request for a width, height, aspect ratio or output
//! format is resolved to a concrete shape, built on first use, and read back
//! from storage on every later request.
//!
//! # Architecture: Resolve, Probe, Build
//!
//! ```text
//! request ─► resolve shape ─► storage key ─► exists? ─► read      (hit)
//!                 │                              │
//!                 └ needs original size?         └─► fetch original
//!                   fetch + inspect original           resize + crop + encode
//!                                                      write, then serve (miss)
//! ```
//!
//! Every derivative key is a pure function of the scope, the name and the
//! resolved [`ImageSpec`]. Two requests that resolve to the same spec share
//! one stored file, however they were phrased.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`cache`] | [`DerivativeCache`]: upload, get, warm, variants and hit/miss stats |
//! | [`imaging`] | Dimension math, the [`ImageBackend`] trait and the pure-Rust [`RustBackend`] |
//! | [`storage`] | [`BlobStore`] trait and the filesystem store with atomic writes |
//! | [`paths`] | [`PathResolver`]: the storage key layout |
//! | [`query`] | Query-string and `Accept` header parsing into typed requests |
//! | [`types`] | Scope, format, dimension and request types shared by every module |
//! | [`aspect`] | Reduced `W:H` aspect ratios |
//! | [`error`] | [`ServiceError`] and its transport-neutral [`ErrorKind`] |
//! | [`config`] | `config.toml` loading, stock defaults and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content-Hash Names
//!
//! An upload is named by the first 16 hex characters of its SHA-256. The
//! same bytes uploaded twice land on the same key, so re-uploading is a
//! no-op and names never need a database.
//!
//! ## Write-Once Storage
//!
//! A derivative key is only ever written with the bytes its spec describes.
//! Concurrent builders of the same key race harmlessly: both produce the
//! same image and the filesystem store renames a finished temp file into
//! place, so readers never see a partial file.
//!
//! ## Center Crop Only
//!
//! Derivatives are scaled to cover the target box and cropped around the
//! center. There is no focal point and no letterboxing.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding and encoding go through the `image` crate, with `rav1d` for AVIF
//! decoding and `rav1e` (through `image`) for AVIF encoding. The binary has
//! no system library dependencies.

pub mod aspect;
pub mod cache;
pub mod config;
pub mod error;
pub mod imaging;
pub mod output;
pub mod paths;
pub mod query;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use aspect::AspectRatio;
pub use cache::{CacheOutcome, CacheStats, Derivative, DerivativeCache, Limits};
pub use error::{ErrorKind, ServiceError};
pub use imaging::{ImageBackend, RustBackend};
pub use paths::PathResolver;
pub use storage::{BlobStore, FsBlobStore, StorageError};
pub use types::{
    DerivativeRequest, Dimensions, ImageFormat, ImageSpec, ShapeRequest, TenantScope,
    VariantRequest,
};
