//! The derivative cache service.
//!
//! Every derivative of an uploaded original is built at most once per
//! distinct [`ImageSpec`] and then served from storage. The storage key *is*
//! the cache key: [`PathResolver`] maps a fully resolved spec to one path,
//! so there is no separate index to keep in sync.
//!
//! # Request flow
//!
//! ```text
//! validate
//!   → resolve format        (Auto/absent needs the original)
//!   → fetch original?       (only when format or dimensions need it)
//!   → resolve dimensions
//!   → probe cache ──hit──→ return stored bytes
//!        │ miss
//!   → ensure original → build → persist → return built bytes
//! ```
//!
//! Skipping the original fetch when the request is fully concrete is a fast
//! path only: a cache hit for `width=300&height=200&format=webp` costs one
//! `exists` and one `read`.
//!
//! Concurrent misses on the same key may both build and both write. Builds
//! are deterministic and writes replace whole files, so the last writer wins
//! with identical bytes.
//!
//! # Originals
//!
//! An upload is named by the first 16 hex characters of its SHA-256 and
//! stored once at `{original path}/{name}.{ext}`. Originals are never
//! overwritten; re-uploading the same bytes returns the existing name.

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::imaging::calculations::{needs_original_dimensions, resolve_dimensions};
use crate::imaging::operations::{BuildError, build_derivative};
use crate::imaging::{BackendError, ImageBackend};
use crate::paths::PathResolver;
use crate::storage::{BlobStore, StorageError};
use crate::types::{
    DerivativeRequest, Dimensions, ImageFormat, ImageSpec, TenantScope, VariantRequest,
    validate_key_segment,
};

/// Length of the hex prefix of the content hash used as an upload name.
const NAME_HEX_LEN: usize = 16;

/// Request and upload bounds enforced at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest width or height a request may resolve to.
    pub max_dimension: u32,
    pub max_upload_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_dimension: 8192,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Whether a derivative came from storage or was built by this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Built,
}

/// A served derivative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivative {
    pub bytes: Vec<u8>,
    pub spec: ImageSpec,
    pub key: String,
    pub outcome: CacheOutcome,
}

/// Summary of cache activity since the service was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub uploads: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cached, {} built ({} total)",
            self.hits,
            self.misses,
            self.total()
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    uploads: AtomicU64,
}

/// A stored original, read and inspected.
struct Original {
    bytes: Vec<u8>,
    spec: ImageSpec,
}

/// Upload name for a byte string: a prefix of its SHA-256 in hex.
pub fn content_name(bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    digest[..NAME_HEX_LEN].to_string()
}

fn storage_error(e: StorageError) -> ServiceError {
    ServiceError::Internal(e.to_string())
}

/// Bytes the backend cannot read are the uploader's problem; any other
/// backend failure is ours.
fn upload_error(e: BackendError) -> ServiceError {
    match e {
        BackendError::UnsupportedFormat(msg) => ServiceError::UnsupportedFormat(msg),
        other => ServiceError::Internal(other.to_string()),
    }
}

/// A build failure is never the caller's fault: the original was accepted
/// at upload time.
fn build_error(e: BuildError) -> ServiceError {
    ServiceError::Internal(e.to_string())
}

/// The cache service over an image backend and a blob store.
pub struct DerivativeCache<B: ImageBackend, S: BlobStore> {
    backend: B,
    store: S,
    paths: PathResolver,
    limits: Limits,
    counters: Counters,
}

impl<B: ImageBackend, S: BlobStore> DerivativeCache<B, S> {
    /// `namespace` is the `{base}` prefix of every key this service writes.
    pub fn new(backend: B, store: S, namespace: &str) -> Self {
        Self {
            backend,
            store,
            paths: PathResolver::new(namespace),
            limits: Limits::default(),
            counters: Counters::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            uploads: self.counters.uploads.load(Ordering::Relaxed),
        }
    }

    // =====================================================================
    // Upload
    // =====================================================================

    /// Store `bytes` as an original in `scope` and return its name.
    pub fn upload(&self, bytes: &[u8], scope: &TenantScope) -> Result<String, ServiceError> {
        if bytes.len() > self.limits.max_upload_bytes {
            return Err(ServiceError::InvalidParameter(format!(
                "upload of {} bytes exceeds limit of {} bytes",
                bytes.len(),
                self.limits.max_upload_bytes
            )));
        }

        // A header alone is not enough: stored originals must always decode
        let spec = self.backend.inspect(bytes).map_err(upload_error)?;
        self.backend.decode(bytes).map_err(upload_error)?;

        let name = content_name(bytes);
        let key = self.paths.original_key(scope, &name, spec.format);

        if self.store.exists(&key).map_err(storage_error)? {
            debug!(%scope, %name, %key, "original already stored");
        } else {
            self.store.write(&key, bytes).map_err(storage_error)?;
            info!(%scope, %name, %key, spec = %spec, size = bytes.len(), "stored original");
        }
        self.counters.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(name)
    }

    // =====================================================================
    // Get
    // =====================================================================

    /// Serve one derivative, building and persisting it on a miss.
    pub fn get_image(&self, request: &DerivativeRequest) -> Result<Derivative, ServiceError> {
        request.validate()?;
        let scope = &request.scope;
        let name = request.name.as_str();

        // Auto format or an underdetermined shape needs the original up front
        let explicit_format = request.explicit_format();
        let original = if explicit_format.is_none() || needs_original_dimensions(&request.shape)
        {
            Some(self.fetch_original(scope, name)?)
        } else {
            None
        };
        let format = explicit_format
            .or_else(|| original.as_ref().map(|o| o.spec.format))
            .ok_or_else(|| ServiceError::Internal("output format left unresolved".into()))?;

        let source_dims = original
            .as_ref()
            .map(|o| o.spec.dimensions())
            .unwrap_or_default();
        let dims = resolve_dimensions(&request.shape, source_dims);
        self.check_dimensions(dims)?;
        let spec = ImageSpec {
            width: dims.width,
            height: dims.height,
            format,
        };

        let key = self.paths.derivative_key(scope, name, &spec);
        if self.store.exists(&key).map_err(storage_error)? {
            let bytes = self.store.read(&key).map_err(storage_error)?;
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(%scope, name, %key, "cache hit");
            return Ok(Derivative {
                bytes,
                spec,
                key,
                outcome: CacheOutcome::Hit,
            });
        }
        debug!(%scope, name, %key, "cache miss");

        // Miss: the original is required from here on
        let original = match original {
            Some(original) => original,
            None => self.fetch_original(scope, name)?,
        };

        let bytes =
            build_derivative(&self.backend, &original.bytes, &original.spec, &spec).map_err(
                |e| {
                    warn!(%scope, name, source = %original.spec, target = %spec, error = %e, "build failed");
                    build_error(e)
                },
            )?;

        self.store.write(&key, &bytes).map_err(storage_error)?;
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        info!(%scope, name, %key, from = %original.spec, to = %spec, size = bytes.len(), "built derivative");

        Ok(Derivative {
            bytes,
            spec,
            key,
            outcome: CacheOutcome::Built,
        })
    }

    /// Resolve several variants of one original in parallel. Results come
    /// back in input order, one per variant.
    pub fn warm(
        &self,
        scope: &TenantScope,
        name: &str,
        variants: &[VariantRequest],
    ) -> Vec<Result<Derivative, ServiceError>> {
        variants
            .par_iter()
            .map(|variant| self.get_image(&DerivativeRequest::new(scope.clone(), name, *variant)))
            .collect()
    }

    /// Keys of every cached derivative of an original, sorted.
    pub fn variants(&self, scope: &TenantScope, name: &str) -> Result<Vec<String>, ServiceError> {
        validate_key_segment("image name", name)?;
        let original_key = self
            .locate_original(scope, name)?
            .ok_or_else(|| ServiceError::NotFound(format!("{scope}/{name}")))?;
        let prefix = self.paths.resolve(scope, name, None);
        let keys = self.store.list(&prefix).map_err(storage_error)?;
        Ok(keys.into_iter().filter(|k| *k != original_key).collect())
    }

    // =====================================================================
    // Internals
    // =====================================================================

    fn check_dimensions(&self, dims: Dimensions) -> Result<(), ServiceError> {
        if dims.width == 0 || dims.height == 0 {
            return Err(ServiceError::InvalidParameter(format!(
                "resolved dimensions {dims} are empty"
            )));
        }
        let max = self.limits.max_dimension;
        if dims.width > max || dims.height > max {
            return Err(ServiceError::InvalidParameter(format!(
                "resolved dimensions {dims} exceed the {max} px limit"
            )));
        }
        Ok(())
    }

    /// Probe the concrete formats for the stored original's key.
    fn locate_original(
        &self,
        scope: &TenantScope,
        name: &str,
    ) -> Result<Option<String>, ServiceError> {
        for format in ImageFormat::CONCRETE {
            let key = self.paths.original_key(scope, name, format);
            if self.store.exists(&key).map_err(storage_error)? {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    fn fetch_original(&self, scope: &TenantScope, name: &str) -> Result<Original, ServiceError> {
        let not_found = || ServiceError::NotFound(format!("{scope}/{name}"));
        let key = self.locate_original(scope, name)?.ok_or_else(not_found)?;
        let bytes = self.store.read(&key).map_err(|e| match e {
            StorageError::NotFound(_) => not_found(),
            other => storage_error(other),
        })?;
        let spec = self.backend.inspect(&bytes).map_err(|e| {
            ServiceError::Internal(format!("stored original {key} is unreadable: {e}"))
        })?;
        debug!(%scope, name, %key, %spec, "fetched original");
        Ok(Original { bytes, spec })
    }
}
