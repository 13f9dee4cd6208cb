//! Storage key layout.
//!
//! Keys are plain `/`-separated strings so any blob store can use them:
//!
//! ```text
//! {base}/{tenant}-{org}/{name}                                   original path
//! {base}/{tenant}-{org}/{name}/{name}.{ext}                      original file
//! {base}/{tenant}-{org}/{name}/{format}/{w}:{h}/{width}          derivative path
//! {base}/{tenant}-{org}/{name}/{format}/{w}:{h}/{width}/{name}.{format}
//! ```
//!
//! `{w}:{h}` is the reduced aspect ratio of the derivative's own dimensions.
//! Width, ratio and format together pin down a unique `(width, height, format)`,
//! so two different specs can never share a key and the same spec always maps
//! to the same key however the request expressed it.

use crate::types::{ImageFormat, ImageSpec, TenantScope};

/// Builds canonical storage keys under a fixed base prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    base: String,
}

impl PathResolver {
    /// `base` may be empty, in which case keys start at the tenant segment.
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Directory-like path of an original (`spec == None`) or of one derivative.
    pub fn resolve(&self, scope: &TenantScope, name: &str, spec: Option<&ImageSpec>) -> String {
        let original = self.join(&format!("{scope}/{name}"));
        match spec {
            None => original,
            Some(spec) => format!(
                "{original}/{}/{}/{}",
                spec.format,
                spec.aspect_ratio(),
                spec.width
            ),
        }
    }

    /// Full key of the original file, stored under its detected format.
    pub fn original_key(&self, scope: &TenantScope, name: &str, format: ImageFormat) -> String {
        format!("{}/{name}.{format}", self.resolve(scope, name, None))
    }

    /// Full key of a derivative file.
    pub fn derivative_key(&self, scope: &TenantScope, name: &str, spec: &ImageSpec) -> String {
        format!(
            "{}/{name}.{}",
            self.resolve(scope, name, Some(spec)),
            spec.format
        )
    }

    fn join(&self, rest: &str) -> String {
        if self.base.is_empty() {
            rest.to_string()
        } else {
            format!("{}/{rest}", self.base)
        }
    }
}
