//! Shared value types: tenant scopes, formats, image shapes and requests.
//!
//! Everything here is an immutable value. "Not specified" is always modelled
//! as `None`, never as zero: a request for `width = None` means "derive the
//! width", while `width = Some(0)` is rejected at the request boundary.

use crate::aspect::AspectRatio;
use crate::error::ServiceError;
use std::fmt;
use std::str::FromStr;

/// An isolated namespace of images. Two scopes never share storage keys, even
/// for identically named images.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantScope {
    tenant_code: String,
    org_code: String,
}

impl TenantScope {
    /// Build a scope, rejecting codes that are empty or could escape their
    /// storage directory.
    ///
    /// The tenant code may not contain `-`: scopes render as `{tenant}-{org}`,
    /// and `("a-b", "c")` would otherwise collide with `("a", "b-c")`.
    pub fn new(tenant_code: &str, org_code: &str) -> Result<Self, ServiceError> {
        validate_key_segment("tenant code", tenant_code)?;
        validate_key_segment("org code", org_code)?;
        if tenant_code.contains('-') {
            return Err(ServiceError::InvalidParameter(format!(
                "tenant code {tenant_code:?} must not contain '-'"
            )));
        }
        Ok(Self {
            tenant_code: tenant_code.to_string(),
            org_code: org_code.to_string(),
        })
    }

    pub fn tenant_code(&self) -> &str {
        &self.tenant_code
    }

    pub fn org_code(&self) -> &str {
        &self.org_code
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tenant_code, self.org_code)
    }
}

/// Check that a user-supplied value is safe to embed as one storage key segment.
pub fn validate_key_segment(what: &str, value: &str) -> Result<(), ServiceError> {
    if value.is_empty() {
        return Err(ServiceError::InvalidParameter(format!(
            "{what} must not be empty"
        )));
    }
    if value.starts_with('.') || value.contains(&['/', '\\'][..]) || value.contains("..") {
        return Err(ServiceError::InvalidParameter(format!(
            "{what} {value:?} contains path characters"
        )));
    }
    Ok(())
}

/// Image encodings. [`ImageFormat::Auto`] is a request-time wildcard meaning
/// "same as the original" and never describes stored bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Auto,
    Avif,
    Webp,
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Every format a stored image can have.
    pub const CONCRETE: [ImageFormat; 4] = [
        ImageFormat::Avif,
        ImageFormat::Webp,
        ImageFormat::Jpeg,
        ImageFormat::Png,
    ];

    pub fn is_auto(self) -> bool {
        self == ImageFormat::Auto
    }

    /// Lowercase name, also used as file extension and path segment.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Auto => "auto",
            ImageFormat::Avif => "avif",
            ImageFormat::Webp => "webp",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
        }
    }

    /// MIME type. `None` for `Auto`.
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            ImageFormat::Auto => None,
            ImageFormat::Avif => Some("image/avif"),
            ImageFormat::Webp => Some("image/webp"),
            ImageFormat::Jpeg => Some("image/jpeg"),
            ImageFormat::Png => Some("image/png"),
        }
    }

    /// Pick an output format from an HTTP `Accept` header.
    ///
    /// AVIF is preferred over WebP. Anything else yields `None`, leaving the
    /// caller to fall back to the original's format.
    pub fn from_accept_header(accept: &str) -> Option<Self> {
        let media_types: Vec<&str> = accept
            .split(',')
            .map(|part| part.split(';').next().unwrap_or("").trim())
            .collect();
        if media_types.iter().any(|m| m.eq_ignore_ascii_case("image/avif")) {
            Some(ImageFormat::Avif)
        } else if media_types.iter().any(|m| m.eq_ignore_ascii_case("image/webp")) {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = ServiceError;

    /// Accepts `avif`, `webp`, `jpg`, `jpeg`, `png` and `auto`, optionally
    /// with a leading dot, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix('.').unwrap_or(s).to_ascii_lowercase();
        match name.as_str() {
            "auto" => Ok(ImageFormat::Auto),
            "avif" => Ok(ImageFormat::Avif),
            "webp" => Ok(ImageFormat::Webp),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            _ => Err(ServiceError::InvalidParameter(format!(
                "unsupported image format: {s}"
            ))),
        }
    }
}

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(self) -> AspectRatio {
        AspectRatio::reduce(self.width, self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The concrete shape of a stored image. Never carries [`ImageFormat::Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ImageSpec {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        AspectRatio::reduce(self.width, self.height)
    }
}

impl fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.format)
    }
}

/// The partially specified target shape of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShapeRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<AspectRatio>,
}

impl ShapeRequest {
    /// Reject values that can never resolve to a real image.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.width == Some(0) {
            return Err(ServiceError::InvalidParameter(
                "width must be greater than zero".into(),
            ));
        }
        if self.height == Some(0) {
            return Err(ServiceError::InvalidParameter(
                "height must be greater than zero".into(),
            ));
        }
        if self.aspect_ratio.is_some_and(AspectRatio::is_degenerate) {
            return Err(ServiceError::InvalidParameter(
                "aspect ratio components must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// A shape plus target format, detached from any particular image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VariantRequest {
    pub shape: ShapeRequest,
    pub format: Option<ImageFormat>,
}

/// A request for one derivative of an original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeRequest {
    pub scope: TenantScope,
    pub name: String,
    pub shape: ShapeRequest,
    /// `None` and `Some(Auto)` both mean "same format as the original".
    pub format: Option<ImageFormat>,
}

impl DerivativeRequest {
    pub fn new(scope: TenantScope, name: &str, variant: VariantRequest) -> Self {
        Self {
            scope,
            name: name.to_string(),
            shape: variant.shape,
            format: variant.format,
        }
    }

    /// A request with no shape constraints: the original's dimensions and format.
    pub fn unconstrained(scope: TenantScope, name: &str) -> Self {
        Self::new(scope, name, VariantRequest::default())
    }

    /// The explicitly requested format, if it is not the `Auto` wildcard.
    pub fn explicit_format(&self) -> Option<ImageFormat> {
        self.format.filter(|f| !f.is_auto())
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        validate_key_segment("image name", &self.name)?;
        self.shape.validate()
    }
}
