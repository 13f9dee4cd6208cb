//! Parsing at the transport boundary.
//!
//! Turns the raw strings a caller has (a query string, an `Accept` header)
//! into typed requests. Everything malformed is an
//! [`InvalidParameter`](ServiceError::InvalidParameter) and never reaches the
//! cache.
//!
//! Recognised query keys: `width`, `height`, `ar` (as `W:H`) and `format`.
//!
//! ```
//! # use derivo::{TenantScope, ImageFormat};
//! # use derivo::query::parse_query;
//! let scope = TenantScope::new("acme", "web").unwrap();
//! let req = parse_query(scope, "0123abcd", "width=300&ar=4:3&format=webp").unwrap();
//! assert_eq!(req.shape.width, Some(300));
//! assert_eq!(req.format, Some(ImageFormat::Webp));
//! ```

use crate::aspect::AspectRatio;
use crate::error::ServiceError;
use crate::types::{DerivativeRequest, ImageFormat, ShapeRequest, TenantScope, VariantRequest};

fn invalid(msg: String) -> ServiceError {
    ServiceError::InvalidParameter(msg)
}

fn parse_dimension(key: &str, value: &str) -> Result<u32, ServiceError> {
    let n: u32 = value
        .parse()
        .map_err(|_| invalid(format!("invalid {key}: {value:?}")))?;
    if n == 0 {
        return Err(invalid(format!("{key} must be greater than zero")));
    }
    Ok(n)
}

/// Parse `width`, `height`, `ar` and `format` from an `&`-separated query.
///
/// A leading `?` is ignored. Unknown or repeated keys and empty values are
/// rejected.
pub fn parse_variant(query: &str) -> Result<VariantRequest, ServiceError> {
    let mut shape = ShapeRequest::default();
    let mut format = None;

    let query = query.strip_prefix('?').unwrap_or(query);
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| invalid(format!("expected key=value, got {pair:?}")))?;
        if value.is_empty() {
            return Err(invalid(format!("empty value for {key}")));
        }
        let repeated = match key {
            "width" => shape.width.replace(parse_dimension(key, value)?).is_some(),
            "height" => shape.height.replace(parse_dimension(key, value)?).is_some(),
            "ar" => {
                // `:` often arrives percent-encoded
                let value = value.replace("%3A", ":").replace("%3a", ":");
                let ar: AspectRatio = value
                    .parse()
                    .map_err(|e| invalid(format!("invalid ar: {e}")))?;
                if ar.is_degenerate() {
                    return Err(invalid(format!("degenerate aspect ratio {value:?}")));
                }
                shape.aspect_ratio.replace(ar).is_some()
            }
            "format" => format.replace(value.parse::<ImageFormat>()?).is_some(),
            other => return Err(invalid(format!("unknown query parameter {other:?}"))),
        };
        if repeated {
            return Err(invalid(format!("repeated query parameter {key:?}")));
        }
    }

    Ok(VariantRequest { shape, format })
}

/// Parse a full derivative request for `name` in `scope`.
pub fn parse_query(
    scope: TenantScope,
    name: &str,
    query: &str,
) -> Result<DerivativeRequest, ServiceError> {
    let request = DerivativeRequest::new(scope, name, parse_variant(query)?);
    request.validate()?;
    Ok(request)
}

/// Pick the output format: an explicit concrete format wins, then whatever
/// the `Accept` header prefers, then `None` (keep the original's format).
pub fn negotiate_format(
    requested: Option<ImageFormat>,
    accept: Option<&str>,
) -> Option<ImageFormat> {
    requested
        .filter(|f| !f.is_auto())
        .or_else(|| accept.and_then(ImageFormat::from_accept_header))
}
