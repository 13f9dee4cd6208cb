//! CLI output formatting for every command.
//!
//! # Output Format
//!
//! ## Upload
//!
//! ```text
//! 3f2a9c0e1b7d4a55
//!     Scope: acme-web
//!     Original: 1920x1080 jpeg
//! ```
//!
//! ## Get
//!
//! ```text
//! 300x200 webp: built
//!     Key: images/acme-web/3f2a9c0e1b7d4a55/webp/3:2/300/3f2a9c0e1b7d4a55.webp
//!     Output: thumb.webp (18342 bytes)
//! ```
//!
//! ## Warm
//!
//! ```text
//! 001 width=300&format=webp → 300x200 webp: cached
//! 002 width=9000 → error: invalid parameter: resolved dimensions 9000x6000 exceed the 8192 px limit
//!
//! 1 cached, 0 built (1 total)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure, with no I/O. Upload and get also have a `*_json` variant for
//! `--json`.

use crate::cache::{CacheOutcome, CacheStats, Derivative};
use crate::error::ServiceError;
use crate::types::{ImageSpec, TenantScope};
use serde_json::json;
use std::path::Path;

fn format_index(pos: usize) -> String {
    format!("{:03}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn outcome_label(outcome: CacheOutcome) -> &'static str {
    match outcome {
        CacheOutcome::Hit => "cached",
        CacheOutcome::Built => "built",
    }
}

// ============================================================================
// Upload
// ============================================================================

pub fn format_upload(name: &str, scope: &TenantScope, original: Option<&ImageSpec>) -> Vec<String> {
    let mut lines = vec![name.to_string(), format!("{}Scope: {scope}", indent(1))];
    if let Some(spec) = original {
        lines.push(format!("{}Original: {spec}", indent(1)));
    }
    lines
}

pub fn print_upload(name: &str, scope: &TenantScope, original: Option<&ImageSpec>) {
    for line in format_upload(name, scope, original) {
        println!("{line}");
    }
}

pub fn upload_json(
    name: &str,
    scope: &TenantScope,
    original: Option<&ImageSpec>,
) -> serde_json::Result<String> {
    let original = original.map(|spec| {
        json!({
            "width": spec.width,
            "height": spec.height,
            "format": spec.format.as_str(),
        })
    });
    serde_json::to_string_pretty(&json!({
        "imgName": name,
        "scope": scope.to_string(),
        "original": original,
    }))
}

// ============================================================================
// Get
// ============================================================================

pub fn format_derivative(derivative: &Derivative, output: &Path) -> Vec<String> {
    vec![
        format!(
            "{}: {}",
            derivative.spec,
            outcome_label(derivative.outcome)
        ),
        format!("{}Key: {}", indent(1), derivative.key),
        format!(
            "{}Output: {} ({} bytes)",
            indent(1),
            output.display(),
            derivative.bytes.len()
        ),
    ]
}

pub fn print_derivative(derivative: &Derivative, output: &Path) {
    for line in format_derivative(derivative, output) {
        println!("{line}");
    }
}

pub fn derivative_json(derivative: &Derivative, output: &Path) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&json!({
        "key": derivative.key,
        "width": derivative.spec.width,
        "height": derivative.spec.height,
        "format": derivative.spec.format.as_str(),
        "contentType": derivative.spec.format.content_type(),
        "outcome": outcome_label(derivative.outcome),
        "output": output.display().to_string(),
        "bytes": derivative.bytes.len(),
    }))
}

// ============================================================================
// Warm
// ============================================================================

/// One line per requested shape, in request order, then the stats summary.
pub fn format_warm(
    shapes: &[String],
    results: &[Result<Derivative, ServiceError>],
    stats: &CacheStats,
) -> Vec<String> {
    let mut lines: Vec<String> = shapes
        .iter()
        .zip(results)
        .enumerate()
        .map(|(i, (shape, result))| {
            let status = match result {
                Ok(d) => format!("{}: {}", d.spec, outcome_label(d.outcome)),
                Err(e) => format!("error: {e}"),
            };
            format!("{} {shape} → {status}", format_index(i + 1))
        })
        .collect();
    lines.push(String::new());
    lines.push(stats.to_string());
    lines
}

pub fn print_warm(
    shapes: &[String],
    results: &[Result<Derivative, ServiceError>],
    stats: &CacheStats,
) {
    for line in format_warm(shapes, results, stats) {
        println!("{line}");
    }
}

// ============================================================================
// Variants
// ============================================================================

pub fn format_variants(name: &str, keys: &[String]) -> Vec<String> {
    let mut lines = vec![format!("{name} ({} cached)", keys.len())];
    lines.extend(keys.iter().map(|k| format!("{}{k}", indent(1))));
    lines
}

pub fn print_variants(name: &str, keys: &[String]) {
    for line in format_variants(name, keys) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageFormat;

    fn derivative(outcome: CacheOutcome) -> Derivative {
        Derivative {
            bytes: vec![0; 42],
            spec: ImageSpec {
                width: 300,
                height: 200,
                format: ImageFormat::Webp,
            },
            key: "images/acme-web/abc/webp/3:2/300/abc.webp".into(),
            outcome,
        }
    }

    #[test]
    fn upload_lines() {
        let scope = TenantScope::new("acme", "web").unwrap();
        let spec = ImageSpec {
            width: 1920,
            height: 1080,
            format: ImageFormat::Jpeg,
        };
        assert_eq!(
            format_upload("abc", &scope, Some(&spec)),
            vec!["abc", "    Scope: acme-web", "    Original: 1920x1080 jpeg"]
        );
        assert_eq!(format_upload("abc", &scope, None).len(), 2);
    }

    #[test]
    fn upload_json_uses_img_name() {
        let scope = TenantScope::new("acme", "web").unwrap();
        let out = upload_json("abc", &scope, None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["imgName"], "abc");
        assert_eq!(value["scope"], "acme-web");
        assert!(value["original"].is_null());
    }

    #[test]
    fn derivative_json_fields() {
        let out =
            derivative_json(&derivative(CacheOutcome::Hit), Path::new("out.webp")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["width"], 300);
        assert_eq!(value["format"], "webp");
        assert_eq!(value["contentType"], "image/webp");
        assert_eq!(value["outcome"], "cached");
        assert_eq!(value["bytes"], 42);
    }

    #[test]
    fn derivative_lines() {
        let lines = format_derivative(&derivative(CacheOutcome::Built), Path::new("out.webp"));
        assert_eq!(lines[0], "300x200 webp: built");
        assert_eq!(lines[1], "    Key: images/acme-web/abc/webp/3:2/300/abc.webp");
        assert_eq!(lines[2], "    Output: out.webp (42 bytes)");
    }

    #[test]
    fn warm_lines_keep_order_and_show_errors() {
        let shapes = vec!["width=300".to_string(), "width=0".to_string()];
        let results = vec![
            Ok(derivative(CacheOutcome::Hit)),
            Err(ServiceError::InvalidParameter("width must be greater than zero".into())),
        ];
        let stats = CacheStats {
            hits: 1,
            misses: 0,
            uploads: 0,
        };

        let lines = format_warm(&shapes, &results, &stats);

        assert_eq!(lines[0], "001 width=300 → 300x200 webp: cached");
        assert_eq!(
            lines[1],
            "002 width=0 → error: invalid parameter: width must be greater than zero"
        );
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "1 cached, 0 built (1 total)");
    }

    #[test]
    fn variants_lines() {
        let keys = vec!["a/b".to_string(), "a/c".to_string()];
        assert_eq!(
            format_variants("abc", &keys),
            vec!["abc (2 cached)", "    a/b", "    a/c"]
        );
    }
}
