//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the single capability interface the cache
//! needs from a pixel library: inspect, decode, resize by scale, crop, and
//! encode. Formats are plain parameters; there is no per-format dispatch
//! outside the backend.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust, statically
//! linked. A backend is constructed once at startup and handed to the cache
//! service; nothing reaches for a global decoder handle.

use super::params::CropRect;
use crate::types::{Dimensions, ImageFormat, ImageSpec};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for image processing backends.
///
/// `Image` is the backend's decoded representation, so a build decodes the
/// original once and encodes the result once no matter how many steps run
/// in between.
pub trait ImageBackend: Sync {
    type Image: Send;

    /// Read width, height and format without fully decoding when possible.
    ///
    /// Returns [`BackendError::UnsupportedFormat`] for bytes no decoder accepts.
    fn inspect(&self, bytes: &[u8]) -> Result<ImageSpec, BackendError>;

    /// Decode encoded bytes into pixels.
    ///
    /// Returns [`BackendError::UnsupportedFormat`] when the bytes are damaged
    /// or otherwise cannot be decoded; other variants are provider failures.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Image, BackendError>;

    /// Current pixel size of a decoded image.
    fn dimensions(&self, image: &Self::Image) -> Dimensions;

    /// Uniformly scale both axes by `scale`.
    fn resize(&self, image: &Self::Image, scale: f64) -> Result<Self::Image, BackendError>;

    /// Cut out `rect`, which must lie inside the image.
    fn crop(&self, image: &Self::Image, rect: CropRect) -> Result<Self::Image, BackendError>;

    /// Encode to `format`. `Auto` is not a valid target.
    fn encode(&self, image: &Self::Image, format: ImageFormat) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::calculations::scaled_dimensions;
    use std::sync::Mutex;

    /// Encoded form understood by [`MockBackend`]: `mock:{format}:{w}x{h}`.
    pub fn mock_image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        format!("mock:{format}:{width}x{height}").into_bytes()
    }

    /// Mock bytes whose header inspects fine but whose body does not decode.
    pub fn mock_truncated_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        format!("mock:{format}:{width}x{height}:truncated").into_bytes()
    }

    /// Decoded image of the mock backend: just its shape.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MockImage {
        pub width: u32,
        pub height: u32,
        pub format: ImageFormat,
    }

    /// Mock backend that records operations and fakes pixels with shapes.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
        /// When set, every resize returns this size instead of the real one.
        pub resize_override: Mutex<Option<Dimensions>>,
        /// When set, inspect and decode fail with `ProcessingFailed`.
        pub failure: Mutex<Option<String>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Inspect,
        Decode,
        Resize { scale: f64, to: Dimensions },
        Crop(CropRect),
        Encode(ImageFormat),
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_resize_result(dims: Dimensions) -> Self {
            Self {
                resize_override: Mutex::new(Some(dims)),
                ..Self::default()
            }
        }

        /// A backend whose inspect and decode fail for reasons unrelated to
        /// the bytes.
        pub fn failing(message: &str) -> Self {
            Self {
                failure: Mutex::new(Some(message.to_string())),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn count(&self, pred: impl Fn(&RecordedOp) -> bool) -> usize {
            self.get_operations().iter().filter(|op| pred(op)).count()
        }

        fn record(&self, op: RecordedOp) {
            self.operations.lock().unwrap().push(op);
        }

        fn check_failure(&self) -> Result<(), BackendError> {
            match self.failure.lock().unwrap().as_ref() {
                Some(message) => Err(BackendError::ProcessingFailed(message.clone())),
                None => Ok(()),
            }
        }

        fn is_truncated(bytes: &[u8]) -> bool {
            bytes.ends_with(b":truncated")
        }

        fn parse(bytes: &[u8]) -> Result<MockImage, BackendError> {
            let unsupported = || BackendError::UnsupportedFormat("not a mock image".into());
            let text = std::str::from_utf8(bytes).map_err(|_| unsupported())?;
            let text = text.strip_suffix(":truncated").unwrap_or(text);
            let rest = text.strip_prefix("mock:").ok_or_else(unsupported)?;
            let (format, size) = rest.split_once(':').ok_or_else(unsupported)?;
            let (w, h) = size.split_once('x').ok_or_else(unsupported)?;
            Ok(MockImage {
                width: w.parse().map_err(|_| unsupported())?,
                height: h.parse().map_err(|_| unsupported())?,
                format: format.parse().map_err(|_| unsupported())?,
            })
        }
    }

    impl ImageBackend for MockBackend {
        type Image = MockImage;

        fn inspect(&self, bytes: &[u8]) -> Result<ImageSpec, BackendError> {
            self.record(RecordedOp::Inspect);
            self.check_failure()?;
            let img = Self::parse(bytes)?;
            Ok(ImageSpec {
                width: img.width,
                height: img.height,
                format: img.format,
            })
        }

        fn decode(&self, bytes: &[u8]) -> Result<MockImage, BackendError> {
            self.record(RecordedOp::Decode);
            self.check_failure()?;
            if Self::is_truncated(bytes) {
                return Err(BackendError::UnsupportedFormat("unexpected end of data".into()));
            }
            Self::parse(bytes)
        }

        fn dimensions(&self, image: &MockImage) -> Dimensions {
            Dimensions::new(image.width, image.height)
        }

        fn resize(&self, image: &MockImage, scale: f64) -> Result<MockImage, BackendError> {
            let to = self
                .resize_override
                .lock()
                .unwrap()
                .unwrap_or_else(|| scaled_dimensions(self.dimensions(image), scale));
            self.record(RecordedOp::Resize { scale, to });
            Ok(MockImage {
                width: to.width,
                height: to.height,
                ..*image
            })
        }

        fn crop(&self, image: &MockImage, rect: CropRect) -> Result<MockImage, BackendError> {
            self.record(RecordedOp::Crop(rect));
            if rect.left + rect.width > image.width || rect.top + rect.height > image.height {
                return Err(BackendError::ProcessingFailed("crop out of bounds".into()));
            }
            Ok(MockImage {
                width: rect.width,
                height: rect.height,
                ..*image
            })
        }

        fn encode(&self, image: &MockImage, format: ImageFormat) -> Result<Vec<u8>, BackendError> {
            self.record(RecordedOp::Encode(format));
            if format.is_auto() {
                return Err(BackendError::ProcessingFailed("cannot encode auto".into()));
            }
            Ok(mock_image_bytes(image.width, image.height, format))
        }
    }

    #[test]
    fn mock_inspect_parses_shape() {
        let backend = MockBackend::new();
        let spec = backend
            .inspect(&mock_image_bytes(800, 600, ImageFormat::Png))
            .unwrap();
        assert_eq!(
            spec,
            ImageSpec {
                width: 800,
                height: 600,
                format: ImageFormat::Png
            }
        );
        assert_eq!(backend.get_operations(), vec![RecordedOp::Inspect]);
    }

    #[test]
    fn mock_rejects_foreign_bytes() {
        let backend = MockBackend::new();
        assert!(matches!(
            backend.inspect(b"GIF89a"),
            Err(BackendError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn mock_records_resize_and_crop() {
        let backend = MockBackend::new();
        let img = backend
            .decode(&mock_image_bytes(500, 500, ImageFormat::Jpeg))
            .unwrap();
        let resized = backend.resize(&img, 0.5).unwrap();
        assert_eq!(backend.dimensions(&resized), Dimensions::new(250, 250));

        let rect = CropRect {
            left: 25,
            top: 0,
            width: 200,
            height: 250,
        };
        let cropped = backend.crop(&resized, rect).unwrap();
        assert_eq!(backend.dimensions(&cropped), Dimensions::new(200, 250));

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[1], RecordedOp::Resize { scale, .. } if scale == 0.5));
        assert_eq!(ops[2], RecordedOp::Crop(rect));
    }

    #[test]
    fn mock_truncated_inspects_but_does_not_decode() {
        let backend = MockBackend::new();
        let bytes = mock_truncated_bytes(64, 48, ImageFormat::Png);
        assert_eq!(backend.inspect(&bytes).unwrap().dimensions(), Dimensions::new(64, 48));
        assert!(matches!(
            backend.decode(&bytes),
            Err(BackendError::UnsupportedFormat(_))
        ));
    }
}
