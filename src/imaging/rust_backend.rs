//! Pure Rust image processing backend with no system library dependencies.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Inspect (JPEG, PNG, WebP) | `image::ImageReader::into_dimensions` (header only) |
//! | Inspect (AVIF) | `avif-parse` container metadata |
//! | Decode (JPEG, PNG, WebP) | `image` crate (pure Rust decoders) |
//! | Decode (AVIF) | `avif-parse` (container) + `rav1d` (AV1 decode) + custom YUV→RGB |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Crop | `DynamicImage::crop_imm` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → PNG, WebP | `image` crate encoders (WebP is lossless) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |

use super::backend::{BackendError, ImageBackend};
use super::calculations::scaled_dimensions;
use super::params::{CropRect, Quality};
use crate::types::{Dimensions, ImageFormat, ImageSpec};
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat as CodecFormat, ImageReader};
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustBackend {
    quality: Quality,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quality used by the lossy encoders (JPEG, AVIF).
    pub fn with_quality(quality: Quality) -> Self {
        Self { quality }
    }
}

/// Damaged or truncated input is an unsupported image; allocation limits and
/// other decoder failures are not the bytes' fault.
fn decode_error(e: ImageError) -> BackendError {
    match e {
        ImageError::Decoding(_) | ImageError::Unsupported(_) | ImageError::IoError(_) => {
            BackendError::UnsupportedFormat(format!("Failed to decode: {e}"))
        }
        other => BackendError::ProcessingFailed(format!("Failed to decode: {other}")),
    }
}

/// AVIF files are ISO-BMFF with an `ftyp` box naming the `avif`/`avis` brand.
fn is_avif(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && matches!(&bytes[8..12], b"avif" | b"avis")
}

/// Sniff the container format; only the four servable formats are accepted.
fn detect_format(bytes: &[u8]) -> Result<ImageFormat, BackendError> {
    if is_avif(bytes) {
        return Ok(ImageFormat::Avif);
    }
    match image::guess_format(bytes) {
        Ok(CodecFormat::Jpeg) => Ok(ImageFormat::Jpeg),
        Ok(CodecFormat::Png) => Ok(ImageFormat::Png),
        Ok(CodecFormat::WebP) => Ok(ImageFormat::Webp),
        Ok(other) => Err(BackendError::UnsupportedFormat(format!("{other:?}"))),
        Err(_) => Err(BackendError::UnsupportedFormat(
            "unrecognized image data".into(),
        )),
    }
}

fn codec_format(format: ImageFormat) -> Option<CodecFormat> {
    match format {
        ImageFormat::Jpeg => Some(CodecFormat::Jpeg),
        ImageFormat::Png => Some(CodecFormat::Png),
        ImageFormat::Webp => Some(CodecFormat::WebP),
        ImageFormat::Avif => Some(CodecFormat::Avif),
        ImageFormat::Auto => None,
    }
}

/// Extract dimensions from an AVIF file's container metadata (no full decode needed).
fn identify_avif(bytes: &[u8]) -> Result<Dimensions, BackendError> {
    let avif = avif_parse::read_avif(&mut Cursor::new(bytes))
        .map_err(|e| BackendError::UnsupportedFormat(format!("Failed to parse AVIF: {e:?}")))?;
    let meta = avif.primary_item_metadata().map_err(|e| {
        BackendError::UnsupportedFormat(format!("Failed to read AVIF metadata: {e:?}"))
    })?;
    Ok(Dimensions {
        width: meta.max_frame_width.get(),
        height: meta.max_frame_height.get(),
    })
}

/// Decode an AVIF file using avif-parse (container) + rav1d (AV1 decode).
///
/// The `image` crate's `"avif"` feature only provides the encoder (rav1e).
/// Decoding requires `"avif-native"` which depends on the C library dav1d.
/// Instead, we use `rav1d` (pure Rust port of dav1d) directly.
fn decode_avif(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use std::ptr::NonNull;

    let avif = avif_parse::read_avif(&mut Cursor::new(bytes))
        .map_err(|e| BackendError::UnsupportedFormat(format!("Failed to parse AVIF: {e:?}")))?;
    let av1_bytes: &[u8] = &avif.primary_item;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    unsafe { rav1d::src::lib::dav1d_default_settings(NonNull::from(&mut settings).cast()) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc =
        unsafe { rav1d::src::lib::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(BackendError::ProcessingFailed(format!(
            "rav1d open failed ({})",
            rc.0
        )));
    }

    let mut data = Dav1dData::default();
    let buf_ptr =
        unsafe { rav1d::src::lib::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
    if buf_ptr.is_null() {
        unsafe { rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::ProcessingFailed(
            "rav1d data_create failed".into(),
        ));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf_ptr, av1_bytes.len()) };

    let rc = unsafe { rav1d::src::lib::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            rav1d::src::lib::dav1d_data_unref(NonNull::new(&mut data));
            rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(BackendError::UnsupportedFormat(format!(
            "rav1d send_data failed ({})",
            rc.0
        )));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { rav1d::src::lib::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::UnsupportedFormat(format!(
            "rav1d get_picture failed ({})",
            rc.0
        )));
    }

    let decoded = picture_to_rgb(&pic);

    unsafe {
        rav1d::src::lib::dav1d_picture_unref(NonNull::new(&mut pic));
        rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx));
    }

    decoded
}

/// Convert a decoded rav1d picture to an RGB8 image. The picture must still
/// be referenced while this runs.
fn picture_to_rgb(
    pic: &rav1d::include::dav1d::picture::Dav1dPicture,
) -> Result<DynamicImage, BackendError> {
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };

    let missing_plane = || BackendError::ProcessingFailed("AVIF picture has no pixel data".into());

    let w = pic.p.w as u32;
    let h = pic.p.h as u32;
    let bpc = pic.p.bpc as u32;
    let layout = pic.p.layout;
    let y_ptr = pic.data[0].ok_or_else(missing_plane)?.as_ptr() as *const u8;

    let planes = if layout == DAV1D_PIXEL_LAYOUT_I400 {
        YuvPlanes {
            y_ptr,
            u_ptr: y_ptr,
            v_ptr: y_ptr,
            y_stride: pic.stride[0],
            uv_stride: 0,
            width: w,
            height: h,
            bpc,
            ss_x: false,
            ss_y: false,
            monochrome: true,
        }
    } else {
        let (ss_x, ss_y) = match layout {
            DAV1D_PIXEL_LAYOUT_I420 => (true, true),
            DAV1D_PIXEL_LAYOUT_I422 => (true, false),
            DAV1D_PIXEL_LAYOUT_I444 => (false, false),
            _ => {
                return Err(BackendError::ProcessingFailed(format!(
                    "Unsupported AVIF pixel layout: {layout}"
                )));
            }
        };
        YuvPlanes {
            y_ptr,
            u_ptr: pic.data[1].ok_or_else(missing_plane)?.as_ptr() as *const u8,
            v_ptr: pic.data[2].ok_or_else(missing_plane)?.as_ptr() as *const u8,
            y_stride: pic.stride[0],
            uv_stride: pic.stride[1],
            width: w,
            height: h,
            bpc,
            ss_x,
            ss_y,
            monochrome: false,
        }
    };

    image::RgbImage::from_raw(w, h, planes.to_rgb())
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| {
            BackendError::ProcessingFailed("Failed to create image from decoded AVIF data".into())
        })
}

/// Decoded YUV plane data from rav1d, ready for RGB conversion.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    /// Chroma subsampling: horizontal, vertical (e.g. I420 = true, true)
    ss_x: bool,
    ss_y: bool,
    monochrome: bool,
}

impl YuvPlanes {
    /// Convert YUV planes to interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Vec<u8> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;

        let mut rgb = vec![0u8; (self.width * self.height * 3) as usize];

        for row in 0..self.height {
            for col in 0..self.width {
                let y_val = read_pixel(self.y_ptr, self.y_stride, col, row, self.bpc);

                let (r, g, b) = if self.monochrome {
                    let v = (y_val * scale).clamp(0.0, 255.0);
                    (v, v, v)
                } else {
                    let u_col = if self.ss_x { col / 2 } else { col };
                    let u_row = if self.ss_y { row / 2 } else { row };
                    let cb = read_pixel(self.u_ptr, self.uv_stride, u_col, u_row, self.bpc);
                    let cr = read_pixel(self.v_ptr, self.uv_stride, u_col, u_row, self.bpc);

                    let cb_f = cb - center;
                    let cr_f = cr - center;

                    (
                        ((y_val + 1.402 * cr_f) * scale).clamp(0.0, 255.0),
                        ((y_val - 0.344136 * cb_f - 0.714136 * cr_f) * scale).clamp(0.0, 255.0),
                        ((y_val + 1.772 * cb_f) * scale).clamp(0.0, 255.0),
                    )
                };

                let idx = ((row * self.width + col) * 3) as usize;
                rgb[idx] = r as u8;
                rgb[idx + 1] = g as u8;
                rgb[idx + 2] = b as u8;
            }
        }

        rgb
    }
}

/// Read a single pixel value from a YUV plane, handling both 8-bit and 16-bit storage.
#[inline]
fn read_pixel(ptr: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    if bpc <= 8 {
        (unsafe { *ptr.offset(y as isize * stride + x as isize) }) as f32
    } else {
        // 10-bit and 12-bit are stored as u16
        let byte_offset = y as isize * stride + x as isize * 2;
        (unsafe { *(ptr.offset(byte_offset) as *const u16) }) as f32
    }
}

fn encode_failed(format: ImageFormat, e: impl std::fmt::Display) -> BackendError {
    BackendError::ProcessingFailed(format!("{format} encode failed: {e}"))
}

impl ImageBackend for RustBackend {
    type Image = DynamicImage;

    fn inspect(&self, bytes: &[u8]) -> Result<ImageSpec, BackendError> {
        let format = detect_format(bytes)?;
        let dims = match codec_format(format) {
            Some(CodecFormat::Avif) | None => identify_avif(bytes)?,
            Some(codec) => {
                let (width, height) = ImageReader::with_format(Cursor::new(bytes), codec)
                    .into_dimensions()
                    .map_err(|e| {
                        BackendError::UnsupportedFormat(format!("Failed to read dimensions: {e}"))
                    })?;
                Dimensions { width, height }
            }
        };
        Ok(ImageSpec {
            width: dims.width,
            height: dims.height,
            format,
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError> {
        match codec_format(detect_format(bytes)?) {
            Some(CodecFormat::Avif) | None => decode_avif(bytes),
            Some(codec) => image::load_from_memory_with_format(bytes, codec).map_err(decode_error),
        }
    }

    fn dimensions(&self, image: &DynamicImage) -> Dimensions {
        Dimensions::new(image.width(), image.height())
    }

    fn resize(&self, image: &DynamicImage, scale: f64) -> Result<DynamicImage, BackendError> {
        let to = scaled_dimensions(self.dimensions(image), scale);
        Ok(image.resize_exact(to.width, to.height, FilterType::Lanczos3))
    }

    fn crop(&self, image: &DynamicImage, rect: CropRect) -> Result<DynamicImage, BackendError> {
        let fits_x = rect.left.checked_add(rect.width).is_some_and(|r| r <= image.width());
        let fits_y = rect.top.checked_add(rect.height).is_some_and(|b| b <= image.height());
        if !fits_x || !fits_y {
            return Err(BackendError::ProcessingFailed(format!(
                "crop {}x{}+{}+{} outside {}x{} image",
                rect.width,
                rect.height,
                rect.left,
                rect.top,
                image.width(),
                image.height()
            )));
        }
        Ok(image.crop_imm(rect.left, rect.top, rect.width, rect.height))
    }

    fn encode(&self, image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, BackendError> {
        let mut buf = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let rgb = image.to_rgb8();
                image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut buf,
                    self.quality.value() as u8,
                )
                .encode_image(&rgb)
                .map_err(|e| encode_failed(format, e))?;
            }
            ImageFormat::Png => image
                .write_to(&mut Cursor::new(&mut buf), CodecFormat::Png)
                .map_err(|e| encode_failed(format, e))?,
            ImageFormat::Webp => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut Cursor::new(&mut buf), CodecFormat::WebP)
                .map_err(|e| encode_failed(format, e))?,
            // speed=6 for reasonable throughput
            ImageFormat::Avif => {
                let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
                    &mut buf,
                    6,
                    self.quality.value() as u8,
                );
                image
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_failed(format, e))?;
            }
            ImageFormat::Auto => {
                return Err(BackendError::ProcessingFailed(
                    "cannot encode to auto; resolve a concrete format first".into(),
                ));
            }
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{jpeg_bytes, png_bytes};

    // =========================================================================
    // inspect
    // =========================================================================

    #[test]
    fn inspect_synthetic_jpeg() {
        let backend = RustBackend::new();
        let spec = backend.inspect(&jpeg_bytes(200, 150)).unwrap();
        assert_eq!(
            spec,
            ImageSpec {
                width: 200,
                height: 150,
                format: ImageFormat::Jpeg
            }
        );
    }

    #[test]
    fn inspect_synthetic_png() {
        let backend = RustBackend::new();
        let spec = backend.inspect(&png_bytes(31, 17)).unwrap();
        assert_eq!(spec.dimensions(), Dimensions::new(31, 17));
        assert_eq!(spec.format, ImageFormat::Png);
    }

    #[test]
    fn inspect_garbage_is_unsupported() {
        let backend = RustBackend::new();
        assert!(matches!(
            backend.inspect(b"definitely not an image"),
            Err(BackendError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn inspect_gif_is_unsupported() {
        let backend = RustBackend::new();
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
        assert!(matches!(
            backend.inspect(gif),
            Err(BackendError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn truncated_png_inspects_but_fails_decode_as_unsupported() {
        let backend = RustBackend::new();
        let bytes = png_bytes(64, 48);
        let truncated = &bytes[..bytes.len() / 2];

        assert!(backend.inspect(truncated).is_ok());
        assert!(matches!(
            backend.decode(truncated),
            Err(BackendError::UnsupportedFormat(_))
        ));
    }

    // =========================================================================
    // resize / crop
    // =========================================================================

    #[test]
    fn resize_scales_both_axes() {
        let backend = RustBackend::new();
        let img = backend.decode(&png_bytes(400, 300)).unwrap();
        let resized = backend.resize(&img, 0.5).unwrap();
        assert_eq!(backend.dimensions(&resized), Dimensions::new(200, 150));
    }

    #[test]
    fn resize_rounds_like_calculations() {
        // 900x800 * 0.125 = 112.5x100 -> 113x100
        let backend = RustBackend::new();
        let img = backend.decode(&png_bytes(900, 800)).unwrap();
        let resized = backend.resize(&img, 0.125).unwrap();
        assert_eq!(backend.dimensions(&resized), Dimensions::new(113, 100));
    }

    #[test]
    fn crop_takes_requested_window() {
        let backend = RustBackend::new();
        let img = backend.decode(&png_bytes(100, 50)).unwrap();
        let cropped = backend
            .crop(
                &img,
                CropRect {
                    left: 25,
                    top: 0,
                    width: 50,
                    height: 50,
                },
            )
            .unwrap();
        assert_eq!(backend.dimensions(&cropped), Dimensions::new(50, 50));
        // Red channel encodes the source x coordinate
        assert_eq!(cropped.to_rgb8().get_pixel(0, 0)[0], 25);
    }

    #[test]
    fn crop_outside_image_errors() {
        let backend = RustBackend::new();
        let img = backend.decode(&png_bytes(10, 10)).unwrap();
        let result = backend.crop(
            &img,
            CropRect {
                left: 5,
                top: 0,
                width: 10,
                height: 10,
            },
        );
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    // =========================================================================
    // encode
    // =========================================================================

    #[test]
    fn encode_each_concrete_format_reinspects() {
        let backend = RustBackend::new();
        let img = backend.decode(&jpeg_bytes(48, 32)).unwrap();
        for format in ImageFormat::CONCRETE {
            let bytes = backend.encode(&img, format).unwrap();
            let spec = backend.inspect(&bytes).unwrap();
            assert_eq!(spec.format, format, "{format}");
            assert_eq!(spec.dimensions(), Dimensions::new(48, 32), "{format}");
        }
    }

    #[test]
    fn jpeg_quality_changes_output_size() {
        let img = RustBackend::new().decode(&png_bytes(96, 64)).unwrap();
        let low = RustBackend::with_quality(Quality::new(10))
            .encode(&img, ImageFormat::Jpeg)
            .unwrap();
        let high = RustBackend::with_quality(Quality::new(95))
            .encode(&img, ImageFormat::Jpeg)
            .unwrap();
        assert!(low.len() < high.len(), "{} vs {}", low.len(), high.len());
    }

    #[test]
    fn encode_auto_errors() {
        let backend = RustBackend::new();
        let img = backend.decode(&png_bytes(8, 8)).unwrap();
        assert!(backend.encode(&img, ImageFormat::Auto).is_err());
    }

    // =========================================================================
    // AVIF input
    // =========================================================================

    fn avif_bytes(width: u32, height: u32) -> Vec<u8> {
        let backend = RustBackend::new();
        let img = backend.decode(&jpeg_bytes(width, height)).unwrap();
        backend.encode(&img, ImageFormat::Avif).unwrap()
    }

    #[test]
    fn decode_avif_roundtrip() {
        let decoded = super::decode_avif(&avif_bytes(64, 48)).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }

    #[test]
    fn identify_avif_dimensions() {
        let dims = super::identify_avif(&avif_bytes(120, 80)).unwrap();
        assert_eq!(dims, Dimensions::new(120, 80));
    }

    #[test]
    fn avif_input_to_webp_output() {
        let backend = RustBackend::new();
        let img = backend.decode(&avif_bytes(200, 150)).unwrap();
        let resized = backend.resize(&img, 0.5).unwrap();
        let bytes = backend.encode(&resized, ImageFormat::Webp).unwrap();
        let spec = backend.inspect(&bytes).unwrap();
        assert_eq!(spec.format, ImageFormat::Webp);
        assert_eq!(spec.dimensions(), Dimensions::new(100, 75));
    }
}
