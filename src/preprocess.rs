//! Turns uploaded bytes into the fixed-shape input tensor the classifier expects.

use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;
use thiserror::Error;

/// Side length of the square grid fed to the model.
pub const INPUT_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;

/// Major brands of ISO-BMFF files that carry HEIF still images.
const HEIF_BRANDS: [&[u8; 4]; 8] = [
    b"heic", b"heix", b"heim", b"heis", b"hevc", b"hevx", b"mif1", b"msf1",
];

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Empty file uploaded")]
    Empty,

    #[error("Invalid image file: {0}")]
    Decode(String),

    #[error("Invalid image file: HEIC/HEIF support is not enabled on this server")]
    UnsupportedContainer,
}

/// True when the bytes start with an `ftyp` box naming a HEIF brand.
pub fn sniff_heif(bytes: &[u8]) -> bool {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return false;
    }
    HEIF_BRANDS.iter().any(|brand| &bytes[8..12] == *brand)
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    if bytes.is_empty() {
        return Err(PreprocessError::Empty);
    }

    if sniff_heif(bytes) {
        return decode_heif(bytes);
    }

    image::load_from_memory(bytes).map_err(|e| PreprocessError::Decode(e.to_string()))
}

#[cfg(feature = "heif")]
fn decode_heif(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    use image::RgbImage;
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let decode_err = |e: libheif_rs::HeifError| PreprocessError::Decode(e.to_string());

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(bytes).map_err(decode_err)?;
    let handle = ctx.primary_image_handle().map_err(decode_err)?;
    let decoded = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(decode_err)?;

    let plane = decoded
        .planes()
        .interleaved
        .ok_or_else(|| PreprocessError::Decode("HEIF image has no interleaved RGB plane".into()))?;

    let (width, height) = (plane.width, plane.height);
    let row_len = width as usize * CHANNELS;
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in plane.data.chunks(plane.stride).take(height as usize) {
        pixels.extend_from_slice(&row[..row_len]);
    }

    RgbImage::from_raw(width, height, pixels)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| PreprocessError::Decode("HEIF plane is shorter than its dimensions".into()))
}

#[cfg(not(feature = "heif"))]
fn decode_heif(_bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    Err(PreprocessError::UnsupportedContainer)
}

/// RGB, 224x224 (aspect ratio not preserved), values scaled to [0, 1], NHWC with batch of one.
pub fn to_input(image: &DynamicImage) -> Array4<f32> {
    let side = INPUT_SIZE as usize;
    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    Array4::from_shape_fn((1, side, side, CHANNELS), |(_, y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

pub fn preprocess(bytes: &[u8]) -> Result<Array4<f32>, PreprocessError> {
    let image = decode_image(bytes)?;
    Ok(to_input(&image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn heif_header(brand: &[u8; 4]) -> Vec<u8> {
        let mut bytes = vec![0, 0, 0, 24];
        bytes.extend_from_slice(b"ftyp");
        bytes.extend_from_slice(brand);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(b"mif1heic");
        bytes
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(decode_image(&[]), Err(PreprocessError::Empty)));
        assert!(matches!(preprocess(&[]), Err(PreprocessError::Empty)));
    }

    #[test]
    fn garbage_is_rejected_with_message() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
        assert!(err.to_string().starts_with("Invalid image file"));
    }

    #[test]
    fn truncated_png_is_rejected() {
        let png = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))),
            ImageOutputFormat::Png,
        );
        let err = decode_image(&png[..png.len() / 2]).unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
    }

    #[test]
    fn output_has_fixed_shape_and_range() {
        let jpeg = encode(
            DynamicImage::ImageRgb8(RgbImage::from_fn(640, 480, |x, y| {
                Rgb([(x % 256) as u8, (y % 256) as u8, 200])
            })),
            ImageOutputFormat::Jpeg(90),
        );

        let input = preprocess(&jpeg).unwrap();
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        assert!(input.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn uniform_color_is_scaled_by_255() {
        let png = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 30, Rgb([255, 0, 51]))),
            ImageOutputFormat::Png,
        );

        let input = preprocess(&png).unwrap();
        assert!((input[[0, 10, 10, 0]] - 1.0).abs() < 1e-6);
        assert!(input[[0, 10, 10, 1]].abs() < 1e-6);
        assert!((input[[0, 200, 100, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn grayscale_and_alpha_become_rgb() {
        let gray = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, Luma([128]))),
            ImageOutputFormat::Png,
        );
        let input = preprocess(&gray).unwrap();
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        assert_eq!(input[[0, 5, 5, 0]], input[[0, 5, 5, 2]]);

        let rgba = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 255, 0, 10]))),
            ImageOutputFormat::Png,
        );
        let input = preprocess(&rgba).unwrap();
        assert!((input[[0, 0, 0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sniffs_heif_brands() {
        assert!(sniff_heif(&heif_header(b"heic")));
        assert!(sniff_heif(&heif_header(b"mif1")));
        assert!(!sniff_heif(&heif_header(b"isom")));
        assert!(!sniff_heif(b"\x89PNG\r\n\x1a\n"));
        assert!(!sniff_heif(b"ftyp"));
    }

    #[cfg(not(feature = "heif"))]
    #[test]
    fn heif_without_opener_reports_unsupported() {
        let err = decode_image(&heif_header(b"heic")).unwrap_err();
        assert!(matches!(err, PreprocessError::UnsupportedContainer));
    }

    #[cfg(feature = "heif")]
    #[test]
    fn heif_is_routed_to_libheif() {
        // A bare ftyp box is recognised but has no image payload for libheif to decode.
        let err = decode_image(&heif_header(b"heic")).unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
    }
}
