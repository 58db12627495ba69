//! Output encoding shared by in-process engines and the client.

use cutout_core::OutputFormat;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, ImageResult, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;

/// Default JPEG quality for flattened output.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Decode any supported image from memory, guessing the format from its bytes.
pub fn decode(data: &[u8]) -> ImageResult<DynamicImage> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()
}

/// Alpha-composite `image` over an opaque white background.
pub fn flatten_onto_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Encode a cutout in `format`. JPEG variants are flattened over white first
/// because the format has no alpha channel.
pub fn encode_output(image: &RgbaImage, format: OutputFormat, jpeg_quality: u8) -> ImageResult<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        OutputFormat::Jpeg | OutputFormat::Jpg => {
            let flattened = DynamicImage::ImageRgb8(flatten_onto_white(image));
            flattened.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, jpeg_quality))?;
        }
        OutputFormat::Png => {
            image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        }
        OutputFormat::Webp => {
            image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::WebP)?;
        }
    }
    Ok(buffer)
}

/// Decode `data` and encode it again in `format`.
pub fn reencode(data: &[u8], format: OutputFormat, jpeg_quality: u8) -> ImageResult<Vec<u8>> {
    let image = decode(data)?.to_rgba8();
    encode_output(&image, format, jpeg_quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba};

    fn half_transparent() -> RgbaImage {
        RgbaImage::from_fn(20, 20, |x, _| {
            if x < 10 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([200, 30, 30, 255])
            }
        })
    }

    #[test]
    fn test_flatten_turns_transparent_pixels_white() {
        let flat = flatten_onto_white(&half_transparent());
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(15, 5), &Rgb([200, 30, 30]));
    }

    #[test]
    fn test_flatten_blends_partial_alpha() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let flat = flatten_onto_white(&image);
        let [r, g, b] = flat.get_pixel(0, 0).0;
        assert!((126..=128).contains(&r));
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn test_jpeg_output_has_no_alpha_and_white_corners() {
        for format in [OutputFormat::Jpeg, OutputFormat::Jpg] {
            let bytes = encode_output(&half_transparent(), format, DEFAULT_JPEG_QUALITY).unwrap();
            let decoded = decode(&bytes).unwrap();
            assert!(!decoded.color().has_alpha());
            let corner = decoded.get_pixel(0, 0).0;
            assert!(corner[..3].iter().all(|c| *c >= 245), "corner was {:?}", corner);
        }
    }

    #[test]
    fn test_png_and_webp_keep_alpha() {
        for format in [OutputFormat::Png, OutputFormat::Webp] {
            let bytes = encode_output(&half_transparent(), format, DEFAULT_JPEG_QUALITY).unwrap();
            let decoded = decode(&bytes).unwrap().to_rgba8();
            assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
            assert_eq!(decoded.get_pixel(15, 0).0[3], 255);
        }
    }

    #[test]
    fn test_reencode_png_to_jpeg() {
        let png = encode_output(&half_transparent(), OutputFormat::Png, 95).unwrap();
        let jpeg = reencode(&png, OutputFormat::Jpeg, 90).unwrap();
        assert_eq!(
            image::guess_format(&jpeg).unwrap(),
            image::ImageFormat::Jpeg
        );
    }
}
