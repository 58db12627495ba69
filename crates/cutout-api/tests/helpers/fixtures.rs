//! Test fixtures: encoded images and multipart bodies.

use axum_test::multipart::{MultipartForm, Part};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

pub const BOUNDARY: &str = "cutout-test-boundary";

/// Solid-colour PNG of the given size.
pub fn solid_png(width: u32, height: u32, colour: [u8; 4]) -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(width, height, Rgba(colour)))
}

/// Red square on a green background.
pub fn subject_on_green(size: u32) -> Vec<u8> {
    let (lo, hi) = (size / 4, size * 3 / 4);
    let image = RgbaImage::from_fn(size, size, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            Rgba([220, 40, 40, 255])
        } else {
            Rgba([0, 255, 0, 255])
        }
    });
    encode_png(&image)
}

fn encode_png(image: &RgbaImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .expect("Failed to encode PNG");
    buffer
}

/// Multipart form with a `file` part and an optional `output_format` field.
pub fn upload_form(bytes: Vec<u8>, output_format: Option<&str>) -> MultipartForm {
    let part = Part::bytes(bytes::Bytes::from(bytes))
        .file_name("image.png")
        .mime_type("image/png");
    let form = MultipartForm::new().add_part("file", part);
    match output_format {
        Some(format) => form.add_text("output_format", format.to_string()),
        None => form,
    }
}

/// Raw multipart body with [`BOUNDARY`], for requests sent without `TestServer`.
pub fn raw_multipart_body(file: &[u8], output_format: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"output_format\"\r\n\r\n{output_format}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"image.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}
