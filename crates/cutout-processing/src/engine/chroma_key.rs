//! In-process engine that keys out the background colour sampled from the
//! image corners. Needs no Python, so it backs tests and lightweight deployments.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::codec;
use crate::error::JobError;
use crate::traits::{BackgroundEngine, EngineReport, EngineRequest};

pub struct ChromaKeyEngine {
    tolerance: u8,
}

impl ChromaKeyEngine {
    pub fn new(tolerance: u8) -> Self {
        Self { tolerance }
    }
}

#[async_trait]
impl BackgroundEngine for ChromaKeyEngine {
    fn name(&self) -> &'static str {
        "chroma-key"
    }

    async fn run(&self, request: &EngineRequest) -> Result<EngineReport, JobError> {
        let input = tokio::fs::read(&request.input_path).await?;
        let tolerance = self.tolerance;
        let format = request.format;
        let quality = request.jpeg_quality;

        let (encoded, width, height) = tokio::task::spawn_blocking(move || {
            let mut image = codec::decode(&input)?.to_rgba8();
            let keyed = key_out_background(&mut image, tolerance);
            tracing::debug!(keyed, total = image.width() * image.height(), "Keyed background pixels");
            let encoded = codec::encode_output(&image, format, quality)?;
            Ok::<_, JobError>((encoded, image.width(), image.height()))
        })
        .await
        .map_err(|e| JobError::Join(e.to_string()))??;

        tokio::fs::write(&request.output_path, encoded).await?;

        Ok(EngineReport {
            width: Some(width),
            height: Some(height),
            output: String::new(),
        })
    }
}

/// Average of the four corner pixels.
fn background_colour(image: &RgbaImage) -> [u8; 3] {
    let (w, h) = (image.width() - 1, image.height() - 1);
    let corners = [(0, 0), (w, 0), (0, h), (w, h)];
    let mut sum = [0u32; 3];
    for (x, y) in corners {
        let [r, g, b, _] = image.get_pixel(x, y).0;
        sum[0] += r as u32;
        sum[1] += g as u32;
        sum[2] += b as u32;
    }
    sum.map(|c| (c / 4) as u8)
}

/// Make every pixel within `tolerance` (per channel) of the background colour
/// fully transparent. Returns the number of pixels keyed out.
fn key_out_background(image: &mut RgbaImage, tolerance: u8) -> u32 {
    if image.width() == 0 || image.height() == 0 {
        return 0;
    }

    let background = background_colour(image);
    let mut keyed = 0;
    for pixel in image.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let distance = [r, g, b]
            .iter()
            .zip(background.iter())
            .map(|(c, bg)| c.abs_diff(*bg))
            .max()
            .unwrap_or(0);
        if distance <= tolerance {
            *pixel = Rgba([r, g, b, 0]);
            keyed += 1;
        }
    }
    keyed
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutout_core::{OutputFormat, ProcessingJob};

    fn subject_on_green() -> RgbaImage {
        RgbaImage::from_fn(40, 40, |x, y| {
            if (10..30).contains(&x) && (10..30).contains(&y) {
                Rgba([220, 40, 40, 255])
            } else {
                Rgba([0, 255, 0, 255])
            }
        })
    }

    #[test]
    fn test_key_out_background_keeps_subject() {
        let mut image = subject_on_green();
        let keyed = key_out_background(&mut image, 48);
        assert_eq!(keyed, 40 * 40 - 20 * 20);
        assert_eq!(image.get_pixel(0, 0).0[3], 0);
        assert_eq!(image.get_pixel(20, 20).0[3], 255);
    }

    #[tokio::test]
    async fn test_run_writes_transparent_png() {
        let dir = tempfile::tempdir().unwrap();
        let job = ProcessingJob::new(dir.path(), OutputFormat::Png);
        let input = codec::encode_output(&subject_on_green(), OutputFormat::Png, 95).unwrap();
        tokio::fs::write(&job.input_path, input).await.unwrap();

        let engine = ChromaKeyEngine::new(48);
        let report = engine
            .run(&EngineRequest::for_job(&job, 95))
            .await
            .unwrap();
        assert_eq!((report.width, report.height), (Some(40), Some(40)));

        let output = tokio::fs::read(&job.output_path).await.unwrap();
        let decoded = codec::decode(&output).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
        assert_eq!(decoded.get_pixel(20, 20).0[3], 255);
    }

    #[tokio::test]
    async fn test_undecodable_input_is_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let job = ProcessingJob::new(dir.path(), OutputFormat::Png);
        tokio::fs::write(&job.input_path, b"not an image").await.unwrap();

        let err = ChromaKeyEngine::new(48)
            .run(&EngineRequest::for_job(&job, 95))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Codec(_)));
        assert!(!job.output_path.exists());
    }
}
