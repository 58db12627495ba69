//! Upload bytes in, processed bytes out.

use cutout_core::OutputFormat;
use std::sync::Arc;
use uuid::Uuid;

use crate::artifact_store::ArtifactStore;
use crate::error::JobError;
use crate::executor::JobExecutor;

/// Result of a successful job, read back into memory.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub job_id: Uuid,
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

/// Ties the artifact store to the executor: write the input, run the engine,
/// read the output, and always remove both scratch files.
#[derive(Clone)]
pub struct ProcessingPipeline {
    store: Arc<ArtifactStore>,
    executor: JobExecutor,
}

impl ProcessingPipeline {
    pub fn new(store: Arc<ArtifactStore>, executor: JobExecutor) -> Self {
        Self { store, executor }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn engine_name(&self) -> &'static str {
        self.executor.engine_name()
    }

    pub async fn process(&self, data: &[u8], format: OutputFormat) -> Result<ProcessedImage, JobError> {
        let mut job = self.store.write_input(data, format).await?;

        let result = match self.executor.invoke(&mut job).await {
            Ok(_) => self
                .store
                .read_output(&job.output_path)
                .await
                .map_err(JobError::from),
            Err(e) => Err(e),
        };

        // Runs on every path, so neither file outlives the job.
        self.store.cleanup(&job.artifact_paths()).await;

        result.map(|bytes| ProcessedImage {
            job_id: job.job_id,
            bytes,
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::engine::ChromaKeyEngine;
    use image::{Rgba, RgbaImage};

    fn pipeline(dir: &std::path::Path) -> ProcessingPipeline {
        let store = Arc::new(ArtifactStore::new(dir));
        let executor = JobExecutor::new(Arc::new(ChromaKeyEngine::new(48)), 95);
        ProcessingPipeline::new(store, executor)
    }

    #[tokio::test]
    async fn test_process_returns_bytes_and_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let input = codec::encode_output(
            &RgbaImage::from_pixel(16, 16, Rgba([0, 255, 0, 255])),
            OutputFormat::Png,
            95,
        )
        .unwrap();

        let processed = pipeline.process(&input, OutputFormat::Webp).await.unwrap();
        assert_eq!(processed.format, OutputFormat::Webp);
        assert_eq!(
            image::guess_format(&processed.bytes).unwrap(),
            image::ImageFormat::WebP
        );
        assert!(pipeline.store().list_scratch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        assert!(pipeline.process(b"garbage", OutputFormat::Png).await.is_err());
        assert!(pipeline.store().list_scratch().await.unwrap().is_empty());
    }
}
