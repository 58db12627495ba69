//! Scratch-file management for background-removal jobs.
//!
//! One working directory is shared by all jobs and created lazily on first
//! use. Each job gets `input_<uuid>` / `output_<uuid>.<ext>` inside it, and
//! both are removed after the job whatever its outcome.

use cutout_core::{OutputFormat, ProcessingJob};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

pub struct ArtifactStore {
    dir: PathBuf,
    created: OnceCell<()>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            created: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the scratch directory once; concurrent callers wait for the same creation.
    async fn ensure_dir(&self) -> io::Result<()> {
        self.created
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.dir).await?;
                tracing::debug!(dir = %self.dir.display(), "Scratch directory ready");
                Ok::<(), io::Error>(())
            })
            .await
            .map(|_| ())
    }

    /// Allocate a job and write its input file.
    ///
    /// If the write fails the partial input is removed before returning.
    pub async fn write_input(&self, data: &[u8], format: OutputFormat) -> io::Result<ProcessingJob> {
        self.ensure_dir().await?;

        let job = ProcessingJob::new(&self.dir, format);
        if let Err(e) = tokio::fs::write(&job.input_path, data).await {
            self.cleanup(&[job.input_path.as_path()]).await;
            return Err(e);
        }

        tracing::debug!(
            job_id = %job.job_id,
            input = %job.input_path.display(),
            size = data.len(),
            "Wrote job input"
        );
        Ok(job)
    }

    pub async fn read_output(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    /// Remove artifacts. Missing files are ignored; other failures are logged
    /// and never returned, so they cannot mask the job's own result.
    pub async fn cleanup(&self, paths: &[&Path]) {
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        path = %path.display(),
                        "Failed to delete temporary file"
                    );
                }
            }
        }
    }

    /// Current entries of the scratch directory (empty if it was never created).
    pub async fn list_scratch(&self) -> io::Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }
}
