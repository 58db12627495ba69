//! Download targets and archive packing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the archive produced by a zipped batch download.
pub const ZIP_ARCHIVE_NAME: &str = "no_bg_images.zip";

/// Where downloaded files end up.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Writes downloads into a local directory, creating it on first use.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.dir.join(sanitize_filename(name, "download"));
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), size = bytes.len(), "Saved download");
        Ok(())
    }
}

/// Strip any directory components so a name cannot escape its target.
pub fn sanitize_filename(filename: &str, fallback: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(fallback)
        .to_string()
}

/// Make `name` unique within `used` by suffixing the stem (`a.png`, `a_2.png`, ...).
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}{}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Pack `(name, bytes)` entries into an in-memory ZIP archive.
pub fn create_zip_archive<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Result<Vec<u8>> {
    use zip::write::{FileOptions, ZipWriter};
    use zip::CompressionMethod;

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(std::io::Cursor::new(&mut buffer));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let mut used = HashSet::new();
        for (name, data) in entries {
            let safe_name = unique_name(&sanitize_filename(name, "image"), &mut used);
            zip.start_file(&safe_name, options)
                .with_context(|| format!("Failed to add file to ZIP: {}", safe_name))?;
            zip.write_all(data)
                .with_context(|| format!("Failed to write file data to ZIP: {}", safe_name))?;
        }

        zip.finish().context("Failed to finalize ZIP archive")?;
    }

    Ok(buffer)
}
