//! Batch submission and result management
//!
//! [`BatchOrchestrator`] sends files to the API one at a time, tolerates
//! per-file failures, and keeps the successful results as
//! [`ClientImageRecord`]s whose object URLs it owns. Progress is published on
//! a `watch` channel; user-facing messages go to a [`Notifier`].

use chrono::Utc;
use cutout_core::{ClientImageRecord, DownloadHistoryEntry, OutputFormat};
use cutout_processing::codec;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::api::SubmitError;
use crate::download::{create_zip_archive, DownloadSink, ZIP_ARCHIVE_NAME};
use crate::object_urls::ObjectUrlRegistry;
use crate::ApiClient;

/// Server error details are cut to this many characters in notifications.
const MAX_ERROR_DETAIL_CHARS: usize = 100;

/// A file selected for processing.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
    /// Modification time in milliseconds since the Unix epoch.
    pub last_modified: i64,
}

impl SourceFile {
    /// Composite dedup key, see [`ClientImageRecord::composite_id`].
    pub fn id(&self) -> String {
        ClientImageRecord::composite_id(&self.name, self.bytes.len() as u64, self.last_modified)
    }

    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat file: {}", path.display()))?;
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse::<OutputFormat>().ok())
            .map(|f| f.mime_type().to_string());

        Ok(Self {
            name,
            bytes,
            mime_type,
            last_modified,
        })
    }
}

/// User-selected options for a batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSettings {
    pub default_format: OutputFormat,
    /// Batch downloads produce one archive instead of one file per record.
    pub batch_zip: bool,
}

/// One user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub is_error: bool,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: true,
        }
    }
}

/// Receives user-facing messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that writes to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        if notification.is_error {
            tracing::warn!("{}", notification.message);
        } else {
            tracing::info!("{}", notification.message);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    Failed(String),
    /// Already in flight or processed; not sent.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub id: String,
    pub name: String,
    pub status: OutcomeStatus,
    /// Network attempts made for this file (0 when skipped).
    pub attempts: u32,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Succeeded))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Skipped))
    }

    fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("A batch is already being processed")]
    Busy,

    #[error("No image with id {0}")]
    UnknownRecord(String),

    #[error("Failed to convert image: {0}")]
    Convert(String),

    #[error("Download failed: {0}")]
    Download(#[from] anyhow::Error),
}

#[derive(Default)]
struct OrchestratorState {
    /// Ids sent or kept as records; a file is skipped while its id is here.
    in_flight: HashSet<String>,
    records: Vec<ClientImageRecord>,
    history: Vec<DownloadHistoryEntry>,
}

/// Clears the busy flag when a batch ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Ids a batch has claimed in `in_flight` but not yet settled. Dropping the
/// claim releases them, so a cancelled batch leaves nothing marked as processed
/// that has no record behind it.
struct ClaimedIds<'a> {
    state: &'a Mutex<OrchestratorState>,
    ids: HashSet<String>,
}

impl ClaimedIds<'_> {
    /// The id is now owned by a record, or was released on failure.
    fn settle(&mut self, id: &str) {
        self.ids.remove(id);
    }
}

impl Drop for ClaimedIds<'_> {
    fn drop(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for id in self.ids.drain() {
            state.in_flight.remove(&id);
        }
        tracing::debug!("Released ids of an interrupted batch");
    }
}

pub struct BatchOrchestrator {
    client: ApiClient,
    notifier: Arc<dyn Notifier>,
    urls: ObjectUrlRegistry,
    state: Mutex<OrchestratorState>,
    busy: AtomicBool,
    progress: watch::Sender<f64>,
}

impl BatchOrchestrator {
    pub fn new(client: ApiClient, notifier: Arc<dyn Notifier>) -> Self {
        let (progress, _) = watch::channel(0.0);
        Self {
            client,
            notifier,
            urls: ObjectUrlRegistry::new(),
            state: Mutex::new(OrchestratorState::default()),
            busy: AtomicBool::new(false),
            progress,
        }
    }

    fn state(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    /// Percent complete of the running batch, 0 to 100.
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn object_urls(&self) -> &ObjectUrlRegistry {
        &self.urls
    }

    /// Process `files` sequentially with `settings.default_format`.
    ///
    /// Files whose id is already tracked are skipped. A failing file is
    /// reported and released so it can be submitted again; the batch goes on.
    /// Each result is recorded as soon as it arrives; if the returned future
    /// is dropped mid-batch, the files not yet finished are released.
    pub async fn submit_batch(
        &self,
        files: Vec<SourceFile>,
        settings: &BatchSettings,
    ) -> Result<BatchReport, BatchError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BatchError::Busy);
        }
        let _busy = BusyGuard(&self.busy);
        self.progress.send_replace(0.0);

        let mut report = BatchReport::default();
        let mut to_process = Vec::new();
        let mut claimed = ClaimedIds {
            state: &self.state,
            ids: HashSet::new(),
        };
        {
            let mut state = self.state();
            for file in files {
                let id = file.id();
                // A duplicate within the same batch is skipped as well.
                if state.in_flight.insert(id.clone()) {
                    claimed.ids.insert(id.clone());
                    to_process.push((id, file));
                } else {
                    report.outcomes.push(FileOutcome {
                        id,
                        name: file.name,
                        status: OutcomeStatus::Skipped,
                        attempts: 0,
                    });
                }
            }
        }

        if to_process.is_empty() {
            self.notify(Notification::info(
                "These files are already being processed or were already processed",
            ));
            return Ok(report);
        }

        let total = to_process.len();
        let mut succeeded = 0;

        for (index, (id, file)) in to_process.into_iter().enumerate() {
            self.notify(Notification::info(format!(
                "Processing {}... ({}/{})",
                file.name,
                index + 1,
                total
            )));

            let result = self
                .client
                .remove_background(
                    &file.name,
                    &file.bytes,
                    file.mime_type.as_deref(),
                    settings.default_format,
                    &id,
                )
                .await;

            match result {
                Ok(processed) => {
                    // URLs are created and handed to a record without an await
                    // in between, so every live URL has an owner.
                    let record = ClientImageRecord {
                        id: id.clone(),
                        name: file.name.clone(),
                        original_url: self.urls.create(file.bytes),
                        processed_url: self.urls.create(processed.bytes.clone()),
                        format: settings.default_format,
                        mime_type: processed.mime_type,
                        blob: processed.bytes,
                    };
                    self.state().records.push(record);
                    claimed.settle(&id);
                    succeeded += 1;
                    report.outcomes.push(FileOutcome {
                        id,
                        name: file.name,
                        status: OutcomeStatus::Succeeded,
                        attempts: processed.attempts,
                    });
                }
                Err(failure) => {
                    self.state().in_flight.remove(&id);
                    claimed.settle(&id);
                    tracing::error!(
                        file = %file.name,
                        attempts = failure.attempts,
                        error = %failure.error,
                        "File processing failed"
                    );
                    self.notify(Notification::error(failure_message(&file.name, &failure.error)));
                    report.outcomes.push(FileOutcome {
                        id,
                        name: file.name,
                        status: OutcomeStatus::Failed(failure.error.to_string()),
                        attempts: failure.attempts,
                    });
                }
            }

            self.progress
                .send_replace((index + 1) as f64 / total as f64 * 100.0);
        }

        if succeeded > 0 {
            self.notify(Notification::info(format!(
                "Finished processing {} image(s)!",
                succeeded
            )));
        } else {
            self.notify(Notification::error(
                "No images were processed. All images failed.",
            ));
        }

        Ok(report)
    }

    pub fn records(&self) -> Vec<ClientImageRecord> {
        self.state().records.clone()
    }

    pub fn history(&self) -> Vec<DownloadHistoryEntry> {
        self.state().history.clone()
    }

    fn revoke_record_urls(&self, record: &ClientImageRecord) {
        self.urls.revoke(&record.original_url);
        self.urls.revoke(&record.processed_url);
    }

    /// Remove one record, revoke its URLs and allow its file to be submitted again.
    pub fn delete(&self, id: &str) -> Result<(), BatchError> {
        let record = {
            let mut state = self.state();
            let index = state
                .records
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| BatchError::UnknownRecord(id.to_string()))?;
            state.in_flight.remove(id);
            state.records.remove(index)
        };
        self.revoke_record_urls(&record);
        Ok(())
    }

    /// Remove every record and forget every tracked id.
    pub fn clear_all(&self) {
        let records = {
            let mut state = self.state();
            state.in_flight.clear();
            std::mem::take(&mut state.records)
        };
        for record in &records {
            self.revoke_record_urls(record);
        }
    }

    /// Convert one record's processed image to `format`.
    pub async fn set_format(&self, id: &str, format: OutputFormat) -> Result<(), BatchError> {
        let blob = self
            .state()
            .records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.blob.clone())
            .ok_or_else(|| BatchError::UnknownRecord(id.to_string()))?;

        let converted = tokio::task::spawn_blocking(move || {
            codec::reencode(&blob, format, codec::DEFAULT_JPEG_QUALITY)
        })
        .await
        .map_err(|e| BatchError::Convert(e.to_string()))?
        .map_err(|e| BatchError::Convert(e.to_string()))?;

        let new_url = self.urls.create(converted.clone());
        let old_url = {
            let mut state = self.state();
            state.records.iter_mut().find(|r| r.id == id).map(|record| {
                record.format = format;
                record.mime_type = format.mime_type().to_string();
                record.blob = converted;
                std::mem::replace(&mut record.processed_url, new_url.clone())
            })
        };
        let Some(old_url) = old_url else {
            // Deleted while converting.
            self.urls.revoke(&new_url);
            return Err(BatchError::UnknownRecord(id.to_string()));
        };
        self.urls.revoke(&old_url);
        Ok(())
    }

    fn record_download(&self, name: &str) {
        self.state().history.push(DownloadHistoryEntry {
            name: name.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Save one record as `no_bg_<stem>.<format>`.
    pub async fn download(&self, id: &str, sink: &dyn DownloadSink) -> Result<String, BatchError> {
        let record = self
            .state()
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| BatchError::UnknownRecord(id.to_string()))?;

        let name = record.download_name();
        if let Err(e) = sink.save(&name, &record.blob).await {
            self.notify(Notification::error("Download failed. Please try again."));
            return Err(e.into());
        }
        self.record_download(&name);
        self.notify(Notification::info(format!("Downloaded {}", name)));
        Ok(name)
    }

    /// Save every record, as one archive when `batch_zip` is set or one file
    /// at a time otherwise. Returns the saved names.
    pub async fn download_all(
        &self,
        settings: &BatchSettings,
        sink: &dyn DownloadSink,
    ) -> Result<Vec<String>, BatchError> {
        let records = self.records();
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let saved = if settings.batch_zip {
            let names: Vec<String> = records.iter().map(|r| r.download_name()).collect();
            let archive = create_zip_archive(
                names
                    .iter()
                    .zip(&records)
                    .map(|(name, record)| (name.as_str(), record.blob.as_slice())),
            )?;
            if let Err(e) = sink.save(ZIP_ARCHIVE_NAME, &archive).await {
                self.notify(Notification::error("Download failed. Please try again."));
                return Err(e.into());
            }
            self.record_download(ZIP_ARCHIVE_NAME);
            vec![ZIP_ARCHIVE_NAME.to_string()]
        } else {
            let mut saved = Vec::with_capacity(records.len());
            for record in &records {
                saved.push(self.download(&record.id, sink).await?);
            }
            saved
        };

        self.notify(Notification::info("All images downloaded!"));
        Ok(saved)
    }
}

/// Human-readable message for a file that could not be processed.
fn failure_message(name: &str, error: &SubmitError) -> String {
    match error {
        SubmitError::Timeout => format!(
            "Timed out while processing {}. The file may be too large.",
            name
        ),
        SubmitError::Status { status: 429, .. } => format!(
            "{} is already being processed. Please wait a moment and try again.",
            name
        ),
        SubmitError::Status {
            status: 500,
            message,
        } => {
            let details: String = message.chars().take(MAX_ERROR_DETAIL_CHARS).collect();
            if details.is_empty() {
                format!("A server error occurred while processing {}.", name)
            } else {
                format!(
                    "A server error occurred while processing {}. Details: {}",
                    name, details
                )
            }
        }
        SubmitError::Status { message, .. } => {
            format!("An error occurred while processing {}: {}", name, message)
        }
        SubmitError::Transport(message) => {
            format!("An error occurred while processing {}: {}", name, message)
        }
    }
}
