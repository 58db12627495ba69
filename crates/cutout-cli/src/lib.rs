use cutout_api_client::{BatchReport, OutcomeStatus};
use serde::Serialize;

/// Per-file line of the summary printed after a batch.
#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub file: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub files: Vec<FileSummary>,
    pub saved: Vec<String>,
}

impl BatchSummary {
    pub fn new(report: &BatchReport, saved: Vec<String>) -> Self {
        let files = report
            .outcomes
            .iter()
            .map(|outcome| {
                let (status, error) = match &outcome.status {
                    OutcomeStatus::Succeeded => ("succeeded", None),
                    OutcomeStatus::Failed(e) => ("failed", Some(truncate_string(e, 120))),
                    OutcomeStatus::Skipped => ("skipped", None),
                };
                FileSummary {
                    file: outcome.name.clone(),
                    status,
                    error,
                    attempts: outcome.attempts,
                }
            })
            .collect();

        Self {
            succeeded: report.succeeded(),
            failed: report.failed(),
            skipped: report.skipped(),
            files,
            saved,
        }
    }
}

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Initialize tracing for the CLI.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutout_api_client::FileOutcome;

    #[test]
    fn truncate_string_short() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("", 5), "");
    }

    #[test]
    fn truncate_string_long() {
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn summary_counts_and_statuses() {
        let outcome = |name: &str, status| FileOutcome {
            id: name.to_string(),
            name: name.to_string(),
            status,
            attempts: 1,
        };
        let report = BatchReport {
            outcomes: vec![
                outcome("a.png", OutcomeStatus::Succeeded),
                outcome("b.png", OutcomeStatus::Failed("Request timed out".to_string())),
            ],
        };

        let summary = BatchSummary::new(&report, vec!["no_bg_a.png".to_string()]);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["files"][1]["status"], "failed");
        assert_eq!(json["files"][1]["error"], "Request timed out");
        assert!(json["files"][0].get("error").is_none());
    }
}
