use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Percentage step between progress log lines.
const LOG_STEP_PERCENT: u8 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadProgressSnapshot {
    pub updated_at: DateTime<Utc>,
    pub bytes_done: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct DownloadProgressUpdate {
    pub job_id: String,
    pub file_name: String,
    pub snapshot: DownloadProgressSnapshot,
}

/// Per-file download progress. Percentages only ever increase.
pub struct ProgressReporter {
    job_id: String,
    file_name: String,
    tx: Option<mpsc::Sender<DownloadProgressUpdate>>,
    last_percent: Option<u8>,
    last_logged: Option<u8>,
}

impl ProgressReporter {
    pub fn new(
        job_id: impl Into<String>,
        file_name: impl Into<String>,
        tx: mpsc::Sender<DownloadProgressUpdate>,
    ) -> Self {
        Self {
            tx: Some(tx),
            ..Self::logging(job_id, file_name)
        }
    }

    /// A reporter that only logs.
    pub fn logging(job_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            file_name: file_name.into(),
            tx: None,
            last_percent: None,
            last_logged: None,
        }
    }

    pub fn report(&mut self, bytes_done: u64, bytes_total: Option<u64>) {
        let percent = bytes_total
            .filter(|&total| total > 0)
            .map(|total| ((bytes_done.min(total) * 100) / total) as u8);

        if let (Some(p), Some(last)) = (percent, self.last_percent)
            && p <= last
        {
            return;
        }
        if percent.is_some() {
            self.last_percent = percent;
        }

        if let Some(p) = percent {
            let step = p - p % LOG_STEP_PERCENT;
            if self.last_logged.is_none_or(|logged| step > logged) {
                self.last_logged = Some(step);
                debug!(
                    job_id = %self.job_id,
                    file = %self.file_name,
                    percent = p,
                    bytes_done,
                    "Download progress"
                );
            }
        }

        if let Some(tx) = &self.tx {
            let _ = tx.try_send(DownloadProgressUpdate {
                job_id: self.job_id.clone(),
                file_name: self.file_name.clone(),
                snapshot: DownloadProgressSnapshot {
                    updated_at: Utc::now(),
                    bytes_done,
                    bytes_total,
                    percent,
                },
            });
        }
    }
}
