//! Job documents as they appear in the remote queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::file_spec::FileSpec;
use crate::{Error, Result};

/// Kind of order carried by a job document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OrderType {
    Print,
    TestPage,
    PageCountRequest,
    Edit,
    Xerox,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Job status as stored in the queue.
///
/// Only a subset is driven by this agent; the rest are written by the
/// ordering front-end and are carried through untouched.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobStatus {
    PendingPayment,
    Pending,
    Uploading,
    Ready,
    Printing,
    Completed,
    Error,
    PageCountRequest,
    PageCountCompleted,
    Reprint,
    ReprintCompleted,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Whether a job in this status should be picked up by the agent.
    pub fn is_actionable(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::PageCountRequest)
    }

    /// Whether this status ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::ReprintCompleted
                | JobStatus::PageCountCompleted
                | JobStatus::Error
        )
    }

    /// Whether the agent may move a job from `self` to `next`.
    ///
    /// ```text
    /// ready -> printing -> completed | reprint-completed | error
    /// ready -> error
    /// page-count-request -> page-count-completed | error
    /// ```
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Ready, Printing)
                | (Ready, Error)
                | (Printing, Completed)
                | (Printing, ReprintCompleted)
                | (Printing, Error)
                | (PageCountRequest, PageCountCompleted)
                | (PageCountRequest, Error)
        )
    }

    /// Validate a transition, returning `InvalidStateTransition` when it would
    /// move the job backwards or sideways.
    pub fn transition_to(&self, next: JobStatus) -> Result<JobStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// Binding style requested for the whole order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Binding {
    Spiral,
    Soft,
    #[default]
    #[serde(other)]
    None,
}

impl Binding {
    /// Bound orders get a cover sheet ahead of their documents.
    pub fn needs_cover_page(&self) -> bool {
        matches!(self, Binding::Spiral | Binding::Soft)
    }

    /// Capitalized label used on cover pages.
    pub fn label(&self) -> &'static str {
        match self {
            Binding::None => "None",
            Binding::Spiral => "Spiral",
            Binding::Soft => "Soft",
        }
    }
}

/// A print, test-page or page-count job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Document id in the queue; not part of the document body.
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub order_type: OrderType,
    pub status: JobStatus,
    #[serde(default)]
    pub files: Vec<FileSpec>,
    /// Target printer name.
    #[serde(default, rename = "name")]
    pub printer_name: String,
    #[serde(default)]
    pub binding: Binding,
    #[serde(default)]
    pub is_reprint: bool,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Legacy single-file reference used by page-count requests.
    #[serde(default)]
    pub google_drive_file_id: Option<String>,
    /// Legacy single-file name used by page-count requests.
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: impl Into<String>, order_type: OrderType, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            order_type,
            status,
            files: Vec::new(),
            printer_name: String::new(),
            binding: Binding::None,
            is_reprint: false,
            order_id: None,
            username: None,
            google_drive_file_id: None,
            file_name: None,
            created_at: None,
        }
    }

    pub fn with_printer(mut self, printer: impl Into<String>) -> Self {
        self.printer_name = printer.into();
        self
    }

    pub fn with_files(mut self, files: Vec<FileSpec>) -> Self {
        self.files = files;
        self
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_reprint(mut self, is_reprint: bool) -> Self {
        self.is_reprint = is_reprint;
        self
    }

    pub fn with_customer(mut self, order_id: impl Into<String>, username: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self.username = Some(username.into());
        self
    }

    /// Whether any file in the order is a document rather than a photo.
    pub fn has_documents(&self) -> bool {
        self.files.iter().any(|f| !f.is_image_file)
    }

    /// Terminal status written after every file printed successfully.
    pub fn success_status(&self) -> JobStatus {
        if self.is_reprint {
            JobStatus::ReprintCompleted
        } else {
            JobStatus::Completed
        }
    }

    /// The single file a page-count request refers to.
    ///
    /// Accepts either `files[0]` or the legacy top-level
    /// `googleDriveFileId` / `fileName` pair.
    pub fn page_count_file(&self) -> Result<FileSpec> {
        if let Some(file) = self.files.first() {
            return Ok(file.clone());
        }

        match self.google_drive_file_id.as_deref() {
            Some(asset_id) if !asset_id.trim().is_empty() => {
                let mut file = FileSpec::new(asset_id);
                file.file_name = self.file_name.clone();
                Ok(file)
            }
            _ => Err(Error::validation(
                "Missing Google Drive File ID in page count request.",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_kebab_case() {
        let status: JobStatus = serde_json::from_str(r#""page-count-request""#).unwrap();
        assert_eq!(status, JobStatus::PageCountRequest);
        assert_eq!(JobStatus::ReprintCompleted.to_string(), "reprint-completed");

        let unknown: JobStatus = serde_json::from_str(r#""archived""#).unwrap();
        assert_eq!(unknown, JobStatus::Unknown);
    }

    #[test]
    fn test_transitions_never_move_backwards() {
        use JobStatus::*;
        assert!(Ready.can_transition_to(Printing));
        assert!(Printing.can_transition_to(Completed));
        assert!(Printing.can_transition_to(ReprintCompleted));
        assert!(PageCountRequest.can_transition_to(PageCountCompleted));

        assert!(!Printing.can_transition_to(Ready));
        assert!(!Completed.can_transition_to(Printing));
        assert!(!Error.can_transition_to(Printing));
        assert!(!Ready.can_transition_to(Completed));
        assert!(!PageCountRequest.can_transition_to(Printing));
    }

    #[test]
    fn test_transition_error_names_both_states() {
        let err = JobStatus::Completed
            .transition_to(JobStatus::Printing)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid state transition: cannot transition from completed to printing"
        );
    }

    #[test]
    fn test_job_document_deserializes() {
        let json = r#"{
            "orderType": "print",
            "status": "ready",
            "name": "HP LaserJet",
            "binding": "spiral",
            "isReprint": true,
            "orderId": "ORD-1",
            "username": "asha",
            "files": [
                {"originalFileName": "notes.docx", "googleDriveFileId": "d1", "copies": 2}
            ],
            "cost": 40
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();

        assert_eq!(job.order_type, OrderType::Print);
        assert_eq!(job.printer_name, "HP LaserJet");
        assert_eq!(job.binding, Binding::Spiral);
        assert!(job.has_documents());
        assert_eq!(job.success_status(), JobStatus::ReprintCompleted);
        assert_eq!(job.files[0].copies, 2);
    }

    #[test]
    fn test_page_count_file_accepts_legacy_fields() {
        let mut job = Job::new("j1", OrderType::PageCountRequest, JobStatus::PageCountRequest);
        assert!(matches!(job.page_count_file(), Err(Error::Validation(_))));

        job.google_drive_file_id = Some("drive-1".to_string());
        job.file_name = Some("essay.docx".to_string());
        let file = job.page_count_file().unwrap();
        assert_eq!(file.asset_id.as_deref(), Some("drive-1"));
        assert_eq!(file.display_name(0), "essay.docx");
    }

    #[test]
    fn test_unknown_binding_is_none() {
        let binding: Binding = serde_json::from_str(r#""hardcover""#).unwrap();
        assert_eq!(binding, Binding::None);
        assert!(!binding.needs_cover_page());
        assert!(Binding::Soft.needs_cover_page());
    }
}
