//! Plain-text cover and test pages.

use std::fmt::Write;

use chrono::{DateTime, Local};
use tracing::info;

use crate::convert::SessionScope;
use crate::domain::Job;
use crate::pipeline::context::PipelineContext;
use crate::printing::PrintSettings;
use crate::staging::StagedFiles;
use crate::utils::fs::io_error;
use crate::Result;

const COVER_BANNER: &str = "========= PrintEase Order Summary =========";
const RULE: &str = "-------------------------------------------";

/// Summary sheet printed ahead of a bound order.
pub fn cover_page_text(job: &Job, now: DateTime<Local>) -> String {
    let mut text = String::new();
    let or_na = |value: &Option<String>| value.clone().unwrap_or_else(|| "N/A".to_string());

    let _ = writeln!(text, "{}\n", COVER_BANNER);
    let _ = writeln!(text, "Order ID: {}", or_na(&job.order_id));
    let _ = writeln!(text, "Customer Name: {}", or_na(&job.username));
    let _ = writeln!(text, "Date: {}\n", now.format("%Y-%m-%d %H:%M"));
    let _ = writeln!(text, "{}", RULE);
    let _ = writeln!(text, "Binding: {}", job.binding.label());
    let _ = writeln!(text, "Total Files: {}\n", job.files.len());
    let _ = writeln!(text, "{}\n", RULE);
    for (i, file) in job.files.iter().enumerate() {
        let _ = writeln!(text, "{}. {}", i + 1, file.display_name(i));
        let _ = writeln!(text, "   - Copies: {}\n", file.copies);
    }
    text
}

/// Fixed page used to check a printer end to end.
pub fn test_page_text(job_id: &str, printer: &str, now: DateTime<Local>) -> String {
    format!(
        "--- PrintEase Test Page ---\n\n\
         Job ID: {}\n\
         Printer: {}\n\
         Timestamp: {}\n\n\
         This is a test print from the PrintEase print agent.\n",
        job_id,
        printer,
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Stage `text` as `{job}_{name}`, convert it and print a single sheet.
pub(super) async fn print_text_sheet(
    ctx: &PipelineContext,
    engine: &mut SessionScope,
    staged: &mut StagedFiles,
    job: &Job,
    name: &str,
    text: String,
    label: &str,
) -> Result<()> {
    let path = staged.track(ctx.staging.artifact(&job.id, name));
    tokio::fs::write(&path, text)
        .await
        .map_err(|e| io_error("writing text page", &path, e))?;

    let pdf = ctx.converter.to_pdf(&path, engine, staged).await?;
    ctx.printer
        .dispatch(&job.printer_name, &pdf, label, PrintSettings::single_sheet())
        .await?;
    info!(job_id = %job.id, label, "Text page sent to printer");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Binding, FileSpec, JobStatus, OrderType};
    use chrono::TimeZone;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_cover_page_lists_files_in_order() {
        let job = Job::new("j1", OrderType::Print, JobStatus::Ready)
            .with_binding(Binding::Spiral)
            .with_customer("ORD-7", "asha")
            .with_files(vec![
                FileSpec::new("a").named("thesis.docx").with_copies(2),
                FileSpec::new("b"),
            ]);

        let text = cover_page_text(&job, noon());

        assert!(text.starts_with(COVER_BANNER));
        assert!(text.contains("Order ID: ORD-7\n"));
        assert!(text.contains("Customer Name: asha\n"));
        assert!(text.contains("Date: 2024-05-01 12:30\n"));
        assert!(text.contains("Binding: Spiral\n"));
        assert!(text.contains("Total Files: 2\n"));
        let first = text.find("1. thesis.docx\n   - Copies: 2").unwrap();
        let second = text.find("2. file_2\n   - Copies: 1").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_cover_page_without_customer() {
        let job = Job::new("j1", OrderType::Print, JobStatus::Ready);
        let text = cover_page_text(&job, noon());
        assert!(text.contains("Order ID: N/A"));
        assert!(text.contains("Binding: None"));
    }

    #[test]
    fn test_test_page_names_job_and_printer() {
        let text = test_page_text("t-1", "Office Laser", noon());
        assert!(text.contains("Job ID: t-1\n"));
        assert!(text.contains("Printer: Office Laser\n"));
        assert!(text.contains("Timestamp: 2024-05-01 12:30:00"));
    }
}
