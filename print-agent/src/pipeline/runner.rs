//! Runs a claimed job under its deadline and records the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::context::PipelineContext;
use super::dispatcher::{ClaimedJob, WorkerKind};
use super::status::StatusReporter;
use super::workers::{JobWorker, PageCountWorker, PrintWorker, TestPageWorker};
use crate::{Error, Result};

/// Executes jobs with the worker matching their kind.
pub struct JobRunner {
    ctx: Arc<PipelineContext>,
    print: Box<dyn JobWorker>,
    test_page: Box<dyn JobWorker>,
    page_count: Box<dyn JobWorker>,
    job_timeout: Duration,
}

impl JobRunner {
    pub fn new(ctx: Arc<PipelineContext>, job_timeout: Duration) -> Self {
        Self {
            ctx,
            print: Box::new(PrintWorker),
            test_page: Box::new(TestPageWorker),
            page_count: Box::new(PageCountWorker),
            job_timeout,
        }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    fn worker(&self, kind: WorkerKind) -> &dyn JobWorker {
        match kind {
            WorkerKind::Print => self.print.as_ref(),
            WorkerKind::TestPage => self.test_page.as_ref(),
            WorkerKind::PageCount => self.page_count.as_ref(),
        }
    }

    /// Run one job to a terminal status.
    ///
    /// Any error, timeout or shutdown is written back as `error` with a
    /// message. The job's claim is released only after that write. Returns
    /// the job's own result.
    pub async fn run(&self, claimed: ClaimedJob, cancel: &CancellationToken) -> Result<()> {
        let ClaimedJob { job, kind, claim } = claimed;
        let worker = self.worker(kind);
        let mut status = StatusReporter::new(self.ctx.store.clone(), &job);
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(Error::Other("Print agent shut down before the job finished".to_string()))
            }
            outcome = tokio::time::timeout(
                self.job_timeout,
                worker.run(&self.ctx, &job, &mut status),
            ) => outcome.unwrap_or_else(|_| Err(Error::Timeout(self.job_timeout))),
        };

        match &result {
            Ok(()) => info!(
                job_id = %job.id,
                kind = %worker.kind(),
                status = %status.current(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job finished"
            ),
            Err(e) => {
                error!(job_id = %job.id, kind = %kind, error = %e, "Job failed");
                if let Err(write) = status.fail(e.to_string()).await {
                    warn!(job_id = %job.id, error = %write, "Could not record job failure");
                }
            }
        }

        drop(claim);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::testing::CopyEngine;
    use crate::convert::{EnginePool, PdfConverter};
    use crate::domain::{
        Binding, FileSpec, FitMode, ImageLayout, Job, JobStatus, LayoutType, OrderType,
        Orientation,
    };
    use crate::pipeline::claims::ProcessedJobs;
    use crate::printing::PrintDispatcher;
    use crate::printing::testing::RecordingBackend;
    use crate::queue::{JobUpdate, MemoryJobStore};
    use crate::retriever::{AssetInfo, AssetStream, FileRetriever, MemoryRemoteStore, RemoteStore};
    use crate::staging::StagingDir;
    use crate::transform::testing::write_pdf;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::Ordering;

    struct Fixture {
        _dir: tempfile::TempDir,
        runner: JobRunner,
        jobs: Arc<MemoryJobStore>,
        assets: Arc<MemoryRemoteStore>,
        backend: RecordingBackend,
        engine: Arc<CopyEngine>,
        processed: Arc<ProcessedJobs>,
    }

    impl Fixture {
        async fn new(backend: RecordingBackend) -> Self {
            Self::with_store(backend, None, Duration::from_secs(30)).await
        }

        async fn with_engine(engine: CopyEngine) -> Self {
            Self::build(
                RecordingBackend::default(),
                None,
                engine,
                Duration::from_secs(30),
            )
            .await
        }

        async fn with_store(
            backend: RecordingBackend,
            remote: Option<Arc<dyn RemoteStore>>,
            job_timeout: Duration,
        ) -> Self {
            Self::build(backend, remote, CopyEngine::default(), job_timeout).await
        }

        async fn build(
            backend: RecordingBackend,
            remote: Option<Arc<dyn RemoteStore>>,
            engine: CopyEngine,
            job_timeout: Duration,
        ) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let staging = StagingDir::open(dir.path().join("staging")).await.unwrap();
            let jobs = Arc::new(MemoryJobStore::new());
            let assets = Arc::new(MemoryRemoteStore::new());
            let engine = Arc::new(engine);
            let remote = remote.unwrap_or_else(|| assets.clone() as Arc<dyn RemoteStore>);

            let ctx = Arc::new(PipelineContext {
                store: jobs.clone(),
                retriever: FileRetriever::new(remote),
                engines: Arc::new(EnginePool::new(engine.clone(), 2)),
                converter: PdfConverter::new(30),
                printer: PrintDispatcher::new(Box::new(backend.clone())),
                staging,
                dpi: 30,
            });

            Self {
                _dir: dir,
                runner: JobRunner::new(ctx, job_timeout),
                jobs,
                assets,
                backend,
                engine,
                processed: ProcessedJobs::new(),
            }
        }

        fn add_pdf(&self, id: &str, name: &str, pages: usize, width: i64, height: i64) {
            let scratch = tempfile::tempdir().unwrap();
            let path = scratch.path().join("src.pdf");
            write_pdf(&path, pages, width, height);
            self.assets.insert(id, name, std::fs::read(&path).unwrap());
        }

        fn add_png(&self, id: &str, name: &str) {
            self.add_photo(id, name, 40, 30);
        }

        fn add_photo(&self, id: &str, name: &str, width: u32, height: u32) {
            let scratch = tempfile::tempdir().unwrap();
            let path = scratch.path().join("src.png");
            RgbImage::from_pixel(width, height, Rgb([200, 20, 20]))
                .save(&path)
                .unwrap();
            self.assets.insert(id, name, std::fs::read(&path).unwrap());
        }

        async fn run(&self, job: Job, kind: WorkerKind) -> Result<()> {
            self.jobs.insert(job.clone());
            let claim = self.processed.try_claim(&job.id).unwrap();
            self.runner
                .run(ClaimedJob { job, kind, claim }, &CancellationToken::new())
                .await
        }

        fn labels(&self) -> Vec<String> {
            self.backend
                .requests
                .lock()
                .iter()
                .map(|r| r.label.clone())
                .collect()
        }

        fn leftovers(&self, job_id: &str) -> usize {
            self.runner
                .context()
                .staging
                .files_for_job(job_id)
                .unwrap()
                .len()
        }
    }

    fn print_job(id: &str, files: Vec<FileSpec>) -> Job {
        Job::new(id, OrderType::Print, JobStatus::Ready)
            .with_printer("Office Laser")
            .with_files(files)
    }

    #[tokio::test]
    async fn test_print_job_end_to_end() {
        let fx = Fixture::new(RecordingBackend::default()).await;
        fx.add_pdf("doc", "report.pdf", 3, 842, 595);
        fx.add_png("img", "photo.png");

        let job = print_job(
            "p1",
            vec![
                FileSpec::new("doc")
                    .named("report.pdf")
                    .with_page_range("1-2")
                    .with_copies(2),
                FileSpec::new("img")
                    .named("photo.png")
                    .image(ImageLayout::new(LayoutType::FourUp, FitMode::Cover))
                    .with_copies(5),
            ],
        )
        .with_binding(Binding::Soft)
        .with_customer("ORD-1", "asha");

        fx.run(job, WorkerKind::Print).await.unwrap();

        assert_eq!(fx.labels(), vec!["p1-cover", "p1-1", "p1-2"]);
        let requests = fx.backend.requests.lock().clone();
        assert_eq!(requests[1].settings.copies, 2);
        assert_eq!(requests[1].settings.orientation, Orientation::Portrait);
        assert_eq!(requests[2].settings.copies, 1, "collage carries its own copies");
        assert_eq!(
            fx.jobs.status_history("p1"),
            vec![JobStatus::Printing, JobStatus::Completed]
        );
        assert_eq!(fx.leftovers("p1"), 0);
        assert_eq!(fx.engine.open.load(Ordering::SeqCst), 0);
        assert!(fx.processed.is_empty());
    }

    #[tokio::test]
    async fn test_image_only_job_skips_cover_and_engine() {
        let fx = Fixture::new(RecordingBackend::default()).await;
        fx.add_png("img", "photo.png");

        let photo = FileSpec::new("img")
            .named("photo.png")
            .image(ImageLayout::default());
        let job = print_job("p2", vec![photo])
            .with_binding(Binding::Spiral)
            .with_reprint(true);
        fx.run(job, WorkerKind::Print).await.unwrap();

        assert_eq!(fx.labels(), vec!["p2-1"]);
        assert_eq!(fx.runner.context().engines.sessions_opened(), 0);
        assert_eq!(fx.jobs.status("p2"), Some(JobStatus::ReprintCompleted));
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_bad_file() {
        let fx = Fixture::new(RecordingBackend::default()).await;
        fx.add_pdf("one", "one.pdf", 1, 595, 842);
        fx.add_pdf("three", "three.pdf", 1, 595, 842);

        let job = print_job(
            "p3",
            vec![
                FileSpec::new("one").named("one.pdf"),
                FileSpec::new("missing").named("two.pdf"),
                FileSpec::new("three").named("three.pdf"),
            ],
        );
        let err = fx.run(job, WorkerKind::Print).await.unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(fx.labels(), vec!["p3-1"]);
        assert_eq!(
            fx.jobs.status_history("p3"),
            vec![JobStatus::Printing, JobStatus::Error]
        );
        assert_eq!(fx.leftovers("p3"), 0);
    }

    #[tokio::test]
    async fn test_print_failure_is_recorded_and_cleaned_up() {
        let backend = RecordingBackend {
            fail_on: Some(0),
            ..Default::default()
        };
        let fx = Fixture::new(backend).await;
        fx.add_pdf("doc", "doc.pdf", 2, 842, 595);

        let job = print_job("p4", vec![FileSpec::new("doc").named("doc.pdf").with_page_range("2")]);
        fx.run(job, WorkerKind::Print).await.unwrap_err();

        match fx.jobs.updates("p4").last() {
            Some(JobUpdate::Failed { message }) => assert!(message.contains("paper jam")),
            other => panic!("unexpected last update: {:?}", other),
        }
        assert_eq!(fx.leftovers("p4"), 0);
    }

    #[tokio::test]
    async fn test_empty_job_and_missing_asset_id_fail_validation() {
        let fx = Fixture::new(RecordingBackend::default()).await;

        let err = fx.run(print_job("p5", vec![]), WorkerKind::Print).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut file = FileSpec::new("x").named("a.pdf");
        file.asset_id = None;
        let err = fx.run(print_job("p6", vec![file]), WorkerKind::Print).await.unwrap_err();
        assert!(err.to_string().contains("a.pdf"));
        assert_eq!(fx.jobs.status("p6"), Some(JobStatus::Error));
    }

    #[tokio::test]
    async fn test_page_count_job() {
        let fx = Fixture::new(RecordingBackend::default()).await;
        // The copy engine passes the bytes through, so a PDF body works as a .docx.
        fx.add_pdf("essay", "essay.docx", 7, 595, 842);

        let mut job = Job::new("c1", OrderType::PageCountRequest, JobStatus::PageCountRequest);
        job.google_drive_file_id = Some("essay".to_string());
        job.file_name = Some("essay.docx".to_string());
        fx.run(job, WorkerKind::PageCount).await.unwrap();

        assert_eq!(
            fx.jobs.updates("c1"),
            vec![JobUpdate::PageCountCompleted { page_count: 7 }]
        );
        assert!(fx.labels().is_empty());
        assert_eq!(fx.leftovers("c1"), 0);
        assert_eq!(fx.engine.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_test_page_job() {
        let fx = Fixture::new(RecordingBackend::default()).await;
        let job = Job::new("t1", OrderType::TestPage, JobStatus::Ready).with_printer("Front Desk");

        fx.run(job, WorkerKind::TestPage).await.unwrap();

        let requests = fx.backend.requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].label, "t1");
        assert_eq!(requests[0].printer, "Front Desk");
        assert_eq!(requests[0].settings.to_settings_string(), "1x,simplex,portrait,papersize=A4");
        assert_eq!(
            fx.jobs.status_history("t1"),
            vec![JobStatus::Printing, JobStatus::Completed]
        );
        assert_eq!(fx.leftovers("t1"), 0);
    }

    #[tokio::test]
    async fn test_engine_start_failure_is_recorded_and_cleaned_up() {
        let fx = Fixture::with_engine(CopyEngine {
            fail_open: true,
            ..Default::default()
        })
        .await;
        fx.add_pdf("doc", "essay.docx", 2, 595, 842);

        let job = print_job("e1", vec![FileSpec::new("doc").named("essay.docx")]);
        let err = fx.run(job, WorkerKind::Print).await.unwrap_err();

        assert!(matches!(err, Error::Conversion(_)));
        assert!(err.to_string().contains("office suite is not installed"));
        assert_eq!(
            fx.jobs.status_history("e1"),
            vec![JobStatus::Printing, JobStatus::Error]
        );
        assert!(fx.labels().is_empty());
        assert_eq!(fx.leftovers("e1"), 0);
        assert_eq!(fx.runner.context().engines.available(), 2);
        assert!(fx.processed.is_empty());
    }

    #[tokio::test]
    async fn test_conversion_failure_closes_session_and_cleans_up() {
        let fx = Fixture::with_engine(CopyEngine {
            fail_convert: true,
            ..Default::default()
        })
        .await;
        fx.add_pdf("ok", "ok.pdf", 1, 595, 842);
        fx.add_pdf("doc", "locked.docx", 2, 595, 842);

        let job = print_job(
            "e2",
            vec![
                FileSpec::new("ok").named("ok.pdf"),
                FileSpec::new("doc").named("locked.docx"),
            ],
        );
        let err = fx.run(job, WorkerKind::Print).await.unwrap_err();

        assert!(err.to_string().contains("locked.docx"));
        assert!(err.to_string().contains("password protected"));
        assert_eq!(fx.labels(), vec!["e2-1"]);
        assert_eq!(
            fx.jobs.status_history("e2"),
            vec![JobStatus::Printing, JobStatus::Error]
        );
        assert_eq!(fx.leftovers("e2"), 0, "partial conversion output removed");
        assert_eq!(fx.engine.open.load(Ordering::SeqCst), 0);
        assert_eq!(fx.engine.closed.load(Ordering::SeqCst), 1);
        assert_eq!(fx.runner.context().engines.available(), 2);
    }

    #[tokio::test]
    async fn test_collage_failure_closes_session_and_cleans_up() {
        let fx = Fixture::new(RecordingBackend::default()).await;
        fx.add_pdf("doc", "notes.docx", 1, 595, 842);
        fx.assets.insert("img", "photo.png", b"not a png".to_vec());

        let job = print_job(
            "e3",
            vec![
                FileSpec::new("doc").named("notes.docx"),
                FileSpec::new("img")
                    .named("photo.png")
                    .image(ImageLayout::new(LayoutType::NineUp, FitMode::Contain))
                    .with_copies(12),
            ],
        )
        .with_binding(Binding::Spiral);
        let err = fx.run(job, WorkerKind::Print).await.unwrap_err();

        assert!(matches!(err, Error::Layout(_)));
        assert_eq!(fx.labels(), vec!["e3-cover", "e3-1"]);
        match fx.jobs.updates("e3").last() {
            Some(JobUpdate::Failed { message }) => assert_eq!(message, &err.to_string()),
            other => panic!("unexpected last update: {:?}", other),
        }
        assert_eq!(fx.leftovers("e3"), 0);
        assert_eq!(fx.engine.open.load(Ordering::SeqCst), 0);
        assert_eq!(fx.engine.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deadline_during_collage_render_leaves_nothing_behind() {
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let fx = runtime.block_on(async {
            let fx = Fixture::with_store(
                RecordingBackend::default(),
                None,
                Duration::from_millis(5),
            )
            .await;
            fx.add_photo("big", "poster.png", 3000, 3000);

            let sheet = FileSpec::new("big")
                .named("poster.png")
                .image(ImageLayout::new(LayoutType::ContactSheet, FitMode::Cover))
                .with_copies(70);
            let err = fx
                .run(print_job("slowc", vec![sheet]), WorkerKind::Print)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Timeout(_)));
            fx
        });

        // Shutting the runtime down waits for the render still running on
        // the blocking pool.
        runtime.shutdown_timeout(Duration::from_secs(120));

        assert!(fx.labels().is_empty());
        assert_eq!(
            fx.jobs.status_history("slowc"),
            vec![JobStatus::Printing, JobStatus::Error]
        );
        assert_eq!(fx.leftovers("slowc"), 0);
    }

    struct StalledStore;

    #[async_trait]
    impl RemoteStore for StalledStore {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn probe(&self, _asset_id: &str) -> Result<AssetInfo> {
            futures::future::pending().await
        }

        async fn open(&self, _asset_id: &str) -> Result<AssetStream> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_timeout_is_recorded_as_error() {
        let fx = Fixture::with_store(
            RecordingBackend::default(),
            Some(Arc::new(StalledStore)),
            Duration::from_millis(50),
        )
        .await;

        let job = print_job("slow", vec![FileSpec::new("a").named("a.pdf")]);
        let err = fx.run(job, WorkerKind::Print).await.unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(err.to_string(), "Job timed out after 50ms");
        assert_eq!(
            fx.jobs.updates("slow").last(),
            Some(&JobUpdate::Failed {
                message: "Job timed out after 50ms".to_string()
            })
        );
        assert_eq!(
            fx.jobs.status_history("slow"),
            vec![JobStatus::Printing, JobStatus::Error]
        );
        assert_eq!(fx.leftovers("slow"), 0);
        assert!(fx.processed.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_job() {
        let fx = Fixture::new(RecordingBackend::default()).await;
        let job = print_job("late", vec![FileSpec::new("a").named("a.pdf")]);
        fx.jobs.insert(job.clone());
        let claim = fx.processed.try_claim("late").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = fx
            .runner
            .run(
                ClaimedJob {
                    job,
                    kind: WorkerKind::Print,
                    claim,
                },
                &cancel,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(fx.jobs.status_history("late"), vec![JobStatus::Error]);
        assert!(fx.backend.requests.lock().is_empty());
    }
}
