use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use print_agent::config::AgentConfig;
use print_agent::convert::{EnginePool, LibreOfficeEngine, PdfConverter};
use print_agent::logging::init_logging;
use print_agent::pipeline::{PipelineContext, PrintPipeline};
use print_agent::printing::{PrintDispatcher, SumatraBackend};
use print_agent::queue::FirestoreJobStore;
use print_agent::retriever::{DriveStore, FileRetriever};
use print_agent::staging::StagingDir;
use print_agent::utils::http_client::build_client;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AgentConfig::from_env()?;
    let (logging, _log_guard) = init_logging(config.log_dir.clone())?;
    config.validate()?;

    info!(version = env!("CARGO_PKG_VERSION"), "Print agent starting");

    let shutdown = CancellationToken::new();
    logging.start_retention_cleanup(shutdown.clone());

    let client = build_client(CONNECT_TIMEOUT)?;
    let store = Arc::new(
        FirestoreJobStore::new(client.clone(), config.firestore.clone())
            .context("configuring the job queue")?,
    );
    let drive = Arc::new(DriveStore::new(client, config.drive.clone()));

    let staging = StagingDir::open(&config.staging_dir).await?;
    staging.purge_leftovers().await?;

    let engine = Arc::new(LibreOfficeEngine::new(config.engine.soffice_path.clone()));
    let ctx = Arc::new(PipelineContext {
        store,
        retriever: FileRetriever::new(drive),
        engines: Arc::new(EnginePool::new(engine, config.engine.max_sessions)),
        converter: PdfConverter::new(config.render_dpi),
        printer: PrintDispatcher::new(Box::new(SumatraBackend::new(&config.printer))),
        staging,
        dpi: config.render_dpi,
    });

    let pipeline = PrintPipeline::new(ctx, config.workers.clone());
    let run = pipeline.run(shutdown.clone());
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => {
            if let Err(e) = &result {
                error!(error = %e, "Pipeline stopped unexpectedly");
            }
            shutdown.cancel();
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl+C")?;
            info!("Shutdown requested");
            shutdown.cancel();
            run.await?;
        }
    }

    info!("Print agent stopped");
    Ok(())
}
