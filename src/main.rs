use anyhow::{Context, Result};
use capture_relay::{
    create_router, AppState, Config, DeliveryUploader, FileReplayCapture, HttpTransport,
    LifecycleCoordinator, PageSignal, PendingStore, ScreenRecorder, SqlitePendingStore,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capture-relay", version, about = "Screen capture with guaranteed delivery")]
struct Cli {
    /// Config file (without extension)
    #[arg(long, default_value = "config/capture-relay")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the control API, replaying a media file as the captured display
    Serve {
        /// Media file to replay
        #[arg(long)]
        source: PathBuf,

        /// Content type of the media file
        #[arg(long, default_value = "video/webm")]
        mime_type: String,
    },
    /// Retry every pending delivery once and exit
    Drain,
    /// List recordings that have not been delivered yet
    Pending,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Capture Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Upload endpoint: {}", cfg.endpoint.url);

    let store: Arc<dyn PendingStore> = Arc::new(
        SqlitePendingStore::open(&cfg.store.path)
            .await
            .with_context(|| format!("Failed to open pending store at {:?}", cfg.store.path))?,
    );

    match cli.command {
        Command::Pending => {
            for record in store.list_all().await? {
                println!(
                    "{}\t{}\t{} bytes\t{}\t{}",
                    record.id,
                    record.metadata.created_at.to_rfc3339(),
                    record.payload.len(),
                    record.metadata.participant_id,
                    record.metadata.filename
                );
            }
            Ok(())
        }
        Command::Drain => {
            let uploader = build_uploader(&cfg, store)?;
            let report = uploader.drain_pending().await;
            info!(
                "Drained {} recording(s): {} delivered, {} still pending",
                report.attempted,
                report.delivered,
                report.failed.len()
            );
            Ok(())
        }
        Command::Serve { source, mime_type } => {
            let uploader = Arc::new(build_uploader(&cfg, store)?);
            let capture = Arc::new(FileReplayCapture::new(source, mime_type));
            let recorder = ScreenRecorder::new(capture, uploader, cfg.capture.clone(), &cfg.delivery);
            let coordinator = Arc::new(LifecycleCoordinator::new(
                recorder,
                cfg.lifecycle.visibility_policy,
            ));

            let sweep = Arc::clone(&coordinator);
            tokio::spawn(async move {
                sweep.on_load().await;
            });

            let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("Control API listening on {}", addr);

            let app = create_router(AppState::new(Arc::clone(&coordinator)));
            let closing = Arc::clone(&coordinator);
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = tokio::signal::ctrl_c().await;
                    closing.dispatch(PageSignal::BeforeUnload).await;
                })
                .await
                .context("HTTP server failed")?;

            coordinator.dispatch(PageSignal::Unload).await;
            info!("Shut down");
            Ok(())
        }
    }
}

fn build_uploader(cfg: &Config, store: Arc<dyn PendingStore>) -> Result<DeliveryUploader> {
    let transport = Arc::new(HttpTransport::new(&cfg.endpoint).context("Invalid upload endpoint")?);
    Ok(DeliveryUploader::new(
        store,
        transport,
        cfg.endpoint.clone(),
        cfg.delivery.clone(),
    ))
}
