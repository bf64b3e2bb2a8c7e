use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dropqueue::config::QueueConfig;
use dropqueue::gateway::MemoryGateway;
use dropqueue::queue::{FileInput, FileIntake, QueueEvent, UploadQueueManager};

fn guess_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        anyhow::bail!("usage: dropqueue <file>...");
    }

    let config = match QueueConfig::load("config.toml") {
        Ok(config) => config,
        Err(_) => QueueConfig::default(),
    };

    let mut inputs = Vec::new();
    for path in &paths {
        let path = Path::new(path);
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unnamed")
            .to_string();
        inputs.push(FileInput::new(name, guess_mime(path), content));
    }

    let intake = FileIntake {
        max_file_size_bytes: config.max_file_size_bytes,
        ..Default::default()
    };
    let (accepted, rejected) = intake.filter(inputs);
    for reject in &rejected {
        info!(name = %reject.name, reason = ?reject.reason, "skipped at intake");
    }

    let gateway = Arc::new(MemoryGateway::new());
    let handle = UploadQueueManager::new(config, gateway);
    let manager = handle.manager.clone();
    let mut events = manager.subscribe_events();

    let ids = manager.add_files(accepted).await?;
    info!(count = ids.len(), "queued files");

    // 消费事件直到队列全部落定
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(event)) => match event {
                QueueEvent::Progress { id, progress } => {
                    info!(%id, progress, "progress");
                }
                QueueEvent::Completed { id } => {
                    info!(%id, "upload complete");
                }
                QueueEvent::Failed { id, error } => {
                    info!(%id, %error, "upload failed");
                }
                QueueEvent::Persisted { id, remote_id } => {
                    info!(%id, %remote_id, "record persisted");
                }
                other => {
                    info!(?other, "event");
                }
            },
            Ok(Err(_)) | Err(_) => break,
        }

        let stats = manager.stats().await?;
        if stats.idle == 0 && stats.uploading == 0 {
            break;
        }
    }

    let stats = manager.stats().await?;
    info!(
        total = stats.total,
        completed = stats.completed,
        failed = stats.failed,
        "queue settled"
    );

    drop(events);
    drop(manager);
    handle.shutdown().await?;

    Ok(())
}
