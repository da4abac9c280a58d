use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use photo_queue::{
    HttpStorageClient,
    HttpStorageConfig,
    QueueConfig,
    QueueCoordinator,
    QueueError,
    UploadEvent,
    UploadFile,
};

/// Upload task photos to the object store
#[derive(Parser, Debug)]
#[command(name = "photo-queue", version)]
struct Cli {
    /// TOML queue configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Object store base URL
    #[arg(short, long, env = "PHOTO_QUEUE_ENDPOINT")]
    endpoint: String,

    /// Bearer token for the object store
    #[arg(short, long, env = "PHOTO_QUEUE_TOKEN")]
    token: Option<String>,

    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => QueueConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => QueueConfig::default(),
    };

    let storage = HttpStorageClient::new(HttpStorageConfig {
        endpoint: cli.endpoint.clone(),
        token: cli.token.clone(),
        ..Default::default()
    })?;

    let mut files = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }

    let handle = QueueCoordinator::builder(Arc::new(storage))
        .config(config)
        .spawn()?;
    let coordinator = handle.coordinator.clone();

    let events = coordinator.subscribe();
    let printer = tokio::spawn(async move {
        print_events(events, &mut std::io::stdout()).await
    });

    let result = coordinator.enqueue(files).await;
    let _ = printer.await;
    handle.shutdown().await?;

    let result = match result {
        Ok(result) => result,
        Err(QueueError::Validation(err)) => bail!("{}", err),
        Err(err) => return Err(err.into()),
    };

    for url in &result.succeeded {
        println!("uploaded   {}", url);
    }

    match result.summary() {
        Some(summary) if result.succeeded.is_empty() => bail!("{}", summary),
        Some(summary) => eprintln!("{}", summary),
        None => {}
    }

    Ok(())
}

/// Prints record and status events until the batch settles or the queue closes.
async fn print_events<W: Write>(mut events: broadcast::Receiver<UploadEvent>, out: &mut W) -> std::io::Result<()> {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer fell behind");
                continue;
            }
            Err(RecvError::Closed) => return Ok(()),
        };

        match event {
            UploadEvent::RecordAdded { record } => {
                writeln!(out, "queued     {} ({} bytes)", record.file.name, record.file.size)?;
            }
            UploadEvent::StatusChanged { upload_id, new_status, .. } => {
                writeln!(out, "{:<10} {}", new_status.to_string(), upload_id)?;
            }
            UploadEvent::BatchFinished { .. } | UploadEvent::BatchRejected { .. } => return Ok(()),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use photo_queue::{UploadId, UploadStatus, ValidationError};

    fn status_changed() -> UploadEvent {
        UploadEvent::StatusChanged {
            upload_id: UploadId::new(),
            old_status: UploadStatus::Uploading,
            new_status: UploadStatus::Completed,
        }
    }

    #[tokio::test]
    async fn test_printer_keeps_going_after_lag() {
        let (event_tx, events) = broadcast::channel(2);
        for _ in 0..5 {
            event_tx.send(status_changed()).unwrap();
        }
        event_tx.send(UploadEvent::BatchRejected { error: ValidationError::NoFilesSelected }).unwrap();

        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(1), print_events(events, &mut out))
            .await
            .unwrap()
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.lines().count(), 1);
        assert!(printed.starts_with("completed"));
    }

    #[tokio::test]
    async fn test_printer_stops_when_queue_closes() {
        let (event_tx, events) = broadcast::channel(4);
        event_tx.send(status_changed()).unwrap();
        drop(event_tx);

        let mut out = Vec::new();
        print_events(events, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }
}
