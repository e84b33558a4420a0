//! Runs one upload and renders its progress.

use std::path::Path;
use std::time::Duration;

use bytesize::ByteSize;
use micloud_client::{HttpTransport, Session};
use micloud_transfer::{DEFAULT_CHUNK_SIZE, SpeedCalculator};
use micloud_upload::{UploadEvent, UploadResult, UploadSession, UploadStage, Uploader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;

/// Uploads `file` into folder `parent` using the credentials in `config`.
pub async fn run(config: &Config, file: &Path, parent: &str) -> anyhow::Result<UploadResult> {
    if !config.has_credentials() {
        anyhow::bail!(
            "no session configured: set service_token and user_id in the configuration file"
        );
    }

    let transport = HttpTransport::new(
        &Session::new(&config.service_token, &config.user_id),
        &config.client_config(),
    )?;
    let session = UploadSession::new(&config.service_token).with_base_url(&config.base_url);

    let mut uploader = Uploader::new(&transport, session).with_options(config.upload_options());
    let events = uploader
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("event channel already taken"))?;

    let file_size = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
    info!(file = %file.display(), size = %ByteSize::b(file_size), %parent, "starting upload");
    let renderer = tokio::spawn(render_events(events, file_size));

    let cancel = uploader.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling upload");
            cancel.cancel();
        }
    });

    let result = uploader.upload(file, parent).await;
    interrupt.abort();
    // Closes the channel so the renderer drains and exits.
    drop(uploader);
    let _ = renderer.await;

    let result = result?;
    if result.deduplicated {
        info!(file_id = %result.file_id, "file already stored remotely, nothing transferred");
    } else {
        info!(
            file_id = %result.file_id,
            uploaded = result.blocks_uploaded,
            total = result.blocks_total,
            bytes = %ByteSize::b(result.bytes_uploaded),
            "upload finished"
        );
    }
    Ok(result)
}

/// Prints progress lines until the event channel closes.
async fn render_events(mut events: mpsc::Receiver<UploadEvent>, file_size: u64) {
    let mut view = ProgressView::new(file_size);
    while let Some(event) = events.recv().await {
        if let Some(line) = view.apply(event) {
            eprintln!("{line}");
        }
    }
}

/// Folds upload events into transfer speed and remaining bytes.
struct ProgressView {
    speed: SpeedCalculator,
    file_size: u64,
    done_bytes: u64,
}

impl ProgressView {
    fn new(file_size: u64) -> Self {
        Self {
            speed: SpeedCalculator::default(),
            file_size,
            done_bytes: 0,
        }
    }

    /// Returns the line to print for `event`, if any.
    fn apply(&mut self, event: UploadEvent) -> Option<String> {
        match event {
            UploadEvent::Stage { stage } => {
                info!(%stage, "stage");
                if stage == UploadStage::UploadBlocks {
                    // Start of the speed window, so the first block counts.
                    self.speed.add_sample(0);
                }
                None
            }
            UploadEvent::BlockSkipped { .. } => {
                self.done_bytes = (self.done_bytes + DEFAULT_CHUNK_SIZE).min(self.file_size);
                None
            }
            UploadEvent::BlockUploaded { bytes, .. } => {
                self.done_bytes = (self.done_bytes + bytes).min(self.file_size);
                self.speed.add_sample(bytes);
                None
            }
            UploadEvent::Progress { progress, status } => {
                let eta = self.speed.eta(self.file_size.saturating_sub(self.done_bytes));
                Some(progress_line(
                    progress,
                    &status,
                    self.speed.bytes_per_second(),
                    eta,
                ))
            }
            UploadEvent::Completed { .. } | UploadEvent::Failed { .. } => None,
        }
    }
}

/// Formats one progress line, e.g. `[ 42%] Uploading block 2/5 (3.1 MiB/s, ETA 12s)`.
fn progress_line(progress: f64, status: &str, bytes_per_second: f64, eta: Option<Duration>) -> String {
    let percent = (progress.clamp(0.0, 1.0) * 100.0).round() as u32;
    let mut line = format!("[{percent:>3}%] {status}");
    if bytes_per_second > 0.0 {
        line.push_str(&format!(" ({}/s", ByteSize::b(bytes_per_second as u64)));
        if let Some(eta) = eta {
            line.push_str(&format!(", ETA {}s", eta.as_secs()));
        }
        line.push(')');
    }
    line
}
