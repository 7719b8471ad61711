//! Session audio capture.
//!
//! The controller only sees `start` and `stop` on an opaque handle; how the
//! audio is captured (here: ffmpeg against a PulseAudio monitor source) is
//! this module's business alone.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Opaque handle for an in-progress recording.
pub struct RecordingHandle {
    path: PathBuf,
    child: Option<Child>,
    started_at: Instant,
}

impl RecordingHandle {
    /// A handle with no capture process attached. Used by recorder
    /// implementations that do their own bookkeeping, and by test doubles.
    pub fn detached(path: PathBuf) -> Self {
        Self {
            path,
            child: None,
            started_at: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A finished recording.
#[derive(Debug, Clone)]
pub struct RecordingFile {
    pub path: PathBuf,
    pub bytes: u64,
    pub duration: Duration,
}

#[async_trait]
pub trait Recorder: Send + Sync {
    async fn start(&self, label: &str) -> Result<RecordingHandle>;

    async fn stop(&self, handle: RecordingHandle) -> Result<RecordingFile>;
}

/// Captures a PulseAudio source with ffmpeg, mono 16 kHz WAV.
pub struct FfmpegRecorder {
    pulse_source: String,
    output_dir: PathBuf,
}

impl FfmpegRecorder {
    pub fn new(pulse_source: String, output_dir: PathBuf) -> Self {
        Self {
            pulse_source,
            output_dir,
        }
    }

    fn output_path(&self, label: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let safe_label: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.output_dir.join(format!("{safe_label}-{timestamp}.wav"))
    }
}

#[async_trait]
impl Recorder for FfmpegRecorder {
    async fn start(&self, label: &str) -> Result<RecordingHandle> {
        std::fs::create_dir_all(&self.output_dir)
            .context("Failed to create recordings directory")?;

        let ffmpeg = which::which("ffmpeg").context("ffmpeg not found in PATH")?;
        let path = self.output_path(label);

        let child = Command::new(ffmpeg)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg("pulse")
            .arg("-i")
            .arg(&self.pulse_source)
            .arg("-ac")
            .arg("1")
            .arg("-ar")
            .arg("16000")
            .arg("-y")
            .arg(&path)
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn ffmpeg")?;

        info!("Recording started: {:?} (source {})", path, self.pulse_source);

        Ok(RecordingHandle {
            path,
            child: Some(child),
            started_at: Instant::now(),
        })
    }

    async fn stop(&self, mut handle: RecordingHandle) -> Result<RecordingFile> {
        let duration = handle.started_at.elapsed();

        if let Some(mut child) = handle.child.take() {
            // ffmpeg finalizes the WAV header on SIGINT; a hard kill would
            // leave a truncated file.
            if let Some(pid) = child.id() {
                let _ = Command::new("kill")
                    .arg("-INT")
                    .arg(pid.to_string())
                    .status()
                    .await;
            }

            match tokio::time::timeout(Duration::from_secs(10), child.wait()).await {
                Ok(Ok(status)) => debug!("ffmpeg exited with {}", status),
                Ok(Err(e)) => warn!("Failed to reap ffmpeg: {}", e),
                Err(_) => {
                    warn!("ffmpeg did not exit after SIGINT, killing");
                    let _ = child.kill().await;
                }
            }
        }

        let bytes = std::fs::metadata(&handle.path).map(|m| m.len()).unwrap_or(0);
        if bytes == 0 {
            warn!("Recording file {:?} is empty", handle.path);
        }

        info!(
            "Recording stopped: {:?} ({} bytes, {}s)",
            handle.path,
            bytes,
            duration.as_secs()
        );

        Ok(RecordingFile {
            path: handle.path,
            bytes,
            duration,
        })
    }
}

/// Periodically re-applies audio routing during a call (`pactl move-…` or
/// whatever the deployment configures). The task must be aborted when the
/// call ends so no interval leaks across call boundaries.
pub struct RoutingRefresher {
    command: String,
    interval: Duration,
}

impl RoutingRefresher {
    pub fn new(command: String, interval: Duration) -> Self {
        Self { command, interval }
    }

    /// Spawn the background refresh loop. Returns None when disabled.
    pub fn spawn(&self) -> Option<JoinHandle<()>> {
        if self.command.is_empty() || self.interval.is_zero() {
            return None;
        }

        let command = self.command.clone();
        let interval = self.interval;

        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match Command::new("sh").arg("-c").arg(&command).output().await {
                    Ok(output) if output.status.success() => {
                        debug!("Audio routing refreshed");
                    }
                    Ok(output) => warn!(
                        "Routing refresh exited with {}: {}",
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    ),
                    Err(e) => warn!("Routing refresh failed to run: {}", e),
                }
            }
        }))
    }
}
