//! Transcription collaborator.
//!
//! Transcription is an opaque, long-running external process: the controller
//! hands over an audio path and only cares about the text that comes back.
//! A failed transcription degrades the session record (`transcript: NULL`);
//! it never aborts cleanup.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// Runs the configured shell command with the audio file as `$1` and reads
/// the transcript from stdout.
pub struct CommandTranscriber {
    command: String,
    timeout: Duration,
}

impl CommandTranscriber {
    pub fn new(command: String, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        info!("Transcribing {:?} via external command", audio_path);

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(format!("{} \"$1\"", self.command))
            .arg("attendant")
            .arg(audio_path)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn transcription command")?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.context("Transcription command failed to run")?,
            Err(_) => bail!(
                "Transcription timed out after {}s",
                self.timeout.as_secs()
            ),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Transcription command exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            warn!("Transcription produced no text for {:?}", audio_path);
            bail!("Transcription produced no text");
        }

        info!("Transcription complete: {} chars", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_command_receives_audio_path() {
        let transcriber = CommandTranscriber::new("echo".to_string(), Duration::from_secs(10));
        let text = transcriber
            .transcribe(&PathBuf::from("/tmp/session.wav"))
            .await
            .unwrap();
        assert_eq!(text, "/tmp/session.wav");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_an_error() {
        let transcriber =
            CommandTranscriber::new("exit 3 #".to_string(), Duration::from_secs(10));
        assert!(transcriber
            .transcribe(&PathBuf::from("/tmp/session.wav"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_output_is_an_error() {
        let transcriber = CommandTranscriber::new("true #".to_string(), Duration::from_secs(10));
        assert!(transcriber
            .transcribe(&PathBuf::from("/tmp/session.wav"))
            .await
            .is_err());
    }
}
