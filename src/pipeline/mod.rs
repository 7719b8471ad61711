//! Shared cleanup pipeline.
//!
//! Both the one-shot controller and the call watcher funnel every finished
//! session through the same steps: stop the recording, decide whether the
//! audio is worth transcribing, transcribe, generate metadata, persist the
//! session record. Each step degrades on failure — a dead transcription
//! command still leaves a complete record, just without a transcript.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::db::{self, SessionRepository};
use crate::metadata::Summarizer;
use crate::recording::{Recorder, RecordingHandle};
use crate::session::SessionOutcome;
use crate::transcription::Transcriber;

pub struct CleanupPipeline {
    recorder: Arc<dyn Recorder>,
    transcriber: Option<Arc<dyn Transcriber>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    skip_transcription_when_emptied: bool,
}

impl CleanupPipeline {
    pub fn new(
        recorder: Arc<dyn Recorder>,
        transcriber: Option<Arc<dyn Transcriber>>,
        summarizer: Option<Arc<dyn Summarizer>>,
        skip_transcription_when_emptied: bool,
    ) -> Self {
        Self {
            recorder,
            transcriber,
            summarizer,
            skip_transcription_when_emptied,
        }
    }

    /// Run cleanup for one finished session and persist its record.
    pub async fn finalize(
        &self,
        db_path: &Path,
        record_id: i64,
        outcome: SessionOutcome,
        recording: Option<RecordingHandle>,
        duration: Duration,
    ) -> Result<()> {
        let file = match recording {
            Some(handle) => match self.recorder.stop(handle).await {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!("Failed to stop recording: {}", e);
                    None
                }
            },
            None => None,
        };

        let mut audio_path = file.as_ref().map(|f| f.path.clone());
        let mut transcript_path = None;
        let mut transcript_text = None;
        let mut metadata_json = None;

        if let Some(file) = &file {
            if outcome == SessionOutcome::EmptiedOut && self.skip_transcription_when_emptied {
                info!("Session emptied out; discarding audio and skipping transcription");
                if let Err(e) = std::fs::remove_file(&file.path) {
                    warn!("Failed to delete {:?}: {}", file.path, e);
                }
                audio_path = None;
            } else if let Some(transcriber) = &self.transcriber {
                match transcriber.transcribe(&file.path).await {
                    Ok(text) => {
                        let path = file.path.with_extension("txt");
                        if let Err(e) = std::fs::write(&path, &text) {
                            error!("Failed to write transcript file: {}", e);
                        } else {
                            transcript_path = Some(path.clone());
                        }
                        transcript_text = Some(text);

                        if let Some(summarizer) = &self.summarizer {
                            match summarizer.summarize(&path).await {
                                Ok(metadata) => {
                                    let json = serde_json::to_string_pretty(&metadata)
                                        .unwrap_or_default();
                                    let metadata_path = file.path.with_extension("json");
                                    if let Err(e) = std::fs::write(&metadata_path, &json) {
                                        warn!("Failed to write metadata file: {}", e);
                                    }
                                    metadata_json = Some(json);
                                }
                                Err(e) => warn!("Metadata generation failed: {}", e),
                            }
                        }
                    }
                    Err(e) => warn!("Transcription failed: {}", e),
                }
            }
        }

        let conn = db::open(db_path)?;
        SessionRepository::complete(
            &conn,
            record_id,
            outcome.as_str(),
            audio_path.as_deref().and_then(|p| p.to_str()),
            transcript_path.as_deref().and_then(|p| p.to_str()),
            transcript_text.as_deref(),
            metadata_json.as_deref(),
            duration.as_secs() as i64,
        )?;

        info!(
            "Session {} finalized ({}, transcript: {})",
            record_id,
            outcome.as_str(),
            if transcript_text.is_some() { "yes" } else { "none" }
        );

        Ok(())
    }
}
