//! Session metadata generation.
//!
//! After transcription, an AI model extracts a title, summary, key points,
//! action items, participants and topics from the transcript. This is a
//! best-effort collaborator: any failure leaves the session record without
//! metadata and cleanup continues.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionItem {
    pub owner: String,
    pub task: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionMetadata {
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub participants: Vec<String>,
    pub topics: Vec<String>,
    pub language: String,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript_path: &Path) -> Result<SessionMetadata>;
}

/// Calls an OpenRouter-compatible chat-completions endpoint.
pub struct OpenRouterSummarizer {
    client: reqwest::Client,
    api_endpoint: String,
    api_key: String,
    model: String,
}

impl OpenRouterSummarizer {
    pub fn new(
        api_endpoint: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_endpoint,
            api_key,
            model,
        })
    }

    fn build_prompt(transcript: &str) -> String {
        format!(
            r#"Analyze this meeting transcript and extract metadata.

Transcript:
{transcript}

Return JSON with this structure:
{{
    "title": "Short descriptive meeting title (max 50 chars)",
    "summary": "2-3 sentence summary",
    "keyPoints": ["point 1", "point 2", "point 3"],
    "actionItems": [
        {{"owner": "name", "task": "task description"}}
    ],
    "participants": ["name1", "name2"],
    "topics": ["topic1", "topic2"],
    "language": "en"
}}

Guidelines:
- topics should be lowercase, hyphen-separated English words
- If uncertain about something, omit it
- Return only valid JSON, no additional text"#
        )
    }
}

/// Pull the JSON object out of a model reply that may carry prose around it.
fn extract_json(reply: &str) -> Result<SessionMetadata> {
    let pattern = Regex::new(r"\{[\s\S]*\}").expect("static pattern");
    let json = pattern
        .find(reply)
        .map(|m| m.as_str())
        .unwrap_or(reply);

    serde_json::from_str(json).context("Model reply was not valid metadata JSON")
}

#[async_trait]
impl Summarizer for OpenRouterSummarizer {
    async fn summarize(&self, transcript_path: &Path) -> Result<SessionMetadata> {
        let transcript = std::fs::read_to_string(transcript_path)
            .with_context(|| format!("Failed to read transcript {transcript_path:?}"))?;

        if transcript.trim().is_empty() {
            bail!("Transcript is empty, nothing to summarize");
        }

        info!(
            "Generating metadata with {} ({} transcript chars)",
            self.model,
            transcript.len()
        );

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": Self::build_prompt(&transcript)}],
        });

        let response: serde_json::Value = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.api_endpoint.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Metadata API request failed")?
            .error_for_status()
            .context("Metadata API returned an error status")?
            .json()
            .await
            .context("Metadata API returned unparseable JSON")?;

        let reply = response["choices"][0]["message"]["content"]
            .as_str()
            .context("Metadata API reply had no content")?;

        let metadata = extract_json(reply)?;
        info!("Metadata generated: {:?}", metadata.title);
        Ok(metadata)
    }
}
