//! CLI handler for browsing past session records.

use anyhow::{bail, Result};

use crate::cli::args::SessionsCliArgs;
use crate::db::{self, SessionRepository};

pub fn handle_sessions_command(args: SessionsCliArgs) -> Result<()> {
    let conn = db::init_db()?;

    if let Some(id) = args.id {
        let Some(record) = SessionRepository::get(&conn, id)? else {
            bail!("No session record with id {id}");
        };

        println!(
            "Session #{} [{}] {}",
            record.id,
            record.platform,
            record.label.as_deref().unwrap_or("unlabeled")
        );
        println!("Status: {}", record.status);
        if let Some(outcome) = &record.outcome {
            println!("Outcome: {outcome}");
        }
        println!("Started: {}", record.started_at);
        if let Some(ended) = &record.ended_at {
            println!("Ended: {ended}");
        }
        if let Some(duration) = record.duration_seconds {
            println!("Duration: {:02}:{:02}", duration / 60, duration % 60);
        }
        if let Some(audio) = &record.audio_path {
            println!("Audio: {audio}");
        }
        if let Some(error) = &record.error {
            println!("Error: {error}");
        }
        if let Some(transcript) = &record.transcript_text {
            println!("\n--- Transcript ---\n{transcript}");
        }

        return Ok(());
    }

    let records = SessionRepository::list(&conn, args.limit)?;
    if records.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }

    for record in records {
        let duration = record.duration_seconds.unwrap_or(0);
        println!(
            "#{} {} [{}] {} {:02}:{:02} - {}",
            record.id,
            record.label.as_deref().unwrap_or("unlabeled"),
            record.platform,
            record.outcome.as_deref().unwrap_or(record.status.as_str()),
            duration / 60,
            duration % 60,
            record.started_at
        );
    }

    Ok(())
}
