//! End-to-end controller scenarios against stub adapters and collaborators.

mod common;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use attendant::db::{self, SessionRepository};
use attendant::pipeline::CleanupPipeline;
use attendant::platform::AdmissionOutcome;
use attendant::recording::Recorder;
use attendant::session::{
    SessionController, SessionOutcome, SessionSettings, SessionStatusHandle,
};
use attendant::transcription::Transcriber;

use common::{
    FailingTranscriber, NullPage, StaticTranscriber, StubAdapter, StubCounters, StubRecorder,
};

struct Harness {
    controller: Arc<SessionController>,
    recorder: Arc<StubRecorder>,
    counters: Arc<StubCounters>,
    cancel: CancellationToken,
    db_path: PathBuf,
    _dir: tempfile::TempDir,
}

fn harness(
    build: impl FnOnce(Arc<StubCounters>) -> StubAdapter,
    transcriber: Option<Arc<dyn Transcriber>>,
    settings_override: impl FnOnce(&mut SessionSettings),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let counters = Arc::new(StubCounters::default());
    let recorder = Arc::new(StubRecorder::new(dir.path().join("recordings")));
    let recorder_dyn: Arc<dyn Recorder> = recorder.clone();

    let pipeline = CleanupPipeline::new(recorder_dyn.clone(), transcriber, None, true);

    let mut settings = SessionSettings {
        monitor_poll: Duration::from_millis(10),
        empty_timeout: Duration::from_millis(500),
        max_duration: Duration::from_secs(30),
        admission_max_wait: Duration::from_millis(300),
        display_name: Some("Notetaker".to_string()),
        artifacts_dir: dir.path().join("artifacts"),
    };
    settings_override(&mut settings);

    let cancel = CancellationToken::new();
    let controller = Arc::new(SessionController::new(
        Box::new(build(counters.clone())),
        Arc::new(NullPage),
        recorder_dyn,
        pipeline,
        SessionStatusHandle::default(),
        settings,
        db_path.clone(),
        cancel.clone(),
    ));

    Harness {
        controller,
        recorder,
        counters,
        cancel,
        db_path,
        _dir: dir,
    }
}

#[tokio::test]
async fn happy_path_starts_recording_exactly_once() {
    let h = harness(
        |c| StubAdapter::joining(c).with_ended_script(vec![true]),
        Some(Arc::new(StaticTranscriber)),
        |_| {},
    );

    let summary = h
        .controller
        .run("https://meet.google.com/abc-defg-hij", None)
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionOutcome::Ended);
    assert!(summary.ever_confirmed_active);
    assert_eq!(h.recorder.starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.recorder.stops.load(Ordering::SeqCst), 1);

    let conn = db::open(&h.db_path).unwrap();
    let record = SessionRepository::get(&conn, summary.record_id).unwrap().unwrap();
    assert_eq!(record.outcome, Some("ended".to_string()));
    assert_eq!(record.transcript_text, Some("stub transcript".to_string()));
    assert!(record.ended_at.is_some());
    assert!(record.ever_confirmed_active);
}

#[tokio::test]
async fn admission_ended_never_starts_recording() {
    let h = harness(
        |c| {
            let mut adapter = StubAdapter::joining(c);
            adapter.admission = Some(AdmissionOutcome::Ended);
            adapter
        },
        Some(Arc::new(StaticTranscriber)),
        |_| {},
    );

    let summary = h
        .controller
        .run("https://zoom.us/wc/join/123", None)
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionOutcome::AdmissionRejected);
    assert!(!summary.ever_confirmed_active);
    assert_eq!(h.recorder.starts.load(Ordering::SeqCst), 0);

    let conn = db::open(&h.db_path).unwrap();
    let record = SessionRepository::get(&conn, summary.record_id).unwrap().unwrap();
    assert_eq!(record.outcome, Some("admission_rejected".to_string()));
    assert!(!record.ever_confirmed_active);
    assert!(record.audio_path.is_none());
}

#[tokio::test]
async fn admission_after_delay_skips_redundant_confirmation() {
    let h = harness(
        |c| {
            let mut adapter = StubAdapter::joining(c).with_ended_script(vec![true]);
            adapter.admission = Some(AdmissionOutcome::Admitted);
            // Two simulated poll intervals before the host acts.
            adapter.admission_delay = Duration::from_millis(20);
            adapter
        },
        Some(Arc::new(StaticTranscriber)),
        |_| {},
    );

    let summary = h
        .controller
        .run("https://zoom.us/wc/join/123", None)
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionOutcome::Ended);
    assert!(summary.ever_confirmed_active);
    // Admission already confirmed presence; no separate confirm_active call.
    assert_eq!(h.counters.confirms.load(Ordering::SeqCst), 0);
    assert_eq!(h.recorder.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn admission_timeout_records_never_joined() {
    let h = harness(
        |c| {
            let mut adapter = StubAdapter::joining(c);
            adapter.admission = Some(AdmissionOutcome::TimedOut);
            adapter
        },
        None,
        |_| {},
    );

    let summary = h.controller.run("https://zoom.us/wc/join/9", None).await.unwrap();

    assert_eq!(summary.outcome, SessionOutcome::AdmissionTimedOut);
    assert_eq!(h.recorder.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn emptied_out_session_discards_audio() {
    let h = harness(
        |c| StubAdapter::joining(c).with_participants(vec![], false, 0),
        Some(Arc::new(StaticTranscriber)),
        |s| s.empty_timeout = Duration::from_millis(50),
    );

    let summary = h
        .controller
        .run("https://meet.google.com/abc-defg-hij", None)
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionOutcome::EmptiedOut);
    assert_eq!(h.recorder.stops.load(Ordering::SeqCst), 1);

    // Default policy: emptied-out sessions are not worth keeping.
    let audio = h.recorder.last_path.lock().unwrap().clone().unwrap();
    assert!(!audio.exists());

    let conn = db::open(&h.db_path).unwrap();
    let record = SessionRepository::get(&conn, summary.record_id).unwrap().unwrap();
    assert_eq!(record.outcome, Some("emptied_out".to_string()));
    assert!(record.audio_path.is_none());
    assert!(record.transcript_text.is_none());
}

#[tokio::test]
async fn returning_participants_reset_the_empty_timer() {
    // Alternating 0 and 3: if the reset works, the empty timer never
    // accumulates and the scripted end at tick 12 wins. A broken reset
    // would hit the 35ms empty timeout within a few ticks instead.
    let mut ended = vec![false; 11];
    ended.push(true);

    let h = harness(
        |c| {
            StubAdapter::joining(c)
                .with_ended_script(ended)
                .with_participants(vec![0, 3], true, -1)
        },
        None,
        |s| s.empty_timeout = Duration::from_millis(35),
    );

    let summary = h
        .controller
        .run("https://meet.google.com/abc-defg-hij", None)
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionOutcome::Ended);
}

#[tokio::test]
async fn unconfirmed_join_proceeds_optimistically() {
    let h = harness(
        |c| {
            let mut adapter = StubAdapter::joining(c).with_ended_script(vec![true]);
            adapter.confirm_result = false;
            adapter
        },
        None,
        |_| {},
    );

    let summary = h
        .controller
        .run("https://meet.google.com/abc-defg-hij", None)
        .await
        .unwrap();

    // Recording starts even though presence was never confirmed.
    assert_eq!(summary.outcome, SessionOutcome::Ended);
    assert!(!summary.ever_confirmed_active);
    assert_eq!(h.recorder.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn termination_signal_still_produces_one_record() {
    let h = harness(
        |c| StubAdapter::joining(c),
        None,
        |_| {},
    );

    let controller = h.controller.clone();
    let task = tokio::spawn(async move {
        controller
            .run("https://meet.google.com/abc-defg-hij", Some("standup".to_string()))
            .await
    });

    tokio::time::sleep(Duration::from_millis(60)).await;
    h.cancel.cancel();

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.outcome, SessionOutcome::Interrupted);
    assert_eq!(h.recorder.starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.recorder.stops.load(Ordering::SeqCst), 1);

    let conn = db::open(&h.db_path).unwrap();
    let records = SessionRepository::list(&conn, 10).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].ended_at.is_some());
}

#[tokio::test]
async fn failed_transcription_degrades_to_null_transcript() {
    let h = harness(
        |c| StubAdapter::joining(c).with_ended_script(vec![true]),
        Some(Arc::new(FailingTranscriber)),
        |_| {},
    );

    let summary = h
        .controller
        .run("https://meet.google.com/abc-defg-hij", None)
        .await
        .unwrap();

    let conn = db::open(&h.db_path).unwrap();
    let record = SessionRepository::get(&conn, summary.record_id).unwrap().unwrap();
    assert_eq!(record.outcome, Some("ended".to_string()));
    assert!(record.transcript_text.is_none());
    // The audio is kept when transcription fails.
    assert!(record.audio_path.is_some());
}
