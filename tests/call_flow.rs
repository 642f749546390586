//! End-to-end call flow against a scripted speech service.

use outcall::audio::playback::MockPlaybackSink;
use outcall::audio::{MockCaptureSource, WavCaptureSource};
use outcall::codec::{encode_transport, pcm16_from_f32};
use outcall::defaults::OUTPUT_SAMPLE_RATE;
use outcall::leads::{LeadDraft, LeadStatus};
use outcall::session::{
    CallController, CallState, ScriptStep, ScriptedSpeechService, ServerMessage, StreamConfig,
};
use outcall::transcript::Role;
use outcall::OutcallError;

fn lead_draft() -> LeadDraft {
    LeadDraft {
        name: "Maria Lopez".to_string(),
        city: "Valencia".to_string(),
        phone: Some("+34 600 000 000".to_string()),
        notes: Some("asked for a callback in spring".to_string()),
    }
}

fn sales_script() -> Vec<ScriptStep> {
    let audio = encode_transport(&pcm16_from_f32(&vec![0.05; 4800]));
    vec![
        ScriptStep::new(
            10,
            ServerMessage {
                input_transcription: Some("Hello, who is this?".to_string()),
                ..Default::default()
            },
        ),
        ScriptStep::new(
            10,
            ServerMessage {
                output_transcription: Some("Hi Maria! ".to_string()),
                audio: Some(audio.clone()),
                ..Default::default()
            },
        ),
        ScriptStep::new(
            10,
            ServerMessage {
                output_transcription: Some("I'm calling about our espresso machines.".to_string()),
                audio: Some(audio),
                turn_complete: true,
                ..Default::default()
            },
        ),
        ScriptStep::new(
            10,
            ServerMessage {
                input_transcription: Some("Not interested, thanks.".to_string()),
                turn_complete: true,
                ..Default::default()
            },
        ),
    ]
}

#[tokio::test(start_paused = true)]
async fn scripted_call_runs_end_to_end() {
    let service = ScriptedSpeechService::new(sales_script());
    let sent_view = service.clone();
    let sink = MockPlaybackSink::new();
    let mut controller = CallController::new(
        Box::new(service),
        Box::new(sink.clone()),
        StreamConfig::default(),
        "pitch the espresso machine line".to_string(),
    );
    let lead_id = controller.leads_mut().ingest(vec![lead_draft()])[0];

    // 4096-sample reads: each becomes exactly one uplink frame.
    let capture = MockCaptureSource::new()
        .with_samples(vec![0.1; 4096])
        .with_repeats(3);
    controller.start_call(lead_id, Box::new(capture)).unwrap();
    assert_eq!(controller.state(), CallState::Dialing);

    let mut live_entries = Vec::new();
    controller
        .run_until_ended(|entry| live_entries.push((entry.role, entry.text.clone())))
        .await;

    // Lifecycle ran to completion and reset.
    assert_eq!(controller.state(), CallState::Idle);

    // Transcript: human and agent turns in order, fragments joined.
    let log = controller.transcript();
    let texts: Vec<(&Role, &str)> = log.iter().map(|e| (&e.role, e.text.as_str())).collect();
    assert_eq!(
        texts,
        [
            (&Role::Human, "Hello, who is this?"),
            (&Role::Agent, "Hi Maria! I'm calling about our espresso machines."),
            (&Role::Human, "Not interested, thanks."),
        ]
    );
    assert_eq!(live_entries.len(), 3);

    // Lead closed out with status and summary.
    let lead = controller.leads().get(lead_id).unwrap();
    assert_eq!(lead.status, LeadStatus::Called);
    assert_eq!(
        lead.summary.as_deref(),
        Some("Hi Maria! I'm calling about our espresso machines.")
    );

    // Uplink: three full capture frames reached the stream.
    let chunks = sent_view.sent_chunks();
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.mime_type == "audio/pcm;rate=16000"));

    // Downlink: both audio chunks scheduled back to back.
    let calls = sink.scheduled();
    assert_eq!(calls.len(), 2);
    let duration = 4800.0 / OUTPUT_SAMPLE_RATE as f64;
    assert!((calls[1].start_at - (calls[0].start_at + duration)).abs() < 1e-9);

    // Per-call system prompt named the lead and the pitch.
    let configs = sent_view.open_configs();
    assert_eq!(configs.len(), 1);
    assert!(configs[0].system_instruction.contains("Maria Lopez"));
    assert!(configs[0].system_instruction.contains("espresso machine"));
    assert!(configs[0].system_instruction.contains("callback in spring"));
}

#[tokio::test(start_paused = true)]
async fn wav_file_stands_in_for_the_microphone() {
    use std::io::Cursor;

    // 300ms of 48kHz stereo: resampled and downmixed to 4800 samples at
    // 16kHz, enough for one full uplink frame.
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..(48_000 * 3 / 10) {
            writer.write_sample(8000i16).unwrap();
            writer.write_sample(-8000i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    let wav =
        WavCaptureSource::from_reader(Box::new(Cursor::new(cursor.into_inner()))).unwrap();

    let service = ScriptedSpeechService::new(vec![ScriptStep::new(
        20,
        ServerMessage {
            turn_complete: true,
            ..Default::default()
        },
    )]);
    let sent_view = service.clone();
    let mut controller = CallController::new(
        Box::new(service),
        Box::new(MockPlaybackSink::new()),
        StreamConfig::default(),
        "pitch".to_string(),
    );
    let lead_id = controller.leads_mut().ingest(vec![lead_draft()])[0];

    controller.start_call(lead_id, Box::new(wav)).unwrap();
    controller.run_until_ended(|_| {}).await;

    assert_eq!(controller.state(), CallState::Idle);
    assert_eq!(sent_view.sent_chunks().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_call_must_wait_for_the_first() {
    let service = ScriptedSpeechService::new(vec![]);
    let mut controller = CallController::new(
        Box::new(service),
        Box::new(MockPlaybackSink::new()),
        StreamConfig::default(),
        "pitch".to_string(),
    );
    let ids = controller
        .leads_mut()
        .ingest(vec![lead_draft(), lead_draft()]);

    controller
        .start_call(ids[0], Box::new(MockCaptureSource::new().with_repeats(1)))
        .unwrap();
    assert!(matches!(
        controller.start_call(ids[1], Box::new(MockCaptureSource::new())),
        Err(OutcallError::CallInProgress)
    ));

    controller.run_until_ended(|_| {}).await;
    assert_eq!(controller.state(), CallState::Idle);

    // The first lead was called, the second untouched; now it can be dialed.
    assert_eq!(controller.leads().get(ids[0]).unwrap().status, LeadStatus::Called);
    assert_eq!(controller.leads().get(ids[1]).unwrap().status, LeadStatus::Pending);
    controller
        .start_call(ids[1], Box::new(MockCaptureSource::new().with_repeats(1)))
        .unwrap();
    assert_eq!(controller.state(), CallState::Dialing);
}

#[tokio::test(start_paused = true)]
async fn setup_failures_leave_no_call_behind() {
    let service = ScriptedSpeechService::new(vec![]).with_open_failure();
    let mut controller = CallController::new(
        Box::new(service),
        Box::new(MockPlaybackSink::new()),
        StreamConfig::default(),
        "pitch".to_string(),
    );
    let lead_id = controller.leads_mut().ingest(vec![lead_draft()])[0];

    let capture = MockCaptureSource::new();
    let observer = capture.clone();
    assert!(matches!(
        controller.start_call(lead_id, Box::new(capture)),
        Err(OutcallError::Transport { .. })
    ));
    assert_eq!(controller.state(), CallState::Idle);

    // The microphone was released again.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
    while observer.is_started() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert!(!observer.is_started());

    // The lead keeps its pending status; no call happened.
    assert_eq!(
        controller.leads().get(lead_id).unwrap().status,
        LeadStatus::Pending
    );
}
