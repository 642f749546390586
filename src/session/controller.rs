//! Call session lifecycle.
//!
//! The controller owns one call at a time: it wires the capture thread,
//! the speech stream, the transcript aggregator and the playback
//! scheduler together, drives the event loop, and guarantees a single
//! teardown path no matter how the call ends.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audio::{
    CaptureHandle, CapturePipeline, CaptureSource, PlaybackScheduler, PlaybackSink,
    spawn_capture_thread,
};
use crate::codec::{decode_pcm_buffer, decode_transport};
use crate::defaults::{ENDED_RESET_DELAY_MS, OUTPUT_SAMPLE_RATE};
use crate::error::{ErrorReporter, LogReporter, OutcallError, Result};
use crate::leads::{Lead, LeadBook, LeadStatus};
use crate::session::stream::{ServerMessage, SpeechService, SpeechStream, StreamConfig, StreamEvent};
use crate::transcript::{Role, TranscriptAggregator, TranscriptEntry};

/// Lifecycle state of the call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// No call; ready to dial.
    Idle,
    /// Resources are up, waiting for the stream to open.
    Dialing,
    /// The stream is open; audio flows both ways.
    Active,
    /// The call finished; resets to idle shortly.
    Ended,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallState::Idle => write!(f, "idle"),
            CallState::Dialing => write!(f, "dialing"),
            CallState::Active => write!(f, "active"),
            CallState::Ended => write!(f, "ended"),
        }
    }
}

/// How often the capture thread polls an idle source, in milliseconds.
const CAPTURE_POLL_INTERVAL_MS: u64 = 20;

/// Resources that exist only while a call is up.
struct ActiveCall {
    lead_id: Uuid,
    stream: Box<dyn SpeechStream>,
    capture: CaptureHandle,
    samples_rx: mpsc::Receiver<Vec<f32>>,
    samples_done: bool,
    events_rx: mpsc::Receiver<StreamEvent>,
    pipeline: CapturePipeline,
}

enum LoopInput {
    Samples(Vec<f32>),
    SamplesDone,
    Event(StreamEvent),
    EventsClosed,
}

/// Drives outbound calls against a speech service.
pub struct CallController {
    state: CallState,
    service: Box<dyn SpeechService>,
    scheduler: PlaybackScheduler,
    leads: LeadBook,
    stream_template: StreamConfig,
    product_pitch: String,
    transcript: TranscriptAggregator,
    reporter: Box<dyn ErrorReporter>,
    active: Option<ActiveCall>,
}

impl CallController {
    pub fn new(
        service: Box<dyn SpeechService>,
        sink: Box<dyn PlaybackSink>,
        stream_template: StreamConfig,
        product_pitch: String,
    ) -> Self {
        Self {
            state: CallState::Idle,
            service,
            scheduler: PlaybackScheduler::new(sink),
            leads: LeadBook::new(),
            stream_template,
            product_pitch,
            transcript: TranscriptAggregator::new(),
            reporter: Box::new(LogReporter),
            active: None,
        }
    }

    /// Replaces the stderr reporter for recoverable errors.
    pub fn with_reporter(mut self, reporter: Box<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn leads(&self) -> &LeadBook {
        &self.leads
    }

    pub fn leads_mut(&mut self) -> &mut LeadBook {
        &mut self.leads
    }

    /// Transcript of the current or most recent call.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.transcript.log()
    }

    /// Starts a call to the given lead using the given microphone.
    ///
    /// On any setup failure every resource brought up so far is torn down
    /// and the controller stays idle.
    ///
    /// # Errors
    /// `CallInProgress` unless the controller is idle; `LeadNotFound` for
    /// an unknown id; capture and transport errors from setup.
    pub fn start_call(&mut self, lead_id: Uuid, capture: Box<dyn CaptureSource>) -> Result<()> {
        if self.state != CallState::Idle {
            return Err(OutcallError::CallInProgress);
        }

        let lead = self
            .leads
            .get(lead_id)
            .ok_or_else(|| OutcallError::LeadNotFound {
                id: lead_id.to_string(),
            })?;

        let mut config = self.stream_template.clone();
        config.system_instruction = build_system_prompt(lead, &self.product_pitch);

        let (samples_tx, samples_rx) = mpsc::channel(64);
        let capture_handle = spawn_capture_thread(capture, samples_tx, CAPTURE_POLL_INTERVAL_MS)?;

        let (events_tx, events_rx) = mpsc::channel(64);
        let stream = match self.service.open(config, events_tx) {
            Ok(stream) => stream,
            Err(e) => {
                capture_handle.stop();
                return Err(e);
            }
        };

        self.transcript.clear();
        self.active = Some(ActiveCall {
            lead_id,
            stream,
            capture: capture_handle,
            samples_rx,
            samples_done: false,
            events_rx,
            pipeline: CapturePipeline::new(),
        });
        self.state = CallState::Dialing;
        Ok(())
    }

    /// Runs the call event loop until the call ends, then resets to idle.
    ///
    /// `on_entry` is invoked for each transcript entry as its turn
    /// completes.
    pub async fn run_until_ended<F>(&mut self, mut on_entry: F)
    where
        F: FnMut(&TranscriptEntry),
    {
        loop {
            let input = {
                let Some(active) = self.active.as_mut() else {
                    break;
                };
                tokio::select! {
                    samples = active.samples_rx.recv(), if !active.samples_done => {
                        match samples {
                            Some(samples) => LoopInput::Samples(samples),
                            None => LoopInput::SamplesDone,
                        }
                    }
                    event = active.events_rx.recv() => {
                        match event {
                            Some(event) => LoopInput::Event(event),
                            None => LoopInput::EventsClosed,
                        }
                    }
                }
            };

            match input {
                LoopInput::Samples(samples) => self.handle_samples(&samples),
                LoopInput::SamplesDone => {
                    // Finite source drained; the agent may still be
                    // mid-reply, so only the uplink stops.
                    if let Some(active) = self.active.as_mut() {
                        active.samples_done = true;
                    }
                }
                LoopInput::Event(StreamEvent::Opened) => {
                    if self.state == CallState::Dialing {
                        self.state = CallState::Active;
                    }
                }
                LoopInput::Event(StreamEvent::Message(msg)) => {
                    self.handle_message(msg, &mut on_entry);
                }
                LoopInput::Event(StreamEvent::Error(message)) => {
                    self.reporter
                        .report("stream", &OutcallError::Transport { message });
                    self.stop_call();
                }
                LoopInput::Event(StreamEvent::Closed) | LoopInput::EventsClosed => {
                    self.stop_call();
                }
            }
        }

        if self.state == CallState::Ended {
            tokio::time::sleep(std::time::Duration::from_millis(ENDED_RESET_DELAY_MS)).await;
            self.state = CallState::Idle;
        }
    }

    /// Forwards captured audio to the stream while a call is up.
    ///
    /// Frames arriving in any other state are dropped.
    fn handle_samples(&mut self, samples: &[f32]) {
        if !matches!(self.state, CallState::Dialing | CallState::Active) {
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let mut send_failed = None;
        for chunk in active.pipeline.push_samples(samples) {
            if let Err(e) = active.stream.send_audio(&chunk) {
                send_failed = Some(e);
                break;
            }
        }
        if let Some(e) = send_failed {
            self.reporter.report("uplink", &e);
            self.stop_call();
        }
    }

    /// Processes one server message, each present field independently.
    fn handle_message<F>(&mut self, msg: ServerMessage, on_entry: &mut F)
    where
        F: FnMut(&TranscriptEntry),
    {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let lead_id = active.lead_id;

        if let Some(text) = &msg.input_transcription {
            self.transcript.push_fragment(Role::Human, text);
        }

        if let Some(text) = &msg.output_transcription {
            self.transcript.push_fragment(Role::Agent, text);
            // Keep the lead summary live with the agent's in-progress turn.
            let summary = self.transcript.agent_buffer().to_string();
            if let Some(lead) = self.leads.get_mut(lead_id) {
                lead.set_summary(&summary);
            }
        }

        if let Some(audio) = &msg.audio {
            // A bad payload skips this chunk, never the call.
            match decode_transport(audio)
                .and_then(|bytes| decode_pcm_buffer(&bytes, OUTPUT_SAMPLE_RATE, 1))
            {
                Ok(buffer) => {
                    if let Err(e) = self.scheduler.enqueue(buffer) {
                        self.reporter.report("playback", &e);
                    }
                }
                Err(e) => {
                    self.reporter.report("downlink", &e);
                }
            }
        }

        if msg.turn_complete {
            let entries = self.transcript.complete_turn();
            for entry in &entries {
                on_entry(entry);
                if entry.role == Role::Agent
                    && let Some(lead) = self.leads.get_mut(lead_id)
                {
                    lead.set_summary(&entry.text);
                }
            }
        }
    }

    /// Ends the current call.
    ///
    /// Idempotent single teardown path: closes the stream, silences
    /// playback, stops capture, flushes the transcript, and marks the lead
    /// called. A controller with no active call is left untouched.
    pub fn stop_call(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.stream.close();
        self.scheduler.stop_all();
        active.capture.stop();

        // Flush whatever the last turn left behind.
        let entries = self.transcript.complete_turn();
        let lead_id = active.lead_id;
        if let Some(lead) = self.leads.get_mut(lead_id) {
            lead.status = LeadStatus::Called;
            for entry in &entries {
                if entry.role == Role::Agent {
                    lead.set_summary(&entry.text);
                }
            }
        }

        self.state = CallState::Ended;
    }
}

/// Builds the per-call system prompt from the lead and product pitch.
fn build_system_prompt(lead: &Lead, product_pitch: &str) -> String {
    let mut prompt = format!(
        "You are a friendly outbound sales agent. You are calling {} from {}. \
         Your goal: {}",
        lead.name, lead.city, product_pitch,
    );
    if let Some(notes) = &lead.notes {
        prompt.push_str(&format!(" Notes about this customer: {}", notes));
    }
    prompt.push_str(" Keep the conversation short and polite, and close by thanking them.");
    prompt
}
