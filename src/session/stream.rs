//! Streaming speech session transport.
//!
//! Defines the message shapes exchanged with a bidirectional speech
//! service, the trait seam a real network client would implement, and a
//! scripted implementation that replays a canned conversation for
//! simulated calls and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::audio::EncodedAudioChunk;
use crate::defaults::{DEFAULT_MODEL, DEFAULT_VOICE};
use crate::error::{OutcallError, Result};

/// Parameters for opening a streaming speech session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub model: String,
    pub voice: String,
    /// Per-call system prompt framing the agent's persona and goal.
    pub system_instruction: String,
    /// Ask the service to transcribe the uplink (human) audio.
    pub input_transcription: bool,
    /// Ask the service to transcribe the downlink (agent) audio.
    pub output_transcription: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: String::new(),
            input_transcription: true,
            output_transcription: true,
        }
    }
}

/// One message from the speech service.
///
/// Every field is optional on the wire; a message may carry any mix of
/// transcription text, audio, and a turn boundary, and each present field
/// is processed independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerMessage {
    /// Transcription fragment of what the human said.
    pub input_transcription: Option<String>,
    /// Transcription fragment of what the agent said.
    pub output_transcription: Option<String>,
    /// Base64 PCM of synthesized agent speech.
    pub audio: Option<String>,
    /// Marks the end of a conversational turn.
    pub turn_complete: bool,
}

impl ServerMessage {
    /// Parses a wire message from its JSON form.
    ///
    /// # Errors
    /// Returns `OutcallError::Decode` on malformed JSON.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| OutcallError::Decode {
            message: format!("invalid server message: {}", e),
        })
    }
}

/// Events a speech stream delivers to the session controller.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The session is established and ready for audio.
    Opened,
    /// A message arrived from the service.
    Message(ServerMessage),
    /// The transport failed.
    Error(String),
    /// The session ended, locally or remotely.
    Closed,
}

/// Trait for services that open streaming speech sessions.
pub trait SpeechService {
    /// Opens a session, delivering its events into the given channel.
    fn open(
        &self,
        config: StreamConfig,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<Box<dyn SpeechStream>>;
}

/// Handle to one open speech session.
pub trait SpeechStream: Send {
    /// Sends one uplink audio chunk.
    fn send_audio(&mut self, chunk: &EncodedAudioChunk) -> Result<()>;

    /// Closes the session. Idempotent.
    fn close(&mut self);
}

/// One step of a scripted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Delay before this message is delivered.
    #[serde(default)]
    pub delay_ms: u64,
    pub message: ServerMessage,
}

impl ScriptStep {
    pub fn new(delay_ms: u64, message: ServerMessage) -> Self {
        Self { delay_ms, message }
    }
}

/// Parses a JSON array of script steps.
///
/// # Errors
/// Returns `OutcallError::Decode` on malformed JSON.
pub fn parse_script(json: &str) -> Result<Vec<ScriptStep>> {
    serde_json::from_str(json).map_err(|e| OutcallError::Decode {
        message: format!("invalid call script: {}", e),
    })
}

/// Speech service that replays a canned script instead of calling out.
///
/// Each opened stream spawns a thread that emits `Opened`, the scripted
/// messages with their delays, then `Closed`. Uplink chunks are recorded
/// so tests can assert what audio would have been sent.
#[derive(Clone, Default)]
pub struct ScriptedSpeechService {
    script: Vec<ScriptStep>,
    fail_open: bool,
    sent: Arc<Mutex<Vec<EncodedAudioChunk>>>,
    opened_with: Arc<Mutex<Vec<StreamConfig>>>,
}

impl ScriptedSpeechService {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Configure the service to fail when opening a stream.
    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// All uplink chunks sent on streams opened by this service.
    pub fn sent_chunks(&self) -> Vec<EncodedAudioChunk> {
        self.sent.lock().expect("scripted service mutex poisoned").clone()
    }

    /// Configs of every stream opened so far.
    pub fn open_configs(&self) -> Vec<StreamConfig> {
        self.opened_with
            .lock()
            .expect("scripted service mutex poisoned")
            .clone()
    }
}

impl SpeechService for ScriptedSpeechService {
    fn open(
        &self,
        config: StreamConfig,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<Box<dyn SpeechStream>> {
        if self.fail_open {
            return Err(OutcallError::Transport {
                message: "scripted open failure".to_string(),
            });
        }

        self.opened_with
            .lock()
            .expect("scripted service mutex poisoned")
            .push(config);

        let cancelled = Arc::new(AtomicBool::new(false));
        let thread_cancelled = cancelled.clone();
        let script = self.script.clone();

        std::thread::spawn(move || {
            if events.blocking_send(StreamEvent::Opened).is_err() {
                return;
            }
            for step in script {
                std::thread::sleep(Duration::from_millis(step.delay_ms));
                if thread_cancelled.load(Ordering::SeqCst) {
                    return;
                }
                if events.blocking_send(StreamEvent::Message(step.message)).is_err() {
                    return;
                }
            }
            if !thread_cancelled.load(Ordering::SeqCst) {
                let _ = events.blocking_send(StreamEvent::Closed);
            }
        });

        Ok(Box::new(ScriptedSpeechStream {
            sent: self.sent.clone(),
            cancelled,
        }))
    }
}

struct ScriptedSpeechStream {
    sent: Arc<Mutex<Vec<EncodedAudioChunk>>>,
    cancelled: Arc<AtomicBool>,
}

impl SpeechStream for ScriptedSpeechStream {
    fn send_audio(&mut self, chunk: &EncodedAudioChunk) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(OutcallError::Transport {
                message: "stream is closed".to_string(),
            });
        }
        self.sent
            .lock()
            .expect("scripted service mutex poisoned")
            .push(chunk.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
