//! Streaming call sessions.

pub mod controller;
pub mod stream;

pub use controller::{CallController, CallState};
pub use stream::{
    ScriptStep, ScriptedSpeechService, ServerMessage, SpeechService, SpeechStream, StreamConfig,
    StreamEvent,
};
