//! Conversation transcript aggregation.
//!
//! The streaming speech service delivers recognized speech as partial text
//! fragments, interleaved per speaker. The aggregator buffers fragments per
//! role and flushes them into complete transcript entries at turn
//! boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who said a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Human => write!(f, "human"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// One completed utterance in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Accumulates per-role text fragments and emits entries on turn boundaries.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    human_buffer: String,
    agent_buffer: String,
    log: Vec<TranscriptEntry>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a recognized fragment to the given role's pending buffer.
    ///
    /// Fragments are concatenated verbatim; the service includes its own
    /// spacing.
    pub fn push_fragment(&mut self, role: Role, fragment: &str) {
        match role {
            Role::Human => self.human_buffer.push_str(fragment),
            Role::Agent => self.agent_buffer.push_str(fragment),
        }
    }

    /// Flushes both pending buffers into the log at a turn boundary.
    ///
    /// The human entry is logged before the agent entry: in a turn exchange
    /// the human spoke first and the agent replied. Empty buffers produce no
    /// entry. Returns the entries appended by this flush.
    pub fn complete_turn(&mut self) -> Vec<TranscriptEntry> {
        let mut appended = Vec::new();
        let now = Utc::now();

        for (role, buffer) in [
            (Role::Human, &mut self.human_buffer),
            (Role::Agent, &mut self.agent_buffer),
        ] {
            if buffer.is_empty() {
                continue;
            }
            let entry = TranscriptEntry {
                role,
                text: std::mem::take(buffer),
                timestamp: now,
            };
            self.log.push(entry.clone());
            appended.push(entry);
        }

        appended
    }

    /// Text buffered for the agent since the last turn boundary.
    pub fn agent_buffer(&self) -> &str {
        &self.agent_buffer
    }

    /// Text buffered for the human since the last turn boundary.
    pub fn human_buffer(&self) -> &str {
        &self.human_buffer
    }

    /// All completed entries, in log order.
    pub fn log(&self) -> &[TranscriptEntry] {
        &self.log
    }

    /// Discards pending buffers and the completed log.
    pub fn clear(&mut self) {
        self.human_buffer.clear();
        self.agent_buffer.clear();
        self.log.clear();
    }
}
