use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::defaults;
use crate::session::StreamConfig;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub audio: AudioConfig,
    pub product: ProductConfig,
}

/// Speech agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    pub voice: String,
}

/// Audio device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    /// Play agent audio; disable for headless/simulated runs.
    pub playback: Option<bool>,
}

/// What the agent is selling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProductConfig {
    pub name: String,
    pub pitch: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
        }
    }
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            name: "our product".to_string(),
            pitch: "introduce our product and gauge interest".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    panic!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - OUTCALL_MODEL → agent.model
    /// - OUTCALL_VOICE → agent.voice
    /// - OUTCALL_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("OUTCALL_MODEL")
            && !model.is_empty()
        {
            self.agent.model = model;
        }

        if let Ok(voice) = std::env::var("OUTCALL_VOICE")
            && !voice.is_empty()
        {
            self.agent.voice = voice;
        }

        if let Ok(device) = std::env::var("OUTCALL_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Session parameters for a call opened under this configuration.
    pub fn stream_template(&self) -> StreamConfig {
        StreamConfig {
            model: self.agent.model.clone(),
            voice: self.agent.voice.clone(),
            ..StreamConfig::default()
        }
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/outcall/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> std::path::PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("outcall")
            .join("config.toml")
    }
}
