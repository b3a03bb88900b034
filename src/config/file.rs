//! TOML configuration file loading
//!
//! Supports `~/.config/murmur/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MurmurConfigFile {
    /// Name of the active assistant
    #[serde(default)]
    pub assistant: Option<String>,

    /// Name of the active principal (the person talking to the assistant)
    #[serde(default)]
    pub principal: Option<String>,

    /// Remote service endpoints
    #[serde(default)]
    pub services: ServicesFileConfig,

    /// Built-in voice activity detector tuning
    #[serde(default)]
    pub vad: VadFileConfig,

    /// Transcript display settings
    #[serde(default)]
    pub transcript: TranscriptFileConfig,

    /// Configured assistants
    #[serde(default)]
    pub assistants: Vec<AssistantEntry>,

    /// Configured principals
    #[serde(default)]
    pub principals: Vec<PrincipalEntry>,
}

/// Service endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServicesFileConfig {
    /// Transcription HTTP endpoint
    pub transcription_url: Option<String>,

    /// Generation websocket endpoint
    pub chat_url: Option<String>,

    /// Speech synthesis websocket endpoint
    pub speech_url: Option<String>,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Energy VAD tuning
#[derive(Debug, Default, Deserialize)]
pub struct VadFileConfig {
    pub energy_threshold: Option<f32>,
    pub min_speech_ms: Option<u64>,
    pub redemption_ms: Option<u64>,
}

/// Transcript display configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptFileConfig {
    /// Number of responses kept for display
    pub capacity: Option<usize>,
}

/// An assistant persona: a system prompt bound to a generation backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssistantEntry {
    pub name: String,
    pub prompt: String,
    /// Backend model identifier sent with each query (e.g. "chatgpt", "claude")
    pub backend: String,
}

/// A principal: who the assistant is talking to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrincipalEntry {
    pub name: String,
    pub prompt: String,
}

/// Load the TOML config file from the standard path
///
/// Returns `MurmurConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> MurmurConfigFile {
    let Some(path) = config_file_path() else {
        return MurmurConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
///
/// Returns `MurmurConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> MurmurConfigFile {
    if !path.exists() {
        return MurmurConfigFile::default();
    }

    match read_config_file(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            MurmurConfigFile::default()
        }
    }
}

/// Read and parse a TOML config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<MurmurConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/murmur/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("murmur").join("config.toml"))
}
