//! Configuration management for murmur

pub mod file;

use std::time::Duration;

use crate::{Error, Result};

pub use file::{AssistantEntry, MurmurConfigFile, PrincipalEntry};

/// Default system prompt of the built-in assistant
pub const DEFAULT_ASSISTANT_PROMPT: &str =
    "Jsi asistent Myšák, který se snaží být nápomocný Adélce, osmileté holčičce.";

/// Voice client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote service endpoints
    pub services: ServicesConfig,

    /// Active assistant
    pub assistant: AssistantEntry,

    /// Active principal, if any
    pub principal: Option<PrincipalEntry>,

    /// All configured assistants
    pub assistants: Vec<AssistantEntry>,

    /// All configured principals
    pub principals: Vec<PrincipalEntry>,

    /// Built-in VAD tuning
    pub vad: VadConfig,

    /// Number of responses kept in the transcript log
    pub transcript_capacity: usize,
}

/// Remote service endpoints
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    /// Transcription HTTP endpoint
    pub transcription_url: String,

    /// Generation websocket endpoint
    pub chat_url: String,

    /// Speech synthesis websocket endpoint
    pub speech_url: String,

    /// HTTP request timeout
    pub request_timeout: Duration,
}

/// Energy VAD configuration
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS energy above which a frame counts as speech
    pub energy_threshold: f32,

    /// Segments with less voiced audio than this are misfires
    pub min_speech_ms: u64,

    /// Trailing silence that ends a segment
    pub redemption_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.03,
            min_speech_ms: 250,
            redemption_ms: 600,
        }
    }
}

impl Config {
    /// Load configuration, selecting the active assistant and principal by name
    ///
    /// # Errors
    ///
    /// Returns error if a requested assistant or principal is not configured
    pub fn load(assistant: Option<&str>, principal: Option<&str>) -> Result<Self> {
        // Load optional TOML config file (env > toml > default)
        let fc = file::load_config_file();
        Self::from_file(fc, assistant, principal)
    }

    /// Build configuration from an already-parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if a requested assistant or principal is not configured
    pub fn from_file(
        fc: MurmurConfigFile,
        assistant: Option<&str>,
        principal: Option<&str>,
    ) -> Result<Self> {
        let services = ServicesConfig {
            transcription_url: std::env::var("MURMUR_TRANSCRIPTION_URL")
                .ok()
                .or(fc.services.transcription_url)
                .unwrap_or_else(|| "http://localhost:8080/transcribe".to_string()),
            chat_url: std::env::var("MURMUR_CHAT_URL")
                .ok()
                .or(fc.services.chat_url)
                .unwrap_or_else(|| "ws://localhost:8081/chat".to_string()),
            speech_url: std::env::var("MURMUR_SPEECH_URL")
                .ok()
                .or(fc.services.speech_url)
                .unwrap_or_else(|| "ws://localhost:8082/speak".to_string()),
            request_timeout: Duration::from_secs(fc.services.request_timeout_secs.unwrap_or(30)),
        };

        let assistants = if fc.assistants.is_empty() {
            vec![default_assistant()]
        } else {
            fc.assistants
        };
        let principals = fc.principals;

        // Selection: explicit > env > toml > first configured
        let assistant_name = assistant
            .map(ToString::to_string)
            .or_else(|| std::env::var("MURMUR_ASSISTANT").ok())
            .or(fc.assistant);
        let active_assistant = match assistant_name {
            Some(name) => assistants
                .iter()
                .find(|a| a.name == name)
                .cloned()
                .ok_or_else(|| Error::Config(format!("unknown assistant: {name}")))?,
            None => assistants[0].clone(),
        };

        let principal_name = principal
            .map(ToString::to_string)
            .or_else(|| std::env::var("MURMUR_PRINCIPAL").ok())
            .or(fc.principal);
        let active_principal = principal_name
            .map(|name| {
                principals
                    .iter()
                    .find(|p| p.name == name)
                    .cloned()
                    .ok_or_else(|| Error::Config(format!("unknown principal: {name}")))
            })
            .transpose()?;

        let defaults = VadConfig::default();
        let vad = VadConfig {
            energy_threshold: fc.vad.energy_threshold.unwrap_or(defaults.energy_threshold),
            min_speech_ms: fc.vad.min_speech_ms.unwrap_or(defaults.min_speech_ms),
            redemption_ms: fc.vad.redemption_ms.unwrap_or(defaults.redemption_ms),
        };

        let transcript_capacity = fc.transcript.capacity.unwrap_or(6);
        if transcript_capacity == 0 {
            return Err(Error::Config("transcript.capacity must be at least 1".to_string()));
        }

        tracing::debug!(
            assistant = %active_assistant.name,
            principal = ?active_principal.as_ref().map(|p| &p.name),
            "configuration resolved"
        );

        Ok(Self {
            services,
            assistant: active_assistant,
            principal: active_principal,
            assistants,
            principals,
            vad,
            transcript_capacity,
        })
    }

    /// System prompt sent with every query: assistant prompt, then principal prompt
    #[must_use]
    pub fn system_prompt(&self) -> String {
        match &self.principal {
            Some(p) if !p.prompt.is_empty() => format!("{}\n\n{}", self.assistant.prompt, p.prompt),
            _ => self.assistant.prompt.clone(),
        }
    }
}

fn default_assistant() -> AssistantEntry {
    AssistantEntry {
        name: "Myšák".to_string(),
        prompt: DEFAULT_ASSISTANT_PROMPT.to_string(),
        backend: "chatgpt".to_string(),
    }
}
