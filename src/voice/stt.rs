//! Speech-to-text over the transcription service

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Transcript of one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
}

impl Transcription {
    /// Whether the transcript contains anything worth answering
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Converts captured utterance audio into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe mono 16 kHz samples
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` if the service reports failure
    async fn transcribe(&self, samples: Vec<f32>) -> Result<Transcription>;
}

#[derive(serde::Serialize)]
struct TranscribeRequest<'a> {
    audio: &'a str,
}

/// Response body of the transcription service
#[derive(serde::Deserialize)]
struct TranscribeResponse {
    status: String,
    #[serde(default)]
    text: String,
}

/// Transcriber backed by the HTTP transcription service
pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
}

impl HttpTranscriber {
    /// Create a transcriber posting to `url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, samples: Vec<f32>) -> Result<Transcription> {
        tracing::debug!(samples = samples.len(), "starting transcription");

        let audio = encode_samples(&samples);
        let response = self
            .client
            .post(&self.url)
            .json(&TranscribeRequest { audio: &audio })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription service error");
            return Err(Error::Transcription(format!("http {status}: {body}")));
        }

        let result: TranscribeResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            e
        })?;

        into_transcription(result)
    }
}

fn into_transcription(response: TranscribeResponse) -> Result<Transcription> {
    if response.status != "success" {
        return Err(Error::Transcription(format!(
            "service status {}",
            response.status
        )));
    }

    tracing::info!(transcript = %response.text, "transcription complete");
    Ok(Transcription {
        text: response.text,
    })
}

/// Base64 of the raw little-endian f32 samples
#[must_use]
pub fn encode_samples(samples: &[f32]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}
