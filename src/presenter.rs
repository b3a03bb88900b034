//! Presentation of transcript and detector state

use std::collections::VecDeque;
use std::fmt;

/// Transcript text shown when an utterance could not be processed
pub const FAILURE_TEXT: &str = "Nepodarilo se";

/// Phase label shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Waiting,
    InSpeech,
    Transcription,
    Thinking,
    Streaming,
    /// Reply text is complete, audio is still arriving
    Speaking,
    Failed,
}

impl DetectorState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::InSpeech => "in_speech",
            Self::Transcription => "transcription",
            Self::Thinking => "thinking",
            Self::Streaming => "streaming",
            Self::Speaking => "speaking",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DetectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Receives transcript and state updates from the lifecycle
pub trait Presenter {
    /// Start a new transcript entry at the front of the log
    fn add_transcript_entry(&mut self, text: &str);

    /// Replace the text of the newest entry
    fn update_transcript_entry(&mut self, text: &str);

    /// Show the current phase
    fn set_detector_state(&mut self, state: DetectorState);
}

/// Bounded list of responses, newest first
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl TranscriptLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Insert at the front, dropping the oldest entry when full
    pub fn add(&mut self, text: &str) {
        self.entries.push_front(text.to_string());
        self.entries.truncate(self.capacity);
    }

    /// Update the newest entry in place
    pub fn update(&mut self, text: &str) {
        match self.entries.front_mut() {
            Some(front) => text.clone_into(front),
            None => self.add(text),
        }
    }

    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.entries.front().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Presenter for the terminal
///
/// Keeps the transcript log and prints each response once its utterance
/// has settled back to waiting.
pub struct ConsolePresenter {
    log: TranscriptLog,
    state: DetectorState,
    unprinted: bool,
}

impl ConsolePresenter {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            log: TranscriptLog::new(capacity),
            state: DetectorState::Waiting,
            unprinted: false,
        }
    }

    #[must_use]
    pub const fn log(&self) -> &TranscriptLog {
        &self.log
    }
}

impl Presenter for ConsolePresenter {
    fn add_transcript_entry(&mut self, text: &str) {
        self.log.add(text);
        self.unprinted = true;
    }

    fn update_transcript_entry(&mut self, text: &str) {
        self.log.update(text);
        self.unprinted = true;
        tracing::trace!(len = text.len(), "transcript updated");
    }

    fn set_detector_state(&mut self, state: DetectorState) {
        if state == self.state {
            return;
        }
        tracing::info!(state = %state, "detector state");
        self.state = state;

        if state == DetectorState::Waiting && self.unprinted {
            if let Some(latest) = self.log.latest() {
                println!("{latest}");
            }
            self.unprinted = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_newest_first_and_bounded() {
        let mut log = TranscriptLog::new(3);
        for text in ["a", "b", "c", "d"] {
            log.add(text);
        }

        assert_eq!(log.entries().collect::<Vec<_>>(), vec!["d", "c", "b"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_update_in_place() {
        let mut log = TranscriptLog::new(6);
        log.add("older");
        log.add("");
        log.update("Hi");
        log.update("Hi there.");

        assert_eq!(log.entries().collect::<Vec<_>>(), vec!["Hi there.", "older"]);
    }

    #[test]
    fn test_update_on_empty_log_adds() {
        let mut log = TranscriptLog::new(6);
        log.update("first");
        assert_eq!(log.latest(), Some("first"));
    }

    #[test]
    fn test_labels() {
        assert_eq!(DetectorState::InSpeech.to_string(), "in_speech");
        assert_eq!(DetectorState::Transcription.label(), "transcription");
        assert_eq!(DetectorState::Waiting.label(), "waiting");
    }

    #[test]
    fn test_console_presenter_tracks_log() {
        let mut presenter = ConsolePresenter::new(2);
        presenter.add_transcript_entry("");
        presenter.update_transcript_entry("Ahoj.");
        presenter.set_detector_state(DetectorState::Waiting);

        assert_eq!(presenter.log().latest(), Some("Ahoj."));
    }
}
