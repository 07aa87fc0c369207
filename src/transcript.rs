//! Transcript accumulation
//!
//! Inbound transcription arrives as append-only deltas per speaker. Deltas
//! are buffered until the remote signals a turn boundary, at which point both
//! buffers are flushed as finalized turns.

use crate::media::{Speaker, TranscriptFragment, TranscriptTurn};

/// Assembles transcript fragments into an ordered turn history
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    pending_user: String,
    pending_model: String,
    turns: Vec<TranscriptTurn>,
}

impl TranscriptAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to its speaker's pending buffer
    pub fn push(&mut self, fragment: &TranscriptFragment) {
        self.push_text(fragment.speaker, &fragment.text);
    }

    /// Append raw delta text for a speaker
    pub fn push_text(&mut self, speaker: Speaker, text: &str) {
        self.buffer_mut(speaker).push_str(text);
    }

    /// Finalize the current turn
    ///
    /// Always yields a user turn followed by a model turn, even when one side
    /// said nothing. Both pending buffers are cleared.
    pub fn complete_turn(&mut self) -> [TranscriptTurn; 2] {
        let finished = [
            TranscriptTurn {
                speaker: Speaker::User,
                text: std::mem::take(&mut self.pending_user),
            },
            TranscriptTurn {
                speaker: Speaker::Model,
                text: std::mem::take(&mut self.pending_model),
            },
        ];

        tracing::debug!(
            user_chars = finished[0].text.len(),
            model_chars = finished[1].text.len(),
            history = self.turns.len() + 2,
            "turn complete"
        );

        self.turns.extend(finished.iter().cloned());
        finished
    }

    /// Text buffered for a speaker's in-progress turn
    #[must_use]
    pub fn pending(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::User => &self.pending_user,
            Speaker::Model => &self.pending_model,
        }
    }

    /// Finalized turns in order
    #[must_use]
    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    /// Consume the accumulator, dropping any unfinished fragments
    #[must_use]
    pub fn into_turns(self) -> Vec<TranscriptTurn> {
        self.turns
    }

    fn buffer_mut(&mut self, speaker: Speaker) -> &mut String {
        match speaker {
            Speaker::User => &mut self.pending_user,
            Speaker::Model => &mut self.pending_model,
        }
    }
}
