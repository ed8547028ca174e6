//! The shared, append-only conversation log: human utterances, bot
//! utterances, and action start/finish records, in causal order (spec §3,
//! §5 "Shared state").
//!
//! Single-writer by construction — one conversation runs one agent task, so
//! this carries no internal locking, the same invariant the teacher documents
//! for its own `Transcript`/`Segment` shape in `crates/transcript/src/lib.rs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TranscriptEntry {
    Human {
        conversation_id: String,
        text: String,
        confidence: f32,
        at: DateTime<Utc>,
    },
    Bot {
        conversation_id: String,
        text: String,
        at: DateTime<Utc>,
    },
    ActionStart {
        conversation_id: String,
        action_name: String,
        params: serde_json::Value,
        at: DateTime<Utc>,
    },
    ActionFinish {
        conversation_id: String,
        action_name: String,
        response: serde_json::Value,
        at: DateTime<Utc>,
    },
}

/// Append-only conversation log, owned by the conversation supervisor and
/// borrowed by the agent for read and append (spec §3 "Transcript").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: Uuid,
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            entries: Vec::new(),
        }
    }

    pub fn append_human(&mut self, conversation_id: impl Into<String>, text: impl Into<String>, confidence: f32) {
        self.entries.push(TranscriptEntry::Human {
            conversation_id: conversation_id.into(),
            text: text.into(),
            confidence,
            at: Utc::now(),
        });
    }

    pub fn append_bot(&mut self, conversation_id: impl Into<String>, text: impl Into<String>) {
        self.entries.push(TranscriptEntry::Bot {
            conversation_id: conversation_id.into(),
            text: text.into(),
            at: Utc::now(),
        });
    }

    pub fn append_action_start(
        &mut self,
        conversation_id: impl Into<String>,
        action_name: impl Into<String>,
        params: serde_json::Value,
    ) {
        self.entries.push(TranscriptEntry::ActionStart {
            conversation_id: conversation_id.into(),
            action_name: action_name.into(),
            params,
            at: Utc::now(),
        });
    }

    pub fn append_action_finish(
        &mut self,
        conversation_id: impl Into<String>,
        action_name: impl Into<String>,
        response: serde_json::Value,
    ) {
        self.entries.push(TranscriptEntry::ActionFinish {
            conversation_id: conversation_id.into(),
            action_name: action_name.into(),
            response,
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn human_entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e, TranscriptEntry::Human { .. }))
    }

    pub fn bot_entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e, TranscriptEntry::Bot { .. }))
    }

    /// Overwrite the text of the most recent bot entry — used to repair the
    /// transcript on barge-in once `message_up_to` reports how much of the
    /// bot's message the caller actually heard (spec §3 completion_tracker
    /// invariant).
    pub fn repair_last_bot_entry(&mut self, heard_text: String) {
        if let Some(TranscriptEntry::Bot { text, .. }) = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| matches!(e, TranscriptEntry::Bot { .. }))
        {
            *text = heard_text;
        }
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_entry_precedes_derived_bot_entry() {
        let mut transcript = Transcript::new();
        transcript.append_human("c1", "hello", 0.95);
        transcript.append_bot("c1", "Hi there.");

        let kinds: Vec<&str> = transcript
            .entries()
            .iter()
            .map(|e| match e {
                TranscriptEntry::Human { .. } => "human",
                TranscriptEntry::Bot { .. } => "bot",
                TranscriptEntry::ActionStart { .. } => "action_start",
                TranscriptEntry::ActionFinish { .. } => "action_finish",
            })
            .collect();
        assert_eq!(kinds, vec!["human", "bot"]);
    }

    #[test]
    fn final_transcription_yields_exactly_one_human_entry() {
        let mut transcript = Transcript::new();
        transcript.append_human("c1", "hello", 0.95);
        transcript.append_bot("c1", "Hi there.");
        transcript.append_bot("c1", "How can I help?");

        assert_eq!(transcript.human_entries().count(), 1);
        assert_eq!(transcript.bot_entries().count(), 2);
    }

    #[test]
    fn repair_last_bot_entry_rewrites_heard_prefix() {
        let mut transcript = Transcript::new();
        transcript.append_human("c1", "hello", 0.95);
        transcript.append_bot("c1", "How can I help you today?");
        transcript.repair_last_bot_entry("How can I".to_string());

        let TranscriptEntry::Bot { text, .. } = transcript.entries().last().unwrap() else {
            panic!("expected bot entry");
        };
        assert_eq!(text, "How can I");
    }

    #[test]
    fn action_start_precedes_action_finish() {
        let mut transcript = Transcript::new();
        transcript.append_action_start("c1", "lookup", serde_json::json!({}));
        transcript.append_action_finish("c1", "lookup", serde_json::json!({"ok": true}));
        assert_eq!(transcript.entries().len(), 2);
    }
}
