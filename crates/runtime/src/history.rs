//! In-memory session transcript and its projection into provider messages.
//!
//! The transcript is append-only for the lifetime of the session.  Only a
//! trailing window of it is ever sent to the provider; the full transcript
//! is what gets persisted back to the archive.

use chronicle_archive::{Role, Turn};
use chronicle_provider::ChatMessage;

/// Append-only transcript for one session.
#[derive(Debug, Clone, Default)]
pub struct TurnHistory {
    turns: Vec<Turn>,
}

impl TurnHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Trailing window of at most `window` turns, oldest first.
    pub fn recent(&self, window: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    /// Provider-facing projection of the trailing window.  Agent turns map
    /// to the assistant role regardless of which persona authored them; the
    /// instruction names the speaking persona, not the message stream.
    pub fn to_messages(&self, window: usize) -> Vec<ChatMessage> {
        self.recent(window)
            .iter()
            .map(|turn| {
                let content = render_content(turn);
                match turn.role {
                    Role::User => ChatMessage::user(content),
                    Role::Agent => ChatMessage::assistant(content),
                    Role::System => ChatMessage::system(content),
                }
            })
            .collect()
    }
}

/// Attachments travel to the provider as a bracketed note, never as raw
/// bytes.  The archive keeps the bytes; the model only needs to know the
/// attachment exists.
fn render_content(turn: &Turn) -> String {
    match &turn.attachment {
        Some(attachment) => {
            let note = format!(
                "[attached: {} ({}, {} bytes)]",
                attachment.name,
                attachment.mime,
                attachment.data.len()
            );
            if turn.content.is_empty() {
                note
            } else {
                format!("{}\n{note}", turn.content)
            }
        }
        None => turn.content.clone(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
