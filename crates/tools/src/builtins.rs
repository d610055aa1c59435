//! The archival tools offered to personas during a session.
//!
//! Every executor here is fallible in ordinary ways (bad arguments from the
//! model, store errors) and none of that may abort a conversation: the
//! registry catches `Err` and feeds it back to the model as an error result.

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Value, json};
use uuid::Uuid;

use chronicle_archive::{ArchiveStore, JournalEntry, LifeEvent, Tag, TagKind, TagPatch};
use chronicle_provider::{ChatMessage, CompletionRequest, GenerationProvider, RetryPolicy};

use crate::{ParamType, Tool, ToolParam, ToolSpec};

// ── Argument helpers ─────────────────────────────────────────────────────────

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    optional_str(args, key).ok_or_else(|| anyhow!("missing required param: {key}"))
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn optional_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

fn parse_id(value: &str, key: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).map_err(|_| anyhow!("{key} is not a valid id: {value}"))
}

// ── save_event ───────────────────────────────────────────────────────────────

/// Creates a life event, or replaces one when the model passes `event_id`.
pub struct SaveEventTool {
    pub archive: Arc<dyn ArchiveStore>,
}

#[async_trait]
impl Tool for SaveEventTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "save_event".to_string(),
            description: "Record a life event in the archive. Ask the user to confirm the \
                          details before calling this."
                .to_string(),
            params: vec![
                ToolParam::required("title", "Short title for the event"),
                ToolParam::required("description", "What happened, in the user's own words"),
                ToolParam::optional("occurred_on", "Date the event happened, YYYY-MM-DD"),
                ToolParam::optional("tag_ids", "Ids of tags (people, places, themes) involved")
                    .with_type(ParamType::Array),
                ToolParam::optional("event_id", "Id of an existing event to update"),
            ],
        }
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let title = required_str(args, "title")?;
        let description = required_str(args, "description")?;

        let mut event = LifeEvent::new(title, description);
        if let Some(id) = optional_str(args, "event_id") {
            event.id = parse_id(id, "event_id")?;
        }
        if let Some(date) = optional_str(args, "occurred_on") {
            let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| anyhow!("occurred_on must be YYYY-MM-DD, got: {date}"))?;
            event.occurred_on = Some(parsed);
        }
        if let Some(ids) = args.get("tag_ids").and_then(Value::as_array) {
            for id in ids.iter().filter_map(Value::as_str) {
                event.tag_ids.push(parse_id(id, "tag_ids")?);
            }
        }

        let saved = self.archive.create_or_update_event(event).await?;
        Ok(json!({
            "event_id": saved.id,
            "reference": saved.id_short(),
        }))
    }
}

// ── save_tag ─────────────────────────────────────────────────────────────────

/// Creates a person/place/theme tag, or replaces one by id.
pub struct SaveTagTool {
    pub archive: Arc<dyn ArchiveStore>,
}

#[async_trait]
impl Tool for SaveTagTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "save_tag".to_string(),
            description: "Track a person, place, or theme from the user's story. Ask the \
                          user to confirm before calling this."
                .to_string(),
            params: vec![
                ToolParam::required("name", "Name of the person, place, or theme"),
                ToolParam::required("kind", "What this tag tracks")
                    .one_of(&["person", "place", "theme"]),
                ToolParam::optional("notes", "Anything worth remembering about it"),
                ToolParam::optional("deceased", "Whether this person has died")
                    .with_type(ParamType::Boolean),
                ToolParam::optional("tag_id", "Id of an existing tag to update"),
            ],
        }
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let name = required_str(args, "name")?;
        let kind_label = required_str(args, "kind")?;
        let kind = TagKind::from_label(kind_label)
            .ok_or_else(|| anyhow!("unknown tag kind: {kind_label}"))?;

        let mut tag = Tag::new(name, kind);
        if let Some(id) = optional_str(args, "tag_id") {
            tag.id = parse_id(id, "tag_id")?;
        }
        if let Some(notes) = optional_str(args, "notes") {
            tag.notes = notes.to_string();
        }
        if let Some(deceased) = optional_bool(args, "deceased") {
            tag.deceased = deceased;
        }

        let saved = self.archive.create_or_update_tag(tag).await?;
        Ok(json!({
            "tag_id": saved.id,
            "reference": saved.id_short(),
        }))
    }
}

// ── amend_tag ────────────────────────────────────────────────────────────────

/// Partial update of an existing tag.  Only the fields the model passes
/// change; an empty amendment is rejected.
pub struct AmendTagTool {
    pub archive: Arc<dyn ArchiveStore>,
}

#[async_trait]
impl Tool for AmendTagTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "amend_tag".to_string(),
            description: "Amend an existing tag's record. Ask the user's permission before \
                          marking a person as deceased."
                .to_string(),
            params: vec![
                ToolParam::required("tag_id", "Id of the tag to amend"),
                ToolParam::optional("name", "Corrected name"),
                ToolParam::optional("notes", "Replacement notes"),
                ToolParam::optional("deceased", "Whether this person has died")
                    .with_type(ParamType::Boolean),
            ],
        }
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let id = parse_id(required_str(args, "tag_id")?, "tag_id")?;

        let patch = TagPatch {
            name: optional_str(args, "name").map(str::to_string),
            notes: optional_str(args, "notes").map(str::to_string),
            deceased: optional_bool(args, "deceased"),
        };
        if patch.is_empty() {
            bail!("nothing to amend: pass at least one of name, notes, deceased");
        }

        let updated = self.archive.update_tag(id, patch).await?;
        Ok(json!({
            "tag_id": updated.id,
            "reference": updated.id_short(),
        }))
    }
}

// ── write_journal_entry ──────────────────────────────────────────────────────

/// Writes reflective prose to the journal.  The payload deliberately carries
/// no record reference: journal entries are confirmed in plain words.
pub struct WriteJournalEntryTool {
    pub archive: Arc<dyn ArchiveStore>,
    /// Attributed author for entries written mid-conversation.
    pub default_author: Option<Uuid>,
}

#[async_trait]
impl Tool for WriteJournalEntryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "write_journal_entry".to_string(),
            description: "Write a reflective journal entry about the conversation. Confirm \
                          to the user in plain words afterwards, without quoting any \
                          reference number."
                .to_string(),
            params: vec![
                ToolParam::required("body", "The entry itself, written in first person"),
                ToolParam::optional("title", "Optional title"),
                ToolParam::optional("chapter", "Long-form chapter rather than a short entry")
                    .with_type(ParamType::Boolean),
            ],
        }
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let body = required_str(args, "body")?;

        let mut entry = JournalEntry::new(body);
        if let Some(title) = optional_str(args, "title") {
            entry = entry.with_title(title);
        }
        if optional_bool(args, "chapter").unwrap_or(false) {
            entry = entry.as_chapter();
        }
        if let Some(author) = self.default_author {
            entry = entry.with_author(author);
        }

        let saved = self.archive.save_journal_entry(entry).await?;
        Ok(json!({
            "recorded": true,
            "chapter": saved.chapter,
        }))
    }
}

// ── inner_voice ──────────────────────────────────────────────────────────────

const INNER_VOICE_INSTRUCTION: &str = "You are the private inner voice of an archivist \
    listening to someone tell their life story. Reflect honestly on the thought you are \
    given: what it might mean, what to ask next, what to be careful about. The user will \
    never see this. Reply with the reflection only.";

/// Reflection sub-call: runs its own retry-wrapped single-shot completion and
/// returns the private reflection as the payload.
pub struct InnerVoiceTool {
    pub provider: Arc<dyn GenerationProvider>,
    pub retry: RetryPolicy,
}

#[async_trait]
impl Tool for InnerVoiceTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "inner_voice".to_string(),
            description: "Think something over privately before answering. The user never \
                          sees the reflection."
                .to_string(),
            params: vec![ToolParam::required("thought", "What to reflect on")],
        }
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let thought = required_str(args, "thought")?;

        let request = CompletionRequest {
            system_instruction: INNER_VOICE_INSTRUCTION.to_string(),
            messages: vec![ChatMessage::user(thought)],
            tool_catalog: None,
            generation: None,
        };
        let response = self
            .retry
            .execute("inner_voice", || self.provider.complete(request.clone()))
            .await?;

        let reflection = response.text.unwrap_or_default();
        if reflection.trim().is_empty() {
            bail!("the reflection came back empty");
        }
        Ok(json!({ "reflection": reflection }))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
