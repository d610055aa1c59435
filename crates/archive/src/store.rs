use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{JournalEntry, LifeEvent, Tag, TagPatch, Turn};

/// Durable home for everything the personas record.
///
/// The engine only ever talks to this trait; how entries are persisted (and
/// whether they are persisted at all) is the embedding application's concern.
/// Implementations must tolerate concurrent calls: daydream generation writes
/// from a background task while the foreground session reads.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Full transcript for one session owner, oldest first.  Unknown owners
    /// yield an empty transcript, not an error.
    async fn chat_history(&self, owner_id: &str) -> Result<Vec<Turn>>;

    /// Replace the stored transcript for `owner_id`.
    async fn save_chat_history(&self, owner_id: &str, turns: &[Turn]) -> Result<()>;

    /// Append a journal entry, returning it with any store-assigned fields
    /// filled in.
    async fn save_journal_entry(&self, entry: JournalEntry) -> Result<JournalEntry>;

    /// Insert the event, or replace an existing event with the same id.
    async fn create_or_update_event(&self, event: LifeEvent) -> Result<LifeEvent>;

    /// Insert the tag, or replace an existing tag with the same id.
    async fn create_or_update_tag(&self, tag: Tag) -> Result<Tag>;

    /// Apply a partial update to an existing tag.  Unknown ids are an error.
    async fn update_tag(&self, id: Uuid, patch: TagPatch) -> Result<Tag>;
}
