//! In-memory [`ArchiveStore`] backed by locked maps.  Used by tests and by
//! embeddings that bring their own persistence layer later.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::entities::{JournalEntry, LifeEvent, Tag, TagPatch, Turn};
use crate::store::ArchiveStore;

#[derive(Debug, Default)]
struct ArchiveData {
    histories: HashMap<String, Vec<Turn>>,
    events: HashMap<Uuid, LifeEvent>,
    tags: HashMap<Uuid, Tag>,
    journal: Vec<JournalEntry>,
}

#[derive(Debug, Default)]
pub struct MemoryArchive {
    // std Mutex: critical sections never hold the lock across an await.
    inner: Mutex<ArchiveData>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a transcript before the session first loads it.
    pub fn seed_history(&self, owner_id: &str, turns: Vec<Turn>) {
        let mut data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        data.histories.insert(owner_id.to_string(), turns);
    }

    // ── Inspection helpers (primarily for tests) ──────────────────────────

    pub fn event(&self, id: Uuid) -> Option<LifeEvent> {
        let data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        data.events.get(&id).cloned()
    }

    pub fn tag(&self, id: Uuid) -> Option<Tag> {
        let data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        data.tags.get(&id).cloned()
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        let data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        data.journal.clone()
    }

    pub fn event_count(&self) -> usize {
        let data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        data.events.len()
    }

    pub fn tag_count(&self) -> usize {
        let data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        data.tags.len()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    async fn chat_history(&self, owner_id: &str) -> Result<Vec<Turn>> {
        let data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.histories.get(owner_id).cloned().unwrap_or_default())
    }

    async fn save_chat_history(&self, owner_id: &str, turns: &[Turn]) -> Result<()> {
        let mut data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        data.histories.insert(owner_id.to_string(), turns.to_vec());
        Ok(())
    }

    async fn save_journal_entry(&self, entry: JournalEntry) -> Result<JournalEntry> {
        let mut data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        data.journal.push(entry.clone());
        Ok(entry)
    }

    async fn create_or_update_event(&self, mut event: LifeEvent) -> Result<LifeEvent> {
        let mut data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = data.events.get(&event.id) {
            event.created_at = existing.created_at;
            event.updated_at = Utc::now();
        }
        data.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn create_or_update_tag(&self, tag: Tag) -> Result<Tag> {
        let mut data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        data.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn update_tag(&self, id: Uuid, patch: TagPatch) -> Result<Tag> {
        let mut data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tag) = data.tags.get_mut(&id) else {
            bail!("no tag with id {id}");
        };
        patch.apply(tag);
        Ok(tag.clone())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
