use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Conversation turns ────────────────────────────────────────────────────────

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    System,
}

impl Role {
    /// Canonical display label used in prompt transcripts and log lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

/// Opaque payload attached to a user turn (e.g. a scanned photo).  The engine
/// forwards it without interpreting the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    pub data: Vec<u8>,
}

/// One entry in a session transcript.  Turns are append-only: nothing in the
/// engine mutates or reorders a turn once it has been recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// Set on agent turns so multi-persona transcripts stay attributable.
    #[serde(default)]
    pub author_persona_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachment: None,
            author_persona_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn agent(content: impl Into<String>, author: Uuid) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            attachment: None,
            author_persona_id: Some(author),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            attachment: None,
            author_persona_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

// ── Life events ───────────────────────────────────────────────────────────────

/// A dated happening in the subject's life story, linked to the tags
/// (people, places, themes) it involves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifeEvent {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub occurred_on: Option<NaiveDate>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LifeEvent {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            occurred_on: None,
            tag_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// First 8 characters of the UUID, used as a compact record reference in
    /// chat confirmations.
    pub fn id_short(&self) -> String {
        self.id.to_string()[..8].to_string()
    }
}

// ── Tags ──────────────────────────────────────────────────────────────────────

/// What a tag tracks.
///
/// | Kind    | Purpose                                      |
/// |---------|----------------------------------------------|
/// | `Person`| Someone in the subject's life                |
/// | `Place` | A location events happened at                |
/// | `Theme` | A recurring thread (career, faith, illness)  |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    #[default]
    Person,
    Place,
    Theme,
}

impl TagKind {
    /// Parse a kind from its label (case-insensitive).  Accepts the values a
    /// model is likely to produce in tool arguments.
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "person" | "people" => Some(Self::Person),
            "place" | "location" => Some(Self::Place),
            "theme" | "topic" => Some(Self::Theme),
            _ => None,
        }
    }
}

/// A tracked person, place, or theme referenced by life events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub kind: TagKind,
    #[serde(default)]
    pub notes: String,
    /// Meaningful for `Person` tags only.  Drives the condolence-first rule
    /// in composed instructions.
    #[serde(default)]
    pub deceased: bool,
}

impl Tag {
    pub fn new(name: impl Into<String>, kind: TagKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            notes: String::new(),
            deceased: false,
        }
    }

    pub fn id_short(&self) -> String {
        self.id.to_string()[..8].to_string()
    }
}

/// Partial update applied to an existing tag.  `None` fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagPatch {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub deceased: Option<bool>,
}

impl TagPatch {
    pub fn apply(&self, tag: &mut Tag) {
        if let Some(name) = &self.name {
            tag.name = name.clone();
        }
        if let Some(notes) = &self.notes {
            tag.notes = notes.clone();
        }
        if let Some(deceased) = self.deceased {
            tag.deceased = deceased;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.notes.is_none() && self.deceased.is_none()
    }
}

// ── Journal entries ───────────────────────────────────────────────────────────

/// Reflective prose written by a persona: commanded journal entries, idle
/// reflections, and two-persona dialogues all land here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
    #[serde(default)]
    pub author_persona_id: Option<Uuid>,
    /// Long-form chapter rather than a short entry.
    #[serde(default)]
    pub chapter: bool,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: None,
            body: body.into(),
            author_persona_id: None,
            chapter: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: Uuid) -> Self {
        self.author_persona_id = Some(author);
        self
    }

    pub fn as_chapter(mut self) -> Self {
        self.chapter = true;
        self
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
