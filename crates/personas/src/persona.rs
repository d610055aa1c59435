use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Persona ───────────────────────────────────────────────────────────────────

/// Voice archetype a persona is built on.  The composer keys its opening
/// template off this; anything it doesn't recognise collapses to the
/// default kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaKind {
    #[default]
    Archivist,
    Companion,
    Raconteur,
}

impl PersonaKind {
    /// Parse a kind from config text (case-insensitive).  Unknown labels fall
    /// back to the default kind rather than failing.
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "archivist" => Self::Archivist,
            "companion" => Self::Companion,
            "raconteur" | "storyteller" => Self::Raconteur,
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub display_name: String,
    pub kind: PersonaKind,
    pub bio: String,
    /// 1 (most conservative) to 5 (most candid).
    pub content_level: u8,
    pub is_primary: bool,
    /// Operator-supplied replacement bio applied at runtime without touching
    /// the stored persona.
    #[serde(default)]
    pub runtime_bio: Option<String>,
}

impl Persona {
    pub fn new(display_name: impl Into<String>, kind: PersonaKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            kind,
            bio: String::new(),
            content_level: 2,
            is_primary: false,
            runtime_bio: None,
        }
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    pub fn with_content_level(mut self, level: u8) -> Self {
        self.content_level = level;
        self
    }

    pub fn as_primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// The bio composed instructions actually use.
    pub fn effective_bio(&self) -> &str {
        self.runtime_bio.as_deref().unwrap_or(&self.bio)
    }
}

// ── Session overrides ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    Terse,
    #[default]
    Normal,
    Verbose,
}

impl ResponseLength {
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terse" => Some(Self::Terse),
            "normal" => Some(Self::Normal),
            "verbose" => Some(Self::Verbose),
            _ => None,
        }
    }
}

/// Session-scoped knobs the user adjusts through directives.  Reset when the
/// session restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOverrides {
    pub response_length: ResponseLength,
    /// When set, wins over the persona's own content level.
    pub content_level_override: Option<u8>,
}

// ── Runtime patch ─────────────────────────────────────────────────────────────

/// Per-persona directive lines injected verbatim at composition time.
/// Hosts build one and hand it to the session; the engine only reads it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimePatch {
    directives: HashMap<Uuid, String>,
}

impl RuntimePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, persona_id: Uuid, directive: impl Into<String>) {
        self.directives.insert(persona_id, directive.into());
    }

    pub fn directive_for(&self, persona_id: Uuid) -> Option<&str> {
        self.directives.get(&persona_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
