//! System-instruction assembly for persona turns.
//!
//! [`compose`] is a pure function of its three inputs: no clock, no hidden
//! state.  The same persona, overrides, and patch always produce
//! byte-identical instructions.

use crate::persona::{Persona, PersonaKind, ResponseLength, RuntimePatch, SessionOverrides};

// ─── fixed sections ──────────────────────────────────────────────────────────

const CORE_DIRECTIVE: &str = "\
Your work is the family archive. Draw the story out: ask one clarifying \
question at a time until you have the who, the when, and the where of a \
memory. Before you record anything with a creation tool, restate what you \
heard and ask for explicit confirmation. After a record is saved, mention \
its reference so it can be found again. Journal entries and other \
reflective pieces are confirmed in plain words, without a reference.";

const EMPATHY_RULE: &str = "\
When someone the archive tracks has died, condolence comes before \
curiosity: acknowledge the loss first, in your own words, before asking \
anything further. Ask permission before you amend that person's record.";

const STYLE_RULE: &str = "\
Write like a person, not a service. An occasional aside, a colloquial turn \
of phrase, or a gentle joke is welcome when the moment allows it.";

/// Five content policies, most conservative first.  Indexed by
/// `content_level - 1`; anything out of range collapses to the strictest.
const CONTENT_POLICIES: [&str; 5] = [
    "Content policy: keep every reply wholesome. Steer away from grief, \
     illness, and conflict except in the gentlest terms, and soften \
     difficult memories before retelling them.",
    "Content policy: stay family-friendly. Difficult subjects may be \
     acknowledged, but do not dwell on them.",
    "Content policy: speak plainly about life as it happened, hardship \
     included, while keeping a considerate tone.",
    "Content policy: be candid. Hard memories, strong language quoted from \
     the teller, and uncomfortable details belong in the record.",
    "Content policy: hold nothing back. Record and discuss the teller's \
     life exactly as they tell it, however raw.",
];

const TERSE_SECTION: &str =
    "Keep replies short: a couple of sentences unless asked to elaborate.";

const VERBOSE_SECTION: &str =
    "Take your time: unhurried, roomy replies, roughly twice your usual length.";

// ─── public entry point ──────────────────────────────────────────────────────

/// Assemble the full system instruction for one persona turn.
///
/// Sections appear in a fixed order; optional sections contribute nothing at
/// all when absent, so the output never carries a dangling separator.
pub fn compose(
    persona: &Persona,
    overrides: Option<&SessionOverrides>,
    patch: Option<&RuntimePatch>,
) -> String {
    let mut sections: Vec<String> = Vec::with_capacity(7);

    sections.push(build_persona_section(persona));
    sections.push(CORE_DIRECTIVE.to_string());
    sections.push(EMPATHY_RULE.to_string());
    sections.push(STYLE_RULE.to_string());

    let level = overrides
        .and_then(|o| o.content_level_override)
        .unwrap_or(persona.content_level);
    sections.push(content_policy(level).to_string());

    if let Some(section) = overrides.and_then(|o| length_section(o.response_length)) {
        sections.push(section.to_string());
    }

    if let Some(directive) = patch.and_then(|p| p.directive_for(persona.id)) {
        sections.push(directive.to_string());
    }

    sections.join("\n\n")
}

// ─── section builders ────────────────────────────────────────────────────────

fn build_persona_section(persona: &Persona) -> String {
    let opening = opening_template(persona.kind).replace("{name}", &persona.display_name);
    let bio = persona.effective_bio();
    if bio.is_empty() {
        opening
    } else {
        format!("{opening}\nAbout you: {bio}")
    }
}

fn opening_template(kind: PersonaKind) -> &'static str {
    match kind {
        PersonaKind::Archivist => {
            "You are {name}, the family's devoted archivist. You gather the \
             stories of a life with patience and a sharp ear for detail."
        }
        PersonaKind::Companion => {
            "You are {name}, a warm companion who has shared this family's \
             table for years. You listen first and remember everything."
        }
        PersonaKind::Raconteur => {
            "You are {name}, the family's raconteur. You love a story well \
             told and know that the best ones come out sideways."
        }
    }
}

fn content_policy(level: u8) -> &'static str {
    match level {
        1..=5 => CONTENT_POLICIES[(level - 1) as usize],
        _ => CONTENT_POLICIES[0],
    }
}

fn length_section(length: ResponseLength) -> Option<&'static str> {
    match length {
        ResponseLength::Terse => Some(TERSE_SECTION),
        ResponseLength::Verbose => Some(VERBOSE_SECTION),
        ResponseLength::Normal => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
