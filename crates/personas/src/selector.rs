//! Responder and banterer resolution for incoming user text.
//!
//! Resolution order: an explicit `@Name` mention wins and suppresses banter
//! entirely; a display name appearing as a plain word picks that persona and
//! nominates another as a potential banterer; otherwise the primary persona
//! responds.  Whether a nominated banterer actually speaks is decided later
//! by the session's probability draw.

use tracing::debug;
use uuid::Uuid;

use chronicle_provider::RandomSource;

use crate::persona::Persona;

#[derive(Debug)]
pub struct Selection<'a> {
    pub responder: &'a Persona,
    /// Candidate for a follow-up quip.  `None` when the user addressed a
    /// persona explicitly or no other persona exists.
    pub banterer: Option<&'a Persona>,
}

pub fn select<'a>(
    input: &str,
    personas: &'a [Persona],
    primary: &'a Persona,
    rng: &dyn RandomSource,
) -> Selection<'a> {
    let lowered = input.to_lowercase();

    // Explicit mention: the user chose, nobody else butts in.
    for persona in personas {
        if contains_word(&lowered, &format!("@{}", persona.display_name.to_lowercase())) {
            debug!(responder = %persona.display_name, "explicit mention");
            return Selection {
                responder: persona,
                banterer: None,
            };
        }
    }

    // Display name as a plain word.
    for persona in personas {
        if contains_word(&lowered, &persona.display_name.to_lowercase()) {
            debug!(responder = %persona.display_name, "name keyword");
            return Selection {
                responder: persona,
                banterer: pick_other(personas, persona.id, rng),
            };
        }
    }

    Selection {
        responder: primary,
        banterer: pick_other(personas, primary.id, rng),
    }
}

/// Case-folded substring match bounded by non-alphanumeric characters, so
/// "Gigi" matches in "tell gigi about it" but not inside "gigiometer".
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        from = end;
    }
    false
}

/// Uniformly pick any persona other than `exclude`.  Used for banter
/// partners and for the second voice in an idle dialogue.
pub fn pick_other<'a>(
    personas: &'a [Persona],
    exclude: Uuid,
    rng: &dyn RandomSource,
) -> Option<&'a Persona> {
    let others: Vec<&Persona> = personas.iter().filter(|p| p.id != exclude).collect();
    match others.len() {
        0 => None,
        1 => Some(others[0]),
        n => {
            let index = ((rng.next_f64() * n as f64) as usize).min(n - 1);
            Some(others[index])
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
