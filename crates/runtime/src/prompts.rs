//! Prompt text for single-shot generations that bypass the tool loop:
//! commanded journal entries, idle reflections, two-persona dialogues, and
//! banter follow-ups.  Each builder returns the user-message content; the
//! system instruction always comes from the persona composer.

use chronicle_archive::{Role, Turn};
use chronicle_personas::Persona;

/// Per-turn cap inside transcript blocks.  Long pastes and tool-heavy
/// replies would otherwise crowd the actual task out of the prompt.
const TURN_SNIPPET_CHARS: usize = 300;

pub fn journal_prompt(topic: Option<&str>, chapter: bool, recent: &[Turn], personas: &[Persona]) -> String {
    let form = if chapter {
        "Write a long-form chapter for the archive's journal: several paragraphs with a beginning and an end."
    } else {
        "Write a short journal entry for the archive: a paragraph or two."
    };
    let focus = match topic {
        Some(topic) => format!("Centre it on: {topic}."),
        None => "Centre it on whatever matters most in the recent conversation.".to_string(),
    };
    format!(
        "{form}\n{focus}\nWrite in first person, in your own voice. Output the entry text only.\n\n\
         RECENT CONVERSATION:\n{}\n\nJOURNAL ENTRY:",
        transcript_block(recent, personas)
    )
}

pub fn reflection_prompt(recent: &[Turn], personas: &[Persona]) -> String {
    format!(
        "The user has stepped away. Write a private reflection on the conversation so far: \
         what was said, what it might mean, what you want to ask when they return.\n\
         Write in first person. Output the reflection only.\n\n\
         RECENT CONVERSATION:\n{}\n\nREFLECTION:",
        transcript_block(recent, personas)
    )
}

/// The composed instruction only covers the first persona, so the second
/// one is introduced here in the prompt itself.
pub fn dialogue_prompt(first: &Persona, second: &Persona, recent: &[Turn], personas: &[Persona]) -> String {
    let partner = if second.effective_bio().is_empty() {
        String::new()
    } else {
        format!("About {}: {}\n", second.display_name, second.effective_bio())
    };
    format!(
        "The user has stepped away. Write a short exchange between {} and {} as they talk over \
         the conversation so far: what stood out, what to bring up when the user returns.\n\
         {partner}Format every line as \"Name: line\". Keep it to six lines or fewer. Output the exchange only.\n\n\
         RECENT CONVERSATION:\n{}\n\nEXCHANGE:",
        first.display_name,
        second.display_name,
        transcript_block(recent, personas)
    )
}

pub fn banter_prompt(recent: &[Turn], personas: &[Persona]) -> String {
    format!(
        "Add one short follow-up remark of your own to the conversation below. React to what was \
         just said; do not repeat it. Output the remark only.\n\n\
         RECENT CONVERSATION:\n{}\n\nREMARK:",
        transcript_block(recent, personas)
    )
}

/// Labelled transcript lines, one per turn, each capped so a single long
/// turn cannot dominate the prompt.  Agent turns are labelled with the
/// authoring persona's name when it is still on the roster.
fn transcript_block(turns: &[Turn], personas: &[Persona]) -> String {
    if turns.is_empty() {
        return "(none yet)".to_string();
    }
    turns
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::Agent => turn
                    .author_persona_id
                    .and_then(|id| personas.iter().find(|p| p.id == id))
                    .map(|p| p.display_name.clone())
                    .unwrap_or_else(|| "Agent".to_string()),
                Role::User => "User".to_string(),
                Role::System => "System".to_string(),
            };
            format!(
                "{speaker}: {}",
                truncate_for_prompt(&turn.content, TURN_SNIPPET_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn truncate_for_prompt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_personas::PersonaKind;

    fn roster() -> Vec<Persona> {
        vec![
            Persona::new("Gigi", PersonaKind::Archivist).as_primary(),
            Persona::new("June", PersonaKind::Companion),
        ]
    }

    #[test]
    fn transcript_labels_turns_by_author() {
        let personas = roster();
        let turns = vec![
            Turn::user("hello"),
            Turn::agent("hi there", personas[0].id),
            Turn::agent("me too", personas[1].id),
            Turn::system("settings updated"),
        ];
        let block = transcript_block(&turns, &personas);
        assert_eq!(
            block,
            "User: hello\nGigi: hi there\nJune: me too\nSystem: settings updated"
        );
    }

    #[test]
    fn transcript_falls_back_for_unknown_author() {
        let personas = roster();
        let turns = vec![Turn::agent("orphaned", uuid::Uuid::new_v4())];
        assert_eq!(transcript_block(&turns, &personas), "Agent: orphaned");
    }

    #[test]
    fn empty_transcript_has_placeholder() {
        assert_eq!(transcript_block(&[], &roster()), "(none yet)");
    }

    #[test]
    fn long_turns_are_capped() {
        let personas = roster();
        let turns = vec![Turn::user("x".repeat(1_000))];
        let block = transcript_block(&turns, &personas);
        assert!(block.chars().count() < 400);
        assert!(block.ends_with('…'));
    }

    #[test]
    fn truncate_respects_multibyte_boundaries() {
        let text = "délire délire délire";
        let out = truncate_for_prompt(text, 8);
        assert_eq!(out.chars().count(), 9);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn truncate_leaves_short_text_alone() {
        assert_eq!(truncate_for_prompt("short", 100), "short");
    }

    #[test]
    fn journal_prompt_carries_topic_and_chapter_form() {
        let personas = roster();
        let prompt = journal_prompt(Some("the old mill"), true, &[], &personas);
        assert!(prompt.contains("long-form chapter"));
        assert!(prompt.contains("the old mill"));
        assert!(prompt.ends_with("JOURNAL ENTRY:"));

        let short = journal_prompt(None, false, &[], &personas);
        assert!(short.contains("short journal entry"));
    }

    #[test]
    fn dialogue_prompt_names_both_personas() {
        let personas = roster();
        let prompt = dialogue_prompt(&personas[0], &personas[1], &[], &personas);
        assert!(prompt.contains("Gigi"));
        assert!(prompt.contains("June"));
    }

    #[test]
    fn dialogue_prompt_introduces_the_partner_when_it_has_a_bio() {
        let first = Persona::new("Gigi", PersonaKind::Archivist).as_primary();
        let second = Persona::new("June", PersonaKind::Companion).with_bio("Warm and curious.");
        let personas = vec![first.clone(), second.clone()];
        let prompt = dialogue_prompt(&first, &second, &[], &personas);
        assert!(prompt.contains("About June: Warm and curious."));
    }
}
