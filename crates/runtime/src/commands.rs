//! Session directive parsing.
//!
//! Directives ride inside ordinary chat input, prefixed with the session
//! sentinel (`/gigi help`).  Anything that does not parse as a known
//! directive is treated as plain conversation and flows to the personas
//! untouched.  Malformed flag values are dropped individually so a typo in
//! one flag never swallows the rest of the directive.

use chronicle_personas::ResponseLength;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Journal {
        chapter: bool,
        topic: Option<String>,
    },
    Set {
        length: Option<ResponseLength>,
        spice: Option<u8>,
    },
}

/// Recognises sentinel-prefixed directives in user input.
#[derive(Debug, Clone)]
pub struct CommandParser {
    sentinel: String,
}

impl CommandParser {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// `None` means the input is plain conversation: no sentinel, a bare
    /// sentinel with nothing after it, or an unknown subcommand.
    pub fn try_parse(&self, input: &str) -> Option<Command> {
        let rest = input.trim().strip_prefix(&self.sentinel)?;
        // The sentinel must stand alone: "/gigi help" parses, "/gigantic"
        // is somebody talking about giants.
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }

        let tokens = tokenize(rest);
        let (subcommand, flags) = tokens.split_first()?;
        match subcommand.as_str() {
            "help" => Some(Command::Help),
            "journal" => Some(parse_journal(flags)),
            "set" => Some(parse_set(flags)),
            other => {
                debug!(subcommand = %other, "unknown directive, treating as chat");
                None
            }
        }
    }
}

/// Default sentinel for a persona roster: `/` plus the first word of the
/// primary's display name, lowercased ("Gigi Rose" becomes "/gigi").
pub fn derive_sentinel(display_name: &str) -> String {
    let first = display_name.split_whitespace().next().unwrap_or("chronicle");
    format!("/{}", first.to_lowercase())
}

/// Whitespace split with double-quote grouping, so
/// `--topic "the old mill"` arrives as one token.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in input.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_journal(flags: &[String]) -> Command {
    let mut chapter = false;
    let mut topic = None;
    let mut iter = flags.iter();
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--chapter" => chapter = true,
            "--topic" => {
                topic = iter.next().filter(|t| !t.is_empty()).cloned();
                if topic.is_none() {
                    debug!("--topic given without a value, ignoring");
                }
            }
            other => debug!(flag = %other, "ignoring unknown journal flag"),
        }
    }
    Command::Journal { chapter, topic }
}

fn parse_set(flags: &[String]) -> Command {
    let mut length = None;
    let mut spice = None;
    let mut iter = flags.iter();
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--length" => {
                length = iter.next().and_then(|v| ResponseLength::from_label(v));
                if length.is_none() {
                    debug!("--length missing or unrecognised, ignoring");
                }
            }
            "--spice" => {
                spice = iter
                    .next()
                    .and_then(|v| v.parse::<u8>().ok())
                    .filter(|n| (1..=5).contains(n));
                if spice.is_none() {
                    debug!("--spice missing or outside 1..=5, ignoring");
                }
            }
            other => debug!(flag = %other, "ignoring unknown set flag"),
        }
    }
    Command::Set { length, spice }
}

// ── Tests ────────────────────────────────────────────────────────────────────
