use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Provider config ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible chat-completions endpoint.
    /// Overridden at runtime by the `CHRONICLE_BASE_URL` environment variable
    /// when set.
    pub base_url: String,
    pub model: String,
    /// API key sent as a bearer token.  Can also be set via `CHRONICLE_API_KEY`
    /// (env takes precedence over the config file).
    pub api_key: String,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            request_timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ── Retry config ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of provider invocations allowed per logical call,
    /// including the first attempt.
    pub max_attempts: u32,
    /// Backoff base.  The sleep before retry `n` is
    /// `base_delay_ms * 2^(n-1)` plus jitter.
    pub base_delay_ms: u64,
    /// Upper bound of the uniform random jitter added to every backoff sleep.
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_jitter_ms: 1_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }
}

// ── Session config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Chance that a selected banterer actually chimes in after the main
    /// reply.  Drawn once per turn.
    pub banter_probability: f64,
    /// Pause between the main reply and the banter reply, so the second
    /// persona reads as reacting rather than talking over.
    pub banter_delay_ms: u64,
    /// Upper bound on provider round trips within a single tool-calling turn.
    /// Exceeding it ends the turn with a fallback reply instead of an error.
    pub max_tool_rounds: usize,
    /// How many of the most recent turns are sent to the provider as context.
    pub context_window_turns: usize,
    /// Prefix for session directives (e.g. `/gigi set --length terse`).
    /// Empty (the default) derives the sentinel from the primary persona's
    /// display name.
    pub command_sentinel: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            banter_probability: 0.45,
            banter_delay_ms: 1_500,
            max_tool_rounds: 8,
            context_window_turns: 24,
            command_sentinel: String::new(),
        }
    }
}

impl SessionConfig {
    pub fn banter_delay(&self) -> Duration {
        Duration::from_millis(self.banter_delay_ms)
    }
}

// ── Idle / daydream config ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Master switch for unprompted generation while the user is idle.
    pub daydream_enabled: bool,
    /// Minutes of inactivity before a daydream fires while the user is online.
    pub online_idle_minutes: u64,
    /// Shorter fuse used when presence reports the user as away.
    pub away_idle_minutes: u64,
    /// Gap between consecutive daydreams once the first has fired.
    pub daydream_interval_minutes: u64,
    /// Chance that a daydream becomes a two-persona dialogue instead of a
    /// solo reflection.  Only applies when at least two personas exist.
    pub dialogue_probability: f64,
    /// Do-not-disturb window start hour in local time.  Daydreams are
    /// suppressed between `dnd_start_hour` and `dnd_end_hour`.
    pub dnd_start_hour: u8,
    /// Do-not-disturb window end hour in local time.
    pub dnd_end_hour: u8,
    /// IANA timezone name (e.g. `"America/New_York"`, `"Europe/London"`).
    /// Used to evaluate the do-not-disturb window.  Falls back to UTC when
    /// the name is unrecognised.
    pub timezone: String,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            daydream_enabled: true,
            online_idle_minutes: 15,
            away_idle_minutes: 5,
            daydream_interval_minutes: 30,
            dialogue_probability: 0.3,
            dnd_start_hour: 23,
            dnd_end_hour: 8,
            timezone: "UTC".to_string(),
        }
    }
}

impl IdleConfig {
    pub fn online_idle(&self) -> Duration {
        Duration::from_secs(self.online_idle_minutes * 60)
    }

    pub fn away_idle(&self) -> Duration {
        Duration::from_secs(self.away_idle_minutes * 60)
    }

    pub fn daydream_interval(&self) -> Duration {
        Duration::from_secs(self.daydream_interval_minutes * 60)
    }
}

// ── Telemetry config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// ── Top-level config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub provider: ProviderConfig,
    pub retry: RetryConfig,
    pub session: SessionConfig,
    pub idle: IdleConfig,
    pub telemetry: TelemetryConfig,
}

impl EngineConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(key) = env::var("CHRONICLE_API_KEY") {
            if !key.is_empty() {
                config.provider.api_key = key;
            }
        }

        if let Ok(url) = env::var("CHRONICLE_BASE_URL") {
            if !url.is_empty() {
                config.provider.base_url = url;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
