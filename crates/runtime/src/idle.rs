//! Unprompted generation while the user is idle.
//!
//! The scheduler owns a background task armed by host activity signals.
//! When the idle timer fires it runs every guard again (enabled, not
//! halted, presence, do-not-disturb window, turn gate, non-empty history)
//! because minutes have passed since arming and the world has moved on.
//! A skipped daydream is never queued; the timer simply re-arms.

use std::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use chronicle_archive::{ArchiveStore, JournalEntry, Turn};
use chronicle_config::IdleConfig;
use chronicle_personas::{Persona, compose, pick_other};
use chronicle_provider::{
    ChatMessage, CompletionRequest, GenerationProvider, ProviderError, RandomSource, RetryPolicy,
};

use crate::events::{NotificationKind, Notifier, Presence, PresenceSource};
use crate::prompts;
use crate::session::{Session, SessionState, TurnGate};

/// Handle to the background idle task.  Dropping it aborts the task.
pub struct IdleScheduler {
    activity_tx: mpsc::UnboundedSender<()>,
    shutdown_tx: watch::Sender<bool>,
    halted: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl IdleScheduler {
    /// Spawn the idle task for a session.  The task shares the session's
    /// state and turn gate; presence comes from the host.
    pub fn spawn(session: &Session, presence: Arc<dyn PresenceSource>) -> Self {
        let (activity_tx, mut activity_rx) = mpsc::unbounded_channel::<()>();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let halted = Arc::new(AtomicBool::new(false));

        let tz = match session.config.idle.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(
                    timezone = %session.config.idle.timezone,
                    "unrecognised timezone, do-not-disturb window evaluated in UTC"
                );
                chrono_tz::UTC
            }
        };

        let worker = IdleWorker {
            config: session.config.idle.clone(),
            window_turns: session.config.session.context_window_turns,
            personas: session.personas.clone(),
            primary_index: session.primary_index,
            state: Arc::clone(&session.state),
            gate: session.gate.clone(),
            archive: Arc::clone(&session.archive),
            provider: Arc::clone(&session.provider),
            retry: session.retry.clone(),
            rng: Arc::clone(&session.rng),
            notifier: Arc::clone(&session.notifier),
            presence,
            halted: Arc::clone(&halted),
            tz,
        };

        let handle = tokio::spawn(async move {
            // No deadline until the first activity signal arrives.
            let mut deadline: Option<Instant> = None;
            loop {
                tokio::select! {
                    _ = sleep_until_or_never(deadline) => {
                        worker.daydream().await;
                        deadline = if worker.config.daydream_enabled {
                            Some(Instant::now() + worker.config.daydream_interval())
                        } else {
                            None
                        };
                    }
                    received = activity_rx.recv() => {
                        match received {
                            Some(()) => {
                                deadline = worker
                                    .arm_delay()
                                    .map(|delay| Instant::now() + delay);
                            }
                            None => break,
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("idle scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            activity_tx,
            shutdown_tx,
            halted,
            handle,
        }
    }

    /// Reset the idle countdown.  Hosts call this after every user
    /// interaction they consider activity.
    pub fn record_activity(&self) {
        let _ = self.activity_tx.send(());
    }

    /// Suspend unprompted generation without tearing the task down.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.halted.store(false, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for IdleScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn sleep_until_or_never(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => future::pending().await,
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct IdleWorker {
    config: IdleConfig,
    window_turns: usize,
    personas: Vec<Persona>,
    primary_index: usize,
    state: Arc<Mutex<SessionState>>,
    gate: TurnGate,
    archive: Arc<dyn ArchiveStore>,
    provider: Arc<dyn GenerationProvider>,
    retry: RetryPolicy,
    rng: Arc<dyn RandomSource>,
    notifier: Arc<dyn Notifier>,
    presence: Arc<dyn PresenceSource>,
    halted: Arc<AtomicBool>,
    tz: Tz,
}

impl IdleWorker {
    /// Presence decides the fuse; a busy user disarms the timer entirely.
    fn arm_delay(&self) -> Option<Duration> {
        if !self.config.daydream_enabled {
            return None;
        }
        match self.presence.presence() {
            Presence::Online => Some(self.config.online_idle()),
            Presence::Away => Some(self.config.away_idle()),
            Presence::Busy => None,
        }
    }

    async fn daydream(&self) {
        if !self.config.daydream_enabled {
            return;
        }
        if self.halted.load(Ordering::SeqCst) {
            debug!("daydream skipped, autonomy halted");
            return;
        }
        if self.presence.presence() == Presence::Busy {
            debug!("daydream skipped, user is busy");
            return;
        }
        if is_in_window(
            Utc::now(),
            self.tz,
            self.config.dnd_start_hour.into(),
            self.config.dnd_end_hour.into(),
        ) {
            debug!("daydream skipped, do-not-disturb window");
            return;
        }
        let Some(_permit) = self.gate.try_acquire() else {
            debug!("daydream skipped, a foreground turn is in flight");
            return;
        };

        // Snapshot under the lock, release before the provider call.
        let recent: Vec<Turn> = {
            let state = self.state.lock().await;
            if state.history.is_empty() {
                debug!("daydream skipped, no conversation yet");
                return;
            }
            state.history.recent(self.window_turns).to_vec()
        };

        let primary = &self.personas[self.primary_index];
        let partner = if self.rng.next_f64() < self.config.dialogue_probability {
            pick_other(&self.personas, primary.id, self.rng.as_ref())
        } else {
            None
        };

        let result = match partner {
            Some(partner) => self.dialogue(primary, partner, &recent).await,
            None => self.reflection(primary, &recent).await,
        };
        if let Err(err) = result {
            warn!(%err, "daydream failed, next interval will try again");
        }
    }

    /// Solo reflection in the primary persona's voice, saved as a journal
    /// entry.  Daydreams compose from persona defaults; session overrides
    /// belong to the foreground conversation.
    async fn reflection(&self, persona: &Persona, recent: &[Turn]) -> Result<()> {
        let instruction = compose(persona, None, None);
        let prompt = prompts::reflection_prompt(recent, &self.personas);
        let text = self.single_shot(instruction, prompt, "idle reflection").await?;
        let body = text.trim();
        if body.is_empty() {
            debug!("reflection came back empty, nothing saved");
            return Ok(());
        }

        self.archive
            .save_journal_entry(JournalEntry::new(body).with_author(persona.id))
            .await?;
        info!(persona = %persona.display_name, "idle reflection recorded");
        self.notifier.notify(
            &format!("{} wrote a reflection while you were away.", persona.display_name),
            NotificationKind::Daydream,
        );
        Ok(())
    }

    /// Two personas talking the conversation over, generated as one scripted
    /// exchange and journalled under the primary's name.
    async fn dialogue(&self, first: &Persona, second: &Persona, recent: &[Turn]) -> Result<()> {
        let instruction = compose(first, None, None);
        let prompt = prompts::dialogue_prompt(first, second, recent, &self.personas);
        let text = self.single_shot(instruction, prompt, "idle dialogue").await?;
        let body = text.trim();
        if body.is_empty() {
            debug!("dialogue came back empty, nothing saved");
            return Ok(());
        }

        self.archive
            .save_journal_entry(
                JournalEntry::new(body)
                    .with_title(format!("{} and {}", first.display_name, second.display_name))
                    .with_author(first.id),
            )
            .await?;
        info!(
            first = %first.display_name,
            second = %second.display_name,
            "idle dialogue recorded"
        );
        self.notifier.notify(
            &format!(
                "{} and {} talked things over while you were away.",
                first.display_name, second.display_name
            ),
            NotificationKind::Daydream,
        );
        Ok(())
    }

    async fn single_shot(
        &self,
        instruction: String,
        prompt: String,
        label: &'static str,
    ) -> Result<String, ProviderError> {
        let request = CompletionRequest {
            system_instruction: instruction,
            messages: vec![ChatMessage::user(prompt)],
            tool_catalog: None,
            generation: None,
        };
        let response = self
            .retry
            .execute(label, || self.provider.complete(request.clone()))
            .await?;
        Ok(response.text.unwrap_or_default())
    }
}

/// Hour-of-day window check in the given timezone, wrapping midnight when
/// `start > end` (a 23..8 window covers 23:00 through 07:59).
fn is_in_window(now: DateTime<Utc>, tz: Tz, start_hour: u32, end_hour: u32) -> bool {
    let hour = now.with_timezone(&tz).hour();
    if start_hour <= end_hour {
        hour >= start_hour && hour < end_hour
    } else {
        hour >= start_hour || hour < end_hour
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
