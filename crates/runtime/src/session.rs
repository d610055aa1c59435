//! The conversation controller: one owner, one persona roster, one
//! transcript.  A turn flows user input through directive parsing, responder
//! selection, instruction composition, and the tool loop, then persists the
//! grown transcript back to the archive.
//!
//! Lock discipline: session state lives behind a mutex shared with the idle
//! scheduler.  Snapshots are taken under the lock, the lock is released
//! before any provider call, and results are applied on re-acquire.

use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use chronicle_archive::{ArchiveStore, Attachment, JournalEntry, Turn};
use chronicle_config::EngineConfig;
use chronicle_personas::{
    Persona, ResponseLength, RuntimePatch, SessionOverrides, compose, select,
};
use chronicle_provider::{
    ChatMessage, CompletionRequest, CredentialObserver, CredentialWatch, ErrorClass,
    GenerationProvider, ProviderError, RandomSource, RetryPolicy,
};
use chronicle_tools::{
    AmendTagTool, InnerVoiceTool, SaveEventTool, SaveTagTool, ToolRegistry, WriteJournalEntryTool,
};

use crate::commands::{Command, CommandParser, derive_sentinel};
use crate::events::{NotificationKind, Notifier};
use crate::history::TurnHistory;
use crate::prompts;
use crate::tool_loop::run_tool_loop;

// ── Turn gate ─────────────────────────────────────────────────────────────────

/// Foreground/background mutual exclusion for one session.  A foreground
/// turn holds the permit for its whole duration; the idle scheduler only
/// try-acquires, and skips its daydream when it loses.
#[derive(Debug, Clone, Default)]
pub struct TurnGate {
    permit: Arc<Mutex<()>>,
}

impl TurnGate {
    pub async fn acquire(&self) -> TurnPermit {
        TurnPermit(Arc::clone(&self.permit).lock_owned().await)
    }

    pub fn try_acquire(&self) -> Option<TurnPermit> {
        Arc::clone(&self.permit).try_lock_owned().ok().map(TurnPermit)
    }

    pub fn is_held(&self) -> bool {
        self.permit.try_lock().is_err()
    }
}

#[derive(Debug)]
pub struct TurnPermit(#[allow(dead_code)] OwnedMutexGuard<()>);

// ── Session state ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub history: TurnHistory,
    pub overrides: SessionOverrides,
    /// Whether history has been seeded from the archive yet.
    pub initialized: bool,
}

// ── Session ───────────────────────────────────────────────────────────────────

pub struct Session {
    pub(crate) owner_id: String,
    pub(crate) personas: Vec<Persona>,
    pub(crate) primary_index: usize,
    pub(crate) config: EngineConfig,
    parser: CommandParser,
    patch: RuntimePatch,
    pub(crate) archive: Arc<dyn ArchiveStore>,
    pub(crate) provider: Arc<dyn GenerationProvider>,
    registry: ToolRegistry,
    pub(crate) retry: RetryPolicy,
    pub(crate) rng: Arc<dyn RandomSource>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) state: Arc<Mutex<SessionState>>,
    pub(crate) gate: TurnGate,
}

impl Session {
    /// Fails when the roster does not carry exactly one primary persona.
    pub fn new(
        owner_id: impl Into<String>,
        personas: Vec<Persona>,
        config: EngineConfig,
        archive: Arc<dyn ArchiveStore>,
        provider: Arc<dyn GenerationProvider>,
        notifier: Arc<dyn Notifier>,
        rng: Arc<dyn RandomSource>,
        credentials: Arc<dyn CredentialObserver>,
    ) -> Result<Self> {
        let mut primaries = personas.iter().enumerate().filter(|(_, p)| p.is_primary);
        let primary_index = match (primaries.next(), primaries.next()) {
            (Some((index, _)), None) => index,
            (None, _) => bail!("the persona roster needs exactly one primary, found none"),
            (Some(_), Some(_)) => bail!("the persona roster needs exactly one primary, found several"),
        };

        let sentinel = if config.session.command_sentinel.trim().is_empty() {
            derive_sentinel(&personas[primary_index].display_name)
        } else {
            config.session.command_sentinel.trim().to_string()
        };

        let retry = RetryPolicy::new(
            config.retry.max_attempts,
            config.retry.base_delay(),
            config.retry.max_jitter(),
            Arc::clone(&rng),
            CredentialWatch::new(credentials),
        );

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SaveEventTool {
            archive: Arc::clone(&archive),
        }));
        registry.register(Arc::new(SaveTagTool {
            archive: Arc::clone(&archive),
        }));
        registry.register(Arc::new(AmendTagTool {
            archive: Arc::clone(&archive),
        }));
        registry.register(Arc::new(WriteJournalEntryTool {
            archive: Arc::clone(&archive),
            default_author: Some(personas[primary_index].id),
        }));
        registry.register(Arc::new(InnerVoiceTool {
            provider: Arc::clone(&provider),
            retry: retry.clone(),
        }));

        Ok(Self {
            owner_id: owner_id.into(),
            personas,
            primary_index,
            config,
            parser: CommandParser::new(sentinel),
            patch: RuntimePatch::new(),
            archive,
            provider,
            registry,
            retry,
            rng,
            notifier,
            state: Arc::new(Mutex::new(SessionState::default())),
            gate: TurnGate::default(),
        })
    }

    pub fn primary(&self) -> &Persona {
        &self.personas[self.primary_index]
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn sentinel(&self) -> &str {
        self.parser.sentinel()
    }

    /// The shared credential latch.  Hosts reset it after rotating keys.
    pub fn credentials(&self) -> &CredentialWatch {
        self.retry.credentials()
    }

    /// Install or replace the operator directive for one persona.  Applied
    /// verbatim at instruction composition time from the next turn on.
    pub fn set_runtime_directive(&mut self, persona_id: Uuid, directive: impl Into<String>) {
        self.patch.set(persona_id, directive);
    }

    /// Snapshot of the full transcript, oldest first.
    pub async fn history(&self) -> Vec<Turn> {
        self.state.lock().await.history.turns().to_vec()
    }

    pub async fn overrides(&self) -> SessionOverrides {
        self.state.lock().await.overrides
    }

    /// Run one user turn end to end and return every turn this call
    /// appended, user turn included.  Provider failures surface as a
    /// system turn rather than an error; the turn itself still completes.
    #[instrument(skip_all, fields(owner = %self.owner_id, input_len = input.len()))]
    pub async fn handle_turn(
        &mut self,
        input: &str,
        attachment: Option<Attachment>,
    ) -> Result<Vec<Turn>> {
        let _permit = self.gate.acquire().await;
        self.ensure_seeded().await?;

        let mut appended = Vec::new();

        let mut user_turn = Turn::user(input);
        if let Some(attachment) = attachment {
            user_turn = user_turn.with_attachment(attachment);
        }
        self.push_turn(user_turn.clone()).await;
        appended.push(user_turn);

        match self.parser.try_parse(input) {
            Some(command) => self.run_command(command, &mut appended).await?,
            None => self.run_exchange(input, &mut appended).await?,
        }

        self.persist().await?;
        Ok(appended)
    }

    /// Drop session-scoped state and reload the transcript from the
    /// archive.  Operator directives survive; they belong to the host.
    pub async fn restart(&mut self) -> Result<()> {
        let _permit = self.gate.acquire().await;
        {
            let mut state = self.state.lock().await;
            state.overrides = SessionOverrides::default();
            state.history = TurnHistory::new();
            state.initialized = false;
        }
        self.ensure_seeded().await?;
        info!("session restarted");
        Ok(())
    }

    async fn ensure_seeded(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            let turns = self.archive.chat_history(&self.owner_id).await?;
            debug!(turns = turns.len(), "seeded transcript from the archive");
            state.history = TurnHistory::from_turns(turns);
            state.initialized = true;
        }
        Ok(())
    }

    async fn push_turn(&self, turn: Turn) {
        self.state.lock().await.history.push(turn);
    }

    async fn persist(&self) -> Result<()> {
        let state = self.state.lock().await;
        self.archive
            .save_chat_history(&self.owner_id, state.history.turns())
            .await
    }

    // ── Directives ────────────────────────────────────────────────────────

    async fn run_command(&self, command: Command, appended: &mut Vec<Turn>) -> Result<()> {
        let turn = match command {
            Command::Help => Turn::system(self.help_text()),
            Command::Set { length, spice } => Turn::system(self.apply_overrides(length, spice).await),
            Command::Journal { chapter, topic } => {
                self.commanded_journal(chapter, topic.as_deref()).await?
            }
        };
        self.push_turn(turn.clone()).await;
        appended.push(turn);
        Ok(())
    }

    fn help_text(&self) -> String {
        let s = self.parser.sentinel();
        format!(
            "Directives:\n\
             {s} help\n\
             {s} journal [--chapter] [--topic \"<text>\"]  write a journal entry now\n\
             {s} set [--length terse|normal|verbose] [--spice 1..5]  adjust replies for this session"
        )
    }

    async fn apply_overrides(&self, length: Option<ResponseLength>, spice: Option<u8>) -> String {
        let mut state = self.state.lock().await;
        let mut notes = Vec::new();
        if let Some(length) = length {
            state.overrides.response_length = length;
            let label = match length {
                ResponseLength::Terse => "terse",
                ResponseLength::Normal => "normal",
                ResponseLength::Verbose => "verbose",
            };
            notes.push(format!("length {label}"));
        }
        if let Some(spice) = spice {
            state.overrides.content_level_override = Some(spice);
            notes.push(format!("spice {spice}"));
        }
        if notes.is_empty() {
            "Nothing valid to apply; settings unchanged.".to_string()
        } else {
            info!(overrides = ?state.overrides, "session settings updated");
            format!("Session settings updated: {}.", notes.join(", "))
        }
    }

    /// Generate and save a journal entry on demand.  The entry body doubles
    /// as the reply so the user sees what was written.
    async fn commanded_journal(&self, chapter: bool, topic: Option<&str>) -> Result<Turn> {
        let (instruction, prompt) = {
            let state = self.state.lock().await;
            let instruction = compose(self.primary(), Some(&state.overrides), Some(&self.patch));
            let recent = state.history.recent(self.config.session.context_window_turns);
            (instruction, prompts::journal_prompt(topic, chapter, recent, &self.personas))
        };

        let text = match self.single_shot(instruction, prompt, "journal entry").await {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "journal directive failed at the provider");
                return Ok(self.failure_turn(&err));
            }
        };
        let body = text.trim();
        if body.is_empty() {
            warn!("journal generation came back empty, nothing saved");
            return Ok(Turn::system(
                "The journal entry didn't come together; try again in a moment.",
            ));
        }

        let mut entry = JournalEntry::new(body).with_author(self.primary().id);
        if let Some(topic) = topic {
            entry = entry.with_title(topic);
        }
        if chapter {
            entry = entry.as_chapter();
        }
        let entry = self.archive.save_journal_entry(entry).await?;
        let label = if entry.chapter { "chapter" } else { "entry" };
        self.notifier
            .notify(&format!("Journal {label} recorded."), NotificationKind::Journal);
        info!(entry_id = %entry.id, chapter = entry.chapter, "journal directive recorded an entry");
        Ok(Turn::agent(body, self.primary().id))
    }

    // ── Conversation ──────────────────────────────────────────────────────

    async fn run_exchange(&self, input: &str, appended: &mut Vec<Turn>) -> Result<()> {
        let (instruction, messages, responder_id, banterer_id) = {
            let state = self.state.lock().await;
            let selection = select(input, &self.personas, self.primary(), self.rng.as_ref());
            let instruction = compose(selection.responder, Some(&state.overrides), Some(&self.patch));
            let messages = state.history.to_messages(self.config.session.context_window_turns);
            (
                instruction,
                messages,
                selection.responder.id,
                selection.banterer.map(|b| b.id),
            )
        };

        let outcome = match run_tool_loop(
            self.provider.as_ref(),
            &self.retry,
            &instruction,
            messages,
            &self.registry,
            self.config.session.max_tool_rounds,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%err, "turn failed at the provider");
                let turn = self.failure_turn(&err);
                self.push_turn(turn.clone()).await;
                appended.push(turn);
                return Ok(());
            }
        };

        let reply = Turn::agent(outcome.text, responder_id);
        self.push_turn(reply.clone()).await;
        appended.push(reply);

        if let Some(banterer_id) = banterer_id {
            if self.rng.next_f64() < self.config.session.banter_probability {
                self.run_banter(banterer_id, appended).await;
            }
        }
        Ok(())
    }

    /// Second voice chiming in after the main reply.  Failures here never
    /// fail the turn; the main reply already landed.
    async fn run_banter(&self, banterer_id: Uuid, appended: &mut Vec<Turn>) {
        tokio::time::sleep(self.config.session.banter_delay()).await;

        let Some(banterer) = self.personas.iter().find(|p| p.id == banterer_id) else {
            return;
        };
        let (instruction, prompt) = {
            let state = self.state.lock().await;
            let instruction = compose(banterer, Some(&state.overrides), Some(&self.patch));
            let recent = state.history.recent(self.config.session.context_window_turns);
            (instruction, prompts::banter_prompt(recent, &self.personas))
        };

        match self.single_shot(instruction, prompt, "banter").await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(banterer = %banterer.display_name, "banter landed");
                let turn = Turn::agent(text.trim(), banterer_id);
                self.push_turn(turn.clone()).await;
                appended.push(turn);
            }
            Ok(_) => debug!("banter came back empty, skipping"),
            Err(err) => {
                warn!(%err, "banter failed at the provider");
                let turn = self.failure_turn(&err);
                self.push_turn(turn.clone()).await;
                appended.push(turn);
            }
        }
    }

    /// One catalog-free provider call.  Used for journal entries and banter,
    /// where tool use is never wanted.
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

    fn failure_turn(&self, err: &ProviderError) -> Turn {
        let text = match err.class() {
            ErrorClass::Authentication => {
                format!("The provider rejected this session's credentials: {err}")
            }
            ErrorClass::Retriable => {
                format!("The provider stayed unreachable after several attempts: {err}")
            }
            ErrorClass::Fatal => format!("The provider call failed: {err}"),
        };
        self.notifier.notify(&text, NotificationKind::Error);
        Turn::system(text)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use chronicle_archive::{MemoryArchive, Role};
    use chronicle_personas::PersonaKind;
    use chronicle_provider::{CompletionResponse, ToolCall};

    struct SilentObserver;
    impl CredentialObserver for SilentObserver {
        fn credential_invalid(&self, _detail: &str) {}
    }

    struct CountingObserver(AtomicUsize);
    impl CredentialObserver for CountingObserver {
        fn credential_invalid(&self, _detail: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FixedRandom(f64);
    impl RandomSource for FixedRandom {
        fn next_f64(&self) -> f64 {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        log: StdMutex<Vec<(String, NotificationKind)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str, kind: NotificationKind) {
            self.log.lock().unwrap().push((message.to_string(), kind));
        }
    }

    impl RecordingNotifier {
        fn kinds(&self) -> Vec<NotificationKind> {
            self.log.lock().unwrap().iter().map(|(_, k)| *k).collect()
        }
    }

    struct ScriptedProvider {
        script: StdMutex<VecDeque<CompletionResponse>>,
        calls: AtomicUsize,
        requests: StdMutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<CompletionResponse>) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                calls: AtomicUsize::new(0),
                requests: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            Ok(self.script.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    fn roster() -> Vec<Persona> {
        vec![
            Persona::new("Gigi", PersonaKind::Archivist)
                .with_bio("Keeper of the family archive.")
                .as_primary(),
            Persona::new("June", PersonaKind::Companion).with_bio("Warm and curious."),
        ]
    }

    fn build(
        script: Vec<CompletionResponse>,
        rng: f64,
    ) -> (Session, Arc<MemoryArchive>, Arc<ScriptedProvider>, Arc<RecordingNotifier>) {
        build_with(Arc::new(MemoryArchive::new()), script, rng)
    }

    fn build_with(
        archive: Arc<MemoryArchive>,
        script: Vec<CompletionResponse>,
        rng: f64,
    ) -> (Session, Arc<MemoryArchive>, Arc<ScriptedProvider>, Arc<RecordingNotifier>) {
        let provider = Arc::new(ScriptedProvider::new(script));
        let notifier = Arc::new(RecordingNotifier::default());
        let session = Session::new(
            "owner-1",
            roster(),
            EngineConfig::default(),
            Arc::clone(&archive) as Arc<dyn ArchiveStore>,
            Arc::clone(&provider) as Arc<dyn GenerationProvider>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::new(FixedRandom(rng)),
            Arc::new(SilentObserver),
        )
        .unwrap();
        (session, archive, provider, notifier)
    }

    fn text(s: &str) -> CompletionResponse {
        CompletionResponse::text(s)
    }

    // ── Construction ──────────────────────────────────────────────────────

    #[test]
    fn construction_requires_exactly_one_primary() {
        let archive = Arc::new(MemoryArchive::new()) as Arc<dyn ArchiveStore>;
        let provider = Arc::new(ScriptedProvider::new(vec![])) as Arc<dyn GenerationProvider>;
        let notifier = Arc::new(RecordingNotifier::default()) as Arc<dyn Notifier>;

        let attempt = |personas: Vec<Persona>| {
            Session::new(
                "owner-1",
                personas,
                EngineConfig::default(),
                Arc::clone(&archive),
                Arc::clone(&provider),
                Arc::clone(&notifier),
                Arc::new(FixedRandom(0.5)),
                Arc::new(SilentObserver),
            )
        };

        assert!(attempt(vec![Persona::new("A", PersonaKind::Archivist)]).is_err());
        assert!(
            attempt(vec![
                Persona::new("A", PersonaKind::Archivist).as_primary(),
                Persona::new("B", PersonaKind::Companion).as_primary(),
            ])
            .is_err()
        );
        assert!(attempt(roster()).is_ok());
    }

    #[test]
    fn sentinel_derives_from_primary_when_unconfigured() {
        let (session, ..) = build(vec![], 0.5);
        assert_eq!(session.sentinel(), "/gigi");
    }

    // ── Plain turns ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn plain_turn_appends_user_and_agent_turns() {
        let (mut session, archive, provider, _) = build(vec![text("Hello there.")], 0.9);

        let turns = session.handle_turn("hi", None).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Agent);
        assert_eq!(turns[1].content, "Hello there.");
        assert_eq!(turns[1].author_persona_id, Some(session.primary().id));
        assert_eq!(provider.calls(), 1);

        // The grown transcript was persisted.
        let saved = archive.chat_history("owner-1").await.unwrap();
        assert_eq!(saved.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn banter_adds_a_second_agent_turn_when_the_draw_allows() {
        let (mut session, _, _, _) = build(vec![text("First reply."), text("And me!")], 0.0);
        let june = session.personas()[1].id;

        let turns = session.handle_turn("hi", None).await.unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].content, "First reply.");
        assert_eq!(turns[2].content, "And me!");
        assert_eq!(turns[2].author_persona_id, Some(june));
    }

    #[tokio::test]
    async fn losing_the_banter_draw_keeps_the_turn_single_voiced() {
        let (mut session, _, provider, _) = build(vec![text("Only reply.")], 0.9);
        let turns = session.handle_turn("hi", None).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn mention_routes_to_that_persona_and_suppresses_banter() {
        let (mut session, _, provider, _) = build(vec![text("Just me.")], 0.0);
        let june = session.personas()[1].id;

        let turns = session.handle_turn("@june what do you think?", None).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].author_persona_id, Some(june));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn tool_round_results_reach_the_archive() {
        let call = ToolCall {
            name: "save_tag".to_string(),
            args: serde_json::json!({ "name": "Rosa", "kind": "person" }),
        };
        let (mut session, archive, _, _) = build(
            vec![
                CompletionResponse::tool_calls(vec![call]),
                text("I noted Rosa down."),
            ],
            0.9,
        );

        let turns = session.handle_turn("my aunt Rosa raised me", None).await.unwrap();
        assert_eq!(turns.last().unwrap().content, "I noted Rosa down.");
        assert_eq!(archive.tag_count(), 1);
    }

    #[tokio::test]
    async fn attachment_travels_to_the_provider_as_a_note() {
        let (mut session, _, provider, _) = build(vec![text("Nice photo.")], 0.9);
        let attachment = Attachment {
            name: "mill.jpg".to_string(),
            mime: "image/jpeg".to_string(),
            data: vec![0u8; 10],
        };

        session.handle_turn("look at this", Some(attachment)).await.unwrap();

        let request = &provider.requests()[0];
        let last = request.messages.last().unwrap();
        assert!(last.content.contains("[attached: mill.jpg"));
    }

    #[tokio::test]
    async fn seeds_history_from_the_archive_on_first_turn() {
        let archive = Arc::new(MemoryArchive::new());
        archive.seed_history(
            "owner-1",
            vec![Turn::user("remember the mill?"), Turn::system("noted")],
        );
        let (mut session, _, provider, _) = build_with(archive, vec![text("Of course.")], 0.9);

        session.handle_turn("and the road behind it", None).await.unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].content, "remember the mill?");
    }

    // ── Directives ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn help_directive_answers_without_the_provider() {
        let (mut session, _, provider, _) = build(vec![], 0.9);

        let turns = session.handle_turn("/gigi help", None).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, Role::System);
        assert!(turns[1].content.contains("journal"));
        assert!(turns[1].content.contains("set"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn set_directive_updates_overrides_and_acknowledges() {
        let (mut session, _, provider, _) = build(vec![], 0.9);

        let turns = session
            .handle_turn("/gigi set --length verbose --spice 7", None)
            .await
            .unwrap();

        // Out-of-range spice is dropped, the valid flag still applies.
        let overrides = session.overrides().await;
        assert_eq!(overrides.response_length, ResponseLength::Verbose);
        assert_eq!(overrides.content_level_override, None);

        assert_eq!(turns[1].role, Role::System);
        assert!(turns[1].content.contains("length verbose"));
        assert!(!turns[1].content.contains("spice"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn set_directive_applies_valid_spice() {
        let (mut session, _, _, _) = build(vec![], 0.9);
        session.handle_turn("/gigi set --spice 4", None).await.unwrap();
        assert_eq!(session.overrides().await.content_level_override, Some(4));
    }

    #[tokio::test]
    async fn empty_set_directive_acknowledges_without_changing_anything() {
        let (mut session, _, _, _) = build(vec![], 0.9);
        let turns = session.handle_turn("/gigi set --spice 9", None).await.unwrap();
        assert_eq!(session.overrides().await, SessionOverrides::default());
        assert!(turns[1].content.contains("unchanged"));
    }

    #[tokio::test]
    async fn journal_directive_saves_an_entry_and_replies_with_it() {
        let (mut session, archive, provider, notifier) = build(
            vec![text("Today we talked about the mill and aunt Rosa.")],
            0.9,
        );

        let turns = session
            .handle_turn(r#"/gigi journal --topic "the mill""#, None)
            .await
            .unwrap();

        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, Role::Agent);
        assert_eq!(turns[1].content, "Today we talked about the mill and aunt Rosa.");

        let entries = archive.journal();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title.as_deref(), Some("the mill"));
        assert!(!entries[0].chapter);
        assert_eq!(entries[0].author_persona_id, Some(session.primary().id));

        // Single shot: no tool catalog on the request.
        assert!(provider.requests()[0].tool_catalog.is_none());
        assert_eq!(notifier.kinds(), vec![NotificationKind::Journal]);
    }

    #[tokio::test]
    async fn chapter_flag_marks_the_entry() {
        let (mut session, archive, _, _) = build(vec![text("A long chapter.")], 0.9);
        session.handle_turn("/gigi journal --chapter", None).await.unwrap();
        assert!(archive.journal()[0].chapter);
    }

    #[tokio::test]
    async fn unknown_directive_flows_to_the_personas_as_chat() {
        let (mut session, _, provider, _) = build(vec![text("Dancing, are we?")], 0.9);
        let turns = session.handle_turn("/gigi dance", None).await.unwrap();
        assert_eq!(turns[1].role, Role::Agent);
        assert_eq!(provider.calls(), 1);
    }

    // ── Failures ──────────────────────────────────────────────────────────

    struct AlwaysFailing(ProviderError);

    #[async_trait]
    impl GenerationProvider for AlwaysFailing {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            Err(self.0.clone())
        }
    }

    fn build_failing(
        error: ProviderError,
        observer: Arc<dyn CredentialObserver>,
    ) -> (Session, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let session = Session::new(
            "owner-1",
            roster(),
            EngineConfig::default(),
            Arc::new(MemoryArchive::new()) as Arc<dyn ArchiveStore>,
            Arc::new(AlwaysFailing(error)) as Arc<dyn GenerationProvider>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::new(FixedRandom(0.9)),
            observer,
        )
        .unwrap();
        (session, notifier)
    }

    #[tokio::test]
    async fn provider_failure_becomes_a_system_turn_not_an_error() {
        let (mut session, notifier) =
            build_failing(ProviderError::Other("boom".to_string()), Arc::new(SilentObserver));

        let turns = session.handle_turn("hi", None).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, Role::System);
        assert!(turns[1].content.contains("boom"));
        assert_eq!(notifier.kinds(), vec![NotificationKind::Error]);
    }

    #[tokio::test]
    async fn authentication_failure_trips_the_observer_once() {
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let (mut session, _) = build_failing(
            ProviderError::Authentication("bad key".to_string()),
            Arc::clone(&observer) as Arc<dyn CredentialObserver>,
        );

        session.handle_turn("hi", None).await.unwrap();
        session.handle_turn("still there?", None).await.unwrap();

        // The latch fires the host signal only on the first trip.
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }

    // ── Restart ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn restart_resets_overrides_and_reseeds_from_the_archive() {
        let (mut session, _, _, _) = build(vec![], 0.9);
        session.handle_turn("/gigi set --length terse", None).await.unwrap();
        assert_eq!(session.overrides().await.response_length, ResponseLength::Terse);

        session.restart().await.unwrap();

        assert_eq!(session.overrides().await, SessionOverrides::default());
        // The persisted transcript (user turn + ack) came back on reseed.
        let history = session.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::System);
    }
}
