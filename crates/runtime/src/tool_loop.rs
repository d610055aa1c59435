//! The bounded request/execute cycle against the generation provider.
//!
//! Sends the transcript with the tool catalog, executes any tool calls the
//! model requests, feeds the results back as tool-role messages, and
//! repeats until the model answers in text or the round bound is hit.
//!
//! Ordering is part of the contract: calls execute sequentially and every
//! call is paired with exactly one result, appended in call order, before
//! the next provider round.  A misbehaving tool never aborts the loop; its
//! failure goes back to the model as an error result.

use tracing::{debug, info, warn};

use chronicle_provider::{
    ChatMessage, CompletionRequest, GenerationProvider, ProviderError, RetryPolicy, ToolCall,
    ToolResult,
};
use chronicle_tools::ToolRegistry;

/// Terminal reply when the model never settles on text within the round
/// bound, or returns neither text nor tool calls.
pub const FALLBACK_REPLY: &str = "I'm not sure how to respond to that.";

/// Where the loop currently stands.  `Executing` carries the calls taken
/// from the last response so the transition is explicit.
enum Phase {
    Requesting,
    Executing(Vec<ToolCall>),
    Terminal(String),
}

/// What a completed loop produced.
#[derive(Debug)]
pub struct LoopOutcome {
    /// Final assistant text.
    pub text: String,
    /// Every tool result gathered across all rounds, in execution order.
    pub tool_results: Vec<ToolResult>,
    /// Provider round trips performed.
    pub rounds: usize,
}

pub async fn run_tool_loop(
    provider: &dyn GenerationProvider,
    retry: &RetryPolicy,
    system_instruction: &str,
    mut messages: Vec<ChatMessage>,
    registry: &ToolRegistry,
    max_rounds: usize,
) -> Result<LoopOutcome, ProviderError> {
    let catalog = registry.catalog();
    let mut collected: Vec<ToolResult> = Vec::new();
    let mut rounds: usize = 0;
    let mut phase = Phase::Requesting;

    loop {
        match phase {
            Phase::Requesting => {
                if rounds >= max_rounds {
                    warn!(rounds, "tool loop hit the round bound, falling back to text");
                    phase = Phase::Terminal(FALLBACK_REPLY.to_string());
                    continue;
                }
                rounds += 1;

                let request = CompletionRequest {
                    system_instruction: system_instruction.to_string(),
                    messages: messages.clone(),
                    tool_catalog: catalog.clone(),
                    generation: None,
                };
                let response = retry
                    .execute("chat completion", || provider.complete(request.clone()))
                    .await?;

                if response.has_tool_calls() {
                    debug!(
                        round = rounds,
                        calls = response.tool_calls.len(),
                        "model requested tools"
                    );
                    messages.push(ChatMessage::assistant_tool_calls(response.tool_calls.clone()));
                    phase = Phase::Executing(response.tool_calls);
                } else {
                    match response.text {
                        Some(text) if !text.trim().is_empty() => phase = Phase::Terminal(text),
                        _ => {
                            debug!(round = rounds, "model returned neither text nor tool calls");
                            phase = Phase::Terminal(FALLBACK_REPLY.to_string());
                        }
                    }
                }
            }
            Phase::Executing(calls) => {
                // Calls run one at a time: result order must match call order.
                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    results.push(registry.dispatch(call).await);
                }
                messages.push(ChatMessage::tool_results(results.clone()));
                collected.extend(results);
                phase = Phase::Requesting;
            }
            Phase::Terminal(text) => {
                info!(rounds, tool_results = collected.len(), "tool loop complete");
                return Ok(LoopOutcome {
                    text,
                    tool_results: collected,
                    rounds,
                });
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use chronicle_provider::{
        CompletionResponse, CredentialObserver, CredentialWatch, RandomSource,
    };
    use chronicle_tools::{Tool, ToolSpec};

    struct SilentObserver;
    impl CredentialObserver for SilentObserver {
        fn credential_invalid(&self, _detail: &str) {}
    }

    struct FixedRandom(f64);
    impl RandomSource for FixedRandom {
        fn next_f64(&self) -> f64 {
            self.0
        }
    }

    fn test_retry() -> RetryPolicy {
        RetryPolicy::new(
            3,
            Duration::from_millis(1),
            Duration::ZERO,
            Arc::new(FixedRandom(0.0)),
            CredentialWatch::new(Arc::new(SilentObserver)),
        )
    }

    /// Replays a fixed sequence of responses and records every request.
    /// Once the script runs out it returns an empty response.
    struct ScriptedProvider {
        script: Mutex<VecDeque<CompletionResponse>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<CompletionResponse>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
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
            Ok(self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }
    }

    /// Records execution order; fails when constructed with `fail`.
    struct ProbeTool {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for ProbeTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.name.to_string(),
                description: "probe".to_string(),
                params: Vec::new(),
            }
        }

        async fn execute(&self, _args: &Value) -> anyhow::Result<Value> {
            self.log.lock().unwrap().push(self.name.to_string());
            if self.fail {
                anyhow::bail!("probe refused");
            }
            Ok(json!({ "ran": self.name }))
        }
    }

    fn registry_with_probes(log: &Arc<Mutex<Vec<String>>>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in ["alpha", "beta", "gamma"] {
            registry.register(Arc::new(ProbeTool {
                name,
                fail: false,
                log: Arc::clone(log),
            }));
        }
        registry
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            args: json!({}),
        }
    }

    #[tokio::test]
    async fn text_on_first_round_ends_the_loop() {
        let provider = ScriptedProvider::new(vec![CompletionResponse::text("All noted.")]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with_probes(&log);

        let outcome = run_tool_loop(
            &provider,
            &test_retry(),
            "instruction",
            vec![ChatMessage::user("hello")],
            &registry,
            8,
        )
        .await
        .unwrap();

        assert_eq!(outcome.text, "All noted.");
        assert_eq!(outcome.rounds, 1);
        assert!(outcome.tool_results.is_empty());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn two_tool_rounds_execute_in_order_then_finish() {
        let provider = ScriptedProvider::new(vec![
            CompletionResponse::tool_calls(vec![call("alpha"), call("beta")]),
            CompletionResponse::tool_calls(vec![call("gamma")]),
            CompletionResponse::text("Done."),
        ]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with_probes(&log);

        let outcome = run_tool_loop(
            &provider,
            &test_retry(),
            "instruction",
            vec![ChatMessage::user("record these")],
            &registry,
            8,
        )
        .await
        .unwrap();

        assert_eq!(outcome.text, "Done.");
        assert_eq!(outcome.rounds, 3);
        let names: Vec<&str> = outcome.tool_results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(*log.lock().unwrap(), vec!["alpha", "beta", "gamma"]);

        // The final request carries the whole exchange: user turn, two
        // assistant tool-call messages, and their paired result messages.
        let requests = provider.requests();
        assert_eq!(requests[2].messages.len(), 5);
    }

    #[tokio::test]
    async fn round_bound_produces_fallback_text_not_an_error() {
        let script: Vec<CompletionResponse> = (0..10)
            .map(|_| CompletionResponse::tool_calls(vec![call("alpha")]))
            .collect();
        let provider = ScriptedProvider::new(script);
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with_probes(&log);

        let outcome = run_tool_loop(
            &provider,
            &test_retry(),
            "instruction",
            vec![ChatMessage::user("loop forever")],
            &registry,
            3,
        )
        .await
        .unwrap();

        assert_eq!(outcome.text, FALLBACK_REPLY);
        assert_eq!(outcome.rounds, 3);
        assert_eq!(provider.calls(), 3);
        assert_eq!(outcome.tool_results.len(), 3);
    }

    #[tokio::test]
    async fn empty_response_falls_back_immediately() {
        let provider = ScriptedProvider::new(vec![CompletionResponse::default()]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with_probes(&log);

        let outcome = run_tool_loop(
            &provider,
            &test_retry(),
            "instruction",
            vec![ChatMessage::user("hm")],
            &registry,
            8,
        )
        .await
        .unwrap();

        assert_eq!(outcome.text, FALLBACK_REPLY);
        assert_eq!(outcome.rounds, 1);
    }

    #[tokio::test]
    async fn failing_tool_feeds_an_error_result_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ProbeTool {
            name: "grumpy",
            fail: true,
            log: Arc::clone(&log),
        }));

        let provider = ScriptedProvider::new(vec![
            CompletionResponse::tool_calls(vec![call("grumpy")]),
            CompletionResponse::text("Noted the failure."),
        ]);

        let outcome = run_tool_loop(
            &provider,
            &test_retry(),
            "instruction",
            vec![ChatMessage::user("try it")],
            &registry,
            8,
        )
        .await
        .unwrap();

        assert_eq!(outcome.text, "Noted the failure.");
        assert_eq!(outcome.tool_results.len(), 1);
        assert!(outcome.tool_results[0].is_error());

        // The error result still reached the provider as a tool message:
        // user turn, assistant tool-call message, tool result message.
        let requests = provider.requests();
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn unknown_tool_name_becomes_an_error_result() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with_probes(&log);
        let provider = ScriptedProvider::new(vec![
            CompletionResponse::tool_calls(vec![call("no_such_tool")]),
            CompletionResponse::text("Sorry."),
        ]);

        let outcome = run_tool_loop(
            &provider,
            &test_retry(),
            "instruction",
            vec![ChatMessage::user("go")],
            &registry,
            8,
        )
        .await
        .unwrap();

        assert!(outcome.tool_results[0].is_error());
        assert_eq!(outcome.text, "Sorry.");
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        struct AlwaysAuthFail;

        #[async_trait]
        impl GenerationProvider for AlwaysAuthFail {
            async fn complete(
                &self,
                _request: CompletionRequest,
            ) -> Result<CompletionResponse, ProviderError> {
                Err(ProviderError::Authentication("bad key".to_string()))
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with_probes(&log);

        let result = run_tool_loop(
            &AlwaysAuthFail,
            &test_retry(),
            "instruction",
            vec![ChatMessage::user("hello")],
            &registry,
            8,
        )
        .await;

        assert!(matches!(result, Err(ProviderError::Authentication(_))));
    }
}
