//! End-to-end scenarios for the tool-loop driver: thread persistence,
//! eviction, approval gating, composite routing, and summarization.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::json;

use fathom::{
    AgentEvent, Backend, CompletionRequest, CompletionResponse, ContentBlock, DeepAgent,
    Error, InMemoryCheckpointer, InterruptPolicy, LlmProvider, Message, StateBackend,
    StopReason, TokenUsage, Tool, ToolContext, ToolDefinition, ToolOutput, CompositeBackend,
    Checkpointer, DENIAL_MESSAGE,
};

/// Provider returning scripted responses and recording the message count
/// of every request it receives.
struct ScriptedProvider {
    responses: Mutex<Vec<CompletionResponse>>,
    request_lens: Mutex<Vec<usize>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            request_lens: Mutex::new(Vec::new()),
        }
    }

    fn lens(&self) -> Vec<usize> {
        self.request_lens.lock().unwrap().clone()
    }
}

impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.request_lens.lock().unwrap().push(request.messages.len());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(Error::Agent("no more scripted responses".into()));
        }
        Ok(responses.remove(0))
    }
}

fn text(text: &str) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentBlock::Text { text: text.into() }],
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::default(),
    }
}

fn tool_call(id: &str, name: &str, input: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }],
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::default(),
    }
}

#[tokio::test]
async fn thread_isolation_with_shared_checkpointer() {
    let store = InMemoryCheckpointer::new();

    for thread in ["alpha", "beta"] {
        let provider = Arc::new(ScriptedProvider::new(vec![text("done")]));
        let agent = DeepAgent::builder(provider)
            .checkpointer(Arc::new(store.clone()))
            .thread_id(thread)
            .build();
        let output = agent.execute("hello").await.unwrap();
        assert!(output.state.files.is_empty(), "each thread starts fresh");
    }

    assert_eq!(store.list().await.unwrap(), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn resume_emits_checkpoint_loaded_with_saved_message_count() {
    let store = Arc::new(InMemoryCheckpointer::new());

    // First invocation: user + assistant = 2 messages saved
    let provider = Arc::new(ScriptedProvider::new(vec![text("first answer")]));
    let agent = DeepAgent::builder(provider)
        .checkpointer(store.clone())
        .thread_id("t1")
        .build();
    agent.execute("start the thread").await.unwrap();

    let saved = store.load("t1").await.unwrap().unwrap();
    assert_eq!(saved.step, 1);
    let saved_len = saved.messages.len();
    assert_eq!(saved_len, 2);

    // Second invocation resumes and reports the saved length
    let provider = Arc::new(ScriptedProvider::new(vec![text("second answer")]));
    let agent = DeepAgent::builder(provider)
        .checkpointer(store.clone())
        .thread_id("t1")
        .build();
    let events = agent.run("continue").collect().await;

    match &events[0] {
        AgentEvent::CheckpointLoaded {
            thread_id,
            step,
            messages_count,
        } => {
            assert_eq!(thread_id, "t1");
            assert_eq!(*step, 1);
            assert_eq!(*messages_count, saved_len);
        }
        other => panic!("expected checkpoint-loaded first, got: {other:?}"),
    }

    // Steps are monotone across invocations
    let resumed = store.load("t1").await.unwrap().unwrap();
    assert!(resumed.step > saved.step);
}

/// Tool returning a fixed, oversized payload.
struct BigTool {
    payload: String,
}

impl Tool for BigTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "dump".into(),
            description: "Dump a large payload".into(),
            input_schema: json!({"type": "object"}),
        }
    }

    fn execute<'a>(
        &'a self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>> {
        let payload = self.payload.clone();
        Box::pin(async move { Ok(ToolOutput::success(payload)) })
    }
}

#[tokio::test]
async fn oversized_tool_result_is_evicted_and_readable() {
    let payload = "x".repeat(100_000);
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("c1", "dump", json!({})),
        text("summarized"),
    ]));
    let backend = Arc::new(StateBackend::new());
    let agent = DeepAgent::builder(provider)
        .backend(backend.clone())
        .tool(Arc::new(BigTool {
            payload: payload.clone(),
        }))
        .build();

    let events = agent.run("dump it").collect().await;

    // The model-facing result is a short pointer
    let result = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::ToolResult { output, .. } => Some(output.clone()),
            _ => None,
        })
        .expect("tool-result emitted");
    assert!(result.contains("/tool-results/dump-c1.txt"), "got: {result}");
    assert!(result.len() < payload.len());

    // The full payload is readable through the backend
    let stored = backend
        .read_raw("/tool-results/dump-c1.txt")
        .await
        .unwrap()
        .expect("evicted file exists");
    assert_eq!(stored.text(), payload);

    // And read_file renders it (the long line splits into numbered chunks)
    let rendered = backend.read("/tool-results/dump-c1.txt", 0, 10).await;
    assert!(rendered.contains("   1.1\t"), "got: {rendered}");
}

#[tokio::test]
async fn gated_write_without_callback_denies_and_preserves_state() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("c1", "write_file", json!({"path": "/x.txt", "content": "danger"})),
        text("could not write"),
    ]));
    let backend = Arc::new(StateBackend::new());
    let agent = DeepAgent::builder(provider)
        .backend(backend.clone())
        .interrupt_on("write_file", InterruptPolicy::Always)
        .build();

    let events = agent.run("write something").collect().await;

    // approval-requested precedes the tool-call, which precedes the denial result
    let approval_idx = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ApprovalRequested { .. }))
        .expect("approval requested");
    let call_idx = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ToolCall { .. }))
        .expect("tool-call emitted");
    assert!(approval_idx < call_idx);

    let (output, is_error) = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::ToolResult {
                output, is_error, ..
            } => Some((output.clone(), *is_error)),
            _ => None,
        })
        .expect("tool-result emitted");
    assert_eq!(output, DENIAL_MESSAGE);
    assert!(!is_error, "denial is a normal result, not an error");

    // No side effect on the filesystem
    let state = backend.export_state().await;
    assert!(state.files.is_empty());
}

#[tokio::test]
async fn approval_callback_allows_the_write() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("c1", "write_file", json!({"path": "/x.txt", "content": "approved"})),
        text("written"),
    ]));
    let backend = Arc::new(StateBackend::new());
    let agent = DeepAgent::builder(provider)
        .backend(backend.clone())
        .interrupt_on("write_file", InterruptPolicy::Always)
        .on_approval(|_request| async { true })
        .build();

    agent.execute("write something").await.unwrap();
    let data = backend.read_raw("/x.txt").await.unwrap().unwrap();
    assert_eq!(data.text(), "approved");
}

#[tokio::test]
async fn composite_routing_lands_writes_in_the_right_backend() {
    let default = Arc::new(StateBackend::new());
    let x = Arc::new(StateBackend::new());
    let y = Arc::new(StateBackend::new());
    let composite = Arc::new(
        CompositeBackend::new(default)
            .mount("/a/", x.clone())
            .mount("/a/b/", y.clone()),
    );

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("c1", "write_file", json!({"path": "/a/b/file.txt", "content": "deep"})),
        tool_call("c2", "write_file", json!({"path": "/a/other.txt", "content": "shallow"})),
        text("both written"),
    ]));
    let agent = DeepAgent::builder(provider).backend(composite).build();
    agent.execute("write to mounts").await.unwrap();

    assert_eq!(
        y.read_raw("/file.txt").await.unwrap().unwrap().text(),
        "deep"
    );
    assert_eq!(
        x.read_raw("/other.txt").await.unwrap().unwrap().text(),
        "shallow"
    );
}

#[tokio::test]
async fn summarization_compacts_to_summary_plus_tail() {
    // 12 large messages; threshold low enough to trigger on the first step.
    let history: Vec<Message> = (0..12)
        .map(|i| Message::user(format!("{i}: {}", "m".repeat(4000))))
        .collect();

    let provider = Arc::new(ScriptedProvider::new(vec![
        text("the conversation so far"), // summary call
        text("final answer"),            // the real step
    ]));
    let agent = DeepAgent::builder(provider.clone())
        .token_threshold(1000)
        .keep_messages(6)
        .build();

    let output = agent.execute(history).await.unwrap();
    assert_eq!(output.final_text, "final answer");

    let lens = provider.lens();
    assert_eq!(lens.len(), 2);
    assert_eq!(lens[0], 1, "summary request flattens the prefix");
    assert_eq!(lens[1], 7, "1 summary message + last 6");
}

#[tokio::test]
async fn checkpoint_save_precedes_next_steps_tool_call() {
    let store = Arc::new(InMemoryCheckpointer::new());
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("c1", "ls", json!({})),
        tool_call("c2", "ls", json!({})),
        text("done"),
    ]));
    let agent = DeepAgent::builder(provider)
        .checkpointer(store)
        .thread_id("ordering")
        .build();

    let events = agent.run("list twice").collect().await;

    let saved_step1 = events
        .iter()
        .position(|e| matches!(e, AgentEvent::CheckpointSaved { step: 1, .. }))
        .expect("checkpoint for step 1");
    let second_call = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ToolCall { tool_call_id, .. } if tool_call_id == "c2"))
        .expect("second tool-call");
    assert!(saved_step1 < second_call);
}

#[tokio::test]
async fn glob_roundtrip_reads_back_original_content() {
    let backend = Arc::new(StateBackend::new());
    backend.write("/src/a.rs", "fn a() {}").await.unwrap();
    backend.write("/src/b.rs", "fn b() {}").await.unwrap();

    let entries = backend.glob_info("**/*", "/").await;
    assert_eq!(entries.len(), 2);
    for entry in entries {
        let data = backend.read_raw(&entry.path).await.unwrap().unwrap();
        assert!(data.text().starts_with("fn "));
    }
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_run() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("c1", "ls", json!({})),
        tool_call("c2", "ls", json!({})),
        tool_call("c3", "ls", json!({})),
        text("unreachable"),
    ]));
    let agent = DeepAgent::builder(provider.clone()).build();

    let mut stream = agent.run("start working");
    // Consume just the first event, then walk away.
    let _ = stream.next().await;
    drop(stream);

    // Give the loop a chance to observe the closed channel.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let calls_made = provider.lens().len();
    assert!(
        calls_made < 4,
        "loop must stop issuing model calls after cancellation, made {calls_made}"
    );
}
