//! 编排器集成测试：脚本化模型 + 本地 HTTP 应答器

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use slash::actions::{ActionDispatcher, HttpActionClient, StaticSecretStore};
use slash::core::{AgentSwitcher, Orchestrator, TurnEvent};
use slash::llm::{EmbeddingProvider, ModelCatalog, ModelReply, ScriptedChatModel};
use slash::manifest::{AgentManifest, ManifestRegistry};
use slash::memory::{
    ContextAugmenter, FileConversationLog, InMemoryVectorIndex, Message, Role, TokenEstimator,
    VectorStore, VectorStoreFactory,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// 接受一个连接，返回固定的 200 响应；JoinHandle 给出收到的完整请求（请求头 + body）
async fn one_shot_responder(body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let head_len = buf.windows(4).position(|w| w == b"\r\n\r\n").map_or(buf.len(), |i| i + 4);
        let content_length = String::from_utf8_lossy(&buf[..head_len])
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while buf.len() < head_len + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        String::from_utf8_lossy(&buf).to_string()
    });
    (format!("http://{addr}"), handle)
}

fn manifest(key: &str, value: Value) -> AgentManifest {
    AgentManifest::from_value(key, value, Path::new(".")).unwrap()
}

fn build(manifests: Vec<AgentManifest>, model: Arc<ScriptedChatModel>, start: &str) -> Orchestrator {
    let mut registry = ManifestRegistry::new();
    for m in manifests {
        registry.insert(m);
    }
    let switcher = AgentSwitcher::new(registry, ModelCatalog::builtin());
    let dispatcher = ActionDispatcher::new(
        HttpActionClient::new(5),
        Arc::new(StaticSecretStore::default().with("WEATHER", "abc123")),
        ".",
    );
    Orchestrator::new(switcher, model, dispatcher, start).unwrap()
}

fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(|m| m.role).collect()
}

#[tokio::test]
async fn test_get_weather_rest_round_trip() {
    let raw = r#"{"city":"Lyon","sky":"clear"}"#;
    let (base, request) = one_shot_responder(raw).await;
    let weather = manifest(
        "weather",
        json!({
            "prompt": "You report weather.",
            "actions": {
                "get_weather": {
                    "type": "rest",
                    "url": format!("{base}/weather?city={{city}}&key={{appkey}}"),
                    "appkey": "WEATHER"
                }
            }
        }),
    );
    let model = Arc::new(ScriptedChatModel::new([
        ModelReply::function_call("get_weather", json!({"city": "Lyon"})),
        ModelReply::text("It is sunny in Lyon."),
    ]));
    let mut orch = build(vec![weather], Arc::clone(&model), "weather");

    let events = orch.handle_input("weather in Lyon?").await;

    let request = request.await.unwrap();
    assert!(request.starts_with("GET /weather?city=Lyon&key=abc123 "), "{request}");
    assert_eq!(model.call_count(), 2);
    assert_eq!(
        events.last(),
        Some(&TurnEvent::Assistant {
            bot: "GPT".to_string(),
            text: "It is sunny in Lyon.".to_string()
        })
    );

    let history = orch.session().history().messages();
    assert_eq!(
        roles(history),
        vec![Role::System, Role::User, Role::Function, Role::Assistant]
    );
    assert_eq!(history[1].content, "weather in Lyon?");
    assert_eq!(history[2], Message::function("get_weather", raw));
    assert_eq!(history[3].content, "It is sunny in Lyon.");

    let second_call = model.call_messages(1).unwrap();
    assert_eq!(second_call[2], json!({"role": "function", "content": raw, "name": "get_weather"}));
}

/// 请求中空行之后的 JSON body
fn request_json(request: &str) -> Value {
    let (_, body) = request.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

fn request_header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
    request.lines().find_map(|l| {
        let (n, v) = l.split_once(':')?;
        n.eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

#[tokio::test]
async fn test_rest_post_sends_arguments_as_json() {
    let (base, request) = one_shot_responder(r#"{"id":42}"#).await;
    let tickets = manifest(
        "tickets",
        json!({
            "prompt": "You file tickets.",
            "actions": {
                "create_ticket": {
                    "type": "rest",
                    "method": "post",
                    "url": format!("{base}/tickets"),
                    "headers": {"X-Api-Key": "{appkey}", "X-Priority": "{priority}"},
                    "appkey": "WEATHER"
                }
            }
        }),
    );
    let model = Arc::new(ScriptedChatModel::new([
        ModelReply::function_call("create_ticket", json!({"title": "Printer jam", "priority": "high"})),
        ModelReply::text("Ticket 42 filed."),
    ]));
    let mut orch = build(vec![tickets], Arc::clone(&model), "tickets");

    orch.handle_input("the printer is jammed").await;

    let request = request.await.unwrap();
    assert!(request.starts_with("POST /tickets "), "{request}");
    assert_eq!(request_header(&request, "x-api-key"), Some("abc123"));
    assert_eq!(request_header(&request, "x-priority"), Some("high"));
    assert_eq!(
        request_json(&request),
        json!({"title": "Printer jam", "priority": "high"})
    );
    let history = orch.session().history().messages();
    assert_eq!(history[2], Message::function("create_ticket", r#"{"id":42}"#));
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_graphql_posts_query_and_variables() {
    let raw = r#"{"data":{"country":{"name":"France"}}}"#;
    let (base, request) = one_shot_responder(raw).await;
    let atlas = manifest(
        "atlas",
        json!({
            "prompt": "You answer geography questions.",
            "actions": {
                "lookup": {
                    "type": "graphQL",
                    "url": format!("{base}/graphql"),
                    "headers": {"Authorization": "Bearer {appkey}"},
                    "appkey": "WEATHER"
                }
            }
        }),
    );
    let query = "query ($code: ID!) { country(code: $code) { name } }";
    let model = Arc::new(ScriptedChatModel::new([
        ModelReply::function_call("lookup", json!({"query": query, "code": "FR"})),
        ModelReply::text("That is France."),
    ]));
    let mut orch = build(vec![atlas], Arc::clone(&model), "atlas");

    let events = orch.handle_input("which country is FR?").await;

    let request = request.await.unwrap();
    assert!(request.starts_with("POST /graphql "), "{request}");
    assert_eq!(request_header(&request, "authorization"), Some("Bearer abc123"));
    assert_eq!(
        request_json(&request),
        json!({"query": query, "variables": {"code": "FR"}})
    );
    assert_eq!(orch.session().history().messages()[2], Message::function("lookup", raw));
    assert_eq!(
        events.last(),
        Some(&TurnEvent::Assistant {
            bot: "GPT".to_string(),
            text: "That is France.".to_string()
        })
    );
}

#[tokio::test]
async fn test_skip_function_result_returns_to_user() {
    let notes = manifest(
        "notes",
        json!({
            "prompt": "You keep notes.",
            "skip_function_result": true,
            "actions": {"log_note": {"type": "message_template", "message": "Saved: {note}"}}
        }),
    );
    let model = Arc::new(ScriptedChatModel::new([ModelReply::function_call(
        "log_note",
        json!({"note": "buy leeks"}),
    )]));
    let mut orch = build(vec![notes], Arc::clone(&model), "notes");

    let events = orch.handle_input("remember leeks").await;

    assert_eq!(model.call_count(), 1);
    assert_eq!(
        events,
        vec![TurnEvent::FoldedResult {
            name: "log_note".to_string(),
            text: "Saved: buy leeks".to_string()
        }]
    );
    let last = orch.session().history().last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, "Saved: buy leeks");
    assert!(!orch.session().should_continue_with_llm());
}

async fn run_with_function_calls(n: usize) -> (Arc<ScriptedChatModel>, Vec<TurnEvent>, usize) {
    let ticker = manifest(
        "ticker",
        json!({
            "prompt": "Tick.",
            "actions": {"tick": {"type": "message_template", "message": "tick {n}"}}
        }),
    );
    let model = Arc::new(ScriptedChatModel::function_calls_then_text(
        n,
        "tick",
        json!({"n": 1}),
        "done",
    ));
    let mut orch = build(vec![ticker], Arc::clone(&model), "ticker");
    let events = orch.handle_input("go").await;
    let len = orch.session().history().len();
    (model, events, len)
}

#[tokio::test]
async fn test_recursion_with_no_function_calls() {
    let (model, events, len) = run_with_function_calls(0).await;
    assert_eq!(model.call_count(), 1);
    assert_eq!(events.len(), 1);
    assert_eq!(len, 3);
}

#[tokio::test]
async fn test_recursion_with_five_function_calls() {
    let (model, events, len) = run_with_function_calls(5).await;
    assert_eq!(model.call_count(), 6);
    let results = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::FunctionResult { .. }))
        .count();
    assert_eq!(results, 5);
    assert!(matches!(events.last(), Some(TurnEvent::Assistant { text, .. }) if text == "done"));
    // system + user + 5 function + assistant
    assert_eq!(len, 8);
}

#[tokio::test]
async fn test_failed_switch_leaves_session_untouched() {
    let model = Arc::new(ScriptedChatModel::new([ModelReply::text("hello")]));
    let mut orch = build(
        vec![manifest("home", json!({"prompt": "Home.", "intro": ["Hi"]}))],
        model,
        "home",
    );
    orch.handle_input("hi").await;
    let before: Vec<Message> = orch.session().history().messages().to_vec();

    assert!(orch.switch_agent("ghost", true).is_err());

    assert_eq!(orch.session().agent_key(), "home");
    assert_eq!(orch.session().history().messages(), before.as_slice());
}

#[tokio::test]
async fn test_model_error_resets_session() {
    let model = Arc::new(ScriptedChatModel::default());
    model.push(ModelReply::text("first answer"));
    model.push_error("upstream unavailable");
    let mut orch = build(
        vec![manifest("home", json!({"prompt": "Home.", "intro": ["Hi"]}))],
        Arc::clone(&model),
        "home",
    );
    orch.handle_input("one").await;
    assert_eq!(orch.session().history().len(), 4);

    let events = orch.handle_input("two").await;
    assert!(matches!(
        &events[..],
        [TurnEvent::Reset { agent_key, error }] if agent_key == "home" && error.contains("upstream unavailable")
    ));
    // 只剩 system，且不重放开场白
    assert_eq!(roles(orch.session().history().messages()), vec![Role::System]);
}

#[tokio::test]
async fn test_appkey_domain_mismatch_resets_session() {
    let weather = manifest(
        "weather",
        json!({
            "prompt": "Weather.",
            "actions": {
                "get_weather": {"type": "rest", "url": "http://127.0.0.1:9/w?c={city}", "appkey": "PINNED"}
            }
        }),
    );
    let model = Arc::new(ScriptedChatModel::new([ModelReply::function_call(
        "get_weather",
        json!({"city": "Lyon"}),
    )]));
    let mut registry = ManifestRegistry::new();
    registry.insert(weather);
    let dispatcher = ActionDispatcher::new(
        HttpActionClient::new(5),
        Arc::new(StaticSecretStore::default().with("PINNED", "api.weather.example,secret")),
        ".",
    );
    let mut orch = Orchestrator::new(
        AgentSwitcher::new(registry, ModelCatalog::builtin()),
        model,
        dispatcher,
        "weather",
    )
    .unwrap();

    let events = orch.handle_input("weather?").await;
    assert!(matches!(&events[..], [TurnEvent::Reset { error, .. }] if error.contains("appkey domain")));
}

struct FixedEmbedder;

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, String> {
        Ok(vec![1.0, 0.0])
    }
}

struct FixedIndex;

impl VectorStoreFactory for FixedIndex {
    fn open(&self, table_name: &str) -> anyhow::Result<Arc<dyn VectorStore>> {
        anyhow::ensure!(table_name == "recipes", "unknown table {table_name}");
        let mut index = InMemoryVectorIndex::default();
        index.insert("Leek soup needs leeks.", vec![1.0, 0.0]);
        index.insert("Unrelated text.", vec![0.0, 1.0]);
        Ok(Arc::new(index))
    }
}

#[tokio::test]
async fn test_context_augmentation_rewrites_system_message() {
    let cook = manifest(
        "cook",
        json!({
            "prompt": "Use these notes:{articles}",
            "embeddings": {"name": "recipes"}
        }),
    );
    let model = Arc::new(ScriptedChatModel::new([ModelReply::text("Make soup.")]));
    let mut registry = ManifestRegistry::new();
    registry.insert(cook);
    let switcher = AgentSwitcher::new(registry, ModelCatalog::builtin())
        .with_vector_factory(Arc::new(FixedIndex));
    let dispatcher = ActionDispatcher::new(
        HttpActionClient::new(5),
        Arc::new(StaticSecretStore::default()),
        ".",
    );
    let mut orch = Orchestrator::new(switcher, model.clone(), dispatcher, "cook")
        .unwrap()
        .with_augmenter(ContextAugmenter::new(Arc::new(FixedEmbedder), Arc::new(TokenEstimator)));
    assert!(orch.session().has_vector_store());

    orch.handle_input("what about leeks?").await;

    let system = &orch.session().history().messages()[0];
    assert!(system.content.starts_with("Use these notes:\n\nSection:\n\"\"\"\nLeek soup needs leeks.\n\"\"\""));
    assert!(!system.content.contains("{articles}"));
    // 模型看到的是已改写的 system 消息
    let first_call = model.call_messages(0).unwrap();
    assert_eq!(first_call[0]["content"], Value::String(system.content.clone()));
}

#[tokio::test]
async fn test_conversation_log_written_per_agent() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(FileConversationLog::new(dir.path()));
    let mut registry = ManifestRegistry::new();
    registry.insert(manifest("home", json!({"prompt": "Home."})));
    let switcher = AgentSwitcher::new(registry, ModelCatalog::builtin()).with_log(log.clone());
    let dispatcher = ActionDispatcher::new(
        HttpActionClient::new(5),
        Arc::new(StaticSecretStore::default()),
        ".",
    );
    let model = Arc::new(ScriptedChatModel::new([ModelReply::text("hey")]));
    let mut orch = Orchestrator::new(switcher, model, dispatcher, "home").unwrap();
    orch.handle_input("hello").await;

    let saved = log
        .load("home", orch.session().history().started_at())
        .unwrap();
    assert_eq!(saved, orch.session().history().messages());
}
