#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use storywriter_core::GENERATION_ERROR_PREFIX;
use storywriter_llm::{BackendConfig, BackendRegistry, KoboldConfig};
use storywriter_worker::{ResultSink, Task, TaskQueue};
use tokio::runtime::Handle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Summary,
    Text,
}

#[derive(Default)]
struct Fields {
    events: Vec<String>,
}

impl ResultSink<Field> for Fields {
    fn on_tokens_counted(&mut self, target: Field, count: i64) {
        self.events.push(format!("{target:?} tokens={count}"));
    }

    fn on_response_generated(&mut self, target: Field, text: String) {
        self.events.push(format!("{target:?} text={text}"));
    }
}

fn kobold(name: &str, address: &str) -> BackendConfig {
    BackendConfig::Kobold(KoboldConfig {
        name: name.into(),
        address: address.into(),
        system_prompt: String::new(),
    })
}

// ---------------------------------------------------------------------------
// 1. Counting against an unreachable server delivers the -1 sentinel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_count_delivers_sentinel() {
    let mut registry = BackendRegistry::default();
    let backend = registry.add(kobold("down", "http://127.0.0.1:1")).unwrap();

    let (queue, mut rx) = TaskQueue::new(Handle::current());
    queue.enqueue(Task::count("a b c", backend.clone(), Field::Summary));
    queue.enqueue(Task::generate("hello", backend, Field::Text));
    queue.wait_idle().await;

    let mut sink = Fields::default();
    while let Ok(c) = rx.try_recv() {
        c.deliver(&mut sink);
    }
    assert_eq!(sink.events.len(), 2);
    assert_eq!(sink.events[0], "Summary tokens=-1");
    assert!(sink.events[1].starts_with(&format!("Text text={GENERATION_ERROR_PREFIX}")));
}

// ---------------------------------------------------------------------------
// 2. Mixed tasks against a live Kobold server, delivered in order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kobold_round_trip_through_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/extra/tokencount"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 3})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": [{"text": " The rain kept falling. "}]})),
        )
        .mount(&server)
        .await;

    let mut registry = BackendRegistry::default();
    let backend = registry.add(kobold("kobold", &server.uri())).unwrap();

    let (queue, mut rx) = TaskQueue::new(Handle::current());
    queue.enqueue(Task::generate("Write the scene.", backend.clone(), Field::Text));
    queue.enqueue(Task::count("a b c", backend, Field::Summary));

    let mut sink = Fields::default();
    for _ in 0..2 {
        rx.recv().await.unwrap().deliver(&mut sink);
    }
    assert_eq!(
        sink.events,
        vec!["Text text=The rain kept falling.", "Summary tokens=3"]
    );
}

// ---------------------------------------------------------------------------
// 3. Editing the registry does not redirect a task already queued
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queued_task_keeps_captured_backend() {
    let original = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/extra/tokencount"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 11})))
        .expect(1)
        .mount(&original)
        .await;

    let mut registry = BackendRegistry::default();
    registry.add(kobold("k", &original.uri())).unwrap();

    let (queue, mut rx) = TaskQueue::new(Handle::current());
    queue.enqueue(Task::count(
        "some words",
        registry.get("k").unwrap(),
        Field::Summary,
    ));

    // Point the registry elsewhere and remove it entirely before draining.
    registry
        .replace("k", kobold("k", "http://127.0.0.1:1"))
        .unwrap();
    registry.remove("k");

    let mut sink = Fields::default();
    rx.recv().await.unwrap().deliver(&mut sink);
    assert_eq!(sink.events, vec!["Summary tokens=11"]);
}
