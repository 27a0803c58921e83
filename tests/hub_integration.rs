//! Hub integration tests: runs an extension against an in-process fake hub
//! speaking the real HTTP protocol (form POST publish, SSE subscribe).

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use talkops::parameters::EnvLookup;
use talkops::types::TopicCredentials;
use talkops::{Config, Event, Extension, Handler, HubConfig, Parameter};
use tokio::sync::mpsc;

const HUB_PATH: &str = "/.well-known/mercure";

#[derive(Debug, Clone)]
struct Published {
    topic: String,
    data: String,
    auth: Option<String>,
    content_type: Option<String>,
}

#[derive(Debug, Clone)]
struct Subscription {
    topic: String,
    auth: Option<String>,
}

#[derive(Clone, Default)]
struct FakeHub {
    posts: Arc<Mutex<Vec<Published>>>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    inbound: Arc<Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
    reject_posts: Arc<AtomicBool>,
}

impl FakeHub {
    /// Allow the next subscription and return the sender feeding it.
    fn open_stream(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound.lock().unwrap() = Some(rx);
        tx
    }

    fn events(&self) -> Vec<Event> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|p| Event::from_payload(&p.data).ok())
            .collect()
    }

    fn count_of(&self, event_type: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn publish(
    State(hub): State<FakeHub>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> StatusCode {
    if hub.reject_posts.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    hub.posts.lock().unwrap().push(Published {
        topic: form.get("topic").cloned().unwrap_or_default(),
        data: form.get("data").cloned().unwrap_or_default(),
        auth: header_str(&headers, header::AUTHORIZATION),
        content_type: header_str(&headers, header::CONTENT_TYPE),
    });
    StatusCode::OK
}

async fn subscribe(
    State(hub): State<FakeHub>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    hub.subscriptions.lock().unwrap().push(Subscription {
        topic: query.get("topic").cloned().unwrap_or_default(),
        auth: header_str(&headers, header::AUTHORIZATION),
    });

    let Some(rx) = hub.inbound.lock().unwrap().take() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|data| (Ok::<_, Infallible>(SseEvent::default().data(data)), rx))
    });
    Sse::new(stream).into_response()
}

async fn start_fake_hub() -> (SocketAddr, FakeHub) {
    let hub = FakeHub::default();
    let app = Router::new()
        .route(HUB_PATH, post(publish).get(subscribe))
        .with_state(hub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, hub)
}

fn config_for(addr: SocketAddr) -> Config {
    let mut config = Config::new(HubConfig {
        url: format!("http://{}{}", addr, HUB_PATH),
        publisher: TopicCredentials {
            topic: "extensions/demo/out".to_string(),
            token: "pub-token".to_string(),
        },
        subscriber: TopicCredentials {
            topic: "extensions/demo/in".to_string(),
            token: "sub-token".to_string(),
        },
    });
    config.runtime.reconnect_backoff = Duration::from_millis(50);
    config
}

/// Poll `check` until it holds or five seconds pass.
async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

fn no_env() -> EnvLookup {
    Arc::new(|_| None)
}

#[tokio::test]
async fn test_publish_wire_format() {
    let (addr, hub) = start_fake_hub().await;

    let _running = Extension::new(config_for(addr))
        .with_env_lookup(no_env())
        .start_http()
        .await;

    wait_until(|| !hub.posts.lock().unwrap().is_empty()).await;
    let first = hub.posts.lock().unwrap()[0].clone();
    assert_eq!(first.topic, "extensions/demo/out");
    assert_eq!(first.data, r#"{"type":"init"}"#);
    assert_eq!(first.auth.as_deref(), Some("Bearer pub-token"));
    assert_eq!(
        first.content_type.as_deref(),
        Some("application/x-www-form-urlencoded")
    );

    wait_until(|| !hub.subscriptions.lock().unwrap().is_empty()).await;
    let sub = hub.subscriptions.lock().unwrap()[0].clone();
    assert_eq!(sub.topic, "extensions/demo/in");
    assert_eq!(sub.auth.as_deref(), Some("Bearer sub-token"));
}

#[tokio::test]
async fn test_boot_function_call_and_ping_round_trip() {
    let (addr, hub) = start_fake_hub().await;
    let inbound = hub.open_stream();

    let running = Extension::new(config_for(addr))
        .with_env_lookup(no_env())
        .with_parameters(vec![
            Parameter::new("API_KEY").unwrap(),
            Parameter::new("REGION").unwrap().optional(true),
        ])
        .with_function(
            "double",
            Handler::from_async(|args| async move {
                let n = args.get("n").and_then(Value::as_i64).unwrap_or(0);
                Some(json!(n * 2))
            }),
        )
        .unwrap()
        .start_http()
        .await;

    wait_until(|| !hub.subscriptions.lock().unwrap().is_empty()).await;

    // Boot without the required parameter: state pushed, not ready.
    inbound
        .send(json!({"type": "boot", "parameters": {"REGION": "eu"}}).to_string())
        .unwrap();
    wait_until(|| running.parameters().get_value("REGION").as_deref() == Some("eu")).await;
    assert!(!running.parameters().is_ready());

    inbound
        .send(json!({"type": "boot", "parameters": {"API_KEY": "secret"}}).to_string())
        .unwrap();
    wait_until(|| running.parameters().is_ready()).await;

    inbound
        .send(
            json!({
                "type": "function_call",
                "name": "double",
                "args": {"n": 21},
                "defaultArgs": {"n": 0},
            })
            .to_string(),
        )
        .unwrap();
    wait_until(|| hub.count_of("function_call") == 1).await;
    let reply = hub
        .events()
        .into_iter()
        .find(|e| e.event_type() == "function_call")
        .unwrap();
    assert_eq!(reply.get("output").cloned().unwrap(), json!(42));
    assert_eq!(reply.get("name").cloned().unwrap(), json!("double"));

    inbound.send(r#"{"type":"ping"}"#.to_string()).unwrap();
    wait_until(|| hub.count_of("pong") == 1).await;

    let state = hub
        .events()
        .into_iter()
        .filter(|e| e.event_type() == "state")
        .last()
        .unwrap();
    let parameters = state.get("state").unwrap()["parameters"].clone();
    assert_eq!(parameters[0]["name"], json!("API_KEY"));
    assert_eq!(parameters[1]["optional"], json!(true));
}

#[tokio::test]
async fn test_subscriber_retries_refused_connection() {
    let (addr, hub) = start_fake_hub().await;

    let running = Extension::new(config_for(addr))
        .with_env_lookup(no_env())
        .start_http()
        .await;

    // No stream open yet: the hub answers 503 and the subscriber backs off.
    wait_until(|| hub.subscriptions.lock().unwrap().len() >= 2).await;

    let inbound = hub.open_stream();
    inbound.send(r#"{"type":"ping"}"#.to_string()).unwrap();
    wait_until(|| hub.count_of("pong") == 1).await;

    assert!(running.send_message("back online").await);
    wait_until(|| hub.count_of("message") == 1).await;
}

#[tokio::test]
async fn test_rejected_state_is_resent_once_hub_accepts() {
    let (addr, hub) = start_fake_hub().await;
    hub.reject_posts.store(true, Ordering::SeqCst);

    let running = Extension::new(config_for(addr))
        .with_env_lookup(no_env())
        .with_state_provider(Arc::new(|| json!({"phase": "steady"})))
        .start_http()
        .await;

    assert!(!running.publish_state().await);
    assert!(!running.send_message("lost").await);
    assert_eq!(hub.count_of("state"), 0);

    // The diff loop retries the unchanged state until the hub takes it.
    hub.reject_posts.store(false, Ordering::SeqCst);
    wait_until(|| hub.count_of("state") == 1).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(hub.count_of("state"), 1);
    assert_eq!(hub.count_of("message"), 0);
}
