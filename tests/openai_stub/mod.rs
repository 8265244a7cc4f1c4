#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct OpenAiStubConfig {
    pub page_score: u8,
    pub page_recommendations: Vec<String>,
    pub site_recommendations: Vec<String>,
    pub behavior: ReplyBehavior,
}

impl Default for OpenAiStubConfig {
    fn default() -> Self {
        Self {
            page_score: 80,
            page_recommendations: vec!["Expand the buying guide section".to_owned()],
            site_recommendations: vec!["Add JSON-LD structured data site-wide".to_owned()],
            behavior: ReplyBehavior::Json,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReplyBehavior {
    Json,
    /// Wraps the JSON object in a markdown fence with commentary.
    FencedJson,
    /// Answers with prose the scorer cannot parse.
    Garbage,
    /// Fails every call with HTTP 500.
    ServerError,
}

pub struct OpenAiStub {
    pub base_url: String,
    pub requests: Arc<AtomicUsize>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn(config: OpenAiStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/responses" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }
                counter.fetch_add(1, Ordering::SeqCst);

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                if matches!(config.behavior, ReplyBehavior::ServerError) {
                    let _ = request.respond(
                        tiny_http::Response::from_string(
                            r#"{"error":{"message":"stub outage"}}"#,
                        )
                        .with_status_code(500),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                let Some(prompt) = parsed.get("input").and_then(|v| v.as_str()) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing input").with_status_code(400),
                    );
                    continue;
                };

                let reply = if prompt.contains("BEGIN_PAGE_JSON") {
                    serde_json::json!({
                        "score": config.page_score,
                        "recommendations": config.page_recommendations,
                    })
                } else if prompt.contains("BEGIN_SITE_JSON") {
                    serde_json::json!({ "recommendations": config.site_recommendations })
                } else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("unknown prompt mode")
                            .with_status_code(400),
                    );
                    continue;
                };

                let output_text = match config.behavior {
                    ReplyBehavior::Json | ReplyBehavior::ServerError => reply.to_string(),
                    ReplyBehavior::FencedJson => {
                        format!("Here is my assessment:\n```json\n{reply}\n```\n")
                    }
                    ReplyBehavior::Garbage => "I cannot judge this page.".to_owned(),
                };

                let response_body = serde_json::json!({
                    "id": "resp_stub",
                    "object": "response",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "output": [
                        {
                            "type": "message",
                            "role": "assistant",
                            "content": [
                                { "type": "output_text", "text": output_text }
                            ]
                        }
                    ]
                });

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(response_body.to_string())
                    .with_status_code(200)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
