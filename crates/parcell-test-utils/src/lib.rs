//! Mocks for the collaborator traits in `parcell_core::traits`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use parcell_core::error::{ParcellError, Result};
use parcell_core::traits::{Navigator, StatusSurface, Transport};
use parcell_core::types::{Method, StatusDisplay};

// ── Transport ───────────────────────────────────────────────────

/// One call that reached the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCall {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
enum Payload {
    Json(serde_json::Value),
    Text(String),
}

#[derive(Debug, Clone)]
struct Reply {
    delay: Duration,
    outcome: std::result::Result<Payload, String>,
}

/// Scripted transport. Replies are queued per URL and consumed in call
/// order; an unscripted URL answers immediately with `null` or `""`.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<TransportCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_json(&self, url: &str, value: serde_json::Value) -> &Self {
        self.reply_json_after(url, Duration::ZERO, value)
    }

    pub fn reply_json_after(&self, url: &str, delay: Duration, value: serde_json::Value) -> &Self {
        self.push(url, delay, Ok(Payload::Json(value)))
    }

    pub fn reply_text(&self, url: &str, text: &str) -> &Self {
        self.reply_text_after(url, Duration::ZERO, text)
    }

    pub fn reply_text_after(&self, url: &str, delay: Duration, text: &str) -> &Self {
        self.push(url, delay, Ok(Payload::Text(text.to_string())))
    }

    /// Make the next call to `url` fail with `message`.
    pub fn fail(&self, url: &str, message: &str) -> &Self {
        self.push(url, Duration::ZERO, Err(message.to_string()))
    }

    /// Every call seen so far, in the order they were made.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    fn push(
        &self,
        url: &str,
        delay: Duration,
        outcome: std::result::Result<Payload, String>,
    ) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(Reply { delay, outcome });
        self
    }

    fn record(&self, method: Method, url: &str, body: Option<String>) -> Option<Reply> {
        self.calls.lock().unwrap().push(TransportCall {
            method,
            url: url.to_string(),
            body,
        });
        self.replies
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
    }
}

async fn answer(url: String, reply: Reply) -> Result<Payload> {
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    reply
        .outcome
        .map_err(|message| ParcellError::transport(url, message))
}

fn into_json(payload: Payload) -> Result<serde_json::Value> {
    match payload {
        Payload::Json(value) => Ok(value),
        Payload::Text(text) => Ok(serde_json::from_str(&text)?),
    }
}

impl Transport for MockTransport {
    fn get_json(&self, url: &str) -> BoxFuture<'_, Result<serde_json::Value>> {
        let reply = self.record(Method::GetJson, url, None);
        let url = url.to_string();
        Box::pin(async move {
            let Some(reply) = reply else {
                return Ok(serde_json::Value::Null);
            };
            into_json(answer(url, reply).await?)
        })
    }

    fn get_text(&self, url: &str) -> BoxFuture<'_, Result<String>> {
        let reply = self.record(Method::GetText, url, None);
        let url = url.to_string();
        Box::pin(async move {
            let Some(reply) = reply else {
                return Ok(String::new());
            };
            match answer(url, reply).await? {
                Payload::Text(text) => Ok(text),
                Payload::Json(value) => Ok(value.to_string()),
            }
        })
    }

    fn post_json(&self, url: &str, body: String) -> BoxFuture<'_, Result<serde_json::Value>> {
        let reply = self.record(Method::PostJson, url, Some(body));
        let url = url.to_string();
        Box::pin(async move {
            let Some(reply) = reply else {
                return Ok(serde_json::Value::Null);
            };
            into_json(answer(url, reply).await?)
        })
    }
}

// ── Status surface ──────────────────────────────────────────────

/// Remembers every rendered status.
#[derive(Default)]
pub struct RecordingSurface {
    renders: Mutex<Vec<StatusDisplay>>,
}

impl RecordingSurface {
    pub fn renders(&self) -> Vec<StatusDisplay> {
        self.renders.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<StatusDisplay> {
        self.renders.lock().unwrap().last().copied()
    }
}

impl StatusSurface for RecordingSurface {
    fn render(&self, shown: &StatusDisplay) {
        self.renders.lock().unwrap().push(*shown);
    }
}

// ── Navigation ──────────────────────────────────────────────────

/// Navigator sitting on a fixed path that records where it was sent.
pub struct RecordingNavigator {
    pathname: String,
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn at(pathname: &str) -> Self {
        Self {
            pathname: pathname.to_string(),
            visited: Mutex::new(Vec::new()),
        }
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn pathname(&self) -> String {
        self.pathname.clone()
    }

    fn navigate(&self, url: &str) {
        self.visited.lock().unwrap().push(url.to_string());
    }
}
