//! In-memory transport for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use http::HeaderMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::error::SdkError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

#[derive(Clone)]
enum Reply {
    Response(HttpResponse),
    Fail(String),
}

/// Lets a test decide when a held request completes.
pub struct Gate(Arc<Notify>);

impl Gate {
    pub fn release(&self) {
        self.0.notify_one();
    }
}

/// Answers by exact URL; unknown URLs get `200 {}`. Records every request.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, Reply>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.replies.lock().insert(
            url.to_string(),
            Reply::Response(HttpResponse {
                status,
                headers: HeaderMap::new(),
                body: body.as_bytes().to_vec(),
            }),
        );
    }

    pub fn respond_json(&self, url: &str, status: u16, body: Value) {
        self.respond(url, status, &body.to_string());
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.replies.lock().insert(url.to_string(), Reply::Fail(message.to_string()));
    }

    /// Requests to `url` wait until the returned gate is released.
    pub fn hold(&self, url: &str) -> Gate {
        let notify = Arc::new(Notify::new());
        self.gates.lock().insert(url.to_string(), Arc::clone(&notify));
        Gate(notify)
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, SdkError>> {
        let reply = self.replies.lock().get(&request.url).cloned();
        let gate = self.gates.lock().get(&request.url).cloned();
        self.requests.lock().push(request);
        async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            match reply {
                Some(Reply::Response(response)) => Ok(response),
                Some(Reply::Fail(message)) => Err(SdkError::Transport(message)),
                None => Ok(HttpResponse {
                    status: 200,
                    headers: HeaderMap::new(),
                    body: b"{}".to_vec(),
                }),
            }
        }
        .boxed()
    }
}
