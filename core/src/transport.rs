//! The HTTP primitive the SDK sits on.
//!
//! # Design
//! The SDK never talks to the network itself: it hands an `HttpRequest` to a
//! `Transport` and gets an `HttpResponse` back. Non-2xx statuses are data, not
//! errors; only failures to complete the round-trip are `SdkError::Transport`.
//!
//! `UreqTransport` is the default. ureq is blocking, so each call runs on
//! tokio's blocking pool.

use futures::future::BoxFuture;
use futures::FutureExt;
use http::HeaderMap;

use crate::error::SdkError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, SdkError>>;
}

/// `Transport` backed by a ureq agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    /// Agent that returns 4xx/5xx responses as data instead of errors.
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Use a preconfigured agent (timeouts, proxies, TLS). The agent should
    /// have `http_status_as_error(false)`, otherwise error statuses surface
    /// as transport errors.
    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, SdkError>> {
        let agent = self.agent.clone();
        async move {
            tokio::task::spawn_blocking(move || execute(&agent, request))
                .await
                .map_err(|e| SdkError::Transport(format!("transport task failed: {e}")))?
        }
        .boxed()
    }
}

fn execute(agent: &ureq::Agent, req: HttpRequest) -> Result<HttpResponse, SdkError> {
    let url = req.url;
    let headers = req.headers;

    let result = match (req.method, req.body) {
        (HttpMethod::Get, _) => with_headers(agent.get(&url), &headers).call(),
        (HttpMethod::Head, _) => with_headers(agent.head(&url), &headers).call(),
        (HttpMethod::Delete, _) => with_headers(agent.delete(&url), &headers).call(),
        (HttpMethod::Options, _) => with_headers(agent.options(&url), &headers).call(),
        (HttpMethod::Post, Some(body)) => with_headers(agent.post(&url), &headers).send(&body[..]),
        (HttpMethod::Post, None) => with_headers(agent.post(&url), &headers).send_empty(),
        (HttpMethod::Put, Some(body)) => with_headers(agent.put(&url), &headers).send(&body[..]),
        (HttpMethod::Put, None) => with_headers(agent.put(&url), &headers).send_empty(),
        (HttpMethod::Patch, Some(body)) => with_headers(agent.patch(&url), &headers).send(&body[..]),
        (HttpMethod::Patch, None) => with_headers(agent.patch(&url), &headers).send_empty(),
    };

    let mut response = result.map_err(|e| SdkError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response
        .body_mut()
        .read_to_vec()
        .map_err(|e| SdkError::Transport(format!("reading body: {e}")))?;

    Ok(HttpResponse { status, headers, body })
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &HeaderMap) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_bytes());
    }
    builder
}
