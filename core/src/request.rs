//! A single outbound HTTP call.
//!
//! # Design
//! A `Request` starts executing as soon as it is constructed: the transport
//! call is spawned on the current tokio runtime and its outcome is kept in a
//! `Shared` future. Any number of observers can await `result()` (or one of
//! the projections) and they all see the same response from the same single
//! network call.
//!
//! Tracking is tied to the spawned task through a `TransactionGuard`, so
//! `request:endFetching` fires exactly once when the call finishes, whether it
//! succeeded, failed, or the task died.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::ClientShared;
use crate::endpoint::Params;
use crate::error::SdkError;
use crate::events;
use crate::http::{parse_header, HttpMethod, HttpRequest, HttpResponse};
use crate::tracker::{TransactionGuard, TransactionId};

type SharedResult = Shared<BoxFuture<'static, Result<Arc<HttpResponse>, SdkError>>>;

/// Method, headers and payload of a request.
///
/// Headers are case-insensitive; setting the same name twice keeps the last
/// value. When both `data` and `body` are given, `data` wins: it is
/// serialized as JSON and `content-type: application/json` is set.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    method: HttpMethod,
    headers: HeaderMap,
    data: Option<Params>,
    body: Option<Vec<u8>>,
    silent: bool,
}

impl RequestOptions {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::new(HttpMethod::Get)
    }

    pub fn post() -> Self {
        Self::new(HttpMethod::Post)
    }

    pub fn put() -> Self {
        Self::new(HttpMethod::Put)
    }

    pub fn patch() -> Self {
        Self::new(HttpMethod::Patch)
    }

    pub fn delete() -> Self {
        Self::new(HttpMethod::Delete)
    }

    pub fn head() -> Self {
        Self::new(HttpMethod::Head)
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self, SdkError> {
        let (header_name, header_value) = parse_header(name, value)?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Merge already-validated headers; later entries overwrite earlier ones.
    pub fn headers(mut self, headers: &HeaderMap) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set one entry of the structured payload.
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.get_or_insert_with(Params::new).insert(key.into(), value.into());
        self
    }

    /// Merge every entry of `data` into the structured payload.
    pub fn data_map(mut self, data: Params) -> Self {
        self.data.get_or_insert_with(Params::new).extend(data);
        self
    }

    /// Raw body bytes, ignored if a structured payload is also set.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Do not track this request as a transaction.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub(crate) fn into_http(self, url: String) -> Result<(HttpRequest, bool), SdkError> {
        let mut headers = self.headers;
        let body = match self.data {
            Some(data) => {
                let json = serde_json::to_vec(&data).map_err(|e| SdkError::Serialization(e.to_string()))?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Some(json)
            }
            None => self.body,
        };
        let request = HttpRequest {
            method: self.method,
            url,
            headers,
            body,
        };
        Ok((request, self.silent))
    }
}

/// An in-flight (or finished) HTTP call.
#[derive(Clone)]
pub struct Request {
    method: HttpMethod,
    url: String,
    transaction: Option<TransactionId>,
    result: SharedResult,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("transaction", &self.transaction)
            .finish()
    }
}

impl Request {
    /// Build the request and start it on the current tokio runtime.
    pub(crate) fn send(shared: &ClientShared, url: String, options: RequestOptions) -> Result<Self, SdkError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SdkError::Transport(format!("no async runtime: {e}")))?;
        let (http_request, silent) = options.into_http(url)?;
        let method = http_request.method;
        let url = http_request.url.clone();

        if shared.config.debug {
            tracing::debug!(%method, %url, "Fetching");
        }

        let guard = (!silent).then(|| {
            TransactionGuard::open(&shared.tracker, &shared.bus, events::REQUEST_START, events::REQUEST_END)
        });
        let transaction = guard.as_ref().map(TransactionGuard::id);

        let call = shared.transport.send(http_request);
        let error_url = url.clone();
        let handle = runtime.spawn(async move {
            let _guard = guard;
            let outcome = call.await;
            if let Err(err) = &outcome {
                tracing::error!(url = %error_url, error = %err, "request failed");
            }
            outcome
        });

        let result = async move {
            match handle.await {
                Ok(outcome) => outcome.map(Arc::new),
                Err(e) => Err(SdkError::Transport(format!("request task failed: {e}"))),
            }
        }
        .boxed()
        .shared();

        Ok(Self {
            method,
            url,
            transaction,
            result,
        })
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `None` for silent requests.
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    /// Wait for the response. Every caller shares the same underlying call.
    pub async fn result(&self) -> Result<Arc<HttpResponse>, SdkError> {
        self.result.clone().await
    }

    pub async fn text(&self) -> Result<String, SdkError> {
        self.result().await?.text()
    }

    pub async fn json<T: DeserializeOwned>(&self) -> Result<T, SdkError> {
        self.result().await?.json()
    }

    pub async fn bytes(&self) -> Result<Vec<u8>, SdkError> {
        Ok(self.result().await?.bytes())
    }
}
