//! Named, reusable remote operations.
//!
//! # Design
//! A `Resource` is an endpoint template plus default parameters, headers and
//! an optional token override. Every call builds a fresh `Request` from the
//! current state; mutating a resource never affects requests already issued.
//!
//! Cloning a `Resource` is cheap and clones share state, so a handle taken
//! out of the registry sees `set_params` or `set_token` made through any
//! other handle.
//!
//! Parameters feed two things: `:key` placeholders in the URL, and the JSON
//! payload for methods that carry a body (POST, PUT, PATCH).

use std::sync::Arc;

use http::header::{HeaderValue, AUTHORIZATION};
use http::HeaderMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::client::ClientShared;
use crate::endpoint::{self, EndpointSpec, Params};
use crate::error::SdkError;
use crate::events;
use crate::http::{parse_header, HttpMethod};
use crate::request::{Request, RequestOptions};
use crate::tracker::TransactionGuard;
use crate::types::ResourceSpec;

#[derive(Default)]
struct ResourceState {
    params: Params,
    headers: HeaderMap,
    token: Option<String>,
}

#[derive(Clone)]
pub struct Resource {
    shared: Arc<ClientShared>,
    endpoint: EndpointSpec,
    method: HttpMethod,
    silent: bool,
    state: Arc<Mutex<ResourceState>>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("silent", &self.silent)
            .finish()
    }
}

impl Resource {
    /// Validate `spec` and merge it over the client's endpoint defaults.
    pub(crate) fn new(shared: Arc<ClientShared>, spec: &ResourceSpec) -> Result<Self, SdkError> {
        let method = spec.validate()?;
        let endpoint = spec.endpoint.with_defaults(&shared.defaults);
        Ok(Self {
            shared,
            endpoint,
            method,
            silent: spec.silent_fetch,
            state: Arc::new(Mutex::new(ResourceState::default())),
        })
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The resolved endpoint template, client defaults included.
    pub fn spec(&self) -> &EndpointSpec {
        &self.endpoint
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// URL for `params` merged over the default parameters.
    pub fn endpoint(&self, params: &Params) -> Result<String, SdkError> {
        endpoint::build(&self.endpoint, &self.merged_params(params))
    }

    pub fn params(&self) -> Params {
        self.state.lock().params.clone()
    }

    /// Merge into the default parameters.
    pub fn add_params(&self, params: Params) {
        self.state.lock().params.extend(params);
    }

    /// Replace the default parameters.
    pub fn set_params(&self, params: Params) {
        self.state.lock().params = params;
    }

    /// Use `token` instead of the client token for this resource.
    pub fn set_token(&self, token: impl Into<String>) {
        self.state.lock().token = Some(token.into());
    }

    pub fn set_header(&self, name: &str, value: &str) -> Result<(), SdkError> {
        let (header_name, header_value) = parse_header(name, value)?;
        self.state.lock().headers.insert(header_name, header_value);
        Ok(())
    }

    /// Set several headers. Nothing is applied if any of them is invalid.
    pub fn set_headers<'a>(&self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<(), SdkError> {
        let mut parsed = HeaderMap::new();
        for (name, value) in headers {
            let (header_name, header_value) = parse_header(name, value)?;
            parsed.insert(header_name, header_value);
        }
        let mut state = self.state.lock();
        for (name, value) in parsed {
            if let Some(name) = name {
                state.headers.insert(name, value);
            }
        }
        Ok(())
    }

    /// Issue a request for `params` merged over the default parameters.
    pub fn new_request(&self, params: &Params) -> Result<Request, SdkError> {
        let merged = self.merged_params(params);
        let url = endpoint::build(&self.endpoint, &merged)?;

        let (mut headers, token) = {
            let state = self.state.lock();
            let token = state.token.clone().unwrap_or_else(|| self.shared.token());
            (state.headers.clone(), token)
        };
        let bearer = HeaderValue::try_from(format!("Bearer {token}"))
            .map_err(|e| SdkError::InvalidHeader(format!("authorization: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let mut options = RequestOptions::new(self.method)
            .headers(&headers)
            .silent(self.silent);
        if self.method.has_body() {
            options = options.data_map(merged);
        }

        Request::send(&self.shared, url, options)
    }

    /// Run the request and decode the body as JSON, whatever the status.
    ///
    /// An empty body decodes to `Value::Null`.
    pub async fn fetch(&self, params: &Params) -> Result<Value, SdkError> {
        let _guard = (!self.silent).then(|| {
            TransactionGuard::open(
                &self.shared.tracker,
                &self.shared.bus,
                events::RESOURCE_START,
                events::RESOURCE_END,
            )
        });

        let result = async {
            let request = self.new_request(params)?;
            let response = request.result().await?;
            if response.body.is_empty() {
                Ok(Value::Null)
            } else {
                response.json::<Value>()
            }
        }
        .await;

        if let Err(err) = &result {
            tracing::error!(endpoint = ?self.endpoint.command, error = %err, "resource fetch failed");
        }
        result
    }

    /// Fetch with the default parameters only.
    pub async fn execute(&self) -> Result<Value, SdkError> {
        self.fetch(&Params::new()).await
    }

    /// Callback flavour of `fetch`: runs on the current runtime and hands the
    /// outcome to `callback`.
    pub fn fetch_with<F>(&self, params: Params, callback: F) -> Result<JoinHandle<()>, SdkError>
    where
        F: FnOnce(Result<Value, SdkError>) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SdkError::Transport(format!("no async runtime: {e}")))?;
        let resource = self.clone();
        Ok(runtime.spawn(async move {
            callback(resource.fetch(&params).await);
        }))
    }

    fn merged_params(&self, params: &Params) -> Params {
        let mut merged = self.state.lock().params.clone();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}
