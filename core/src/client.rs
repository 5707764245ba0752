//! The SDK entry point.
//!
//! # Design
//! `Client` is a cheap, cloneable handle. The state every resource needs
//! (configuration, endpoint defaults, token, transport, event bus, tracker)
//! lives in `ClientShared`, which resources hold on to. The resource registry
//! lives only on the client, so resources never keep the registry alive and
//! there is no reference cycle.
//!
//! Resource loading moves through three phases:
//!
//! ```text
//! Uninitialized ──resources()──▶ Unloaded ──bootstrap ok──▶ Loaded
//!                                   ▲                          │
//!                                   └──────── flush() ─────────┘
//! ```
//!
//! Two `resources()` calls racing before the first one finishes are not
//! coordinated: both fetch the bootstrap list and the one that finishes last
//! replaces the registry.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::config::ClientConfig;
use crate::endpoint::{EndpointSpec, Params};
use crate::error::SdkError;
use crate::events::{self, Callback, EventBus, ListenerId};
use crate::http::HttpMethod;
use crate::registry::{RegistryEntry, ResourceRegistry};
use crate::request::{Request, RequestOptions};
use crate::resource::Resource;
use crate::tracker::TransactionTracker;
use crate::transport::{Transport, UreqTransport};
use crate::types::{AuthToken, Credentials, ResourceList, ResourceSpec};

/// Weight of listeners registered through `Client::on`, so they run ahead of
/// default-weight listeners registered on the bus directly.
pub const CLIENT_LISTENER_WEIGHT: i32 = 2;

struct AuthState {
    token: String,
    logged_in: bool,
}

/// State shared between the client and every resource it creates.
pub(crate) struct ClientShared {
    pub(crate) config: ClientConfig,
    pub(crate) defaults: EndpointSpec,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) tracker: Arc<TransactionTracker>,
    auth: Mutex<AuthState>,
}

impl ClientShared {
    pub(crate) fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let bus = Arc::new(EventBus::new(config.max_listeners));
        let tracker = Arc::new(TransactionTracker::new(Arc::clone(&bus)));
        Self {
            defaults: config.endpoint_defaults(),
            auth: Mutex::new(AuthState {
                token: config.api_key.clone(),
                logged_in: false,
            }),
            config,
            transport,
            bus,
            tracker,
        }
    }

    pub(crate) fn token(&self) -> String {
        self.auth.lock().token.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcesPhase {
    Uninitialized,
    Unloaded,
    Loaded,
}

struct LoaderState {
    phase: ResourcesPhase,
    spec: EndpointSpec,
    registry: ResourceRegistry,
}

#[derive(Clone)]
pub struct Client {
    shared: Arc<ClientShared>,
    loader: Arc<Mutex<LoaderState>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.shared.config)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Client {
    /// Client that talks HTTP through ureq.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(UreqTransport::new()))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let spec = config.resources_spec.clone();
        Self {
            shared: Arc::new(ClientShared::new(config, transport)),
            loader: Arc::new(Mutex::new(LoaderState {
                phase: ResourcesPhase::Uninitialized,
                spec,
                registry: ResourceRegistry::default(),
            })),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.shared.bus
    }

    /// Listen on the client's bus with `CLIENT_LISTENER_WEIGHT`.
    pub fn on(&self, event: &str, callback: Callback) -> ListenerId {
        self.shared.bus.on(event, callback, None, CLIENT_LISTENER_WEIGHT)
    }

    pub fn once(&self, event: &str, callback: Callback) -> ListenerId {
        self.shared.bus.once(event, callback, None, CLIENT_LISTENER_WEIGHT)
    }

    pub fn remove(&self, event: &str, callback: Option<&Callback>) -> usize {
        self.shared.bus.remove(event, callback)
    }

    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        self.shared.bus.emit(event, payload)
    }

    /// True while any request or resource fetch is in flight.
    pub fn is_fetching(&self) -> bool {
        self.shared.tracker.is_active()
    }

    pub fn is_logged_in(&self) -> bool {
        self.shared.auth.lock().logged_in
    }

    /// The token sent with requests that have no resource-level override.
    pub fn token(&self) -> String {
        self.shared.token()
    }

    pub fn phase(&self) -> ResourcesPhase {
        self.loader.lock().phase
    }

    /// Issue an ad-hoc request to `url`. The request is tracked like any
    /// other but carries no authorization unless `options` sets it.
    pub fn request(&self, url: impl Into<String>, options: RequestOptions) -> Result<Request, SdkError> {
        Request::send(&self.shared, url.into(), options)
    }

    /// Build a resource from a descriptor without registering it.
    pub fn define(&self, spec: &ResourceSpec) -> Result<Resource, SdkError> {
        Resource::new(Arc::clone(&self.shared), spec)
    }

    pub fn resource(&self, name: &str) -> Option<RegistryEntry> {
        self.loader.lock().registry.get(name).cloned()
    }

    pub fn action(&self, name: &str, action: &str) -> Option<Resource> {
        self.loader.lock().registry.action(name, action).cloned()
    }

    /// Drop every loaded resource; the next `resources()` call refetches.
    pub fn flush(&self) {
        let mut loader = self.loader.lock();
        loader.registry.clear();
        loader.phase = ResourcesPhase::Unloaded;
        tracing::debug!("resources flushed");
    }

    /// Load the resource registry, or return it from cache.
    ///
    /// Passing a bootstrap spec different from the one in effect flushes the
    /// registry first. Malformed entries in the bootstrap list are logged and
    /// skipped.
    pub async fn resources(&self, spec: Option<EndpointSpec>) -> Result<ResourceRegistry, SdkError> {
        let bootstrap_spec = {
            let mut loader = self.loader.lock();
            if let Some(spec) = spec {
                if spec != loader.spec {
                    tracing::debug!(?spec, "bootstrap spec changed, flushing resources");
                    loader.registry.clear();
                    loader.phase = ResourcesPhase::Unloaded;
                    loader.spec = spec;
                }
            }
            if loader.phase == ResourcesPhase::Loaded {
                let registry = loader.registry.clone();
                drop(loader);
                tracing::debug!("resources served from cache");
                self.shared
                    .bus
                    .emit(events::RESOURCES_READY, &json!({ "fromCache": true, "count": registry.len() }));
                return Ok(registry);
            }
            loader.phase = ResourcesPhase::Unloaded;
            loader.spec.clone()
        };

        let bootstrap = self.define(&ResourceSpec::new(bootstrap_spec))?;
        let body = bootstrap.execute().await?;
        let list: ResourceList =
            serde_json::from_value(body).map_err(|e| SdkError::Deserialization(format!("resource list: {e}")))?;

        let mut registry = ResourceRegistry::default();
        for entry in list.into_entries() {
            if let Err(err) = self.register(&mut registry, entry) {
                tracing::warn!(error = %err, "skipping invalid resource descriptor");
            }
        }

        {
            let mut loader = self.loader.lock();
            loader.registry = registry.clone();
            loader.phase = ResourcesPhase::Loaded;
        }
        tracing::info!(count = registry.len(), "resources loaded");
        self.shared
            .bus
            .emit(events::RESOURCES_READY, &json!({ "fromCache": false, "count": registry.len() }));
        Ok(registry)
    }

    fn register(&self, registry: &mut ResourceRegistry, entry: Value) -> Result<(), SdkError> {
        let spec: ResourceSpec = serde_json::from_value(entry.clone())
            .map_err(|e| SdkError::invalid_spec(format!("{entry}: {e}")))?;
        let resource = self
            .define(&spec)
            .map_err(|e| SdkError::invalid_spec(format!("{entry}: {e}")))?;
        let name = spec
            .name()
            .ok_or_else(|| SdkError::invalid_spec(format!("{entry}: no name")))?;
        registry.insert(name, spec.action.as_deref(), resource);
        Ok(())
    }

    /// Exchange credentials for a token, then reload resources under it.
    ///
    /// A non-2xx answer, or one without a `token`, is `Authentication`.
    /// Transport failures are returned as they are. In both cases the token
    /// and the registry are left untouched.
    ///
    /// Once the server has issued a token the session is established: the
    /// client stays logged in under the new token even if the resource reload
    /// that follows fails. That reload error is returned with the phase left
    /// at `Unloaded`; call `resources()` to retry it, not `login` again.
    pub async fn login(&self, email: &str, password: &str) -> Result<ResourceRegistry, SdkError> {
        let spec = ResourceSpec::new(self.shared.config.login_spec.clone()).with_method(HttpMethod::Post);
        let login = self.define(&spec)?;

        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let params = match serde_json::to_value(&credentials) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Params::new(),
            Err(e) => return Err(SdkError::Serialization(e.to_string())),
        };

        let response = login.new_request(&params)?.result().await?;
        if !response.is_success() {
            let message = response.text().unwrap_or_default();
            tracing::warn!(status = response.status, "login rejected");
            return Err(SdkError::Authentication {
                status: response.status,
                message,
            });
        }
        let AuthToken { token } = response.json().map_err(|_| SdkError::Authentication {
            status: response.status,
            message: "response carries no token".to_string(),
        })?;

        {
            let mut auth = self.shared.auth.lock();
            auth.token = token;
            auth.logged_in = true;
        }
        tracing::info!(email, "logged in");
        self.shared.bus.emit(events::LOGIN, &json!({ "email": email }));

        self.flush();
        self.resources(None).await
    }

    /// Go back to the configured API key and reload resources under it.
    ///
    /// The logout itself cannot fail. If the reload does, its error is
    /// returned with the client already logged out and the phase at
    /// `Unloaded`.
    pub async fn logout(&self) -> Result<ResourceRegistry, SdkError> {
        {
            let mut auth = self.shared.auth.lock();
            auth.token = self.shared.config.api_key.clone();
            auth.logged_in = false;
        }
        tracing::info!("logged out");
        self.shared.bus.emit(events::LOGOUT, &Value::Null);

        self.flush();
        self.resources(None).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::events::listener;
    use crate::test_support::MockTransport;

    const BOOTSTRAP: &str = "http://127.0.0.1:9/api/v1/core/resources";
    const LOGIN_URL: &str = "http://127.0.0.1:9/api/v1/auth/login";
    const BRANDS: &str = "http://127.0.0.1:9/api/v1/core/brands";

    fn catalog() -> Value {
        json!({ "endpoints": [
            {"model": "brand", "action": "list", "command": "brands"},
            {"model": "brand", "action": "get", "command": "brands/:id"},
            {"model": "models", "command": "models", "method": "GET"},
        ]})
    }

    fn client() -> (Arc<MockTransport>, Client) {
        let transport = MockTransport::new();
        transport.respond_json(BOOTSTRAP, 200, catalog());
        let config = ClientConfig::local("127.0.0.1", 9).with_api_key("public-key");
        let client = Client::with_transport(config, Arc::clone(&transport) as Arc<dyn Transport>);
        (transport, client)
    }

    fn record(client: &Client, event: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on(
            event,
            listener(move |e| {
                sink.lock().push(e.payload.clone());
                Ok(())
            }),
        );
        seen
    }

    fn bearer(transport: &MockTransport, url: &str) -> String {
        transport
            .requests()
            .iter()
            .rev()
            .find(|r| r.url == url)
            .and_then(|r| r.headers.get(http::header::AUTHORIZATION))
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn loads_the_bootstrap_list() {
        let (_, client) = client();
        assert_eq!(client.phase(), ResourcesPhase::Uninitialized);

        let registry = client.resources(None).await.unwrap();
        assert_eq!(client.phase(), ResourcesPhase::Loaded);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["brand", "models"]);
        assert!(client.action("brand", "get").is_some());
        assert!(matches!(client.resource("models"), Some(RegistryEntry::Single(_))));
    }

    #[tokio::test]
    async fn bare_bootstrap_list_is_accepted() {
        let (transport, client) = client();
        transport.respond_json(BOOTSTRAP, 200, json!([{"model": "brand", "command": "brands"}]));
        let registry = client.resources(None).await.unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn invalid_descriptor_is_skipped_with_a_warning() {
        let (transport, client) = client();
        transport.respond_json(
            BOOTSTRAP,
            200,
            json!([
                {"model": "ghost", "method": "GET"},
                {"model": "brand", "action": "list", "command": "brands"},
            ]),
        );

        let registry = client.resources(None).await.unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.action("brand", "list").is_some());
        assert!(registry.get("ghost").is_none());
        assert!(logs_contain("skipping invalid resource descriptor"));
    }

    #[tokio::test]
    async fn loaded_resources_come_from_cache() {
        let (transport, client) = client();
        let ready = record(&client, events::RESOURCES_READY);

        client.resources(None).await.unwrap();
        client.resources(None).await.unwrap();

        assert_eq!(transport.calls_to(BOOTSTRAP), 1);
        let ready = ready.lock();
        assert_eq!(ready[0]["fromCache"], false);
        assert_eq!(ready[1]["fromCache"], true);
    }

    #[tokio::test]
    async fn same_spec_keeps_the_cache_and_new_spec_flushes() {
        let (transport, client) = client();
        let catalog_url = "http://127.0.0.1:9/api/v1/meta/catalog";
        transport.respond_json(catalog_url, 200, json!([{"model": "fleet", "command": "cars"}]));

        client.resources(None).await.unwrap();
        client
            .resources(Some(client.config().resources_spec.clone()))
            .await
            .unwrap();
        assert_eq!(transport.calls(), 1);

        let other = EndpointSpec {
            module: Some("meta".into()),
            command: Some("catalog".into()),
            ..EndpointSpec::default()
        };
        let registry = client.resources(Some(other)).await.unwrap();
        assert_eq!(transport.calls_to(catalog_url), 1);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["fleet"]);
        assert!(client.resource("brand").is_none());
    }

    #[tokio::test]
    async fn invalid_bootstrap_spec_fails_before_any_request() {
        let (transport, client) = client();
        let err = client.resources(Some(EndpointSpec::default())).await.unwrap_err();
        assert!(matches!(err, SdkError::InvalidResourceSpec(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn failed_bootstrap_leaves_resources_unloaded() {
        let (transport, client) = client();
        transport.fail(BOOTSTRAP, "connection refused");
        let err = client.resources(None).await.unwrap_err();
        assert!(matches!(err, SdkError::Transport(_)));
        assert_eq!(client.phase(), ResourcesPhase::Unloaded);
        assert!(!client.is_fetching());
    }

    #[tokio::test]
    async fn flush_forces_a_reload() {
        let (transport, client) = client();
        client.resources(None).await.unwrap();
        client.flush();
        assert_eq!(client.phase(), ResourcesPhase::Unloaded);
        assert!(client.resource("brand").is_none());
        client.resources(None).await.unwrap();
        assert_eq!(transport.calls_to(BOOTSTRAP), 2);
    }

    #[tokio::test]
    async fn login_then_logout_restores_the_api_key() {
        let (transport, client) = client();
        transport.respond_json(LOGIN_URL, 200, json!({"token": "user-token"}));
        let logins = record(&client, events::LOGIN);

        client.login("ana@example.com", "secret").await.unwrap();
        assert!(client.is_logged_in());
        assert_eq!(client.token(), "user-token");
        assert_eq!(bearer(&transport, BOOTSTRAP), "Bearer user-token");
        assert_eq!(logins.lock()[0]["email"], "ana@example.com");

        let sent: Value = serde_json::from_slice(
            transport.requests().iter().find(|r| r.url == LOGIN_URL).unwrap().body.as_deref().unwrap(),
        )
        .unwrap();
        assert_eq!(sent, json!({"email": "ana@example.com", "password": "secret"}));

        client.logout().await.unwrap();
        assert!(!client.is_logged_in());
        assert_eq!(client.token(), "public-key");
        assert_eq!(bearer(&transport, BOOTSTRAP), "Bearer public-key");
        assert_eq!(transport.calls_to(BOOTSTRAP), 2);
    }

    #[tokio::test]
    async fn login_refreshes_an_already_loaded_registry() {
        let (transport, client) = client();
        transport.respond_json(LOGIN_URL, 200, json!({"token": "t"}));
        client.resources(None).await.unwrap();
        client.login("a@b.c", "pw").await.unwrap();
        assert_eq!(transport.calls_to(BOOTSTRAP), 2);
    }

    #[tokio::test]
    async fn rejected_login_keeps_the_token() {
        let (transport, client) = client();
        transport.respond(LOGIN_URL, 401, "bad credentials");
        let err = client.login("a@b.c", "wrong").await.unwrap_err();
        assert_eq!(
            err,
            SdkError::Authentication {
                status: 401,
                message: "bad credentials".into()
            }
        );
        assert_eq!(client.token(), "public-key");
        assert!(!client.is_logged_in());
        assert_eq!(transport.calls_to(BOOTSTRAP), 0);
    }

    #[tokio::test]
    async fn login_without_token_is_an_authentication_error() {
        let (transport, client) = client();
        transport.respond_json(LOGIN_URL, 200, json!({"user": "a"}));
        let err = client.login("a@b.c", "pw").await.unwrap_err();
        assert!(matches!(err, SdkError::Authentication { status: 200, .. }));
    }

    #[tokio::test]
    async fn login_transport_failure_passes_through() {
        let (transport, client) = client();
        transport.fail(LOGIN_URL, "dns failure");
        let err = client.login("a@b.c", "pw").await.unwrap_err();
        assert_eq!(err, SdkError::Transport("dns failure".into()));
    }

    #[tokio::test]
    async fn login_succeeds_but_reload_fails() {
        let (transport, client) = client();
        client.resources(None).await.unwrap();
        transport.respond_json(LOGIN_URL, 200, json!({"token": "user-token"}));
        transport.fail(BOOTSTRAP, "bootstrap down");

        let err = client.login("a@b.c", "pw").await.unwrap_err();
        assert_eq!(err, SdkError::Transport("bootstrap down".into()));
        assert!(client.is_logged_in());
        assert_eq!(client.token(), "user-token");
        assert_eq!(client.phase(), ResourcesPhase::Unloaded);
        assert!(client.resource("brand").is_none());

        // Retrying the reload keeps the session and needs no second login.
        transport.respond_json(BOOTSTRAP, 200, catalog());
        client.resources(None).await.unwrap();
        assert_eq!(client.phase(), ResourcesPhase::Loaded);
        assert_eq!(bearer(&transport, BOOTSTRAP), "Bearer user-token");
        assert_eq!(transport.calls_to(LOGIN_URL), 1);
    }

    #[tokio::test]
    async fn logout_succeeds_but_reload_fails() {
        let (transport, client) = client();
        transport.respond_json(LOGIN_URL, 200, json!({"token": "user-token"}));
        client.login("a@b.c", "pw").await.unwrap();
        transport.fail(BOOTSTRAP, "bootstrap down");

        let err = client.logout().await.unwrap_err();
        assert_eq!(err, SdkError::Transport("bootstrap down".into()));
        assert!(!client.is_logged_in());
        assert_eq!(client.token(), "public-key");
        assert_eq!(client.phase(), ResourcesPhase::Unloaded);
    }

    #[tokio::test]
    async fn is_fetching_follows_in_flight_work() {
        let (transport, client) = client();
        let gate = transport.hold(BOOTSTRAP);
        assert!(!client.is_fetching());

        let loader = client.clone();
        let load = tokio::spawn(async move { loader.resources(None).await });
        tokio::task::yield_now().await;
        assert!(client.is_fetching());

        gate.release();
        load.await.unwrap().unwrap();
        assert!(!client.is_fetching());
    }

    #[tokio::test]
    async fn concurrent_fetches_produce_one_aggregate_pair() {
        let (_, client) = client();
        client.resources(None).await.unwrap();
        let starts = record(&client, events::START_FETCHING);
        let ends = record(&client, events::END_FETCHING);
        let list = client.action("brand", "list").unwrap();

        let (a, b, c) = tokio::join!(list.execute(), list.execute(), list.execute());
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert_eq!(starts.lock().len(), 1);
        assert_eq!(ends.lock().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_loads_each_fetch_and_last_one_wins() {
        let (transport, client) = client();
        let (first, second) = tokio::join!(client.resources(None), client.resources(None));
        assert_eq!(first.unwrap().len(), 2);
        assert_eq!(second.unwrap().len(), 2);
        assert_eq!(transport.calls_to(BOOTSTRAP), 2);
        assert_eq!(client.phase(), ResourcesPhase::Loaded);
    }

    #[tokio::test]
    async fn clients_do_not_share_listeners() {
        let (_, first) = client();
        let (_, second) = client();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        first.on(
            events::RESOURCES_READY,
            listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        second.resources(None).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(second.events().listeners_count(events::RESOURCES_READY), 0);

        first.resources(None).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_listeners_run_before_default_weight_ones() {
        let (_, client) = client();
        let order = Arc::new(Mutex::new(Vec::new()));
        let low = Arc::clone(&order);
        client.events().on(
            "ping",
            listener(move |_| {
                low.lock().push("bus");
                Ok(())
            }),
            None,
            events::DEFAULT_WEIGHT,
        );
        let high = Arc::clone(&order);
        client.on(
            "ping",
            listener(move |_| {
                high.lock().push("client");
                Ok(())
            }),
        );
        assert_eq!(client.emit("ping", &Value::Null), 2);
        assert_eq!(*order.lock(), vec!["client", "bus"]);
    }

    #[tokio::test]
    async fn ad_hoc_requests_are_tracked() {
        let (transport, client) = client();
        transport.respond(BRANDS, 200, "[]");
        let request = client.request(BRANDS, RequestOptions::get()).unwrap();
        assert!(request.transaction().is_some());
        assert_eq!(request.text().await.unwrap(), "[]");
        assert!(bearer(&transport, BRANDS).is_empty());
    }
}
