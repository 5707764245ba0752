//! Client configuration.
//!
//! Every field is optional; unset fields take the platform defaults below.
//! The JSON form uses camelCase keys (`domainPrefix`, `apiKey`, ...), and
//! `from_env` reads the same settings from `APISDK_*` environment variables.

use serde::Deserialize;

use crate::endpoint::EndpointSpec;
use crate::error::SdkError;

pub use crate::endpoint::DEFAULT_PROTOCOL;
pub const DEFAULT_HOST: &str = "jooycar.com";
pub const DEFAULT_DOMAIN_PREFIX: &str = "api01";
pub const DEFAULT_NAMESPACE: &str = "api";
pub const DEFAULT_VERSION: &str = "1";
pub const DEFAULT_MODULE: &str = "core";
pub const DEFAULT_API_KEY: &str = "jooycar";

const ENV_PREFIX: &str = "APISDK_";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub protocol: String,
    pub host: String,
    pub domain_prefix: String,
    pub basepath: String,
    pub namespace: String,
    pub version: String,
    pub module: String,
    pub extension: String,
    pub port: Option<u16>,
    pub api_key: String,
    /// Log every outgoing request at debug level.
    pub debug: bool,
    /// Where the bootstrap resource list lives.
    pub resources_spec: EndpointSpec,
    /// Where `login` posts credentials.
    pub login_spec: EndpointSpec,
    pub max_listeners: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            host: DEFAULT_HOST.to_string(),
            domain_prefix: DEFAULT_DOMAIN_PREFIX.to_string(),
            basepath: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            version: DEFAULT_VERSION.to_string(),
            module: DEFAULT_MODULE.to_string(),
            extension: String::new(),
            port: None,
            api_key: DEFAULT_API_KEY.to_string(),
            debug: false,
            resources_spec: EndpointSpec::command("resources"),
            login_spec: EndpointSpec {
                module: Some("auth".to_string()),
                command: Some("login".to_string()),
                ..EndpointSpec::default()
            },
            max_listeners: None,
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `host` on `port` over plain HTTP with no
    /// domain prefix. Handy for local servers.
    pub fn local(host: &str, port: u16) -> Self {
        Self {
            protocol: "http".to_string(),
            host: host.to_string(),
            domain_prefix: String::new(),
            port: Some(port),
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, SdkError> {
        serde_json::from_str(raw).map_err(|e| SdkError::InvalidConfig(e.to_string()))
    }

    /// Build configuration from environment variables.
    ///
    /// Reads `APISDK_PROTOCOL`, `APISDK_HOST`, `APISDK_DOMAIN_PREFIX`,
    /// `APISDK_BASEPATH`, `APISDK_NAMESPACE`, `APISDK_VERSION`,
    /// `APISDK_MODULE`, `APISDK_EXTENSION`, `APISDK_PORT`, `APISDK_API_KEY`,
    /// `APISDK_DEBUG` and `APISDK_MAX_LISTENERS`. Unset variables keep their
    /// defaults.
    pub fn from_env() -> Result<Self, SdkError> {
        Self::from_lookup(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SdkError> {
        let mut config = Self::default();
        let strings = [
            ("PROTOCOL", &mut config.protocol),
            ("HOST", &mut config.host),
            ("DOMAIN_PREFIX", &mut config.domain_prefix),
            ("BASEPATH", &mut config.basepath),
            ("NAMESPACE", &mut config.namespace),
            ("VERSION", &mut config.version),
            ("MODULE", &mut config.module),
            ("EXTENSION", &mut config.extension),
            ("API_KEY", &mut config.api_key),
        ];
        for (name, field) in strings {
            if let Some(value) = lookup(name) {
                *field = value;
            }
        }
        if let Some(port) = lookup("PORT") {
            config.port = Some(parse_env("PORT", &port)?);
        }
        if let Some(max) = lookup("MAX_LISTENERS") {
            config.max_listeners = Some(parse_env("MAX_LISTENERS", &max)?);
        }
        if let Some(debug) = lookup("DEBUG") {
            config.debug = matches!(debug.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = Some(max);
        self
    }

    pub fn with_resources_spec(mut self, spec: EndpointSpec) -> Self {
        self.resources_spec = spec;
        self
    }

    pub fn with_login_spec(mut self, spec: EndpointSpec) -> Self {
        self.login_spec = spec;
        self
    }

    /// The endpoint defaults every resource inherits.
    pub fn endpoint_defaults(&self) -> EndpointSpec {
        EndpointSpec {
            protocol: Some(self.protocol.clone()),
            host: Some(self.host.clone()),
            domain_prefix: Some(self.domain_prefix.clone()),
            basepath: Some(self.basepath.clone()),
            namespace: Some(self.namespace.clone()),
            version: Some(self.version.clone()),
            module: Some(self.module.clone()),
            command: None,
            extension: Some(self.extension.clone()),
            port: self.port,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, SdkError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| SdkError::InvalidConfig(format!("{ENV_PREFIX}{name}={raw}: {e}")))
}
