//! Endpoint templates and URL resolution.
//!
//! # Design
//! An `EndpointSpec` is a bag of optional URL segments. `None` means "inherit
//! the client default" when a spec is merged over defaults; `Some("")` means
//! "explicitly omit this segment". `build` assembles
//!
//! ```text
//! protocol://[domainPrefix.]host[:port][/basepath][/namespace][/v<version>][/module][/command][.extension]
//! ```
//!
//! and then substitutes `:key` placeholders from a parameter map. Substitution
//! is plain text replacement applied in the map's key order (lexicographic for
//! `serde_json::Map`), so a key that is a prefix of another (`id` and `idx`)
//! also rewrites the longer placeholder: `:idx` becomes `1x` for `id = 1`.
//! Placeholders with no matching parameter stay in the URL untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SdkError;

/// Request parameters: URL substitutions and, for body-carrying methods, the
/// JSON payload.
pub type Params = Map<String, Value>;

pub const DEFAULT_PROTOCOL: &str = "https";

/// Declarative shape of an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basepath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "string_or_number")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl EndpointSpec {
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// A spec is usable only if it names a command or a module.
    pub fn validate(&self) -> Result<(), SdkError> {
        if is_set(&self.command) || is_set(&self.module) {
            Ok(())
        } else {
            Err(SdkError::invalid_spec("spec names neither a command nor a module"))
        }
    }

    /// Fill every unset field from `defaults`. Fields set on `self`, even to
    /// an empty string, win.
    pub fn with_defaults(&self, defaults: &EndpointSpec) -> EndpointSpec {
        fn pick<T: Clone>(own: &Option<T>, fallback: &Option<T>) -> Option<T> {
            own.clone().or_else(|| fallback.clone())
        }

        EndpointSpec {
            protocol: pick(&self.protocol, &defaults.protocol),
            host: pick(&self.host, &defaults.host),
            domain_prefix: pick(&self.domain_prefix, &defaults.domain_prefix),
            basepath: pick(&self.basepath, &defaults.basepath),
            namespace: pick(&self.namespace, &defaults.namespace),
            version: pick(&self.version, &defaults.version),
            module: pick(&self.module, &defaults.module),
            command: pick(&self.command, &defaults.command),
            extension: pick(&self.extension, &defaults.extension),
            port: pick(&self.port, &defaults.port),
        }
    }
}

/// Resolve `spec` into a URL and substitute `params` into it.
pub fn build(spec: &EndpointSpec, params: &Params) -> Result<String, SdkError> {
    spec.validate()?;

    let protocol = spec
        .protocol
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PROTOCOL);

    let mut url = format!("{protocol}://");
    if let Some(prefix) = segment(&spec.domain_prefix) {
        url.push_str(prefix);
        url.push('.');
    }
    if let Some(host) = segment(&spec.host) {
        url.push_str(host);
    }
    if let Some(port) = spec.port.filter(|p| *p != 0) {
        url.push(':');
        url.push_str(&port.to_string());
    }
    for part in [&spec.basepath, &spec.namespace] {
        if let Some(part) = segment(part) {
            url.push('/');
            url.push_str(part);
        }
    }
    if let Some(version) = segment(&spec.version) {
        url.push('/');
        if !version.starts_with(['v', 'V']) {
            url.push('v');
        }
        url.push_str(version);
    }
    for part in [&spec.module, &spec.command] {
        if let Some(part) = segment(part) {
            url.push('/');
            url.push_str(part);
        }
    }
    if let Some(extension) = segment(&spec.extension) {
        url.push('.');
        url.push_str(extension);
    }

    Ok(substitute(url, params))
}

/// Replace every `:key` in `url` with the stringified parameter value.
pub fn substitute(url: String, params: &Params) -> String {
    params.iter().fold(url, |acc, (key, value)| {
        acc.replace(&format!(":{key}"), &param_to_string(value))
    })
}

/// Strings are inserted raw; every other JSON value uses its JSON text.
pub fn param_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_set(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.is_empty())
}

fn segment(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

// Bootstrap lists sometimes carry `"version": 1`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number for version, got {other}"
        ))),
    }
}
