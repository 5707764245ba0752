//! Wire DTOs exchanged with the platform.
//!
//! # Design
//! These mirror the mock-server's schema but are defined independently so
//! integration tests catch drift between the two. Bootstrap entries stay as
//! raw `Value`s until each one is validated on its own: a single malformed
//! descriptor must not fail the whole list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::endpoint::EndpointSpec;
use crate::error::SdkError;
use crate::http::HttpMethod;

/// One entry of the bootstrap resource list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(flatten)]
    pub endpoint: EndpointSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Fetches of this resource are not tracked as transactions.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub silent_fetch: bool,
}

impl ResourceSpec {
    pub fn new(endpoint: EndpointSpec) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method.as_str().to_string());
        self
    }

    pub fn validate(&self) -> Result<HttpMethod, SdkError> {
        self.endpoint.validate()?;
        match self.method.as_deref() {
            Some(method) => method.parse(),
            None => Ok(HttpMethod::Get),
        }
    }

    /// The registry key: `model`, else `command`, else `module`.
    pub fn name(&self) -> Option<&str> {
        [&self.model, &self.endpoint.command, &self.endpoint.module]
            .into_iter()
            .find_map(|field| field.as_deref().filter(|s| !s.is_empty()))
    }
}

/// The bootstrap list arrives either bare or wrapped in `endpoints`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResourceList {
    Wrapped { endpoints: Vec<Value> },
    Bare(Vec<Value>),
}

impl ResourceList {
    pub fn into_entries(self) -> Vec<Value> {
        match self {
            ResourceList::Wrapped { endpoints } => endpoints,
            ResourceList::Bare(entries) => entries,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Successful login response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
}
