//! Client SDK core for the resource platform.
//!
//! # Overview
//! A `Client` bootstraps a registry of named resources from the platform,
//! authenticates, and issues HTTP requests built from endpoint templates.
//! Every request and resource fetch is tracked as a transaction, and the
//! client emits `startFetching`/`endFetching` around each busy period on its
//! own `EventBus`.
//!
//! # Design
//! - Requests start when they are created; `Request` is a handle to a shared
//!   result that any number of callers may await.
//! - Network IO sits behind the `Transport` trait. `UreqTransport` is the
//!   default; tests plug in an in-memory one.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod http;
pub mod registry;
pub mod request;
pub mod resource;
pub mod tracker;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

pub use client::{Client, ResourcesPhase, CLIENT_LISTENER_WEIGHT};
pub use config::ClientConfig;
pub use endpoint::{EndpointSpec, Params};
pub use error::SdkError;
pub use events::{listener, Callback, Emission, EventBus, ListenerId};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use registry::{RegistryEntry, ResourceRegistry};
pub use request::{Request, RequestOptions};
pub use resource::Resource;
pub use tracker::{TransactionGuard, TransactionId, TransactionTracker};
pub use transport::{Transport, UreqTransport};
pub use types::{AuthToken, Credentials, ResourceList, ResourceSpec};
