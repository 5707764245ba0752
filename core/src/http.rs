//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The SDK
//! builds `HttpRequest` values and hands them to a `Transport`; whatever the
//! transport returns comes back as an `HttpResponse` with the body fully
//! buffered. Because the body is already in memory, every projection
//! (`text`, `json`, `bytes`) reads the same bytes and none of them consumes
//! the response.
//!
//! Headers use `http::HeaderMap`, which normalizes names to lowercase, so
//! header lookups and overwrites are case-insensitive.

use std::fmt;
use std::str::FromStr;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde::de::DeserializeOwned;

use crate::error::SdkError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Uppercase wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Whether requests with this method carry a payload.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = SdkError;

    /// Case-insensitive: `"get"`, `"Get"` and `"GET"` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(SdkError::invalid_spec(format!("unknown HTTP method: {other}"))),
        }
    }
}

/// An HTTP request described as plain data.
///
/// Built by `Request` and executed by a `Transport`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Result<String, SdkError> {
        String::from_utf8(self.body.clone())
            .map_err(|e| SdkError::Deserialization(format!("invalid UTF-8: {e}")))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SdkError> {
        serde_json::from_slice(&self.body).map_err(|e| SdkError::Deserialization(e.to_string()))
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.body.clone()
    }
}

/// Validate one header pair. Either half failing is `InvalidHeader`.
pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), SdkError> {
    let header_name =
        HeaderName::try_from(name).map_err(|e| SdkError::InvalidHeader(format!("{name}: {e}")))?;
    let header_value =
        HeaderValue::try_from(value).map_err(|e| SdkError::InvalidHeader(format!("{name}: {e}")))?;
    Ok((header_name, header_value))
}
