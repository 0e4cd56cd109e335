//! The HTTP capability the protocol operations run on.
//!
//! A transport performs one request and hands back the response body. The
//! blocking [`Transport`] yields a [`std::io::Read`]; the [`AsyncTransport`]
//! yields a byte [`Stream`](futures::Stream). Both default implementations
//! are backed by `reqwest` and live in [`crate::blocking`] and
//! [`crate::client`].

use crate::{GitError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;
use std::io::Read;

/// Response body of an [`AsyncTransport`].
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// HTTP Basic credentials.
///
/// Applied only when at least one of username or password is set.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: Option<String>,
    /// Password or access token.
    pub password: Option<String>,
}

impl Credentials {
    /// Creates credentials from optional parts.
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }

    /// Creates credentials with both parts set.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(Some(username.into()), Some(password.into()))
    }

    /// Returns true if neither part is set.
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }

    /// The `(username, password)` pair for Basic auth, if any part is set.
    pub fn basic_auth(&self) -> Option<(&str, Option<&str>)> {
        if self.is_empty() {
            return None;
        }
        Some((
            self.username.as_deref().unwrap_or_default(),
            self.password.as_deref(),
        ))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

/// A single smart HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Full URL.
    pub url: String,
    /// `Content-Type` header for POST bodies.
    pub content_type: Option<&'static str>,
    /// Request body, empty for GET.
    pub body: Bytes,
    /// Basic auth credentials.
    pub credentials: Option<Credentials>,
}

impl Request {
    /// Creates a GET request.
    pub fn get(url: impl Into<String>, credentials: Option<&Credentials>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            content_type: None,
            body: Bytes::new(),
            credentials: credentials.cloned(),
        }
    }

    /// Creates a POST request.
    pub fn post(
        url: impl Into<String>,
        content_type: &'static str,
        body: Bytes,
        credentials: Option<&Credentials>,
    ) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            content_type: Some(content_type),
            body,
            credentials: credentials.cloned(),
        }
    }

    /// Basic auth to apply, if any.
    pub fn basic_auth(&self) -> Option<(&str, Option<&str>)> {
        self.credentials.as_ref().and_then(Credentials::basic_auth)
    }
}

/// Maps a non-2xx status to a transport error.
pub(crate) fn check_status(url: &str, status: u16) -> Result<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    tracing::warn!(url = %url, status, "remote returned an error status");
    Err(GitError::Transport {
        url: url.to_string(),
        status,
    })
}

/// Blocking transport: one request, body returned as a reader.
pub trait Transport {
    /// Response body reader.
    type Body: Read;

    /// Performs the request. Non-2xx responses must be reported as
    /// [`GitError::Transport`].
    fn send(&self, request: Request) -> Result<Self::Body>;
}

/// Async transport: one request, body returned as a byte stream.
///
/// Dropping the returned stream aborts the pending read.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    /// Performs the request. Non-2xx responses must be reported as
    /// [`GitError::Transport`].
    async fn send(&self, request: Request) -> Result<BodyStream>;
}
