//! Origin HTTP client.
//!
//! # Responsibilities
//! - Build the origin request (URI rewrite, header copy)
//! - Enforce the origin's request timeout
//! - Classify failures for status mapping and metrics

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, uri::InvalidUri, HeaderMap, HeaderName, Method, Request, Response, StatusCode, Uri};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::config::OriginConfig;

/// Headers never forwarded to an origin.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Error type for origin requests.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid origin uri '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: InvalidUri,
    },

    #[error("failed to build origin request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("origin request failed: {0}")]
    Connect(#[from] hyper_util::client::legacy::Error),

    #[error("origin did not respond within {0:?}")]
    Timeout(Duration),
}

impl UpstreamError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::InvalidUri { .. } | UpstreamError::Request(_) => "request",
            UpstreamError::Connect(_) => "connect",
            UpstreamError::Timeout(_) => "timeout",
        }
    }

    /// Status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            UpstreamError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Shared client for all origins.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClient {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    /// Send a request to `origin` at `path_and_query`.
    pub async fn send(
        &self,
        origin: &OriginConfig,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<Response<Incoming>, UpstreamError> {
        let url = origin.upstream_url(path_and_query);
        let uri = Uri::try_from(url.as_str()).map_err(|source| UpstreamError::InvalidUri {
            uri: url.clone(),
            source,
        })?;

        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(forwarded) = builder.headers_mut() {
            for (name, value) in headers {
                if !HOP_BY_HOP.contains(name) {
                    forwarded.append(name.clone(), value.clone());
                }
            }
        }
        let request = builder.body(body)?;

        let timeout = Duration::from_secs(origin.timeout_secs);
        match tokio::time::timeout(timeout, self.client.request(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        }
    }
}
