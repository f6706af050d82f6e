//! Storefront HTTP API.
//!
//! Everything that talks to the storefront lives here: the serde types for
//! its JSON payloads, the authenticated [`ApiClient`], and the [`UrlSigner`]
//! trait the download orchestrator uses to re-resolve ephemeral catalog URLs
//! just in time.
//!
//! The rest of the crate treats the fetched records as an opaque snapshot;
//! pagination, cookies, and headers never leak past this module.

mod client;
mod types;

pub use client::{ApiClient, UrlSigner};
pub use types::{
    CatalogDownload, CatalogEntry, DownloadEntry, DownloadStruct, GameKey, Order, Product,
    SignedUrl, SubProduct, WebUrl,
};

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that can occur while talking to the storefront.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// A request failed at the transport level (DNS, TLS, connect, timeout).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// The response body was not the JSON shape we expected.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The signing endpoint returned a URL that does not parse.
    #[error("signed URL {url:?} is not a valid URL")]
    InvalidSignedUrl { url: String },
}

impl ApiError {
    /// Whether a retry might succeed. Decode failures and malformed signed
    /// URLs are deterministic; transport errors and 5xx/429 are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}
