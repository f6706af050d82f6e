//! Authenticated HTTP client for the storefront API.
//!
//! Endpoints:
//! - `GET /api/v1/user/order?ajax=true` lists purchased order keys.
//! - `GET /api/v1/order/{gamekey}?ajax=true` fetches one full order.
//! - `GET /client/catalog?index={page}` pages through the subscription
//!   catalog until an empty page comes back.
//! - `POST /api/v1/user/download/sign` exchanges a catalog file reference
//!   for a short-lived signed download URL.
//!
//! Authentication is a single session cookie; the server rejects requests
//! without it with an HTML login page, which surfaces here as a decode
//! error on the first listing call.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_CHARSET, COOKIE};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::types::{CatalogEntry, GameKey, Order, SignedUrl};
use super::{ApiError, ApiResult, BoxFuture};

const BASE_URL: &str = "https://www.humblebundle.com";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolves a catalog file reference to a fresh signed URL.
///
/// Catalog download URLs expire between enumeration and transfer, so the
/// downloader re-signs just before each attempt. Dyn-compatible so tests
/// can substitute a canned signer.
pub trait UrlSigner: Send + Sync {
    fn sign_url(&self, machine_name: &str, file_name: &str) -> BoxFuture<'_, ApiResult<Url>>;
}

/// Storefront API client.
///
/// Cheap to clone; the underlying `reqwest::Client` is reference-counted.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    cookie: HeaderValue,
}

impl ApiClient {
    /// Builds a client for the production storefront.
    pub fn new(auth_token: &str, user_agent: &str) -> ApiResult<Self> {
        Self::with_base_url(auth_token, user_agent, BASE_URL)
    }

    /// Builds a client against an alternate base URL. Used by tests.
    pub fn with_base_url(auth_token: &str, user_agent: &str, base_url: &str) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_CHARSET, HeaderValue::from_static("utf-8"));

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(ApiError::ClientBuild)?;

        let cookie = HeaderValue::from_str(&session_cookie(auth_token)).map_err(|_| {
            ApiError::InvalidSignedUrl {
                url: "auth token contains characters invalid in a header".to_string(),
            }
        })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie,
        })
    }

    /// Lists the gamekeys of all purchased orders.
    pub async fn fetch_game_keys(&self) -> ApiResult<Vec<GameKey>> {
        self.get_json(&format!("{}/api/v1/user/order?ajax=true", self.base_url))
            .await
    }

    /// Fetches one full order by gamekey.
    pub async fn fetch_order(&self, gamekey: &str) -> ApiResult<Order> {
        self.get_json(&format!(
            "{}/api/v1/order/{}?ajax=true",
            self.base_url, gamekey
        ))
        .await
    }

    /// Pages through the whole subscription catalog.
    pub async fn fetch_catalog(&self) -> ApiResult<Vec<CatalogEntry>> {
        let mut entries = Vec::new();
        let mut page = 0usize;
        loop {
            let batch: Vec<CatalogEntry> = self
                .get_json(&format!("{}/client/catalog?index={}", self.base_url, page))
                .await?;
            if batch.is_empty() {
                break;
            }
            debug!(page, entries = batch.len(), "Fetched catalog page");
            entries.extend(batch);
            page += 1;
        }
        Ok(entries)
    }

    /// Opens a streaming GET against an arbitrary (usually signed) URL.
    ///
    /// Only the status is validated here; the caller consumes the body.
    /// Download URLs carry their authorization in the signature, and the
    /// session cookie must never leak to third-party CDN hosts, so it is
    /// attached only when the URL points back at the storefront itself.
    pub async fn get_stream(&self, url: Url) -> ApiResult<reqwest::Response> {
        let display = url.to_string();
        let storefront = self.is_storefront(&url);
        let mut request = self.http.get(url);
        if storefront {
            request = request.header(COOKIE, self.cookie.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: display.clone(),
                source,
            })?;
        check_status(&display, response.status())?;
        Ok(response)
    }

    /// Whether `url` points at the storefront origin rather than a signed
    /// download host.
    fn is_storefront(&self, url: &Url) -> bool {
        Url::parse(&self.base_url)
            .map(|base| {
                base.scheme() == url.scheme()
                    && base.host_str() == url.host_str()
                    && base.port_or_known_default() == url.port_or_known_default()
            })
            .unwrap_or(false)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        trace!(url, "GET");
        let response = self
            .http
            .get(url)
            .header(COOKIE, self.cookie.clone())
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;
        check_status(url, response.status())?;
        response.json().await.map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

impl UrlSigner for ApiClient {
    fn sign_url(&self, machine_name: &str, file_name: &str) -> BoxFuture<'_, ApiResult<Url>> {
        let url = format!("{}/api/v1/user/download/sign", self.base_url);
        let machine_name = machine_name.to_string();
        let file_name = file_name.to_string();
        Box::pin(async move {
            trace!(machine_name, file_name, "Signing download URL");
            let response = self
                .http
                .post(&url)
                .query(&[("machine_name", &machine_name), ("filename", &file_name)])
                .header(COOKIE, self.cookie.clone())
                .send()
                .await
                .map_err(|source| ApiError::Transport {
                    url: url.clone(),
                    source,
                })?;
            check_status(&url, response.status())?;
            let signed: SignedUrl = response.json().await.map_err(|source| ApiError::Decode {
                url: url.clone(),
                source,
            })?;
            Url::parse(&signed.signed_url).map_err(|_| ApiError::InvalidSignedUrl {
                url: signed.signed_url,
            })
        })
    }
}

fn check_status(url: &str, status: StatusCode) -> ApiResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ApiError::Status {
            url: url.to_string(),
            status,
        })
    }
}

/// Builds the session cookie header value. Tokens pasted from browser
/// devtools often arrive wrapped in quotes; strip them before re-quoting.
fn session_cookie(auth_token: &str) -> String {
    let token = auth_token.trim_matches('"');
    format!("_simpleauth_sess=\"{}\";", token)
}
