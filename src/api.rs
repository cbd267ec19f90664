//! AUR client with in-memory caching.
//!
//! The resolver talks to the remote repository through the [`RemoteClient`]
//! trait so it can be driven by an in-memory repository in tests.
//! [`AurClient`] is the HTTP implementation used by the CLI.
//!
//! # Endpoints
//!
//! - **Recipe**: `GET /cgit/aur.git/plain/PKGBUILD?h=<name>`
//! - **Snapshot**: `GET /cgit/aur.git/snapshot/<name>.tar.gz`
//! - **RPC**: `GET /rpc/?v=5&type=<search|info>&arg=<argument>`
//!
//! The RPC reports failures in the body (`"type": "error"`), often with a
//! 200 status, so every RPC response is checked for the error payload
//! before it is used.
//!
//! # Examples
//!
//! ```no_run
//! use aurpull::api::{AurClient, RemoteClient};
//! use aurpull::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = AurClient::new(&Config::default())?;
//!
//!     let recipe = client.fetch_recipe("yay").await?;
//!     println!("{} bytes of PKGBUILD", recipe.len());
//!
//!     for pkg in client.search("yay").await? {
//!         println!("{} {}", pkg.name, pkg.version);
//!     }
//!     Ok(())
//! }
//! ```

use crate::config::Config;
use crate::error::{AurError, Result};
use reqwest::{RequestBuilder, Url};
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// The operations the resolver needs from a remote repository.
pub trait RemoteClient: Send + Sync + 'static {
    /// PKGBUILD text for `name`.
    fn fetch_recipe(&self, name: &str) -> impl Future<Output = Result<String>> + Send;

    /// Snapshot archive bytes for `name` (usually tar.gz).
    fn fetch_archive(&self, name: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Run an RPC query. Structured error payloads are returned as
    /// [`AurError::Rpc`].
    fn query(
        &self,
        method: RpcMethod,
        arg: &str,
    ) -> impl Future<Output = Result<RpcResponse>> + Send;
}

/// RPC request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    Search,
    Info,
}

impl RpcMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RpcMethod::Search => "search",
            RpcMethod::Info => "info",
        }
    }

    fn arg_key(self) -> &'static str {
        match self {
            RpcMethod::Search => "arg",
            RpcMethod::Info => "arg[]",
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AUR package metadata from the RPC interface
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageInfo {
    pub name: String,
    #[serde(default)]
    pub package_base: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(rename = "URLPath", default)]
    pub url_path: Option<String>,
    #[serde(default)]
    pub num_votes: u64,
    #[serde(default)]
    pub popularity: f64,
    /// Unix timestamp of the out-of-date flag, if flagged.
    #[serde(default)]
    pub out_of_date: Option<i64>,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub last_modified: Option<i64>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub make_depends: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
}

/// Successful RPC response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub resultcount: usize,
    #[serde(default)]
    pub results: Vec<PackageInfo>,
}

/// Decode an RPC body, turning an error payload into [`AurError::Rpc`].
///
/// Older servers put the error message in `results` instead of `error`,
/// so the body is inspected before it is decoded into [`RpcResponse`].
pub fn parse_rpc(body: &str) -> Result<RpcResponse> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    let is_error = value.get("type").and_then(|t| t.as_str()) == Some("error")
        || value.get("error").is_some_and(|e| !e.is_null());
    if is_error {
        let message = value
            .get("error")
            .and_then(|e| e.as_str())
            .or_else(|| value.get("results").and_then(|r| r.as_str()))
            .unwrap_or("unknown error");
        return Err(AurError::Rpc(message.to_string()));
    }

    Ok(serde_json::from_value(value)?)
}

/// AUR client with in-memory caching
#[derive(Clone)]
pub struct AurClient {
    client: reqwest::Client,
    base_url: Url,
    recipe_cache: moka::future::Cache<String, String>,
}

impl AurClient {
    /// Create a client for `config.aur_url`.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.jobs.max(1))
            .user_agent(format!("aurp/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = Url::parse(config.aur_url.trim_end_matches('/'))
            .map_err(|e| anyhow::anyhow!("Invalid AUR URL {}: {}", config.aur_url, e))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow::anyhow!("Invalid AUR URL {}", config.aur_url).into());
        }

        Ok(Self {
            client,
            base_url,
            // Recipes are small; keep them for the life of the process so a
            // dependency listing followed by a download fetches each once.
            recipe_cache: moka::future::Cache::new(1000),
        })
    }

    /// Search package names and descriptions.
    pub async fn search(&self, query: &str) -> Result<Vec<PackageInfo>> {
        Ok(self.query(RpcMethod::Search, query).await?.results)
    }

    /// Detailed metadata for one package.
    pub async fn info(&self, name: &str) -> Result<PackageInfo> {
        self.query(RpcMethod::Info, name)
            .await?
            .results
            .into_iter()
            .next()
            .ok_or_else(|| AurError::PackageNotFound(name.to_string()))
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn recipe_request(&self, name: &str) -> RequestBuilder {
        self.client
            .get(self.endpoint(&["cgit", "aur.git", "plain", "PKGBUILD"]))
            .query(&[("h", name)])
    }

    fn archive_request(&self, name: &str) -> RequestBuilder {
        let file = format!("{}.tar.gz", name);
        self.client
            .get(self.endpoint(&["cgit", "aur.git", "snapshot", file.as_str()]))
    }

    fn rpc_request(&self, method: RpcMethod, arg: &str) -> RequestBuilder {
        self.client
            .get(self.endpoint(&["rpc", ""]))
            .query(&[("v", "5"), ("type", method.as_str()), (method.arg_key(), arg)])
    }

    async fn send(&self, request: RequestBuilder, name: &str) -> Result<reqwest::Response> {
        let response = request.send().await?;
        tracing::debug!("GET {} -> {}", response.url(), response.status());
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AurError::PackageNotFound(name.to_string()));
        }
        if !status.is_success() {
            return Err(AurError::Status {
                url: response.url().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl RemoteClient for AurClient {
    async fn fetch_recipe(&self, name: &str) -> Result<String> {
        if let Some(cached) = self.recipe_cache.get(name).await {
            return Ok(cached);
        }

        let recipe = self
            .send(self.recipe_request(name), name)
            .await?
            .text()
            .await?;

        self.recipe_cache
            .insert(name.to_string(), recipe.clone())
            .await;

        Ok(recipe)
    }

    async fn fetch_archive(&self, name: &str) -> Result<Vec<u8>> {
        let bytes = self
            .send(self.archive_request(name), name)
            .await?
            .bytes()
            .await?;
        tracing::debug!("{}: {} bytes", name, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn query(&self, method: RpcMethod, arg: &str) -> Result<RpcResponse> {
        let response = self.rpc_request(method, arg).send().await?;

        let status = response.status();
        let final_url = response.url().to_string();
        let body = response.text().await?;

        // Error payloads carry a better message than the status line.
        match parse_rpc(&body) {
            Err(AurError::JsonError(_)) if !status.is_success() => Err(AurError::Status {
                url: final_url,
                status: status.as_u16(),
            }),
            other => other,
        }
    }
}
