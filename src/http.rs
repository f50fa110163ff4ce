//! HTTP client for the board service.
//!
//! Wraps a configured `reqwest::Client` with the service base URL, bearer
//! authentication, and status-to-error mapping.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::ServiceConfig;
use crate::error::{BoardError, Result};
use crate::pagination::Page;

/// Shared HTTP handle for one participant. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl ServiceClient {
    /// Build a client from the service configuration.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)?;
        // Url::join drops the last segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| BoardError::Config(format!("failed to create HTTP client: {e}")))?;

        let auth_token = if config.auth_token.is_empty() {
            None
        } else {
            Some(config.auth_token.clone())
        };

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    /// The service base URL (always ends in `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a service path against the base URL.
    ///
    /// A leading `/` is still relative to the base path. Continuation links
    /// are resolved by the page that received them instead.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and map non-success statuses onto `BoardError`.
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        check_status(response).await
    }

    /// GET a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.resolve(path)?;
        debug!("GET {}", url);
        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.json().await?)
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.resolve(path)?;
        debug!("POST {}", url);
        let response = self
            .send(self.request(Method::POST, url).json(body))
            .await?;
        Ok(response.json().await?)
    }

    /// DELETE a resource, discarding any response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.resolve(path)?;
        debug!("DELETE {}", url);
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    /// Fetch the first page of a paged collection.
    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Page<T>> {
        let mut url = self.resolve(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Page::fetch(self, url).await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let path = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        body
    };

    Err(match status {
        StatusCode::NOT_FOUND => BoardError::NotFound(format!("resource {path}")),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            BoardError::Validation(message)
        }
        _ => BoardError::Http {
            status: status.as_u16(),
            message,
        },
    })
}
