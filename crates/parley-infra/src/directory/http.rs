//! reqwest-backed [`UserDirectory`] speaking the directory's REST API.
//!
//! - `POST {base}/users` creates a user
//! - `GET {base}/users/{id}` fetches one, 404 meaning unknown
//! - `DELETE {base}/users/{id}` removes one, 404 meaning unknown

use std::time::Duration;

use parley_core::directory::UserDirectory;
use parley_types::config::DirectoryConfig;
use parley_types::error::DirectoryError;
use parley_types::user::NewUser;
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;

pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpUserDirectory {
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| DirectoryError::Network(format!("invalid base url '{}': {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::Network(format!(
                "invalid base url '{}'",
                config.base_url
            )));
        }
        let mut builder = reqwest::Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| DirectoryError::Network(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    /// `{base}/users` plus an optional id, encoded as a single path segment.
    fn users_url(&self, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new().
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("users");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    /// Send and decode. `Ok(None)` on 404 when `allow_missing`.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        allow_missing: bool,
    ) -> Result<Option<Value>, DirectoryError> {
        let response = request
            .send()
            .await
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        let status = response.status();
        if allow_missing && status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        response
            .json::<Value>()
            .await
            .map(Some)
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }

    fn request(&self, method: Method, id: Option<&str>) -> reqwest::RequestBuilder {
        let url = self.users_url(id);
        tracing::debug!(%method, %url, "directory request");
        self.client.request(method, url)
    }
}

impl UserDirectory for HttpUserDirectory {
    async fn add_user(&self, user: &NewUser) -> Result<Value, DirectoryError> {
        let request = self.request(Method::POST, None).json(user);
        // Without allow_missing a 404 is a Status error, so None is unreachable.
        self.send(request, false)
            .await?
            .ok_or_else(|| DirectoryError::Decode("empty response".to_string()))
    }

    async fn get_user(&self, id: &str) -> Result<Option<Value>, DirectoryError> {
        self.send(self.request(Method::GET, Some(id)), true).await
    }

    async fn delete_user(&self, id: &str) -> Result<Option<Value>, DirectoryError> {
        self.send(self.request(Method::DELETE, Some(id)), true).await
    }
}
