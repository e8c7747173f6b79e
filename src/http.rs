use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Thin wrapper around `reqwest::Client` bound to one API host
///
/// Carries the bearer token shared by every authorized call; the token is
/// swapped in place after a login.
pub(crate) struct HttpClient {
    client: reqwest::Client,
    host: String,
    token: RwLock<Option<String>>,
}

impl HttpClient {
    pub fn new(host: impl Into<String>, token: Option<String>) -> Self {
        let host = host.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            host,
            token: RwLock::new(token),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn headers(&self, authorized: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if authorized {
            if let Some(token) = self.token() {
                match HeaderValue::from_str(&format!("Bearer {}", token)) {
                    Ok(value) => {
                        headers.insert(AUTHORIZATION, value);
                    }
                    Err(_) => tracing::warn!("token is not a valid header value, sending without it"),
                }
            }
        }
        headers
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        timeout: Duration,
        authorized: bool,
    ) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.host, path))
            .headers(self.headers(authorized))
            .timeout(timeout)
    }

    /// GET with optional query parameters
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T> {
        let mut request = self.request(Method::GET, path, timeout, true);
        if !query.is_empty() {
            request = request.query(query);
        }
        Self::handle_response(request.send().await?).await
    }

    /// POST a JSON body
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
        authorized: bool,
    ) -> Result<T> {
        let response = self
            .request(Method::POST, path, timeout, authorized)
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, timeout: Duration) -> Result<T> {
        let response = self
            .request(Method::DELETE, path, timeout, true)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Status code of an unauthenticated GET, body ignored
    pub async fn status(&self, path: &str, timeout: Duration) -> Result<StatusCode> {
        let response = self
            .client
            .get(format!("{}{}", self.host, path))
            .timeout(timeout)
            .send()
            .await?;
        Ok(response.status())
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
