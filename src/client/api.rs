use std::time::Duration;

use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::{
    LoginRequest, LoginResponse, Order, OrderFilter, OrderListResponse, OrderRequest,
    OrderResponse,
};

/// Client for the REST login and order endpoints
///
/// Every call validates the HTTP status (200 only) and the `success` flag of
/// the body. No retries.
pub struct ApiClient {
    http_client: HttpClient,
    request_timeout: Duration,
    health_timeout: Duration,
}

impl ApiClient {
    /// Create a new ApiClient
    ///
    /// # Arguments
    /// * `host` - The base URL for the API (e.g., "http://localhost:3000")
    /// * `token` - Bearer token, if one is already known
    pub fn new(host: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http_client: HttpClient::new(host, token),
            request_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeouts(mut self, request: Duration, health: Duration) -> Self {
        self.request_timeout = request;
        self.health_timeout = health;
        self
    }

    pub fn host(&self) -> &str {
        self.http_client.host()
    }

    pub fn token(&self) -> Option<String> {
        self.http_client.token()
    }

    pub fn set_token(&self, token: Option<String>) {
        self.http_client.set_token(token);
    }

    /// Request a token for `username` and keep it for later calls
    ///
    /// Every failure, including transport errors, is reported as
    /// [`Error::Authentication`].
    pub async fn login(&self, username: &str) -> Result<LoginResponse> {
        let body = LoginRequest {
            username: username.to_string(),
        };
        let response: LoginResponse = self
            .http_client
            .post("/api/login", &body, self.request_timeout, false)
            .await
            .map_err(|e| match e {
                Error::Api { status, .. } => Error::Authentication(format!(
                    "authentication request failed with status {}",
                    status
                )),
                other => Error::Authentication(format!("authentication request failed: {}", other)),
            })?;

        match (&response.token, response.success) {
            (Some(token), true) => {
                self.set_token(Some(token.clone()));
                Ok(response)
            }
            _ => Err(Error::Authentication(
                response
                    .message
                    .clone()
                    .unwrap_or_else(|| "Authentication failed".to_string()),
            )),
        }
    }

    /// Place an order
    pub async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        let response: OrderResponse = self
            .http_client
            .post("/api/orders", request, self.request_timeout, true)
            .await?;
        order_from(response)
    }

    /// Cancel an order by ID
    pub async fn cancel_order(&self, order_id: &str) -> Result<Order> {
        let path = format!("/api/orders/{}", order_id);
        let response: OrderResponse = self
            .http_client
            .delete(&path, self.request_timeout)
            .await?;
        order_from(response)
    }

    /// List the user's orders
    pub async fn get_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let response: OrderListResponse = self
            .http_client
            .get("/api/orders", &filter.to_query_params(), self.request_timeout)
            .await?;
        if !response.success {
            return Err(Error::Rejected(
                response
                    .message
                    .unwrap_or_else(|| "failed to list orders".to_string()),
            ));
        }
        Ok(response.orders)
    }

    /// Get a specific order by ID
    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        let path = format!("/api/orders/{}", order_id);
        let response: OrderResponse = self
            .http_client
            .get(&path, &[], self.request_timeout)
            .await?;
        order_from(response)
    }

    /// `true` iff `GET /api/health` answers 200
    pub async fn health_check(&self) -> bool {
        match self
            .http_client
            .status("/api/health", self.health_timeout)
            .await
        {
            Ok(status) => status.as_u16() == 200,
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                false
            }
        }
    }
}

fn order_from(response: OrderResponse) -> Result<Order> {
    if !response.success {
        return Err(Error::Rejected(
            response
                .message
                .unwrap_or_else(|| "request failed".to_string()),
        ));
    }
    response
        .order
        .ok_or_else(|| Error::Rejected("response carried no order".to_string()))
}
