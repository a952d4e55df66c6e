//! meterd HTTP client implementation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::error::ClientError;
use crate::types::{ApiErrorResponse, EntitlementValue, UsageRequest, UsageResponse};

/// meterd API client.
///
/// Provides methods for reporting usage and querying entitlement values.
#[derive(Debug, Clone)]
pub struct MeterClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl MeterClient {
    /// Create a new meterd client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the meterd service (e.g., `"http://meterd:8080"`)
    /// * `api_key` - Service API key for authentication
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new meterd client with custom options.
    #[must_use]
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        }
    }

    /// Report a usage event.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error;
    /// a replayed event ID maps to `ClientError::DuplicateEvent`.
    pub async fn report_usage(&self, request: UsageRequest) -> Result<UsageResponse, ClientError> {
        let url = format!("{}/v1/usage", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Query an entitlement's value, optionally at a past instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn entitlement_value(
        &self,
        entitlement_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<EntitlementValue, ClientError> {
        let url = format!("{}/v1/entitlements/{entitlement_id}/value", self.base_url);

        let mut request = self.client.get(&url).header("x-api-key", &self.api_key);
        if let Some(at) = at {
            request = request.query(&[("time", at.to_rfc3339())]);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Check whether a subject currently has access through an entitlement.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn has_access(&self, entitlement_id: &str) -> Result<bool, ClientError> {
        let value = self.entitlement_value(entitlement_id, None).await?;
        Ok(value.has_access())
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse the problem body
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message;

                match code {
                    "duplicate_event" => Err(ClientError::DuplicateEvent { event_id: message }),
                    "reset_out_of_order" => Err(ClientError::ResetOutOfOrder),
                    "not_found" if message.starts_with("entitlement") => {
                        Err(ClientError::EntitlementNotFound {
                            entitlement_id: message
                                .replace("entitlement not found: ", ""),
                        })
                    }
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}
