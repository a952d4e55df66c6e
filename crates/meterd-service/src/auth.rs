//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `ServiceAuth` - metering pipelines via `x-api-key`
//! - `AdminAuth` - entitlement/grant mutation via `x-admin-key`
//! - `ReadAuth` - read queries, accepting either key

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::state::AppState;

/// Service authentication via API key.
///
/// Used by metering pipelines reporting usage events.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name or identifier, for audit logging.
    pub service_name: String,
}

impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let api_key = header_value(parts, "x-api-key").ok_or(ApiError::Unauthorized)?;

            let expected_key = state
                .config
                .service_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if api_key != *expected_key {
                return Err(ApiError::Unauthorized);
            }

            let service_name = header_value(parts, "x-service-name")
                .unwrap_or_else(|| "unknown".to_string());

            Ok(ServiceAuth { service_name })
        })
    }
}

/// Admin authentication via API key.
///
/// Required for entitlement and grant mutation.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let admin_key = header_value(parts, "x-admin-key").ok_or(ApiError::Unauthorized)?;

            let expected_key = state
                .config
                .admin_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if admin_key != *expected_key {
                return Err(ApiError::Unauthorized);
            }

            let admin_id =
                header_value(parts, "x-admin-id").unwrap_or_else(|| "admin".to_string());

            tracing::info!(admin_id = %admin_id, "Admin authenticated");

            Ok(AdminAuth { admin_id })
        })
    }
}

/// Read authentication: either a valid service key or a valid admin key.
#[derive(Debug, Clone)]
pub struct ReadAuth;

impl FromRequestParts<Arc<AppState>> for ReadAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let service_ok = matches!(
                (header_value(parts, "x-api-key"), &state.config.service_api_key),
                (Some(provided), Some(expected)) if provided == *expected
            );
            let admin_ok = matches!(
                (header_value(parts, "x-admin-key"), &state.config.admin_api_key),
                (Some(provided), Some(expected)) if provided == *expected
            );

            if service_ok || admin_ok {
                Ok(ReadAuth)
            } else {
                Err(ApiError::Unauthorized)
            }
        })
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
