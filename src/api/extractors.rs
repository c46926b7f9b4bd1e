//! Custom extractors for API parameters.

use alloy::primitives::Address;
use axum::extract::{FromRequestParts, Path, Query};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use std::str::FromStr;

use crate::api::middleware::error::ApiError;
use crate::events::normalize_address;

/// Extracts a member address from the `{address}` path segment.
///
/// Accepts any hex casing and yields the lowercase form used as the
/// store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAddress(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for MemberAddress
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let address = Address::from_str(raw.trim())
            .map_err(|_| ApiError::BadRequest(format!("Invalid address: {raw}")))?;

        Ok(Self(normalize_address(&address)))
    }
}

/// Query-string extractor whose rejection is a JSON [`ApiError::BadRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}
