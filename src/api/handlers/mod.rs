pub mod cutout;
pub mod health;
pub mod jobs;
pub mod upload;

use crate::services::jobs::JobCredentials;
use axum::http::{HeaderMap, header::AUTHORIZATION};

/// Credentials for the job service: the body's key, then the `x-api-key`
/// header, then the service-wide fallback. The bearer token comes from
/// `Authorization`.
pub(crate) fn credentials_from(
    headers: &HeaderMap,
    body_key: Option<&str>,
    fallback_key: Option<&str>,
) -> JobCredentials {
    let header_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    let api_key = [body_key, header_key, fallback_key]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|k| !k.is_empty())
        .unwrap_or_default()
        .to_string();

    let bearer_token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    JobCredentials {
        api_key,
        bearer_token,
    }
}
