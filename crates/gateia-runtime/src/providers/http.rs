//! Shared reqwest plumbing for the HTTP-backed adapters.

use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use std::time::Duration;

use super::ProviderError;

/// Process-wide client; timeouts are applied per request.
pub(crate) fn client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(reqwest::Client::new)
}

/// Send a prepared request and decode a successful JSON body.
///
/// 429 becomes `RateLimited` (honouring `retry-after` seconds), any other
/// non-success status becomes `ApiError` with the body text as message.
pub(crate) async fn send_json<T>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, ProviderError>
where
    T: DeserializeOwned,
{
    let response = request.timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::HttpError(e.to_string())
        }
    })?;

    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::AuthError);
    }

    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());
        return Err(ProviderError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::ParseError(e.to_string()))
}
