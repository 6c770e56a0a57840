use crate::payments::error::{GatewayError, PaymentResult};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-over-HTTP client for the payment backend. The bearer token is fixed
/// at construction.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
    bearer_token: String,
}

impl PaymentHttpClient {
    pub fn new(
        timeout: Duration,
        max_retries: u32,
        bearer_token: impl Into<String>,
    ) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::network(format!("failed to initialize HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout,
            max_retries,
            bearer_token: bearer_token.into(),
        })
    }

    /// Sends one request and decodes a successful body as `T`.
    ///
    /// Only `GET` is retried. A push must never reach the gateway twice, so
    /// any other method gets exactly one attempt.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&JsonValue>,
    ) -> PaymentResult<T> {
        let retries = if method == Method::GET {
            self.max_retries
        } else {
            0
        };
        self.send_json(method, url, body, retries).await
    }

    /// Single attempt, for callers that run their own retry schedule.
    pub async fn request_json_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&JsonValue>,
    ) -> PaymentResult<T> {
        self.send_json(method, url, body, 0).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&JsonValue>,
        retries: u32,
    ) -> PaymentResult<T> {
        let mut last_error = None;
        for attempt in 0..=retries {
            let mut request = self
                .client
                .request(method.clone(), url)
                .timeout(self.timeout)
                .bearer_auth(&self.bearer_token);
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let error = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    debug!(%url, status = status.as_u16(), "payment backend responded");

                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            GatewayError::InvalidResponse {
                                message: format!("invalid JSON response: {}", e),
                            }
                        });
                    }

                    let error = classify_status(status, &text);
                    let retryable = status == StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    if !retryable {
                        return Err(error);
                    }
                    error
                }
                Err(e) => GatewayError::network(format!("request failed: {}", e)),
            };

            if attempt < retries {
                warn!(
                    %url,
                    attempt = attempt + 1,
                    error = %error,
                    "payment backend call failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(250 << attempt)).await;
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| GatewayError::network("request failed")))
    }
}

/// Maps a non-success HTTP status to a gateway error.
pub fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthenticated {
            message: extract_error_detail(body)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
        },
        s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
            GatewayError::network(format!("HTTP {}: {}", s.as_u16(), body.trim()))
        }
        s => GatewayError::Rejected {
            detail: extract_error_detail(body).unwrap_or_else(|| format!("HTTP {}", s.as_u16())),
            status_code: Some(s.as_u16()),
        },
    }
}

/// Pulls a human-readable message out of an error body such as
/// `{"error": "invalid phone"}` or `{"message": "..."}`.
pub fn extract_error_detail(body: &str) -> Option<String> {
    let parsed: JsonValue = serde_json::from_str(body).ok()?;
    ["error", "message", "detail"]
        .iter()
        .filter_map(|key| parsed.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_uses_known_keys() {
        assert_eq!(
            extract_error_detail(r#"{"error":"invalid phone"}"#).as_deref(),
            Some("invalid phone")
        );
        assert_eq!(
            extract_error_detail(r#"{"error":"","message":"limit reached"}"#).as_deref(),
            Some("limit reached")
        );
        assert!(extract_error_detail("<html>").is_none());
        assert!(extract_error_detail(r#"{"status":"x"}"#).is_none());
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            GatewayError::Unauthenticated { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, r#"{"error":"token expired"}"#),
            GatewayError::Unauthenticated { message } if message == "token expired"
        ));
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, r#"{"error":"invalid phone"}"#),
            GatewayError::Rejected {
                detail: "invalid phone".to_string(),
                status_code: Some(400),
            }
        );
    }
}
