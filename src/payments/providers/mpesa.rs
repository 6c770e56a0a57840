use crate::config::GatewayConfig;
use crate::logging::mask_phone;
use crate::payments::error::{GatewayError, PaymentResult};
use crate::payments::phone::PhoneNumber;
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    BalanceEnvelope, CorrelationId, PaymentState, PushAccepted, PushEnvelope, PushRequest,
    StatusEnvelope,
};
use crate::payments::utils::PaymentHttpClient;
use crate::services::balance::BalanceSource;
use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, info};

/// M-Pesa STK push through the platform backend, which also serves the
/// user's credit balance.
pub struct MpesaGateway {
    base_url: String,
    http: PaymentHttpClient,
}

impl MpesaGateway {
    pub fn new(config: &GatewayConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            Duration::from_secs(config.request_timeout_secs),
            config.max_retries,
            config.api_token.clone(),
        )?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    async fn initiate_push(
        &self,
        phone: &PhoneNumber,
        credits: u32,
    ) -> PaymentResult<PushAccepted> {
        let payload = serde_json::to_value(PushRequest {
            phone: phone.as_str().to_string(),
            credits,
        })
        .map_err(|e| GatewayError::InvalidResponse {
            message: format!("failed to encode push request: {}", e),
        })?;

        let raw: PushEnvelope = self
            .http
            .request_json_once(Method::POST, &self.endpoint("/payment/push"), Some(&payload))
            .await?;

        if !raw.success {
            return Err(GatewayError::rejected(
                raw.error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "payment request was not accepted".to_string()),
            ));
        }

        let correlation_id = raw
            .correlation_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse {
                message: "push accepted without a correlationId".to_string(),
            })?;

        info!(
            phone = %mask_phone(phone.as_str()),
            credits,
            correlation_id = %correlation_id,
            "mpesa push initiated"
        );

        Ok(PushAccepted {
            correlation_id: CorrelationId::new(correlation_id),
        })
    }

    /// One request per call. The confirmation engine's poll loop owns the
    /// retry schedule, so each check is exactly one attempt.
    async fn get_status(&self, correlation_id: &CorrelationId) -> PaymentResult<PaymentState> {
        let raw: StatusEnvelope = self
            .http
            .request_json_once(
                Method::GET,
                &self.endpoint(&format!("/payment/status/{}", correlation_id)),
                None,
            )
            .await?;
        debug!(correlation_id = %correlation_id, status = %raw.status, "mpesa status polled");
        Ok(raw.status)
    }

    fn name(&self) -> &'static str {
        "mpesa"
    }
}

#[async_trait]
impl BalanceSource for MpesaGateway {
    async fn fetch_balance(&self) -> PaymentResult<u64> {
        let raw: BalanceEnvelope = self
            .http
            .request_json(Method::GET, &self.endpoint("/balance"), None)
            .await?;
        Ok(raw.credits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> GatewayConfig {
        GatewayConfig {
            base_url: base_url.to_string(),
            api_token: "token".to_string(),
            request_timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let gateway = MpesaGateway::new(&config("http://localhost:9000/api/")).unwrap();
        assert_eq!(
            gateway.endpoint("/payment/push"),
            "http://localhost:9000/api/payment/push"
        );
    }
}
