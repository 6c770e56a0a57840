use crate::payments::error::PaymentResult;
use crate::payments::phone::PhoneNumber;
use crate::payments::types::{CorrelationId, PaymentState, PushAccepted};
use async_trait::async_trait;

/// Remote side of a mobile-money purchase.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ask the gateway to send a push prompt to `phone`. Success only means the
    /// request was queued; the payment resolves later, out of band.
    async fn initiate_push(&self, phone: &PhoneNumber, credits: u32)
        -> PaymentResult<PushAccepted>;

    /// Current resolution of a push. Must be safe to call repeatedly.
    async fn get_status(&self, correlation_id: &CorrelationId) -> PaymentResult<PaymentState>;

    fn name(&self) -> &'static str;
}
