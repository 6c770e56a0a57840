use thiserror::Error;

pub type PaymentResult<T> = Result<T, GatewayError>;

/// Failures of a remote call to the payment backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Unauthenticated: {message}")]
    Unauthenticated { message: String },

    #[error("Payment rejected: {detail}")]
    Rejected {
        detail: String,
        status_code: Option<u16>,
    },

    #[error("Invalid gateway response: {message}")]
    InvalidResponse { message: String },
}

impl GatewayError {
    pub fn network(message: impl Into<String>) -> Self {
        GatewayError::Network {
            message: message.into(),
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        GatewayError::Rejected {
            detail: detail.into(),
            status_code: None,
        }
    }

    /// Transient errors are absorbed by the poll loop and count as a pending
    /// attempt; everything else ends the session.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Network { .. } => true,
            GatewayError::InvalidResponse { .. } => true,
            GatewayError::Unauthenticated { .. } => false,
            GatewayError::Rejected { .. } => false,
        }
    }

    /// Stable short code, used in logs.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::Network { .. } => "network",
            GatewayError::Unauthenticated { .. } => "unauthenticated",
            GatewayError::Rejected { .. } => "rejected",
            GatewayError::InvalidResponse { .. } => "invalid_response",
        }
    }

    /// The text shown after "payment could not be started: ".
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Network { .. } => {
                "payment service is temporarily unavailable".to_string()
            }
            GatewayError::Unauthenticated { .. } => {
                "your session has expired, please sign in again".to_string()
            }
            GatewayError::Rejected { detail, .. } => detail.clone(),
            GatewayError::InvalidResponse { .. } => {
                "payment service returned an unexpected response".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_flags_are_set() {
        assert!(GatewayError::network("timeout").is_transient());
        assert!(GatewayError::InvalidResponse {
            message: "eof".to_string()
        }
        .is_transient());
        assert!(!GatewayError::rejected("invalid phone").is_transient());
        assert!(!GatewayError::Unauthenticated {
            message: "token expired".to_string()
        }
        .is_transient());
    }

    #[test]
    fn rejected_detail_is_surfaced_verbatim() {
        let err = GatewayError::rejected("invalid phone");
        assert_eq!(err.user_message(), "invalid phone");
        assert_eq!(err.to_string(), "Payment rejected: invalid phone");
        assert_eq!(err.reason(), "rejected");
    }

    #[test]
    fn unauthenticated_is_not_a_payment_failure() {
        let err = GatewayError::Unauthenticated {
            message: "HTTP 401".to_string(),
        };
        assert_eq!(err.reason(), "unauthenticated");
        assert!(err.user_message().contains("sign in"));
    }
}
