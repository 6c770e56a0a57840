//! Mobile-money payments: credit catalog, phone validation and the gateway
//! the purchase flow talks to.

pub mod catalog;
pub mod error;
pub mod phone;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use catalog::{CreditPackage, PackageCatalog};
pub use error::{GatewayError, PaymentResult};
pub use phone::{normalize, PhoneNumber, ValidationError};
pub use provider::PaymentGateway;
pub use types::{CorrelationId, PaymentState, PushAccepted};
