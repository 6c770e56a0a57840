pub mod payment_confirmation;
pub mod purchase_session;

pub use payment_confirmation::{PaymentConfirmationEngine, PollingPolicy};
pub use purchase_session::{
    PurchaseReceipt, PurchaseSession, SessionError, SessionEvent, SessionId, SessionStatus,
    TransitionError,
};
