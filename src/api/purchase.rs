//! Presentation side of the purchase flow: turns user intents into engine
//! calls and engine snapshots into the messages the user sees.

use crate::payments::catalog::{PackageCatalog, CATALOG_CURRENCY};
use crate::workers::payment_confirmation::PaymentConfirmationEngine;
use crate::workers::purchase_session::{
    PurchaseSession, SessionError, SessionStatus, TransitionError,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    /// Open a fresh purchase, abandoning any previous one.
    Open,
    SelectPackage(u32),
    EnterPhone(String),
    Cancel,
}

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("unknown credit package: {0}")]
    UnknownPackage(u32),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserMessage {
    ChoosePackage,
    EnterPhone { credits: u32, price: u64 },
    InvalidPhone { hint: String },
    Processing { attempt: u32 },
    CouldNotStart { reason: String },
    Success { credits: u32, new_balance: Option<u64> },
    PaymentFailed,
    ConfirmationFailed { reason: String },
    TimedOut,
    Cancelled,
}

impl UserMessage {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            UserMessage::CouldNotStart { .. }
                | UserMessage::Success { .. }
                | UserMessage::PaymentFailed
                | UserMessage::ConfirmationFailed { .. }
                | UserMessage::TimedOut
                | UserMessage::Cancelled
        )
    }
}

impl std::fmt::Display for UserMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserMessage::ChoosePackage => write!(f, "choose a credit package"),
            UserMessage::EnterPhone { credits, price } => write!(
                f,
                "enter your M-Pesa number to buy {} credits for {} {}",
                credits, CATALOG_CURRENCY, price
            ),
            UserMessage::InvalidPhone { hint } => write!(f, "{}", hint),
            UserMessage::Processing { .. } => {
                write!(f, "processing… approve the prompt on your phone")
            }
            UserMessage::CouldNotStart { reason } => {
                write!(f, "payment could not be started: {}", reason)
            }
            UserMessage::Success {
                new_balance: Some(balance),
                ..
            } => write!(f, "payment successful, new balance: {}", balance),
            UserMessage::Success {
                credits,
                new_balance: None,
            } => write!(
                f,
                "payment successful, {} credits will show in your balance shortly",
                credits
            ),
            UserMessage::PaymentFailed => write!(f, "payment failed or was cancelled"),
            UserMessage::ConfirmationFailed { reason } => {
                write!(f, "payment could not be confirmed: {}", reason)
            }
            UserMessage::TimedOut => write!(f, "timed out — check your payment app"),
            UserMessage::Cancelled => write!(f, "purchase cancelled"),
        }
    }
}

/// Message for a session snapshot.
pub fn render(session: &PurchaseSession) -> UserMessage {
    match session.status {
        SessionStatus::Idle => UserMessage::ChoosePackage,
        SessionStatus::PackageSelected | SessionStatus::PhoneEntry => {
            match (&session.last_error, &session.selected_package) {
                (Some(SessionError::Validation(e)), _) => UserMessage::InvalidPhone {
                    hint: e.user_message(),
                },
                (_, Some(package)) => UserMessage::EnterPhone {
                    credits: package.credit_amount,
                    price: package.price_minor_units,
                },
                (_, None) => UserMessage::ChoosePackage,
            }
        }
        SessionStatus::Submitting | SessionStatus::AwaitingConfirmation => {
            UserMessage::Processing {
                attempt: session.poll_attempt,
            }
        }
        SessionStatus::Completed => UserMessage::Success {
            credits: session
                .receipt
                .as_ref()
                .map(|r| r.credits)
                .or_else(|| session.selected_package.as_ref().map(|p| p.credit_amount))
                .unwrap_or_default(),
            new_balance: session.receipt.as_ref().and_then(|r| r.new_balance),
        },
        SessionStatus::Failed => match &session.last_error {
            Some(SessionError::Initiation(e)) => UserMessage::CouldNotStart {
                reason: e.user_message(),
            },
            Some(SessionError::Confirmation(e)) => UserMessage::ConfirmationFailed {
                reason: e.user_message(),
            },
            _ => UserMessage::PaymentFailed,
        },
        SessionStatus::TimedOut => UserMessage::TimedOut,
        SessionStatus::Cancelled => UserMessage::Cancelled,
    }
}

pub struct PresentationAdapter {
    engine: Arc<PaymentConfirmationEngine>,
    catalog: PackageCatalog,
}

impl PresentationAdapter {
    pub fn new(engine: Arc<PaymentConfirmationEngine>, catalog: PackageCatalog) -> Self {
        Self { engine, catalog }
    }

    /// Relays one intent and returns the message to show right after it.
    pub fn dispatch(&self, intent: UserIntent) -> Result<UserMessage, IntentError> {
        let session = match intent {
            UserIntent::Open => {
                self.engine.start_purchase();
                self.engine.snapshot()
            }
            UserIntent::SelectPackage(id) => {
                let package = self
                    .catalog
                    .find(id)
                    .cloned()
                    .ok_or(IntentError::UnknownPackage(id))?;
                self.engine.select_package(package)?
            }
            UserIntent::EnterPhone(raw) => self.engine.confirm_phone(&raw)?,
            UserIntent::Cancel => self.engine.cancel()?,
        };
        Ok(render(&session))
    }

    pub fn current_message(&self) -> UserMessage {
        render(&self.engine.snapshot())
    }

    pub fn updates(&self) -> watch::Receiver<PurchaseSession> {
        self.engine.subscribe()
    }
}
