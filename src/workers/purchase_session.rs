//! Purchase session state machine.
//!
//! A [`PurchaseSession`] is the whole state of one credit purchase. It only
//! changes through [`reduce`], which takes the current session and one
//! [`SessionEvent`] and returns the next session or a [`TransitionError`].
//! The reducer does no I/O; the confirmation engine feeds it events as the
//! gateway and the user produce them.

use crate::payments::catalog::CreditPackage;
use crate::payments::error::GatewayError;
use crate::payments::phone::{PhoneNumber, ValidationError};
use crate::payments::types::{CorrelationId, PaymentState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Flow opened, nothing chosen yet
    Idle,
    /// Package stored, about to ask for a phone number
    PackageSelected,
    /// Waiting for a valid phone number
    PhoneEntry,
    /// Push request on its way to the gateway
    Submitting,
    /// Push accepted, polling for the user's confirmation
    AwaitingConfirmation,
    Completed,
    /// Gateway rejected the push or reported the payment as failed
    Failed,
    /// Attempt budget spent without a definitive answer
    TimedOut,
    /// User walked away
    Cancelled,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::PackageSelected => write!(f, "package_selected"),
            SessionStatus::PhoneEntry => write!(f, "phone_entry"),
            SessionStatus::Submitting => write!(f, "submitting"),
            SessionStatus::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::TimedOut => write!(f, "timed_out"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Failed
                | SessionStatus::TimedOut
                | SessionStatus::Cancelled
        )
    }

    /// States directly reachable from this one.
    pub fn valid_transitions(&self) -> Vec<SessionStatus> {
        match self {
            SessionStatus::Idle => vec![SessionStatus::PackageSelected, SessionStatus::Cancelled],
            SessionStatus::PackageSelected => vec![
                SessionStatus::PackageSelected,
                SessionStatus::PhoneEntry,
                SessionStatus::Cancelled,
            ],
            SessionStatus::PhoneEntry => vec![
                SessionStatus::PackageSelected,
                SessionStatus::PhoneEntry,
                SessionStatus::Submitting,
                SessionStatus::Cancelled,
            ],
            SessionStatus::Submitting => vec![
                SessionStatus::AwaitingConfirmation,
                SessionStatus::Failed,
                SessionStatus::Cancelled,
            ],
            SessionStatus::AwaitingConfirmation => vec![
                SessionStatus::AwaitingConfirmation,
                SessionStatus::Completed,
                SessionStatus::Failed,
                SessionStatus::TimedOut,
                SessionStatus::Cancelled,
            ],
            SessionStatus::Completed
            | SessionStatus::Failed
            | SessionStatus::TimedOut
            | SessionStatus::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        self.valid_transitions().contains(&target)
    }
}

/// Why a session is not moving forward.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("payment could not be started: {0}")]
    Initiation(GatewayError),

    #[error("payment could not be confirmed: {0}")]
    Confirmation(GatewayError),

    #[error("payment was cancelled or failed")]
    PaymentFailed,

    #[error("no resolution after {attempts} status checks")]
    TimeoutExhausted { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub correlation_id: CorrelationId,
    pub credits: u32,
    pub price_minor_units: u64,
    /// `None` when the post-purchase balance refresh failed.
    pub new_balance: Option<u64>,
    pub balance_reconciled: bool,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseSession {
    pub id: SessionId,
    pub selected_package: Option<CreditPackage>,
    pub phone: Option<PhoneNumber>,
    pub correlation_id: Option<CorrelationId>,
    pub status: SessionStatus,
    pub poll_attempt: u32,
    pub last_error: Option<SessionError>,
    pub receipt: Option<PurchaseReceipt>,
}

impl PurchaseSession {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            selected_package: None,
            phone: None,
            correlation_id: None,
            status: SessionStatus::Idle,
            poll_attempt: 0,
            last_error: None,
            receipt: None,
        }
    }

    /// Terminal, and for a completed purchase the balance has been reconciled.
    pub fn is_settled(&self) -> bool {
        match self.status {
            SessionStatus::Completed => self
                .receipt
                .as_ref()
                .map(|r| r.balance_reconciled)
                .unwrap_or(false),
            status => status.is_terminal(),
        }
    }
}

impl Default for PurchaseSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    PackageChosen(CreditPackage),
    PhonePrompted,
    PhoneRejected(ValidationError),
    PhoneAccepted(PhoneNumber),
    PushAccepted(CorrelationId),
    PushRejected(GatewayError),
    StatusPolled(PaymentState),
    PollFailed(GatewayError),
    /// Result of the balance refresh after a completed purchase.
    BalanceReconciled(Option<u64>),
    Cancelled,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::PackageChosen(_) => "package_chosen",
            SessionEvent::PhonePrompted => "phone_prompted",
            SessionEvent::PhoneRejected(_) => "phone_rejected",
            SessionEvent::PhoneAccepted(_) => "phone_accepted",
            SessionEvent::PushAccepted(_) => "push_accepted",
            SessionEvent::PushRejected(_) => "push_rejected",
            SessionEvent::StatusPolled(_) => "status_polled",
            SessionEvent::PollFailed(_) => "poll_failed",
            SessionEvent::BalanceReconciled(_) => "balance_reconciled",
            SessionEvent::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("session is already {0}")]
    Terminal(SessionStatus),

    #[error("{event} is not valid while {state}")]
    Invalid {
        state: SessionStatus,
        event: &'static str,
    },

    #[error("session was replaced by a newer purchase")]
    Superseded,
}

/// Applies one event to a session.
///
/// Terminal sessions accept nothing except the balance reconciliation that
/// follows a completed purchase.
pub fn reduce(
    session: &PurchaseSession,
    event: SessionEvent,
    max_attempts: u32,
) -> Result<PurchaseSession, TransitionError> {
    use SessionStatus as S;

    let state = session.status;
    let reconciling = matches!(event, SessionEvent::BalanceReconciled(_));
    if state.is_terminal() && !(state == S::Completed && reconciling) {
        return Err(TransitionError::Terminal(state));
    }

    let invalid = |event: &SessionEvent| TransitionError::Invalid {
        state,
        event: event.name(),
    };

    let mut next = session.clone();
    match event {
        SessionEvent::PackageChosen(package) => match state {
            S::Idle | S::PackageSelected | S::PhoneEntry => {
                next.selected_package = Some(package);
                next.last_error = None;
                next.status = S::PackageSelected;
            }
            _ => return Err(invalid(&SessionEvent::PackageChosen(package))),
        },
        SessionEvent::PhonePrompted => match state {
            S::PackageSelected => next.status = S::PhoneEntry,
            _ => return Err(invalid(&SessionEvent::PhonePrompted)),
        },
        SessionEvent::PhoneRejected(error) => match state {
            S::PhoneEntry => next.last_error = Some(SessionError::Validation(error)),
            _ => return Err(invalid(&SessionEvent::PhoneRejected(error))),
        },
        SessionEvent::PhoneAccepted(phone) => match state {
            S::PhoneEntry if session.selected_package.is_some() => {
                next.phone = Some(phone);
                next.last_error = None;
                next.status = S::Submitting;
            }
            _ => return Err(invalid(&SessionEvent::PhoneAccepted(phone))),
        },
        SessionEvent::PushAccepted(correlation_id) => match state {
            S::Submitting => {
                next.correlation_id = Some(correlation_id);
                next.poll_attempt = 0;
                next.status = S::AwaitingConfirmation;
            }
            _ => return Err(invalid(&SessionEvent::PushAccepted(correlation_id))),
        },
        SessionEvent::PushRejected(error) => match state {
            S::Submitting => {
                next.last_error = Some(SessionError::Initiation(error));
                next.status = S::Failed;
            }
            _ => return Err(invalid(&SessionEvent::PushRejected(error))),
        },
        SessionEvent::StatusPolled(payment_state) => {
            if state != S::AwaitingConfirmation {
                return Err(invalid(&SessionEvent::StatusPolled(payment_state)));
            }
            next.poll_attempt = session.poll_attempt.saturating_add(1);
            match payment_state {
                PaymentState::Completed => {
                    next.receipt = completed_receipt(session);
                    next.status = S::Completed;
                }
                PaymentState::Failed => {
                    next.last_error = Some(SessionError::PaymentFailed);
                    next.status = S::Failed;
                }
                PaymentState::Pending => mark_unresolved(&mut next, max_attempts),
            }
        }
        SessionEvent::PollFailed(error) => {
            if state != S::AwaitingConfirmation {
                return Err(invalid(&SessionEvent::PollFailed(error)));
            }
            next.poll_attempt = session.poll_attempt.saturating_add(1);
            if error.is_transient() {
                mark_unresolved(&mut next, max_attempts);
            } else {
                next.last_error = Some(SessionError::Confirmation(error));
                next.status = S::Failed;
            }
        }
        SessionEvent::BalanceReconciled(new_balance) => match (state, next.receipt.as_mut()) {
            (S::Completed, Some(receipt)) if !receipt.balance_reconciled => {
                receipt.new_balance = new_balance;
                receipt.balance_reconciled = true;
            }
            _ => return Err(invalid(&SessionEvent::BalanceReconciled(new_balance))),
        },
        SessionEvent::Cancelled => next.status = S::Cancelled,
    }

    Ok(next)
}

fn mark_unresolved(next: &mut PurchaseSession, max_attempts: u32) {
    if next.poll_attempt >= max_attempts {
        next.last_error = Some(SessionError::TimeoutExhausted {
            attempts: next.poll_attempt,
        });
        next.status = SessionStatus::TimedOut;
    }
}

fn completed_receipt(session: &PurchaseSession) -> Option<PurchaseReceipt> {
    let package = session.selected_package.as_ref()?;
    Some(PurchaseReceipt {
        correlation_id: session.correlation_id.clone()?,
        credits: package.credit_amount,
        price_minor_units: package.price_minor_units,
        new_balance: None,
        balance_reconciled: false,
        completed_at: Utc::now(),
    })
}
