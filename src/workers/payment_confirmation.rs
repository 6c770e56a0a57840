//! Confirmation engine: owns the current purchase session and the background
//! task that sends the push and polls the gateway until the payment resolves.

use crate::config::ConfigError;
use crate::logging::mask_phone;
use crate::payments::catalog::CreditPackage;
use crate::payments::phone::{normalize, PhoneNumber};
use crate::payments::provider::PaymentGateway;
use crate::services::balance::BalanceService;
use crate::workers::purchase_session::{
    reduce, PurchaseSession, SessionEvent, SessionId, SessionStatus, TransitionError,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingPolicy {
    /// Pause between an accepted push and the first status check, so the
    /// prompt has time to reach the handset.
    pub initial_delay: Duration,
    /// Pause between two status checks.
    pub poll_interval: Duration,
    /// Status checks allowed before the purchase times out. Pending answers
    /// and transient errors both count.
    pub max_attempts: u32,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(3),
            max_attempts: 30,
        }
    }
}

impl PollingPolicy {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            initial_delay: Duration::from_millis(parse_var(
                "PAYMENT_POLL_INITIAL_DELAY_MS",
                std::env::var("PAYMENT_POLL_INITIAL_DELAY_MS").ok(),
                defaults.initial_delay.as_millis() as u64,
            )?),
            poll_interval: Duration::from_millis(parse_var(
                "PAYMENT_POLL_INTERVAL_MS",
                std::env::var("PAYMENT_POLL_INTERVAL_MS").ok(),
                defaults.poll_interval.as_millis() as u64,
            )?),
            max_attempts: parse_var(
                "PAYMENT_POLL_MAX_ATTEMPTS",
                std::env::var("PAYMENT_POLL_MAX_ATTEMPTS").ok(),
                defaults.max_attempts,
            )?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_POLL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_POLL_INTERVAL_MS".to_string(),
            ));
        }
        Ok(())
    }

    /// Upper bound on how long a purchase can stay unresolved.
    pub fn total_budget(&self) -> Duration {
        self.initial_delay + self.poll_interval * self.max_attempts
    }
}

/// Parses an optional variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(
    name: &str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        None => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Background work of one session. Dropping it aborts the task, which also
/// drops any pending timer or in-flight request.
struct FlowTask {
    session_id: SessionId,
    handle: Option<JoinHandle<()>>,
}

impl FlowTask {
    /// Lets the task run to completion on its own.
    fn detach(mut self) {
        if self.handle.take().is_some() {
            debug!(session_id = %self.session_id, "detaching purchase flow task");
        }
    }
}

impl Drop for FlowTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                debug!(session_id = %self.session_id, "aborting purchase flow task");
            }
            handle.abort();
        }
    }
}

/// The session cell. Every mutation goes through [`SessionCell::apply`].
struct SessionCell {
    state: watch::Sender<PurchaseSession>,
    max_attempts: u32,
}

impl SessionCell {
    fn apply(
        &self,
        session_id: SessionId,
        event: SessionEvent,
    ) -> Result<PurchaseSession, TransitionError> {
        let event_name = event.name();
        let mut outcome = Err(TransitionError::Superseded);
        self.state.send_if_modified(|session| {
            if session.id != session_id {
                return false;
            }
            match reduce(session, event, self.max_attempts) {
                Ok(next) => {
                    if next.status != session.status {
                        info!(
                            session_id = %session_id,
                            from = %session.status,
                            to = %next.status,
                            event = event_name,
                            "purchase session transition"
                        );
                    }
                    *session = next.clone();
                    outcome = Ok(next);
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome
    }

    fn current_id(&self) -> SessionId {
        self.state.borrow().id
    }
}

/// Drives one credit purchase from package selection to a terminal state.
///
/// Must be used from within a tokio runtime: confirming a phone number spawns
/// the push-and-poll task.
pub struct PaymentConfirmationEngine {
    cell: Arc<SessionCell>,
    gateway: Arc<dyn PaymentGateway>,
    balance: Arc<BalanceService>,
    policy: PollingPolicy,
    flow: Mutex<Option<FlowTask>>,
}

impl PaymentConfirmationEngine {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        balance: Arc<BalanceService>,
        policy: PollingPolicy,
    ) -> Self {
        let (state, _) = watch::channel(PurchaseSession::new());
        Self {
            cell: Arc::new(SessionCell {
                state,
                max_attempts: policy.max_attempts,
            }),
            gateway,
            balance,
            policy,
            flow: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &PollingPolicy {
        &self.policy
    }

    pub fn snapshot(&self) -> PurchaseSession {
        self.cell.state.borrow().clone()
    }

    /// Receives a new snapshot after every transition.
    pub fn subscribe(&self) -> watch::Receiver<PurchaseSession> {
        self.cell.state.subscribe()
    }

    pub fn balance(&self) -> u64 {
        self.balance.current()
    }

    /// Replaces the current session with a fresh one. An unfinished previous
    /// session is cancelled and its pending work aborted. A completed purchase
    /// still waiting on its balance refresh keeps its task, so the refresh
    /// lands in the balance cache.
    pub fn start_purchase(&self) -> SessionId {
        let previous = self.cell.current_id();
        let reconciling = match self.cell.apply(previous, SessionEvent::Cancelled) {
            Ok(_) => false,
            Err(_) => {
                let session = self.snapshot();
                session.status == SessionStatus::Completed && !session.is_settled()
            }
        };
        if let Some(flow) = self.take_flow() {
            if reconciling {
                flow.detach();
            } else {
                drop(flow);
            }
        }

        let session = PurchaseSession::new();
        let id = session.id;
        let replaced = self.cell.state.send_replace(session);
        debug!(
            session_id = %id,
            replaced = %replaced.id,
            replaced_status = %replaced.status,
            "purchase session started"
        );
        id
    }

    pub fn select_package(
        &self,
        package: CreditPackage,
    ) -> Result<PurchaseSession, TransitionError> {
        let id = self.cell.current_id();
        debug!(session_id = %id, package_id = package.id, credits = package.credit_amount, "package selected");
        self.cell.apply(id, SessionEvent::PackageChosen(package))?;
        self.cell.apply(id, SessionEvent::PhonePrompted)
    }

    /// Validates `raw` and, if it normalizes, starts the push-and-poll flow.
    /// An invalid number leaves the session in phone entry with the error set.
    pub fn confirm_phone(&self, raw: &str) -> Result<PurchaseSession, TransitionError> {
        let id = self.cell.current_id();
        let phone = match normalize(raw) {
            Ok(phone) => phone,
            Err(e) => {
                debug!(session_id = %id, reason = e.reason(), "phone number rejected");
                return self.cell.apply(id, SessionEvent::PhoneRejected(e));
            }
        };

        let session = self.cell.apply(id, SessionEvent::PhoneAccepted(phone.clone()))?;
        let package = session
            .selected_package
            .clone()
            .ok_or(TransitionError::Invalid {
                state: session.status,
                event: "phone_accepted",
            })?;

        let flow = PurchaseFlow {
            cell: Arc::clone(&self.cell),
            gateway: Arc::clone(&self.gateway),
            balance: Arc::clone(&self.balance),
            policy: self.policy.clone(),
            session_id: id,
        };
        let handle = tokio::spawn(flow.run(phone, package));
        let previous = self
            .flow
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(FlowTask {
                session_id: id,
                handle: Some(handle),
            });
        drop(previous);

        Ok(session)
    }

    /// Cancels the current session. Scheduled polls are dropped and the
    /// balance is never touched. Fails if the session already ended.
    pub fn cancel(&self) -> Result<PurchaseSession, TransitionError> {
        let id = self.cell.current_id();
        let session = self.cell.apply(id, SessionEvent::Cancelled)?;
        drop(self.take_flow());
        info!(
            session_id = %id,
            poll_attempt = session.poll_attempt,
            "purchase cancelled by user"
        );
        Ok(session)
    }

    /// Waits until the current session is settled and returns it.
    pub async fn wait_until_settled(&self) -> PurchaseSession {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(|s| s.is_settled()).await.map(|s| (*s).clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    fn take_flow(&self) -> Option<FlowTask> {
        self.flow
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for PaymentConfirmationEngine {
    fn drop(&mut self) {
        drop(self.take_flow());
    }
}

// ---------------------------------------------------------------------------
// Flow task
// ---------------------------------------------------------------------------

struct PurchaseFlow {
    cell: Arc<SessionCell>,
    gateway: Arc<dyn PaymentGateway>,
    balance: Arc<BalanceService>,
    policy: PollingPolicy,
    session_id: SessionId,
}

impl PurchaseFlow {
    async fn run(self, phone: PhoneNumber, package: CreditPackage) {
        let id = self.session_id;

        let accepted = match self
            .gateway
            .initiate_push(&phone, package.credit_amount)
            .await
        {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(
                    session_id = %id,
                    gateway = self.gateway.name(),
                    phone = %mask_phone(phone.as_str()),
                    reason = e.reason(),
                    error = %e,
                    "push initiation failed"
                );
                let _ = self.cell.apply(id, SessionEvent::PushRejected(e));
                return;
            }
        };

        let correlation_id = accepted.correlation_id;
        if self
            .cell
            .apply(id, SessionEvent::PushAccepted(correlation_id.clone()))
            .is_err()
        {
            return;
        }

        tokio::time::sleep(self.policy.initial_delay).await;

        loop {
            let event = match self.gateway.get_status(&correlation_id).await {
                Ok(state) => SessionEvent::StatusPolled(state),
                Err(e) => {
                    warn!(
                        session_id = %id,
                        correlation_id = %correlation_id,
                        transient = e.is_transient(),
                        error = %e,
                        "payment status check failed"
                    );
                    SessionEvent::PollFailed(e)
                }
            };

            let session = match self.cell.apply(id, event) {
                Ok(session) => session,
                Err(e) => {
                    debug!(session_id = %id, reason = %e, "discarding status result");
                    return;
                }
            };

            match session.status {
                SessionStatus::AwaitingConfirmation => {
                    tokio::time::sleep(self.policy.poll_interval).await;
                }
                SessionStatus::Completed => {
                    self.reconcile_balance().await;
                    return;
                }
                SessionStatus::TimedOut => {
                    warn!(
                        session_id = %id,
                        correlation_id = %correlation_id,
                        attempts = session.poll_attempt,
                        "payment unresolved after status check budget"
                    );
                    return;
                }
                _ => return,
            }
        }
    }

    async fn reconcile_balance(&self) {
        let new_balance = match self.balance.refresh().await {
            Ok(credits) => Some(credits),
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "balance refresh after purchase failed");
                None
            }
        };
        if let Err(e) = self
            .cell
            .apply(self.session_id, SessionEvent::BalanceReconciled(new_balance))
        {
            debug!(session_id = %self.session_id, reason = %e, "balance reconciliation discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_product_timing() {
        let policy = PollingPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_secs(2));
        assert_eq!(policy.poll_interval, Duration::from_secs(3));
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.total_budget(), Duration::from_secs(92));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn unparsable_policy_value_is_an_error() {
        let err = parse_var::<u32>("PAYMENT_POLL_MAX_ATTEMPTS", Some("thirty".to_string()), 30)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name) if name == "PAYMENT_POLL_MAX_ATTEMPTS"));
        assert!(parse_var::<u64>("PAYMENT_POLL_INTERVAL_MS", Some("-5".to_string()), 3000).is_err());
    }

    #[test]
    fn unset_policy_value_uses_default() {
        assert_eq!(parse_var::<u64>("PAYMENT_POLL_INTERVAL_MS", None, 3000).unwrap(), 3000);
        assert_eq!(
            parse_var::<u32>("PAYMENT_POLL_MAX_ATTEMPTS", Some(" 12 ".to_string()), 30).unwrap(),
            12
        );
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let policy = PollingPolicy {
            max_attempts: 0,
            ..PollingPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
