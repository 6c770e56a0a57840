#![allow(dead_code)]

use async_trait::async_trait;
use credit_purchase::payments::catalog::{CreditPackage, PackageCatalog};
use credit_purchase::payments::error::{GatewayError, PaymentResult};
use credit_purchase::payments::phone::PhoneNumber;
use credit_purchase::payments::provider::PaymentGateway;
use credit_purchase::payments::types::{CorrelationId, PaymentState, PushAccepted};
use credit_purchase::services::{BalanceService, BalanceSource};
use credit_purchase::workers::{PaymentConfirmationEngine, PollingPolicy};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const STARTING_BALANCE: u64 = 250;

/// In-memory gateway that plays back a fixed script. Once the status script
/// runs out every further check answers `Pending`.
pub struct ScriptedGateway {
    push_result: PaymentResult<PushAccepted>,
    statuses: Mutex<VecDeque<PaymentResult<PaymentState>>>,
    status_gate: Option<Arc<Notify>>,
    balance_gate: Option<Arc<Notify>>,
    balance: AtomicU64,
    push_calls: AtomicUsize,
    status_calls: AtomicUsize,
    balance_calls: AtomicUsize,
    pushed: Mutex<Vec<(String, u32)>>,
}

impl ScriptedGateway {
    pub fn accepting(correlation_id: &str) -> Self {
        Self::with_push(Ok(PushAccepted {
            correlation_id: CorrelationId::new(correlation_id),
        }))
    }

    pub fn rejecting(error: GatewayError) -> Self {
        Self::with_push(Err(error))
    }

    fn with_push(push_result: PaymentResult<PushAccepted>) -> Self {
        Self {
            push_result,
            statuses: Mutex::new(VecDeque::new()),
            status_gate: None,
            balance_gate: None,
            balance: AtomicU64::new(STARTING_BALANCE),
            push_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
            pushed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_statuses(
        self,
        statuses: impl IntoIterator<Item = PaymentResult<PaymentState>>,
    ) -> Self {
        self.statuses.lock().unwrap().extend(statuses);
        self
    }

    pub fn with_balance(self, credits: u64) -> Self {
        self.balance.store(credits, Ordering::SeqCst);
        self
    }

    /// Every status check waits for a permit on `gate` before answering.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.status_gate = Some(gate);
        self
    }

    /// Every balance fetch waits for a permit on `gate` before answering.
    pub fn gated_balance(mut self, gate: Arc<Notify>) -> Self {
        self.balance_gate = Some(gate);
        self
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn pushed(&self) -> Vec<(String, u32)> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate_push(
        &self,
        phone: &PhoneNumber,
        credits: u32,
    ) -> PaymentResult<PushAccepted> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.pushed
            .lock()
            .unwrap()
            .push((phone.as_str().to_string(), credits));
        self.push_result.clone()
    }

    async fn get_status(&self, _correlation_id: &CorrelationId) -> PaymentResult<PaymentState> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.status_gate {
            gate.notified().await;
        }
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PaymentState::Pending))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[async_trait]
impl BalanceSource for ScriptedGateway {
    async fn fetch_balance(&self) -> PaymentResult<u64> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.balance_gate {
            gate.notified().await;
        }
        Ok(self.balance.load(Ordering::SeqCst))
    }
}

pub fn engine_with(gateway: &Arc<ScriptedGateway>) -> PaymentConfirmationEngine {
    let balance = Arc::new(BalanceService::with_initial(
        gateway.clone(),
        STARTING_BALANCE,
    ));
    PaymentConfirmationEngine::new(gateway.clone(), balance, PollingPolicy::default())
}

/// The 100-credit / KSh 900 bundle.
pub fn popular_package() -> CreditPackage {
    PackageCatalog::default()
        .find(2)
        .cloned()
        .expect("default catalog has package 2")
}
