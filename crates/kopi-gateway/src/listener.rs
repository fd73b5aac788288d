//! Contract event listener
//!
//! One listener per process subscribes to the contract's events as a fixed
//! identity. `BankTransfer` events are handed to a [`SettlementGateway`];
//! every other event name is ignored. Events are handled one at a time in
//! arrival order.
//!
//! If the subscription cannot be established the listener stays
//! [`ListenerState::Disconnected`] and the gateway keeps serving requests
//! without it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kopi_fabric::{ContractEvent, EventStream};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::session::{Session, SessionManager};

/// Event requesting an off-ledger bank transfer
pub const BANK_TRANSFER_EVENT: &str = "BankTransfer";

/// Payload of a `BankTransfer` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransfer {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Amount")]
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementReceipt {
    pub reference: Uuid,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Settlement rejected: {0}")]
    Rejected(String),

    #[error("Settlement system unavailable: {0}")]
    Unavailable(String),
}

/// External banking system that settles transfers off-ledger
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    async fn settle(&self, transfer: &BankTransfer) -> Result<SettlementReceipt, SettlementError>;
}

/// Settlement stand-in that waits a fixed delay and always succeeds
#[derive(Debug, Clone)]
pub struct SimulatedBank {
    delay: Duration,
}

impl SimulatedBank {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl SettlementGateway for SimulatedBank {
    async fn settle(&self, transfer: &BankTransfer) -> Result<SettlementReceipt, SettlementError> {
        info!(
            from = %transfer.from,
            to = %transfer.to,
            amount = transfer.amount,
            "Contacting bank (simulated)"
        );
        tokio::time::sleep(self.delay).await;
        Ok(SettlementReceipt {
            reference: Uuid::new_v4(),
            settled_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    Disconnected,
    Listening,
}

/// Event handling counters
#[derive(Debug, Default)]
pub struct ListenerStats {
    settled: AtomicU64,
    failed: AtomicU64,
    ignored: AtomicU64,
    dropped: AtomicU64,
}

impl ListenerStats {
    /// Transfers the settlement gateway accepted
    pub fn settled(&self) -> u64 {
        self.settled.load(Ordering::Relaxed)
    }

    /// Transfers the settlement gateway rejected
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Events with an unrelated name
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Transfer events whose payload could not be decoded
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Handle to the process-wide contract event listener
pub struct EventListener {
    identity: String,
    state: watch::Receiver<ListenerState>,
    shutdown: watch::Sender<bool>,
    stats: Arc<ListenerStats>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for EventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish()
    }
}

impl EventListener {
    /// Subscribe to contract events as `identity`
    ///
    /// Never fails: on error the listener is returned disconnected and the
    /// cause is logged.
    pub async fn start(
        sessions: &SessionManager,
        identity: &str,
        settlement: Arc<dyn SettlementGateway>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ListenerState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ListenerStats::default());

        let task = match Self::subscribe(sessions, identity).await {
            Ok((session, events)) => {
                info!(
                    identity = %identity,
                    channel = %sessions.channel(),
                    contract = %sessions.contract_name(),
                    "Listening for contract events"
                );
                state_tx.send_replace(ListenerState::Listening);
                Some(tokio::spawn(run(
                    session,
                    events,
                    settlement,
                    stats.clone(),
                    state_tx,
                    shutdown_rx,
                )))
            }
            Err(e) => {
                error!(
                    identity = %identity,
                    error = %e,
                    "Failed to start event listener, continuing without it"
                );
                None
            }
        };

        Self {
            identity: identity.to_string(),
            state: state_rx,
            shutdown: shutdown_tx,
            stats,
            task: Mutex::new(task),
        }
    }

    async fn subscribe(
        sessions: &SessionManager,
        identity: &str,
    ) -> Result<(Session, EventStream), crate::session::SessionError> {
        let session = sessions.open(identity).await?;
        let events = session.contract().events().await?;
        Ok((session, events))
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Wait until the listener reaches `state`
    pub async fn wait_for(&self, state: ListenerState) {
        let mut rx = self.state.clone();
        // Err means the task is gone, so the state can no longer change
        let _ = rx.wait_for(|current| *current == state).await;
    }

    /// Stop listening and release the listener's session
    ///
    /// An event being settled is finished first. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Event listener task failed");
            }
        }
    }
}

async fn run(
    session: Session,
    mut events: EventStream,
    settlement: Arc<dyn SettlementGateway>,
    stats: Arc<ListenerStats>,
    state: watch::Sender<ListenerState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                info!("Event listener shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(event) => handle_event(&event, settlement.as_ref(), &stats).await,
                None => {
                    warn!("Contract event stream ended");
                    break;
                }
            },
        }
    }

    drop(events);
    session.close();
    state.send_replace(ListenerState::Disconnected);
}

/// Handle one contract event
pub async fn handle_event(
    event: &ContractEvent,
    settlement: &dyn SettlementGateway,
    stats: &ListenerStats,
) {
    if event.event_name != BANK_TRANSFER_EVENT {
        debug!(event = %event.event_name, tx_id = %event.transaction_id, "Ignoring event");
        stats.ignored.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let transfer: BankTransfer = match serde_json::from_slice(&event.payload) {
        Ok(transfer) => transfer,
        Err(e) => {
            warn!(
                tx_id = %event.transaction_id,
                error = %e,
                "Dropping malformed bank transfer event"
            );
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    info!(
        from = %transfer.from,
        to = %transfer.to,
        amount = transfer.amount,
        tx_id = %event.transaction_id,
        "Bank transfer requested"
    );

    match settlement.settle(&transfer).await {
        Ok(receipt) => {
            info!(reference = %receipt.reference, tx_id = %event.transaction_id, "Bank transfer settled");
            stats.settled.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            error!(tx_id = %event.transaction_id, error = %e, "Bank transfer failed");
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingBank {
        transfers: StdMutex<Vec<BankTransfer>>,
    }

    #[async_trait]
    impl SettlementGateway for RecordingBank {
        async fn settle(&self, transfer: &BankTransfer) -> Result<SettlementReceipt, SettlementError> {
            self.transfers.lock().unwrap().push(transfer.clone());
            Ok(SettlementReceipt {
                reference: Uuid::new_v4(),
                settled_at: Utc::now(),
            })
        }
    }

    struct RejectingBank;

    #[async_trait]
    impl SettlementGateway for RejectingBank {
        async fn settle(&self, _: &BankTransfer) -> Result<SettlementReceipt, SettlementError> {
            Err(SettlementError::Rejected("insufficient funds".into()))
        }
    }

    fn event(name: &str, payload: &str) -> ContractEvent {
        ContractEvent {
            chaincode: "kopi".into(),
            event_name: name.into(),
            payload: payload.as_bytes().to_vec(),
            transaction_id: "tx1".into(),
        }
    }

    #[tokio::test]
    async fn test_bank_transfer_is_settled() {
        let bank = RecordingBank::default();
        let stats = ListenerStats::default();

        handle_event(
            &event("BankTransfer", r#"{"From":"ImportirMSP","To":"PetaniMSP","Amount":250000}"#),
            &bank,
            &stats,
        )
        .await;

        let transfers = bank.transfers.lock().unwrap();
        assert_eq!(
            *transfers,
            vec![BankTransfer {
                from: "ImportirMSP".into(),
                to: "PetaniMSP".into(),
                amount: 250000.0,
            }]
        );
        assert_eq!(stats.settled(), 1);
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let bank = RecordingBank::default();
        let stats = ListenerStats::default();

        handle_event(&event("BatchCreated", "{}"), &bank, &stats).await;
        handle_event(&event("banktransfer", r#"{"From":"a","To":"b","Amount":1}"#), &bank, &stats).await;

        assert!(bank.transfers.lock().unwrap().is_empty());
        assert_eq!(stats.ignored(), 2);
        assert_eq!(stats.settled(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let bank = RecordingBank::default();
        let stats = ListenerStats::default();

        handle_event(&event("BankTransfer", "not json"), &bank, &stats).await;
        handle_event(&event("BankTransfer", r#"{"From":"a","To":"b"}"#), &bank, &stats).await;

        assert!(bank.transfers.lock().unwrap().is_empty());
        assert_eq!(stats.dropped(), 2);
    }

    #[tokio::test]
    async fn test_settlement_failure_is_counted() {
        let stats = ListenerStats::default();
        handle_event(
            &event("BankTransfer", r#"{"From":"a","To":"b","Amount":1.5}"#),
            &RejectingBank,
            &stats,
        )
        .await;
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.settled(), 0);
    }

    #[tokio::test]
    async fn test_simulated_bank_waits() {
        let bank = SimulatedBank::new(Duration::from_millis(50));
        let transfer = BankTransfer {
            from: "ImportirMSP".into(),
            to: "PetaniMSP".into(),
            amount: 10.0,
        };

        let started = tokio::time::Instant::now();
        bank.settle(&transfer).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
