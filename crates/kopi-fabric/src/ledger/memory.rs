//! In-process ledger
//!
//! Runs registered chaincode against a local world state. Submits execute
//! against a copy of the state and commit only on success; evaluates run
//! read-only and never emit events. Useful for development networks and for
//! exercising the gateway without a running peer.

use async_trait::async_trait;
use kopi_core::{ConnectionDescriptor, Identity};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{ConnectOptions, Contract, ContractEvent, EventStream, LedgerConnection, LedgerConnector};
use crate::error::LedgerError;

const EVENT_BUFFER: usize = 64;

type WorldState = BTreeMap<String, Vec<u8>>;
type ContractKey = (String, String);

/// Smart contract logic executed by [`MemoryLedger`]
pub trait Chaincode: Send + Sync {
    /// Run `function` with `args`. An `Err` aborts the transaction.
    fn invoke(
        &self,
        ctx: &mut TxContext<'_>,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, String>;
}

/// Transaction context handed to chaincode
pub struct TxContext<'a> {
    tx_id: &'a str,
    msp_id: &'a str,
    state: &'a mut WorldState,
    writable: bool,
    events: Vec<(String, Vec<u8>)>,
}

impl<'a> TxContext<'a> {
    pub fn tx_id(&self) -> &str {
        self.tx_id
    }

    /// MSP id of the submitting identity
    pub fn client_msp_id(&self) -> &str {
        self.msp_id
    }

    pub fn get_state(&self, key: &str) -> Option<Vec<u8>> {
        self.state.get(key).cloned()
    }

    pub fn put_state(&mut self, key: impl Into<String>, value: Vec<u8>) -> Result<(), String> {
        if !self.writable {
            return Err("cannot write state during evaluation".into());
        }
        self.state.insert(key.into(), value);
        Ok(())
    }

    /// All entries whose key starts with `prefix`, in key order
    pub fn states_by_prefix(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        self.state
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Emit an event, delivered to subscribers once the transaction commits
    pub fn set_event(&mut self, name: impl Into<String>, payload: Vec<u8>) {
        self.events.push((name.into(), payload));
    }

    fn into_events(self) -> Vec<(String, Vec<u8>)> {
        self.events
    }
}

#[derive(Clone)]
struct Subscriber {
    closed: Arc<AtomicBool>,
    sender: mpsc::Sender<ContractEvent>,
}

struct LedgerInner {
    channels: Vec<String>,
    chaincodes: RwLock<HashMap<String, Arc<dyn Chaincode>>>,
    world: Mutex<HashMap<ContractKey, WorldState>>,
    subscribers: Mutex<HashMap<ContractKey, Vec<Subscriber>>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    tx_seq: AtomicU64,
}

impl LedgerInner {
    fn next_tx_id(&self) -> String {
        format!("tx-{:016x}", self.tx_seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Deliver committed events in order, waiting on slow subscribers
    async fn publish(&self, key: &ContractKey, events: Vec<ContractEvent>) {
        if events.is_empty() {
            return;
        }
        let live: Vec<Subscriber> = {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(list) = subscribers.get_mut(key) else {
                return;
            };
            list.retain(|sub| !sub.closed.load(Ordering::SeqCst) && !sub.sender.is_closed());
            list.clone()
        };

        for event in events {
            for sub in &live {
                if sub.closed.load(Ordering::SeqCst) {
                    continue;
                }
                if sub.sender.send(event.clone()).await.is_err() {
                    debug!(event = %event.event_name, "Subscriber went away before delivery");
                }
            }
        }
    }

    fn drop_subscribers(&self, closed: &Arc<AtomicBool>) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        for list in subscribers.values_mut() {
            list.retain(|sub| !Arc::ptr_eq(&sub.closed, closed));
        }
    }
}

/// In-process ledger network
#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<LedgerInner>,
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedger")
            .field("channels", &self.inner.channels)
            .field("open_connections", &self.open_connections())
            .finish()
    }
}

impl MemoryLedger {
    /// Create a ledger serving the given channels
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(LedgerInner {
                channels: channels.into_iter().map(Into::into).collect(),
                chaincodes: RwLock::new(HashMap::new()),
                world: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(HashMap::new()),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                tx_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Install chaincode under `name` on every channel
    pub fn install(&self, name: impl Into<String>, chaincode: impl Chaincode + 'static) {
        let name = name.into();
        info!(chaincode = %name, "Installed chaincode");
        self.inner
            .chaincodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(chaincode));
    }

    /// Builder-style [`install`](Self::install)
    pub fn with_chaincode(self, name: impl Into<String>, chaincode: impl Chaincode + 'static) -> Self {
        self.install(name, chaincode);
        self
    }

    /// Connections opened over the ledger's lifetime
    pub fn connections_opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Connections released over the ledger's lifetime
    pub fn connections_closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Connections currently open
    pub fn open_connections(&self) -> usize {
        self.connections_opened()
            .saturating_sub(self.connections_closed())
    }
}

#[async_trait]
impl LedgerConnector for MemoryLedger {
    async fn connect(
        &self,
        _descriptor: &ConnectionDescriptor,
        identity: &Identity,
        options: ConnectOptions,
    ) -> Result<Box<dyn LedgerConnection>, LedgerError> {
        if identity.certificate().trim().is_empty() {
            return Err(LedgerError::Connection(format!(
                "identity '{}' has no certificate",
                identity.name()
            )));
        }

        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        debug!(
            identity = %identity.name(),
            msp_id = %identity.msp_id(),
            discovery = options.discovery_enabled,
            as_localhost = options.as_localhost,
            "Opened ledger connection"
        );

        Ok(Box::new(MemoryConnection {
            inner: self.inner.clone(),
            identity: identity.name().to_string(),
            msp_id: identity.msp_id().to_string(),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }

    fn description(&self) -> &str {
        "in-process ledger"
    }
}

struct MemoryConnection {
    inner: Arc<LedgerInner>,
    identity: String,
    msp_id: String,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl LedgerConnection for MemoryConnection {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn contract(&self, channel: &str, name: &str) -> Result<Arc<dyn Contract>, LedgerError> {
        if self.is_closed() {
            return Err(LedgerError::Closed);
        }
        if !self.inner.channels.iter().any(|c| c == channel) {
            return Err(LedgerError::ChannelNotFound(channel.to_string()));
        }

        let chaincode = self
            .inner
            .chaincodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| LedgerError::ContractNotFound(name.to_string()))?;

        Ok(Arc::new(MemoryContract {
            inner: self.inner.clone(),
            key: (channel.to_string(), name.to_string()),
            chaincode,
            msp_id: self.msp_id.clone(),
            closed: self.closed.clone(),
        }))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.closed.fetch_add(1, Ordering::SeqCst);
            self.inner.drop_subscribers(&self.closed);
            debug!(identity = %self.identity, "Closed ledger connection");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MemoryContract {
    inner: Arc<LedgerInner>,
    key: ContractKey,
    chaincode: Arc<dyn Chaincode>,
    msp_id: String,
    closed: Arc<AtomicBool>,
}

impl MemoryContract {
    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(LedgerError::Closed)
        } else {
            Ok(())
        }
    }

    fn failure(transaction: &str, message: String) -> LedgerError {
        LedgerError::Transaction {
            transaction: transaction.to_string(),
            message,
        }
    }
}

#[async_trait]
impl Contract for MemoryContract {
    fn name(&self) -> &str {
        &self.key.1
    }

    async fn submit(&self, transaction: &str, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        self.ensure_open()?;
        let tx_id = self.inner.next_tx_id();

        let (payload, events) = {
            let mut world = self.inner.world.lock().unwrap_or_else(PoisonError::into_inner);
            let state = world.entry(self.key.clone()).or_default();
            let mut working = state.clone();

            let mut ctx = TxContext {
                tx_id: &tx_id,
                msp_id: &self.msp_id,
                state: &mut working,
                writable: true,
                events: Vec::new(),
            };
            let payload = self
                .chaincode
                .invoke(&mut ctx, transaction, args)
                .map_err(|message| Self::failure(transaction, message))?;
            let events = ctx.into_events();

            *state = working;
            (payload, events)
        };

        debug!(tx_id = %tx_id, transaction = %transaction, events = events.len(), "Committed transaction");

        let events = events
            .into_iter()
            .map(|(event_name, payload)| ContractEvent {
                chaincode: self.key.1.clone(),
                event_name,
                payload,
                transaction_id: tx_id.clone(),
            })
            .collect();
        self.inner.publish(&self.key, events).await;

        Ok(payload)
    }

    async fn evaluate(&self, transaction: &str, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        self.ensure_open()?;
        let tx_id = self.inner.next_tx_id();

        let mut snapshot = self
            .inner
            .world
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.key)
            .cloned()
            .unwrap_or_default();

        let mut ctx = TxContext {
            tx_id: &tx_id,
            msp_id: &self.msp_id,
            state: &mut snapshot,
            writable: false,
            events: Vec::new(),
        };
        self.chaincode
            .invoke(&mut ctx, transaction, args)
            .map_err(|message| Self::failure(transaction, message))
    }

    async fn events(&self) -> Result<EventStream, LedgerError> {
        self.ensure_open()?;
        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(self.key.clone())
            .or_default()
            .push(Subscriber {
                closed: self.closed.clone(),
                sender,
            });
        Ok(receiver)
    }
}
