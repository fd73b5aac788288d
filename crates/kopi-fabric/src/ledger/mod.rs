//! Ledger connection boundary
//!
//! A connection is opened for exactly one identity. From it the caller
//! resolves a contract on a channel, then submits (ordered, state-changing)
//! or evaluates (read-only) transactions with string arguments. Contract
//! events are delivered over a channel until the connection is closed.
//!
//! [`PeerGateway`] reaches a real network through the peer Gateway gRPC
//! service; [`MemoryLedger`] runs chaincode in-process.

pub mod gateway;
pub mod memory;
mod proposal;
mod proto;

pub use gateway::PeerGateway;
pub use memory::{Chaincode, MemoryLedger, TxContext};

use async_trait::async_trait;
use kopi_core::{ConnectionDescriptor, Identity};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::LedgerError;

/// Receiving half of a contract event subscription
pub type EventStream = mpsc::Receiver<ContractEvent>;

/// Options used when opening a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Discover peers and orderers from the network instead of the descriptor
    pub discovery_enabled: bool,
    /// Rewrite discovered addresses to localhost (local development networks)
    pub as_localhost: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            discovery_enabled: true,
            as_localhost: true,
        }
    }
}

/// An event emitted by a contract during a committed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractEvent {
    pub chaincode: String,
    pub event_name: String,
    pub payload: Vec<u8>,
    pub transaction_id: String,
}

/// A contract deployed on a channel
#[async_trait]
pub trait Contract: Send + Sync {
    fn name(&self) -> &str;

    /// Submit a transaction for ordering and commit
    async fn submit(&self, transaction: &str, args: &[String]) -> Result<Vec<u8>, LedgerError>;

    /// Evaluate a transaction without committing it
    async fn evaluate(&self, transaction: &str, args: &[String]) -> Result<Vec<u8>, LedgerError>;

    /// Subscribe to events emitted by this contract
    async fn events(&self) -> Result<EventStream, LedgerError>;
}

/// An open, identity-scoped connection to the network
#[async_trait]
pub trait LedgerConnection: Send + Sync {
    /// Name of the identity this connection acts as
    fn identity(&self) -> &str;

    /// Resolve a contract on a channel
    async fn contract(&self, channel: &str, name: &str) -> Result<Arc<dyn Contract>, LedgerError>;

    /// Release the connection. Idempotent; contract handles stop working.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens connections to the ledger network
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        identity: &Identity,
        options: ConnectOptions,
    ) -> Result<Box<dyn LedgerConnection>, LedgerError>;

    /// Description for logging
    fn description(&self) -> &str {
        "ledger connector"
    }
}
