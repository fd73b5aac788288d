//! Connector for the peer Gateway service
//!
//! Each connection dials one peer from the organization's descriptor and
//! drives the Gateway gRPC service on it. Endorsement routing and peer
//! discovery happen on the peer side, so the client only ever talks to the
//! peer it dialled.

use async_trait::async_trait;
use kopi_core::{ConnectionDescriptor, Identity, PeerEntry};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tonic::{Code, Status};
use tracing::{debug, info, warn};

use super::proposal::{endorsed_result, ProposalSigner};
use super::proto::{EndorseRequest, EvaluateRequest, GatewayClient, SubmitRequest, TX_VALID};
use super::{ConnectOptions, Contract, ContractEvent, EventStream, LedgerConnection, LedgerConnector};
use crate::error::LedgerError;

const EVENT_BUFFER: usize = 64;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Opens connections through a peer's Gateway service
#[derive(Debug, Clone)]
pub struct PeerGateway {
    connect_timeout: Duration,
    request_timeout: Duration,
    commit_timeout: Duration,
}

impl Default for PeerGateway {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }
}

impl PeerGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Timeout for endorsement, evaluation and submission
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// How long to wait for a submitted transaction to commit
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    async fn dial(&self, peer: &PeerEntry, options: ConnectOptions) -> Result<Channel, LedgerError> {
        let target = PeerTarget::resolve(peer, options)?;

        let mut endpoint = Endpoint::from_shared(target.uri.clone())
            .map_err(|e| LedgerError::Connection(format!("invalid peer url {}: {}", target.uri, e)))?
            .connect_timeout(self.connect_timeout);

        if let Some(domain) = &target.tls_domain {
            let mut tls = ClientTlsConfig::new().domain_name(domain.clone());
            for pem in trusted_roots(peer).await? {
                tls = tls.ca_certificate(Certificate::from_pem(pem));
            }
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| LedgerError::Connection(format!("TLS setup for {}: {}", peer.key, e)))?;
        }

        endpoint
            .connect()
            .await
            .map_err(|e| LedgerError::Connection(format!("{} ({}): {}", peer.key, target.uri, e)))
    }
}

#[async_trait]
impl LedgerConnector for PeerGateway {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        identity: &Identity,
        options: ConnectOptions,
    ) -> Result<Box<dyn LedgerConnection>, LedgerError> {
        let signer = Arc::new(ProposalSigner::new(identity)?);
        let peers = descriptor
            .gateway_peers(identity.msp_id())
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        let mut last_error = None;
        for peer in &peers {
            match self.dial(peer, options).await {
                Ok(channel) => {
                    info!(
                        identity = %identity.name(),
                        peer = %peer.key,
                        discovery = options.discovery_enabled,
                        as_localhost = options.as_localhost,
                        "Connected to peer gateway"
                    );
                    return Ok(Box::new(GatewayConnection {
                        identity: identity.name().to_string(),
                        peer: peer.key.clone(),
                        channel,
                        signer,
                        closed: Arc::new(AtomicBool::new(false)),
                        streams: Arc::new(Mutex::new(Vec::new())),
                        request_timeout: self.request_timeout,
                        commit_timeout: self.commit_timeout,
                    }));
                }
                Err(e) => {
                    warn!(identity = %identity.name(), peer = %peer.key, error = %e, "Peer unreachable");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LedgerError::Connection("no peers to dial".into())))
    }

    fn description(&self) -> &str {
        "peer gateway"
    }
}

/// Address and TLS server name for a peer
#[derive(Debug, Clone, PartialEq, Eq)]
struct PeerTarget {
    uri: String,
    /// Present for TLS peers
    tls_domain: Option<String>,
}

impl PeerTarget {
    fn resolve(peer: &PeerEntry, options: ConnectOptions) -> Result<Self, LedgerError> {
        let (scheme, rest) = peer
            .url
            .split_once("://")
            .ok_or_else(|| LedgerError::Connection(format!("peer url without scheme: {}", peer.url)))?;
        let tls = match scheme {
            "grpcs" | "https" => true,
            "grpc" | "http" => false,
            other => {
                return Err(LedgerError::Connection(format!(
                    "unsupported peer scheme '{}' for {}",
                    other, peer.key
                )))
            }
        };

        let authority = rest.split('/').next().unwrap_or(rest);
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        };

        let tls_domain = tls.then(|| peer.host_override.clone().unwrap_or_else(|| host.to_string()));
        let host = if options.as_localhost { "localhost" } else { host };
        let scheme = if tls { "https" } else { "http" };
        let uri = match port {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        };

        Ok(Self { uri, tls_domain })
    }
}

async fn trusted_roots(peer: &PeerEntry) -> Result<Vec<String>, LedgerError> {
    let mut roots = peer.trusted_roots.clone();
    for path in &peer.trusted_root_paths {
        let pem = tokio::fs::read_to_string(path).await.map_err(|e| {
            LedgerError::Connection(format!("TLS root {} for {}: {}", path.display(), peer.key, e))
        })?;
        roots.push(pem);
    }
    Ok(roots)
}

fn status_error(transaction: &str, status: Status) -> LedgerError {
    match status.code() {
        Code::Unavailable => LedgerError::Connection(status.message().to_string()),
        _ => LedgerError::Transaction {
            transaction: transaction.to_string(),
            message: status.message().to_string(),
        },
    }
}

async fn call<T>(
    transaction: &str,
    timeout: Duration,
    request: impl Future<Output = Result<T, Status>>,
) -> Result<T, LedgerError> {
    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result.map_err(|status| status_error(transaction, status)),
        Err(_) => Err(LedgerError::Connection(format!(
            "{} timed out after {}s",
            transaction,
            timeout.as_secs()
        ))),
    }
}

struct GatewayConnection {
    identity: String,
    peer: String,
    channel: Channel,
    signer: Arc<ProposalSigner>,
    closed: Arc<AtomicBool>,
    streams: Arc<Mutex<Vec<AbortHandle>>>,
    request_timeout: Duration,
    commit_timeout: Duration,
}

#[async_trait]
impl LedgerConnection for GatewayConnection {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn contract(&self, channel: &str, name: &str) -> Result<Arc<dyn Contract>, LedgerError> {
        if self.is_closed() {
            return Err(LedgerError::Closed);
        }
        Ok(Arc::new(GatewayContract {
            client: GatewayClient::new(self.channel.clone()),
            signer: self.signer.clone(),
            channel: channel.to_string(),
            name: name.to_string(),
            closed: self.closed.clone(),
            streams: self.streams.clone(),
            request_timeout: self.request_timeout,
            commit_timeout: self.commit_timeout,
        }))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let streams = std::mem::take(&mut *self.streams.lock().unwrap_or_else(PoisonError::into_inner));
        for stream in &streams {
            stream.abort();
        }
        debug!(identity = %self.identity, peer = %self.peer, streams = streams.len(), "Closed peer gateway connection");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct GatewayContract {
    client: GatewayClient<Channel>,
    signer: Arc<ProposalSigner>,
    channel: String,
    name: String,
    closed: Arc<AtomicBool>,
    streams: Arc<Mutex<Vec<AbortHandle>>>,
    request_timeout: Duration,
    commit_timeout: Duration,
}

impl GatewayContract {
    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(LedgerError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Contract for GatewayContract {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, transaction: &str, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        self.ensure_open()?;
        let signed = self.signer.proposal(&self.channel, &self.name, transaction, args)?;
        let tx_id = signed.transaction_id.clone();
        let mut client = self.client.clone();

        let endorsed = call(
            transaction,
            self.request_timeout,
            client.endorse(EndorseRequest {
                transaction_id: tx_id.clone(),
                channel_id: self.channel.clone(),
                proposed_transaction: Some(signed.proposal),
                endorsing_organizations: Vec::new(),
            }),
        )
        .await?;
        let mut prepared = endorsed.prepared_transaction.ok_or_else(|| {
            LedgerError::Connection(format!("endorsement of {} returned no transaction", transaction))
        })?;
        let result = endorsed_result(&prepared)?;

        self.signer.sign_envelope(&mut prepared);
        call(
            transaction,
            self.request_timeout,
            client.submit(SubmitRequest {
                transaction_id: tx_id.clone(),
                channel_id: self.channel.clone(),
                prepared_transaction: Some(prepared),
            }),
        )
        .await?;

        let status = call(
            transaction,
            self.commit_timeout,
            client.commit_status(self.signer.commit_status_request(&self.channel, &tx_id)),
        )
        .await?;
        if status.result != TX_VALID {
            return Err(LedgerError::Transaction {
                transaction: transaction.to_string(),
                message: format!(
                    "transaction {} failed to commit with status code {}",
                    tx_id, status.result
                ),
            });
        }

        debug!(tx_id = %tx_id, transaction = %transaction, block = status.block_number, "Committed transaction");
        Ok(result)
    }

    async fn evaluate(&self, transaction: &str, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        self.ensure_open()?;
        let signed = self.signer.proposal(&self.channel, &self.name, transaction, args)?;
        let mut client = self.client.clone();

        let response = call(
            transaction,
            self.request_timeout,
            client.evaluate(EvaluateRequest {
                transaction_id: signed.transaction_id,
                channel_id: self.channel.clone(),
                proposed_transaction: Some(signed.proposal),
                target_organizations: Vec::new(),
            }),
        )
        .await?;

        Ok(response.result.map(|r| r.payload).unwrap_or_default())
    }

    async fn events(&self) -> Result<EventStream, LedgerError> {
        self.ensure_open()?;
        let request = self.signer.events_request(&self.channel, &self.name);
        let mut client = self.client.clone();
        let mut stream = call("ChaincodeEvents", self.request_timeout, client.chaincode_events(request))
            .await
            .map_err(|e| LedgerError::Subscription(e.to_string()))?;

        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        let chaincode = self.name.clone();
        let task = tokio::spawn(async move {
            loop {
                match stream.message().await {
                    Ok(Some(response)) => {
                        for event in response.events {
                            let event = ContractEvent {
                                chaincode: chaincode.clone(),
                                event_name: event.event_name,
                                payload: event.payload,
                                transaction_id: event.tx_id,
                            };
                            if sender.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(chaincode = %chaincode, "Chaincode event stream ended");
                        return;
                    }
                    Err(status) => {
                        warn!(chaincode = %chaincode, error = %status.message(), "Chaincode event stream failed");
                        return;
                    }
                }
            }
        });

        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task.abort_handle());
        if self.closed.load(Ordering::SeqCst) {
            task.abort();
        }
        Ok(receiver)
    }
}
