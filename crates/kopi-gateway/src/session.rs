//! Identity-scoped ledger sessions
//!
//! A [`Session`] is one open connection to the network acting as one
//! application identity, bound to the configured channel and contract.
//! Sessions are never shared between requests. The connection is released
//! when the session is dropped, on success and failure paths alike.

use chrono::{DateTime, Utc};
use kopi_core::{CoreError, OrganizationResolver};
use kopi_fabric::{ConnectOptions, Contract, LedgerConnection, LedgerConnector, LedgerError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{DEFAULT_CHAINCODE, DEFAULT_CHANNEL};
use crate::descriptors::DescriptorLoader;
use crate::storage::{CredentialStore, StorageError};

/// Errors raised while opening or using a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unrecognized identity: {0}")]
    UnrecognizedIdentity(String),

    #[error(transparent)]
    Descriptor(CoreError),

    #[error("Identity {0} has not been provisioned. Run kopi-enroll first")]
    IdentityNotProvisioned(String),

    #[error("Credential store error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<CoreError> for SessionError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnrecognizedIdentity(name) => SessionError::UnrecognizedIdentity(name),
            other => SessionError::Descriptor(other),
        }
    }
}

impl SessionError {
    /// Whether the contract reported that the requested record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::Ledger(err) if err.is_not_found())
    }
}

/// Opens identity-scoped sessions against one channel and contract
pub struct SessionManager {
    resolver: OrganizationResolver,
    descriptors: DescriptorLoader,
    store: Arc<dyn CredentialStore>,
    connector: Arc<dyn LedgerConnector>,
    channel: String,
    contract: String,
    options: ConnectOptions,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("profiles_dir", &self.resolver.profiles_dir())
            .field("connector", &self.connector.description())
            .field("channel", &self.channel)
            .field("contract", &self.contract)
            .finish()
    }
}

impl SessionManager {
    pub fn new(
        resolver: OrganizationResolver,
        store: Arc<dyn CredentialStore>,
        connector: Arc<dyn LedgerConnector>,
    ) -> Self {
        Self {
            resolver,
            descriptors: DescriptorLoader::default(),
            store,
            connector,
            channel: DEFAULT_CHANNEL.into(),
            contract: DEFAULT_CHAINCODE.into(),
            options: ConnectOptions::default(),
        }
    }

    /// Target a different channel and contract
    pub fn with_target(mut self, channel: impl Into<String>, contract: impl Into<String>) -> Self {
        self.channel = channel.into();
        self.contract = contract.into();
        self
    }

    pub fn with_descriptor_loader(mut self, descriptors: DescriptorLoader) -> Self {
        self.descriptors = descriptors;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn contract_name(&self) -> &str {
        &self.contract
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Open a session acting as `identity_name`
    ///
    /// Resolves the organization, checks its descriptor exists, loads the
    /// identity from the credential store, connects and resolves the
    /// contract. No connection is attempted unless the first three steps
    /// succeed.
    pub async fn open(&self, identity_name: &str) -> Result<Session, SessionError> {
        let profile = self.resolver.resolve(identity_name)?;
        let descriptor = self.descriptors.load(&profile.descriptor_path).await?;

        let identity = self
            .store
            .get(identity_name)
            .await?
            .ok_or_else(|| SessionError::IdentityNotProvisioned(identity_name.to_string()))?;

        let connection = self
            .connector
            .connect(&descriptor, &identity, self.options)
            .await?;

        let contract = match connection.contract(&self.channel, &self.contract).await {
            Ok(contract) => contract,
            Err(e) => {
                connection.close();
                return Err(e.into());
            }
        };

        let session = Session {
            id: Uuid::new_v4(),
            identity: identity_name.to_string(),
            opened_at: Utc::now(),
            connection,
            contract,
        };

        debug!(
            session_id = %session.id,
            identity = %identity_name,
            organization = %profile.organization,
            channel = %self.channel,
            "Opened ledger session"
        );
        Ok(session)
    }

    /// Submit one transaction in a fresh session
    pub async fn submit(
        &self,
        identity_name: &str,
        transaction: &str,
        args: &[String],
    ) -> Result<Vec<u8>, SessionError> {
        let session = self.open(identity_name).await?;
        Ok(session.submit(transaction, args).await?)
    }

    /// Evaluate one query in a fresh session
    pub async fn evaluate(
        &self,
        identity_name: &str,
        transaction: &str,
        args: &[String],
    ) -> Result<Vec<u8>, SessionError> {
        let session = self.open(identity_name).await?;
        Ok(session.evaluate(transaction, args).await?)
    }
}

/// An open connection acting as one identity
///
/// One-shot operations consume the session, so a session handles exactly
/// one submission or query. Long-lived holders (the event listener) use
/// [`Session::contract`] instead.
pub struct Session {
    id: Uuid,
    identity: String,
    opened_at: DateTime<Utc>,
    connection: Box<dyn LedgerConnection>,
    contract: Arc<dyn Contract>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("opened_at", &self.opened_at)
            .field("closed", &self.connection.is_closed())
            .finish()
    }
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn contract(&self) -> &Arc<dyn Contract> {
        &self.contract
    }

    /// Submit a state-changing transaction, then release the session
    pub async fn submit(self, transaction: &str, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        info!(
            session_id = %self.id,
            identity = %self.identity,
            transaction = %transaction,
            "Submitting transaction"
        );
        self.contract.submit(transaction, args).await
    }

    /// Evaluate a read-only query, then release the session
    pub async fn evaluate(self, transaction: &str, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        debug!(
            session_id = %self.id,
            identity = %self.identity,
            transaction = %transaction,
            "Evaluating transaction"
        );
        self.contract.evaluate(transaction, args).await
    }

    /// Release the session explicitly
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.connection.is_closed() {
            return;
        }
        self.connection.close();
        let held_ms = (Utc::now() - self.opened_at).num_milliseconds();
        debug!(
            session_id = %self.id,
            identity = %self.identity,
            held_ms,
            "Released ledger session"
        );
    }
}
