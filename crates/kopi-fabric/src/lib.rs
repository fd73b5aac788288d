//! Ledger platform boundary
//!
//! Everything the gateway needs from the outside world lives behind the
//! traits in this crate:
//!
//! - **Certificate authority** ([`ca`]): enroll and register identities.
//!   [`ca::FabricCaClient`] talks to the CA's REST API over HTTPS.
//! - **Ledger** ([`ledger`]): connect as an identity, resolve a channel and
//!   contract, submit/evaluate transactions and receive contract events.
//!   [`ledger::PeerGateway`] drives a peer's Gateway gRPC service;
//!   [`ledger::MemoryLedger`] is an in-process implementation that runs
//!   registered chaincode against a local world state.
//!
//! ## Usage
//!
//! ```ignore
//! use kopi_fabric::ca::{CertificateAuthority, FabricCaClient};
//!
//! let ca = FabricCaClient::from_entry(&descriptor.first_authority()?)?;
//! let enrollment = ca.enroll("admin", "adminpw").await?;
//! ```

pub mod ca;
pub mod error;
pub mod ledger;

pub use ca::{
    AuthContext, AuthorityFactory, CertificateAuthority, Enrollment, FabricCaClient,
    FabricCaFactory, KeyMaterial, RegistrationRequest,
};
pub use error::{CaError, LedgerError, ALREADY_REGISTERED_CODE};
pub use ledger::{
    Chaincode, ConnectOptions, Contract, ContractEvent, EventStream, LedgerConnection,
    LedgerConnector, MemoryLedger, PeerGateway, TxContext,
};
