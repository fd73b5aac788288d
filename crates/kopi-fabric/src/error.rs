//! Error types for the ledger platform boundary

use thiserror::Error;

/// Error code the certificate authority returns for a duplicate registration
pub const ALREADY_REGISTERED_CODE: i64 = 74;

/// Errors returned by a certificate authority
#[derive(Error, Debug)]
pub enum CaError {
    /// The enrollment ID is already registered (CA error code 74)
    #[error("Identity '{0}' is already registered")]
    AlreadyRegistered(String),

    /// The CA answered with an error
    #[error("Certificate authority rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// The CA answered with something we could not understand
    #[error("Invalid response from certificate authority: {0}")]
    InvalidResponse(String),

    /// Key generation, CSR or signing failure
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Client could not be configured from the descriptor
    #[error("Invalid certificate authority configuration: {0}")]
    Config(String),
}

impl CaError {
    /// Whether this is the recoverable duplicate-registration conflict
    pub fn is_already_registered(&self) -> bool {
        matches!(self, CaError::AlreadyRegistered(_))
    }
}

impl From<reqwest::Error> for CaError {
    fn from(err: reqwest::Error) -> Self {
        CaError::Http(err.to_string())
    }
}

impl From<rcgen::Error> for CaError {
    fn from(err: rcgen::Error) -> Self {
        CaError::Crypto(err.to_string())
    }
}

/// Errors returned by the ledger connection boundary
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Could not open a connection for the identity
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Channel is not known to the network
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Contract is not deployed on the channel
    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    /// The contract rejected or failed the transaction
    #[error("Transaction {transaction} failed: {message}")]
    Transaction { transaction: String, message: String },

    /// Event subscription could not be established
    #[error("Event subscription failed: {0}")]
    Subscription(String),

    /// The connection was already released
    #[error("Connection closed")]
    Closed,
}

impl LedgerError {
    /// Whether the contract reported a missing entity
    ///
    /// The contract only signals this through its message text, in either
    /// the network's working language or English.
    pub fn is_not_found(&self) -> bool {
        match self {
            LedgerError::Transaction { message, .. } => {
                let message = message.to_lowercase();
                message.contains("tidak ditemukan") || message.contains("not found")
            }
            _ => false,
        }
    }
}
