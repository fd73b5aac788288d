//! Kopi Gateway
//!
//! HTTP gateway in front of the Kopi coffee supply-chain ledger. It:
//! - Provisions one administrator and one application identity per
//!   organization into a wallet (`kopi-enroll`)
//! - Maps each REST route to a contract transaction submitted or evaluated
//!   as the organization that owns that step
//! - Listens for `BankTransfer` contract events and settles them with an
//!   external banking system
//!
//! ## API Endpoints
//!
//! ### Transactions
//! - `POST /api/create` - Record a harvest (farmer)
//! - `POST /api/transport-lokal` - Start local transport (logistics)
//! - `POST /api/receive-warehouse` - Receive at warehouse (cooperative)
//! - `POST /api/process-qc` - Processing and quality control (cooperative)
//! - `POST /api/approve-export` - Export decision (regulator)
//! - `POST /api/start-shipment` - Start export shipment (logistics)
//! - `POST /api/confirm-import` - Confirm import (importer)
//! - `POST /api/add-checkpoint` - Add a transport checkpoint (logistics)
//! - `POST /api/init-wallet` - Seed the digital wallets (importer)
//!
//! ### Queries
//! - `GET /api/wallet/{msp_id}` - Wallet balance
//! - `GET /api/all-batches` - Every batch
//! - `GET /api/batch/{id}` - One batch
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness with wallet size and listener state

pub mod api;
pub mod config;
pub mod descriptors;
pub mod enrollment;
pub mod listener;
pub mod session;
pub mod storage;

pub use api::create_router;
pub use api::handlers::AppState;
pub use config::{ConfigError, GatewayConfig};
pub use descriptors::DescriptorLoader;
pub use enrollment::{EnrollError, Enroller, OrgOutcome, ProvisioningReport, StepOutcome};
pub use listener::{
    BankTransfer, EventListener, ListenerState, SettlementGateway, SimulatedBank,
};
pub use session::{Session, SessionError, SessionManager};
pub use storage::{CredentialStore, FileSystemStore, MemoryStore, StorageError};
