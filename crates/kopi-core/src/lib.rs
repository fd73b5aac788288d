//! # Kopi Core
//!
//! Shared types for the Kopi supply-chain ledger gateway.
//!
//! ## Key Concepts
//!
//! - **Identity**: a named X.509 certificate and private key bound to one
//!   organization's membership service provider (MSP)
//! - **Organization**: the closed set of five supply-chain participants
//! - **Connection descriptor**: how to reach an organization's peers and
//!   certificate authority, upgraded to secure transport before use
//!
//! ## Organizations
//!
//! | Organization | MSP id | Application user |
//! |---|---|---|
//! | Farmer | `PetaniMSP` | `PetaniUser` |
//! | Logistics | `LogistikMSP` | `LogistikUser` |
//! | Cooperative | `KoperasiMSP` | `KoperasiUser` |
//! | Regulator | `RegulatorMSP` | `RegulatorUser` |
//! | Importer | `ImportirMSP` | `ImportirUser` |

pub mod descriptor;
pub mod error;
pub mod identity;
pub mod organization;

pub use descriptor::{AuthorityEntry, ConnectionDescriptor, PeerEntry};
pub use error::{CoreError, Result};
pub use identity::{Credentials, Identity, IdentityKind};
pub use organization::{OrgProfile, Organization, OrganizationResolver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
