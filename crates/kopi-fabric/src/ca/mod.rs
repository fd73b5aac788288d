//! Certificate authority boundary
//!
//! Enrollment exchanges an enrollment ID and secret for a signed
//! certificate; registration claims a new enrollment ID on behalf of an
//! already-enrolled registrar and returns its one-time secret.

pub mod auth;
pub mod client;
pub mod keys;

pub use auth::AuthContext;
pub use client::FabricCaClient;
pub use keys::KeyMaterial;

use async_trait::async_trait;
use kopi_core::{AuthorityEntry, Organization};
use std::sync::Arc;

use crate::error::CaError;

/// Result of a successful enrollment
#[derive(Clone, PartialEq, Eq)]
pub struct Enrollment {
    /// PEM certificate issued by the CA (may be empty if the CA sent none)
    pub certificate: String,
    /// PEM (PKCS#8) private key generated for the request
    pub private_key: String,
}

impl Enrollment {
    pub fn has_certificate(&self) -> bool {
        !self.certificate.trim().is_empty()
    }
}

impl std::fmt::Debug for Enrollment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enrollment")
            .field("has_certificate", &self.has_certificate())
            .field("private_key", &"[redacted]")
            .finish()
    }
}

/// Request to register a new enrollment ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub enrollment_id: String,
    pub role: String,
    pub affiliation: String,
    /// `None` leaves the CA's default in place
    pub max_enrollments: Option<i32>,
}

impl RegistrationRequest {
    /// Register an application client
    pub fn client(enrollment_id: impl Into<String>) -> Self {
        Self {
            enrollment_id: enrollment_id.into(),
            role: "client".into(),
            affiliation: String::new(),
            max_enrollments: None,
        }
    }
}

/// A certificate authority
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Enroll an identity, returning its certificate and freshly generated key
    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment, CaError>;

    /// Register a new enrollment ID authorized by `registrar`
    ///
    /// Returns the one-time enrollment secret. Fails with
    /// [`CaError::AlreadyRegistered`] if the ID already exists.
    async fn register(
        &self,
        request: &RegistrationRequest,
        registrar: &AuthContext,
    ) -> Result<String, CaError>;

    /// Description for logging
    fn description(&self) -> &str {
        "certificate authority"
    }
}

/// Builds a CA client for an organization's descriptor entry
pub trait AuthorityFactory: Send + Sync {
    fn connect(
        &self,
        organization: Organization,
        entry: &AuthorityEntry,
    ) -> Result<Arc<dyn CertificateAuthority>, CaError>;
}

/// Factory producing [`FabricCaClient`]s in development trust mode
#[derive(Debug, Clone, Default)]
pub struct FabricCaFactory;

impl AuthorityFactory for FabricCaFactory {
    fn connect(
        &self,
        _organization: Organization,
        entry: &AuthorityEntry,
    ) -> Result<Arc<dyn CertificateAuthority>, CaError> {
        Ok(Arc::new(FabricCaClient::from_entry(entry)?))
    }
}
