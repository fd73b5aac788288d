//! Identity provisioning
//!
//! For each of the five organizations, in order:
//!
//! 1. Load the organization's connection descriptor and pick its first
//!    certificate authority
//! 2. Enroll the bootstrap administrator as `admin-<org>` unless the wallet
//!    already holds it
//! 3. Register and enroll the application user (e.g. `PetaniUser`) using
//!    the administrator as registrar, unless the wallet already holds it
//!
//! Organizations are independent: a failure is recorded in the
//! [`ProvisioningReport`] and the run moves on to the next one. Re-running
//! against a populated wallet makes no CA calls.

use kopi_core::{CoreError, Identity, Organization, OrganizationResolver};
use kopi_fabric::{AuthorityFactory, CaError, CertificateAuthority, Enrollment, RegistrationRequest};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::descriptors::DescriptorLoader;
use crate::storage::{CredentialStore, StorageError};

/// Enrollment ID of the CA bootstrap administrator
pub const BOOTSTRAP_ADMIN_ID: &str = "admin";

/// Secret of the CA bootstrap administrator on development networks
pub const BOOTSTRAP_ADMIN_SECRET: &str = "adminpw";

#[derive(Debug, Error)]
pub enum EnrollError {
    #[error(transparent)]
    Descriptor(#[from] CoreError),

    #[error("Certificate authority error: {0}")]
    Authority(#[from] CaError),

    #[error("Credential store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Administrator {0} is not in the wallet")]
    AdminMissing(String),

    #[error("Enrollment of {0} returned no certificate")]
    MissingCertificate(String),
}

/// What happened to one identity during provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Already in the wallet; the CA was not contacted
    Existing,
    /// Enrolled with known credentials
    Enrolled,
    /// Registered then enrolled with the issued secret
    Registered,
    /// Already registered at the CA; re-enrolled with the fallback secret
    ReEnrolled,
}

/// Result of provisioning one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrgOutcome {
    Provisioned { admin: StepOutcome, user: StepOutcome },
    /// Connection descriptor absent; nothing was attempted
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgReport {
    pub organization: &'static str,
    pub msp_id: &'static str,
    #[serde(flatten)]
    pub outcome: OrgOutcome,
}

/// Per-organization results of a provisioning run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisioningReport {
    pub organizations: Vec<OrgReport>,
}

impl ProvisioningReport {
    pub fn provisioned(&self) -> usize {
        self.organizations
            .iter()
            .filter(|r| matches!(r.outcome, OrgOutcome::Provisioned { .. }))
            .count()
    }

    pub fn all_provisioned(&self) -> bool {
        self.provisioned() == self.organizations.len()
    }

    pub fn outcome(&self, organization: Organization) -> Option<&OrgOutcome> {
        self.organizations
            .iter()
            .find(|r| r.organization == organization.name())
            .map(|r| &r.outcome)
    }
}

/// Provisions administrator and application identities into a wallet
pub struct Enroller {
    store: Arc<dyn CredentialStore>,
    resolver: OrganizationResolver,
    authorities: Arc<dyn AuthorityFactory>,
    descriptors: DescriptorLoader,
}

impl Enroller {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        resolver: OrganizationResolver,
        authorities: Arc<dyn AuthorityFactory>,
    ) -> Self {
        Self {
            store,
            resolver,
            authorities,
            descriptors: DescriptorLoader::default(),
        }
    }

    /// Provision every organization, isolating failures per organization
    pub async fn provision_all(&self) -> ProvisioningReport {
        let mut report = ProvisioningReport::default();

        for organization in Organization::ALL {
            let outcome = match self.provision(organization).await {
                Ok((admin, user)) => {
                    info!(organization = %organization, ?admin, ?user, "Organization ready");
                    OrgOutcome::Provisioned { admin, user }
                }
                Err(EnrollError::Descriptor(CoreError::DescriptorMissing(path))) => {
                    error!(
                        organization = %organization,
                        path = %path.display(),
                        "Connection descriptor not found, skipping organization"
                    );
                    OrgOutcome::Skipped {
                        reason: format!("connection descriptor not found at {}", path.display()),
                    }
                }
                Err(e) => {
                    error!(organization = %organization, error = %e, "Provisioning failed");
                    OrgOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            report.organizations.push(OrgReport {
                organization: organization.name(),
                msp_id: organization.msp_id(),
                outcome,
            });
        }

        report
    }

    /// Provision one organization's administrator and application user
    pub async fn provision(
        &self,
        organization: Organization,
    ) -> Result<(StepOutcome, StepOutcome), EnrollError> {
        let profile = self.resolver.profile(organization);
        let descriptor = self.descriptors.load(&profile.descriptor_path).await?;
        let entry = descriptor.first_authority()?;

        info!(organization = %organization, ca = %entry.url, "Provisioning organization");
        let ca = self.authorities.connect(organization, &entry)?;

        let admin = self.ensure_admin(organization, ca.as_ref()).await?;
        let user = self.ensure_user(organization, ca.as_ref()).await?;
        Ok((admin, user))
    }

    async fn ensure_admin(
        &self,
        organization: Organization,
        ca: &dyn CertificateAuthority,
    ) -> Result<StepOutcome, EnrollError> {
        let admin_name = organization.admin_identity();
        if self.store.get(&admin_name).await?.is_some() {
            info!(identity = %admin_name, "Administrator already in wallet");
            return Ok(StepOutcome::Existing);
        }

        let enrollment = ca.enroll(BOOTSTRAP_ADMIN_ID, BOOTSTRAP_ADMIN_SECRET).await?;
        self.store_enrollment(&admin_name, organization, enrollment).await?;
        Ok(StepOutcome::Enrolled)
    }

    async fn ensure_user(
        &self,
        organization: Organization,
        ca: &dyn CertificateAuthority,
    ) -> Result<StepOutcome, EnrollError> {
        let user_name = organization.user_identity();
        if self.store.get(user_name).await?.is_some() {
            info!(identity = %user_name, "Application user already in wallet");
            return Ok(StepOutcome::Existing);
        }

        let admin_name = organization.admin_identity();
        let admin = self
            .store
            .get(&admin_name)
            .await?
            .ok_or_else(|| EnrollError::AdminMissing(admin_name.clone()))?;
        let registrar = self.store.auth_context(&admin).await?;

        let request = RegistrationRequest::client(user_name);
        let (enrollment, outcome) = match ca.register(&request, &registrar).await {
            Ok(secret) => (ca.enroll(user_name, &secret).await?, StepOutcome::Registered),
            Err(e) if e.is_already_registered() => {
                // Development networks register users with their name as secret
                warn!(
                    identity = %user_name,
                    "Already registered at the CA, re-enrolling with fallback secret"
                );
                (ca.enroll(user_name, user_name).await?, StepOutcome::ReEnrolled)
            }
            Err(e) => return Err(e.into()),
        };

        self.store_enrollment(user_name, organization, enrollment).await?;
        Ok(outcome)
    }

    async fn store_enrollment(
        &self,
        name: &str,
        organization: Organization,
        enrollment: Enrollment,
    ) -> Result<(), EnrollError> {
        if !enrollment.has_certificate() {
            return Err(EnrollError::MissingCertificate(name.to_string()));
        }
        let identity = Identity::new(
            name,
            organization.msp_id(),
            enrollment.certificate,
            enrollment.private_key,
        );
        self.store.put(&identity).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let report = ProvisioningReport {
            organizations: vec![
                OrgReport {
                    organization: "petani",
                    msp_id: "PetaniMSP",
                    outcome: OrgOutcome::Provisioned {
                        admin: StepOutcome::Enrolled,
                        user: StepOutcome::Registered,
                    },
                },
                OrgReport {
                    organization: "logistik",
                    msp_id: "LogistikMSP",
                    outcome: OrgOutcome::Skipped {
                        reason: "missing".into(),
                    },
                },
            ],
        };

        assert_eq!(report.provisioned(), 1);
        assert!(!report.all_provisioned());
        assert!(matches!(
            report.outcome(Organization::Logistics),
            Some(OrgOutcome::Skipped { .. })
        ));
        assert!(report.outcome(Organization::Importer).is_none());
    }

    #[test]
    fn test_report_serialization() {
        let report = OrgReport {
            organization: "petani",
            msp_id: "PetaniMSP",
            outcome: OrgOutcome::Provisioned {
                admin: StepOutcome::Existing,
                user: StepOutcome::ReEnrolled,
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "provisioned");
        assert_eq!(json["user"], "re_enrolled");
        assert_eq!(json["msp_id"], "PetaniMSP");
    }
}
