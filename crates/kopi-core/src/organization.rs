//! Organization resolution
//!
//! Maps application identity names to the organization they act for. The
//! mapping is a closed enum: supporting a sixth organization means adding a
//! variant here, not registering one at runtime.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// The five supply-chain organizations on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Organization {
    Farmer,
    Logistics,
    Cooperative,
    Regulator,
    Importer,
}

impl Organization {
    /// Every organization, in provisioning order
    pub const ALL: [Organization; 5] = [
        Organization::Farmer,
        Organization::Logistics,
        Organization::Cooperative,
        Organization::Regulator,
        Organization::Importer,
    ];

    /// Lowercase organization name used in file names and admin identities
    pub fn name(self) -> &'static str {
        match self {
            Organization::Farmer => "petani",
            Organization::Logistics => "logistik",
            Organization::Cooperative => "koperasi",
            Organization::Regulator => "regulator",
            Organization::Importer => "importir",
        }
    }

    /// Display name as it appears in the network configuration
    pub fn display_name(self) -> &'static str {
        match self {
            Organization::Farmer => "Petani",
            Organization::Logistics => "Logistik",
            Organization::Cooperative => "Koperasi",
            Organization::Regulator => "Regulator",
            Organization::Importer => "Importir",
        }
    }

    /// Membership service provider id
    pub fn msp_id(self) -> &'static str {
        match self {
            Organization::Farmer => "PetaniMSP",
            Organization::Logistics => "LogistikMSP",
            Organization::Cooperative => "KoperasiMSP",
            Organization::Regulator => "RegulatorMSP",
            Organization::Importer => "ImportirMSP",
        }
    }

    /// Application user identity name
    pub fn user_identity(self) -> &'static str {
        match self {
            Organization::Farmer => "PetaniUser",
            Organization::Logistics => "LogistikUser",
            Organization::Cooperative => "KoperasiUser",
            Organization::Regulator => "RegulatorUser",
            Organization::Importer => "ImportirUser",
        }
    }

    /// Admin identity name (`admin-<org>`)
    pub fn admin_identity(self) -> String {
        format!("admin-{}", self.name())
    }

    /// File name of this organization's connection descriptor
    pub fn descriptor_file_name(self) -> String {
        format!("connection-profile-{}.json", self.name())
    }

    /// Look up the organization an application user acts for
    pub fn from_user_identity(identity_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|org| org.user_identity() == identity_name)
    }
}

impl std::fmt::Display for Organization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Organization profile resolved for an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgProfile {
    pub organization: Organization,
    pub msp_id: &'static str,
    pub descriptor_path: PathBuf,
}

impl OrgProfile {
    pub fn org_name(&self) -> &'static str {
        self.organization.name()
    }
}

/// Resolves identity names to organization profiles
///
/// Profiles are recomputed on every lookup; nothing is cached or persisted.
#[derive(Debug, Clone)]
pub struct OrganizationResolver {
    profiles_dir: PathBuf,
}

impl OrganizationResolver {
    /// Create a resolver that looks for descriptors under `profiles_dir`
    pub fn new(profiles_dir: impl Into<PathBuf>) -> Self {
        Self {
            profiles_dir: profiles_dir.into(),
        }
    }

    pub fn profiles_dir(&self) -> &Path {
        &self.profiles_dir
    }

    /// Profile for a known organization
    pub fn profile(&self, organization: Organization) -> OrgProfile {
        OrgProfile {
            organization,
            msp_id: organization.msp_id(),
            descriptor_path: self.profiles_dir.join(organization.descriptor_file_name()),
        }
    }

    /// Resolve an application identity name
    ///
    /// Fails with [`CoreError::UnrecognizedIdentity`] for anything other
    /// than the five application users.
    pub fn resolve(&self, identity_name: &str) -> Result<OrgProfile> {
        let organization = Organization::from_user_identity(identity_name)
            .ok_or_else(|| CoreError::UnrecognizedIdentity(identity_name.to_string()))?;
        Ok(self.profile(organization))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_users() {
        let resolver = OrganizationResolver::new("/profiles");

        let profile = resolver.resolve("KoperasiUser").unwrap();
        assert_eq!(profile.organization, Organization::Cooperative);
        assert_eq!(profile.msp_id, "KoperasiMSP");
        assert_eq!(
            profile.descriptor_path,
            PathBuf::from("/profiles/connection-profile-koperasi.json")
        );

        let profile = resolver.resolve("ImportirUser").unwrap();
        assert_eq!(profile.org_name(), "importir");
        assert_eq!(profile.msp_id, "ImportirMSP");
    }

    #[test]
    fn test_resolve_rejects_admin_and_unknown_names() {
        let resolver = OrganizationResolver::new("/profiles");

        for name in ["admin-petani", "petaniuser", "", "BankUser"] {
            match resolver.resolve(name) {
                Err(CoreError::UnrecognizedIdentity(n)) => assert_eq!(n, name),
                other => panic!("expected UnrecognizedIdentity for {name:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_identity_names_are_unique() {
        let mut users: Vec<_> = Organization::ALL.iter().map(|o| o.user_identity()).collect();
        let mut msps: Vec<_> = Organization::ALL.iter().map(|o| o.msp_id()).collect();
        users.sort();
        users.dedup();
        msps.sort();
        msps.dedup();
        assert_eq!(users.len(), 5);
        assert_eq!(msps.len(), 5);
    }

    #[test]
    fn test_admin_identity_names() {
        assert_eq!(Organization::Farmer.admin_identity(), "admin-petani");
        assert_eq!(Organization::Importer.admin_identity(), "admin-importir");
    }
}
