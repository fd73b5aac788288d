//! Property-Based Tests for resolution and descriptor hardening
//!
//! 1. The identity → organization mapping is closed: only the five
//!    application users resolve, everything else is rejected
//! 2. Descriptor upgrade never leaves a plaintext endpoint behind

use kopi_core::descriptor::upgrade_to_secure;
use kopi_core::{ConnectionDescriptor, CoreError, Organization, OrganizationResolver};
use proptest::prelude::*;

const KNOWN_USERS: [&str; 5] = [
    "PetaniUser",
    "LogistikUser",
    "KoperasiUser",
    "RegulatorUser",
    "ImportirUser",
];

proptest! {
    /// Any name outside the fixed table is rejected as unrecognized
    #[test]
    fn prop_unknown_names_are_rejected(name in "[A-Za-z0-9_-]{0,24}") {
        prop_assume!(!KNOWN_USERS.contains(&name.as_str()));

        let resolver = OrganizationResolver::new("/profiles");
        match resolver.resolve(&name) {
            Err(CoreError::UnrecognizedIdentity(rejected)) => prop_assert_eq!(rejected, name),
            other => prop_assert!(false, "expected rejection, got {:?}", other),
        }
    }

    /// The upgraded text contains no plaintext scheme and is idempotent
    #[test]
    fn prop_upgrade_removes_plain_scheme(
        parts in prop::collection::vec("[a-z:/.0-9 ]{0,12}", 0..8),
    ) {
        let raw = parts.join("http://");
        let once = upgrade_to_secure(&raw).into_owned();

        prop_assert!(!once.contains("http://"));
        prop_assert_eq!(upgrade_to_secure(&once).into_owned(), once.clone());
    }

    /// Every CA URL parsed from a descriptor is secure, whatever the host and port
    #[test]
    fn prop_parsed_authority_is_secure(host in "[a-z]{1,10}", port in 1024u16..65535) {
        let raw = format!(
            r#"{{"certificateAuthorities":{{"ca":{{"url":"http://{}:{}"}}}}}}"#,
            host, port
        );
        let ca = ConnectionDescriptor::parse(&raw).unwrap().first_authority().unwrap();
        prop_assert_eq!(ca.url, format!("https://{}:{}", host, port));
    }
}

#[test]
fn every_organization_round_trips_through_its_user_identity() {
    let resolver = OrganizationResolver::new("/profiles");

    for org in Organization::ALL {
        let profile = resolver.resolve(org.user_identity()).unwrap();
        assert_eq!(profile.organization, org);
        assert_eq!(profile.msp_id, org.msp_id());
        assert!(profile
            .descriptor_path
            .ends_with(format!("connection-profile-{}.json", org.name())));
    }
}
