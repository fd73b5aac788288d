//! Session Manager Tests
//!
//! Every session must be released on every path, and nothing may connect
//! before the identity, descriptor and wallet entry are all in place.

mod common;

use common::{user_identity, Network, CHAINCODE, CHANNEL};
use kopi_core::Organization;
use kopi_fabric::{LedgerError, MemoryLedger};
use kopi_gateway::{CredentialStore, MemoryStore, SessionError, SessionManager};
use std::sync::Arc;

fn create_args(id: &str) -> Vec<String> {
    [id, "Pak Budi", "-7.250, 110.400", "Temanggung", "Arabika", "5000000"]
        .into_iter()
        .map(String::from)
        .collect()
}

// =============================================================================
// Preconditions
// =============================================================================

#[tokio::test]
async fn test_unknown_identity_never_connects() {
    let network = Network::new();
    let sessions = network.sessions();

    let err = sessions.open("admin-petani").await.unwrap_err();
    assert!(matches!(err, SessionError::UnrecognizedIdentity(ref n) if n == "admin-petani"));

    let err = sessions.open("EveUser").await.unwrap_err();
    assert!(matches!(err, SessionError::UnrecognizedIdentity(_)));

    assert_eq!(network.ledger.connections_opened(), 0);
}

#[tokio::test]
async fn test_unprovisioned_identity_never_connects() {
    let store = Arc::new(MemoryStore::with_identities([user_identity(Organization::Farmer)]));
    let network = Network::with_store(store);
    let sessions = network.sessions();

    let err = sessions.open("RegulatorUser").await.unwrap_err();
    assert!(matches!(err, SessionError::IdentityNotProvisioned(ref n) if n == "RegulatorUser"));
    assert!(err.to_string().contains("kopi-enroll"));
    assert_eq!(network.ledger.connections_opened(), 0);

    // The provisioned one still works
    sessions.open("PetaniUser").await.unwrap().close();
    assert_eq!(network.ledger.connections_opened(), 1);
}

#[tokio::test]
async fn test_missing_descriptor_never_connects() {
    let network = Network::new();
    network.profiles.remove(Organization::Importer);
    let sessions = network.sessions();

    let err = sessions.open("ImportirUser").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Descriptor(kopi_core::CoreError::DescriptorMissing(_))
    ));
    assert_eq!(network.ledger.connections_opened(), 0);
}

// =============================================================================
// Release on every path
// =============================================================================

#[tokio::test]
async fn test_submit_and_evaluate_each_use_their_own_session() {
    let network = Network::new();
    let sessions = network.sessions();

    sessions
        .submit("PetaniUser", "CreateBatch", &create_args("B1"))
        .await
        .unwrap();
    let batch = sessions
        .evaluate("LogistikUser", "ReadBatch", &["B1".to_string()])
        .await
        .unwrap();

    let batch: serde_json::Value = serde_json::from_slice(&batch).unwrap();
    assert_eq!(batch["BatchID"], "B1");
    assert_eq!(batch["NilaiKontrak"], 5000000.0);

    assert_eq!(network.ledger.connections_opened(), 2);
    assert_eq!(network.ledger.open_connections(), 0);
}

#[tokio::test]
async fn test_failed_transactions_still_release_the_session() {
    let network = Network::new();
    let sessions = network.sessions();

    // Wrong organization for the step
    let err = sessions
        .submit("ImportirUser", "CreateBatch", &create_args("B1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Ledger(LedgerError::Transaction { .. })));

    // Missing batch
    let err = sessions
        .evaluate("PetaniUser", "ReadBatch", &["NOPE".to_string()])
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(network.ledger.connections_opened(), 2);
    assert_eq!(network.ledger.open_connections(), 0);
}

#[tokio::test]
async fn test_missing_contract_releases_the_connection() {
    let network = Network::new();
    let store: Arc<dyn CredentialStore> = network.store.clone();
    let ledger = MemoryLedger::new([CHANNEL]);
    let sessions = SessionManager::new(network.profiles.resolver(), store, Arc::new(ledger.clone()))
        .with_target(CHANNEL, CHAINCODE);

    let err = sessions.open("PetaniUser").await.unwrap_err();
    assert!(matches!(err, SessionError::Ledger(LedgerError::ContractNotFound(_))));
    assert_eq!(ledger.connections_opened(), 1);
    assert_eq!(ledger.open_connections(), 0);
}

#[tokio::test]
async fn test_dropping_a_session_releases_it() {
    let network = Network::new();
    let sessions = network.sessions();

    {
        let session = sessions.open("KoperasiUser").await.unwrap();
        assert_eq!(session.identity(), "KoperasiUser");
        assert_eq!(network.ledger.open_connections(), 1);
    }
    assert_eq!(network.ledger.open_connections(), 0);
}

// =============================================================================
// Isolation
// =============================================================================

#[tokio::test]
async fn test_concurrent_sessions_for_one_identity_are_independent() {
    let network = Network::new();
    let sessions = Arc::new(network.sessions());

    let first = sessions.open("PetaniUser").await.unwrap();
    let second = sessions.open("PetaniUser").await.unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(network.ledger.open_connections(), 2);

    // Closing one leaves the other usable
    first.close();
    second
        .submit("CreateBatch", &create_args("B7"))
        .await
        .unwrap();
    assert_eq!(network.ledger.open_connections(), 0);

    let mut handles = Vec::new();
    for i in 0..8 {
        let sessions = sessions.clone();
        handles.push(tokio::spawn(async move {
            sessions
                .submit("PetaniUser", "CreateBatch", &create_args(&format!("C{}", i)))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = sessions
        .evaluate("PetaniUser", "GetAllBatches", &[])
        .await
        .unwrap();
    let all: Vec<serde_json::Value> = serde_json::from_slice(&all).unwrap();
    assert_eq!(all.len(), 9);
    assert_eq!(network.ledger.open_connections(), 0);
}

#[tokio::test]
async fn test_sessions_act_as_their_own_organization() {
    let network = Network::new();
    let sessions = network.sessions();

    sessions
        .submit("PetaniUser", "CreateBatch", &create_args("B1"))
        .await
        .unwrap();

    // Only the logistics identity may move the batch
    let args = vec![
        "B1".to_string(),
        "Joko".to_string(),
        "B 1234 CD".to_string(),
        "22".to_string(),
        "-6.200, 106.816".to_string(),
    ];
    assert!(sessions
        .submit("KoperasiUser", "TransportToWarehouse", &args)
        .await
        .is_err());
    sessions
        .submit("LogistikUser", "TransportToWarehouse", &args)
        .await
        .unwrap();
    assert_eq!(network.ledger.open_connections(), 0);
}
