//! Identity provisioning tool
//!
//! Enrolls each organization's administrator and application user into the
//! wallet. By default the wallet is wiped first (`KOPI_ENROLL_RESET=false`
//! keeps existing identities and only fills the gaps).

use kopi_core::OrganizationResolver;
use kopi_fabric::FabricCaFactory;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use kopi_gateway::{CredentialStore, Enroller, FileSystemStore, GatewayConfig, OrgOutcome};

#[tokio::main]
async fn main() {
    let config = GatewayConfig::from_env().expect("Invalid gateway configuration");

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let store = FileSystemStore::open(&config.wallet_path)
        .await
        .expect("Failed to open wallet");

    if config.reset_wallet_on_enroll {
        store.reset().await.expect("Failed to wipe wallet");
        info!(path = %config.wallet_path.display(), "Removed previous wallet contents");
    }

    let enroller = Enroller::new(
        Arc::new(store),
        OrganizationResolver::new(&config.profiles_dir),
        Arc::new(FabricCaFactory),
    );

    let report = enroller.provision_all().await;

    for org in &report.organizations {
        match &org.outcome {
            OrgOutcome::Provisioned { admin, user } => {
                info!(organization = org.organization, msp_id = org.msp_id, ?admin, ?user, "Ready")
            }
            OrgOutcome::Skipped { reason } => {
                warn!(organization = org.organization, reason = %reason, "Skipped")
            }
            OrgOutcome::Failed { reason } => {
                error!(organization = org.organization, reason = %reason, "Failed")
            }
        }
    }

    info!(
        provisioned = report.provisioned(),
        total = report.organizations.len(),
        "Provisioning finished"
    );

    if !report.all_provisioned() {
        std::process::exit(1);
    }
}
