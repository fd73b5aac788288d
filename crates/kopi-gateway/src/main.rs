//! Kopi Gateway Binary
//!
//! Serves the supply-chain REST API and runs the contract event listener.

use kopi_core::OrganizationResolver;
use kopi_fabric::PeerGateway;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use kopi_gateway::{
    create_router, AppState, CredentialStore, EventListener, FileSystemStore, GatewayConfig,
    DescriptorLoader, SessionManager, SimulatedBank,
};

#[tokio::main]
async fn main() {
    let config = GatewayConfig::from_env().expect("Invalid gateway configuration");

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    // Initialize storage
    let store: Arc<dyn CredentialStore> = Arc::new(
        FileSystemStore::open(&config.wallet_path)
            .await
            .expect("Failed to open wallet"),
    );

    let ledger = PeerGateway::new().with_commit_timeout(config.commit_timeout);

    let sessions = SessionManager::new(
        OrganizationResolver::new(&config.profiles_dir),
        store,
        Arc::new(ledger),
    )
    .with_target(&config.channel, &config.chaincode)
    .with_descriptor_loader(DescriptorLoader::new(config.descriptor_ttl));

    info!(
        port = config.port,
        wallet = %config.wallet_path.display(),
        profiles = %config.profiles_dir.display(),
        channel = %config.channel,
        chaincode = %config.chaincode,
        descriptor_ttl_secs = config.descriptor_ttl.as_secs(),
        "Starting Kopi gateway"
    );

    let listener = EventListener::start(
        &sessions,
        &config.listener_identity,
        Arc::new(SimulatedBank::new(config.settlement_delay)),
    )
    .await;

    // Create application state
    let state = Arc::new(AppState { sessions, listener });

    // Build router
    let app = create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let tcp = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "Kopi gateway listening");

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    state.listener.shutdown().await;
    info!("Kopi gateway stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
