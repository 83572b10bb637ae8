// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::error::Error;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use user_proxy_relayer::{
    api::router,
    blockchain::{signing, EvmClient, NetworkConfig, ProxyArtifact, DEVNET},
    config::{LedgerMode, RelayerConfig, RelayerKey, TlsPaths},
    ledger::{faucet::SEPOLIA_FAUCET_TOKEN, FaucetToken, LedgerBackend, LocalLedger},
    logging,
    relay::{PendingPoller, RelaySubmitter},
    state::AppState,
    storage::{NonceCache, RelayDatabase, DATABASE_FILE},
};

type BoxError = Box<dyn Error + Send + Sync>;

/// Grace period for in-flight requests after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let config = match RelayerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    logging::init(config.log_format);

    if let Err(e) = run(config).await {
        error!(error = %e, "Relayer stopped");
        std::process::exit(1);
    }
}

async fn run(config: RelayerConfig) -> Result<(), BoxError> {
    let signer = load_signer(config.relayer_key.as_ref())?;
    let (ledger, network) = connect_ledger(&config, signer).await?;

    let db = Arc::new(RelayDatabase::open(&config.data_dir.join(DATABASE_FILE))?);
    let submitter = Arc::new(RelaySubmitter::new(
        ledger,
        db,
        NonceCache::new(config.nonce_cache_capacity, config.nonce_cache_ttl),
        config.finality,
        network,
    ));

    let shutdown = CancellationToken::new();
    let poller = PendingPoller::new(submitter.clone()).with_interval(config.pending_poll_interval);
    let poller_task = tokio::spawn(poller.run(shutdown.clone()));

    let app = router(AppState::new(submitter).with_data_dir(config.data_dir.clone()));
    let addr = config.bind_addr()?;

    tokio::spawn(wait_for_ctrl_c(shutdown.clone()));

    match &config.tls {
        Some(tls) => serve_https(app, addr, tls, shutdown.clone()).await?,
        None => serve_http(app, addr, shutdown.clone()).await?,
    }

    shutdown.cancel();
    poller_task.await?;
    info!("Relayer shut down");
    Ok(())
}

fn load_signer(key: Option<&RelayerKey>) -> Result<PrivateKeySigner, BoxError> {
    Ok(match key {
        Some(RelayerKey::Hex(hex)) => signing::signer_from_hex(hex)?,
        Some(RelayerKey::PemFile(path)) => signing::signer_from_pem(&std::fs::read(path)?)?,
        None => {
            warn!("No relayer key configured, using an ephemeral key for the local ledger");
            PrivateKeySigner::random()
        }
    })
}

async fn connect_ledger(
    config: &RelayerConfig,
    signer: PrivateKeySigner,
) -> Result<(Arc<dyn LedgerBackend>, NetworkConfig), BoxError> {
    match config.ledger_mode {
        LedgerMode::Rpc => {
            let artifact = ProxyArtifact::load(&config.proxy_artifact_path)?;
            let client = EvmClient::connect(&config.rpc_url, signer, artifact).await?;
            let network = client.network().clone();
            let ledger: Arc<dyn LedgerBackend> = Arc::new(client);
            Ok((ledger, network))
        }
        LedgerMode::Local => {
            let ledger = LocalLedger::new(DEVNET.chain_id, signer.address())
                .with_target(SEPOLIA_FAUCET_TOKEN, FaucetToken::new());
            info!(
                chain_id = DEVNET.chain_id,
                relayer = %signer.address(),
                faucet = %SEPOLIA_FAUCET_TOKEN,
                "Using in-process ledger"
            );
            let ledger: Arc<dyn LedgerBackend> = Arc::new(ledger);
            Ok((ledger, DEVNET))
        }
    }
}

async fn serve_http(
    app: Router,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), BoxError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("User proxy relayer listening on http://{addr} (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn serve_https(
    app: Router,
    addr: SocketAddr,
    tls: &TlsPaths,
    shutdown: CancellationToken,
) -> Result<(), BoxError> {
    // rustls needs a process-wide provider before any TLS config is built.
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }
    let tls_config = load_tls(&tls.cert, &tls.key).await?;

    let handle = axum_server::Handle::new();
    let graceful = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        graceful.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    info!("User proxy relayer listening on https://{addr} (docs at /docs)");
    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

async fn load_tls(cert: &Path, key: &Path) -> Result<RustlsConfig, BoxError> {
    RustlsConfig::from_pem_file(cert, key)
        .await
        .map_err(|e| format!("cannot load TLS material from {}: {e}", cert.display()).into())
}

async fn wait_for_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Ctrl-C received, shutting down");
            shutdown.cancel();
        }
        Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
    }
}
