use std::collections::HashMap;
use std::sync::Arc;

use message_relay::api;
use message_relay::chain::{
    DestinationChain, EvmDestinationChain, EvmSourceChain, EvmStateOracle, SourceChain,
    StateRootOracle,
};
use message_relay::config::Config;
use message_relay::dispatcher::{RetryConfig, TransactionDispatcher};
use message_relay::listener::MultiChainHub;
use message_relay::metrics;
use message_relay::orchestrator::RelayOrchestrator;
use message_relay::types::ChainId;

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting message relay");

    let config = Config::load()?;
    let chain_ids: Vec<ChainId> = config.enabled_chains().map(|c| c.chain_id).collect();
    tracing::info!(
        chains = ?chain_ids,
        batch_size = config.relayer.batch_size,
        trust_policy = ?config.relayer.trust_policy,
        "Configuration loaded"
    );

    let mut sources = Vec::new();
    let mut dispatchers = Vec::new();
    let mut oracles: HashMap<ChainId, Arc<dyn StateRootOracle>> = HashMap::new();

    for profile in config.enabled_chains() {
        match EvmSourceChain::new(profile, config.listener.max_block_range) {
            Ok(source) => {
                let source: Arc<dyn SourceChain> = Arc::new(source);
                sources.push((profile.clone(), source));
            }
            Err(e) => {
                tracing::error!(
                    chain_id = profile.chain_id,
                    error = %e,
                    "Failed to create source client, chain will not be watched"
                );
            }
        }

        match EvmDestinationChain::new(profile, &config.signer.private_key) {
            Ok(dest) => {
                let dest: Arc<dyn DestinationChain> = Arc::new(dest);
                dispatchers.push(Arc::new(TransactionDispatcher::new(
                    dest,
                    &config.fees,
                    config.dispatcher.clone(),
                    RetryConfig::with_max_retries(config.relayer.max_retries),
                )));
            }
            Err(e) => {
                tracing::error!(
                    chain_id = profile.chain_id,
                    error = %e,
                    "Failed to create destination client, chain will not receive messages"
                );
            }
        }

        if let Some(oracle_address) = &profile.oracle_address {
            match EvmStateOracle::new(profile, oracle_address) {
                Ok(oracle) => {
                    oracles.insert(profile.chain_id, Arc::new(oracle));
                }
                Err(e) => {
                    tracing::warn!(
                        chain_id = profile.chain_id,
                        error = %e,
                        "Failed to create state root oracle, proofs unavailable on this chain"
                    );
                }
            }
        }
    }

    let mut hub = MultiChainHub::new(config.listener.clone());
    let watching = hub.initialize(sources).await;
    tracing::info!(chains = ?watching, "Listeners initialized");

    let relay = Arc::new(
        RelayOrchestrator::initialize(config.relayer.clone(), hub, dispatchers, oracles).await?,
    );
    relay.start();

    let api_relay = relay.clone();
    let bind_address = config.api.bind_address.clone();
    let api_task = tokio::spawn(async move {
        if let Err(e) = api::start_server(&bind_address, api_relay).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    wait_for_shutdown_signal().await;

    relay.stop().await;
    api_task.abort();
    metrics::UP.set(0.0);

    let stats = relay.stats().snapshot();
    tracing::info!(
        processed = stats.messages_processed,
        failed = stats.messages_failed,
        queued = stats.queue_depth,
        "Message relay stopped"
    );
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,message_relay=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
