//! TickStake Node
//!
//! Runs the staking ledger: one tick producer executing signed requests,
//! HTTP JSON-RPC and WebSocket event subscriptions on top.
//! State is persisted to disk and survives restarts.

use anyhow::Result;
use clap::Parser;
use ledger_runtime::{
    LedgerPersistence, LedgerProcessor, PersistentStore, PoolAccount, TickProducer,
    TickProducerConfig, TokenMetadata, TokenStore,
};
use parking_lot::{Mutex, RwLock};
use rpc_server::{methods::RpcContext, HttpRpcServer, RpcServerConfig, SubscriptionManager, WebSocketServer};
use staking_program::{pool_address, StakingConfig, StakingService};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::NodeConfig;

/// Tick-weighted staking ledger node
#[derive(Parser, Debug)]
#[command(name = "tick-stake")]
#[command(about = "Tick-weighted staking ledger with unanimous rate changes", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP RPC bind address
    #[arg(long)]
    rpc_addr: Option<String>,

    /// WebSocket bind address
    #[arg(long)]
    ws_addr: Option<String>,

    /// Tick time in milliseconds
    #[arg(long)]
    tick_time_ms: Option<u64>,

    /// Data directory for persistent state
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Save state every N ticks (0 = only on shutdown)
    #[arg(long)]
    save_interval: Option<u64>,

    /// Log every tick
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// File values with command line overrides applied
    fn node_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };

        if let Some(addr) = &self.rpc_addr {
            config.rpc_addr = addr.clone();
        }
        if let Some(addr) = &self.ws_addr {
            config.ws_addr = addr.clone();
        }
        if let Some(ms) = self.tick_time_ms {
            config.tick_time_ms = ms;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(interval) = self.save_interval {
            config.save_interval = interval;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.node_config()?;
    run(config, args.verbose).await
}

async fn run(config: NodeConfig, verbose: bool) -> Result<()> {
    let owner = config.owner()?;
    let managers = config.managers()?;
    let rpc_config = RpcServerConfig {
        http_addr: config.rpc_addr.clone(),
        ws_addr: config.ws_addr.clone(),
    };

    tracing::info!("Starting TickStake node");
    tracing::info!("  HTTP RPC: {}", rpc_config.http_addr);
    tracing::info!("  WebSocket: {}", rpc_config.ws_addr);
    tracing::info!("  Tick time: {}ms", config.tick_time_ms);
    tracing::info!("  Data directory: {:?}", config.data_dir);
    tracing::info!("  Save interval: {} ticks", config.save_interval);

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(&config.data_dir)?;

    // Open persistent store
    let persistent_store = Arc::new(PersistentStore::open(&config.data_dir)?);

    // Token ledger; the pool mints rewards it does not hold
    let token = TokenStore::new(
        config.token_address(),
        TokenMetadata {
            name: config.token.name.clone(),
            symbol: config.token.symbol.clone(),
            decimals: config.token.decimals,
        },
    );
    let pool = pool_address(token.address());
    token.set_minter(Some(pool));
    tracing::info!("Token {} ({}) pool {}", token.address(), config.token.symbol, pool);

    // Staking service
    let staking_config = StakingConfig::new(*token.address(), owner, managers)
        .with_reward_per_tick(token.units(config.reward_per_tick)?);
    let service = Arc::new(Mutex::new(StakingService::new(
        staking_config,
        PoolAccount::new(token.clone(), pool),
    )?));

    let mut processor = LedgerProcessor::new(service.clone(), token.clone());

    // Load existing state from disk
    if processor.load_from_disk(&persistent_store)? {
        if let Some(metadata) = persistent_store.load_metadata()? {
            tracing::info!(
                "Resumed from disk: tick {}, {} participants, saved at {}",
                metadata.tick,
                metadata.participant_count,
                metadata.last_save_ts
            );
        }
    } else {
        let supply = token.units(config.token.initial_supply)?;
        token.mint(&owner, supply)?;
        tracing::info!("No existing state found, minted {} to owner {}", supply, owner);
    }

    // Initialize tick producer
    let tick_config = TickProducerConfig {
        tick_time_ms: config.tick_time_ms,
        save_interval: config.save_interval,
        verbose,
        ..Default::default()
    };
    let current_tick = Arc::new(RwLock::new(processor.current_tick()));
    let state_root = Arc::new(RwLock::new(processor.state_root()));
    let tick_producer =
        TickProducer::new(processor, tick_config).with_persistence(persistent_store.clone());

    // Get request sender, subscriber and stop flag
    let request_sender = tick_producer.request_sender();
    let mut tick_updates = tick_producer.subscribe();
    let running = tick_producer.stop_handle();

    // Initialize subscription manager
    let subscription_manager = Arc::new(SubscriptionManager::new());

    let rpc_context = Arc::new(RpcContext {
        service,
        token,
        request_sender,
        current_tick: current_tick.clone(),
        state_root: state_root.clone(),
    });

    // Spawn tick producer
    let tick_producer_handle = tokio::spawn(tick_producer.run_async());

    // Spawn tick update handler
    let sub_mgr = subscription_manager.clone();
    let tick_ref = current_tick.clone();
    let root_ref = state_root.clone();
    let update_handler = tokio::spawn(async move {
        loop {
            match tick_updates.recv().await {
                Ok(update) => {
                    *tick_ref.write() = update.tick + 1;
                    *root_ref.write() = update.state_root;

                    sub_mgr.notify_events(update.tick, &update.events);

                    // Log stats periodically
                    if update.tick % 100 == 0 {
                        tracing::info!(
                            "Tick {}: {} subscriptions",
                            update.tick,
                            sub_mgr.subscription_count()
                        );
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Update handler lagged, skipped {} ticks", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Start HTTP RPC server
    let http_context = rpc_context.clone();
    let http_addr = rpc_config.http_addr.clone();
    let http_server = tokio::spawn(async move {
        let server = HttpRpcServer::new(http_context);
        if let Err(e) = server.run(&http_addr).await {
            tracing::error!("HTTP RPC server error: {}", e);
        }
    });

    // Start WebSocket server
    let ws_sub_mgr = subscription_manager.clone();
    let ws_addr = rpc_config.ws_addr.clone();
    let ws_server = tokio::spawn(async move {
        let server = WebSocketServer::new(ws_sub_mgr);
        if let Err(e) = server.run(&ws_addr).await {
            tracing::error!("WebSocket server error: {}", e);
        }
    });

    tracing::info!("TickStake node running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    http_server.abort();
    ws_server.abort();

    // The producer finishes its tick and saves final state
    running.store(false, std::sync::atomic::Ordering::SeqCst);
    let processor = tick_producer_handle.await?;
    tracing::info!("Final state saved at tick {}", processor.current_tick());

    update_handler.abort();

    tracing::info!("Node stopped");

    Ok(())
}
