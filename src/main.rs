//! dualproxy - HTTP / SOCKS5 forward proxy
//!
//! Runs one listener speaking the configured protocol, a periodic stats
//! publisher, and an optional read-only management API.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dualproxy::{
    config::{Config, ConfigManager},
    management::ManagementServer,
    shutdown::ShutdownAwareTask,
    stats::StatsBroadcaster,
    ConnectionManager, ShutdownCoordinator,
};

/// CLI arguments for dualproxy
#[derive(Parser, Debug)]
#[command(name = "dualproxy")]
#[command(about = "Forward proxy speaking HTTP or SOCKS5 with live traffic statistics")]
#[command(version)]
#[command(long_about = "
Forward proxy speaking either HTTP (CONNECT tunnels and plain forwarding)
or SOCKS5 (no authentication, CONNECT only), with live per-connection
traffic statistics.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  DUALPROXY_BIND_HOST        - Listen host (e.g., 0.0.0.0)
  DUALPROXY_PORT             - Listen port
  DUALPROXY_PROXY_TYPE       - Protocol (http, socks5)
  DUALPROXY_CONNECT_TIMEOUT  - Outbound connect timeout (e.g., 10s)
  DUALPROXY_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "dualproxy.toml", help = "Path to configuration file")]
    pub config: PathBuf,

    /// Listen host (overrides config file)
    #[arg(short, long, help = "Listen host (e.g., 127.0.0.1)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Protocol spoken by the listener
    #[arg(short = 't', long, help = "Proxy protocol (http, socks5)")]
    pub proxy_type: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Do not start the management API
    #[arg(long, help = "Disable the management API")]
    pub no_management: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Configuration priority: CLI args > config file > environment > defaults
    let mut config = ConfigManager::load(&args.config)?;

    init_tracing(&args, &config)?;

    info!("Starting dualproxy v{}", env!("CARGO_PKG_VERSION"));
    if !args.config.exists() {
        info!(
            "Config file {} not found, using environment and defaults",
            args.config.display()
        );
    }

    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.proxy_type.as_deref(),
        args.no_management,
    )?;

    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        log_config_summary(&config);
        return Ok(());
    }

    log_config_summary(&config);

    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);
    let config = Arc::new(config);
    let connection_manager = Arc::new(ConnectionManager::new(Arc::clone(&config)));

    let listener = connection_manager
        .bind()
        .await
        .context("Failed to start proxy listener")?;

    let broadcaster = StatsBroadcaster::new(
        Arc::clone(connection_manager.registry()),
        config.monitoring.stats_interval,
    );
    let stats_rx = broadcaster.subscribe();
    let stats_task = ShutdownAwareTask::spawn(&shutdown_coordinator, "stats_broadcaster", move |shutdown_rx| {
        broadcaster.run(shutdown_rx)
    });

    let management_task = if config.monitoring.management_api.enabled {
        let management_server = ManagementServer::new(
            config.monitoring.management_api.bind_addr,
            Arc::clone(&connection_manager),
            stats_rx,
        );

        Some(ShutdownAwareTask::spawn(&shutdown_coordinator, "management_api", move |shutdown_rx| async move {
            if let Err(e) = management_server.start(shutdown_rx).await {
                error!("Management API server error: {:#}", e);
            }
        }))
    } else {
        info!("Management API server disabled");
        None
    };

    let server_handle = {
        let manager = Arc::clone(&connection_manager);
        tokio::spawn(async move {
            if let Err(e) = manager.serve(listener).await {
                error!("Server error: {:#}", e);
            }
        })
    };

    info!("Press Ctrl+C or send SIGTERM/SIGINT to shut down gracefully");

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
        shutdown_coordinator.trigger();
    }

    info!("Initiating graceful shutdown...");
    shutdown_coordinator
        .shutdown_connection_manager(&connection_manager)
        .await;

    if let Err(e) = server_handle.await {
        if !e.is_cancelled() {
            error!("Server task failed: {}", e);
        }
    }

    let grace = shutdown_coordinator.timeout();
    stats_task.join(grace).await?;
    if let Some(task) = management_task {
        task.join(grace).await?;
    }

    info!("Server shutdown complete");
    Ok(())
}

fn log_config_summary(config: &Config) {
    info!("Configuration summary:");
    info!("  Listen address: {}", config.server.bind_target());
    info!("  Proxy type: {}", config.server.proxy_type);
    info!("  Connect timeout: {:?}", config.server.connect_timeout);
    info!("  Buffer size: {} bytes", config.server.buffer_size);
    info!(
        "  Management API: {}",
        if config.monitoring.management_api.enabled {
            config.monitoring.management_api.bind_addr.to_string()
        } else {
            "disabled".to_string()
        }
    );
}

/// Initialize tracing/logging. `RUST_LOG` wins over every other source.
fn init_tracing(args: &CliArgs, config: &Config) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level
            .as_deref()
            .unwrap_or(&config.monitoring.log_level)
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
