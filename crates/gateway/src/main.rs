//! Gateway binary: loads configuration, wires the auth/bridge/listener
//! crates together, and runs until a shutdown signal arrives.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use config::{GatewayConfig, TcpMode};
use gateway_auth::AuthCore;
use gateway_health::{AtomicMetrics, HealthState};
use gateway_listeners::ChildMode;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = GatewayConfig::parse();
    let _log_guard = init_tracing(&cfg)?;

    info!(
        ws_listen = %cfg.ws_listen,
        tcp_listen = %cfg.tcp_listen,
        tcp_mode = ?cfg.tcp_mode,
        "starting gateway"
    );

    let ws_auth = Arc::new(AuthCore::new(cfg.ws_auth_config()));
    let tcp_auth = Arc::new(AuthCore::new(cfg.tcp_auth_config()));

    let ws_sweeper = gateway_auth::spawn_sweeper(ws_auth.clone(), SWEEP_INTERVAL);
    let tcp_sweeper = gateway_auth::spawn_sweeper(tcp_auth.clone(), SWEEP_INTERVAL);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let (tcp_child_mode, shared_child_handle) = match cfg.tcp_mode {
        TcpMode::DedicatedPerConnection => (ChildMode::Dedicated(cfg.child_config()), None),
        TcpMode::SharedPersistent => {
            let (shared, handle) =
                gateway_bridge::spawn_shared(&cfg.child_config(), cfg.max_request_size)?;
            (ChildMode::Shared(shared), Some(handle))
        }
    };

    let metrics = Arc::new(AtomicMetrics::new());
    let health_state = Arc::new(HealthState {
        started_at: Instant::now(),
        metrics: metrics.clone(),
        auth_enabled: ws_auth.config().auth_effectively_enabled()
            || tcp_auth.config().auth_effectively_enabled(),
        ws_max_connections: cfg.ws_max_connections,
        tcp_max_connections: cfg.tcp_max_connections,
    });

    let health_listen = cfg.health_listen;
    let health_state_for_main = health_state.clone();
    let health_task = tokio::spawn(async move {
        let router = gateway_health::router(health_state_for_main);
        match tokio::net::TcpListener::bind(health_listen).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, router).await {
                    error!(error = %e, "health endpoint exited with an error");
                }
            }
            Err(e) => error!(error = %e, addr = %health_listen, "failed to bind health endpoint"),
        }
    });

    // A second health listener for deployments that probe WS health on its
    // own port, distinct from MCP_HEALTH_PORT.
    let ws_health_listen = cfg.ws_health_listen;
    let ws_health_task = if ws_health_listen != health_listen {
        let health_state_for_ws = health_state.clone();
        Some(tokio::spawn(async move {
            let router = gateway_health::router(health_state_for_ws);
            match tokio::net::TcpListener::bind(ws_health_listen).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, router).await {
                        error!(error = %e, "websocket health endpoint exited with an error");
                    }
                }
                Err(e) => {
                    error!(error = %e, addr = %ws_health_listen, "failed to bind websocket health endpoint");
                }
            }
        }))
    } else {
        None
    };

    let ws_router = gateway_listeners::ws_router(
        ws_auth.clone(),
        config::ws_child_mode(&cfg),
        metrics.clone(),
        cfg.ws_max_connections,
        &cfg.cors_origins(),
    );
    let ws_listen: SocketAddr = cfg.ws_listen;
    let ws_task = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(ws_listen).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, addr = %ws_listen, "failed to bind websocket listener");
                return;
            }
        };
        info!(addr = %ws_listen, "websocket listener bound");
        if let Err(e) = axum::serve(
            listener,
            ws_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            error!(error = %e, "websocket listener exited with an error");
        }
    });

    let tcp_cfg = gateway_listeners::TcpListenerConfig {
        bind_addr: cfg.tcp_listen,
        max_connections: cfg.tcp_max_connections,
    };
    let tcp_shutdown_rx = shutdown_tx.subscribe();
    let tcp_metrics = metrics.clone();
    let tcp_task = tokio::spawn(async move {
        if let Err(e) = gateway_listeners::run_tcp(
            tcp_cfg,
            tcp_auth,
            tcp_child_mode,
            tcp_metrics,
            tcp_shutdown_rx,
        )
        .await
        {
            error!(error = %e, "tcp listener exited with an error");
        }
    });

    install_signal_handlers(shutdown_tx.clone());

    let mut shutdown_rx = shutdown_tx.subscribe();
    shutdown_rx.recv().await.ok();
    info!("shutdown signal received, stopping listeners");

    tcp_task.abort();
    ws_task.abort();
    health_task.abort();
    if let Some(task) = ws_health_task {
        task.abort();
    }
    ws_sweeper.abort();
    tcp_sweeper.abort();

    if let Some(mut handle) = shared_child_handle {
        if let Err(e) = handle
            .kill_gracefully(Duration::from_secs(cfg.child_shutdown_grace_secs))
            .await
        {
            warn!(error = %e, "failed to gracefully kill shared orchestrator child");
        }
    }

    ws_auth.audit().emit(gateway_auth::AuditEvent::ServerShutdown);
    info!("gateway shut down cleanly");
    Ok(())
}

fn init_tracing(cfg: &GatewayConfig) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    if let Some(path) = &cfg.audit_log {
        let path = std::path::Path::new(path);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
        let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "gateway.log".to_string());
        let file_appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).json())
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        Ok(None)
    }
}

fn install_signal_handlers(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        let _ = ctrl_c_tx.send(());
    });

    #[cfg(unix)]
    {
        let sigterm_tx = shutdown_tx;
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("sigterm received, initiating shutdown");
                    let _ = sigterm_tx.send(());
                }
                Err(e) => warn!(error = %e, "failed to install sigterm handler"),
            }
        });
    }
}
