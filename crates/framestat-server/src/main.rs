use std::sync::Arc;

use framestat_server::config::{ServerConfig, parse_cli};
use framestat_server::monitor::MonitorFactory;
use framestat_server::{Server, SessionListener, TracingMonitorFactory, api};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_cli(&cli)?;
    let factory: Arc<dyn MonitorFactory> = Arc::new(TracingMonitorFactory::new(config.max_sessions));
    let server = Server::new(config.server_settings(), factory);

    let tcp_listener = TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| format!("failed to bind TCP on {}: {e}", config.listen_addr))?;
    info!(
        tcp_addr = %config.listen_addr,
        dispatch = %config.dispatch,
        history_secs = config.history_secs,
        max_sessions = config.max_sessions,
        "framestat session listener ready"
    );

    let http_listener = TcpListener::bind(&config.http_addr)
        .await
        .map_err(|e| format!("failed to bind HTTP on {}: {e}", config.http_addr))?;
    info!(http_addr = %config.http_addr, "framestat HTTP API ready");
    print_startup_hints(&config.http_addr, &config.listen_addr);

    let app = api::router(Arc::clone(&server));
    tokio::select! {
        _ = SessionListener::new(Arc::clone(&server)).run(tcp_listener) => {}
        _ = Arc::clone(&server).run() => {}
        result = axum::serve(http_listener, app) => {
            if let Err(e) = result {
                error!(%e, "HTTP server error");
                return Err(format!("http server error: {e}"));
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }
    Ok(())
}

fn print_startup_hints(http_addr: &str, tcp_addr: &str) {
    println!();
    println!("  framestat ready");
    println!();
    println!("  \x1b[32mQuery sessions: http://{http_addr}/api/sessions\x1b[0m");
    println!();
    println!("  Point profiled programs at:");
    println!("    \x1b[32m{tcp_addr}\x1b[0m");
    println!();
}
