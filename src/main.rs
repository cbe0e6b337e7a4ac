use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use manifold::config::{HttpOptions, WebSocketOptions};
use manifold::orchestrator::store::InMemorySessionStore;
use manifold::transport::{HttpTransport, StdioTransport, Transport, WebSocketTransport};
use manifold::{
    LoggingMiddleware, McpServer, Orchestrator, RateLimitMiddleware, ServerConfig,
    TransportConfig, ValidationMiddleware,
};

/// CLI arguments for manifold
#[derive(Parser, Debug)]
#[command(name = "manifold")]
#[command(about = "MCP plugin server - JSON-RPC over stdio, HTTP, or WebSocket")]
struct Args {
    /// Run in stdio mode (line-delimited JSON-RPC over stdin/stdout)
    #[arg(long)]
    stdio: bool,

    /// Serve JSON-RPC over HTTP (POST /mcp)
    #[arg(long)]
    http: bool,

    /// Serve JSON-RPC over WebSocket
    #[arg(long)]
    websocket: bool,

    /// Port for the HTTP or WebSocket server (ignored in stdio mode)
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Bind host for the HTTP or WebSocket server
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Per-tool rate limit (calls per minute); 0 disables the limiter
    #[arg(long, default_value = "0")]
    rate_limit: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load .env if present (silently ignore if not found)
    dotenvy::dotenv().ok();

    let transport_config = if args.http {
        TransportConfig::Http {
            options: HttpOptions {
                host: args.host.clone(),
                port: args.port,
                ..HttpOptions::default()
            },
        }
    } else if args.websocket {
        TransportConfig::Websocket {
            options: WebSocketOptions {
                host: args.host.clone(),
                port: args.port,
                ..WebSocketOptions::default()
            },
        }
    } else {
        TransportConfig::Stdio
    };

    let config = ServerConfig {
        transport: transport_config.clone(),
        ..ServerConfig::default()
    };

    // In stdio mode stdout belongs to the protocol; keep logs on stderr
    // and quiet by default.
    let default_filter = if args.stdio {
        "manifold=warn".to_string()
    } else {
        format!("warn,manifold={}", config.log_level.as_filter())
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "Starting {} v{} at {}",
        config.name,
        config.version,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f")
    );

    let effective_transport = config.effective_transport();
    let orchestrator = Arc::new(Orchestrator::new(Arc::new(InMemorySessionStore::new())));

    let mut builder = McpServer::builder(config)
        .middleware(Arc::new(LoggingMiddleware::new()))
        .middleware(Arc::new(ValidationMiddleware::new()))
        .orchestrator(Arc::clone(&orchestrator));
    if args.rate_limit > 0 {
        builder = builder.middleware(Arc::new(RateLimitMiddleware::new(
            args.rate_limit,
            Duration::from_secs(60),
        )));
    }

    // Plugins are compiled into the embedding binary; this bare runtime
    // starts with an empty registry.
    let server = builder.build().await?;

    for plugin in server.host().list_plugins() {
        tracing::info!("  plugin {} v{} - {}", plugin.id, plugin.version, plugin.description);
    }
    tracing::info!(
        "Registered: {} plugins, {} tools",
        server.host().plugin_count(),
        server.host().list_tools().len()
    );

    let handler = server.request_handler();
    let transport: Arc<dyn Transport> = match &effective_transport {
        TransportConfig::Stdio => {
            tracing::info!("Transport: stdio (MCP-compatible)");
            Arc::new(StdioTransport::new(handler))
        }
        TransportConfig::Http { options } => {
            tracing::info!("Transport: http://{}:{}/mcp", options.host, options.port);
            Arc::new(HttpTransport::new(options.clone(), handler))
        }
        TransportConfig::Websocket { options } => {
            tracing::info!(
                "Transport: ws://{}:{}{}",
                options.host,
                options.port,
                options.path
            );
            Arc::new(WebSocketTransport::new(options.clone(), handler))
        }
    };

    transport.start().await?;

    wait_for_shutdown_signal().await;
    tracing::info!("Shutdown signal received, draining");

    // Orderly: stop accepting, drain the transport, then run plugin
    // shutdowns in reverse registration order.
    if let Err(e) = transport.stop().await {
        tracing::warn!(error = %e, "Transport stop reported an error");
    }
    server.shutdown().await;
    tracing::info!("Bye");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
