//! Server configuration
//!
//! The kernel is configured up front with a name/version pair, a transport
//! selection, a log level, and HTTP CORS settings. Middleware objects are
//! attached on the builder, not here, because they are not serializable.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default HTTP/WebSocket bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 3000;
/// Default WebSocket port
pub const DEFAULT_WS_PORT: u16 = 3001;
/// Default WebSocket endpoint path
pub const DEFAULT_WS_PATH: &str = "/ws";
/// Default WebSocket heartbeat interval
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Default HTTP body-size limit: 1 MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Log level advertised in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by the tracing EnvFilter
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// CORS settings for the HTTP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; empty means any origin
    pub origins: Vec<String>,
    pub credentials: bool,
    /// Allowed methods; empty means any method
    pub methods: Vec<String>,
    /// Allowed headers; empty means any header
    pub headers: Vec<String>,
    /// Preflight cache lifetime in seconds
    pub max_age_secs: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: Vec::new(),
            credentials: false,
            methods: Vec::new(),
            headers: Vec::new(),
            max_age_secs: None,
        }
    }
}

/// HTTP transport options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
    /// Maximum accepted request body, in bytes
    pub max_body_size: usize,
    /// Honor `x-forwarded-for` when resolving the peer address
    pub trust_proxy: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            cors: CorsConfig::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            trust_proxy: false,
        }
    }
}

/// WebSocket transport options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketOptions {
    pub host: String,
    pub port: u16,
    pub path: String,
    #[serde(with = "duration_millis")]
    pub heartbeat_interval: Duration,
    /// Connections beyond this are refused with close code 1013
    pub max_connections: Option<usize>,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_WS_PORT,
            path: DEFAULT_WS_PATH.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_connections: None,
        }
    }
}

/// Transport selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Stdio,
    Http {
        #[serde(default)]
        options: HttpOptions,
    },
    Websocket {
        #[serde(default)]
        options: WebSocketOptions,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Stdio
    }
}

/// Top-level kernel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Advertised server name
    pub name: String,
    /// Advertised server version
    pub version: String,
    pub transport: TransportConfig,
    pub log_level: LogLevel,
    /// Top-level alias for the HTTP transport's CORS settings; when set it
    /// overrides `transport.options.cors`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsConfig>,
    /// Run the middleware pipeline around `resources/read` and `prompts/get`
    /// as well as `tools/call`
    pub pipeline_covers_reads: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "manifold".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transport: TransportConfig::default(),
            log_level: LogLevel::default(),
            cors: None,
            pipeline_covers_reads: false,
        }
    }
}

impl ServerConfig {
    /// Resolve the effective transport, folding the top-level `cors` alias
    /// into the HTTP options
    pub fn effective_transport(&self) -> TransportConfig {
        match (&self.transport, &self.cors) {
            (TransportConfig::Http { options }, Some(cors)) => TransportConfig::Http {
                options: HttpOptions {
                    cors: cors.clone(),
                    ..options.clone()
                },
            },
            (transport, _) => transport.clone(),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_transport_is_stdio() {
        let config = ServerConfig::default();
        assert!(matches!(config.transport, TransportConfig::Stdio));
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn transport_config_parses_tagged_json() {
        let config: TransportConfig = serde_json::from_str(
            r#"{"type":"http","options":{"port":8080,"trust_proxy":true}}"#,
        )
        .unwrap();
        match config {
            TransportConfig::Http { options } => {
                assert_eq!(options.port, 8080);
                assert!(options.trust_proxy);
            }
            other => panic!("expected http transport, got {:?}", other),
        }
    }

    #[test]
    fn cors_alias_overrides_http_options() {
        let config = ServerConfig {
            transport: TransportConfig::Http {
                options: HttpOptions::default(),
            },
            cors: Some(CorsConfig {
                origins: vec!["https://app.example".to_string()],
                credentials: true,
                ..CorsConfig::default()
            }),
            ..ServerConfig::default()
        };
        match config.effective_transport() {
            TransportConfig::Http { options } => {
                assert_eq!(options.cors.origins, vec!["https://app.example"]);
                assert!(options.cors.credentials);
            }
            other => panic!("expected http transport, got {:?}", other),
        }
    }

    #[test]
    fn websocket_options_default_heartbeat() {
        let options = WebSocketOptions::default();
        assert_eq!(options.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(options.path, "/ws");
        assert!(options.max_connections.is_none());
    }
}
