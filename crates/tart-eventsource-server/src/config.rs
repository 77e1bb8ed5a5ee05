//! Server configuration.
//!
//! Values come from `TART_*` environment variables and can be overridden on
//! the command line.
//!
//! # Environment Variables
//!
//! - `TART_HOST`: Interface to bind. Default: `localhost`
//! - `TART_PORT`: Port to bind. Default: `8080`
//! - `TART_CHANNEL_CAPACITY`: Frames buffered per stream. Default: `256`
//! - `TART_LOG_FORMAT`: `compact`, `pretty` or `json`. Default: `compact`
//! - `TART_DEMO_INTERVAL_SECS`: Send a demo message to every connected
//!   domain at this interval; `0` disables. Default: `0`

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tart_eventsource::server::DEFAULT_CHANNEL_CAPACITY;
use tart_eventsource::TransportConfig;
use tracing::info;

const ENV_PREFIX: &str = "TART";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,
    /// Multi-line output for local development
    Pretty,
    /// JSON lines for log collectors
    Json,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Frames buffered per stream before new ones are dropped
    pub channel_capacity: usize,
    /// Log output format
    pub log_format: LogFormat,
    /// Seconds between demo messages, `0` to disable
    pub demo_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            log_format: LogFormat::default(),
            demo_interval_secs: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `TART_*` environment variables.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Apply command-line overrides.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(capacity) = cli.channel_capacity {
            self.channel_capacity = capacity;
        }
        if let Some(format) = cli.log_format {
            self.log_format = format;
        }
        if let Some(interval) = cli.demo_interval_secs {
            self.demo_interval_secs = interval;
        }
        self
    }

    /// Transport settings derived from this configuration.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            channel_capacity: self.channel_capacity,
        }
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("Listen address: {}:{}", self.host, self.port);
        info!("Stream buffer: {} frames", self.channel_capacity);
        if self.demo_interval_secs > 0 {
            info!("Demo messages: every {}s", self.demo_interval_secs);
        } else {
            info!("Demo messages: disabled");
        }
    }
}

/// Command-line arguments.
#[derive(Debug, Default, Parser)]
#[command(name = "tart-eventsource")]
#[command(author, version, about = "Tart HTTP EventSource transport", long_about = None)]
pub struct Cli {
    /// Interface to bind
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to bind
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Frames buffered per stream
    #[arg(long)]
    pub channel_capacity: Option<usize>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Seconds between demo messages, 0 to disable
    #[arg(long)]
    pub demo_interval_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> ServerConfig {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_environment(
            config::Environment::with_prefix(ENV_PREFIX).source(Some(source)),
        )
        .unwrap()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8080);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.log_format, LogFormat::Compact);
        assert_eq!(config.demo_interval_secs, 0);
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        assert_eq!(from_vars(&[]), ServerConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = from_vars(&[
            ("TART_HOST", "0.0.0.0"),
            ("TART_PORT", "9000"),
            ("TART_CHANNEL_CAPACITY", "8"),
            ("TART_LOG_FORMAT", "json"),
            ("TART_DEMO_INTERVAL_SECS", "2"),
        ]);

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.demo_interval_secs, 2);
        assert_eq!(config.transport().channel_capacity, 8);
    }

    #[test]
    fn test_cli_overrides_environment() {
        let cli = Cli::parse_from([
            "tart-eventsource",
            "--host",
            "127.0.0.1",
            "-p",
            "9001",
            "--log-format",
            "pretty",
        ]);
        let config = from_vars(&[("TART_PORT", "9000")]).with_cli(&cli);

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9001);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_no_cli_flags_keep_config() {
        let config = ServerConfig::default().with_cli(&Cli::default());
        assert_eq!(config, ServerConfig::default());
    }
}
