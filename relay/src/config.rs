use crate::origin::DEFAULT_ORIGIN_PORTS;
use crate::pipeline::TranslationFailure;
use crate::registry::{self, DEFAULT_INDEX_URL};
use clap::{Parser, ValueEnum};
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TranscriberKind {
    /// whisper.cpp `server` over HTTP
    WhisperServer,
    /// in-process whisper-rs (needs the `whisper` feature)
    Whisper,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "relay", about = "Live speech transcription and translation relay")]
pub struct Args {
    #[arg(short, long, env = "RELAY_ADDRESS", default_value = "0.0.0.0", help = "address to listen on")]
    pub address: String,

    #[arg(short, long, env = "RELAY_PORT", default_value = "8443", help = "port to listen on")]
    pub port: u16,

    #[arg(long, env = "RELAY_CERT", default_value = "cert.pem", help = "PEM certificate chain")]
    pub cert: PathBuf,

    #[arg(long, env = "RELAY_KEY", default_value = "key.pem", help = "PEM private key")]
    pub key: PathBuf,

    #[arg(
        long,
        env = "RELAY_PING_INTERVAL_SECS",
        default_value = "20",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "seconds between liveness pings"
    )]
    pub ping_interval_secs: u64,

    #[arg(
        long,
        env = "RELAY_PING_TIMEOUT_SECS",
        default_value = "20",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "seconds to wait for a pong before dropping the client"
    )]
    pub ping_timeout_secs: u64,

    #[arg(
        long,
        env = "RELAY_MAX_MESSAGE_SIZE",
        help = "largest accepted frame in bytes (default: unbounded)"
    )]
    pub max_message_size: Option<usize>,

    #[arg(
        long = "allow-host",
        env = "RELAY_ALLOW_HOSTS",
        value_delimiter = ',',
        help = "extra host whose pages may connect (repeatable)"
    )]
    pub allow_hosts: Vec<String>,

    #[arg(
        long = "origin-port",
        env = "RELAY_ORIGIN_PORTS",
        value_delimiter = ',',
        default_values_t = DEFAULT_ORIGIN_PORTS,
        help = "port the web frontend is served from (repeatable)"
    )]
    pub origin_ports: Vec<u16>,

    #[arg(long, help = "reject clients that send no Origin header")]
    pub no_absent_origin: bool,

    #[arg(long, value_enum, env = "RELAY_TRANSCRIBER", default_value_t = TranscriberKind::WhisperServer)]
    pub transcriber: TranscriberKind,

    #[arg(long, env = "RELAY_WHISPER_URL", default_value = "http://127.0.0.1:8080")]
    pub whisper_url: String,

    #[arg(short, long, env = "RELAY_MODEL", help = "path to whisper model file")]
    pub model: Option<PathBuf>,

    #[arg(long, help = "beam search size for in-process whisper (default: greedy)")]
    pub beam_size: Option<i32>,

    #[arg(long, env = "RELAY_TRANSLATE_URL", default_value = "http://127.0.0.1:5001")]
    pub translate_url: String,

    #[arg(long, env = "RELAY_TRANSLATE_API_KEY")]
    pub translate_api_key: Option<String>,

    #[arg(long, env = "RELAY_PACKAGES_DIR", help = "argos package directory")]
    pub packages_dir: Option<PathBuf>,

    #[arg(long, env = "RELAY_PACKAGE_INDEX", default_value = DEFAULT_INDEX_URL)]
    pub package_index: String,

    #[arg(
        long,
        env = "RELAY_CATALOG_REFRESH_SECS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "refresh the language pair catalog this often (default: startup only)"
    )]
    pub catalog_refresh_secs: Option<u64>,

    #[arg(
        long,
        env = "RELAY_CATALOG_TIMEOUT_SECS",
        default_value = "120",
        help = "give up on the startup catalog refresh after this long"
    )]
    pub catalog_timeout_secs: u64,

    #[arg(long, value_enum, env = "RELAY_TRANSLATION_FAILURE", default_value_t = TranslationFailure::Inline)]
    pub translation_failure: TranslationFailure,
}

impl Args {
    pub fn listen_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.address, self.port).parse()
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn catalog_refresh(&self) -> Option<Duration> {
        self.catalog_refresh_secs.map(Duration::from_secs)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs)
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.packages_dir
            .clone()
            .unwrap_or_else(registry::default_packages_dir)
    }

    /// Frame size cap; compression is never negotiated by tungstenite.
    pub fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = self.max_message_size;
        config.max_frame_size = self.max_message_size;
        config
    }
}
