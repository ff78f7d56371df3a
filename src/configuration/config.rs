use super::types::Blocklist;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

pub const DEFAULT_FINGERPRINT_FILE: &str = "./fpReaper.json";
pub const DEFAULT_LISTEN: &str = ":443";
pub const DEFAULT_DATABASE: &str = "fpreaper.sqlite3";
pub const DEFAULT_TLS_CERT: &str = "localhost.crt";
pub const DEFAULT_TLS_KEY: &str = "localhost.key";
pub const DEFAULT_CAPTURE_TIMEOUT_MS: i32 = 1000;

/// Runtime configuration of the sensor.
///
/// Every field can be given on the command line (some also through the
/// environment), or the whole structure can be read from a TOML file passed
/// with `--config`. Keys missing from the file take the same defaults as the
/// command line.
///
/// # Fields Overview
///
/// - `fingerprint_file`: JSON array of fingerprint definitions loaded at startup
/// - `interface`: device to capture on; required unless `pcap_file` is set
/// - `pcap_file`: replay a capture file instead of a live device
/// - `listen`: bind address of the auxiliary TLS listener, `host:port` or `:port`
/// - `database`: SQLite file receiving connection and fingerprint rows
/// - `tls_cert` / `tls_key`: PEM files for the auxiliary listener
/// - `capture_timeout_ms`: how often a blocked capture read wakes up to check for
///   shutdown; `0` blocks until the next packet
/// - `blocklist`: peers the auxiliary listener drops without answering
#[derive(Parser, Debug, Clone, Deserialize)]
#[command(name = "fpreaper")]
#[command(version)]
#[command(about = "Passive TLS ClientHello fingerprinting sensor")]
#[serde(default)]
pub struct Config {
    /// Fingerprint definition file
    #[arg(long = "fingerprint", env = "FPREAPER_FINGERPRINT", default_value = DEFAULT_FINGERPRINT_FILE)]
    pub fingerprint_file: PathBuf,

    /// Capture interface
    #[arg(long, env = "FPREAPER_INTERFACE")]
    pub interface: Option<String>,

    /// Read packets from a capture file instead of a live interface
    #[arg(long)]
    pub pcap_file: Option<PathBuf>,

    /// Address for the auxiliary TLS listener
    #[arg(long, env = "FPREAPER_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// SQLite database file
    #[arg(long, env = "FPREAPER_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    #[arg(long, default_value = DEFAULT_TLS_CERT)]
    pub tls_cert: PathBuf,

    #[arg(long, default_value = DEFAULT_TLS_KEY)]
    pub tls_key: PathBuf,

    /// Capture read timeout in milliseconds, 0 blocks forever
    #[arg(long, default_value_t = DEFAULT_CAPTURE_TIMEOUT_MS)]
    pub capture_timeout_ms: i32,

    /// Peer addresses the listener refuses (repeatable or comma separated)
    #[arg(long = "block", value_delimiter = ',')]
    pub blocklist: Vec<IpAddr>,

    /// Read the configuration from a TOML file instead
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fingerprint_file: PathBuf::from(DEFAULT_FINGERPRINT_FILE),
            interface: None,
            pcap_file: None,
            listen: DEFAULT_LISTEN.to_string(),
            database: PathBuf::from(DEFAULT_DATABASE),
            tls_cert: PathBuf::from(DEFAULT_TLS_CERT),
            tls_key: PathBuf::from(DEFAULT_TLS_KEY),
            capture_timeout_ms: DEFAULT_CAPTURE_TIMEOUT_MS,
            blocklist: Vec::new(),
            config: None,
        }
    }
}

impl Config {
    /// Parses the command line, then switches to the TOML file if `--config`
    /// was given. The result is validated before it is returned.
    ///
    /// # Panics
    /// Never; but `clap` exits the process on `--help`, `--version` and on
    /// malformed arguments, printing its own diagnostic.
    pub fn load() -> Result<Self, ConfigError> {
        let args = Config::parse();
        let config = match &args.config {
            Some(path) => Config::from_file(path)?,
            None => args,
        };
        config.validate()?;
        Ok(config)
    }

    /// Same as [`Config::load`] for an explicit argument list, without exiting.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let args = Config::try_parse_from(args).map_err(|e| ConfigError::ArgsError(e.to_string()))?;
        let config = match &args.config {
            Some(path) => Config::from_file(path)?,
            None => args,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_interface = self.interface.as_deref().is_some_and(|i| !i.is_empty());
        if !has_interface && self.pcap_file.is_none() {
            return Err(ConfigError::MissingCaptureSource);
        }
        if self.capture_timeout_ms < 0 {
            return Err(ConfigError::NotInRange(format!(
                "capture_timeout_ms must be >= 0, got {}",
                self.capture_timeout_ms
            )));
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Resolves `listen` into a socket address. A bare `:port` binds the IPv6
    /// wildcard, which also accepts IPv4 peers as mapped addresses unless the
    /// host forces `IPV6_V6ONLY`.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let candidate = if self.listen.starts_with(':') {
            format!("[::]{}", self.listen)
        } else {
            self.listen.clone()
        };
        candidate
            .parse()
            .map_err(|_| ConfigError::BadListenAddress(self.listen.clone()))
    }

    pub fn blocklist(&self) -> Blocklist {
        Blocklist::new(self.blocklist.iter().copied())
    }
}
