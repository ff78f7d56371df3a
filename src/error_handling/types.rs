use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    ArgsError(String),
    MissingCaptureSource,
    BadListenAddress(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::ArgsError(e) => write!(f, "Argument error: {}", e),
            ConfigError::MissingCaptureSource => {
                write!(f, "No capture source: set an interface or a pcap file")
            }
            ConfigError::BadListenAddress(e) => write!(f, "Listen address error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum CaptureError {
    DeviceOpen(String),
    FilterCompile(String),
    ReadFailed(String),
    SourceExhausted,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceOpen(e) => write!(f, "Capture device open failed: {}", e),
            CaptureError::FilterCompile(e) => write!(f, "Capture filter compile failed: {}", e),
            CaptureError::ReadFailed(e) => write!(f, "Capture read failed: {}", e),
            CaptureError::SourceExhausted => write!(f, "Capture source exhausted"),
        }
    }
}

impl std::error::Error for CaptureError {}

#[derive(Debug)]
pub enum FingerprintError {
    IoError(std::io::Error),
    JsonError(String),
    BadDefinition { desc: String, reason: String },
    NotClientHello(String),
    Truncated(&'static str),
}

impl fmt::Display for FingerprintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FingerprintError::IoError(e) => write!(f, "Fingerprint file IO error: {}", e),
            FingerprintError::JsonError(e) => write!(f, "Fingerprint file JSON error: {}", e),
            FingerprintError::BadDefinition { desc, reason } => {
                write!(f, "Bad fingerprint definition '{}': {}", desc, reason)
            }
            FingerprintError::NotClientHello(e) => write!(f, "Not a ClientHello: {}", e),
            FingerprintError::Truncated(field) => write!(f, "ClientHello truncated at {}", field),
        }
    }
}

impl std::error::Error for FingerprintError {}

impl From<std::io::Error> for FingerprintError {
    fn from(err: std::io::Error) -> Self {
        FingerprintError::IoError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed(String),
    SchemaFailed(String),
    WriteFailed(String),
    ReadFailed(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(e) => write!(f, "Storage connection failed: {}", e),
            StorageError::SchemaFailed(e) => write!(f, "Storage schema creation failed: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum NetworkError {
    BindError(std::io::Error),
    CertificateLoad(String),
    TlsConfig(String),
    HandshakeFailed(std::io::Error),
    SockError(std::io::Error),
    PatternError(regex::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::BindError(e) => write!(f, "Network bind error: {}", e),
            NetworkError::CertificateLoad(e) => write!(f, "Certificate load failed: {}", e),
            NetworkError::TlsConfig(e) => write!(f, "TLS configuration error: {}", e),
            NetworkError::HandshakeFailed(e) => write!(f, "TLS handshake failed: {}", e),
            NetworkError::SockError(e) => write!(f, "Socket error: {}", e),
            NetworkError::PatternError(e) => write!(f, "User-Agent pattern error: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    CaptureError(CaptureError),
    FingerprintError(FingerprintError),
    StorageError(StorageError),
    NetworkError(NetworkError),
    TaskFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::CaptureError(e) => write!(f, "Capture error: {}", e),
            ControllerError::FingerprintError(e) => write!(f, "Fingerprint error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::NetworkError(e) => write!(f, "Network error: {}", e),
            ControllerError::TaskFailed(e) => write!(f, "Task failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<CaptureError> for ControllerError {
    fn from(err: CaptureError) -> Self {
        ControllerError::CaptureError(err)
    }
}

impl From<FingerprintError> for ControllerError {
    fn from(err: FingerprintError) -> Self {
        ControllerError::FingerprintError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}

impl From<NetworkError> for ControllerError {
    fn from(err: NetworkError) -> Self {
        ControllerError::NetworkError(err)
    }
}
