use facematch_core::{StoreBackend, DEFAULT_TOLERANCE};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind (default: 127.0.0.1).
    pub host: IpAddr,
    /// Port to bind (default: 8000).
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Which face store implementation to use.
    pub store_backend: StoreBackend,
    /// Path of the face store file or database.
    pub store_path: PathBuf,
    /// Maximum embedding distance accepted as a match.
    pub tolerance: f32,
    /// Request body limit in bytes, applied to uploads and JSON bodies.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEMATCH_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facematch_core::default_model_dir());

        let store_backend = match std::env::var("FACEMATCH_STORE_BACKEND") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "falling back to the file store");
                StoreBackend::File
            }),
            Err(_) => StoreBackend::File,
        };

        let store_path = std::env::var("FACEMATCH_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                facematch_core::default_data_dir().join(store_backend.default_file_name())
            });

        Self {
            host: env_parse("FACEMATCH_HOST", IpAddr::V4(Ipv4Addr::LOCALHOST)),
            port: env_parse("FACEMATCH_PORT", 8000),
            cors_allowed_origins: parse_origins(
                &std::env::var("FACEMATCH_CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),
            ),
            model_dir,
            store_backend,
            store_path,
            tolerance: env_tolerance("FACEMATCH_TOLERANCE", DEFAULT_TOLERANCE),
            max_upload_bytes: env_parse("FACEMATCH_MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Tolerance must be a finite, non-negative distance.
fn env_tolerance(key: &str, default: f32) -> f32 {
    let value: f32 = env_parse(key, default);
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        tracing::warn!(key, value, "invalid tolerance, using default");
        default
    }
}

/// Split a comma-separated origin list. `*` (alone or in the list) means any origin.
fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    if origins.iter().any(|o| o == "*") {
        Vec::new()
    } else {
        origins
    }
}
