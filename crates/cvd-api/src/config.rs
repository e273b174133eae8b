//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Base URL used for returned links when `BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "https://video-colorblind-api.onrender.com";

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second (per client IP, processing route only)
    pub rate_limit_rps: u32,
    /// Take the client IP from proxy headers (set only behind a proxy that
    /// appends to `X-Forwarded-For`)
    pub trust_proxy_headers: bool,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Public base address prepended to `/files/{name}`, without trailing slash
    pub base_url: String,
    /// Directory holding scratch inputs and published outputs
    pub scratch_dir: PathBuf,
    /// FFmpeg executable name or path
    pub ffmpeg_path: PathBuf,
    /// FFmpeg timeout in seconds (0 = none)
    pub ffmpeg_timeout_secs: u64,
    /// Max simultaneous FFmpeg processes (0 = unlimited)
    pub max_concurrent_jobs: usize,
    /// How long a published output stays fetchable after the response
    pub artifact_retention: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            trust_proxy_headers: false,
            max_body_size: 1024 * 1024 * 1024, // 1GB
            environment: "development".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            scratch_dir: std::env::temp_dir(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffmpeg_timeout_secs: 900,
            max_concurrent_jobs: 0,
            artifact_retention: Duration::from_secs(300),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            trust_proxy_headers: std::env::var("TRUST_PROXY_HEADERS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.trust_proxy_headers),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            base_url: std::env::var("BASE_URL")
                .map(|s| normalize_base_url(&s))
                .unwrap_or(defaults.base_url),
            scratch_dir: std::env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            ffmpeg_timeout_secs: env_parse("FFMPEG_TIMEOUT_SECS")
                .unwrap_or(defaults.ffmpeg_timeout_secs),
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs),
            artifact_retention: env_parse("ARTIFACT_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.artifact_retention),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Check that the base URL is an absolute http(s) URL.
    pub fn validate(&self) -> Result<(), String> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| format!("BASE_URL '{}' is not a valid URL: {}", self.base_url, e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(format!("BASE_URL must use http or https, got '{}'", url.scheme()));
        }
        Ok(())
    }

    /// Public URL of a published output file.
    pub fn file_url(&self, file_name: &str) -> String {
        format!("{}/files/{}", self.base_url, file_name)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
