//! Server configuration, loaded from environment variables at startup.

/// Runtime configuration for freshscore-server.
///
/// Every field has a default so the server starts out-of-the-box; the model
/// and storage endpoints are the values a real deployment overrides.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// SQLite (or other sqlx-compatible) database URL
    /// (default: `"sqlite://freshscore.db?mode=rwc"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Expose Swagger UI at `/swagger-ui` (disable in production).
    pub enable_swagger: bool,

    /// Comma-separated CORS origin allowlist; `None` means wildcard.
    pub cors_allowed_origins: Option<String>,

    /// Number of detection worker slots (default: 10).
    pub pool_capacity: usize,

    /// Remote multimodal model endpoint.
    pub model: ModelConfig,

    /// Object storage and temporary-credential issuance.
    pub storage: StorageConfig,
}

/// Chat-completion endpoint settings.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL of the provider, without the `/chat/completions` suffix.
    pub base_url: String,
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model: String,
}

/// Object-storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Endpoint that issues temporary storage credentials.
    pub auth_endpoint: String,
    pub bucket: String,
    pub region: String,
    /// Custom storage endpoint (MinIO, bucket domain, …); `None` uses the
    /// provider default for the region.
    pub endpoint_url: Option<String>,
    /// Path-style object addressing, required by most custom endpoints.
    pub force_path_style: bool,
    /// Lifetime of minted download links, in seconds (default: 1 hour).
    pub presign_expiry_secs: u64,
    /// Upload size cap, in megabytes (default: 10).
    pub max_upload_size_mb: usize,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("FRESHSCORE_BIND", "0.0.0.0:3000"),
            database_url: env_or("FRESHSCORE_DATABASE_URL", "sqlite://freshscore.db?mode=rwc"),
            log_level: env_or("FRESHSCORE_LOG", "info"),
            log_json: env_flag("FRESHSCORE_LOG_JSON", false),
            enable_swagger: env_flag("FRESHSCORE_ENABLE_SWAGGER", true),
            cors_allowed_origins: std::env::var("FRESHSCORE_CORS_ORIGINS").ok(),
            pool_capacity: parse_env("FRESHSCORE_POOL_CAPACITY", 10),
            model: ModelConfig {
                base_url: env_or("FRESHSCORE_MODEL_BASE_URL", "https://api.openai.com/v1"),
                api_key: env_or("FRESHSCORE_MODEL_API_KEY", ""),
                model: env_or("FRESHSCORE_MODEL_NAME", "gpt-4o"),
            },
            storage: StorageConfig {
                auth_endpoint: env_or(
                    "FRESHSCORE_STORAGE_AUTH_ENDPOINT",
                    "http://localhost:8200/storage/getauth",
                ),
                bucket: env_or("FRESHSCORE_STORAGE_BUCKET", "freshscore"),
                region: env_or("FRESHSCORE_STORAGE_REGION", "ap-shanghai"),
                endpoint_url: std::env::var("FRESHSCORE_STORAGE_ENDPOINT").ok(),
                force_path_style: env_flag("FRESHSCORE_STORAGE_PATH_STYLE", false),
                presign_expiry_secs: parse_env("FRESHSCORE_PRESIGN_EXPIRY_SECS", 3600),
                max_upload_size_mb: parse_env("FRESHSCORE_MAX_UPLOAD_SIZE_MB", 10),
            },
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
