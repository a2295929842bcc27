use std::env;
use std::time::Duration;

/// Process-wide configuration, read once at startup and threaded through
/// the registry, runner and pipeline by reference.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen: String,

    pub compilation_cache_ttl: Duration,
    pub shared_code_ttl: Duration,

    pub search_go_path: bool,
    pub search_sdk_path: bool,
    pub local_compilers: Vec<String>,
    pub additional_architectures: bool,
    pub enable_modules: bool,

    pub cache_enabled: bool,

    pub data_dir: String,
    pub max_source_size: usize,
    pub compile_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            listen: env::var("GOCE_LISTEN").unwrap_or_else(|_| ":9000".to_string()),
            compilation_cache_ttl: env::var("GOCE_COMPILATION_CACHE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(2 * 3600)),
            shared_code_ttl: env::var("GOCE_SHARED_CODE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(24 * 3600)),
            search_go_path: env::var("GOCE_COMPILERS_SEARCH_GO_PATH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            search_sdk_path: env::var("GOCE_COMPILERS_SEARCH_SDK_PATH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            local_compilers: env::var("GOCE_COMPILERS_LOCAL_COMPILERS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            additional_architectures: env::var("GOCE_COMPILERS_ADDITIONAL_ARCHITECTURES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            enable_modules: env::var("GOCE_COMPILERS_ENABLE_MODULES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            cache_enabled: env::var("GOCE_CACHE_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            data_dir: env::var("GOCE_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            max_source_size: env::var("GOCE_MAX_SOURCE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(64 * 1024),
            compile_timeout: env::var("GOCE_COMPILE_TIMEOUT_SEC")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(30)),
        }
    }
}
