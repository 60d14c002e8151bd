use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::labeling::strategy::StrategyConfig;

/// Application-level constants
pub const APP_NAME: &str = "Autolabel";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5050";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "autolabel=info,tower_http=info"
}

/// Get the application data directory (~/Autolabel/).
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default database location under the application data directory.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("autolabel.db")
}

/// Settings for the external classifier adapter.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 4000,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Full process configuration, assembled from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub classifier: ClassifierConfig,
    pub strategy: StrategyConfig,
}

impl AppConfig {
    /// Read configuration from `AUTOLABEL_*` and `OPENAI_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (env in production, maps in tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = StrategyConfig::default();
        let fallback_addr = SocketAddr::from(([127, 0, 0, 1], 5050));

        let bind_addr = parse_or(
            &lookup,
            "AUTOLABEL_BIND_ADDR",
            DEFAULT_BIND_ADDR.parse().unwrap_or(fallback_addr),
        );

        let database_path = lookup("AUTOLABEL_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        let classifier = ClassifierConfig {
            base_url: lookup("OPENAI_BASE_URL")
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            model: lookup("AUTOLABEL_MODEL")
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout_secs: parse_or(
                &lookup,
                "AUTOLABEL_CLASSIFIER_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            ),
            ..ClassifierConfig::default()
        };

        let strategy = StrategyConfig {
            single_threshold: parse_or(
                &lookup,
                "AUTOLABEL_SINGLE_THRESHOLD",
                defaults.single_threshold,
            ),
            sequential_threshold: parse_or(
                &lookup,
                "AUTOLABEL_SEQUENTIAL_THRESHOLD",
                defaults.sequential_threshold,
            ),
            sequential_batch_size: parse_or(
                &lookup,
                "AUTOLABEL_SEQUENTIAL_BATCH_SIZE",
                defaults.sequential_batch_size,
            ),
            parallel_batch_size: parse_or(
                &lookup,
                "AUTOLABEL_PARALLEL_BATCH_SIZE",
                defaults.parallel_batch_size,
            ),
            parallel_concurrency: parse_or(
                &lookup,
                "AUTOLABEL_PARALLEL_CONCURRENCY",
                defaults.parallel_concurrency,
            ),
        }
        .sanitized();

        Self {
            bind_addr,
            database_path,
            classifier,
            strategy,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
                default
            }
        },
    }
}
