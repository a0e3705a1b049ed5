//! Configuration for the profiling service
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/persona/config.toml)
//! 3. Built-in defaults (lowest priority)

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP service to
    pub bind_addr: SocketAddr,

    /// Path to the SQLite database file
    pub db_path: PathBuf,

    /// Ingestion settings (chunking, sampling, truncation)
    pub ingest: IngestConfig,

    /// Classification/generation provider settings
    pub llm: LlmConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8087".parse().unwrap(),
            db_path: PathBuf::from("./data/persona.db"),
            ingest: IngestConfig::default(),
            llm: LlmConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Ingestion and scoring knobs
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Records per chunk when driving the job boundary from the CLI
    pub chunk_size: usize,
    /// Maximum messages sampled per user when building a scoring transcript
    pub sample_limit: usize,
    /// Per-message character cap in the scoring transcript
    pub max_message_chars: usize,
    /// Seconds of inactivity after which a `processing` job can be reaped
    pub stale_job_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            sample_limit: 200,
            max_message_chars: 500,
            stale_job_secs: 3600,
        }
    }
}

impl IngestConfig {
    pub fn stale_job_window(&self) -> Duration {
        Duration::from_secs(self.stale_job_secs)
    }
}

/// Provider settings for the classification and generation calls
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint
    pub base_url: String,
    /// Bearer token; empty for local providers that need none
    pub api_key: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Completion token cap
    pub max_tokens: u32,
    /// Request timeout in seconds (the pipeline imposes no timeout of its own)
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: String::new(),
            model: "llama3.1:8b".to_string(),
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Log file rotation strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LogRotation {
    /// Rotate log files hourly
    Hourly,
    /// Rotate log files daily (default)
    #[default]
    Daily,
    /// Never rotate - single log file
    Never,
}

impl LogRotation {
    /// Parse rotation string from config
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "hourly" => Self::Hourly,
            "never" => Self::Never,
            _ => Self::Daily, // Default to daily for unknown values
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Never => "never",
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Enable file logging (in addition to stdout)
    pub file_enabled: bool,
    /// Directory for log files
    pub file_dir: PathBuf,
    /// Log file rotation strategy
    pub file_rotation: LogRotation,
    /// Prefix for log file names
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false, // Opt-in feature
            file_dir: PathBuf::from("./logs"),
            file_rotation: LogRotation::Daily,
            file_prefix: "persona".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure (subset of Config that makes sense to persist)
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    bind_addr: Option<String>,
    db_path: Option<String>,

    /// Optional [ingest] section
    ingest: Option<FileIngest>,

    /// Optional [llm] section
    llm: Option<FileLlm>,

    /// Optional [logging] section
    logging: Option<FileLogging>,
}

#[derive(Debug, Deserialize, Default)]
struct FileIngest {
    chunk_size: Option<usize>,
    sample_limit: Option<usize>,
    max_message_chars: Option<usize>,
    stale_job_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FileLlm {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FileLogging {
    level: Option<String>,
    file_enabled: Option<bool>,
    file_dir: Option<String>,
    file_rotation: Option<String>,
    file_prefix: Option<String>,
}

impl IngestConfig {
    fn from_file(file: Option<FileIngest>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();
        Self {
            chunk_size: file.chunk_size.unwrap_or(defaults.chunk_size),
            sample_limit: file.sample_limit.unwrap_or(defaults.sample_limit),
            max_message_chars: file.max_message_chars.unwrap_or(defaults.max_message_chars),
            stale_job_secs: file.stale_job_secs.unwrap_or(defaults.stale_job_secs),
        }
    }
}

impl LlmConfig {
    fn from_file(file: Option<FileLlm>, env_api_key: Option<String>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();
        Self {
            base_url: std::env::var("PERSONA_LLM_BASE_URL")
                .ok()
                .or(file.base_url)
                .unwrap_or(defaults.base_url),
            api_key: env_api_key.or(file.api_key).unwrap_or(defaults.api_key),
            model: std::env::var("PERSONA_LLM_MODEL")
                .ok()
                .or(file.model)
                .unwrap_or(defaults.model),
            max_tokens: file.max_tokens.unwrap_or(defaults.max_tokens),
            timeout_secs: file.timeout_secs.unwrap_or(defaults.timeout_secs),
        }
    }
}

impl LoggingConfig {
    fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();
        Self {
            level: file.level.unwrap_or(defaults.level),
            file_enabled: file.file_enabled.unwrap_or(defaults.file_enabled),
            file_dir: file
                .file_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.file_dir),
            file_rotation: file
                .file_rotation
                .map(|s| LogRotation::parse(&s))
                .unwrap_or(defaults.file_rotation),
            file_prefix: file.file_prefix.unwrap_or(defaults.file_prefix),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/persona/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("persona").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    /// Called during startup to help users discover configuration options
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        // Don't overwrite existing config
        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Silently fail - config is optional
            }
        }

        // Write config (ignore errors - config is optional)
        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Load file config if it exists
    ///
    /// A broken config fails fast with a clear error instead of silently
    /// falling back to defaults while the user debugs the wrong thing.
    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Failed to parse configuration file {}", path.display());
                    eprintln!("  Error: {e}");
                    eprintln!("  To reset, run: persona config --reset");
                    std::process::exit(1);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                eprintln!("Cannot read configuration file {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn from_env() -> Self {
        let file = Self::load_file_config();
        let defaults = Self::default();

        // Bind address: env > file > default
        let bind_addr = std::env::var("PERSONA_BIND")
            .ok()
            .or(file.bind_addr)
            .map(|s| s.parse().expect("Invalid bind address"))
            .unwrap_or(defaults.bind_addr);

        // Database path: env > file > default
        let db_path = std::env::var("PERSONA_DB_PATH")
            .ok()
            .or(file.db_path)
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        // Provider API key: env takes precedence over file
        let env_api_key = std::env::var("PERSONA_LLM_API_KEY").ok();

        Self {
            bind_addr,
            db_path,
            ingest: IngestConfig::from_file(file.ingest),
            llm: LlmConfig::from_file(file.llm, env_api_key),
            logging: LoggingConfig::from_file(file.logging),
        }
    }

    /// Render the config as a TOML template (single source of truth for
    /// `ensure_config_exists` and `config --reset`)
    pub fn to_toml(&self) -> String {
        format!(
            r#"# persona configuration
# Values here are overridden by PERSONA_* environment variables.

bind_addr = "{bind}"
db_path = "{db}"

[ingest]
chunk_size = {chunk_size}
sample_limit = {sample_limit}
max_message_chars = {max_message_chars}
stale_job_secs = {stale_job_secs}

[llm]
base_url = "{base_url}"
api_key = "{api_key}"
model = "{model}"
max_tokens = {max_tokens}
timeout_secs = {timeout_secs}

[logging]
level = "{level}"
file_enabled = {file_enabled}
file_dir = "{file_dir}"
file_rotation = "{file_rotation}"
file_prefix = "{file_prefix}"
"#,
            bind = self.bind_addr,
            db = self.db_path.display(),
            chunk_size = self.ingest.chunk_size,
            sample_limit = self.ingest.sample_limit,
            max_message_chars = self.ingest.max_message_chars,
            stale_job_secs = self.ingest.stale_job_secs,
            base_url = self.llm.base_url,
            api_key = self.llm.api_key,
            model = self.llm.model,
            max_tokens = self.llm.max_tokens,
            timeout_secs = self.llm.timeout_secs,
            level = self.logging.level,
            file_enabled = self.logging.file_enabled,
            file_dir = self.logging.file_dir.display(),
            file_rotation = self.logging.file_rotation.as_str(),
            file_prefix = self.logging.file_prefix,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_round_trips() {
        let toml_str = Config::default().to_toml();
        let parsed: FileConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.bind_addr.as_deref(), Some("127.0.0.1:8087"));
        assert_eq!(parsed.ingest.unwrap().chunk_size, Some(500));
        assert_eq!(
            parsed.logging.unwrap().file_rotation.as_deref(),
            Some("daily")
        );
    }

    #[test]
    fn rotation_parse_is_forgiving() {
        assert_eq!(LogRotation::parse("hourly"), LogRotation::Hourly);
        assert_eq!(LogRotation::parse("NEVER"), LogRotation::Never);
        assert_eq!(LogRotation::parse("weekly"), LogRotation::Daily);
    }
}
