use serde::Serialize;

/// Application-level constants
pub const APP_NAME: &str = "lexpipe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env var overriding the log filter when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "LEXPIPE_LOG";
/// Env var overriding the file size ceiling, in bytes.
pub const MAX_FILE_BYTES_ENV: &str = "LEXPIPE_MAX_FILE_BYTES";
/// Env var overriding the accepted extensions (comma separated).
pub const EXTENSIONS_ENV: &str = "LEXPIPE_EXTENSIONS";

/// 10 MiB
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "txt"];

/// Log filter used when neither `RUST_LOG` nor `LEXPIPE_LOG` is set.
pub fn default_log_filter() -> String {
    if cfg!(debug_assertions) {
        "lexpipe_lib=debug,lexpipe=debug,info".to_string()
    } else {
        "lexpipe_lib=info,lexpipe=info,warn".to_string()
    }
}

/// Runtime settings for the validation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    /// Files larger than this are rejected by the format validator.
    pub max_file_bytes: u64,
    /// Lower-case extensions accepted by the format validator.
    pub supported_extensions: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            supported_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, overridden by `LEXPIPE_MAX_FILE_BYTES` / `LEXPIPE_EXTENSIONS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`] with an injectable variable source.
    /// Invalid values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_FILE_BYTES_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(bytes) if bytes > 0 => config.max_file_bytes = bytes,
                _ => tracing::warn!(
                    var = MAX_FILE_BYTES_ENV,
                    value = %raw,
                    "Ignoring invalid max file size"
                ),
            }
        }

        if let Some(raw) = lookup(EXTENSIONS_ENV) {
            let extensions: Vec<String> = raw
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
            if extensions.is_empty() {
                tracing::warn!(var = EXTENSIONS_ENV, "Ignoring empty extension list");
            } else {
                config.supported_extensions = extensions;
            }
        }

        config
    }
}
