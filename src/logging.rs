//! Tracing setup. The terminal belongs to the TUI, so events go to a file.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app_dirs::AppDirs;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    /// `None` disables logging entirely.
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            log_file: AppDirs::log_path(),
        }
    }
}

impl LogConfig {
    /// 0 = warn, 1 = info, 2 = debug, 3+ = trace.
    pub fn from_verbosity(verbosity: u8) -> Self {
        Self {
            level: level_for(verbosity),
            ..Self::default()
        }
    }

    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.log_file = path;
        }
        self
    }
}

pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// `RUST_LOG` wins over the verbosity-derived default.
fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("tmt={}", level.as_str().to_lowercase())))
}

/// Install the global subscriber. Returns false when no log file could be
/// opened or a subscriber was already installed; the app runs either way.
pub fn init_logging(config: &LogConfig) -> bool {
    let Some(path) = &config.log_file else {
        return false;
    };
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return false;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(path) else {
        return false;
    };

    let layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(build_env_filter(config.level))
        .with(layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0), Level::WARN);
        assert_eq!(level_for(1), Level::INFO);
        assert_eq!(level_for(2), Level::DEBUG);
        assert_eq!(level_for(3), Level::TRACE);
        assert_eq!(level_for(9), Level::TRACE);
    }

    #[test]
    fn explicit_log_file_overrides_default() {
        let cfg = LogConfig::from_verbosity(1).with_log_file(Some(PathBuf::from("/tmp/x.log")));
        assert_eq!(cfg.level, Level::INFO);
        assert_eq!(cfg.log_file, Some(PathBuf::from("/tmp/x.log")));
    }

    #[test]
    fn disabled_logging_installs_nothing() {
        let cfg = LogConfig {
            level: Level::INFO,
            log_file: None,
        };
        assert!(!init_logging(&cfg));
    }
}
