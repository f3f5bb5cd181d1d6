use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::app_dirs::AppDirs;
use crate::error::Result;
use crate::language::{Selection, DEFAULT_LANGUAGE};
use crate::session::{self, Mode, SessionConfig, DEFAULT_PRELOAD_THRESHOLD};
use crate::word_generator::{GeneratorConfig, DEFAULT_CHUNK_TOKENS};

/// Persisted user preferences. Missing fields take their defaults so older
/// files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub duration_secs: u32,
    pub mode: Mode,
    pub language: String,
    pub punctuation: bool,
    pub numbers: bool,
    pub selection: Selection,
    pub preload_threshold: usize,
    pub chunk_tokens: usize,
    pub user_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            duration_secs: 60,
            mode: Mode::Classic,
            language: DEFAULT_LANGUAGE.to_string(),
            punctuation: false,
            numbers: false,
            selection: Selection::Random,
            preload_threshold: DEFAULT_PRELOAD_THRESHOLD,
            chunk_tokens: DEFAULT_CHUNK_TOKENS,
            user_id: None,
        }
    }
}

impl Config {
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            language: self.language.clone(),
            punctuation: self.punctuation,
            numbers: self.numbers,
            selection: self.selection,
        }
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        let duration = session::validate_duration(self.duration_secs)?;
        Ok(SessionConfig::new(duration, self.mode)?.with_preload_threshold(self.preload_threshold))
    }

    /// Words per generated chunk. Zero would never produce text, so it
    /// falls back to the default.
    pub fn tokens_per_chunk(&self) -> usize {
        if self.chunk_tokens == 0 {
            warn!(fallback = DEFAULT_CHUNK_TOKENS, "chunk_tokens must be positive");
            return DEFAULT_CHUNK_TOKENS;
        }
        self.chunk_tokens
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %self.path.display(), %err, "no config file, using defaults");
                return Config::default();
            }
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "malformed config, using defaults");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TmtError;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("nested").join("config.json"));
        let cfg = Config {
            duration_secs: 15,
            mode: Mode::Competitive,
            language: "spanish".into(),
            punctuation: true,
            numbers: true,
            selection: Selection::Deck,
            preload_threshold: 40,
            chunk_tokens: 30,
            user_id: Some("ada".into()),
        };
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn missing_or_broken_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), Config::default());

        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{ "mode": "competitive", "duration_secs": 30 }"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.mode, Mode::Competitive);
        assert_eq!(cfg.duration_secs, 30);
        assert_eq!(cfg.language, "english");
        assert_eq!(cfg.chunk_tokens, DEFAULT_CHUNK_TOKENS);
    }

    #[test]
    fn session_config_rejects_bad_duration() {
        let cfg = Config {
            duration_secs: 42,
            ..Config::default()
        };
        assert_matches!(cfg.session_config(), Err(TmtError::InvalidDuration(42)));

        let ok = Config {
            preload_threshold: 10,
            ..Config::default()
        };
        let session = ok.session_config().unwrap();
        assert_eq!(session.duration_secs, 60);
        assert_eq!(session.preload_threshold, 10);
    }

    #[test]
    fn zero_chunk_tokens_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{ "chunk_tokens": 0 }"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.chunk_tokens, 0);
        assert_eq!(cfg.tokens_per_chunk(), DEFAULT_CHUNK_TOKENS);

        let custom = Config {
            chunk_tokens: 12,
            ..Config::default()
        };
        assert_eq!(custom.tokens_per_chunk(), 12);
    }

    #[test]
    fn generator_config_mirrors_settings() {
        let cfg = Config {
            language: "urdu".into(),
            numbers: true,
            ..Config::default()
        };
        let gen = cfg.generator_config();
        assert_eq!(gen.language, "urdu");
        assert!(gen.numbers);
        assert!(!gen.punctuation);
    }
}
