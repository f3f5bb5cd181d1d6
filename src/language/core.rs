use include_dir::{include_dir, Dir};
use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, TmtError};

static LANG_DIR: Dir = include_dir!("src/lang");

/// Language used whenever a requested bank is missing.
pub const DEFAULT_LANGUAGE: &str = "english";

/// Sample sentences for one language, embedded at compile time and never mutated.
#[derive(Deserialize, Clone, Debug)]
pub struct WordBank {
    pub name: String,
    pub sentences: Vec<String>,
}

impl WordBank {
    /// Look up a registered bank by language name.
    pub fn load(name: &str) -> Result<Self> {
        let file = LANG_DIR
            .get_file(format!("{name}.json"))
            .ok_or_else(|| TmtError::UnknownLanguage(name.to_string()))?;

        let contents = file.contents_utf8().ok_or_else(|| TmtError::WordBank {
            name: name.to_string(),
            reason: "file is not valid utf-8".to_string(),
        })?;

        let bank: WordBank = serde_json::from_str(contents)?;
        if bank.words().is_empty() {
            return Err(TmtError::WordBank {
                name: name.to_string(),
                reason: "bank has no words".to_string(),
            });
        }

        Ok(bank)
    }

    /// Like [`WordBank::load`], but an unknown language falls back to
    /// [`DEFAULT_LANGUAGE`] instead of failing.
    pub fn load_or_default(name: &str) -> Result<Self> {
        match Self::load(name) {
            Err(TmtError::UnknownLanguage(missing)) => {
                warn!(language = %missing, fallback = DEFAULT_LANGUAGE, "unknown language, using default word bank");
                Self::load(DEFAULT_LANGUAGE)
            }
            other => other,
        }
    }

    /// Names of every embedded bank, sorted.
    pub fn available() -> Vec<String> {
        let mut names: Vec<String> = LANG_DIR
            .files()
            .filter(|f| f.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|f| f.path().file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Flat word list: every whitespace-separated token of every sentence,
    /// in order, repeats included.
    pub fn words(&self) -> Vec<String> {
        self.sentences
            .iter()
            .flat_map(|s| s.split_whitespace())
            .map(str::to_string)
            .collect()
    }
}
