use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::Result,
    language::{formatter, Selection, WordBank, WordSelector, DEFAULT_LANGUAGE},
};

/// Tokens per refill chunk unless configured otherwise.
pub const DEFAULT_CHUNK_TOKENS: usize = 60;

/// Options a generator is built from. A new generator is created whenever
/// any of these change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub language: String,
    pub punctuation: bool,
    pub numbers: bool,
    #[serde(default)]
    pub selection: Selection,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            punctuation: false,
            numbers: false,
            selection: Selection::Random,
        }
    }
}

/// Produces practice text in chunks, indefinitely. Holds no reference to any
/// session: every chunk is drawn fresh and no position is tracked.
pub struct TextGenerator {
    config: GeneratorConfig,
    words: Vec<String>,
    selector: Box<dyn WordSelector>,
    rng: StdRng,
}

impl TextGenerator {
    /// Fails with [`crate::error::TmtError::UnknownLanguage`] when the
    /// configured language has no word bank.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let bank = WordBank::load(&config.language)?;
        Ok(Self::from_bank(config, bank, StdRng::from_entropy()))
    }

    /// Same as [`TextGenerator::new`] but falls back to the default language.
    pub fn new_or_default(config: GeneratorConfig) -> Result<Self> {
        let bank = WordBank::load_or_default(&config.language)?;
        Ok(Self::from_bank(config, bank, StdRng::from_entropy()))
    }

    /// Deterministic generator, for reproducible text.
    pub fn with_seed(config: GeneratorConfig, seed: u64) -> Result<Self> {
        let bank = WordBank::load(&config.language)?;
        Ok(Self::from_bank(config, bank, StdRng::seed_from_u64(seed)))
    }

    fn from_bank(mut config: GeneratorConfig, bank: WordBank, rng: StdRng) -> Self {
        config.language = bank.name.clone();
        let words = bank.words();
        debug!(language = %config.language, words = words.len(), selection = %config.selection, "text generator ready");
        Self {
            selector: config.selection.selector(),
            config,
            words,
            rng,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn next_token(&mut self) -> String {
        let mut token = if self.config.numbers && self.rng.gen_bool(formatter::NUMBER_PROBABILITY) {
            formatter::number_token(&mut self.rng)
        } else {
            self.selector
                .next_word(&self.words, &mut self.rng)
                .unwrap_or_default()
                .to_string()
        };

        if self.config.punctuation {
            if let Some(mark) = formatter::maybe_punctuation(&mut self.rng) {
                token.push(mark);
            }
        }

        token
    }

    /// Exactly `tokens` space-separated tokens followed by one trailing space,
    /// so consecutive chunks concatenate cleanly.
    pub fn next_chunk(&mut self, tokens: usize) -> String {
        if tokens == 0 {
            return String::new();
        }

        let text = (0..tokens).map(|_| self.next_token()).join(" ");
        let mut chunk = formatter::maybe_sentence_case(text, &mut self.rng);
        chunk.push(' ');
        chunk
    }

    /// A single chunk without the trailing separator.
    pub fn paragraph(&mut self, tokens: usize) -> String {
        self.next_chunk(tokens).trim_end().to_string()
    }
}

/// Pull interface the scorer refills from. Implementations may fail; callers
/// treat a failure like an empty refill.
pub trait TextSupplier: Send {
    fn supply_more(&mut self) -> Result<String>;
}

/// Supplies fixed-size chunks from a [`TextGenerator`].
pub struct ChunkSupplier {
    generator: TextGenerator,
    tokens_per_chunk: usize,
}

impl ChunkSupplier {
    pub fn new(generator: TextGenerator, tokens_per_chunk: usize) -> Self {
        Self {
            generator,
            tokens_per_chunk,
        }
    }
}

impl TextSupplier for ChunkSupplier {
    fn supply_more(&mut self) -> Result<String> {
        Ok(self.generator.next_chunk(self.tokens_per_chunk))
    }
}
