use clap::ValueEnum;
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Strategy for drawing the next dictionary word from a flattened word list.
pub trait WordSelector: Send {
    /// Returns `None` only when `words` is empty.
    fn next_word<'w>(&mut self, words: &'w [String], rng: &mut dyn RngCore) -> Option<&'w str>;
}

/// Every draw is independent and uniform; repeats are expected.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl WordSelector for RandomSelector {
    fn next_word<'w>(&mut self, words: &'w [String], rng: &mut dyn RngCore) -> Option<&'w str> {
        words.choose(rng).map(String::as_str)
    }
}

/// Deals the word list like a shuffled deck, reshuffling once it runs out,
/// so every occurrence is used before any repeats.
#[derive(Debug, Default, Clone)]
pub struct DeckSelector {
    deck: Vec<usize>,
    dealt_from: usize,
}

impl DeckSelector {
    fn reshuffle(&mut self, len: usize, rng: &mut dyn RngCore) {
        self.deck = (0..len).collect();
        self.deck.shuffle(rng);
        self.dealt_from = len;
    }
}

impl WordSelector for DeckSelector {
    fn next_word<'w>(&mut self, words: &'w [String], rng: &mut dyn RngCore) -> Option<&'w str> {
        if words.is_empty() {
            return None;
        }
        // a different list invalidates the indices we are holding
        if self.deck.is_empty() || self.dealt_from != words.len() {
            self.reshuffle(words.len(), rng);
        }
        let idx = self.deck.pop()?;
        words.get(idx).map(String::as_str)
    }
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Selection {
    #[default]
    Random,
    Deck,
}

impl Selection {
    pub fn selector(self) -> Box<dyn WordSelector> {
        match self {
            Selection::Random => Box::new(RandomSelector),
            Selection::Deck => Box::new(DeckSelector::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_random_selector_draws_from_list() {
        let list = words(&["alpha", "beta", "gamma"]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut selector = RandomSelector;

        for _ in 0..50 {
            let w = selector.next_word(&list, &mut rng).unwrap();
            assert!(list.iter().any(|l| l == w));
        }
    }

    #[test]
    fn test_selectors_handle_empty_list() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(RandomSelector.next_word(&[], &mut rng).is_none());
        assert!(DeckSelector::default().next_word(&[], &mut rng).is_none());
    }

    #[test]
    fn test_deck_selector_exhausts_before_repeating() {
        let list = words(&["a", "b", "c", "d", "e"]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut selector = DeckSelector::default();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for _ in 0..list.len() * 3 {
            let w = selector.next_word(&list, &mut rng).unwrap();
            *counts.entry(w).or_default() += 1;
        }

        assert_eq!(counts.len(), list.len());
        assert!(counts.values().all(|&c| c == 3));
    }

    #[test]
    fn test_deck_selector_adapts_to_new_list() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut selector = DeckSelector::default();
        let long = words(&["a", "b", "c", "d", "e", "f"]);
        let short = words(&["x"]);

        selector.next_word(&long, &mut rng).unwrap();
        assert_eq!(selector.next_word(&short, &mut rng), Some("x"));
    }

    #[test]
    fn test_selection_display() {
        assert_eq!(Selection::Random.to_string(), "random");
        assert_eq!(Selection::Deck.to_string(), "deck");
        assert_eq!(Selection::default(), Selection::Random);
    }
}
