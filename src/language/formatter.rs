use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

/// Chance that a token is replaced by a numeric token when numbers are on.
pub const NUMBER_PROBABILITY: f64 = 0.10;
/// Chance that a token gets a trailing punctuation mark when punctuation is on.
pub const PUNCTUATION_PROBABILITY: f64 = 0.18;
/// Share of punctuated tokens that get a comma or period.
pub const SOFT_PUNCTUATION_SHARE: f64 = 0.6;
/// Chance that a whole chunk is sentence-cased.
pub const SENTENCE_CASE_PROBABILITY: f64 = 0.5;

const SOFT_PUNCTUATION: [char; 2] = [',', '.'];
const HARD_PUNCTUATION: [char; 5] = ['!', '?', ';', ':', '—'];
const SENTENCE_ENDINGS: [char; 3] = ['.', '!', '?'];

/// A token of 1 to 4 random digits.
pub fn number_token(rng: &mut dyn RngCore) -> String {
    let len = rng.gen_range(1..=4);
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Punctuation mark to append to a token, if any.
pub fn maybe_punctuation(rng: &mut dyn RngCore) -> Option<char> {
    if !rng.gen_bool(PUNCTUATION_PROBABILITY) {
        return None;
    }
    let pool: &[char] = if rng.gen_bool(SOFT_PUNCTUATION_SHARE) {
        &SOFT_PUNCTUATION
    } else {
        &HARD_PUNCTUATION
    };
    pool.choose(rng).copied()
}

/// Capitalize the first character and close the text with a sentence ending
/// unless it already has one.
pub fn sentence_case(text: &str) -> String {
    let mut chars = text.chars();
    let mut out = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => return String::new(),
    };
    if !out.ends_with(&SENTENCE_ENDINGS[..]) {
        out.push('.');
    }
    out
}

/// Per-chunk coin flip between the text as-is and [`sentence_case`].
pub fn maybe_sentence_case(text: String, rng: &mut dyn RngCore) -> String {
    if rng.gen_bool(SENTENCE_CASE_PROBABILITY) {
        sentence_case(&text)
    } else {
        text
    }
}
