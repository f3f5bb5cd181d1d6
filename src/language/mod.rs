pub mod core;
pub mod formatter;
pub mod selector;

pub use self::core::{WordBank, DEFAULT_LANGUAGE};
pub use selector::{DeckSelector, RandomSelector, Selection, WordSelector};
