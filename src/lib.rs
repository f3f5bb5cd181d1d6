// Library surface for headless/integration tests and reuse.
// The binary in main.rs only adds the CLI and terminal loop.
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod history;
pub mod language;
pub mod logging;
pub mod metrics;
pub mod refill;
pub mod runtime;
pub mod scorer;
pub mod session;
pub mod typing_policy;
pub mod ui;
pub mod word_generator;
