use clap::{error::ErrorKind, ArgAction, CommandFactory, Parser, ValueEnum};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    fs::File,
    io::{self, stdin},
    path::PathBuf,
    time::Instant,
};
use tracing::{info, warn};

use tmt::{
    config::{Config, ConfigStore, FileConfigStore},
    history::{export_csv, HistoryDb, HistoryRecorder, PersonalBest, ResultSink},
    language::Selection,
    logging::{self, LogConfig},
    refill::{RefillRequest, RefillResponse, RefillWorker},
    runtime::{AppEvent, ClockSubscription, CrosstermEventSource, EventSource, FixedTicker, Runner},
    scorer::Scorer,
    session::{self, Key, KeystrokeResult, Mode, SessionEvent, SessionResult},
    ui::{SessionView, PENALTY_FLASH},
    word_generator::{ChunkSupplier, TextGenerator},
};

/// endless typing practice with live wpm, a competitive penalty mode and personal bests
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "An endless-stream typing trainer. Text keeps coming until the clock runs out; classic mode lets you correct mistakes, competitive mode charges half a second per backspace."
)]
pub struct Cli {
    /// session length in seconds (15, 30, 60 or 120)
    #[clap(short = 's', long, value_parser = parse_duration)]
    duration: Option<u32>,

    /// scoring mode
    #[clap(short = 'm', long, value_enum)]
    mode: Option<Mode>,

    /// language to pull words from
    #[clap(short = 'l', long, value_enum)]
    language: Option<SupportedLanguage>,

    /// sprinkle punctuation after words
    #[clap(short = 'p', long)]
    punctuation: bool,

    /// turn punctuation off even if the config file enables it
    #[clap(long, conflicts_with = "punctuation")]
    no_punctuation: bool,

    /// mix number tokens into the text
    #[clap(short = 'n', long)]
    numbers: bool,

    /// turn numbers off even if the config file enables them
    #[clap(long, conflicts_with = "numbers")]
    no_numbers: bool,

    /// how words are drawn from the bank
    #[clap(long, value_enum)]
    selection: Option<Selection>,

    /// user id personal bests are kept under
    #[clap(short = 'u', long)]
    user: Option<String>,

    /// write the effective settings back to the config file
    #[clap(long)]
    save: bool,

    /// config file to use instead of the default location
    #[clap(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// print a summary of past sessions and exit
    #[clap(long)]
    history: bool,

    /// write past sessions as CSV and exit
    #[clap(long, value_name = "PATH")]
    export_csv: Option<PathBuf>,

    /// update personal bests from local history and exit
    #[clap(long)]
    sync_bests: bool,

    /// delete all stored sessions and exit
    #[clap(long)]
    clear_history: bool,

    /// more log output (-v info, -vv debug, -vvv trace)
    #[clap(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// log file (defaults to the state directory)
    #[clap(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SupportedLanguage {
    English,
    Urdu,
    Spanish,
}

fn parse_duration(raw: &str) -> Result<u32, String> {
    let secs: u32 = raw.parse().map_err(|_| format!("`{raw}` is not a number of seconds"))?;
    session::validate_duration(secs).map_err(|err| err.to_string())
}

impl Cli {
    /// Overlay command line flags on the stored configuration.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(duration) = self.duration {
            config.duration_secs = duration;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(language) = self.language {
            config.language = language.to_string();
        }
        if let Some(selection) = self.selection {
            config.selection = selection;
        }
        if self.user.is_some() {
            config.user_id = self.user.clone();
        }
        if self.punctuation || self.no_punctuation {
            config.punctuation = self.punctuation;
        }
        if self.numbers || self.no_numbers {
            config.numbers = self.numbers;
        }
        config
    }

    fn wants_history_command(&self) -> bool {
        self.history || self.export_csv.is_some() || self.sync_bests || self.clear_history
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct App {
    config: Config,
    generator: TextGenerator,
    scorer: Scorer,
    /// First chunk of the current text, kept for retries.
    opening: String,
    clock: Option<ClockSubscription>,
    refills: RefillWorker,
    recorder: Option<HistoryRecorder>,
    last_result: Option<SessionResult>,
    best: Option<PersonalBest>,
    penalty_flash_until: Option<Instant>,
}

impl App {
    pub fn new(config: Config, refills: RefillWorker, recorder: Option<HistoryRecorder>) -> tmt::error::Result<Self> {
        let mut generator = TextGenerator::new_or_default(config.generator_config())?;
        let opening = generator.next_chunk(config.tokens_per_chunk());
        let scorer = Scorer::new(&opening, config.session_config()?);

        Ok(Self {
            config,
            generator,
            scorer,
            opening,
            clock: None,
            refills,
            recorder,
            last_result: None,
            best: None,
            penalty_flash_until: None,
        })
    }

    fn handle(&mut self, event: AppEvent, now: Instant) -> Flow {
        match event {
            AppEvent::Key(key) => return self.on_key(key, now),
            AppEvent::Tick => self.on_tick(now),
            AppEvent::Refill(response) => self.on_refill(response),
            AppEvent::Resize => {}
        }
        Flow::Continue
    }

    fn on_key(&mut self, key: KeyEvent, now: Instant) -> Flow {
        if key.kind != KeyEventKind::Press {
            return Flow::Continue;
        }
        let ctrl_c = key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
        if ctrl_c || key.code == KeyCode::Esc {
            return Flow::Quit;
        }

        if self.scorer.has_ended() {
            match key.code {
                KeyCode::Char('r') => self.retry(),
                KeyCode::Char('n') => self.new_text(),
                _ => {}
            }
            return Flow::Continue;
        }

        let result = self.scorer.handle_keystroke_at(Key::from(key), now);
        self.absorb(result, now);
        Flow::Continue
    }

    fn absorb(&mut self, result: KeystrokeResult, now: Instant) {
        if let Some(request) = result.refill {
            self.request_refill(request);
        }
        self.on_session_events(result.events, now);
    }

    fn request_refill(&self, request: RefillRequest) {
        self.refills.request(request);
    }

    fn on_tick(&mut self, now: Instant) {
        if let Some(subscription) = self.clock.clone() {
            let events = self.scorer.on_tick(&subscription, now);
            self.on_session_events(events, now);
        }
        if self.penalty_flash_until.is_some_and(|until| now >= until) {
            self.penalty_flash_until = None;
        }
    }

    fn on_refill(&mut self, response: RefillResponse) {
        self.scorer.apply_refill(response);
    }

    fn on_session_events(&mut self, events: Vec<SessionEvent>, now: Instant) {
        for event in events {
            match event {
                SessionEvent::FocusStart => self.clock = self.scorer.subscribe_clock(),
                SessionEvent::Penalty { .. } => self.penalty_flash_until = Some(now + PENALTY_FLASH),
                SessionEvent::FocusEnd => {
                    self.clock = None;
                    self.penalty_flash_until = None;
                }
                SessionEvent::Completed(result) => self.complete(result),
            }
        }
    }

    fn complete(&mut self, result: SessionResult) {
        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(err) = recorder.submit(&result) {
                warn!(%err, "could not store session result");
            }
            self.best = self.config.user_id.as_deref().and_then(|user| {
                recorder
                    .db()
                    .personal_best(user, result.duration, result.mode)
                    .unwrap_or_else(|err| {
                        warn!(%err, "could not read personal best");
                        None
                    })
            });
        }
        self.last_result = Some(result);
    }

    /// Same text again from the top.
    fn retry(&mut self) {
        self.restart(self.opening.clone());
    }

    fn new_text(&mut self) {
        let opening = self.generator.next_chunk(self.config.tokens_per_chunk());
        self.restart(opening);
    }

    fn restart(&mut self, opening: String) {
        self.clock = None;
        self.last_result = None;
        self.best = None;
        self.penalty_flash_until = None;
        self.scorer.reset(&opening);
        self.opening = opening;
    }

    fn view(&self, now: Instant) -> SessionView<'_> {
        SessionView {
            scorer: &self.scorer,
            now,
            penalty_flash: self.penalty_flash_until.is_some(),
            result: self.last_result.as_ref(),
            best: self.best.as_ref(),
        }
    }
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app.view(Instant::now()), f.area());
}

fn run_history_commands(cli: &Cli, config: &Config) -> Result<(), Box<dyn Error>> {
    let db = HistoryDb::open()?;

    if cli.sync_bests {
        let Some(user) = config.user_id.as_deref() else {
            let mut cmd = Cli::command();
            cmd.error(ErrorKind::MissingRequiredArgument, "--sync-bests needs a user (--user or user_id in the config)")
                .exit();
        };
        let synced = db.sync_personal_bests(user)?;
        println!("updated {synced} personal best(s) for {user}");
    }

    if let Some(path) = &cli.export_csv {
        let records = db.records(None)?;
        export_csv(&records, File::create(path)?)?;
        println!("exported {} session(s) to {}", records.len(), path.display());
    }

    if cli.history {
        match db.summary(cli.duration)? {
            Some(summary) => {
                println!(
                    "best {:.0} wpm | best {:.0}% acc | avg {:.0} wpm (sd {:.1}) | {} words | {} tests",
                    summary.best_wpm,
                    summary.best_accuracy,
                    summary.avg_wpm,
                    summary.wpm_std_dev,
                    summary.total_words,
                    summary.total_tests
                );
                for record in db.recent(10)? {
                    println!(
                        "{}  {:>4.0} wpm  {:>3.0}%  {:>3}s {:<11} {}",
                        record.recorded_at.format("%Y-%m-%d %H:%M"),
                        record.wpm,
                        record.accuracy,
                        record.duration,
                        record.mode,
                        record.language
                    );
                }
            }
            None => println!("no sessions recorded yet"),
        }
    }

    if cli.clear_history {
        let removed = db.clear()?;
        println!("removed {removed} session(s)");
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let store = cli
        .config
        .as_ref()
        .map(FileConfigStore::with_path)
        .unwrap_or_default();
    let config = cli.apply(store.load());

    logging::init_logging(&LogConfig::from_verbosity(cli.verbose).with_log_file(cli.log_file.clone()));

    if cli.save {
        store.save(&config)?;
        info!(path = %store.path().display(), "settings saved");
    }

    if cli.wants_history_command() {
        return run_history_commands(&cli, &config);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let events = CrosstermEventSource::new();
    let refill_tx = events.sender();
    let supplier = ChunkSupplier::new(
        TextGenerator::new_or_default(config.generator_config())?,
        config.tokens_per_chunk(),
    );
    let refills = RefillWorker::spawn(Box::new(supplier), move |response| {
        refill_tx.send(AppEvent::Refill(response)).is_ok()
    });

    let recorder = match HistoryDb::open() {
        Ok(db) => Some(HistoryRecorder::new(db, config.user_id.clone(), config.language.clone())),
        Err(err) => {
            warn!(%err, "history unavailable, results will not be stored");
            None
        }
    };

    let mut app = App::new(config, refills, recorder)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = start_tui(&mut terminal, &mut app, Runner::new(events, FixedTicker::default()));

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    outcome
}

fn start_tui<B: Backend, E: EventSource>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: Runner<E, FixedTicker>,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| ui(app, f))?;

    loop {
        let event = runner.step();
        let redraw = !matches!(event, AppEvent::Tick) || app.scorer.is_running() || app.penalty_flash_until.is_some();

        if app.handle(event, Instant::now()) == Flow::Quit {
            break;
        }
        if redraw {
            terminal.draw(|f| ui(app, f))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use tmt::language::WordBank;

    fn press(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn app_with(config: Config) -> (App, mpsc::Receiver<RefillResponse>) {
        let (tx, rx) = mpsc::channel();
        let supplier = ChunkSupplier::new(TextGenerator::with_seed(config.generator_config(), 7).unwrap(), 10);
        let refills = RefillWorker::spawn(Box::new(supplier), move |r| tx.send(r).is_ok());
        let recorder = HistoryRecorder::new(HistoryDb::in_memory().unwrap(), config.user_id.clone(), "english");
        (App::new(config, refills, Some(recorder)).unwrap(), rx)
    }

    fn type_expected(app: &mut App, count: usize, now: Instant) {
        for _ in 0..count {
            let c = app.scorer.buffer()[app.scorer.cursor()];
            app.handle(AppEvent::Key(press(c)), now);
        }
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["tmt"]);

        assert_eq!(cli.duration, None);
        assert_eq!(cli.mode, None);
        assert_eq!(cli.language, None);
        assert!(!cli.punctuation);
        assert!(!cli.numbers);
        assert_eq!(cli.verbose, 0);
        assert!(!cli.wants_history_command());
    }

    #[test]
    fn test_cli_duration_is_validated() {
        let cli = Cli::parse_from(["tmt", "-s", "30"]);
        assert_eq!(cli.duration, Some(30));

        assert!(Cli::try_parse_from(["tmt", "-s", "45"]).is_err());
        assert!(Cli::try_parse_from(["tmt", "--duration", "soon"]).is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "tmt", "-m", "competitive", "-l", "urdu", "-p", "-n", "--selection", "deck", "-u", "ada", "-vv",
        ]);
        assert_eq!(cli.mode, Some(Mode::Competitive));
        assert_eq!(cli.language, Some(SupportedLanguage::Urdu));
        assert!(cli.punctuation);
        assert!(cli.numbers);
        assert_eq!(cli.selection, Some(Selection::Deck));
        assert_eq!(cli.user.as_deref(), Some("ada"));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_overrides_config() {
        let stored = Config {
            duration_secs: 120,
            punctuation: true,
            ..Config::default()
        };
        let cli = Cli::parse_from(["tmt", "-s", "15", "-l", "spanish"]);
        let config = cli.apply(stored);

        assert_eq!(config.duration_secs, 15);
        assert_eq!(config.language, "spanish");
        assert!(config.punctuation);
        assert_eq!(config.mode, Mode::Classic);
    }

    #[test]
    fn test_cli_can_switch_saved_toggles_off() {
        let stored = Config {
            punctuation: true,
            numbers: true,
            ..Config::default()
        };

        let config = Cli::parse_from(["tmt", "--no-punctuation", "--no-numbers"]).apply(stored.clone());
        assert!(!config.punctuation);
        assert!(!config.numbers);

        let config = Cli::parse_from(["tmt", "--no-numbers"]).apply(stored);
        assert!(config.punctuation);
        assert!(!config.numbers);

        let config = Cli::parse_from(["tmt", "-p"]).apply(Config::default());
        assert!(config.punctuation);

        assert!(Cli::try_parse_from(["tmt", "-p", "--no-punctuation"]).is_err());
    }

    #[test]
    fn test_history_flags() {
        assert!(Cli::parse_from(["tmt", "--history"]).wants_history_command());
        assert!(Cli::parse_from(["tmt", "--export-csv", "out.csv"]).wants_history_command());
        assert!(Cli::parse_from(["tmt", "--sync-bests"]).wants_history_command());
    }

    #[test]
    fn test_every_supported_language_has_a_bank() {
        for language in SupportedLanguage::value_variants() {
            assert!(WordBank::load(&language.to_string()).is_ok(), "{language}");
        }
    }

    #[test]
    fn test_app_starts_idle_with_text() {
        let (app, _rx) = app_with(Config::default());
        assert!(!app.scorer.has_started());
        assert!(app.scorer.text().ends_with(' '));
        assert!(app.clock.is_none());
    }

    #[test]
    fn test_first_key_subscribes_clock() {
        let (mut app, _rx) = app_with(Config::default());
        app.handle(AppEvent::Key(press('?')), Instant::now());

        assert!(app.scorer.is_running());
        assert!(app.clock.is_some());
    }

    #[test]
    fn test_session_ends_on_tick_and_records() {
        let (mut app, _rx) = app_with(Config {
            duration_secs: 15,
            user_id: Some("ada".into()),
            ..Config::default()
        });
        let start = Instant::now();
        type_expected(&mut app, 10, start);

        app.handle(AppEvent::Tick, start + Duration::from_secs(15));

        assert!(app.scorer.has_ended());
        assert!(app.clock.is_none());
        let result = app.last_result.clone().unwrap();
        assert_eq!(result.hits, 10);
        assert_eq!(result.duration, 15);

        let recorder = app.recorder.as_ref().unwrap();
        assert_eq!(recorder.db().records(None).unwrap().len(), 1);
        assert_eq!(app.best.as_ref().map(|b| b.best_wpm), Some(result.wpm));
    }

    #[test]
    fn test_retry_and_new_after_end() {
        let (mut app, _rx) = app_with(Config {
            duration_secs: 15,
            ..Config::default()
        });
        let start = Instant::now();
        let opening = app.scorer.text();
        type_expected(&mut app, 3, start);
        app.handle(AppEvent::Tick, start + Duration::from_secs(20));
        assert!(app.scorer.has_ended());

        // typing keys do nothing on the results screen
        app.handle(AppEvent::Key(press('x')), start + Duration::from_secs(21));
        assert!(app.last_result.is_some());

        app.handle(AppEvent::Key(press('r')), start + Duration::from_secs(22));
        assert!(!app.scorer.has_started());
        assert_eq!(app.scorer.text(), opening);
        assert!(app.last_result.is_none());

        app.handle(AppEvent::Tick, start + Duration::from_secs(23));
        app.handle(AppEvent::Key(press('a')), start + Duration::from_secs(24));
        app.handle(AppEvent::Tick, start + Duration::from_secs(40));
        app.handle(AppEvent::Key(press('n')), start + Duration::from_secs(41));
        assert!(!app.scorer.has_started());
        assert_eq!(app.scorer.generation(), 2);
    }

    #[test]
    fn test_refills_flow_through_worker() {
        let (mut app, rx) = app_with(Config {
            chunk_tokens: 5,
            ..Config::default()
        });
        let before = app.scorer.buffer().len();
        type_expected(&mut app, 1, Instant::now());
        assert!(app.scorer.refill_in_flight());

        let response = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        app.handle(AppEvent::Refill(response), Instant::now());

        assert!(app.scorer.buffer().len() > before);
        assert_eq!(app.scorer.marks().len(), app.scorer.buffer().len());
    }

    #[test]
    fn test_stale_refill_ignored_after_new_text() {
        let (mut app, rx) = app_with(Config {
            chunk_tokens: 5,
            duration_secs: 15,
            ..Config::default()
        });
        let start = Instant::now();
        type_expected(&mut app, 1, start);
        let response = rx.recv_timeout(Duration::from_secs(2)).unwrap();

        app.handle(AppEvent::Tick, start + Duration::from_secs(15));
        app.handle(AppEvent::Key(press('n')), start + Duration::from_secs(16));
        let fresh = app.scorer.text();

        app.handle(AppEvent::Refill(response), start + Duration::from_secs(17));
        assert_eq!(app.scorer.text(), fresh);
    }

    #[test]
    fn test_competitive_penalty_flash() {
        let (mut app, _rx) = app_with(Config {
            mode: Mode::Competitive,
            ..Config::default()
        });
        let start = Instant::now();
        type_expected(&mut app, 1, start);
        app.handle(AppEvent::Key(KeyEvent::new(KeyCode::Backspace, KeyModifiers::NONE)), start);

        assert_eq!(app.scorer.penalty_ms(), 500);
        assert!(app.penalty_flash_until.is_some());

        app.handle(AppEvent::Tick, start + PENALTY_FLASH);
        assert!(app.penalty_flash_until.is_none());
    }

    #[test]
    fn test_escape_and_ctrl_c_quit() {
        let (mut app, _rx) = app_with(Config::default());
        let now = Instant::now();
        assert_eq!(
            app.handle(AppEvent::Key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)), now),
            Flow::Quit
        );
        assert_eq!(
            app.handle(AppEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)), now),
            Flow::Quit
        );
        assert_eq!(app.handle(AppEvent::Resize, now), Flow::Continue);
    }

    #[test]
    fn test_view_renders() {
        let (app, _rx) = app_with(Config::default());
        let area = ratatui::layout::Rect::new(0, 0, 80, 24);
        let mut buffer = ratatui::buffer::Buffer::empty(area);
        ratatui::widgets::Widget::render(app.view(Instant::now()), area, &mut buffer);

        let out: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(out.contains("60s"));
    }
}
