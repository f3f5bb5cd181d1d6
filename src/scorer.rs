use chrono::Local;
use std::time::Instant;
use tracing::{debug, info};

use crate::metrics::{self, Metrics};
use crate::refill::{self, RefillRequest, RefillResponse};
use crate::runtime::ClockSubscription;
use crate::session::{
    Key, KeyOutcome, KeystrokeResult, Mark, Phase, SessionConfig, SessionEvent, SessionResult, SessionState,
};
use crate::typing_policy;
use crate::word_generator::TextSupplier;

/// Scores one typing session against a growing text buffer.
///
/// The buffer is append-only and `marks` grows in lock-step with it, so
/// every mark stays addressed by the same index across refills. Resetting
/// bumps the generation, which invalidates in-flight refills and clock
/// subscriptions taken for the previous run.
#[derive(Debug)]
pub struct Scorer {
    pub(crate) config: SessionConfig,
    pub(crate) buffer: Vec<char>,
    pub(crate) marks: Vec<Mark>,
    pub(crate) state: SessionState,
    pub(crate) generation: u64,
    refill_in_flight: bool,
}

impl Scorer {
    pub fn new(initial_chunk: &str, config: SessionConfig) -> Self {
        let mut scorer = Self {
            config,
            buffer: Vec::new(),
            marks: Vec::new(),
            state: SessionState::default(),
            generation: 0,
            refill_in_flight: false,
        };
        scorer.append(initial_chunk);
        scorer
    }

    /// Start over on fresh text with the same settings.
    pub fn reset(&mut self, initial_chunk: &str) {
        self.generation += 1;
        self.buffer.clear();
        self.marks.clear();
        self.state = SessionState::default();
        self.refill_in_flight = false;
        self.append(initial_chunk);
        debug!(generation = self.generation, "session reset");
    }

    /// Start over with new settings (e.g. a different duration).
    pub fn reconfigure(&mut self, initial_chunk: &str, config: SessionConfig) {
        self.config = config;
        self.reset(initial_chunk);
    }

    fn append(&mut self, text: &str) {
        for c in text.chars() {
            self.buffer.push(c);
            self.marks.push(Mark::Untouched);
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn buffer(&self) -> &[char] {
        &self.buffer
    }

    pub fn text(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn hits(&self) -> usize {
        self.state.hits
    }

    pub fn errors(&self) -> usize {
        self.state.errors
    }

    pub fn penalty_ms(&self) -> u64 {
        self.state.penalty_ms
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn has_started(&self) -> bool {
        self.state.started_at.is_some()
    }

    pub fn has_ended(&self) -> bool {
        self.state.ended
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    pub fn refill_in_flight(&self) -> bool {
        self.refill_in_flight
    }

    pub fn handle_keystroke(&mut self, key: Key) -> KeystrokeResult {
        self.handle_keystroke_at(key, Instant::now())
    }

    /// Never fails: anything that cannot be applied is reported as
    /// [`KeyOutcome::Ignored`].
    pub fn handle_keystroke_at(&mut self, key: Key, now: Instant) -> KeystrokeResult {
        if self.state.ended {
            return KeystrokeResult::ignored();
        }

        let mut events = Vec::new();
        // the deadline may have passed between clock ticks
        if self.check_deadline(now, &mut events) {
            return KeystrokeResult {
                outcome: KeyOutcome::Ignored,
                refill: None,
                events,
            };
        }

        let outcome = typing_policy::apply_key(self, key, now, &mut events);

        let refill = match (outcome, key) {
            (KeyOutcome::Correct | KeyOutcome::Incorrect, _) => self.maybe_request_refill(),
            // out of text: keep asking until something lands
            (KeyOutcome::Ignored, Key::Char(_)) if self.state.cursor >= self.buffer.len() => self.request_refill(),
            _ => None,
        };

        // penalties are visible immediately, not on the next tick
        self.check_deadline(now, &mut events);

        KeystrokeResult {
            outcome,
            refill,
            events,
        }
    }

    fn maybe_request_refill(&mut self) -> Option<RefillRequest> {
        let left = self.buffer.len().saturating_sub(self.state.cursor);
        if left >= self.config.preload_threshold {
            return None;
        }
        self.request_refill()
    }

    /// At most one request in flight per generation.
    fn request_refill(&mut self) -> Option<RefillRequest> {
        if self.refill_in_flight || self.state.ended {
            return None;
        }
        self.refill_in_flight = true;
        debug!(
            generation = self.generation,
            left = self.buffer.len().saturating_sub(self.state.cursor),
            "requesting more text"
        );
        Some(RefillRequest {
            generation: self.generation,
        })
    }

    /// Append a delivered refill. Returns whether the buffer grew.
    pub fn apply_refill(&mut self, response: RefillResponse) -> bool {
        if response.generation != self.generation {
            debug!(
                stale = response.generation,
                current = self.generation,
                "discarding refill for an old session"
            );
            return false;
        }

        self.refill_in_flight = false;
        if response.text.is_empty() || self.state.ended {
            return false;
        }

        self.append(&response.text);
        debug!(generation = self.generation, buffer = self.buffer.len(), "buffer extended");
        true
    }

    /// Serve a refill request synchronously from `supplier`.
    pub fn fulfil_refill(&mut self, request: RefillRequest, supplier: &mut dyn TextSupplier) -> bool {
        let response = refill::run_supplier(supplier, request);
        self.apply_refill(response)
    }

    /// A clock subscription is only handed out while the session is running.
    pub fn subscribe_clock(&self) -> Option<ClockSubscription> {
        self.is_running().then(|| ClockSubscription::new(self.generation))
    }

    pub fn on_tick(&mut self, subscription: &ClockSubscription, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if subscription.generation() != self.generation || !self.is_running() {
            return events;
        }
        self.check_deadline(now, &mut events);
        events
    }

    /// Ends the session once the effective elapsed time reaches the budget.
    /// Returns whether the session is over.
    fn check_deadline(&mut self, now: Instant, events: &mut Vec<SessionEvent>) -> bool {
        if self.state.ended {
            return true;
        }
        let Some(started_at) = self.state.started_at else {
            return false;
        };

        let elapsed = metrics::effective_elapsed_ms(started_at, now, self.state.penalty_ms);
        if elapsed < self.config.duration_ms() {
            return false;
        }

        self.state.ended = true;
        self.state.frozen_elapsed_ms = Some(self.config.duration_ms());
        self.refill_in_flight = false;

        let result = self.result();
        info!(
            wpm = result.wpm,
            accuracy = result.accuracy,
            hits = result.hits,
            errors = result.errors,
            mode = %result.mode,
            "session ended"
        );
        events.push(SessionEvent::FocusEnd);
        events.push(SessionEvent::Completed(result));
        true
    }

    fn elapsed_ms_at(&self, now: Instant) -> u64 {
        match (self.state.frozen_elapsed_ms, self.state.started_at) {
            (Some(frozen), _) => frozen,
            (None, Some(started_at)) => metrics::effective_elapsed_ms(started_at, now, self.state.penalty_ms),
            (None, None) => self.state.penalty_ms,
        }
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics_at(Instant::now())
    }

    pub fn metrics_at(&self, now: Instant) -> Metrics {
        let elapsed_seconds = self.elapsed_ms_at(now) as f64 / 1000.0;
        let wpm = if self.has_started() {
            metrics::wpm(self.state.hits, elapsed_seconds)
        } else {
            0.0
        };

        Metrics {
            wpm,
            accuracy: metrics::accuracy(self.state.hits, self.state.errors),
            remaining_seconds: metrics::remaining_seconds(self.config.duration_secs, elapsed_seconds),
            elapsed_seconds,
            hits: self.state.hits,
            errors: self.state.errors,
            ended: self.state.ended,
        }
    }

    /// Result snapshot using the frozen clock if the session is over.
    pub fn result(&self) -> SessionResult {
        let m = self.metrics();
        SessionResult {
            wpm: m.wpm,
            accuracy: m.accuracy,
            hits: m.hits,
            errors: m.errors,
            words: m.hits / metrics::CHARS_PER_WORD as usize,
            duration: self.config.duration_secs,
            mode: self.config.mode,
            recorded_at: Local::now(),
        }
    }
}
