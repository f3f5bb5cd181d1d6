use std::mem;
use std::time::Instant;

use tracing::debug;

use crate::scorer::Scorer;
use crate::session::{Key, KeyOutcome, Mark, Mode, SessionEvent, BACKSPACE_PENALTY_MS};

/// Score a printable character against the buffer and always advance.
pub fn write_char(scorer: &mut Scorer, c: char, now: Instant, events: &mut Vec<SessionEvent>) -> KeyOutcome {
    let idx = scorer.state.cursor;
    // buffer exhausted: wait for the refill to land
    let Some(&expected) = scorer.buffer.get(idx) else {
        return KeyOutcome::Ignored;
    };

    if scorer.state.started_at.is_none() {
        scorer.state.started_at = Some(now);
        debug!(generation = scorer.generation, "session started");
        events.push(SessionEvent::FocusStart);
    }

    let outcome = if c == expected {
        scorer.marks[idx] = Mark::Correct;
        scorer.state.hits += 1;
        KeyOutcome::Correct
    } else {
        scorer.marks[idx] = Mark::Incorrect;
        scorer.state.errors += 1;
        KeyOutcome::Incorrect
    };

    scorer.state.cursor += 1;
    outcome
}

/// Classic backspace: step back and undo whatever was recorded there.
pub fn backspace_classic(scorer: &mut Scorer) -> KeyOutcome {
    if scorer.state.cursor == 0 {
        return KeyOutcome::Ignored;
    }

    scorer.state.cursor -= 1;
    let cleared = mem::take(&mut scorer.marks[scorer.state.cursor]);
    match cleared {
        Mark::Correct => scorer.state.hits = scorer.state.hits.saturating_sub(1),
        Mark::Incorrect => scorer.state.errors = scorer.state.errors.saturating_sub(1),
        Mark::Untouched => {}
    }
    KeyOutcome::Corrected(cleared)
}

/// Competitive backspace: no correction, the budget shrinks instead.
pub fn backspace_competitive(scorer: &mut Scorer, events: &mut Vec<SessionEvent>) -> KeyOutcome {
    scorer.state.penalty_ms += BACKSPACE_PENALTY_MS;
    debug!(penalty_ms = scorer.state.penalty_ms, "backspace penalty");
    events.push(SessionEvent::Penalty {
        ms: BACKSPACE_PENALTY_MS,
    });
    KeyOutcome::Penalized
}

pub fn apply_key(scorer: &mut Scorer, key: Key, now: Instant, events: &mut Vec<SessionEvent>) -> KeyOutcome {
    match (scorer.config.mode, key) {
        (_, Key::Other) => KeyOutcome::Ignored,
        (_, Key::Char(c)) if c.is_control() => KeyOutcome::Ignored,
        (_, Key::Char(c)) => write_char(scorer, c, now, events),
        (Mode::Classic, Key::Backspace) => backspace_classic(scorer),
        (Mode::Competitive, Key::Backspace) => backspace_competitive(scorer, events),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;

    fn scorer(text: &str, mode: Mode) -> Scorer {
        Scorer::new(text, SessionConfig::new(60, mode).unwrap())
    }

    #[test]
    fn test_write_char_marks_and_advances() {
        let mut s = scorer("ab", Mode::Classic);
        let mut events = Vec::new();
        let now = Instant::now();

        assert_eq!(write_char(&mut s, 'a', now, &mut events), KeyOutcome::Correct);
        assert_eq!(write_char(&mut s, 'x', now, &mut events), KeyOutcome::Incorrect);
        assert_eq!(s.marks(), &[Mark::Correct, Mark::Incorrect]);
        assert_eq!(s.cursor(), 2);
        assert_eq!(events, vec![SessionEvent::FocusStart]);
    }

    #[test]
    fn test_write_char_past_buffer_end_is_ignored() {
        let mut s = scorer("a", Mode::Classic);
        let mut events = Vec::new();
        let now = Instant::now();

        write_char(&mut s, 'a', now, &mut events);
        assert_eq!(write_char(&mut s, 'b', now, &mut events), KeyOutcome::Ignored);
        assert_eq!(s.cursor(), 1);
        assert_eq!(s.errors(), 0);
    }

    #[test]
    fn test_backspace_classic_at_start() {
        let mut s = scorer("a", Mode::Classic);
        assert_eq!(backspace_classic(&mut s), KeyOutcome::Ignored);
    }

    #[test]
    fn test_backspace_classic_undoes_error() {
        let mut s = scorer("ab", Mode::Classic);
        let mut events = Vec::new();
        write_char(&mut s, 'x', Instant::now(), &mut events);

        assert_eq!(backspace_classic(&mut s), KeyOutcome::Corrected(Mark::Incorrect));
        assert_eq!(s.errors(), 0);
        assert_eq!(s.marks(), &[Mark::Untouched, Mark::Untouched]);
    }

    #[test]
    fn test_backspace_competitive_adds_penalty() {
        let mut s = scorer("ab", Mode::Competitive);
        let mut events = Vec::new();

        assert_eq!(backspace_competitive(&mut s, &mut events), KeyOutcome::Penalized);
        assert_eq!(s.penalty_ms(), 500);
        assert_eq!(events, vec![SessionEvent::Penalty { ms: 500 }]);
    }

    #[test]
    fn test_apply_key_ignores_other_and_control() {
        let mut s = scorer("ab", Mode::Classic);
        let mut events = Vec::new();
        let now = Instant::now();

        assert_eq!(apply_key(&mut s, Key::Other, now, &mut events), KeyOutcome::Ignored);
        assert_eq!(apply_key(&mut s, Key::Char('\n'), now, &mut events), KeyOutcome::Ignored);
        assert!(!s.has_started());
    }
}
