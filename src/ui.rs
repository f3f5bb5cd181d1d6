use std::ops::Range;
use std::time::{Duration, Instant};

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};
use unicode_width::UnicodeWidthChar;

use crate::history::PersonalBest;
use crate::metrics::Metrics;
use crate::scorer::Scorer;
use crate::session::{Mark, Phase, SessionResult};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;
/// Visible lines of text around the cursor.
pub const VIEWPORT_LINES: usize = 3;
/// How long the `-0.5s` notice stays up after a competitive backspace.
pub const PENALTY_FLASH: Duration = Duration::from_millis(600);

/// Greedy word wrap over the buffer. Returns char ranges, one per line.
/// Words longer than `width` are split.
pub fn wrap_lines(text: &[char], width: usize) -> Vec<Range<usize>> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut used = 0;
        let mut end = start;
        let mut last_break = None;

        while end < text.len() {
            let w = text[end].width().unwrap_or(0);
            if used + w > width && end > start {
                break;
            }
            used += w;
            end += 1;
            if text[end - 1] == ' ' {
                last_break = Some(end);
            }
        }

        if end < text.len() {
            if let Some(at) = last_break {
                end = at;
            }
        }
        lines.push(start..end);
        start = end;
    }

    lines
}

/// Line indices to show: the cursor sits on the second visible line once
/// the first line has been typed past.
pub fn viewport(lines: &[Range<usize>], cursor: usize) -> Range<usize> {
    let cursor_line = lines
        .iter()
        .position(|line| line.contains(&cursor))
        .unwrap_or(lines.len().saturating_sub(1));
    let first = cursor_line.saturating_sub(1);
    first..(first + VIEWPORT_LINES).min(lines.len())
}

/// Stats are hidden while typing; only the countdown stays.
pub fn stats_line(metrics: &Metrics, phase: Phase) -> String {
    match phase {
        Phase::Running => format!("{}s", metrics.remaining_seconds),
        Phase::Idle | Phase::Ended => format!(
            "{:.0} wpm   {:.0}% acc   {}s",
            metrics.wpm, metrics.accuracy, metrics.remaining_seconds
        ),
    }
}

pub fn result_line(result: &SessionResult) -> String {
    format!(
        "{:.0} wpm   {:.0}% acc   {} words   {}s {}",
        result.wpm, result.accuracy, result.words, result.duration, result.mode
    )
}

/// Everything the screen needs for one frame.
pub struct SessionView<'a> {
    pub scorer: &'a Scorer,
    pub now: Instant,
    pub penalty_flash: bool,
    pub result: Option<&'a SessionResult>,
    pub best: Option<&'a PersonalBest>,
}

impl SessionView<'_> {
    fn text_lines(&self, width: usize) -> Vec<Line<'static>> {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let correct = bold.fg(Color::Green);
        let incorrect = bold.fg(Color::Red);
        let pending = bold.add_modifier(Modifier::DIM);
        let caret = pending.add_modifier(Modifier::UNDERLINED);

        let buffer = self.scorer.buffer();
        let marks = self.scorer.marks();
        let cursor = self.scorer.cursor();
        let lines = wrap_lines(buffer, width);

        lines[viewport(&lines, cursor)]
            .iter()
            .map(|range| {
                let spans = range
                    .clone()
                    .map(|idx| {
                        let c = buffer[idx];
                        match (marks[idx], idx == cursor) {
                            (_, true) => Span::styled(c.to_string(), caret),
                            (Mark::Correct, _) => Span::styled(c.to_string(), correct),
                            (Mark::Incorrect, _) => {
                                Span::styled(if c == ' ' { "·".to_owned() } else { c.to_string() }, incorrect)
                            }
                            (Mark::Untouched, _) => Span::styled(c.to_string(), pending),
                        }
                    })
                    .collect::<Vec<_>>();
                Line::from(spans)
            })
            .collect()
    }

    fn render_typing(&self, area: Rect, buf: &mut Buffer) {
        let dim_bold = Style::default().add_modifier(Modifier::BOLD | Modifier::DIM);
        let text_height = VIEWPORT_LINES as u16;
        let pad = area.height.saturating_sub(text_height + 2) / 2;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Length(pad),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(text_height),
                Constraint::Min(0),
            ])
            .split(area);

        let metrics = self.scorer.metrics_at(self.now);
        Paragraph::new(Span::styled(stats_line(&metrics, self.scorer.phase()), dim_bold))
            .alignment(Alignment::Center)
            .render(chunks[1], buf);

        if self.penalty_flash {
            Paragraph::new(Span::styled(
                "-0.5s",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ))
            .alignment(Alignment::Right)
            .render(chunks[2], buf);
        }

        let width = usize::from(chunks[3].width);
        Paragraph::new(self.text_lines(width)).render(chunks[3], buf);
    }

    fn render_results(&self, result: &SessionResult, area: Rect, buf: &mut Buffer) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let italic = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(area);

        Paragraph::new(Span::styled(result_line(result), bold))
            .alignment(Alignment::Center)
            .render(chunks[1], buf);

        Paragraph::new(Span::styled(
            format!("{} correct   {} errors", result.hits, result.errors),
            Style::default().add_modifier(Modifier::DIM),
        ))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

        if let Some(best) = self.best {
            Paragraph::new(Span::styled(
                format!("best: {:.0} wpm   {:.0}% acc", best.best_wpm, best.best_accuracy),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
        }

        Paragraph::new(Span::styled("(r)etry / (n)ew / (esc)ape", italic)).render(chunks[5], buf);
    }
}

impl Widget for SessionView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match (self.scorer.phase(), self.result) {
            (Phase::Ended, Some(result)) => self.render_results(result, area, buf),
            _ => self.render_typing(area, buf),
        }
    }
}
