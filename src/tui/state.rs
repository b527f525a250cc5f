use crate::model::{ImageAvailability, Mode, RoundResult, RunState};
use crate::params::normalize_rounds;
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::collections::HashMap;

pub struct UiState {
    pub tab: usize,
    pub info: String,

    pub mode: Mode,
    /// Raw text in the round-count field.
    pub rounds_input: String,
    /// Last committed (normalised) round count.
    pub rounds: u32,
    pub editing_rounds: bool,

    pub run: RunState,
    pub selected: usize,
    pub images: HashMap<u32, ImageAvailability>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: 0,
            info: String::new(),
            mode: Mode::Static,
            rounds_input: "1".into(),
            rounds: 1,
            editing_rounds: false,
            run: RunState::Idle,
            selected: 0,
            images: HashMap::new(),
        }
    }
}

impl UiState {
    /// Normalise the field on commit and show the clamped value back to the user.
    pub fn commit_rounds(&mut self) {
        self.rounds = normalize_rounds(&self.rounds_input);
        self.rounds_input = self.rounds.to_string();
        self.editing_rounds = false;
    }

    pub fn push_rounds_char(&mut self, c: char) {
        const MAX_INPUT: usize = 8;
        if !self.editing_rounds {
            self.rounds_input.clear();
            self.editing_rounds = true;
        }
        if self.rounds_input.chars().count() < MAX_INPUT {
            self.rounds_input.push(c);
        }
    }

    pub fn pop_rounds_char(&mut self) {
        self.editing_rounds = true;
        self.rounds_input.pop();
    }

    /// The start control is disabled while a run is loading.
    pub fn can_start(&self) -> bool {
        !self.run.is_loading()
    }

    /// Apply a new run state from the orchestrator.
    pub fn apply_run_state(&mut self, run: RunState) {
        if run.is_loading() {
            // A new run discards whatever the previous one showed.
            self.images.clear();
            self.selected = 0;
            self.info.clear();
        }
        self.run = run;
    }

    /// Rounds to display. Only a successful run exposes results.
    pub fn rounds_view(&self) -> &[RoundResult] {
        match &self.run {
            RunState::Succeeded { results } => results.rounds.as_slice(),
            _ => &[],
        }
    }

    pub fn select_next(&mut self) {
        let n = self.rounds_view().len();
        if n > 0 && self.selected + 1 < n {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Error banner text, if the last run failed.
    pub fn error_banner(&self) -> Option<&str> {
        match &self.run {
            RunState::Failed { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::round;
    use crate::model::{RunRequest, RunResultSet};

    fn request() -> RunRequest {
        RunRequest {
            mode: Mode::Static,
            rounds: 2,
        }
    }

    #[test]
    fn typing_replaces_then_commit_clamps() {
        let mut s = UiState::default();
        s.push_rounds_char('2');
        s.push_rounds_char('5');
        assert_eq!(s.rounds_input, "25");
        s.commit_rounds();
        assert_eq!(s.rounds, 20);
        assert_eq!(s.rounds_input, "20");

        s.pop_rounds_char();
        s.pop_rounds_char();
        s.commit_rounds();
        assert_eq!(s.rounds, 1);
    }

    #[test]
    fn start_disabled_while_loading() {
        let mut s = UiState::default();
        assert!(s.can_start());
        s.apply_run_state(RunState::Loading { request: request() });
        assert!(!s.can_start());
        s.apply_run_state(RunState::Failed {
            request: request(),
            message: "boom".into(),
        });
        assert!(s.can_start());
        assert_eq!(s.error_banner(), Some("boom"));
        assert!(s.rounds_view().is_empty());
    }

    #[test]
    fn selection_stays_in_bounds() {
        let mut s = UiState::default();
        s.apply_run_state(RunState::Succeeded {
            results: Box::new(RunResultSet {
                request: request(),
                rounds: vec![round(1, "static"), round(2, "static")],
                completed_utc: String::new(),
            }),
        });
        s.select_next();
        s.select_next();
        assert_eq!(s.selected, 1);
        s.select_prev();
        s.select_prev();
        assert_eq!(s.selected, 0);
    }

    #[test]
    fn wrapped_kv_splits_long_values() {
        let mut out = Vec::new();
        push_wrapped_status_kv(&mut out, "Errore", &"x".repeat(50), 24);
        assert!(out.len() > 1);
    }
}
