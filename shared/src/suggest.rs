//! Debounced autocomplete with a sequence guard.
//!
//! Every keystroke opens a new debounce window numbered by `generation`.
//! When a window elapses uninterrupted, a request fires tagged with that same
//! number, and only a response carrying the number of the latest fired
//! request may replace the displayed list. Anything older is dropped no
//! matter when it arrives.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::gateway::GatewayError;
use crate::model::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionPhase {
    #[default]
    Idle,
    Debouncing,
    AwaitingResponse,
    Settled,
}

/// What the user ended up searching for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum SearchOutcome {
    Suggestion(String),
    FreeText(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Query too short: list cleared, nothing scheduled.
    Cleared,
    Debounce { window: u64, delay: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionFetch {
    pub seq: u64,
    pub query: String,
    pub category: Option<Category>,
}

#[derive(Debug, Clone)]
pub struct SuggestionEngine {
    query: String,
    category: Option<Category>,
    suggestions: Vec<String>,
    visible: bool,
    highlighted: Option<usize>,
    phase: SuggestionPhase,
    generation: u64,
    in_flight: Option<u64>,
    requests_fired: u64,
    debounce: Duration,
    min_chars: usize,
}

/// Whether `query` is long enough to ask the backend for suggestions.
/// Characters are counted as typed, whitespace included.
pub fn is_searchable(query: &str, min_chars: usize) -> bool {
    query.chars().count() >= min_chars.max(1)
}

impl SuggestionEngine {
    pub fn new(debounce: Duration, min_chars: usize) -> Self {
        Self {
            query: String::new(),
            category: None,
            suggestions: Vec::new(),
            visible: false,
            highlighted: None,
            phase: SuggestionPhase::Idle,
            generation: 0,
            in_flight: None,
            requests_fired: 0,
            debounce,
            min_chars: min_chars.max(1),
        }
    }

    pub fn input(&mut self, text: impl Into<String>) -> InputOutcome {
        self.generation += 1;
        self.in_flight = None;
        self.highlighted = None;
        self.query = text.into();

        if !is_searchable(&self.query, self.min_chars) {
            self.suggestions.clear();
            self.visible = false;
            self.phase = SuggestionPhase::Idle;
            return InputOutcome::Cleared;
        }

        self.phase = SuggestionPhase::Debouncing;
        InputOutcome::Debounce {
            window: self.generation,
            delay: self.debounce,
        }
    }

    /// Changing the category re-runs the current query through the debounce.
    pub fn set_category(&mut self, category: Option<Category>) -> InputOutcome {
        self.category = category;
        let query = std::mem::take(&mut self.query);
        self.input(query)
    }

    pub fn debounce_elapsed(&mut self, window: u64) -> Option<SuggestionFetch> {
        if window != self.generation || self.phase != SuggestionPhase::Debouncing {
            debug!(window, current = self.generation, "stale debounce window ignored");
            return None;
        }
        self.phase = SuggestionPhase::AwaitingResponse;
        self.in_flight = Some(window);
        self.requests_fired += 1;
        Some(SuggestionFetch {
            seq: window,
            query: self.query.clone(),
            category: self.category,
        })
    }

    /// Returns whether the response was applied. Errors degrade to an empty list.
    pub fn apply(&mut self, seq: u64, result: Result<Vec<String>, GatewayError>) -> bool {
        if self.in_flight != Some(seq) {
            debug!(seq, expected = ?self.in_flight, "stale suggestions discarded");
            return false;
        }
        self.in_flight = None;
        self.phase = SuggestionPhase::Settled;
        self.highlighted = None;
        self.suggestions = match result {
            Ok(list) => list,
            Err(err) => {
                debug!(seq, %err, "suggestion fetch failed");
                Vec::new()
            }
        };
        self.visible = true;
        true
    }

    pub fn next(&mut self) {
        if !self.is_navigable() {
            return;
        }
        let last = self.suggestions.len() - 1;
        self.highlighted = Some(match self.highlighted {
            None => 0,
            Some(i) => (i + 1).min(last),
        });
    }

    pub fn previous(&mut self) {
        if !self.is_navigable() {
            return;
        }
        self.highlighted = match self.highlighted {
            None | Some(0) => None,
            Some(i) => Some(i - 1),
        };
    }

    /// Enter: the highlighted suggestion if there is one, else the raw query.
    pub fn submit(&mut self) -> SearchOutcome {
        if self.is_navigable() {
            if let Some(index) = self.highlighted {
                if let Some(outcome) = self.select(index) {
                    return outcome;
                }
            }
        }
        self.visible = false;
        self.highlighted = None;
        SearchOutcome::FreeText(self.query.clone())
    }

    pub fn select(&mut self, index: usize) -> Option<SearchOutcome> {
        let chosen = self.suggestions.get(index)?.clone();
        self.query = chosen.clone();
        self.visible = false;
        self.highlighted = None;
        // Whatever is still pending was for the text before the pick.
        self.generation += 1;
        self.in_flight = None;
        self.phase = SuggestionPhase::Settled;
        Some(SearchOutcome::Suggestion(chosen))
    }

    pub fn escape(&mut self) {
        self.visible = false;
        self.highlighted = None;
    }

    /// No debounce window or response from before this call can land.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.in_flight = None;
        self.phase = SuggestionPhase::Idle;
    }

    fn is_navigable(&self) -> bool {
        self.visible && !self.suggestions.is_empty()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// Highlighted index, `None` standing for "nothing" (-1).
    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn phase(&self) -> SuggestionPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn requests_fired(&self) -> u64 {
        self.requests_fired
    }
}
