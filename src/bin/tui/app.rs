use std::sync::Arc;

use crossterm::event::KeyCode;

use metric_screener::analytics::AnalyticsQuery;
use metric_screener::screener::{screen, Direction, FilterCriteria, MetricField, Preset, SortKey, SortSpec};
use metric_screener::types::{ExchangeScope, MetricRecord, Snapshot};

/// Sort keys reachable with `s`, in cycle order.
pub const SORT_CYCLE: [SortKey; 8] = [
    SortKey::Field(MetricField::Change5m),
    SortKey::Field(MetricField::Change1h),
    SortKey::Field(MetricField::Change24h),
    SortKey::Field(MetricField::SignalScore),
    SortKey::Field(MetricField::Volume24h),
    SortKey::Field(MetricField::OpenInterest),
    SortKey::Field(MetricField::FundingRate),
    SortKey::Symbol,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

/// Side effects the event loop performs after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    /// Filter or sort changed; rows were already recomputed.
    Rescreened,
    /// Reconnect the stream for this scope.
    SwitchScope(ExchangeScope),
    RefreshAnalytics,
    RecomputeAnalytics,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub scope: ExchangeScope,
    pub mode: InputMode,
    pub search: String,
    pub preset: Option<Preset>,
    pub sort: SortSpec,
    pub analytics_query: AnalyticsQuery,
    pub snapshot: Arc<Snapshot>,
    /// Screened rows for the current snapshot.
    pub rows: Vec<MetricRecord>,
}

impl AppState {
    pub fn new(scope: ExchangeScope, analytics_query: AnalyticsQuery) -> Self {
        Self {
            scope,
            mode: InputMode::Normal,
            search: String::new(),
            preset: None,
            sort: SortSpec::default(),
            analytics_query,
            snapshot: Arc::new(Snapshot::empty()),
            rows: Vec::new(),
        }
    }

    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria::new()
            .with_query(self.search.clone())
            .with_preset(self.preset)
    }

    /// Swap in a new snapshot and re-run the screener over it.
    pub fn set_snapshot(&mut self, snapshot: Arc<Snapshot>) {
        self.snapshot = snapshot;
        self.rescreen();
    }

    pub fn rescreen(&mut self) {
        self.rows = screen(&self.snapshot.records, &self.criteria(), self.sort);
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Action {
        match self.mode {
            InputMode::Search => self.handle_search_key(code),
            InputMode::Normal => self.handle_normal_key(code),
        }
    }

    fn handle_search_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Enter => {
                self.mode = InputMode::Normal;
                Action::None
            }
            KeyCode::Esc => {
                self.mode = InputMode::Normal;
                self.search.clear();
                self.rescreen();
                Action::Rescreened
            }
            KeyCode::Backspace => {
                self.search.pop();
                self.rescreen();
                Action::Rescreened
            }
            KeyCode::Char(c) => {
                self.search.push(c);
                self.rescreen();
                Action::Rescreened
            }
            _ => Action::None,
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') => Action::Quit,
            KeyCode::Char('/') => {
                self.mode = InputMode::Search;
                Action::None
            }
            KeyCode::Esc => {
                if self.search.is_empty() && self.preset.is_none() {
                    return Action::None;
                }
                self.search.clear();
                self.preset = None;
                self.rescreen();
                Action::Rescreened
            }
            KeyCode::Char('p') => {
                self.preset = Preset::cycle(self.preset);
                self.rescreen();
                Action::Rescreened
            }
            KeyCode::Char('s') => {
                self.sort.key = next_sort_key(self.sort.key);
                self.rescreen();
                Action::Rescreened
            }
            KeyCode::Char('d') => {
                self.sort.direction = match self.sort.direction {
                    Direction::Asc => Direction::Desc,
                    Direction::Desc => Direction::Asc,
                };
                self.rescreen();
                Action::Rescreened
            }
            KeyCode::Char('x') => {
                self.scope = self.scope.next();
                Action::SwitchScope(self.scope)
            }
            KeyCode::Char('w') => {
                self.analytics_query.window_days = self.analytics_query.window_days.toggle();
                Action::RefreshAnalytics
            }
            KeyCode::Char('e') => {
                self.analytics_query.exchange = self.analytics_query.exchange.next();
                Action::RefreshAnalytics
            }
            KeyCode::Char('c') => {
                self.analytics_query.top_cohort_only = !self.analytics_query.top_cohort_only;
                Action::RefreshAnalytics
            }
            KeyCode::Char('r') => Action::RefreshAnalytics,
            KeyCode::Char('R') => Action::RecomputeAnalytics,
            _ => Action::None,
        }
    }
}

fn next_sort_key(current: SortKey) -> SortKey {
    let idx = SORT_CYCLE.iter().position(|k| *k == current);
    match idx {
        Some(i) => SORT_CYCLE[(i + 1) % SORT_CYCLE.len()],
        None => SORT_CYCLE[0],
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Char-boundary safe truncation with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
