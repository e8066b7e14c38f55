mod app;

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use metric_screener::analytics::{AnalyticsAggregator, AnalyticsClient, AnalyticsView, BatchStatus, SymbolRow};
use metric_screener::config::Config;
use metric_screener::format::{self, QualityBucket, ScoreBucket, Tone, PLACEHOLDER};
use metric_screener::screener::{Direction as SortDirection, SortKey};
use metric_screener::state::SnapshotStore;
use metric_screener::types::{ConnectionStatus, ExchangeScope, Snapshot};
use metric_screener::ws::{StreamConnection, StreamHandle, StreamSupervisor};

use app::{truncate, Action, AppState, InputMode};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    // The terminal owns stdout/stderr, so logs only go to a file when asked for.
    if let Ok(path) = std::env::var("TUI_LOG_FILE") {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(&cfg.log_level))
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }

    let client = match AnalyticsClient::new(cfg.analytics_api_url.clone(), cfg.http_timeout()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("HTTP client error: {e}");
            std::process::exit(1);
        }
    };
    let analytics = AnalyticsAggregator::new(client);
    let mut app = AppState::new(cfg.exchange_scope, cfg.default_analytics_query());
    analytics.spawn_run(app.analytics_query);

    let store = SnapshotStore::new();
    let stream = start_stream(&cfg, app.scope, &store);

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut table_state = TableState::default();
    table_state.select(None);

    let result = run_loop(&mut terminal, &mut app, &cfg, &store, stream, &analytics, &mut table_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    analytics.cancel();
    result
}

fn start_stream(cfg: &Config, scope: ExchangeScope, store: &Arc<SnapshotStore>) -> StreamHandle {
    let connection = StreamConnection::new(cfg.stream_url_for(scope), Arc::clone(store));
    StreamSupervisor::new(connection).spawn()
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    cfg: &Config,
    store: &Arc<SnapshotStore>,
    mut stream: StreamHandle,
    analytics: &Arc<AnalyticsAggregator>,
    table_state: &mut TableState,
) -> io::Result<()> {
    let poll_interval = Duration::from_millis(250);
    let mut snapshots: watch::Receiver<Arc<Snapshot>> = store.subscribe();

    loop {
        if snapshots.has_changed().unwrap_or(false) {
            let snapshot = Arc::clone(&snapshots.borrow_and_update());
            app.set_snapshot(snapshot);
            clamp_selection(table_state, app.rows.len());
        }

        let view = analytics.view();
        let status = stream.status();
        terminal.draw(|f| render(f, app, status, &view, table_state))?;

        if !event::poll(poll_interval)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if app.mode == InputMode::Normal {
            match key.code {
                KeyCode::Down | KeyCode::Char('j') => {
                    let max = app.rows.len().saturating_sub(1);
                    let next = table_state.selected().map_or(0, |i| (i + 1).min(max));
                    table_state.select(Some(next));
                    continue;
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    let prev = table_state.selected().map_or(0, |i| i.saturating_sub(1));
                    table_state.select(Some(prev));
                    continue;
                }
                _ => {}
            }
        }

        match app.handle_key(key.code) {
            Action::Quit => {
                stream.close().await;
                return Ok(());
            }
            Action::SwitchScope(scope) => {
                stream.close().await;
                store.replace(Snapshot::empty());
                stream = start_stream(cfg, scope, store);
                table_state.select(None);
            }
            Action::RefreshAnalytics => {
                analytics.spawn_run(app.analytics_query);
            }
            Action::RecomputeAnalytics => {
                analytics.spawn_recompute(app.analytics_query);
            }
            Action::Rescreened => clamp_selection(table_state, app.rows.len()),
            Action::None => {}
        }
    }
}

fn clamp_selection(state: &mut TableState, len: usize) {
    match state.selected() {
        Some(_) if len == 0 => state.select(None),
        Some(i) if i >= len => state.select(Some(len - 1)),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, status: ConnectionStatus, view: &AnalyticsView, table_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | table | analytics | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // header
            Constraint::Min(8),     // live table
            Constraint::Length(10), // analytics
            Constraint::Length(1),  // footer
        ])
        .split(area);

    render_header(f, app, status, chunks[0]);
    render_metrics_table(f, app, table_state, chunks[1]);
    render_analytics(f, view, chunks[2]);
    render_footer(f, app, chunks[3]);
}

fn render_header(f: &mut Frame, app: &AppState, status: ConnectionStatus, area: Rect) {
    let (status_text, status_color) = match status {
        ConnectionStatus::Connected => ("● connected", Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting", Color::Yellow),
        ConnectionStatus::Disconnected => ("✗ disconnected", Color::Red),
    };

    let age = format::fmt_age(app.snapshot.timestamp, Utc::now());
    let preset = app.preset.map_or_else(|| "none".to_string(), |p| p.to_string());
    let dir = match app.sort.direction {
        SortDirection::Asc => "↑",
        SortDirection::Desc => "↓",
    };

    let title_spans = vec![
        Span::styled(
            " Metric Screener  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(format!("scope {}", app.scope), Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(
            format!("{}/{} symbols", app.rows.len(), app.snapshot.len()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(format!("snapshot {age}"), Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(format!("preset {preset}"), Style::default().fg(Color::Magenta)),
        Span::raw("  │  "),
        Span::styled(format!("sort {}{dir}", app.sort.key), Style::default().fg(Color::Magenta)),
    ];

    let paragraph = Paragraph::new(Line::from(title_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Positive => Color::Green,
        Tone::Negative => Color::Red,
        Tone::Flat => Color::White,
        Tone::Muted => Color::DarkGray,
    }
}

fn score_color(bucket: ScoreBucket) -> Color {
    match bucket {
        ScoreBucket::Elite => Color::Green,
        ScoreBucket::Strong => Color::LightGreen,
        ScoreBucket::Moderate => Color::Yellow,
        ScoreBucket::Weak => Color::Red,
        ScoreBucket::Unknown => Color::DarkGray,
    }
}

fn render_metrics_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["#", "Symbol", "Exch", "Price", "5m", "1h", "24h", "Vol 24h", "OI", "Fund", "Score", "Flags"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let change = |v: Option<f64>| {
                Cell::from(format::fmt_pct(v)).style(Style::default().fg(tone_color(Tone::from_change(v))))
            };
            let bucket = ScoreBucket::from_score(r.signal_score);
            let mut flags = Vec::new();
            if r.cipher_b_buy == Some(true) {
                flags.push("B");
            }
            if r.cipher_b_sell == Some(true) {
                flags.push("S");
            }
            if r.volume_spike == Some(true) {
                flags.push("V");
            }

            Row::new(vec![
                Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&r.symbol, 14)),
                Cell::from(truncate(&r.exchange, 7)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(format::fmt_price(r.price)),
                change(r.change_5m),
                change(r.change_1h),
                change(r.change_24h),
                Cell::from(format::fmt_large(r.volume_24h)).style(Style::default().fg(Color::Cyan)),
                Cell::from(format::fmt_large(r.open_interest)).style(Style::default().fg(Color::Cyan)),
                change(r.funding_rate),
                Cell::from(format::fmt_num(r.signal_score, 1)).style(Style::default().fg(score_color(bucket))),
                Cell::from(flags.join(" ")).style(Style::default().fg(Color::Magenta)),
            ])
        })
        .collect();

    let title = if app.mode == InputMode::Search || !app.search.is_empty() {
        format!(" LIVE METRICS  /{}{} ", app.search, if app.mode == InputMode::Search { "▏" } else { "" })
    } else {
        " LIVE METRICS ".to_string()
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(11),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    f.render_stateful_widget(table, area, state);
}

fn render_analytics(f: &mut Frame, view: &AnalyticsView, area: Rect) {
    let thirds = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
        ])
        .split(area);

    let (status_text, status_color) = match view.status {
        BatchStatus::Idle => ("ready".to_string(), Color::Green),
        BatchStatus::Loading => ("loading…".to_string(), Color::Yellow),
        BatchStatus::Error => (
            format!("error: {}", truncate(view.error.as_deref().unwrap_or("unknown"), 40)),
            Color::Red,
        ),
    };

    let result = view.latest.as_ref().map(|b| &b.result);
    let summary = result.and_then(|r| r.summary.as_ref());
    let backend = result.and_then(|r| r.status.as_ref());
    let quality = backend.and_then(|s| s.data_quality_rate);
    let quality_color = match QualityBucket::from_rate(quality) {
        QualityBucket::Good => Color::Green,
        QualityBucket::Fair => Color::Yellow,
        QualityBucket::Poor => Color::Red,
        QualityBucket::Unknown => Color::DarkGray,
    };

    let label = |s: &'static str| Span::styled(s, Style::default().fg(Color::DarkGray));
    let lines = vec![
        Line::from(vec![
            label("query   "),
            Span::styled(view.query.to_string(), Style::default().fg(Color::Magenta)),
            Span::raw("  "),
            Span::styled(status_text, Style::default().fg(status_color)),
        ]),
        Line::from(vec![
            label("shown   "),
            Span::raw(
                view.latest
                    .as_ref()
                    .map_or_else(|| PLACEHOLDER.to_string(), |b| format!("{} @ {}", b.query, format::fmt_timestamp(Some(b.fetched_at)))),
            ),
        ]),
        Line::from(vec![
            label("trades  "),
            Span::raw(format::fmt_count(summary.and_then(|s| s.total_trades))),
            label("   win "),
            Span::raw(format::fmt_rate(summary.and_then(|s| s.win_rate))),
        ]),
        Line::from(vec![
            label("avg ret "),
            Span::styled(
                format::fmt_pct(summary.and_then(|s| s.avg_return)),
                Style::default().fg(tone_color(Tone::from_change(summary.and_then(|s| s.avg_return)))),
            ),
            label("   pf "),
            Span::raw(format::fmt_num(summary.and_then(|s| s.profit_factor), 2)),
        ]),
        Line::from(vec![
            label("quality "),
            Span::styled(format::fmt_rate(quality), Style::default().fg(quality_color)),
            label("   recomputed "),
            Span::raw(format::fmt_age(backend.and_then(|s| s.last_recompute_at), Utc::now())),
        ]),
    ];

    let summary_panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(" ANALYTICS ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
    );
    f.render_widget(summary_panel, thirds[0]);

    let empty: &[SymbolRow] = &[];
    render_symbol_list(f, " BEST SYMBOLS ", result.map_or(empty, |r| r.best_symbols.as_slice()), thirds[1]);
    render_symbol_list(f, " WORST SYMBOLS ", result.map_or(empty, |r| r.worst_symbols.as_slice()), thirds[2]);
}

fn render_symbol_list(f: &mut Frame, title: &'static str, rows: &[SymbolRow], area: Rect) {
    let header = Row::new(["Symbol", "Trades", "Win", "Avg"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    }));

    let body: Vec<Row> = rows
        .iter()
        .map(|r| {
            Row::new(vec![
                Cell::from(truncate(&r.symbol, 12)),
                Cell::from(format::fmt_count(r.trades)),
                Cell::from(format::fmt_rate(r.win_rate)),
                Cell::from(format::fmt_pct(r.avg_return))
                    .style(Style::default().fg(tone_color(Tone::from_change(r.avg_return)))),
            ])
        })
        .collect();

    let table = Table::new(
        body,
        [
            Constraint::Min(8),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
    );
    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let line = if app.mode == InputMode::Search {
        Line::from(vec![
            key(" [type] "),
            Span::raw("filter symbols  "),
            key("[enter] "),
            Span::raw("done  "),
            key("[esc] "),
            Span::raw("clear"),
        ])
    } else {
        let sort_hint = match app.sort.key {
            SortKey::Symbol => "symbol",
            SortKey::Field(field) => field.name(),
        };
        Line::from(vec![
            key(" [q] "),
            Span::raw("quit  "),
            key("[/] "),
            Span::raw("search  "),
            key("[p] "),
            Span::raw("preset  "),
            key("[s/d] "),
            Span::raw(format!("sort ({sort_hint})  ")),
            key("[x] "),
            Span::raw("scope  "),
            key("[w/e/c] "),
            Span::raw("window/exchange/cohort  "),
            key("[r/R] "),
            Span::raw("refresh/recompute  "),
            key("[↑↓ / j k] "),
            Span::raw("scroll"),
        ])
    };
    f.render_widget(Paragraph::new(line).style(Style::default().fg(Color::White)), area);
}
