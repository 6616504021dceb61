//! ThreatGlobe TUI Dashboard Module
//! ================================
//!
//! Terminal view of a running globe: the four event counters, live entities
//! per type and an events-per-second sparkline.
//! Uses Ratatui for rendering and Crossbeam for snapshot delivery.
//!
//! Enable with the `dashboard` feature flag.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crossbeam::channel::Receiver;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Sparkline, Table},
    Frame, Terminal,
};

use crate::globe_lifecycle::EntityKind;
use crate::globe_runtime::RuntimeSnapshot;

const HISTORY_LEN: usize = 100;

// =============================================================================
// GLOBE DASHBOARD
// =============================================================================

/// TUI dashboard fed by [`GlobeRuntime::with_snapshot_feed`](crate::GlobeRuntime::with_snapshot_feed).
pub struct GlobeDashboard {
    rx: Receiver<RuntimeSnapshot>,
    rate_history: VecDeque<u64>,
    latest: RuntimeSnapshot,
    previous_total: Option<f64>,
    title: String,
}

impl GlobeDashboard {
    /// # Arguments
    /// * `rx` - Snapshot receiver
    /// * `title` - Header text, usually the counters title setting
    pub fn new(rx: Receiver<RuntimeSnapshot>, title: impl Into<String>) -> Self {
        Self {
            rx,
            rate_history: VecDeque::with_capacity(HISTORY_LEN),
            latest: RuntimeSnapshot::default(),
            previous_total: None,
            title: title.into(),
        }
    }

    /// Drains pending snapshots into the history.
    pub fn poll(&mut self) {
        while let Ok(snapshot) = self.rx.try_recv() {
            self.record(snapshot);
        }
    }

    fn record(&mut self, snapshot: RuntimeSnapshot) {
        let total = snapshot.counters.total;
        if let Some(previous) = self.previous_total {
            // Counters restart on filter changes
            let rate = (total - previous).max(0.0).round() as u64;
            self.rate_history.push_back(rate);
            if self.rate_history.len() > HISTORY_LEN {
                self.rate_history.pop_front();
            }
        }
        self.previous_total = Some(total);
        self.latest = snapshot;
    }

    /// Run the TUI main loop (blocks until 'q' pressed)
    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        loop {
            self.poll();
            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.code == KeyCode::Char('q') || key.code == KeyCode::Esc {
                        break;
                    }
                }
            }
        }

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        Ok(())
    }

    fn ui(&self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Length(5), // Counters
                Constraint::Length(6), // Sparkline
                Constraint::Min(5),    // Entities
                Constraint::Length(1), // Footer
            ])
            .split(f.area());

        // === HEADER ===
        let header = Paragraph::new(Line::from(vec![
            Span::styled(self.title.as_str(), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  |  "),
            Span::styled(
                format!("t={:.1}s", self.latest.timestamp_ms / 1000.0),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw("  |  "),
            Span::raw(format!("{} shown", self.latest.shown_nodes)),
        ]))
        .block(Block::default().borders(Borders::BOTTOM));
        f.render_widget(header, chunks[0]);

        // === COUNTERS ===
        let counter_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(25); 4])
            .split(chunks[1]);
        let counters = self.latest.counters;
        let windows = [
            ("Total", counters.total, Color::White),
            ("Last 5 min", counters.last5min, Color::Cyan),
            ("Last 1 min", counters.last1min, Color::Yellow),
            ("Last 10 s", counters.last10s, Color::Red),
        ];
        for (chunk, (title, value, color)) in counter_chunks.iter().zip(windows) {
            let widget = Paragraph::new(format!("{:.0}", value))
                .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
                .block(Block::default().title(title).borders(Borders::ALL));
            f.render_widget(widget, *chunk);
        }

        // === RATE SPARKLINE ===
        let rates: Vec<u64> = self.rate_history.iter().copied().collect();
        let sparkline = Sparkline::default()
            .block(
                Block::default()
                    .title("Events per counter tick")
                    .borders(Borders::ALL),
            )
            .data(&rates)
            .style(Style::default().fg(Color::Magenta));
        f.render_widget(sparkline, chunks[2]);

        // === ENTITY TABLE ===
        let header_cells = ["Type", "Live"]
            .iter()
            .map(|h| Span::styled(*h, Style::default().add_modifier(Modifier::BOLD)));
        let header = Row::new(header_cells).height(1);
        let rows: Vec<Row> = EntityKind::all()
            .iter()
            .map(|kind| {
                let live = self.latest.entity_counts.get(kind).copied().unwrap_or(0);
                Row::new(vec![Span::raw(kind.name()), Span::raw(live.to_string())])
            })
            .collect();
        let table = Table::new(rows, [Constraint::Length(14), Constraint::Length(8)])
            .header(header)
            .block(Block::default().title("Entities").borders(Borders::ALL));
        f.render_widget(table, chunks[3]);

        // === FOOTER ===
        let footer = Paragraph::new(format!(
            "Press 'q' to quit  |  arcs {}  |  hex bins {}",
            self.latest.arcs, self.latest.hex_bins
        ))
        .style(Style::default().fg(Color::DarkGray));
        f.render_widget(footer, chunks[4]);
    }
}

// =============================================================================
// TESTS
// =============================================================================
