// 🖥️ Import Progress View - terminal front end for a background import
//
// The import runs on the worker thread; this loop only polls its channel,
// redraws, and reads keys. Nothing here touches the store.

use anyhow::Result;
use apptrack_import::{ImportError, ImportHandle, ImportMessage, ImportSummary};
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;

pub struct App {
    pub source: String,
    pub processed: usize,
    pub total: usize,
    pub outcome: Option<Result<ImportSummary, ImportError>>,
    pub warnings_state: TableState,
}

impl App {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            processed: 0,
            total: 0,
            outcome: None,
            warnings_state: TableState::default(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn apply(&mut self, message: ImportMessage) {
        match message {
            ImportMessage::Progress { processed, total } => {
                self.processed = processed;
                self.total = total;
            }
            ImportMessage::Finished(result) => {
                if let Ok(summary) = &result {
                    self.processed = summary.rows_total;
                    self.total = summary.rows_total;
                    if !summary.warnings.is_empty() {
                        self.warnings_state.select(Some(0));
                    }
                }
                self.outcome = Some(result);
            }
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            if self.is_finished() {
                1.0
            } else {
                0.0
            }
        } else {
            (self.processed as f64 / self.total as f64).clamp(0.0, 1.0)
        }
    }

    fn warnings(&self) -> &[String] {
        match &self.outcome {
            Some(Ok(summary)) => &summary.warnings,
            _ => &[],
        }
    }

    pub fn next(&mut self) {
        let len = self.warnings().len();
        if len == 0 {
            return;
        }
        let i = match self.warnings_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            Some(i) => i,
            None => 0,
        };
        self.warnings_state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let i = self.warnings_state.selected().map(|i| i.saturating_sub(1)).unwrap_or(0);
        if !self.warnings().is_empty() {
            self.warnings_state.select(Some(i));
        }
    }
}

/// Show progress until the import ends and the user quits; returns the outcome
pub fn run_ui(handle: ImportHandle, source: &str) -> Result<Result<ImportSummary, ImportError>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(source);
    let res = run_app(&mut terminal, &mut app, &handle);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res?;

    // Quit is only accepted after Finished, so the outcome is always set
    Ok(app.outcome.unwrap_or_else(|| handle.wait()))
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    handle: &ImportHandle,
) -> io::Result<()> {
    loop {
        while let Some(message) = handle.poll() {
            app.apply(message);
        }

        terminal.draw(|f| ui(f, app))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter if app.is_finished() => return Ok(()),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Progress gauge
            Constraint::Length(9), // Counts
            Constraint::Min(0),    // Warnings
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    render_gauge(f, chunks[1], app);
    render_counts(f, chunks[2], app);
    render_warnings(f, chunks[3], app);
    render_status_bar(f, chunks[4], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let (state, color) = match &app.outcome {
        None => ("IMPORTING", Color::Yellow),
        Some(Ok(_)) => ("DONE", Color::Green),
        Some(Err(_)) => ("FAILED", Color::Red),
    };

    let header = Paragraph::new(vec![Line::from(vec![
        Span::styled("📥 Import ", Style::default().fg(Color::White)),
        Span::styled(&app.source, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("  |  "),
        Span::styled(state, Style::default().fg(color).add_modifier(Modifier::BOLD)),
    ])])
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_gauge(f: &mut Frame, area: Rect, app: &App) {
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Rows "))
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .ratio(app.ratio())
        .label(format!("{}/{}", app.processed, app.total));

    f.render_widget(gauge, area);
}

fn render_counts(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default().borders(Borders::ALL).title(" Summary ");

    let summary = match &app.outcome {
        None => {
            let waiting = Paragraph::new("Counts appear when the import finishes...")
                .style(Style::default().fg(Color::DarkGray))
                .block(block);
            f.render_widget(waiting, area);
            return;
        }
        Some(Err(err)) => {
            let failed = Paragraph::new(err.to_string())
                .style(Style::default().fg(Color::Red))
                .block(block);
            f.render_widget(failed, area);
            return;
        }
        Some(Ok(summary)) => summary,
    };

    let rows = [
        ("Delimiter", summary.delimiter.clone()),
        (
            "Rows",
            format!(
                "{} imported, {} skipped, {} failed",
                summary.rows_imported, summary.rows_skipped, summary.rows_failed
            ),
        ),
        (
            "Applications",
            format!("{} created, {} updated", summary.applications_created, summary.applications_updated),
        ),
        (
            "Integrations",
            format!("{} created, {} updated", summary.integrations_created, summary.integrations_updated),
        ),
        (
            "Reference data",
            format!(
                "{} business units, {} categories created",
                summary.business_units_created, summary.categories_created
            ),
        ),
        ("Reconciliation", summary.reconciliation.summary()),
        ("Fingerprint", summary.fingerprint.chars().take(16).collect()),
    ]
    .into_iter()
    .map(|(label, value)| {
        Row::new(vec![
            Cell::from(label).style(Style::default().fg(Color::Yellow)),
            Cell::from(value),
        ])
    });

    let table = Table::new(rows, [Constraint::Length(16), Constraint::Min(10)]).block(block);
    f.render_widget(table, area);
}

fn render_warnings(f: &mut Frame, area: Rect, app: &mut App) {
    let warnings: &[String] = match &app.outcome {
        Some(Ok(summary)) => &summary.warnings,
        _ => &[],
    };
    let title = format!(" Warnings ({}) ", warnings.len());

    let rows: Vec<Row> = warnings
        .iter()
        .map(|w| Row::new(vec![Cell::from(w.as_str())]))
        .collect();

    let table = Table::new(rows, [Constraint::Percentage(100)])
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("▶ ");

    f.render_stateful_widget(table, area, &mut app.warnings_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![Span::styled(
        format!(" {:.0}% ", app.ratio() * 100.0),
        Style::default().fg(Color::Cyan),
    )];

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Warnings | "));
    if app.is_finished() {
        status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
        status_spans.push(Span::raw(" Quit"));
    } else {
        status_spans.push(Span::styled("running...", Style::default().fg(Color::DarkGray)));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}
