pub mod screen;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, Widget, Wrap},
};

use diktat::{
    clip::ClipStatus,
    form::Field,
    review::{self, COLUMNS},
    session::SessionState,
};

use crate::{ui::screen::current_screen, App};

const HORIZONTAL_MARGIN: u16 = 2;
const CELL_WIDTH: u16 = 8;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let state = self.controller.snapshot();
        let status = self.controller.player().status();
        current_screen(state.phase).render(self, &state, &status, area, buf);
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

fn header(area: Rect, buf: &mut Buffer) {
    Paragraph::new(vec![
        Line::from(Span::styled("Numbers Dictation", bold().fg(Color::Cyan))),
        Line::from(Span::styled(
            "Listen to all numbers, then check your answers",
            dim(),
        )),
    ])
    .alignment(Alignment::Center)
    .render(area, buf);
}

fn footer(text: &str, area: Rect, buf: &mut Buffer) {
    Paragraph::new(Span::styled(text.to_owned(), dim()))
        .alignment(Alignment::Center)
        .render(area, buf);
}

pub fn render_setup(app: &App, status: &ClipStatus, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(5), // settings
            Constraint::Length(4), // summary
            Constraint::Min(4),    // preview
            Constraint::Length(1), // keys
        ])
        .split(area);

    header(chunks[0], buf);

    let form = &app.form;
    let settings: Vec<Line> = Field::ALL
        .iter()
        .map(|&field| {
            let focused = form.focus == field;
            let (marker, style) = if focused {
                ("> ", bold().fg(Color::Yellow))
            } else {
                ("  ", Style::default())
            };
            Line::from(vec![
                Span::styled(marker, style),
                Span::styled(format!("{:<26}", field.label()), style),
                Span::styled(format!("< {} >", form.value(field)), style.patch(bold())),
            ])
        })
        .collect();
    Paragraph::new(settings)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Dictation Settings"),
        )
        .render(chunks[1], buf);

    let config = form.config();
    Paragraph::new(vec![
        Line::from(Span::styled("Ready to start?", bold())),
        Line::from(format!(
            "You will hear {} numbers at {} speed with {:.1}s pauses. Listen carefully!",
            config.count, config.speed, config.pause_secs
        )),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::TOP))
    .render(chunks[2], buf);

    render_preview(app, status, chunks[3], buf);

    footer(
        "↑/↓ select  ←/→ adjust  PgUp/PgDn ±10  Enter start  p preview  q quit",
        chunks[4],
        buf,
    );
}

fn render_preview(app: &App, status: &ClipStatus, area: Rect, buf: &mut Buffer) {
    let mut lines = match status {
        ClipStatus::Idle => vec![Line::from(Span::styled(
            format!("Press p to hear a random number at {} speed", app.form.speed),
            dim(),
        ))],
        ClipStatus::Loading(clip) => vec![Line::from(Span::styled(
            format!("Loading... (speed: {} | number: #{})", clip.speed, clip.number),
            Style::default().fg(Color::Yellow),
        ))],
        ClipStatus::Playing(clip) => vec![Line::from(Span::styled(
            format!("Playing (speed: {} | number: #{}) - p to stop", clip.speed, clip.number),
            Style::default().fg(Color::Green),
        ))],
        ClipStatus::Failed(message) => vec![
            Line::from(Span::styled(message.clone(), bold().fg(Color::Red))),
            Line::from(Span::styled(
                format!(
                    "Make sure the clip server is running at {}",
                    app.controller.player().source_location()
                ),
                Style::default().fg(Color::Red),
            )),
        ],
    };
    lines.insert(0, Line::default());

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::TOP).title("Preview"))
        .render(area, buf);
}

pub fn render_playing(state: &SessionState, status: &ClipStatus, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(2), // title
            Constraint::Length(3), // progress
            Constraint::Length(2), // status
            Constraint::Min(0),
            Constraint::Length(1), // keys
        ])
        .split(area);

    header(chunks[0], buf);

    Paragraph::new(Span::styled("Listen carefully...", bold()))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

    let total = state.numbers.len();
    let position = state.cursor.map_or(0, |c| c + 1);
    let ratio = if total == 0 {
        0.0
    } else {
        (state.played as f64 / total as f64).clamp(0.0, 1.0)
    };
    Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio)
        .label(format!("{position} / {total}"))
        .render(chunks[2], buf);

    // nothing has sounded yet while the first clip downloads
    let message = if state.played == 0 && !matches!(status, ClipStatus::Playing(_)) {
        "Preparing to play numbers...".to_string()
    } else {
        format!("Playing number {position}...")
    };
    Paragraph::new(Span::styled(message, dim()))
        .alignment(Alignment::Center)
        .render(chunks[3], buf);

    footer("Press ESC to stop", chunks[5], buf);
}

pub fn render_review(state: &SessionState, area: Rect, buf: &mut Buffer) {
    let table_height = review::row_count(state.numbers.len()) as u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(3), // title
            Constraint::Length(table_height + 2),
            Constraint::Length(2), // early end
            Constraint::Min(0),
            Constraint::Length(1), // keys
        ])
        .split(area);

    header(chunks[0], buf);

    Paragraph::new(vec![
        Line::from(Span::styled(
            "Dictation complete - check your answers",
            bold().fg(Color::Green),
        )),
        Line::from(Span::styled(
            format!(
                "Here are all {} numbers that were played:",
                state.numbers.len()
            ),
            dim(),
        )),
    ])
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    let rows = review::rows(&state.numbers).into_iter().map(|row| {
        Row::new(row.into_iter().map(|cell| {
            let text = cell.map(|n| n.to_string()).unwrap_or_default();
            Cell::from(Line::from(text).alignment(Alignment::Center))
        }))
        .style(bold())
    });
    let table_width = CELL_WIDTH * COLUMNS as u16 + COLUMNS as u16 + 1;
    let table_area = centered(chunks[2], table_width);
    Table::new(rows, [Constraint::Length(CELL_WIDTH); COLUMNS])
        .column_spacing(1)
        .block(Block::default().borders(Borders::ALL))
        .render(table_area, buf);

    if state.ended_early() {
        let note = match &state.error {
            Some(error) => Span::styled(error.clone(), bold().fg(Color::Red)),
            None => Span::styled(
                format!(
                    "Stopped after {} of {}",
                    state.played,
                    state.numbers.len()
                ),
                Style::default().fg(Color::Yellow),
            ),
        };
        Paragraph::new(note)
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
    }

    footer("n / Enter new dictation  q quit", chunks[5], buf);
}

/// Horizontally centred slice of `area`, at most `width` wide
fn centered(area: Rect, width: u16) -> Rect {
    let width = width.min(area.width);
    Rect {
        x: area.x + (area.width - width) / 2,
        width,
        ..area
    }
}
