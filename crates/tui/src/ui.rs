use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
    Frame,
};

use lastsec_core::platform::hotkey::HOTKEY_LABEL;
use lastsec_core::types::TimerReading;

use crate::app::RunState;
use crate::App;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // banner
            Constraint::Length(2), // help
            Constraint::Length(3), // countdown
            Constraint::Length(4), // recognition
            Constraint::Min(0),    // stats
        ])
        .split(chunks[0]);

    draw_banner(f, app, left[0]);
    draw_help(f, left[1]);
    draw_countdown(f, app, left[2]);
    draw_recognition(f, app, left[3]);
    draw_stats(f, app, left[4]);

    if app.log_visible && chunks.len() > 1 {
        draw_logs(f, app, chunks[1]);
    }

    if let Some(dialog) = &app.confirm {
        dialog.render(f);
    }
}

pub fn banner(state: RunState) -> (&'static str, Color) {
    match state {
        RunState::Idle => ("IDLE (Press S to start)", Color::Gray),
        RunState::Monitoring => ("MONITORING (P to pause, X to stop)", Color::Green),
        RunState::Paused => ("PAUSED (P to resume)", Color::Yellow),
        RunState::Armed => ("ARMED", Color::Magenta),
        RunState::Completed => ("COMPLETED (Press S to run again)", Color::Cyan),
        RunState::Stopped => ("STOPPED (Press S to start)", Color::Red),
        RunState::Error => ("ERROR (Press S to retry)", Color::Red),
    }
}

/// Red in the last five seconds.
pub fn timer_color(reading: &TimerReading) -> Color {
    if reading.minutes == 0 && reading.seconds <= 5 {
        Color::Red
    } else {
        Color::Cyan
    }
}

pub fn confidence_color(confidence: f32) -> Color {
    if confidence > 0.9 {
        Color::Green
    } else if confidence > 0.7 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn draw_banner(f: &mut Frame, app: &App, area: Rect) {
    let (label, bg) = banner(app.run_state);
    let width = area.width as usize;
    let pad_total = width.saturating_sub(label.len());
    let pad_left = pad_total / 2;
    let centered = format!(
        "{}{}{}",
        " ".repeat(pad_left),
        label,
        " ".repeat(pad_total - pad_left)
    );
    let banner = Paragraph::new(Line::from(Span::styled(
        centered,
        Style::default().fg(Color::Black).bg(bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let help = Line::from(vec![
        Span::raw(" "),
        key("s"),
        Span::raw(" start  "),
        key("p"),
        Span::raw("/"),
        key(HOTKEY_LABEL),
        Span::raw(" pause  "),
        key("x"),
        Span::raw(" stop  "),
        key("l"),
        Span::raw(" log  "),
        key("q"),
        Span::raw(" quit"),
    ]);
    f.render_widget(Paragraph::new(help), area);
}

fn draw_countdown(f: &mut Frame, app: &App, area: Rect) {
    let (text, color) = match &app.timer {
        Some(reading) => (
            format!("{:02}分{:02}秒", reading.minutes, reading.seconds),
            timer_color(reading),
        ),
        None => ("--分--秒".to_string(), Color::DarkGray),
    };
    let timer = Paragraph::new(Line::from(Span::styled(
        text,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )))
    .alignment(ratatui::layout::Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Countdown ")
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(timer, area);
}

fn draw_recognition(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" OCR ")
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner);

    let Some(rec) = &app.recognition else {
        f.render_widget(
            Paragraph::new(Span::styled(" no text yet", Style::default().fg(Color::DarkGray))),
            rows[0],
        );
        return;
    };

    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::raw(" "),
            Span::styled(rec.text.as_str(), Style::default().fg(Color::White)),
        ])),
        rows[0],
    );
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(confidence_color(rec.confidence)))
        .ratio(rec.confidence.clamp(0.0, 1.0) as f64)
        .label(format!("{:.1}%", rec.confidence * 100.0));
    f.render_widget(gauge, rows[1]);
}

fn draw_stats(f: &mut Frame, app: &App, area: Rect) {
    let dim = Style::default().fg(Color::DarkGray);
    let mut lines = vec![
        Line::from(vec![
            Span::styled(" status  ", dim),
            Span::styled(app.status.as_str(), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled(" clicks  ", dim),
            Span::styled(
                app.total_clicks.to_string(),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
        ]),
    ];
    if let Some(stats) = &app.last_stats {
        lines.push(Line::from(vec![
            Span::styled(" last run  ", dim),
            Span::raw(format!(
                "{} cycles, {} frames, {} readings",
                stats.cycles, stats.frames, stats.readings
            )),
        ]));
    }
    if let Some(err) = &app.last_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(" {}", err),
            Style::default().fg(Color::Red),
        )));
    }

    let panel = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Stats ")
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(panel, area);
}

fn draw_logs(f: &mut Frame, app: &App, area: Rect) {
    let visible_height = area.height.saturating_sub(2) as usize;
    let total = app.log_messages.len();
    let scroll = app.log_scroll.min(total.saturating_sub(visible_height));
    let start = total.saturating_sub(visible_height + scroll);
    let end = total.saturating_sub(scroll);
    let log_lines: Vec<Line> = app.log_messages[start..end]
        .iter()
        .map(|m| parse_log_line(m))
        .collect();

    let log_panel = Paragraph::new(log_lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Logs ")
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(log_panel, area);
}

/// Parse a structured log line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a colored Line.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    let &[level, prefix, color, timestamp, message] = parts.as_slice() else {
        return Line::from(raw);
    };

    let color = match color.parse::<u8>().unwrap_or(0) {
        1 => Color::DarkGray,
        2 => Color::LightBlue,
        3 => Color::LightMagenta,
        4 => Color::LightGreen,
        _ => Color::White,
    };

    let mut spans = vec![
        Span::styled(timestamp, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        _ => {}
    }
    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(message, Style::default().fg(color)));
    Line::from(spans)
}
