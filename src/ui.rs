use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
};
use crate::app::{transcript_height, App};
use crate::history::Role;
use crate::render::{Entry, EntryState};

const LEFT_PANEL_WIDTH: u16 = 30;
const RIGHT_PANEL_WIDTH: u16 = 36;

/// Style `**bold**` and `` `code` `` spans in one line of a reply
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut current_text = String::new();
    let mut rest = text;

    while !rest.is_empty() {
        let (marker, style) = if rest.starts_with("**") {
            ("**", Style::default().add_modifier(Modifier::BOLD))
        } else if rest.starts_with('`') {
            ("`", Style::default().fg(Color::Green))
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                current_text.push(c);
            }
            rest = chars.as_str();
            continue;
        };

        let body = &rest[marker.len()..];
        match body.find(marker) {
            Some(end) if end > 0 => {
                // Push any accumulated plain text
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(body[..end].to_string(), style));
                rest = &body[end + marker.len()..];
            }
            _ => {
                // No closing marker, treat as literal
                current_text.push_str(marker);
                rest = body;
            }
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let left_width = if app.panels.left_open { LEFT_PANEL_WIDTH } else { 0 };
    let right_width = if app.panels.right_open { RIGHT_PANEL_WIDTH } else { 0 };
    let [left_area, main_area, right_area] = Layout::horizontal([
        Constraint::Length(left_width),
        Constraint::Min(0),
        Constraint::Length(right_width),
    ])
    .areas(body_area);

    if app.panels.left_open {
        render_outline(app, frame, left_area);
    }
    render_chat(app, frame, main_area);
    if app.panels.right_open {
        render_info(app, frame, right_area);
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" neochat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.client.endpoint(), Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(title), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let line = match &app.status {
        Some(status) if status.starts_with("Error") => Line::from(Span::styled(
            format!(" {}", status),
            Style::default().fg(Color::Red),
        )),
        Some(status) => Line::from(Span::styled(
            format!(" {}", status),
            Style::default().fg(Color::Yellow),
        )),
        None => {
            let hints: &[(&str, &str)] = if app.is_busy() {
                &[("Esc", "cancel"), ("^B/^O", "panels"), ("PgUp/PgDn", "scroll"), ("^C", "quit")]
            } else {
                &[
                    ("Enter", "send"),
                    ("^R", "regenerate"),
                    ("^L", "clear"),
                    ("^B/^O", "panels"),
                    ("^C", "quit"),
                ]
            };
            let mut spans = vec![Span::raw(" ")];
            for (key, action) in hints {
                spans.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
                spans.push(Span::styled(format!(" {}  ", action), Style::default().fg(Color::DarkGray)));
            }
            Line::from(spans)
        }
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn entry_lines(entry: &Entry, animation_frame: u8, lines: &mut Vec<Line<'static>>) {
    match entry.role {
        Role::User => lines.push(Line::from(Span::styled(
            "You:",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))),
        Role::Bot => lines.push(Line::from(Span::styled(
            "Bot:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))),
    }

    // Animated ellipsis: cycles through ".", "..", "..."
    let dots = ".".repeat((animation_frame as usize) + 1);

    if entry.text.is_empty() && entry.is_live() {
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    } else if entry.role == Role::User {
        for line in entry.text.lines() {
            lines.push(Line::from(line.to_string()));
        }
    } else {
        for line in entry.text.lines() {
            lines.push(parse_markdown_line(line));
        }
    }

    match entry.state {
        EntryState::Live { pending: true } => {
            if let Some(last) = lines.last_mut() {
                last.spans.push(Span::styled(dots, Style::default().fg(Color::DarkGray)));
            }
        }
        EntryState::Failed => lines.push(Line::from(Span::styled(
            "(reply interrupted)",
            Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC),
        ))),
        EntryState::Live { pending: false } | EntryState::Final => {}
    }

    lines.push(Line::default());
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);
    app.sync_scroll();

    let border_color = if app.is_busy() { Color::Yellow } else { Color::Cyan };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Chat ");

    let entries = app.session.surface().entries();
    let chat_text = if entries.is_empty() {
        Text::from(Span::styled(
            "Type a message and press Enter...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        for entry in entries {
            entry_lines(entry, app.animation_frame, &mut lines);
        }
        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    frame.render_widget(chat, chat_area);

    let total = transcript_height(entries, app.chat_width as usize);
    if total > app.chat_height {
        let mut scrollbar_state = ScrollbarState::new(total.saturating_sub(app.chat_height) as usize)
            .position(app.scroll as usize);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            chat_area,
            &mut scrollbar_state,
        );
    }

    render_input(app, frame, input_area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (title, border_color) = if app.is_busy() {
        (" Waiting for reply (Esc to cancel) ", Color::DarkGray)
    } else {
        (" Message ", Color::Yellow)
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    // Get the visible slice of the input
    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let text_color = if app.is_busy() { Color::DarkGray } else { Color::Cyan };
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(text_color))
        .block(input_block);
    frame.render_widget(input, area);

    let cursor_x = (cursor_pos - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

/// Left panel: one line per finalized turn
fn render_outline(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let width = area.width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = app
        .session
        .history()
        .turns()
        .iter()
        .map(|turn| {
            let (marker, color) = match turn.role {
                Role::User => ("> ", Color::Cyan),
                Role::Bot => ("  ", Color::Yellow),
            };
            let summary: String = turn
                .message
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .chars()
                .take(width)
                .collect();
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(color)),
                Span::raw(summary),
            ]))
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

/// Right panel: connection info and key bindings
fn render_info(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Session ");

    let label = Style::default().fg(Color::DarkGray);
    let state = if app.is_busy() {
        Span::styled("streaming", Style::default().fg(Color::Yellow))
    } else {
        Span::styled("idle", Style::default().fg(Color::Green))
    };

    let mut lines = vec![
        Line::from(Span::styled("Endpoint", label)),
        Line::from(app.client.endpoint()),
        Line::default(),
        Line::from(vec![Span::styled("State  ", label), state]),
        Line::from(vec![
            Span::styled("Turns  ", label),
            Span::raw(app.session.history().len().to_string()),
        ]),
        Line::from(vec![Span::styled("Store  ", label), Span::raw(app.store_label.clone())]),
    ];

    if let Some(error) = app.session.last_error() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled("Last error", label)));
        lines.push(Line::from(Span::styled(error.to_string(), Style::default().fg(Color::Red))));
    }

    lines.push(Line::default());
    for (key, action) in [
        ("Enter", "send message"),
        ("Esc", "cancel reply"),
        ("^R", "regenerate"),
        ("^L", "clear history"),
        ("^B", "toggle outline"),
        ("^O", "toggle this panel"),
        ("^U/^D", "half page"),
        ("^C", "quit"),
    ] {
        lines.push(Line::from(vec![
            Span::styled(format!("{:<7}", key), Style::default().fg(Color::Cyan)),
            Span::raw(action),
        ]));
    }

    let info = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(info, area);
}
