use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, InputMode};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const PL_D: Color = Color::Rgb(82, 24, 124);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    if app.picker_open() {
        render_picker(frame, app);
    }
    if app.show_help() {
        render_help_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app);
    let right_line = build_right_header_line(app);
    let right_width = spans_width(&right_line.spans) as u16;
    if area.width < 42 || right_width == 0 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn build_left_header_line(app: &App) -> Line<'static> {
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " NSWATCH ", Color::Black, ACCENT, PL_A);
    push_powerline_segment(
        &mut spans,
        format!(" 󱃾 {} ", compact_text(app.active_target(), 28)),
        Color::White,
        PL_A,
        PL_C,
    );
    push_powerline_segment(
        &mut spans,
        format!(
            " 󰉋 {} ",
            compact_text(&app.navigation().current().to_string(), 36)
        ),
        Color::White,
        PL_C,
        BG,
    );
    Line::from(spans)
}

fn build_right_header_line(app: &App) -> Line<'static> {
    let members = app.members();
    let mut spans = Vec::new();
    let mut next_bg = BG;

    if let Some(synced) = members.last_synced {
        push_powerline_segment_rtl(
            &mut spans,
            format!(" 󰥔 {} ", synced.format("%H:%M:%S")),
            Color::White,
            PL_D,
            next_bg,
        );
        next_bg = PL_D;
    }

    let (label, fg, bg) = if members.loading {
        ("loading".to_string(), Color::Black, WARN)
    } else {
        let (fg, bg) = connection_colors(&members.connection);
        (members.connection.clone(), fg, bg)
    };
    push_powerline_segment_rtl(&mut spans, format!(" {label} "), fg, bg, next_bg);
    spans.push(Span::styled(" ", Style::default().bg(bg)));
    Line::from(spans)
}

fn connection_colors(label: &str) -> (Color, Color) {
    match label {
        "live" => (Color::Black, ACCENT),
        "connecting" | "reconnecting" => (Color::Black, WARN),
        _ => (Color::White, Color::Rgb(30, 41, 59)),
    }
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    let Some(error) = app.members().last_error.as_deref() else {
        render_table(frame, area, app);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(3)])
        .split(area);
    let panel = Paragraph::new(Text::from(error.to_string()))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("List Error")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ERROR))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(ERROR));
    frame.render_widget(panel, chunks[0]);
    render_table(frame, chunks[1], app);
}

fn render_table(frame: &mut Frame, area: Rect, app: &App) {
    let members = app.members();
    let header_row = Row::new(["SEL", "NAMESPACE"].into_iter().map(|header| {
        Cell::from(header).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let rows = members.available.iter().map(|name| {
        let selected = members.is_selected(name);
        let mark = if selected { "●" } else { "·" };
        let style = if selected {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(MUTED)
        };
        Row::new([
            Cell::from(mark).style(Style::default().fg(ACCENT)),
            Cell::from(name.clone()).style(style),
        ])
    });

    let scope = if members.all_selected {
        "all".to_string()
    } else {
        members.selected.len().to_string()
    };
    let block = Block::default()
        .title(format!(
            "Namespaces ({})  selected: {}",
            members.available.len(),
            scope
        ))
        .borders(Borders::ALL)
        .border_style(if app.picker_open() {
            Style::default().fg(MUTED)
        } else {
            Style::default().fg(ACCENT)
        })
        .style(Style::default().bg(PANEL));

    let table = Table::new(rows, [Constraint::Length(4), Constraint::Min(10)])
        .header(header_row)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("󰜴 ");

    let mut state = TableState::default();
    if !members.available.is_empty() && !app.picker_open() {
        state.select(Some(app.cursor()));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_picker(frame: &mut Frame, app: &App) {
    let area = centered_rect(50, 70, frame.area());
    frame.render_widget(Clear, area);

    let members = app.members();
    let rows = members.available.iter().map(|name| {
        let checkbox = if members.is_selected(name) {
            "[x]"
        } else {
            "[ ]"
        };
        Row::new([
            Cell::from(checkbox).style(Style::default().fg(ACCENT)),
            Cell::from(name.clone()).style(Style::default().fg(Color::White)),
        ])
    });

    let block = Block::default()
        .title(format!(
            "Select namespaces ({}/{})",
            members.selected.len(),
            members.available.len()
        ))
        .title_bottom(Line::from(" space toggle  a all  x none  esc close ").alignment(Alignment::Right))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));

    let table = Table::new(rows, [Constraint::Length(4), Constraint::Min(10)])
        .block(block)
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Rgb(94, 234, 212))
                .add_modifier(Modifier::BOLD),
        );

    let mut state = TableState::default();
    if !members.available.is_empty() {
        state.select(Some(app.cursor()));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    if app.mode() == InputMode::Location {
        let mut spans = Vec::new();
        push_powerline_segment(&mut spans, " 󰉋 loc ", Color::Black, ACCENT, PL_B);
        push_powerline_segment(
            &mut spans,
            format!(" :{} ", app.input()),
            Color::White,
            PL_B,
            BG,
        );
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let (mode_label, mode_bg) = match app.mode() {
        InputMode::Picker => (" 󰒺 pick ", PL_D),
        _ => (" 󰘳 nrm ", PL_A),
    };
    let status_text = app.status().to_string();
    let status_icon = footer_status_icon(&status_text);
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, mode_label, Color::White, mode_bg, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(
            " {status_icon} {} ",
            compact_text(&status_text, area.width.saturating_sub(24).max(24) as usize)
        ),
        Color::White,
        PL_B,
        BG,
    );

    let hint = Line::from(Span::styled(
        " ^N pick  ? help ",
        Style::default().fg(MUTED).bg(BG),
    ));
    let hint_width = spans_width(&hint.spans) as u16;
    if area.width < 60 {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(hint_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(hint)
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn footer_status_icon(status_text: &str) -> &'static str {
    let status = status_text.to_ascii_lowercase();
    let has_failure = [
        "failed",
        "error",
        "invalid",
        "timed out",
        "unreachable",
        "refused",
    ]
    .iter()
    .any(|needle| status.contains(needle));
    if has_failure { "󰅚" } else { "󰄬" }
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "nswatch help  mode:{}  cluster:{}  clusters:{}",
            help_mode_label(app.mode()),
            app.active_target(),
            app.targets().len()
        )),
        Line::from(""),
    ];
    for line in help_lines() {
        lines.push(Line::from(line));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(modal, area);
}

fn help_lines() -> [&'static str; 7] {
    [
        "Clusters: ←/→ or [ ] switch  r re-list and reconnect",
        "Move: j/k ↑/↓  g/G top/bottom",
        "Picker: Ctrl+N open/close  Space toggle  a all  x none  Esc/Enter close",
        "Location: : edit and Enter to navigate  b back",
        "A ?namespace=<name> location selects that namespace once per navigation.",
        "Picking by hand clears it from the location.",
        "q quit  ? toggle help",
    ]
}

fn help_mode_label(mode: InputMode) -> &'static str {
    match mode {
        InputMode::Normal => "normal",
        InputMode::Picker => "picker",
        InputMode::Location => "location",
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn push_powerline_segment_rtl(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
