use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthChar;

use crate::core::chat_session::{ChatSession, TurnPhase};
use crate::core::message::{FragmentKind, Role, Segment, Turn};
use crate::lms::{format_size, ServerStatus};
use crate::ui::markdown::render_markdown;
use crate::ui::state::{Panel, Popup, UiState};

const HELP_TEXT: &[(&str, &str)] = &[
    ("Tab / Shift+Tab", "Next / previous panel"),
    ("1-5", "Jump to panel"),
    ("Enter", "Send message, choose or load model"),
    ("Esc", "Cancel streaming response, leave chat"),
    ("u / U", "Unload selected model / all models"),
    ("Up / Down", "Move selection"),
    ("PageUp / PageDown", "Scroll chat"),
    ("Ctrl+S", "Edit system prompt"),
    ("Ctrl+L", "Clear conversation"),
    ("?", "Toggle this help"),
    ("q / Ctrl+C", "Quit"),
];

pub fn ui(f: &mut Frame, state: &UiState, session: &ChatSession) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(f.area());

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Percentage(40),
            Constraint::Min(3),
        ])
        .split(columns[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),
            Constraint::Length(5),
            Constraint::Length(8),
        ])
        .split(columns[1]);

    render_status(f, left[0], state, session);
    render_loaded(f, left[1], state);
    render_downloaded(f, left[2], state);
    render_chat(f, right[0], state, session);
    render_input(f, right[1], state, session);
    render_logs(f, right[2], state);

    match state.popup {
        Some(Popup::Help) => render_help(f),
        Some(Popup::SystemPrompt) => render_system_prompt(f, state),
        None => {}
    }
}

fn panel_block(panel: Panel, state: &UiState) -> Block<'static> {
    let focused = state.focus == panel && state.popup.is_none();
    let border = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(format!("[{}] {}", panel.number(), panel.title()))
}

fn render_status(f: &mut Frame, area: Rect, state: &UiState, session: &ChatSession) {
    let (label, color) = match state.server_status {
        Some(ServerStatus::On) => ("ON", Color::Green),
        Some(ServerStatus::Off) => ("OFF", Color::Red),
        None => ("unknown", Color::Yellow),
    };
    let active = state.active_model().unwrap_or_else(|| "none".to_string());
    let activity = match (&state.pending_model_action, session.phase()) {
        (Some(action), _) => action.clone(),
        (None, TurnPhase::Sending) => "sending…".to_string(),
        (None, TurnPhase::Streaming) => "streaming…".to_string(),
        (None, TurnPhase::Idle) => "idle".to_string(),
    };
    let lines = vec![
        Line::from(vec![
            Span::raw("Server: "),
            Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::raw(format!("  {activity}")),
        ]),
        Line::from(format!("Model: {active}")),
    ];
    f.render_widget(
        Paragraph::new(lines).block(panel_block(Panel::Status, state)),
        area,
    );
}

fn render_list(
    f: &mut Frame,
    area: Rect,
    state: &UiState,
    panel: Panel,
    items: Vec<ListItem<'static>>,
    selected: usize,
) {
    let empty = items.is_empty();
    let list = List::new(items)
        .block(panel_block(panel, state))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut list_state = ListState::default();
    if !empty && state.focus == panel {
        list_state.select(Some(selected));
    }
    f.render_stateful_widget(list, area, &mut list_state);
}

fn render_loaded(f: &mut Frame, area: Rect, state: &UiState) {
    let active = state.active_model();
    let items = state
        .loaded
        .iter()
        .map(|model| {
            let marker = if active.as_deref() == Some(model.identifier.as_str()) {
                "● "
            } else {
                "  "
            };
            ListItem::new(format!("{marker}{} [{}]", model.identifier, model.status))
        })
        .collect();
    render_list(f, area, state, Panel::Loaded, items, state.loaded_selected);
}

fn render_downloaded(f: &mut Frame, area: Rect, state: &UiState) {
    let items = state
        .downloaded
        .iter()
        .map(|model| {
            let style = if model.can_load {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };
            ListItem::new(Line::styled(
                format!("{} ({})", model.model_key, format_size(model.size_bytes)),
                style,
            ))
        })
        .collect();
    render_list(
        f,
        area,
        state,
        Panel::Downloaded,
        items,
        state.downloaded_selected,
    );
}

fn render_chat(f: &mut Frame, area: Rect, state: &UiState, session: &ChatSession) {
    let width = area.width.saturating_sub(2) as usize;
    let height = area.height.saturating_sub(2) as usize;
    let lines = build_chat_lines(
        session.history(),
        session.response_buffer().segments(),
        session.phase(),
        width,
    );
    let top = visible_top(lines.len(), height, state.chat_scroll);
    f.render_widget(
        Paragraph::new(lines).block(panel_block(Panel::Chat, state)).scroll((top, 0)),
        area,
    );
}

fn render_input(f: &mut Frame, area: Rect, state: &UiState, session: &ChatSession) {
    let title = if session.is_busy() {
        "Message (Esc to cancel)"
    } else {
        "Message (Enter to send, ? for help)"
    };
    let mut input = state.input.clone();
    let border = if state.focus == Panel::Chat && state.popup.is_none() {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    input.set_block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(title),
    );
    f.render_widget(&input, area);
}

fn render_logs(f: &mut Frame, area: Rect, state: &UiState) {
    let height = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = state
        .logs
        .iter()
        .map(|line| Line::styled(line.clone(), log_style(line)))
        .collect();
    let top = visible_top(lines.len(), height, state.log_scroll);
    f.render_widget(
        Paragraph::new(lines)
            .block(panel_block(Panel::Logs, state))
            .scroll((top, 0)),
        area,
    );
}

fn log_style(line: &str) -> Style {
    if line.contains("[ERROR]") {
        Style::default().fg(Color::Red)
    } else if line.contains("[WARN]") {
        Style::default().fg(Color::Yellow)
    } else if line.contains("[DEBUG]") {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    }
}

fn render_help(f: &mut Frame) {
    let area = centered_rect(60, 60, f.area());
    let lines: Vec<Line> = HELP_TEXT
        .iter()
        .map(|(keys, action)| {
            Line::from(vec![
                Span::styled(
                    format!("{keys:<20}"),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw(*action),
            ])
        })
        .collect();
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Help"))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn render_system_prompt(f: &mut Frame, state: &UiState) {
    let area = centered_rect(70, 40, f.area());
    let mut editor = state.system_input.clone();
    editor.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title("System prompt (Enter to save, Alt+Enter for newline, Esc to discard)"),
    );
    f.render_widget(Clear, area);
    f.render_widget(&editor, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

/// First line to show so the view ends `from_bottom` lines above the end.
pub fn visible_top(total: usize, height: usize, from_bottom: u16) -> u16 {
    let max_top = total.saturating_sub(height);
    max_top.saturating_sub(from_bottom as usize).min(u16::MAX as usize) as u16
}

/// Flattens the conversation plus the in-progress response into display
/// lines already wrapped to `width`.
pub fn build_chat_lines(
    history: &[Turn],
    streaming: &[Segment],
    phase: TurnPhase,
    width: usize,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for turn in history {
        match turn.role {
            Role::System => push_wrapped(
                &mut lines,
                &format!("System: {}", turn.content),
                Style::default().fg(Color::DarkGray),
                width,
            ),
            Role::User => push_wrapped(
                &mut lines,
                &format!("You: {}", turn.content),
                Style::default().fg(Color::Cyan),
                width,
            ),
            Role::Assistant if turn.segments.is_empty() => {
                lines.extend(render_markdown(&turn.content, width))
            }
            Role::Assistant => push_segments(&mut lines, &turn.segments, width),
        }
        lines.push(Line::default());
    }

    push_segments(&mut lines, streaming, width);
    if phase != TurnPhase::Idle {
        lines.push(Line::styled(
            if phase == TurnPhase::Sending { "…" } else { "▌" },
            Style::default().fg(Color::DarkGray),
        ));
    }
    lines
}

fn push_segments(lines: &mut Vec<Line<'static>>, segments: &[Segment], width: usize) {
    for segment in segments {
        match segment.kind {
            FragmentKind::Output => lines.extend(render_markdown(&segment.text, width)),
            FragmentKind::Reasoning => push_wrapped(
                lines,
                &segment.text,
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
                width,
            ),
        }
    }
}

fn push_wrapped(lines: &mut Vec<Line<'static>>, text: &str, style: Style, width: usize) {
    for row in wrap_text(text, width) {
        lines.push(Line::from(Span::styled(row, style)));
    }
}

/// Hard-wraps `text` at `width` display columns, preferring word breaks.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    for paragraph in text.split('\n') {
        let mut row = String::new();
        let mut row_width = 0;
        for word in paragraph.split_inclusive(' ') {
            let visible = word.trim_end_matches(' ');
            let visible_width: usize = visible.chars().map(|c| c.width().unwrap_or(0)).sum();
            if row_width > 0 && row_width + visible_width > width {
                rows.push(std::mem::take(&mut row).trim_end().to_string());
                row_width = 0;
            }
            for ch in word.chars() {
                let ch_width = ch.width().unwrap_or(0);
                // trailing spaces may overhang; they are trimmed on break
                if ch != ' ' && row_width > 0 && row_width + ch_width > width {
                    rows.push(std::mem::take(&mut row));
                    row_width = 0;
                }
                row.push(ch);
                row_width += ch_width;
            }
        }
        rows.push(row.trim_end().to_string());
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::create_test_turns;

    fn plain(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn wraps_on_words_and_splits_long_words() {
        assert_eq!(wrap_text("hello brave new world", 11), vec!["hello brave", "new world"]);
        assert_eq!(wrap_text("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap_text("a\n\nb", 10), vec!["a", "", "b"]);
    }

    #[test]
    fn wide_characters_count_double() {
        assert_eq!(wrap_text("日本語", 4), vec!["日本", "語"]);
    }

    #[test]
    fn chat_lines_label_roles_and_separate_turns() {
        let lines = build_chat_lines(&create_test_turns(), &[], TurnPhase::Idle, 80);
        let text = plain(&lines);
        assert_eq!(text[0], "You: Hello");
        assert_eq!(text[1], "");
        assert_eq!(text[2], "Hi there!");
        assert_eq!(text.len(), 8);
    }

    #[test]
    fn streaming_segments_follow_history_with_indicator() {
        let streaming = vec![
            Segment {
                kind: FragmentKind::Reasoning,
                text: "thinking".into(),
            },
            Segment {
                kind: FragmentKind::Output,
                text: "Hel".into(),
            },
        ];
        let lines = build_chat_lines(&[Turn::user("Hi")], &streaming, TurnPhase::Streaming, 80);
        let text = plain(&lines);
        assert_eq!(text, vec!["You: Hi", "", "thinking", "Hel", "▌"]);
        assert!(lines[2].spans[0].style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn output_renders_markdown_while_reasoning_stays_plain() {
        let turn = Turn::assistant_from_segments(vec![
            Segment {
                kind: FragmentKind::Reasoning,
                text: "**raw** thought".into(),
            },
            Segment {
                kind: FragmentKind::Output,
                text: "## Answer\n\n- **yes**".into(),
            },
        ]);
        let lines = build_chat_lines(&[turn], &[], TurnPhase::Idle, 80);
        let text = plain(&lines);
        assert_eq!(text, vec!["**raw** thought", "Answer", "", "- yes", ""]);
        assert!(lines[1].spans[0].style.add_modifier.contains(Modifier::BOLD));
        let yes = lines[3].spans.last().unwrap();
        assert_eq!(yes.content, "yes");
        assert!(yes.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn scroll_offset_counts_from_bottom() {
        assert_eq!(visible_top(100, 20, 0), 80);
        assert_eq!(visible_top(100, 20, 30), 50);
        assert_eq!(visible_top(100, 20, 500), 0);
        assert_eq!(visible_top(5, 20, 0), 0);
    }
}
