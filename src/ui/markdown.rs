//! Markdown rendering for assistant output.
//!
//! [`render_markdown`] turns a reply into styled ratatui lines already wrapped
//! to the chat width. Headings, emphasis, inline and fenced code, lists, block
//! quotes, rules and simple tables are handled; anything else falls back to
//! its text. Partial markdown (a reply still streaming in) renders as far as
//! it parses.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const QUOTE_PREFIX: &str = "│ ";
const CELL_SEPARATOR: &str = " │ ";

fn heading_style(level: u8) -> Style {
    let color = match level {
        1 => Color::Magenta,
        2 => Color::Blue,
        _ => Color::Cyan,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn inline_code_style() -> Style {
    Style::default().fg(Color::Yellow)
}

fn code_block_style() -> Style {
    Style::default().fg(Color::LightYellow)
}

fn link_style() -> Style {
    Style::default()
        .fg(Color::Blue)
        .add_modifier(Modifier::UNDERLINED)
}

fn marker_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

#[derive(Clone, Copy, Debug)]
enum ListKind {
    Unordered,
    Ordered(u64),
}

/// Renders `content` as markdown wrapped to `width` columns. Trailing blank
/// lines are dropped so callers control spacing between messages.
pub fn render_markdown(content: &str, width: usize) -> Vec<Line<'static>> {
    if content.trim().is_empty() {
        return Vec::new();
    }
    MarkdownRenderer::new(width).render(content)
}

struct MarkdownRenderer {
    width: usize,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    style_stack: Vec<Style>,
    list_stack: Vec<ListKind>,
    /// Marker width of every open list level; their sum is the hanging indent.
    list_indent_stack: Vec<usize>,
    pending_marker: Option<String>,
    quote_depth: usize,
    code_block: Option<Vec<String>>,
    cell_index: usize,
}

impl MarkdownRenderer {
    fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            lines: Vec::new(),
            current: Vec::new(),
            style_stack: Vec::new(),
            list_stack: Vec::new(),
            list_indent_stack: Vec::new(),
            pending_marker: None,
            quote_depth: 0,
            code_block: None,
            cell_index: 0,
        }
    }

    fn render(mut self, content: &str) -> Vec<Line<'static>> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);

        for event in Parser::new_ext(content, options) {
            match event {
                Event::Start(tag) => self.start(tag),
                Event::End(tag_end) => self.end(tag_end),
                Event::Text(text) => {
                    if let Some(block) = self.code_block.as_mut() {
                        block.extend(text.lines().map(detab));
                    } else {
                        let style = self.current_style();
                        self.current
                            .push(Span::styled(detab(&text).replace('\n', " "), style));
                    }
                }
                Event::Code(code) => {
                    self.current
                        .push(Span::styled(detab(&code), inline_code_style()));
                }
                Event::InlineMath(math) | Event::DisplayMath(math) => {
                    self.current
                        .push(Span::styled(math.to_string(), inline_code_style()));
                }
                Event::Html(html) | Event::InlineHtml(html) => {
                    let style = self.current_style();
                    self.current
                        .push(Span::styled(html.trim_end().to_string(), style));
                }
                Event::SoftBreak | Event::HardBreak => self.flush(),
                Event::Rule => {
                    self.flush();
                    let rule = "─".repeat(self.width.saturating_sub(self.prefix_width()).max(1));
                    self.push_prefixed(vec![Span::styled(rule, marker_style())]);
                    self.push_blank();
                }
                Event::TaskListMarker(checked) => {
                    let marker = if checked { "[x] " } else { "[ ] " };
                    self.current.push(Span::styled(marker, marker_style()));
                }
                Event::FootnoteReference(_) => {}
            }
        }

        self.flush();
        while self.lines.last().is_some_and(|line| line.width() == 0) {
            self.lines.pop();
        }
        self.lines
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                self.style_stack.push(heading_style(level as u8));
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
                self.push_modifier(Modifier::ITALIC);
            }
            Tag::List(start) => {
                self.flush();
                self.list_stack.push(match start {
                    Some(n) => ListKind::Ordered(n),
                    None => ListKind::Unordered,
                });
                self.list_indent_stack.push(0);
            }
            Tag::Item => {
                self.flush();
                let marker = match self.list_stack.last_mut() {
                    Some(ListKind::Ordered(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "- ".to_string(),
                };
                if let Some(indent) = self.list_indent_stack.last_mut() {
                    *indent = marker.width();
                }
                self.pending_marker = Some(marker);
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.code_block = Some(Vec::new());
            }
            Tag::Emphasis => self.push_modifier(Modifier::ITALIC),
            Tag::Strong => self.push_modifier(Modifier::BOLD),
            Tag::Strikethrough => self.push_modifier(Modifier::CROSSED_OUT),
            Tag::Link { .. } | Tag::Image { .. } => self.style_stack.push(link_style()),
            Tag::TableHead => {
                self.cell_index = 0;
                self.push_modifier(Modifier::BOLD);
            }
            Tag::TableRow => self.cell_index = 0,
            Tag::TableCell => {
                if self.cell_index > 0 {
                    self.current.push(Span::styled(CELL_SEPARATOR, marker_style()));
                }
                self.cell_index += 1;
            }
            _ => {}
        }
    }

    fn end(&mut self, tag_end: TagEnd) {
        match tag_end {
            TagEnd::Paragraph => {
                self.flush();
                if self.list_stack.is_empty() {
                    self.push_blank();
                }
            }
            TagEnd::Heading(_) => {
                self.flush();
                self.style_stack.pop();
                self.push_blank();
            }
            TagEnd::BlockQuote(_) => {
                self.flush();
                self.style_stack.pop();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::List(_) => {
                self.flush();
                self.list_stack.pop();
                self.list_indent_stack.pop();
                if self.list_stack.is_empty() {
                    self.push_blank();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::CodeBlock => {
                let block = self.code_block.take().unwrap_or_default();
                let available = self.width.saturating_sub(self.prefix_width()).max(1);
                for code_line in block {
                    let span = Span::styled(code_line, code_block_style());
                    for row in wrap_spans(vec![span], available) {
                        self.push_prefixed(row);
                    }
                }
                self.push_blank();
            }
            TagEnd::Emphasis
            | TagEnd::Strong
            | TagEnd::Strikethrough
            | TagEnd::Link
            | TagEnd::Image => {
                self.style_stack.pop();
            }
            TagEnd::TableHead => {
                self.flush();
                self.style_stack.pop();
            }
            TagEnd::TableRow => self.flush(),
            TagEnd::Table => self.push_blank(),
            _ => {}
        }
    }

    fn current_style(&self) -> Style {
        self.style_stack.last().copied().unwrap_or_default()
    }

    fn push_modifier(&mut self, modifier: Modifier) {
        let style = self.current_style().add_modifier(modifier);
        self.style_stack.push(style);
    }

    fn list_indent(&self) -> usize {
        self.list_indent_stack.iter().sum()
    }

    fn prefix_width(&self) -> usize {
        self.quote_depth * QUOTE_PREFIX.width() + self.list_indent()
    }

    /// Pushes `row` behind the quote bars and the list's hanging indent.
    fn push_prefixed(&mut self, row: Vec<Span<'static>>) {
        let mut spans = Vec::with_capacity(row.len() + 2);
        if self.quote_depth > 0 {
            spans.push(Span::styled(QUOTE_PREFIX.repeat(self.quote_depth), marker_style()));
        }
        let indent = self.list_indent();
        match self.pending_marker.take() {
            Some(marker) => {
                let lead = indent.saturating_sub(marker.width());
                if lead > 0 {
                    spans.push(Span::raw(" ".repeat(lead)));
                }
                spans.push(Span::styled(marker, marker_style()));
            }
            None if indent > 0 => spans.push(Span::raw(" ".repeat(indent))),
            None => {}
        }
        spans.extend(row);
        self.lines.push(Line::from(spans));
    }

    fn flush(&mut self) {
        if self.current.is_empty() && self.pending_marker.is_none() {
            return;
        }
        let spans = std::mem::take(&mut self.current);
        let available = self.width.saturating_sub(self.prefix_width()).max(1);
        for row in wrap_spans(spans, available) {
            self.push_prefixed(row);
        }
    }

    fn push_blank(&mut self) {
        if self.lines.last().is_some_and(|line| line.width() > 0) {
            self.lines.push(Line::default());
        }
    }
}

fn detab(text: &str) -> String {
    text.replace('\t', "    ")
}

/// Word-wraps styled spans to `width` columns. Words longer than a row are
/// split; spaces at a break are dropped.
fn wrap_spans(spans: Vec<Span<'static>>, width: usize) -> Vec<Vec<Span<'static>>> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut row: Vec<Span<'static>> = Vec::new();
    let mut row_width = 0;

    for span in spans {
        let style = span.style;
        for word in span.content.split_inclusive(' ') {
            let visible = word.trim_end_matches(' ');
            if row_width > 0 && row_width + visible.width() > width {
                rows.push(finish_row(std::mem::take(&mut row)));
                row_width = 0;
            }
            if row_width == 0 && visible.is_empty() && !rows.is_empty() {
                continue;
            }
            for ch in word.chars() {
                let ch_width = ch.width().unwrap_or(0);
                if ch != ' ' && row_width > 0 && row_width + ch_width > width {
                    rows.push(finish_row(std::mem::take(&mut row)));
                    row_width = 0;
                }
                push_char(&mut row, ch, style);
                row_width += ch_width;
            }
        }
    }

    if !row.is_empty() || rows.is_empty() {
        rows.push(finish_row(row));
    }
    rows
}

fn push_char(row: &mut Vec<Span<'static>>, ch: char, style: Style) {
    match row.last_mut() {
        Some(last) if last.style == style => last.content.to_mut().push(ch),
        _ => row.push(Span::styled(ch.to_string(), style)),
    }
}

fn finish_row(mut row: Vec<Span<'static>>) -> Vec<Span<'static>> {
    while let Some(last) = row.last_mut() {
        let trimmed = last.content.trim_end_matches(' ').len();
        if trimmed == 0 {
            row.pop();
        } else {
            last.content.to_mut().truncate(trimmed);
            break;
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    fn span_with<'a>(lines: &'a [Line<'static>], text: &str) -> &'a Span<'static> {
        lines
            .iter()
            .flat_map(|line| line.spans.iter())
            .find(|span| span.content == text)
            .unwrap_or_else(|| panic!("no span {text:?} in {:?}", plain(lines)))
    }

    #[test]
    fn plain_text_is_a_single_line() {
        assert_eq!(plain(&render_markdown("Hi there!", 80)), vec!["Hi there!"]);
        assert!(render_markdown("  \n", 80).is_empty());
    }

    #[test]
    fn headings_are_bold_and_followed_by_a_blank() {
        let lines = render_markdown("# Title\n\nBody", 80);
        assert_eq!(plain(&lines), vec!["Title", "", "Body"]);
        let title = span_with(&lines, "Title");
        assert!(title.style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(title.style.fg, Some(Color::Magenta));
    }

    #[test]
    fn emphasis_strong_and_inline_code_are_styled() {
        let lines = render_markdown("a *soft* **loud** `code`", 80);
        assert_eq!(plain(&lines), vec!["a soft loud code"]);
        assert!(span_with(&lines, "soft")
            .style
            .add_modifier
            .contains(Modifier::ITALIC));
        assert!(span_with(&lines, "loud")
            .style
            .add_modifier
            .contains(Modifier::BOLD));
        assert_eq!(span_with(&lines, "code").style, inline_code_style());
    }

    #[test]
    fn lists_get_markers_and_hanging_indent() {
        let lines = render_markdown("- one\n- two words here\n\n1. first\n2. second", 10);
        assert_eq!(
            plain(&lines),
            vec!["- one", "- two", "  words", "  here", "", "1. first", "2. second"]
        );
    }

    #[test]
    fn nested_lists_indent_under_their_parent() {
        let lines = render_markdown("- outer\n  - inner", 80);
        assert_eq!(plain(&lines), vec!["- outer", "  - inner"]);
    }

    #[test]
    fn fenced_code_keeps_indentation_and_style() {
        let lines = render_markdown("```rust\nfn main() {\n    run();\n}\n```\nafter", 80);
        assert_eq!(
            plain(&lines),
            vec!["fn main() {", "    run();", "}", "", "after"]
        );
        assert_eq!(lines[1].spans[0].style, code_block_style());
    }

    #[test]
    fn block_quotes_are_barred() {
        let lines = render_markdown("> quoted text", 80);
        assert_eq!(plain(&lines), vec!["│ quoted text"]);
    }

    #[test]
    fn tables_join_cells() {
        let lines = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |", 80);
        assert_eq!(plain(&lines), vec!["a │ b", "1 │ 2"]);
        assert!(span_with(&lines, "a")
            .style
            .add_modifier
            .contains(Modifier::BOLD));
    }

    #[test]
    fn long_words_split_across_rows() {
        let lines = render_markdown("abcdefgh", 3);
        assert_eq!(plain(&lines), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn unfinished_markdown_still_renders() {
        let lines = render_markdown("**bold but not closed", 80);
        assert_eq!(plain(&lines), vec!["**bold but not closed"]);
    }
}
