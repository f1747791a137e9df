//! Presenter: prints a window of a file around one line.
//!
//! Code is highlighted with syntect and converted to owned ratatui `Line`s,
//! then drawn once into an inline viewport below the shell prompt. When
//! stdout is not a terminal, or with `--plain`, the same window is printed as
//! plain numbered text.

use std::io::IsTerminal;
use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Context};
use ratatui::backend::CrosstermBackend;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};
use ratatui::{Terminal, TerminalOptions, Viewport};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};

use crate::theme::Theme;

static PS: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static TS: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Width of the line-number gutter.
const GUTTER: usize = 5;

pub struct Presenter {
    theme: Theme,
    context: usize,
    plain: bool,
}

impl Presenter {
    /// `plain` is forced on when stdout is not a terminal.
    pub fn new(theme: Theme, context: usize, plain: bool) -> Self {
        let plain = plain || !std::io::stdout().is_terminal();
        Self { theme, context, plain }
    }

    /// Prints `content` of `file_name` around `line_number`.
    ///
    /// `title` labels the view (file and revision); `lost` switches the title
    /// to the theme's lost color.
    ///
    /// # Errors
    ///
    /// Fails when `line_number` is past the end of the file or the terminal
    /// cannot be drawn to.
    pub fn render(
        &self,
        title: &str,
        file_name: &str,
        content: &[u8],
        line_number: u32,
        lost: bool,
    ) -> anyhow::Result<()> {
        let text = String::from_utf8_lossy(content);
        let total = text.lines().count();
        if line_number as usize > total {
            bail!("line number {line_number} exceeds file line count {total} in {title}");
        }

        if self.plain {
            println!("{title}");
            for line in plain_lines(&text, line_number, self.context) {
                println!("{line}");
            }
            return Ok(());
        }

        // Keep the bordered view on screen: two border rows plus the window.
        let rows = crossterm::terminal::size().map(|(_, h)| h as usize).unwrap_or(24);
        let context = self.context.min(rows.saturating_sub(3) / 2);
        let lines = highlighted_lines(file_name, &text, line_number, context, &self.theme);
        self.draw(title, lines, lost).context("drawing file view")
    }

    fn draw(&self, title: &str, lines: Vec<Line<'static>>, lost: bool) -> std::io::Result<()> {
        let height = u16::try_from(lines.len() + 2).unwrap_or(u16::MAX);
        let backend = CrosstermBackend::new(std::io::stdout());
        let mut terminal =
            Terminal::with_options(backend, TerminalOptions { viewport: Viewport::Inline(height) })?;

        let title_color = if lost { self.theme.lost } else { self.theme.title };
        let block = Block::bordered()
            .title(Span::styled(format!(" {title} "), Style::default().fg(title_color)))
            .border_style(Style::default().fg(self.theme.border));
        terminal.draw(|frame| frame.render_widget(Paragraph::new(lines).block(block), frame.area()))?;

        terminal.show_cursor()?;
        println!();
        Ok(())
    }
}

/// 0-based line indices shown for a 1-based focus line.
pub fn window(line_number: u32, total: usize, context: usize) -> Range<usize> {
    let focus = (line_number as usize).saturating_sub(1);
    let start = focus.saturating_sub(context);
    let end = (focus + context + 1).min(total);
    start..end
}

/// Numbered text lines with a `>` marking the focus line.
pub fn plain_lines(text: &str, line_number: u32, context: usize) -> Vec<String> {
    let all: Vec<&str> = text.lines().collect();
    window(line_number, all.len(), context)
        .map(|i| {
            let marker = if i + 1 == line_number as usize { '>' } else { ' ' };
            format!("{:>GUTTER$}{marker} {}", i + 1, all[i])
        })
        .collect()
}

/// Syntax-highlighted, numbered lines for the window around `line_number`.
///
/// Highlighting starts at the top of the file so multi-line constructs
/// (block comments, strings) are colored correctly inside the window.
pub fn highlighted_lines(
    file_name: &str,
    text: &str,
    line_number: u32,
    context: usize,
    theme: &Theme,
) -> Vec<Line<'static>> {
    let all: Vec<&str> = text.lines().collect();
    let shown = window(line_number, all.len(), context);
    let focus = (line_number as usize).saturating_sub(1);

    let syntax = find_syntax(file_name, all.first().copied().unwrap_or(""));
    let syntect_theme = TS
        .themes
        .get(theme.syntax_theme)
        .or_else(|| TS.themes.values().next());
    let mut highlighter = syntect_theme.map(|t| HighlightLines::new(syntax, t));

    let mut out = Vec::with_capacity(shown.len());
    for (i, code) in all.iter().enumerate().take(shown.end) {
        // Feed lines with their newline; the syntax set expects it.
        let with_newline = format!("{code}\n");
        let spans = match highlighter.as_mut() {
            Some(h) => h
                .highlight_line(&with_newline, &PS)
                .map(|ranges| {
                    ranges
                        .into_iter()
                        .map(|(style, piece)| syntect_to_span(style, piece.trim_end_matches('\n')))
                        .collect()
                })
                .unwrap_or_else(|_| vec![Span::raw(code.to_string())]),
            None => vec![Span::raw(code.to_string())],
        };
        if i < shown.start {
            continue;
        }
        out.push(numbered(i + 1, spans, i == focus, theme));
    }
    out
}

fn find_syntax(file_name: &str, first_line: &str) -> &'static SyntaxReference {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| PS.find_syntax_by_extension(ext))
        .or_else(|| PS.find_syntax_by_first_line(first_line))
        .unwrap_or_else(|| PS.find_syntax_plain_text())
}

fn numbered(number: usize, spans: Vec<Span<'static>>, focused: bool, theme: &Theme) -> Line<'static> {
    let gutter_style = if focused {
        Style::default().fg(theme.focus_fg).bg(theme.focus_bg).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.gutter)
    };
    let mut line = vec![Span::styled(format!("{number:>GUTTER$} "), gutter_style)];
    if focused {
        line.extend(spans.into_iter().map(|s| {
            let style = s.style.bg(theme.focus_bg);
            s.style(style)
        }));
    } else {
        line.extend(spans);
    }
    Line::from(line)
}

/// Converts a syntect (Style, &str) pair to an owned ratatui Span.
///
/// Only foreground and font style are carried over; the theme background
/// would paint over the terminal's own.
fn syntect_to_span(style: syntect::highlighting::Style, content: &str) -> Span<'static> {
    let fg = style.foreground;
    let mut ratatui_style = Style::default();
    if fg.a > 0 {
        ratatui_style = ratatui_style.fg(Color::Rgb(fg.r, fg.g, fg.b));
    }
    if style.font_style.contains(FontStyle::BOLD) {
        ratatui_style = ratatui_style.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        ratatui_style = ratatui_style.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        ratatui_style = ratatui_style.add_modifier(Modifier::UNDERLINED);
    }
    Span::styled(content.to_owned(), ratatui_style)
}
