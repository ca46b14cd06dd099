//! Drawing of the chat and help screens.
//!
//! Layout, top to bottom: message pane, a horizontal rule, the prompt line and
//! one spare row. Everything sits two columns in from the left edge.

use crate::chat::format::HELP_LINES;
use crate::chat::{ChatApp, LineKind, Screen};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const PAD_X: u16 = 2;
/// Rows below the message pane: rule, prompt, spare.
const FOOTER_ROWS: u16 = 3;

/// Height of the message pane for a terminal `total_height` rows tall.
pub fn message_pane_height(total_height: u16) -> usize {
    total_height.saturating_sub(FOOTER_ROWS) as usize
}

fn padded(area: Rect) -> Rect {
    let pad = PAD_X.min(area.width / 2);
    Rect {
        x: area.x + pad,
        y: area.y,
        width: area.width.saturating_sub(pad * 2),
        height: area.height,
    }
}

fn line_style(kind: LineKind) -> Style {
    match kind {
        LineKind::Normal => Style::default(),
        LineKind::Private => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        LineKind::System => Style::default().fg(Color::DarkGray),
    }
}

/// Bottom-align `lines` in a pane `height` rows tall.
fn bottom_aligned(mut lines: Vec<Line<'_>>, height: usize) -> Vec<Line<'_>> {
    if lines.len() < height {
        let mut padded = vec![Line::default(); height - lines.len()];
        padded.append(&mut lines);
        padded
    } else {
        lines
    }
}

/// Slice of the input to show plus the cursor column, keeping the cursor in view.
pub fn input_view(prompt: &str, text: &str, cursor_width: usize, width: usize) -> (String, u16) {
    let full = format!("{} {}", prompt, text);
    let cursor_col = prompt.width() + 1 + cursor_width;
    if width == 0 {
        return (String::new(), 0);
    }
    if cursor_col < width {
        return (full, cursor_col as u16);
    }
    // Drop leading columns until the cursor fits on screen.
    let skip = cursor_col + 1 - width;
    let mut dropped = 0;
    let mut out = String::new();
    for ch in full.chars() {
        if dropped < skip {
            dropped += ch.width().unwrap_or(0);
            continue;
        }
        out.push(ch);
    }
    // A wide character straddling the cut can push `dropped` past the cursor.
    (out, cursor_col.saturating_sub(dropped) as u16)
}

pub fn draw(f: &mut Frame, app: &ChatApp) {
    let area = padded(f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);
    let pane_height = chunks[0].height as usize;

    let lines: Vec<Line> = match app.screen() {
        Screen::Chat => app
            .buffer()
            .visible(pane_height)
            .map(|l| Line::from(Span::styled(l.text.as_str(), line_style(l.kind))))
            .collect(),
        Screen::Help => HELP_LINES
            .iter()
            .rev()
            .take(pane_height)
            .rev()
            .map(|s| Line::from(*s))
            .collect(),
    };
    f.render_widget(Paragraph::new(bottom_aligned(lines, pane_height)), chunks[0]);

    let mut rule = "─".repeat(chunks[1].width as usize);
    if !app.buffer().is_following() && app.screen() == Screen::Chat {
        let marker = format!(" ↑{} ", app.buffer().scroll_offset());
        if marker.width() + 2 <= rule.chars().count() {
            rule = format!("──{}{}", marker, "─".repeat(chunks[1].width as usize - marker.width() - 2));
        }
    }
    f.render_widget(Paragraph::new(rule), chunks[1]);

    if app.screen() == Screen::Chat {
        let prompt = app.prompt();
        let (shown, cursor_x) = input_view(
            &prompt,
            app.input().text(),
            app.input().cursor_width(),
            chunks[2].width as usize,
        );
        f.render_widget(Paragraph::new(shown), chunks[2]);
        f.set_cursor_position((chunks[2].x + cursor_x, chunks[2].y));
    }
}

/// Shown while the radio is sending its node list.
pub fn draw_loading(f: &mut Frame, text: &str) {
    let area = f.area();
    let row = Rect {
        x: area.x,
        y: area.y + area.height / 2,
        width: area.width,
        height: 1.min(area.height),
    };
    f.render_widget(
        Paragraph::new(text)
            .style(Style::default().add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        row,
    );
}
