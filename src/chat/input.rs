//! Single-line editor for the prompt, with submitted-line history.

use unicode_width::UnicodeWidthStr;

const MAX_HISTORY: usize = 100;

#[derive(Debug, Default, Clone)]
pub struct InputLine {
    text: String,
    /// Cursor position in chars
    cursor: usize,
    history: Vec<String>,
    history_pos: Option<usize>,
    draft: String,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Terminal columns occupied by the text left of the cursor.
    pub fn cursor_width(&self) -> usize {
        self.text[..self.byte_index(self.cursor)].width()
    }

    fn byte_index(&self, char_pos: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Control characters are dropped.
    pub fn insert(&mut self, ch: char) {
        if ch.is_control() {
            return;
        }
        let at = self.byte_index(self.cursor);
        self.text.insert(at, ch);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, s: &str) {
        for ch in s.chars() {
            self.insert(ch);
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.text.remove(at);
    }

    pub fn delete(&mut self) {
        if self.cursor < self.char_len() {
            let at = self.byte_index(self.cursor);
            self.text.remove(at);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.char_len());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.char_len();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
        self.history_pos = None;
    }

    /// Take the current line, recording it in history when non-blank.
    pub fn take(&mut self) -> String {
        let line = std::mem::take(&mut self.text);
        self.cursor = 0;
        self.history_pos = None;
        self.draft.clear();
        if !line.trim().is_empty() && self.history.last() != Some(&line) {
            if self.history.len() == MAX_HISTORY {
                self.history.remove(0);
            }
            self.history.push(line.clone());
        }
        line
    }

    pub fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let pos = match self.history_pos {
            None => {
                self.draft = self.text.clone();
                self.history.len() - 1
            }
            Some(0) => 0,
            Some(p) => p - 1,
        };
        self.history_pos = Some(pos);
        self.set_text(self.history[pos].clone());
    }

    pub fn history_next(&mut self) {
        match self.history_pos {
            None => {}
            Some(p) if p + 1 < self.history.len() => {
                self.history_pos = Some(p + 1);
                self.set_text(self.history[p + 1].clone());
            }
            Some(_) => {
                self.history_pos = None;
                let draft = std::mem::take(&mut self.draft);
                self.set_text(draft);
            }
        }
    }

    fn set_text(&mut self, text: String) {
        self.text = text;
        self.cursor = self.char_len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_at_the_cursor() {
        let mut input = InputLine::new();
        input.insert_str("helo");
        input.move_left();
        input.insert('l');
        assert_eq!(input.text(), "hello");
        input.home();
        input.delete();
        assert_eq!(input.text(), "ello");
        input.end();
        input.backspace();
        assert_eq!(input.text(), "ell");
        input.insert('\u{7}');
        assert_eq!(input.text(), "ell");
    }

    #[test]
    fn cursor_width_counts_wide_chars() {
        let mut input = InputLine::new();
        input.insert_str("é日本");
        assert_eq!(input.cursor(), 3);
        assert_eq!(input.cursor_width(), 5);
        input.move_left();
        assert_eq!(input.cursor_width(), 3);
    }

    #[test]
    fn history_recalls_and_restores_draft() {
        let mut input = InputLine::new();
        input.insert_str("first");
        assert_eq!(input.take(), "first");
        input.insert_str("second");
        input.take();
        input.insert_str("draft");

        input.history_prev();
        assert_eq!(input.text(), "second");
        input.history_prev();
        assert_eq!(input.text(), "first");
        input.history_prev();
        assert_eq!(input.text(), "first");
        input.history_next();
        assert_eq!(input.text(), "second");
        input.history_next();
        assert_eq!(input.text(), "draft");
    }

    #[test]
    fn blank_lines_are_not_remembered() {
        let mut input = InputLine::new();
        input.insert_str("   ");
        input.take();
        input.history_prev();
        assert_eq!(input.text(), "");
    }
}
