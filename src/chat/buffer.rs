//! Scrollback for the chat view.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Normal,
    /// Direct message to or from us, rendered highlighted
    Private,
    /// Client notices (errors, delivery reports, node listings)
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub text: String,
    pub kind: LineKind,
}

impl ChatLine {
    pub fn new(text: impl Into<String>, kind: LineKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn normal(text: impl Into<String>) -> Self {
        Self::new(text, LineKind::Normal)
    }

    pub fn private(text: impl Into<String>) -> Self {
        Self::new(text, LineKind::Private)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(text, LineKind::System)
    }
}

/// Bounded history plus a scroll position measured in lines up from the newest.
///
/// With `scroll_offset == 0` the view follows new messages. While scrolled
/// back, new lines bump the offset so the visible window stays put.
#[derive(Debug, Clone)]
pub struct MessageBuffer {
    lines: VecDeque<ChatLine>,
    capacity: usize,
    scroll_offset: usize,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            scroll_offset: 0,
        }
    }

    pub fn push(&mut self, line: ChatLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        if self.scroll_offset > 0 {
            self.scroll_offset = (self.scroll_offset + 1).min(self.lines.len().saturating_sub(1));
        }
    }

    pub fn extend<I: IntoIterator<Item = ChatLine>>(&mut self, lines: I) {
        for line in lines {
            self.push(line);
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn is_following(&self) -> bool {
        self.scroll_offset == 0
    }

    /// Largest useful offset for a pane `height` lines tall.
    fn max_offset(&self, height: usize) -> usize {
        self.lines.len().saturating_sub(height.max(1))
    }

    pub fn scroll_up(&mut self, amount: usize, height: usize) {
        self.scroll_offset = (self.scroll_offset + amount).min(self.max_offset(height));
    }

    pub fn scroll_down(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    /// Lines to show in a pane `height` lines tall, oldest first.
    pub fn visible(&self, height: usize) -> impl Iterator<Item = &ChatLine> {
        let offset = self.scroll_offset.min(self.max_offset(height));
        let end = self.lines.len() - offset;
        let start = end.saturating_sub(height);
        self.lines.range(start..end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatLine> {
        self.lines.iter()
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
