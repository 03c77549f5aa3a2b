use std::time;

use tui::widgets;

/// List whose cursor wraps around at both ends.
pub struct WrappingList<T> {
    data: Vec<T>,
    state: widgets::ListState,
}

impl<T> WrappingList<T> {
    pub fn new(data: Vec<T>) -> Self {
        let mut l = Self {
            data,
            state: widgets::ListState::default(),
        };

        if !l.data.is_empty() {
            l.state.select(Some(0));
        }

        l
    }

    /// Swaps the items, keeping the cursor where it was if it is still in
    /// range.
    pub fn replace(&mut self, data: Vec<T>) {
        let selected = self.state.selected().unwrap_or_default();
        self.data = data;

        if self.data.is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(selected.min(self.data.len() - 1)));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.data.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn state(&mut self) -> &mut widgets::ListState {
        &mut self.state
    }

    pub fn selected_ix(&self) -> Option<usize> {
        self.state.selected()
    }

    pub fn selected(&self) -> Option<&T> {
        self.data.get(self.state.selected()?)
    }

    pub fn selected_mut(&mut self) -> Option<&mut T> {
        self.data.get_mut(self.state.selected()?)
    }

    pub fn select(&mut self, ix: usize) {
        if ix < self.data.len() {
            self.state.select(Some(ix));
        }
    }

    pub fn down(&mut self) {
        if self.data.is_empty() {
            return;
        }

        let next = (self.state.selected().unwrap_or_default() + 1) % self.data.len();
        self.state.select(Some(next));
    }

    pub fn up(&mut self) {
        if self.data.is_empty() {
            return;
        }

        let next =
            (self.state.selected().unwrap_or_default() + self.data.len() - 1) % self.data.len();
        self.state.select(Some(next));
    }
}

/// Cursor over a paginated table of `len` rows.
#[derive(Debug, Clone, Default)]
pub struct Pager {
    len: usize,
    cursor: usize,
    page_size: usize,
}

impl Pager {
    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }

    /// Rows per page, follows the height of the area the table is drawn in.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
    }

    pub fn cursor(&self) -> Option<usize> {
        (self.len > 0).then_some(self.cursor)
    }

    pub fn page(&self) -> usize {
        self.cursor / self.page_size.max(1)
    }

    pub fn pages(&self) -> usize {
        self.len.div_ceil(self.page_size.max(1)).max(1)
    }

    /// Range of rows of the current page.
    pub fn visible(&self) -> std::ops::Range<usize> {
        let start = self.page() * self.page_size.max(1);
        start..(start + self.page_size.max(1)).min(self.len)
    }

    pub fn down(&mut self) {
        if self.len > 0 {
            self.cursor = (self.cursor + 1) % self.len;
        }
    }

    pub fn up(&mut self) {
        if self.len > 0 {
            self.cursor = (self.cursor + self.len - 1) % self.len;
        }
    }

    pub fn next_page(&mut self) {
        if self.len > 0 {
            self.cursor = (self.cursor + self.page_size.max(1)).min(self.len - 1);
        }
    }

    pub fn prev_page(&mut self) {
        self.cursor = self.cursor.saturating_sub(self.page_size.max(1));
    }
}

pub struct DotsSpinner {
    state: usize,
    last_tick: Option<time::Instant>,
}

impl Default for DotsSpinner {
    fn default() -> Self {
        Self::new()
    }
}

impl DotsSpinner {
    pub const PATTERN: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
    const FRAME: time::Duration = time::Duration::from_millis(80);

    pub fn new() -> Self {
        Self {
            state: 0,
            last_tick: None,
        }
    }

    pub fn tick(&mut self) {
        let now = time::Instant::now();

        match self.last_tick {
            Some(t) if now - t < Self::FRAME => {}
            Some(_) => {
                self.last_tick = Some(now);
                self.state = (self.state + 1) % Self::PATTERN.len();
            }
            None => self.last_tick = Some(now),
        }
    }

    pub fn pattern(&self) -> char {
        Self::PATTERN[self.state]
    }
}
