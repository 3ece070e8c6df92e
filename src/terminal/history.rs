//! Submitted commands plus a navigation cursor.

/// Append-only list of submissions; `0 <= cursor <= len`.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<String>,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission and park the cursor after it.
    pub fn push(&mut self, text: impl Into<String>) {
        self.entries.push(text.into());
        self.cursor = self.entries.len();
    }

    /// Step back. `None` at the oldest entry.
    pub fn backward(&mut self) -> Option<&str> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(&self.entries[self.cursor])
    }

    /// Step forward. `None` when already past the newest entry; reaching
    /// that position yields an empty input.
    pub fn forward(&mut self) -> Option<&str> {
        if self.cursor >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.entries.get(self.cursor).map_or("", String::as_str))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(items: &[&str]) -> History {
        let mut history = History::new();
        for item in items {
            history.push(*item);
        }
        history
    }

    #[test]
    fn back_back_forward() {
        let mut h = history(&["a", "b"]);
        assert_eq!(h.backward(), Some("b"));
        assert_eq!(h.backward(), Some("a"));
        assert_eq!(h.forward(), Some("b"));
    }

    #[test]
    fn backward_stops_at_oldest() {
        let mut h = history(&["a"]);
        assert_eq!(h.backward(), Some("a"));
        assert_eq!(h.backward(), None);
        assert_eq!(h.cursor(), 0);
    }

    #[test]
    fn forward_to_end_yields_empty_then_noop() {
        let mut h = history(&["a", "b"]);
        h.backward();
        assert_eq!(h.forward(), Some(""));
        assert_eq!(h.forward(), None);
        assert_eq!(h.cursor(), h.len());
    }

    #[test]
    fn push_resets_cursor() {
        let mut h = history(&["a", "b"]);
        h.backward();
        h.backward();
        h.push("c");
        assert_eq!(h.cursor(), 3);
        assert_eq!(h.backward(), Some("c"));
    }

    #[test]
    fn empty_history_navigation_is_noop() {
        let mut h = History::new();
        assert!(h.is_empty());
        assert_eq!(h.backward(), None);
        assert_eq!(h.forward(), None);
    }
}
