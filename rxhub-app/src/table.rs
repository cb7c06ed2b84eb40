//! Scrollable list of recent entries, the widget every protocol view shows.
//!
//! The table shares its cache with the view that fills it. Selection is
//! tracked by key, so it follows an entry as the cache reorders.

use std::cell::RefCell;
use std::rc::Rc;

use comfy_table::{Cell, Table};
use rxhub_core::recent::{Keyed, RecentEntries};
use rxhub_core::widget::{EncoderEvent, KeyEvent, Painter, Widget};
use rxhub_core::{Point, Rect};

use crate::display::LINE_HEIGHT;

pub struct Column {
    pub title: &'static str,
    pub width: usize,
}

/// An entry that can be shown as one table row.
pub trait TableRow: Keyed + 'static {
    const COLUMNS: &'static [Column];

    /// One string per column.
    fn cells(&self) -> Vec<String>;
}

pub type SharedEntries<E> = Rc<RefCell<RecentEntries<E>>>;

type SelectHandler<E> = Box<dyn FnMut(&E)>;

pub struct RecentEntriesTable<E: Keyed> {
    recent: SharedEntries<E>,
    selected: Option<E::Key>,
    on_select: Option<SelectHandler<E>>,
}

impl<E: TableRow> RecentEntriesTable<E> {
    pub fn new(recent: SharedEntries<E>) -> Self {
        RecentEntriesTable {
            recent,
            selected: None,
            on_select: None,
        }
    }

    /// Called on Select with the highlighted entry. The cache is borrowed
    /// for the duration of the call.
    pub fn set_on_select(&mut self, handler: impl FnMut(&E) + 'static) {
        self.on_select = Some(Box::new(handler));
    }

    pub fn selected_key(&self) -> Option<E::Key> {
        self.selected
    }

    pub fn select(&mut self, key: E::Key) {
        self.selected = Some(key);
    }

    /// Move the selection by `amount` rows, clamped to the list. An unknown
    /// or missing selection snaps to the front.
    fn advance(&mut self, amount: i32) {
        let recent = self.recent.borrow();
        let current = self.selected.and_then(|k| recent.position(k));
        self.selected = match current {
            None => recent.iter().next().map(|e| e.key()),
            Some(i) => {
                let last = recent.len() as i64 - 1;
                let target = (i as i64 + amount as i64).clamp(0, last) as usize;
                recent.get(target).map(|e| e.key())
            }
        };
    }

    fn header_line() -> String {
        E::COLUMNS
            .iter()
            .map(|c| fit(c.title, c.width))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn row_line(entry: &E) -> String {
        E::COLUMNS
            .iter()
            .zip(entry.cells())
            .map(|(c, text)| fit(&text, c.width))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<E: TableRow> Widget for RecentEntriesTable<E> {
    fn on_key(&mut self, event: KeyEvent) -> bool {
        match event {
            KeyEvent::Select => {
                let recent = self.recent.borrow();
                let entry = self.selected.and_then(|k| recent.find(k));
                match (self.on_select.as_mut(), entry) {
                    (Some(handler), Some(entry)) => {
                        handler(entry);
                        true
                    }
                    _ => false,
                }
            }
            KeyEvent::Up | KeyEvent::Down => {
                let at_edge = {
                    let recent = self.recent.borrow();
                    let edge = if event == KeyEvent::Up {
                        recent.iter().next()
                    } else {
                        recent.back()
                    };
                    match edge {
                        None => true,
                        Some(e) => self.selected == Some(e.key()),
                    }
                };
                // At the edge the key bubbles so focus can leave the table.
                if at_edge {
                    return false;
                }
                self.advance(if event == KeyEvent::Up { -1 } else { 1 });
                true
            }
            _ => false,
        }
    }

    fn on_encoder(&mut self, event: EncoderEvent) -> bool {
        self.advance(event);
        true
    }

    fn on_focus(&mut self) {
        self.advance(0);
    }

    fn focusable(&self) -> bool {
        !self.recent.borrow().is_empty()
    }

    fn paint(&self, rect: Rect, has_focus: bool, painter: &mut dyn Painter) {
        let mut origin = Point::new(rect.left, rect.top);
        painter.draw_text(origin, &Self::header_line(), false);

        let rows = (rect.height / LINE_HEIGHT - 1).max(0) as usize;
        let recent = self.recent.borrow();
        let index = self.selected.and_then(|k| recent.position(k)).unwrap_or(0);

        for entry in recent.window(index, rows) {
            origin.y += LINE_HEIGHT;
            let highlighted = has_focus && self.selected == Some(entry.key());
            painter.draw_text(origin, &Self::row_line(entry), highlighted);
        }
    }
}

/// Truncate or pad `text` to exactly `width` characters.
fn fit(text: &str, width: usize) -> String {
    let truncated: String = text.chars().take(width).collect();
    format!("{truncated:<width$}")
}

/// Whole cache as a terminal table, front to back.
pub fn render_table<E: TableRow>(recent: &RecentEntries<E>) -> Table {
    let mut table = Table::new();
    table.set_header(E::COLUMNS.iter().map(|c| c.title).collect::<Vec<_>>());
    for entry in recent {
        table.add_row(entry.cells().into_iter().map(Cell::new).collect::<Vec<_>>());
    }
    table
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rxhub_core::recent::{FromKey, Updatable};
    use std::cell::Cell as StdCell;

    #[derive(Debug)]
    struct Row {
        id: u16,
        hits: u32,
    }

    impl Keyed for Row {
        type Key = u16;

        fn key(&self) -> u16 {
            self.id
        }
    }

    impl FromKey for Row {
        fn from_key(id: u16) -> Self {
            Row { id, hits: 0 }
        }
    }

    impl Updatable<()> for Row {
        fn update(&mut self, _: &()) {
            self.hits += 1;
        }
    }

    impl TableRow for Row {
        const COLUMNS: &'static [Column] = &[
            Column { title: "ID", width: 4 },
            Column { title: "Hits", width: 4 },
        ];

        fn cells(&self) -> Vec<String> {
            vec![self.id.to_string(), self.hits.to_string()]
        }
    }

    struct Lines(Vec<(String, bool)>);

    impl Painter for Lines {
        fn draw_text(&mut self, _origin: Point, text: &str, inverted: bool) {
            self.0.push((text.to_string(), inverted));
        }
    }

    /// Cache with keys 1..=n, front to back.
    fn shared(n: u16) -> SharedEntries<Row> {
        let mut recent = RecentEntries::new(16);
        for id in (1..=n).rev() {
            recent.on_packet(id, &());
        }
        Rc::new(RefCell::new(recent))
    }

    #[test]
    fn test_focus_selects_front() {
        let mut table = RecentEntriesTable::new(shared(3));
        assert!(table.focusable());
        table.on_focus();
        assert_eq!(table.selected_key(), Some(1));
    }

    #[test]
    fn test_empty_table_not_focusable_and_keys_bubble() {
        let mut table = RecentEntriesTable::new(shared(0));
        assert!(!table.focusable());
        assert!(!table.on_key(KeyEvent::Up));
        assert!(!table.on_key(KeyEvent::Down));
    }

    #[test]
    fn test_up_down_stop_at_edges() {
        let mut table = RecentEntriesTable::new(shared(3));
        table.on_focus();
        assert!(!table.on_key(KeyEvent::Up));
        assert!(table.on_key(KeyEvent::Down));
        assert!(table.on_key(KeyEvent::Down));
        assert_eq!(table.selected_key(), Some(3));
        assert!(!table.on_key(KeyEvent::Down));
        assert!(table.on_key(KeyEvent::Up));
        assert_eq!(table.selected_key(), Some(2));
    }

    #[test]
    fn test_encoder_clamps() {
        let mut table = RecentEntriesTable::new(shared(5));
        table.on_focus();
        assert!(table.on_encoder(10));
        assert_eq!(table.selected_key(), Some(5));
        assert!(table.on_encoder(-2));
        assert_eq!(table.selected_key(), Some(3));
    }

    #[test]
    fn test_selection_follows_key_after_reorder() {
        let recent = shared(3);
        let mut table = RecentEntriesTable::new(Rc::clone(&recent));
        table.select(3);
        recent.borrow_mut().on_packet(3, &());
        assert_eq!(recent.borrow().position(3), Some(0));
        // 3 is now the front, so Up bubbles.
        assert!(!table.on_key(KeyEvent::Up));
    }

    #[test]
    fn test_select_invokes_handler() {
        let hits = Rc::new(StdCell::new(0u16));
        let mut table = RecentEntriesTable::new(shared(2));
        let h = Rc::clone(&hits);
        table.set_on_select(move |row: &Row| h.set(row.id));

        assert!(!table.on_key(KeyEvent::Select)); // nothing selected yet
        table.on_focus();
        table.on_key(KeyEvent::Down);
        assert!(table.on_key(KeyEvent::Select));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_paint_windows_around_selection() {
        let mut table = RecentEntriesTable::new(shared(10));
        table.select(6);
        let mut lines = Lines(Vec::new());
        // Header plus four rows.
        table.paint(Rect::new(0, 0, 240, LINE_HEIGHT * 5), true, &mut lines);

        assert_eq!(lines.0[0].0, "ID   Hits");
        let rows: Vec<&str> = lines.0[1..].iter().map(|(t, _)| t.trim_end()).collect();
        assert_eq!(rows, vec!["4    1", "5    1", "6    1", "7    1"]);
        let highlighted: Vec<bool> = lines.0[1..].iter().map(|(_, h)| *h).collect();
        assert_eq!(highlighted, vec![false, false, true, false]);
    }

    #[test]
    fn test_fit() {
        assert_eq!(fit("ABCDEFG", 4), "ABCD");
        assert_eq!(fit("AB", 4), "AB  ");
    }

    #[test]
    fn test_render_table_has_all_rows() {
        let recent = shared(3);
        let table = render_table(&recent.borrow());
        assert_eq!(table.row_iter().count(), 3);
        assert!(table.to_string().contains("Hits"));
    }
}
