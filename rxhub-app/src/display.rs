//! Text-mode stand-in for the LCD.
//!
//! Widgets paint positioned strings; [`TerminalDisplay`] orders them into
//! lines and writes a frame only when it differs from the previous one.

use std::io::{self, Write};

use rxhub_core::widget::{Display, Painter, WidgetId, WidgetTree};
use rxhub_core::{Point, Rect};
use tracing::warn;

/// Pixel height of one text row.
pub const LINE_HEIGHT: i32 = 16;

pub const SCREEN_WIDTH: i32 = 240;
pub const SCREEN_HEIGHT: i32 = 320;

pub fn screen_rect() -> Rect {
    Rect::new(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT)
}

/// Collects painted text for one frame.
#[derive(Debug, Default)]
pub struct TextPainter {
    items: Vec<(Point, String, bool)>,
}

impl TextPainter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines top to bottom. Items on the same row are joined left to right;
    /// a row containing inverted text is marked with `>`.
    pub fn render(mut self) -> String {
        self.items.sort_by_key(|(p, _, _)| (p.y, p.x));

        let mut lines: Vec<(i32, String, bool)> = Vec::new();
        for (point, text, inverted) in self.items {
            match lines.last_mut() {
                Some((y, line, inv)) if *y == point.y => {
                    line.push(' ');
                    line.push_str(&text);
                    *inv |= inverted;
                }
                _ => lines.push((point.y, text, inverted)),
            }
        }

        let mut out = String::new();
        for (_, line, inverted) in lines {
            out.push(if inverted { '>' } else { ' ' });
            out.push(' ');
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}

impl Painter for TextPainter {
    fn draw_text(&mut self, origin: Point, text: &str, inverted: bool) {
        self.items.push((origin, text.to_string(), inverted));
    }
}

pub struct TerminalDisplay {
    out: Box<dyn Write>,
    last_frame: String,
    frames: u64,
    asleep: bool,
    backlight: bool,
}

impl TerminalDisplay {
    pub fn new(out: Box<dyn Write>) -> Self {
        TerminalDisplay {
            out,
            last_frame: String::new(),
            frames: 0,
            asleep: false,
            backlight: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Paints nothing anywhere; for headless runs.
    pub fn headless() -> Self {
        Self::new(Box::new(io::sink()))
    }

    pub fn last_frame(&self) -> &str {
        &self.last_frame
    }

    /// Frames actually written (unchanged frames are skipped).
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_asleep(&self) -> bool {
        self.asleep
    }

    pub fn backlight(&self) -> bool {
        self.backlight
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            warn!(error = %e, "terminal display write failed");
        }
    }
}

impl Display for TerminalDisplay {
    fn sleep(&mut self) {
        self.asleep = true;
        self.emit("-- display sleep --\n");
    }

    fn wake(&mut self) {
        self.asleep = false;
        // Force the next paint through.
        self.last_frame.clear();
        self.emit("-- display wake --\n");
    }

    fn set_backlight(&mut self, on: bool) {
        self.backlight = on;
    }

    fn paint(&mut self, tree: &WidgetTree, focus: Option<WidgetId>) {
        let mut painter = TextPainter::new();
        tree.paint(focus, &mut painter);
        let frame = painter.render();
        if frame == self.last_frame {
            return;
        }
        self.frames += 1;
        let rule = "-".repeat(40);
        self.emit(&format!("{rule}\n{frame}"));
        self.last_frame = frame;
    }

    fn show_fault(&mut self, message: &str) {
        self.emit(&format!("*** FAULT: {message} ***\n"));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
