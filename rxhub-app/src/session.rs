//! Screen assembly and headless script replay.
//!
//! Both the interactive `run` and the `replay` command build the same
//! screen: one table per protocol, stacked top to bottom, all subscribed
//! through the dispatcher's registry.

use std::cell::RefCell;
use std::rc::Rc;

use rxhub_baseband::{BasebandLink, PacketScript};
use rxhub_core::widget::{View, WidgetId, WidgetTree};
use rxhub_core::{
    Config, DispatcherContext, EventDispatcher, EventMask, PacketLog, Rect, SharedInput,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::display::{screen_rect, TerminalDisplay, LINE_HEIGHT, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::views::{build_view, Protocol, ProtocolView, SharedLog, ViewContext};

pub struct Screen {
    pub tree: WidgetTree,
    pub views: Vec<Box<dyn ProtocolView>>,
    /// Initial focus: the first view's table.
    pub focus: Option<WidgetId>,
}

/// Open the packet log named in the config. A log that cannot be opened is
/// reported and skipped.
pub fn open_packet_log(config: &Config) -> Option<SharedLog> {
    let path = config.logging.packet_log.as_ref()?;
    let mut log = PacketLog::new();
    match log.append(path) {
        Ok(()) => {
            info!(path = %path, "packet log open");
            Some(Rc::new(RefCell::new(log)))
        }
        Err(e) => {
            warn!(path = %path, error = %e, "cannot open packet log");
            None
        }
    }
}

/// Build the widget tree and one view per protocol. Must run on the thread
/// that will own the dispatcher.
pub fn build_screen(
    protocols: &[Protocol],
    context: &DispatcherContext,
    config: &Config,
) -> Screen {
    let mut tree = WidgetTree::new(screen_rect(), View);
    let root = tree.root();

    let ctx = ViewContext {
        registry: context.registry(),
        tick_second: context.tick_second(),
        dirty: tree.dirty_flag(),
        max_entries: config.recent.max_entries,
        packet_log: open_packet_log(config),
    };

    let height = view_height(protocols.len(), config.recent.visible_rows);

    let mut views = Vec::with_capacity(protocols.len());
    for (i, &protocol) in protocols.iter().enumerate() {
        let top = i32::try_from(i).unwrap_or(i32::MAX).saturating_mul(height);
        let rect = Rect::new(0, top, SCREEN_WIDTH, height);
        debug!(%protocol, ?rect, "building view");
        views.push(build_view(protocol, &ctx, &mut tree, root, rect));
    }

    let focus = views.first().map(|v| v.table_widget());
    Screen { tree, views, focus }
}

/// Height of one stacked view: an equal share of the screen, or the table
/// rows plus a header line if that is smaller.
fn view_height(views: usize, visible_rows: usize) -> i32 {
    let slots = i32::try_from(views.max(1)).unwrap_or(i32::MAX);
    let table = i32::try_from(visible_rows)
        .unwrap_or(i32::MAX)
        .saturating_add(1)
        .saturating_mul(LINE_HEIGHT);
    (SCREEN_HEIGHT / slots).min(table)
}

/// Result of a headless replay.
pub struct ReplayReport {
    pub sent: u64,
    pub dropped: u64,
    /// RTC ticks synthesized from the script delays.
    pub ticks: u64,
    /// Final painted frame.
    pub frame: String,
    pub views: Vec<Box<dyn ProtocolView>>,
}

impl ReplayReport {
    pub fn to_json(&self) -> serde_json::Value {
        let views: serde_json::Map<String, serde_json::Value> = self
            .views
            .iter()
            .map(|v| (v.protocol().to_string(), v.entries_json()))
            .collect();
        json!({
            "sent": self.sent,
            "dropped": self.dropped,
            "ticks": self.ticks,
            "views": views,
        })
    }
}

/// Replay `script` through a real dispatcher on the calling thread, with
/// script time standing in for the clock: every `rtc_tick_ms` of
/// accumulated delay becomes one RTC tick. The queue is drained whenever it
/// fills, so nothing is dropped.
pub fn replay_headless(
    script: &PacketScript,
    protocols: &[Protocol],
    config: &Config,
) -> ReplayReport {
    let (context, port) = DispatcherContext::new(&config.dispatcher);
    let mut link = BasebandLink::new(port);
    let Screen { tree, views, focus } = build_screen(protocols, &context, config);
    let mut dispatcher = EventDispatcher::new(
        context,
        tree,
        focus,
        SharedInput::new(),
        TerminalDisplay::headless(),
    );

    let tick_ms = config.dispatcher.rtc_tick_ms.max(1);
    let mut clock_ms = 0u64;
    let mut ticks = 0u64;

    for record in script.records() {
        clock_ms += record.delay_ms;
        while clock_ms >= tick_ms {
            clock_ms -= tick_ms;
            // Packets queued before the tick are handled before it.
            dispatcher.dispatch(EventMask::APPLICATION);
            dispatcher.dispatch(EventMask::RTC_TICK);
            ticks += 1;
        }
        if link.pending() >= link.capacity() {
            dispatcher.dispatch(EventMask::APPLICATION);
        }
        link.send(record.message.clone());
    }
    dispatcher.dispatch(EventMask::APPLICATION);
    dispatcher.dispatch(EventMask::LCD_FRAME_SYNC);

    info!(
        sent = link.sent(),
        dropped = link.dropped(),
        ticks,
        "headless replay done"
    );
    ReplayReport {
        sent: link.sent(),
        dropped: link.dropped(),
        ticks,
        frame: dispatcher.display().last_frame().to_string(),
        views,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_stacks_views() {
        let config = Config::default();
        let (context, _port) = DispatcherContext::new(&config.dispatcher);
        let screen = build_screen(&Protocol::ALL, &context, &config);

        assert_eq!(screen.views.len(), 3);
        let rects: Vec<Rect> = screen
            .views
            .iter()
            .map(|v| screen.tree.rect(v.table_widget()))
            .collect();
        assert_eq!(rects[0].top, 0);
        assert_eq!(rects[1].top, rects[0].height);
        assert!(rects[2].top + rects[2].height <= SCREEN_HEIGHT);
        assert_eq!(screen.focus, Some(screen.views[0].table_widget()));
    }

    #[test]
    fn test_screen_honors_visible_rows() {
        let config = rxhub_core::config::parse_config("recent:\n  visible_rows: 3\n");
        let (context, _port) = DispatcherContext::new(&config.dispatcher);
        let screen = build_screen(&Protocol::ALL, &context, &config);
        let rects: Vec<Rect> = screen
            .views
            .iter()
            .map(|v| screen.tree.rect(v.table_widget()))
            .collect();
        assert!(rects.iter().all(|r| r.height == 4 * LINE_HEIGHT));
        assert_eq!(rects[2].top, 8 * LINE_HEIGHT);
    }

    #[test]
    fn test_huge_visible_rows_fills_screen_share() {
        let mut config =
            rxhub_core::config::parse_config("recent:\n  visible_rows: 200000000\n");
        let (context, _port) = DispatcherContext::new(&config.dispatcher);
        let screen = build_screen(&Protocol::ALL, &context, &config);
        let first = screen.tree.rect(screen.views[0].table_widget());
        assert_eq!(first.height, SCREEN_HEIGHT / 3);

        // Values set after parsing bypass the clamp; the layout still holds.
        config.recent.visible_rows = usize::MAX;
        assert_eq!(view_height(1, config.recent.visible_rows), SCREEN_HEIGHT);
        assert_eq!(view_height(0, 0), LINE_HEIGHT);
    }

    #[test]
    fn test_missing_packet_log_is_skipped() {
        let config = Config::default();
        assert!(open_packet_log(&config).is_none());
    }
}
