//! Protocol views: each subscribes to one packet type, folds packets into
//! its own recent-entries cache and shows the cache in a table widget.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use clap::ValueEnum;
use comfy_table::Table;
use rxhub_core::widget::{DirtyFlag, WidgetId, WidgetTree};
use rxhub_core::{MessageRegistry, PacketLog, Rect, Signal};
use serde::Serialize;
use tracing::warn;

pub mod adsb;
pub mod ais;
pub mod tpms;

pub use adsb::{AdsbView, AircraftEntry};
pub use ais::{AisView, VesselEntry};
pub use tpms::{TireSensorEntry, TpmsView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ais,
    Adsb,
    Tpms,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Ais, Protocol::Adsb, Protocol::Tpms];

    pub fn title(self) -> &'static str {
        match self {
            Protocol::Ais => "AIS vessels",
            Protocol::Adsb => "ADS-B aircraft",
            Protocol::Tpms => "TPMS sensors",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Ais => "ais",
            Protocol::Adsb => "adsb",
            Protocol::Tpms => "tpms",
        };
        f.write_str(name)
    }
}

pub type SharedLog = Rc<RefCell<PacketLog>>;

/// What a view needs from the application core while it is built.
pub struct ViewContext<'a> {
    pub registry: &'a MessageRegistry,
    pub tick_second: &'a Signal,
    pub dirty: DirtyFlag,
    pub max_entries: usize,
    pub packet_log: Option<SharedLog>,
}

pub trait ProtocolView {
    fn protocol(&self) -> Protocol;

    /// The table widget; focus target for the view.
    fn table_widget(&self) -> WidgetId;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry, front to back.
    fn summary(&self) -> Table;

    fn entries_json(&self) -> serde_json::Value;
}

/// Build the view for `protocol` under `parent`.
pub fn build_view(
    protocol: Protocol,
    ctx: &ViewContext<'_>,
    tree: &mut WidgetTree,
    parent: WidgetId,
    rect: Rect,
) -> Box<dyn ProtocolView> {
    match protocol {
        Protocol::Ais => Box::new(AisView::new(ctx, tree, parent, rect)),
        Protocol::Adsb => Box::new(AdsbView::new(ctx, tree, parent, rect)),
        Protocol::Tpms => Box::new(TpmsView::new(ctx, tree, parent, rect)),
    }
}

/// Append a line to the packet log, if one is open. Failures are logged
/// and otherwise ignored.
pub(crate) fn log_packet(log: Option<&SharedLog>, text: &str) {
    let Some(log) = log else {
        return;
    };
    if let Err(e) = log.borrow_mut().write_now(text) {
        warn!(error = %e, "packet log write failed");
    }
}

/// `-` for missing values.
pub(crate) fn opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}
