//! TPMS sensor list. Sensor ids are only unique per signalling type, so
//! the key pairs the two.

use std::cell::RefCell;
use std::rc::Rc;

use comfy_table::Table;
use rxhub_core::message::{TpmsPacket, TpmsSensorType};
use rxhub_core::recent::{FromKey, Keyed, RecentEntries, Updatable};
use rxhub_core::widget::{WidgetId, WidgetTree};
use rxhub_core::{Rect, Subscription};
use serde::Serialize;

use super::{log_packet, opt, Protocol, ProtocolView, ViewContext};
use crate::table::{render_table, Column, RecentEntriesTable, SharedEntries, TableRow};

pub type TireSensorKey = (u32, TpmsSensorType);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TireSensorEntry {
    pub id: u32,
    pub sensor_type: TpmsSensorType,
    pub pressure_kpa: Option<f32>,
    pub temperature_c: Option<i16>,
    pub flags: Option<u8>,
    pub received_count: u32,
    pub last_seen: f64,
}

fn type_label(sensor_type: TpmsSensorType) -> &'static str {
    match sensor_type {
        TpmsSensorType::Fsk19k2Schrader => "FSK",
        TpmsSensorType::Ook8k192Schrader => "OOK",
        TpmsSensorType::Ook8k4Schrader => "OOK4",
    }
}

impl Keyed for TireSensorEntry {
    type Key = TireSensorKey;

    fn key(&self) -> TireSensorKey {
        (self.id, self.sensor_type)
    }
}

impl FromKey for TireSensorEntry {
    fn from_key((id, sensor_type): TireSensorKey) -> Self {
        TireSensorEntry {
            id,
            sensor_type,
            pressure_kpa: None,
            temperature_c: None,
            flags: None,
            received_count: 0,
            last_seen: 0.0,
        }
    }
}

impl Updatable<TpmsPacket> for TireSensorEntry {
    fn update(&mut self, packet: &TpmsPacket) {
        self.received_count += 1;
        self.last_seen = packet.received_at;
        // Not every frame carries every reading.
        if packet.pressure_kpa.is_some() {
            self.pressure_kpa = packet.pressure_kpa;
        }
        if packet.temperature_c.is_some() {
            self.temperature_c = packet.temperature_c;
        }
        if packet.flags.is_some() {
            self.flags = packet.flags;
        }
    }
}

impl TableRow for TireSensorEntry {
    const COLUMNS: &'static [Column] = &[
        Column { title: "Tp", width: 4 },
        Column { title: "ID", width: 8 },
        Column { title: "kPa", width: 5 },
        Column { title: "C", width: 4 },
        Column { title: "Cnt", width: 4 },
        Column { title: "Fl", width: 2 },
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            type_label(self.sensor_type).to_string(),
            format!("{:08X}", self.id),
            opt(self.pressure_kpa.map(|p| format!("{p:.0}"))),
            opt(self.temperature_c),
            self.received_count.to_string(),
            opt(self.flags.map(|f| format!("{f:02X}"))),
        ]
    }
}

pub struct TpmsView {
    recent: SharedEntries<TireSensorEntry>,
    table: WidgetId,
    _subscription: Subscription,
}

impl TpmsView {
    pub fn new(
        ctx: &ViewContext<'_>,
        tree: &mut WidgetTree,
        parent: WidgetId,
        rect: Rect,
    ) -> Self {
        let recent: SharedEntries<TireSensorEntry> =
            Rc::new(RefCell::new(RecentEntries::new(ctx.max_entries)));
        let table = tree.add(parent, rect, RecentEntriesTable::new(Rc::clone(&recent)));

        let subscription = {
            let recent = Rc::clone(&recent);
            let dirty = ctx.dirty.clone();
            let log = ctx.packet_log.clone();
            ctx.registry.subscribe_to::<TpmsPacket, _>(move |packet| {
                recent
                    .borrow_mut()
                    .on_packet((packet.id, packet.sensor_type), packet);
                log_packet(
                    log.as_ref(),
                    &format!("{} {:08X}", type_label(packet.sensor_type), packet.id),
                );
                dirty.set();
            })
        };

        TpmsView {
            recent,
            table,
            _subscription: subscription,
        }
    }

    pub fn entries(&self) -> std::cell::Ref<'_, RecentEntries<TireSensorEntry>> {
        self.recent.borrow()
    }
}

impl ProtocolView for TpmsView {
    fn protocol(&self) -> Protocol {
        Protocol::Tpms
    }

    fn table_widget(&self) -> WidgetId {
        self.table
    }

    fn len(&self) -> usize {
        self.recent.borrow().len()
    }

    fn summary(&self) -> Table {
        render_table(&self.recent.borrow())
    }

    fn entries_json(&self) -> serde_json::Value {
        let recent = self.recent.borrow();
        serde_json::to_value(recent.iter().collect::<Vec<_>>()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
