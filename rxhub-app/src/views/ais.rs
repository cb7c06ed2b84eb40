//! AIS vessel list, keyed by MMSI.

use std::cell::RefCell;
use std::rc::Rc;

use comfy_table::Table;
use rxhub_core::message::AisPacket;
use rxhub_core::recent::{FromKey, Keyed, RecentEntries, Updatable};
use rxhub_core::widget::{WidgetId, WidgetTree};
use rxhub_core::{Rect, Subscription};
use serde::Serialize;
use tracing::info;

use super::{log_packet, opt, Protocol, ProtocolView, ViewContext};
use crate::table::{render_table, Column, RecentEntriesTable, SharedEntries, TableRow};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VesselEntry {
    pub mmsi: u32,
    pub name: Option<String>,
    pub call_sign: Option<String>,
    pub destination: Option<String>,
    pub navigational_status: Option<u8>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed_over_ground: Option<f32>,
    pub course_over_ground: Option<f32>,
    pub true_heading: Option<u16>,
    pub received_count: u32,
    pub last_seen: f64,
}

impl VesselEntry {
    /// Name if known, else call sign.
    pub fn label(&self) -> Option<&str> {
        self.name.as_deref().or(self.call_sign.as_deref())
    }
}

impl Keyed for VesselEntry {
    type Key = u32;

    fn key(&self) -> u32 {
        self.mmsi
    }
}

impl FromKey for VesselEntry {
    fn from_key(mmsi: u32) -> Self {
        VesselEntry {
            mmsi,
            name: None,
            call_sign: None,
            destination: None,
            navigational_status: None,
            lat: None,
            lon: None,
            speed_over_ground: None,
            course_over_ground: None,
            true_heading: None,
            received_count: 0,
            last_seen: 0.0,
        }
    }
}

impl Updatable<AisPacket> for VesselEntry {
    fn update(&mut self, packet: &AisPacket) {
        self.received_count += 1;
        self.last_seen = packet.received_at;

        // Position reports and static data arrive in different message
        // types; keep whatever each one carries.
        if let Some(name) = &packet.name {
            self.name = Some(name.trim().to_string());
        }
        if let Some(call_sign) = &packet.call_sign {
            self.call_sign = Some(call_sign.trim().to_string());
        }
        if let Some(destination) = &packet.destination {
            self.destination = Some(destination.trim().to_string());
        }
        if packet.navigational_status.is_some() {
            self.navigational_status = packet.navigational_status;
        }
        if let (Some(lat), Some(lon)) = (packet.lat, packet.lon) {
            self.lat = Some(lat);
            self.lon = Some(lon);
        }
        if packet.speed_over_ground.is_some() {
            self.speed_over_ground = packet.speed_over_ground;
        }
        if packet.course_over_ground.is_some() {
            self.course_over_ground = packet.course_over_ground;
        }
        if packet.true_heading.is_some() {
            self.true_heading = packet.true_heading;
        }
    }
}

impl TableRow for VesselEntry {
    const COLUMNS: &'static [Column] = &[
        Column { title: "MMSI", width: 9 },
        Column { title: "Name/Call", width: 16 },
        Column { title: "Cnt", width: 4 },
        Column { title: "SOG", width: 5 },
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            format!("{:09}", self.mmsi),
            self.label().unwrap_or("-").to_string(),
            self.received_count.to_string(),
            opt(self.speed_over_ground.map(|s| format!("{s:.1}"))),
        ]
    }
}

pub struct AisView {
    recent: SharedEntries<VesselEntry>,
    table: WidgetId,
    _subscription: Subscription,
}

impl AisView {
    pub fn new(
        ctx: &ViewContext<'_>,
        tree: &mut WidgetTree,
        parent: WidgetId,
        rect: Rect,
    ) -> Self {
        let recent: SharedEntries<VesselEntry> =
            Rc::new(RefCell::new(RecentEntries::new(ctx.max_entries)));

        let mut table = RecentEntriesTable::new(Rc::clone(&recent));
        table.set_on_select(|v: &VesselEntry| {
            info!(
                mmsi = v.mmsi,
                name = v.label().unwrap_or("-"),
                destination = v.destination.as_deref().unwrap_or("-"),
                "vessel selected"
            );
        });
        let table = tree.add(parent, rect, table);

        let subscription = {
            let recent = Rc::clone(&recent);
            let dirty = ctx.dirty.clone();
            let log = ctx.packet_log.clone();
            ctx.registry.subscribe_to::<AisPacket, _>(move |packet| {
                recent.borrow_mut().on_packet(packet.mmsi, packet);
                log_packet(
                    log.as_ref(),
                    &format!("{:09} {}", packet.mmsi, packet.message_type),
                );
                dirty.set();
            })
        };

        AisView {
            recent,
            table,
            _subscription: subscription,
        }
    }

    pub fn entries(&self) -> std::cell::Ref<'_, RecentEntries<VesselEntry>> {
        self.recent.borrow()
    }
}

impl ProtocolView for AisView {
    fn protocol(&self) -> Protocol {
        Protocol::Ais
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
