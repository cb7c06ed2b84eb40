//! ADS-B aircraft list, keyed by ICAO address.
//!
//! Aircraft age once per second. The list is kept grouped by age state,
//! freshest group first, and an aircraft silent for [`DECAY_C`] seconds is
//! dropped.

use std::cell::RefCell;
use std::rc::Rc;

use comfy_table::Table;
use rxhub_core::message::AdsbPacket;
use rxhub_core::recent::{Aging, FromKey, Keyed, RecentEntries, Updatable};
use rxhub_core::widget::{WidgetId, WidgetTree};
use rxhub_core::{Rect, SignalToken, Subscription};
use serde::Serialize;
use tracing::{debug, info};

use super::{log_packet, opt, Protocol, ProtocolView, ViewContext};
use crate::table::{render_table, Column, RecentEntriesTable, SharedEntries, TableRow};

/// Seconds of silence before an aircraft leaves the "current" states.
pub const DECAY_A: u32 = 10;
pub const DECAY_B: u32 = 30;
/// Seconds of silence after which an aircraft expires.
pub const DECAY_C: u32 = 60;

/// Age state at or above which an entry is removed.
const EXPIRED_STATE: u8 = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftEntry {
    pub icao: u32,
    pub callsign: Option<String>,
    pub altitude_ft: Option<i32>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed_kts: Option<f64>,
    pub heading_deg: Option<f64>,
    /// Smoothed signal amplitude.
    pub amp: u32,
    pub hits: u32,
    /// Seconds since the last packet.
    pub age: u32,
    /// 0: current with position, 1: current, 2 and 3: fading, 4: expired.
    pub age_state: u8,
    pub last_seen: f64,
}

impl AircraftEntry {
    pub fn has_position(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    fn state_for_age(&self) -> u8 {
        match self.age {
            a if a < DECAY_A => {
                if self.has_position() {
                    0
                } else {
                    1
                }
            }
            a if a < DECAY_B => 2,
            a if a < DECAY_C => 3,
            _ => EXPIRED_STATE,
        }
    }
}

impl Keyed for AircraftEntry {
    type Key = u32;

    fn key(&self) -> u32 {
        self.icao
    }
}

impl FromKey for AircraftEntry {
    fn from_key(icao: u32) -> Self {
        AircraftEntry {
            icao,
            callsign: None,
            altitude_ft: None,
            lat: None,
            lon: None,
            speed_kts: None,
            heading_deg: None,
            amp: 0,
            hits: 0,
            age: 0,
            age_state: 1,
            last_seen: 0.0,
        }
    }
}

impl Updatable<AdsbPacket> for AircraftEntry {
    fn update(&mut self, packet: &AdsbPacket) {
        self.amp = if self.hits == 0 {
            packet.amplitude
        } else {
            // 1/16 weight for the new sample.
            ((self.amp as u64 * 15 + packet.amplitude as u64) >> 4) as u32
        };
        self.hits += 1;
        self.last_seen = packet.received_at;

        if let Some(callsign) = &packet.callsign {
            self.callsign = Some(callsign.trim().to_string());
        }
        if packet.altitude_ft.is_some() {
            self.altitude_ft = packet.altitude_ft;
        }
        if let (Some(lat), Some(lon)) = (packet.lat, packet.lon) {
            self.lat = Some(lat);
            self.lon = Some(lon);
        }
        if packet.speed_kts.is_some() {
            self.speed_kts = packet.speed_kts;
        }
        if packet.heading_deg.is_some() {
            self.heading_deg = packet.heading_deg;
        }

        self.age = 0;
        self.age_state = self.state_for_age();
    }
}

impl Aging for AircraftEntry {
    fn tick(&mut self, seconds: u32) {
        self.age = self.age.saturating_add(seconds);
        self.age_state = self.state_for_age();
    }

    fn is_expired(&self) -> bool {
        self.age_state >= EXPIRED_STATE
    }
}

impl TableRow for AircraftEntry {
    const COLUMNS: &'static [Column] = &[
        Column { title: "ICAO", width: 6 },
        Column { title: "Call", width: 8 },
        Column { title: "Lvl", width: 3 },
        Column { title: "Alt", width: 6 },
        Column { title: "Age", width: 4 },
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            format!("{:06X}", self.icao),
            self.callsign.clone().unwrap_or_else(|| "-".into()),
            self.amp.to_string(),
            opt(self.altitude_ft),
            format!("{}s", self.age),
        ]
    }
}

/// One second of housekeeping: group by age state, cap the list, drop
/// expired aircraft, then age the survivors.
pub fn age_entries(recent: &mut RecentEntries<AircraftEntry>, max_entries: usize) -> usize {
    recent.sort_by_key(|e| e.age_state);
    recent.truncate(max_entries);
    let removed = recent.remove_expired();
    recent.tick_all(1);
    removed
}

pub struct AdsbView {
    recent: SharedEntries<AircraftEntry>,
    table: WidgetId,
    _subscription: Subscription,
    _tick: SignalToken,
}

impl AdsbView {
    pub fn new(
        ctx: &ViewContext<'_>,
        tree: &mut WidgetTree,
        parent: WidgetId,
        rect: Rect,
    ) -> Self {
        let recent: SharedEntries<AircraftEntry> =
            Rc::new(RefCell::new(RecentEntries::new(ctx.max_entries)));

        let mut table = RecentEntriesTable::new(Rc::clone(&recent));
        table.set_on_select(|a: &AircraftEntry| {
            info!(
                icao = %format!("{:06X}", a.icao),
                callsign = a.callsign.as_deref().unwrap_or("-"),
                hits = a.hits,
                "aircraft selected"
            );
        });
        let table = tree.add(parent, rect, table);

        let subscription = {
            let recent = Rc::clone(&recent);
            let dirty = ctx.dirty.clone();
            let log = ctx.packet_log.clone();
            ctx.registry.subscribe_to::<AdsbPacket, _>(move |packet| {
                recent.borrow_mut().on_packet(packet.icao, packet);
                log_packet(
                    log.as_ref(),
                    &format!(
                        "{:06X} {}",
                        packet.icao,
                        packet.callsign.as_deref().unwrap_or("")
                    ),
                );
                dirty.set();
            })
        };

        let tick = {
            let recent = Rc::clone(&recent);
            let dirty = ctx.dirty.clone();
            let max_entries = ctx.max_entries;
            ctx.tick_second.connect(move || {
                let mut recent = recent.borrow_mut();
                if recent.is_empty() {
                    return;
                }
                let removed = age_entries(&mut recent, max_entries);
                if removed > 0 {
                    debug!(removed, "aircraft expired");
                }
                dirty.set();
            })
        };

        AdsbView {
            recent,
            table,
            _subscription: subscription,
            _tick: tick,
        }
    }

    pub fn entries(&self) -> std::cell::Ref<'_, RecentEntries<AircraftEntry>> {
        self.recent.borrow()
    }
}

impl ProtocolView for AdsbView {
    fn protocol(&self) -> Protocol {
        Protocol::Adsb
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::screen_rect;
    use rxhub_core::widget::{DirtyFlag, View};
    use rxhub_core::{Message, MessageRegistry, Signal};

    fn packet(icao: u32, amplitude: u32) -> AdsbPacket {
        AdsbPacket {
            icao,
            amplitude,
            ..Default::default()
        }
    }

    #[test]
    fn test_amplitude_smoothing() {
        let mut a = AircraftEntry::from_key(0x3C6586);
        a.update(&packet(0x3C6586, 160));
        assert_eq!(a.amp, 160);
        a.update(&packet(0x3C6586, 320));
        assert_eq!(a.amp, 170);
        assert_eq!(a.hits, 2);
    }

    #[test]
    fn test_age_states() {
        let mut a = AircraftEntry::from_key(1);
        a.update(&packet(1, 10));
        assert_eq!(a.age_state, 1);

        a.update(&AdsbPacket {
            lat: Some(52.3),
            lon: Some(4.7),
            ..packet(1, 10)
        });
        assert_eq!(a.age_state, 0);

        a.tick(DECAY_A);
        assert_eq!(a.age_state, 2);
        a.tick(DECAY_B - DECAY_A);
        assert_eq!(a.age_state, 3);
        assert!(!a.is_expired());
        a.tick(DECAY_C - DECAY_B);
        assert!(a.is_expired());

        a.update(&packet(1, 10));
        assert_eq!(a.age, 0);
        assert_eq!(a.age_state, 0);
    }

    #[test]
    fn test_age_entries_groups_and_expires() {
        let mut recent: RecentEntries<AircraftEntry> = RecentEntries::new(8);
        recent.on_packet(1, &packet(1, 1));
        recent.on_packet(2, &packet(2, 1));
        recent.find_mut(2).unwrap().tick(DECAY_C);
        // 2 is at the front but expired.
        assert_eq!(recent.front().icao, 2);
        let removed = age_entries(&mut recent, 8);
        assert_eq!(removed, 1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent.front().age, 1);
    }

    #[test]
    fn test_view_ages_on_tick() {
        let registry = MessageRegistry::new();
        let tick = Signal::new();
        let mut tree = WidgetTree::new(screen_rect(), View);
        let root = tree.root();
        let dirty = DirtyFlag::default();
        let ctx = ViewContext {
            registry: &registry,
            tick_second: &tick,
            dirty: dirty.clone(),
            max_entries: 16,
            packet_log: None,
        };
        let view = AdsbView::new(&ctx, &mut tree, root, screen_rect());

        registry.send(&Message::from(packet(0xA0, 5)));
        assert_eq!(view.len(), 1);

        for _ in 0..DECAY_C {
            tick.emit();
        }
        assert_eq!(view.entries().front().age_state, EXPIRED_STATE);
        tick.emit();
        assert!(view.is_empty());

        drop(view);
        assert!(tick.is_empty());
    }
}
