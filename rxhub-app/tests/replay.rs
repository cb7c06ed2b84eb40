//! Headless replay from a script file through the full view stack.

use std::io::Write;

use rxhub_app::{replay_headless, Protocol};
use rxhub_baseband::PacketScript;
use rxhub_core::Config;

const SCRIPT: &str = r#"
# two vessels, one heard twice
{"delay_ms": 0, "message": {"AisPacket": {"mmsi": 244660000, "message_type": 1}}}
{"delay_ms": 0, "message": {"AisPacket": {"mmsi": 211000001, "message_type": 1}}}
{"message": {"AisPacket": {"mmsi": 244660000, "message_type": 5, "name": "NORDIC STAR"}}}
{"delay_ms": 0, "message": {"AdsbPacket": {"icao": 2748, "callsign": "KLM123", "amplitude": 40}}}
{"delay_ms": 30000, "message": {"AdsbPacket": {"icao": 3567, "amplitude": 20}}}
{"delay_ms": 35000, "message": {"TpmsPacket": {"id": 4660, "pressure_kpa": 230.0}}}
"#;

fn load_script() -> PacketScript {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SCRIPT.as_bytes()).unwrap();
    PacketScript::load(file.path()).unwrap()
}

#[test]
fn test_replay_fills_every_view() {
    let report = replay_headless(&load_script(), &Protocol::ALL, &Config::default());

    assert_eq!(report.sent, 6);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.ticks, 65);

    let lens: Vec<(Protocol, usize)> = report
        .views
        .iter()
        .map(|v| (v.protocol(), v.len()))
        .collect();
    // The first aircraft went silent for more than a minute and expired.
    assert_eq!(
        lens,
        vec![(Protocol::Ais, 2), (Protocol::Adsb, 1), (Protocol::Tpms, 1)]
    );

    let json = report.to_json();
    let vessels = &json["views"]["ais"];
    assert_eq!(vessels[0]["mmsi"], 244660000);
    assert_eq!(vessels[0]["name"], "NORDIC STAR");
    assert_eq!(vessels[0]["received_count"], 2);
    assert_eq!(json["views"]["adsb"][0]["icao"], 3567);
    assert_eq!(json["views"]["adsb"][0]["age"], 35);
    assert_eq!(json["views"]["tpms"][0]["pressure_kpa"], 230.0);

    assert!(report.frame.contains("MMSI"));
    assert!(report.frame.contains("ICAO"));
    assert!(report.frame.contains("NORDIC STAR"));
}

#[test]
fn test_unsubscribed_protocols_are_ignored() {
    let report = replay_headless(&load_script(), &[Protocol::Tpms], &Config::default());
    assert_eq!(report.sent, 6);
    assert_eq!(report.views.len(), 1);
    assert_eq!(report.views[0].len(), 1);
    assert!(report.to_json()["views"].get("ais").is_none());
}

#[test]
fn test_small_queue_drains_instead_of_dropping() {
    let mut config = Config::default();
    config.dispatcher.queue_capacity = 2;
    let report = replay_headless(&load_script(), &Protocol::ALL, &config);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.views[0].len(), 2);
}

#[test]
fn test_summary_table_lists_entries() {
    let report = replay_headless(&load_script(), &[Protocol::Adsb], &Config::default());
    let table = report.views[0].summary().to_string();
    assert!(table.contains("000DEF"));
    assert!(!table.contains("000ABC"));
}
