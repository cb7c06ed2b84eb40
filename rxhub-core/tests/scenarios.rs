//! End-to-end behaviour across the queue, bridge, dispatcher, registry and
//! recent-entries cache.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rxhub_core::message::{AisPacket, TpmsPacket};
use rxhub_core::widget::View;
use rxhub_core::{
    DispatcherConfig, DispatcherContext, EventDispatcher, EventMask, FromKey, Keyed, Message,
    MessageId, RecentEntries, Rect, SharedInput, Updatable, WidgetId, WidgetTree,
};

#[derive(Debug, Clone, PartialEq)]
struct Sensor {
    id: u32,
    last: String,
}

impl Keyed for Sensor {
    type Key = u32;

    fn key(&self) -> u32 {
        self.id
    }
}

impl FromKey for Sensor {
    fn from_key(id: u32) -> Self {
        Sensor { id, last: String::new() }
    }
}

impl Updatable<&str> for Sensor {
    fn update(&mut self, packet: &&str) {
        self.last = packet.to_string();
    }
}

struct Blank;

impl rxhub_core::Display for Blank {
    fn sleep(&mut self) {}
    fn wake(&mut self) {}
    fn set_backlight(&mut self, _on: bool) {}
    fn paint(&mut self, _tree: &WidgetTree, _focus: Option<WidgetId>) {}
    fn show_fault(&mut self, _message: &str) {}
}

fn ids(cache: &RecentEntries<Sensor>) -> Vec<u32> {
    cache.iter().map(|e| e.id).collect()
}

fn dispatcher(
    config: &DispatcherConfig,
) -> (EventDispatcher<SharedInput, Blank>, rxhub_core::BasebandPort) {
    let (context, port) = DispatcherContext::new(config);
    let tree = WidgetTree::new(Rect::new(0, 0, 240, 320), View);
    (EventDispatcher::new(context, tree, None, SharedInput::new(), Blank), port)
}

#[test]
fn test_eviction_then_move_to_front() {
    let mut cache = RecentEntries::<Sensor>::new(3);
    cache.on_packet(1, &"P1");
    cache.on_packet(2, &"P2");
    cache.on_packet(3, &"P3");
    cache.on_packet(4, &"P4");
    assert_eq!(ids(&cache), vec![4, 3, 2]);
    assert!(cache.find(1).is_none());

    cache.on_packet(3, &"P3'");
    assert_eq!(ids(&cache), vec![3, 4, 2]);
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.front().last, "P3'");
}

#[test]
fn test_subscription_scoped_to_handle() {
    let (mut dispatcher, mut port) = dispatcher(&DispatcherConfig::default());
    let calls = Rc::new(RefCell::new(Vec::new()));
    let c = Rc::clone(&calls);
    let sub = dispatcher
        .registry()
        .subscribe_to::<TpmsPacket, _>(move |p| c.borrow_mut().push(p.id));

    port.push(TpmsPacket { id: 0xabc, ..Default::default() }.into()).unwrap();
    let events = dispatcher.wait();
    dispatcher.dispatch(events);
    assert_eq!(*calls.borrow(), vec![0xabc]);

    drop(sub);
    port.push(TpmsPacket { id: 0xdef, ..Default::default() }.into()).unwrap();
    let events = dispatcher.wait();
    dispatcher.dispatch(events);
    assert_eq!(*calls.borrow(), vec![0xabc]);
}

#[test]
fn test_range_around_second_entry() {
    let mut cache = RecentEntries::<Sensor>::new(64);
    for id in (0..10).rev() {
        cache.on_packet(id, &"p");
    }
    let window = cache.range_around(1, 4);
    assert_eq!(window.len(), 4);
    assert!(window.contains(&1));
    assert_eq!(window.start, 0);
}

#[test]
#[should_panic(expected = "already registered")]
fn test_double_registration_is_fatal() {
    let (dispatcher, _port) = dispatcher(&DispatcherConfig::default());
    let _a = dispatcher.registry().subscribe(MessageId::AisPacket, |_| {});
    let _b = dispatcher.registry().subscribe(MessageId::AisPacket, |_| {});
}

#[test]
fn test_tick_before_packets_in_one_pass() {
    let (mut dispatcher, mut port) = dispatcher(&DispatcherConfig::default());
    let order = Rc::new(RefCell::new(Vec::new()));
    let o = Rc::clone(&order);
    let _tick = dispatcher.tick_second().connect(move || o.borrow_mut().push("tick".to_string()));
    let o = Rc::clone(&order);
    let _sub = dispatcher
        .registry()
        .subscribe_to::<AisPacket, _>(move |p| o.borrow_mut().push(format!("ais {}", p.mmsi)));

    port.push(AisPacket { mmsi: 1, ..Default::default() }.into()).unwrap();
    port.irq().event_isr_rtc_tick();
    dispatcher.dispatch(dispatcher.wait());
    assert_eq!(*order.borrow(), vec!["tick".to_string(), "ais 1".to_string()]);
}

#[test]
fn test_packets_from_baseband_thread_arrive_in_order() {
    let config = DispatcherConfig {
        queue_capacity: 8,
        ..Default::default()
    };
    let (mut dispatcher, mut port) = dispatcher(&config);
    let cache = Rc::new(RefCell::new(RecentEntries::<Sensor>::new(64)));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (c, s) = (Rc::clone(&cache), Rc::clone(&seen));
    let _sub = dispatcher.registry().subscribe(MessageId::AisPacket, move |message| {
        if let Message::AisPacket(p) = message {
            s.borrow_mut().push(p.mmsi);
            c.borrow_mut().on_packet(p.mmsi % 5, &"ais");
        }
    });

    let stop = dispatcher.stop_handle();
    let producer = std::thread::spawn(move || {
        let mut sent = 0u32;
        while sent < 200 {
            let msg = AisPacket { mmsi: sent, ..Default::default() }.into();
            match port.push(msg) {
                Ok(()) => sent += 1,
                Err(_) => std::thread::sleep(Duration::from_micros(50)),
            }
        }
        // Give the dispatcher a chance to drain before stopping.
        while !port.is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }
        stop.request_stop();
    });

    dispatcher.run();
    producer.join().unwrap();

    let seen = seen.borrow();
    assert_eq!(*seen, (0..200).collect::<Vec<_>>());
    assert_eq!(cache.borrow().len(), 5);
    assert_eq!(cache.borrow().front().id, 199 % 5);
}

#[test]
fn test_empty_mask_dispatch_is_noop() {
    let (mut dispatcher, _port) = dispatcher(&DispatcherConfig::default());
    dispatcher.dispatch(EventMask::empty());
    assert!(!dispatcher.is_halted());
}
