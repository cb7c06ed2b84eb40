//! Interrupt flag bridge.
//!
//! Interrupt-context code (hardware ISRs on target, timer tasks and input
//! threads when hosted) never does real work. It ORs a bit into the pending
//! [`EventMask`] and wakes the dispatcher thread, nothing more. The
//! dispatcher later takes the whole mask in one swap and handles each bit.
//!
//! Signals raised while no dispatcher is live are discarded.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::message::Message;
use crate::queue::QueueProbe;

bitflags! {
    /// Pending event classes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const APPLICATION = 1 << 0;
        const LOCAL = 1 << 1;
        const RTC_TICK = 1 << 2;
        const SWITCHES = 1 << 3;
        const ENCODER = 1 << 4;
        const TOUCH = 1 << 5;
        const LCD_FRAME_SYNC = 1 << 6;
    }
}

impl EventMask {
    /// Dispatch order within a single pass.
    pub const PRIORITY: [EventMask; 7] = [
        EventMask::RTC_TICK,
        EventMask::LCD_FRAME_SYNC,
        EventMask::APPLICATION,
        EventMask::LOCAL,
        EventMask::SWITCHES,
        EventMask::ENCODER,
        EventMask::TOUCH,
    ];
}

// ---------------------------------------------------------------------------
// Event signal
// ---------------------------------------------------------------------------

/// Pending-event word plus the thread to wake.
///
/// `signal` is callable from any thread. `wait` must only be called from
/// the thread that attached as the dispatcher, because it parks that thread.
#[derive(Debug, Default)]
pub struct EventSignal {
    pending: AtomicU32,
    live: AtomicBool,
    stop: AtomicBool,
    // Held only long enough to unpark or replace the handle.
    waiter: Mutex<Option<Thread>>,
}

impl EventSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// OR `events` into the pending mask and wake the dispatcher.
    pub fn signal(&self, events: EventMask) {
        if !self.live.load(Ordering::Acquire) {
            return;
        }
        self.pending.fetch_or(events.bits(), Ordering::AcqRel);
        self.wake();
    }

    /// Block until at least one event is pending (or stop was requested),
    /// then take and clear the whole mask.
    pub fn wait(&self) -> EventMask {
        loop {
            let bits = self.pending.swap(0, Ordering::AcqRel);
            if bits != 0 || self.stop_requested() {
                return EventMask::from_bits_truncate(bits);
            }
            // Unpark tokens are sticky, so a signal between the swap and
            // the park is not lost.
            thread::park();
        }
    }

    /// Take and clear the pending mask without blocking.
    pub fn take_pending(&self) -> EventMask {
        EventMask::from_bits_truncate(self.pending.swap(0, Ordering::AcqRel))
    }

    pub fn pending(&self) -> EventMask {
        EventMask::from_bits_truncate(self.pending.load(Ordering::Acquire))
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Register the calling thread as the dispatcher and go live.
    pub(crate) fn attach(&self) {
        *self.waiter.lock() = Some(thread::current());
        self.stop.store(false, Ordering::Release);
        self.live.store(true, Ordering::Release);
    }

    pub(crate) fn detach(&self) {
        self.live.store(false, Ordering::Release);
        *self.waiter.lock() = None;
        self.pending.store(0, Ordering::Release);
    }

    fn wake(&self) {
        if let Some(waiter) = self.waiter.lock().as_ref() {
            waiter.unpark();
        }
    }
}

// ---------------------------------------------------------------------------
// Interrupt bridge
// ---------------------------------------------------------------------------

/// The interrupt-context entry points. Cheap to clone; hand one to every
/// timer task, input thread, or baseband link.
#[derive(Clone)]
pub struct IrqBridge {
    signal: Arc<EventSignal>,
    application_queue: QueueProbe<Message>,
}

impl IrqBridge {
    pub fn new(signal: Arc<EventSignal>, application_queue: QueueProbe<Message>) -> Self {
        IrqBridge {
            signal,
            application_queue,
        }
    }

    /// Raised by the baseband core after pushing to the application queue.
    pub fn check_fifo_isr(&self) {
        if !self.application_queue.is_empty() {
            self.signal.signal(EventMask::APPLICATION);
        }
    }

    pub fn event_isr_rtc_tick(&self) {
        self.signal.signal(EventMask::RTC_TICK);
    }

    pub fn event_isr_lcd_frame_sync(&self) {
        self.signal.signal(EventMask::LCD_FRAME_SYNC);
    }

    pub fn event_isr_switches(&self) {
        self.signal.signal(EventMask::SWITCHES);
    }

    pub fn event_isr_encoder(&self) {
        self.signal.signal(EventMask::ENCODER);
    }

    pub fn event_isr_touch(&self) {
        self.signal.signal(EventMask::TOUCH);
    }

    pub fn is_live(&self) -> bool {
        self.signal.is_live()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DisplaySleep, Message};
    use crate::queue;
    use std::time::Duration;

    fn bridge() -> (Arc<EventSignal>, IrqBridge, queue::Producer<Message>) {
        let signal = Arc::new(EventSignal::new());
        let (tx, _rx) = queue::channel(4);
        let irq = IrqBridge::new(Arc::clone(&signal), tx.probe());
        (signal, irq, tx)
    }

    #[test]
    fn test_priority_covers_every_bit() {
        let all = EventMask::PRIORITY
            .iter()
            .fold(EventMask::empty(), |acc, m| acc | *m);
        assert_eq!(all, EventMask::all());
        assert_eq!(EventMask::PRIORITY[0], EventMask::RTC_TICK);
    }

    #[test]
    fn test_signal_ignored_when_not_live() {
        let (signal, irq, _tx) = bridge();
        irq.event_isr_rtc_tick();
        assert!(signal.pending().is_empty());
    }

    #[test]
    fn test_bits_accumulate_until_taken() {
        let (signal, irq, _tx) = bridge();
        signal.attach();
        irq.event_isr_rtc_tick();
        irq.event_isr_touch();
        irq.event_isr_rtc_tick();
        assert_eq!(signal.wait(), EventMask::RTC_TICK | EventMask::TOUCH);
        assert!(signal.take_pending().is_empty());
    }

    #[test]
    fn test_check_fifo_only_when_non_empty() {
        let (signal, irq, mut tx) = bridge();
        signal.attach();
        irq.check_fifo_isr();
        assert!(signal.pending().is_empty());

        tx.push(Message::from(DisplaySleep)).unwrap();
        irq.check_fifo_isr();
        assert_eq!(signal.take_pending(), EventMask::APPLICATION);
    }

    #[test]
    fn test_wait_wakes_on_signal_from_other_thread() {
        let (signal, irq, _tx) = bridge();
        signal.attach();
        let isr = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            irq.event_isr_lcd_frame_sync();
        });
        assert_eq!(signal.wait(), EventMask::LCD_FRAME_SYNC);
        isr.join().unwrap();
    }

    #[test]
    fn test_request_stop_releases_wait() {
        let (signal, _irq, _tx) = bridge();
        signal.attach();
        let remote = Arc::clone(&signal);
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.request_stop();
        });
        assert!(signal.wait().is_empty());
        assert!(signal.stop_requested());
        stopper.join().unwrap();
    }

    #[test]
    fn test_detach_clears_and_disables() {
        let (signal, irq, _tx) = bridge();
        signal.attach();
        irq.event_isr_encoder();
        signal.detach();
        assert!(!irq.is_live());
        assert!(signal.pending().is_empty());
        irq.event_isr_encoder();
        assert!(signal.pending().is_empty());
    }
}
