//! Replays a [`PacketScript`] through a [`BasebandLink`], honouring the
//! recorded delays.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::link::BasebandLink;
use crate::script::PacketScript;

/// Sleeps are chopped into slices this long so a stop request is noticed.
const STOP_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub sent: u64,
    pub dropped: u64,
    /// True when the replay ended early on a stop request.
    pub stopped: bool,
}

#[derive(Debug, Clone)]
pub struct Replayer {
    script: PacketScript,
    /// Delay multiplier; 0.0 sends back to back.
    time_scale: f64,
}

impl Replayer {
    pub fn new(script: PacketScript) -> Self {
        Replayer {
            script,
            time_scale: 1.0,
        }
    }

    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale.max(0.0);
        self
    }

    /// Send every record, sleeping its delay first. Returns early once
    /// `stop` is set.
    pub fn run(&self, link: &mut BasebandLink, stop: &AtomicBool) -> ReplayStats {
        let dropped_before = link.dropped();
        let mut stats = ReplayStats::default();

        for record in self.script.records() {
            let delay = Duration::from_millis(record.delay_ms).mul_f64(self.time_scale);
            if !sleep_unless_stopped(delay, stop) {
                stats.stopped = true;
                break;
            }
            if link.send(record.message.clone()) {
                stats.sent += 1;
            }
        }

        stats.dropped = link.dropped() - dropped_before;
        info!(
            sent = stats.sent,
            dropped = stats.dropped,
            stopped = stats.stopped,
            "replay finished"
        );
        stats
    }

    /// Run on a dedicated thread playing the baseband core.
    pub fn spawn(
        self,
        mut link: BasebandLink,
        stop: Arc<AtomicBool>,
    ) -> io::Result<JoinHandle<ReplayStats>> {
        thread::Builder::new()
            .name("baseband".into())
            .spawn(move || {
                debug!(records = self.script.len(), "replay started");
                self.run(&mut link, &stop)
            })
    }
}

fn sleep_unless_stopped(delay: Duration, stop: &AtomicBool) -> bool {
    let mut remaining = delay;
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        if remaining.is_zero() {
            return true;
        }
        let step = remaining.min(STOP_POLL);
        thread::sleep(step);
        remaining -= step;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rxhub_core::message::AisPacket;
    use rxhub_core::{DispatcherConfig, DispatcherContext, Message, MessageId};

    use crate::script::ScriptRecord;

    fn ais_script(n: u32, delay_ms: u64) -> PacketScript {
        PacketScript::new(
            (0..n)
                .map(|mmsi| ScriptRecord {
                    delay_ms,
                    message: Message::from(AisPacket {
                        mmsi,
                        ..Default::default()
                    }),
                })
                .collect(),
        )
    }

    #[test]
    fn test_replay_counts_drops() {
        let config = DispatcherConfig {
            queue_capacity: 3,
            ..Default::default()
        };
        let (_context, port) = DispatcherContext::new(&config);
        let mut link = BasebandLink::new(port);
        let stop = AtomicBool::new(false);

        let stats = Replayer::new(ais_script(5, 0)).run(&mut link, &stop);
        assert_eq!(
            stats,
            ReplayStats {
                sent: 3,
                dropped: 2,
                stopped: false
            }
        );
    }

    #[test]
    fn test_stop_ends_replay_early() {
        let (_context, port) = DispatcherContext::new(&DispatcherConfig::default());
        let link = BasebandLink::new(port);
        let stop = Arc::new(AtomicBool::new(false));

        let handle = Replayer::new(ais_script(10, 10_000))
            .spawn(link, Arc::clone(&stop))
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        stop.store(true, Ordering::Release);

        let stats = handle.join().unwrap();
        assert!(stats.stopped);
        assert_eq!(stats.sent, 0);
    }

    #[test]
    fn test_messages_reach_consumer_side() {
        let (context, port) = DispatcherContext::new(&DispatcherConfig::default());
        let mut link = BasebandLink::new(port);
        let stop = AtomicBool::new(false);
        Replayer::new(ais_script(4, 1))
            .with_time_scale(0.0)
            .run(&mut link, &stop);
        assert_eq!(link.pending(), 4);
        assert!(!context.registry().is_subscribed(MessageId::AisPacket));
    }
}
