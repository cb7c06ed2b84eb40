//! Producer end of the cross-core link.

use rxhub_core::{BasebandPort, IrqBridge, Message};
use tracing::{debug, error, warn};

/// Owns the baseband half of the cross-core queue. One per producer thread.
pub struct BasebandLink {
    port: BasebandPort,
    sent: u64,
}

impl BasebandLink {
    pub fn new(port: BasebandPort) -> Self {
        BasebandLink { port, sent: 0 }
    }

    /// Push `message` and raise the queue interrupt.
    ///
    /// Returns `false` if the queue was full and the message was dropped.
    /// Overflow is logged at 1, 2, 4, 8, ... drops.
    pub fn send(&mut self, message: impl Into<Message>) -> bool {
        let message = message.into();
        let id = message.id();
        match self.port.push(message) {
            Ok(()) => {
                self.sent += 1;
                debug!(%id, "pushed to application core");
                true
            }
            Err(_) => {
                let dropped = self.port.dropped();
                if dropped.is_power_of_two() {
                    warn!(
                        %id,
                        dropped,
                        capacity = self.port.capacity(),
                        "cross-core queue full, dropping newest"
                    );
                }
                false
            }
        }
    }

    pub fn report_fault(&self, text: &str) {
        error!(fault = text, "baseband fault");
        self.port.report_fault(text);
    }

    /// Messages accepted by the queue.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Messages rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.port.dropped()
    }

    /// Messages still waiting for the application core.
    pub fn pending(&self) -> usize {
        self.port.len()
    }

    pub fn capacity(&self) -> usize {
        self.port.capacity()
    }

    pub fn irq(&self) -> &IrqBridge {
        self.port.irq()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rxhub_core::message::{GpsFix, Retune};
    use rxhub_core::DispatcherConfig;
    use rxhub_core::DispatcherContext;

    #[test]
    fn test_send_counts_and_overflow() {
        let config = DispatcherConfig {
            queue_capacity: 2,
            ..Default::default()
        };
        let (_context, port) = DispatcherContext::new(&config);
        let mut link = BasebandLink::new(port);

        assert!(link.send(Retune { freq_hz: 162_025_000 }));
        assert!(link.send(GpsFix::default()));
        assert!(!link.send(Retune { freq_hz: 1 }));
        assert_eq!(link.sent(), 2);
        assert_eq!(link.dropped(), 1);
        assert_eq!(link.pending(), 2);
    }
}
