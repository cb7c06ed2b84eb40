//! rxhub-core: event dispatch and recent-entries tracking for a dual-core
//! receiver.
//!
//! The baseband core pushes decoded packets into a lock-free cross-core
//! queue and raises an interrupt; the application core's event dispatcher
//! wakes, drains the queue in FIFO order and hands each message to the one
//! subscribed view, which folds it into a bounded recent-entries cache.
//!
//! No async and no platform code here. Hosts plug in through the
//! [`widget::InputDevices`] and [`widget::Display`] traits.

pub mod config;
pub mod dispatcher;
pub mod irq;
pub mod message;
pub mod packet_log;
pub mod queue;
pub mod recent;
pub mod registry;
pub mod signal;
pub mod types;
pub mod widget;

// Re-export commonly used types at crate root
pub use config::{load_config, Config, DispatcherConfig};
pub use dispatcher::{
    BasebandPort, DispatcherContext, EventDispatcher, LocalSender, SleepHandle, StopHandle,
};
pub use irq::{EventMask, IrqBridge};
pub use message::{Message, MessageId, MessagePayload};
pub use packet_log::PacketLog;
pub use recent::{Aging, FromKey, Keyed, RecentEntries, Updatable};
pub use registry::{MessageRegistry, Subscription};
pub use signal::{Signal, SignalToken};
pub use types::*;
pub use widget::{Display, InputDevices, KeyEvent, SharedInput, Widget, WidgetId, WidgetTree};
