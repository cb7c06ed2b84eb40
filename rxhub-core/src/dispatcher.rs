//! Event dispatcher: the application core's single cooperative loop.
//!
//! ```text
//!  ISRs / timer tasks ──▶ EventSignal ──wait()──▶ dispatch(mask)
//!                           │ RTC tick      backlight timer, tick_second
//!                           │ frame sync    DisplayFrameSync, paint
//!                           │ application   drain cross-core queue ─▶ registry
//!                           │ local         drain local queue      ─▶ registry
//!                           │ switches      bubble keys / move focus
//!                           │ encoder       bubble delta
//!                           └ touch         hit-test, capture, release
//! ```
//!
//! All state here lives on the dispatcher thread. The only things that
//! cross threads are the [`BasebandPort`] (producer half of the cross-core
//! queue), [`IrqBridge`] clones, [`StopHandle`] and [`SleepHandle`].

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::irq::{EventMask, EventSignal, IrqBridge};
use crate::message::{DisplayFrameSync, Message, MessageId};
use crate::queue::{self, Consumer, Producer, QueueFull};
use crate::registry::MessageRegistry;
use crate::signal::Signal;
use crate::widget::{
    Display, EncoderEvent, FocusManager, InputDevices, KeyEvent, Switches, TouchEvent, TouchKind,
    Widget, WidgetId, WidgetTree,
};

type FaultSlot = Arc<Mutex<Option<String>>>;

// ---------------------------------------------------------------------------
// Baseband side
// ---------------------------------------------------------------------------

/// Producer half of the cross-core queue plus the interrupt to raise after
/// pushing. Move it to the thread playing the DSP core.
pub struct BasebandPort {
    producer: Producer<Message>,
    irq: IrqBridge,
    signal: Arc<EventSignal>,
    fault: FaultSlot,
}

impl BasebandPort {
    /// Push and raise the queue interrupt. On a full queue the message is
    /// handed back (drop-newest).
    pub fn push(&mut self, message: Message) -> Result<(), QueueFull<Message>> {
        let pushed = self.producer.push(message);
        self.irq.check_fifo_isr();
        pushed
    }

    /// Record a fatal baseband fault. Only the first report is kept.
    pub fn report_fault(&self, text: impl Into<String>) {
        let mut slot = self.fault.lock();
        if slot.is_none() {
            *slot = Some(text.into());
        }
        drop(slot);
        self.signal.signal(EventMask::APPLICATION);
    }

    pub fn irq(&self) -> &IrqBridge {
        &self.irq
    }

    pub fn dropped(&self) -> u64 {
        self.producer.dropped()
    }

    pub fn len(&self) -> usize {
        self.producer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity()
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Requests the dispatcher loop to exit. `Send`; usable from any thread.
#[derive(Clone)]
pub struct StopHandle {
    signal: Arc<EventSignal>,
}

impl StopHandle {
    /// Takes effect at the top of the next loop iteration; an in-flight
    /// dispatch completes first.
    pub fn request_stop(&self) {
        self.signal.request_stop();
    }

    pub fn stop_requested(&self) -> bool {
        self.signal.stop_requested()
    }
}

/// Asks the dispatcher to put the display to sleep. `Send`.
#[derive(Clone)]
pub struct SleepHandle {
    requested: Arc<AtomicBool>,
    signal: Arc<EventSignal>,
}

impl SleepHandle {
    pub fn request_sleep(&self) {
        self.requested.store(true, Ordering::Release);
        self.signal.signal(EventMask::LOCAL);
    }
}

/// Posts messages onto the local queue from the dispatcher thread itself
/// (views talking to other views). Clones share one producer.
#[derive(Clone)]
pub struct LocalSender {
    producer: Rc<RefCell<Producer<Message>>>,
    signal: Arc<EventSignal>,
}

impl LocalSender {
    /// Returns `false` if the local queue was full and the message dropped.
    pub fn send(&self, message: impl Into<Message>) -> bool {
        let message = message.into();
        let id = message.id();
        let pushed = self.producer.borrow_mut().push(message);
        match pushed {
            Ok(()) => {
                self.signal.signal(EventMask::LOCAL);
                true
            }
            Err(_) => {
                warn!(%id, "local queue full, message dropped");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything the dispatcher needs besides widgets and devices: queues,
/// event signal, registry and tick signal.
pub struct DispatcherContext {
    signal: Arc<EventSignal>,
    irq: IrqBridge,
    application: Consumer<Message>,
    local: Consumer<Message>,
    local_sender: LocalSender,
    registry: MessageRegistry,
    tick_second: Signal,
    fault: FaultSlot,
    sleep_requested: Arc<AtomicBool>,
    backlight_timeout_secs: u32,
}

impl DispatcherContext {
    pub fn new(config: &DispatcherConfig) -> (DispatcherContext, BasebandPort) {
        let signal = Arc::new(EventSignal::new());
        let (producer, application) = queue::channel(config.queue_capacity);
        let (local_producer, local) = queue::channel(config.local_queue_capacity);
        let irq = IrqBridge::new(Arc::clone(&signal), producer.probe());
        let fault = FaultSlot::default();

        let port = BasebandPort {
            producer,
            irq: irq.clone(),
            signal: Arc::clone(&signal),
            fault: Arc::clone(&fault),
        };
        let context = DispatcherContext {
            local_sender: LocalSender {
                producer: Rc::new(RefCell::new(local_producer)),
                signal: Arc::clone(&signal),
            },
            signal,
            irq,
            application,
            local,
            registry: MessageRegistry::new(),
            tick_second: Signal::new(),
            fault,
            sleep_requested: Arc::new(AtomicBool::new(false)),
            backlight_timeout_secs: config.backlight_timeout_secs,
        };
        (context, port)
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    /// Emitted once per RTC tick.
    pub fn tick_second(&self) -> &Signal {
        &self.tick_second
    }

    pub fn irq(&self) -> IrqBridge {
        self.irq.clone()
    }

    pub fn local_sender(&self) -> LocalSender {
        self.local_sender.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            signal: Arc::clone(&self.signal),
        }
    }

    pub fn sleep_handle(&self) -> SleepHandle {
        SleepHandle {
            requested: Arc::clone(&self.sleep_requested),
            signal: Arc::clone(&self.signal),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct EventDispatcher<I, D> {
    context: DispatcherContext,
    tree: WidgetTree,
    focus: FocusManager,
    input: I,
    display: D,
    captured: Option<WidgetId>,
    in_key_event: bool,
    encoder_last: u32,
    sleeping: bool,
    backlight_on: bool,
    idle_secs: u32,
    halted: bool,
}

impl<I: InputDevices, D: Display> EventDispatcher<I, D> {
    /// Take ownership of the context and go live on the calling thread.
    /// Interrupts raised before this point were discarded.
    pub fn new(
        context: DispatcherContext,
        tree: WidgetTree,
        focus: Option<WidgetId>,
        mut input: I,
        display: D,
    ) -> Self {
        let encoder_last = input.encoder_position();
        let mut dispatcher = EventDispatcher {
            context,
            tree,
            focus: FocusManager::new(),
            input,
            display,
            captured: None,
            in_key_event: false,
            encoder_last,
            sleeping: false,
            backlight_on: false,
            idle_secs: 0,
            halted: false,
        };
        dispatcher.focus.set_focus(&mut dispatcher.tree, focus);
        dispatcher.context.signal.attach();
        info!("event dispatcher live");
        dispatcher
    }

    /// Wait and dispatch until stop is requested.
    pub fn run(&mut self) {
        info!("event dispatcher running");
        while !self.context.signal.stop_requested() {
            let events = self.wait();
            self.dispatch(events);
        }
        info!("event dispatcher stopped");
    }

    /// Block until an event is pending (or stop is requested) and take the
    /// pending mask.
    pub fn wait(&self) -> EventMask {
        self.context.signal.wait()
    }

    /// Handle every bit in `events`, in priority order.
    pub fn dispatch(&mut self, events: EventMask) {
        if self.halted || self.check_fault() {
            return;
        }
        if self.context.sleep_requested.swap(false, Ordering::AcqRel) {
            self.set_display_sleep(true);
        }

        for event in EventMask::PRIORITY {
            if !events.contains(event) {
                continue;
            }
            if event == EventMask::RTC_TICK {
                self.handle_rtc_tick();
            } else if event == EventMask::LCD_FRAME_SYNC {
                self.handle_lcd_frame_sync();
            } else if event == EventMask::APPLICATION {
                self.handle_application_queue();
            } else if event == EventMask::LOCAL {
                self.handle_local_queue();
            } else if event == EventMask::SWITCHES {
                self.handle_switches();
            } else if event == EventMask::ENCODER {
                self.handle_encoder();
            } else if event == EventMask::TOUCH {
                self.handle_touch();
            }
        }
    }

    pub fn request_stop(&self) {
        self.context.signal.request_stop();
    }

    pub fn set_display_sleep(&mut self, enabled: bool) {
        if enabled == self.sleeping {
            return;
        }
        self.sleeping = enabled;
        if enabled {
            info!("display sleep");
            self.display.set_backlight(false);
            self.backlight_on = false;
            self.display.sleep();
        } else {
            info!("display wake");
            self.display.wake();
            self.idle_secs = 0;
            self.tree.set_dirty();
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn context(&self) -> &DispatcherContext {
        &self.context
    }

    pub fn registry(&self) -> &MessageRegistry {
        self.context.registry()
    }

    pub fn tick_second(&self) -> &Signal {
        self.context.tick_second()
    }

    pub fn local_sender(&self) -> LocalSender {
        self.context.local_sender()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.context.stop_handle()
    }

    pub fn sleep_handle(&self) -> SleepHandle {
        self.context.sleep_handle()
    }

    pub fn irq(&self) -> IrqBridge {
        self.context.irq()
    }

    pub fn tree(&self) -> &WidgetTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut WidgetTree {
        &mut self.tree
    }

    pub fn focus_widget(&self) -> Option<WidgetId> {
        self.focus.focus_widget()
    }

    pub fn set_focus(&mut self, id: Option<WidgetId>) {
        self.focus.set_focus(&mut self.tree, id);
    }

    pub fn captured_widget(&self) -> Option<WidgetId> {
        self.captured
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn is_display_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    // -- handlers -----------------------------------------------------------

    fn check_fault(&mut self) -> bool {
        let fault = self.context.fault.lock().take();
        if let Some(text) = fault {
            error!(fault = %text, "baseband fault, halting dispatch");
            self.display.show_fault(&text);
            self.halted = true;
        }
        self.halted
    }

    fn handle_rtc_tick(&mut self) {
        let timeout = self.context.backlight_timeout_secs;
        if timeout > 0 && !self.sleeping {
            self.idle_secs = self.idle_secs.saturating_add(1);
            if self.idle_secs >= timeout {
                self.set_display_sleep(true);
            }
        }
        self.context.tick_second.emit();
    }

    fn handle_lcd_frame_sync(&mut self) {
        if self.sleeping {
            return;
        }
        self.context.registry.send(&Message::from(DisplayFrameSync));
        if self.tree.take_dirty() {
            self.display.paint(&self.tree, self.focus.focus_widget());
        }
        if !self.backlight_on {
            self.display.set_backlight(true);
            self.backlight_on = true;
        }
    }

    fn handle_application_queue(&mut self) {
        let registry = &self.context.registry;
        let mut sleep = false;
        self.context
            .application
            .drain(|message| sleep |= deliver(registry, &message));
        if sleep {
            self.set_display_sleep(true);
        }
    }

    fn handle_local_queue(&mut self) {
        let registry = &self.context.registry;
        let mut sleep = false;
        self.context
            .local
            .drain(|message| sleep |= deliver(registry, &message));
        if sleep {
            self.set_display_sleep(true);
        }
    }

    fn handle_switches(&mut self) {
        while let Some(state) = self.input.poll_switches() {
            self.on_switches(state);
        }
    }

    fn on_switches(&mut self, state: Switches) {
        if state.is_empty() {
            self.in_key_event = false;
            return;
        }
        // Held keys do not repeat.
        if self.in_key_event {
            return;
        }
        self.in_key_event = true;
        self.idle_secs = 0;

        if self.sleeping {
            self.set_display_sleep(false);
            return;
        }

        for key in state.keys() {
            self.on_key(key);
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if !self.bubble(|w| w.on_key(key)) {
            self.focus.update(&mut self.tree, key);
        }
    }

    fn handle_encoder(&mut self) {
        let position = self.input.encoder_position();
        let delta = position.wrapping_sub(self.encoder_last) as EncoderEvent;
        self.encoder_last = position;
        if delta == 0 {
            return;
        }
        self.idle_secs = 0;

        if self.sleeping {
            self.set_display_sleep(false);
            return;
        }
        self.bubble(|w| w.on_encoder(delta));
    }

    fn handle_touch(&mut self) {
        while let Some(event) = self.input.poll_touch() {
            self.on_touch(event);
        }
    }

    fn on_touch(&mut self, event: TouchEvent) {
        self.idle_secs = 0;
        if self.sleeping {
            self.set_display_sleep(false);
            return;
        }

        match event.kind {
            TouchKind::Start => {
                let root = self.tree.root();
                self.captured = touch_widget(&mut self.tree, root, event);
                if self.captured.is_some() {
                    self.tree.set_dirty();
                }
            }
            TouchKind::Move => {
                if let Some(id) = self.captured {
                    self.tree.widget_dyn_mut(id).on_touch(event);
                    self.tree.set_dirty();
                }
            }
            TouchKind::End => {
                if let Some(id) = self.captured.take() {
                    self.tree.widget_dyn_mut(id).on_touch(event);
                    self.tree.set_dirty();
                }
            }
        }
    }

    /// Offer an event to the focused widget, then its ancestors, until one
    /// handles it.
    fn bubble(&mut self, mut handler: impl FnMut(&mut dyn Widget) -> bool) -> bool {
        let mut target = self.focus.focus_widget();
        while let Some(id) = target {
            if handler(self.tree.widget_dyn_mut(id)) {
                self.tree.set_dirty();
                return true;
            }
            target = self.tree.parent(id);
        }
        false
    }
}

impl<I, D> Drop for EventDispatcher<I, D> {
    fn drop(&mut self) {
        self.context.signal.detach();
        debug!("event dispatcher detached");
    }
}

/// Depth-first hit test. Later children are drawn on top, so they are
/// tried first; a widget is only hit if it accepts the touch.
fn touch_widget(tree: &mut WidgetTree, id: WidgetId, event: TouchEvent) -> Option<WidgetId> {
    if tree.hidden(id) {
        return None;
    }
    let children = tree.children(id).to_vec();
    for child in children.into_iter().rev() {
        if let Some(hit) = touch_widget(tree, child, event) {
            return Some(hit);
        }
    }
    if tree.rect(id).contains(event.point) && tree.widget_dyn_mut(id).on_touch(event) {
        return Some(id);
    }
    None
}

/// Hand one message to its subscriber. Returns whether it asks the display
/// to sleep.
fn deliver(registry: &MessageRegistry, message: &Message) -> bool {
    let id = message.id();
    let handled = registry.send(message);
    debug!(%id, handled, "message dispatched");
    id == MessageId::DisplaySleep
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
