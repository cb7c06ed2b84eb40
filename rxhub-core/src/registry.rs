//! Message handler registry: one callback per [`MessageId`], bound to the
//! lifetime of a [`Subscription`].
//!
//! Everything here runs on the dispatcher thread, so the table is shared
//! through `Rc<RefCell<_>>` rather than a lock. The registry is `!Send` on
//! purpose: registering from interrupt context or another core is a
//! compile error.
//!
//! A handler may subscribe, unsubscribe (including itself), or send other
//! messages while it runs. Its slot is vacated for the duration of the call
//! and restored afterwards only if it still belongs to the same
//! subscription.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::message::{Message, MessageId, MessagePayload};

type Handler = Box<dyn FnMut(&Message)>;

struct Slot {
    token: u64,
    /// `None` while the handler is running.
    handler: Option<Handler>,
}

/// Fixed table indexed by message tag.
pub struct MessageHandlerMap {
    slots: Vec<Option<Slot>>,
    next_token: u64,
}

impl MessageHandlerMap {
    fn new() -> Self {
        MessageHandlerMap {
            slots: (0..MessageId::COUNT).map(|_| None).collect(),
            next_token: 1,
        }
    }

    fn register(&mut self, id: MessageId, handler: Handler) -> u64 {
        let slot = &mut self.slots[id.index()];
        if slot.is_some() {
            panic!("message handler already registered for {id}");
        }
        let token = self.next_token;
        self.next_token += 1;
        *slot = Some(Slot {
            token,
            handler: Some(handler),
        });
        token
    }

    /// Remove the slot if `token` still owns it. The removed slot is
    /// returned so the caller can drop the handler after releasing the
    /// borrow.
    fn unregister(&mut self, id: MessageId, token: u64) -> Option<Slot> {
        let slot = &mut self.slots[id.index()];
        match slot {
            Some(s) if s.token == token => slot.take(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry handle
// ---------------------------------------------------------------------------

/// Shared handle to the handler table. Clones refer to the same table.
#[derive(Clone)]
pub struct MessageRegistry {
    map: Rc<RefCell<MessageHandlerMap>>,
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active: Vec<MessageId> = MessageId::ALL
            .iter()
            .copied()
            .filter(|id| self.is_subscribed(*id))
            .collect();
        f.debug_struct("MessageRegistry")
            .field("active", &active)
            .finish()
    }
}

impl MessageRegistry {
    pub fn new() -> Self {
        MessageRegistry {
            map: Rc::new(RefCell::new(MessageHandlerMap::new())),
        }
    }

    /// Register `handler` for `id` until the returned handle is dropped.
    ///
    /// # Panics
    /// If `id` already has an active subscriber.
    pub fn subscribe<F>(&self, id: MessageId, handler: F) -> Subscription
    where
        F: FnMut(&Message) + 'static,
    {
        let token = self.map.borrow_mut().register(id, Box::new(handler));
        debug!(%id, token, "subscribed");
        Subscription {
            id,
            token,
            map: Rc::downgrade(&self.map),
        }
    }

    /// Typed variant of [`subscribe`](Self::subscribe): the handler receives
    /// the payload directly.
    pub fn subscribe_to<P, F>(&self, mut handler: F) -> Subscription
    where
        P: MessagePayload + 'static,
        F: FnMut(&P) + 'static,
    {
        self.subscribe(P::ID, move |message| {
            if let Some(payload) = P::from_message(message) {
                handler(payload);
            }
        })
    }

    /// Deliver `message` to its subscriber, synchronously.
    ///
    /// Returns `false` if the message was dropped: no subscriber, or the
    /// subscriber for this id is itself currently running.
    pub fn send(&self, message: &Message) -> bool {
        let id = message.id();

        let (token, mut handler) = {
            let mut map = self.map.borrow_mut();
            let Some(slot) = map.slots[id.index()].as_mut() else {
                debug!(%id, "no subscriber, dropped");
                return false;
            };
            let Some(handler) = slot.handler.take() else {
                debug!(%id, "re-entrant send, dropped");
                return false;
            };
            (slot.token, handler)
        };

        handler(message);

        let mut map = self.map.borrow_mut();
        if let Some(slot) = map.slots[id.index()].as_mut() {
            if slot.token == token && slot.handler.is_none() {
                slot.handler = Some(handler);
                return true;
            }
        }
        drop(map);
        // Unsubscribed while running; `handler` is dropped here, outside
        // the borrow, in case it owns other subscriptions.
        true
    }

    pub fn is_subscribed(&self, id: MessageId) -> bool {
        self.map.borrow().slots[id.index()].is_some()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Scoped registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: MessageId,
    token: u64,
    map: Weak<RefCell<MessageHandlerMap>>,
}

impl Subscription {
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Explicit form of dropping the handle.
    pub fn unsubscribe(self) {}

    /// Keep the handler registered for the rest of the registry's life.
    /// The id can never be subscribed again.
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(map) = self.map.upgrade() else {
            return;
        };
        let removed = map.borrow_mut().unregister(self.id, self.token);
        if removed.is_some() {
            debug!(id = %self.id, token = self.token, "unsubscribed");
        }
        drop(removed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
