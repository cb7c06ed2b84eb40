//! Multi-listener notification with scoped tokens.
//!
//! Used for the once-per-second tick that drives clock widgets and entry
//! aging. Unlike the message registry, any number of listeners may be
//! connected; they run in connection order.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Listener = Box<dyn FnMut()>;

#[derive(Default)]
struct Listeners {
    entries: Vec<(u64, Option<Listener>)>,
    next_token: u64,
}

/// Cheap-clone handle; clones share listeners.
#[derive(Clone, Default)]
pub struct Signal {
    inner: Rc<RefCell<Listeners>>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `listener` until the returned token is dropped.
    pub fn connect<F: FnMut() + 'static>(&self, listener: F) -> SignalToken {
        let mut inner = self.inner.borrow_mut();
        inner.next_token += 1;
        let token = inner.next_token;
        inner.entries.push((token, Some(Box::new(listener))));
        SignalToken {
            token,
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Call every listener connected at the moment of the call.
    ///
    /// Listeners may connect or disconnect while running; listeners
    /// connected during an emit first run on the next one.
    pub fn emit(&self) {
        let tokens: Vec<u64> = self.inner.borrow().entries.iter().map(|(t, _)| *t).collect();
        for token in tokens {
            let taken = {
                let mut inner = self.inner.borrow_mut();
                inner
                    .entries
                    .iter_mut()
                    .find(|(t, _)| *t == token)
                    .and_then(|(_, l)| l.take())
            };
            let Some(mut listener) = taken else {
                continue;
            };
            listener();
            let mut inner = self.inner.borrow_mut();
            if let Some((_, slot)) = inner.entries.iter_mut().find(|(t, _)| *t == token) {
                *slot = Some(listener);
            } else {
                drop(inner);
                drop(listener);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Disconnects its listener on drop.
#[must_use = "dropping a SignalToken disconnects immediately"]
pub struct SignalToken {
    token: u64,
    inner: Weak<RefCell<Listeners>>,
}

impl Drop for SignalToken {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let removed = {
            let mut listeners = inner.borrow_mut();
            listeners
                .entries
                .iter()
                .position(|(t, _)| *t == self.token)
                .map(|i| listeners.entries.remove(i))
        };
        drop(removed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
