//! Subscriber lists for the link, sender and receiver events.
//!
//! The same handler-list model the address space uses for methods:
//! subscribers are invoked in subscription order, a panicking subscriber
//! never prevents the remaining subscribers from running, and the emitter
//! learns about panics so it can surface them on its error event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::warn;

use crate::errors::OscError;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A token identifying one subscription; pass it back to
/// [`Event::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

/// An event with a list of subscribers.
pub struct Event<T> {
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Event {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> Event<T> {
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        Subscription(id)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|(id, _)| *id != subscription.0);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Invoke every subscriber with `value`, in subscription order.
    /// Panics are caught per subscriber and returned as
    /// [`OscError::HandlerPanic`]; the list lock is not held during the
    /// calls, so subscribers may themselves (un)subscribe.
    pub fn emit(&self, value: &T) -> Vec<OscError> {
        let snapshot: Vec<Callback<T>> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        let mut panics = Vec::new();
        for callback in snapshot {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(value))) {
                let message = panic_message(payload);
                warn!("event subscriber panicked: {}", message);
                panics.push(OscError::HandlerPanic(message));
            }
        }
        panics
    }
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
