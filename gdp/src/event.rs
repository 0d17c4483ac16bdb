// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session-wide event queue.
//!
//! Results of asynchronous operations (subscriptions, asynchronous reads and appends) are not
//! returned to the caller but pushed onto the queue of the session. Events are kept in the order
//! they were produced in and can be polled either for one log handle or for all of them.
use std::collections::VecDeque;
use std::fmt;
use std::pin::pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use gdp_core::{Datum, GdpName};
use tokio::sync::Notify;

use crate::error::GdpError;
use crate::registry::GinId;

/// Identifier of an asynchronous request, carried by every event it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Record delivered by a subscription or an asynchronous read.
    Data,

    /// Asynchronous append was committed, the event carries the appended record.
    Created,

    /// Subscription or asynchronous read finished.
    Done,

    /// Requested record does not exist.
    Missing,

    /// Request failed, the event carries the error.
    Failure,
}

#[derive(Debug)]
pub struct Event {
    pub(crate) kind: EventKind,
    pub(crate) gin: GinId,
    pub(crate) name: GdpName,
    pub(crate) request: RequestId,
    pub(crate) datum: Option<Datum>,
    pub(crate) error: Option<GdpError>,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Id of the handle the event originates from, resolve it with [`Gdp::gin`].
    ///
    /// [`Gdp::gin`]: crate::Gdp::gin
    pub fn gin(&self) -> GinId {
        self.gin
    }

    /// Name of the log the event originates from.
    pub fn name(&self) -> &GdpName {
        &self.name
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    pub fn datum(&self) -> Option<&Datum> {
        self.datum.as_ref()
    }

    pub fn into_datum(self) -> Option<Datum> {
        self.datum
    }

    pub fn error(&self) -> Option<&GdpError> {
        self.error.as_ref()
    }
}

/// Ordered queue of events shared by all handles of a session.
#[derive(Default)]
pub(crate) struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    notify: Notify,
    next_request: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_id(&self) -> RequestId {
        RequestId(self.next_request.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Event>> {
        self.events
            .lock()
            .expect("acquire exclusive access on event queue")
    }

    /// Pushes an event unless its request was cancelled.
    ///
    /// The flag is checked while holding the queue, a request cancelled before
    /// [`EventQueue::discard`] runs can not leave events behind.
    pub fn push(&self, event: Event, active: &AtomicBool) -> bool {
        {
            let mut events = self.lock();
            if !active.load(Ordering::Acquire) {
                return false;
            }
            events.push_back(event);
        }
        self.notify.notify_waiters();
        true
    }

    /// Removes all queued events matching the predicate, returns how many were removed.
    pub fn discard(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        let mut events = self.lock();
        let before = events.len();
        events.retain(|event| !predicate(event));
        before - events.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn take(&self, gin: Option<GinId>) -> Option<Event> {
        let mut events = self.lock();
        match gin {
            None => events.pop_front(),
            Some(gin) => {
                let index = events.iter().position(|event| event.gin == gin)?;
                events.remove(index)
            }
        }
    }

    /// Waits for the oldest event, optionally only of one handle.
    ///
    /// A zero timeout waits forever.
    pub async fn next(&self, gin: Option<GinId>, timeout: Duration) -> Result<Event, GdpError> {
        let wait = async {
            loop {
                let mut notified = pin!(self.notify.notified());
                notified.as_mut().enable();

                if let Some(event) = self.take(gin) {
                    return event;
                }

                notified.await;
            }
        };

        if timeout.is_zero() {
            return Ok(wait.await);
        }

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| GdpError::Timeout)
    }
}
