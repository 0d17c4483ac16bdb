// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background tasks delivering results of asynchronous requests as events.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gdp_core::{Datum, GdpName, Hash, RecNo};
use gdp_store::LogStore;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::GdpError;
use crate::event::{Event, EventKind, EventQueue, RequestId};
use crate::io::{Reader, Writer};
use crate::registry::GinId;

/// Pushes the events of one request onto the session queue.
#[derive(Clone)]
pub(crate) struct Delivery {
    gin: GinId,
    name: GdpName,
    request: RequestId,
    events: Arc<EventQueue>,
    active: Arc<AtomicBool>,
}

impl Delivery {
    pub fn new(gin: GinId, name: GdpName, request: RequestId, events: Arc<EventQueue>) -> Self {
        Self {
            gin,
            name,
            request,
            events,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Delivery of another request, cancelled together with this one.
    pub fn for_request(&self, request: RequestId) -> Self {
        Self {
            request,
            ..self.clone()
        }
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    fn push(&self, kind: EventKind, datum: Option<Datum>, error: Option<GdpError>) -> bool {
        let event = Event {
            kind,
            gin: self.gin,
            name: self.name,
            request: self.request,
            datum,
            error,
        };
        self.events.push(event, &self.active)
    }

    pub fn data(&self, datum: Datum) -> bool {
        self.push(EventKind::Data, Some(datum), None)
    }

    pub fn created(&self, datum: Datum) -> bool {
        self.push(EventKind::Created, Some(datum), None)
    }

    pub fn done(&self) -> bool {
        self.push(EventKind::Done, None, None)
    }

    pub fn missing(&self, recno: RecNo) -> bool {
        self.push(
            EventKind::Missing,
            None,
            Some(GdpError::RecordNotFound(recno as i64)),
        )
    }

    /// Delivers a failure, informational outcomes are dropped.
    pub fn failure(&self, err: GdpError) -> bool {
        if !err.severity().is_failure() {
            debug!(request = %self.request, "ignore status: {err}");
            return false;
        }
        self.push(EventKind::Failure, None, Some(err))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Appender,
    Read,
    Subscription,
}

/// Running background task of a handle, aborted when dropped.
pub(crate) struct Task {
    kind: TaskKind,
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Task {
    pub fn spawn<F>(kind: TaskKind, delivery: &Delivery, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            kind,
            active: delivery.active.clone(),
            handle: tokio::spawn(future),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.handle.abort();
    }
}

/// Asynchronous append waiting for the appender of a handle.
pub(crate) struct AppendJob {
    pub delivery: Delivery,
    pub datum: Datum,
    pub prev_hash: Option<Hash>,
}

/// Processes the asynchronous appends of a handle in submission order.
pub(crate) async fn run_appender<S>(writer: Writer<S>, mut rx: mpsc::Receiver<AppendJob>)
where
    S: LogStore,
{
    while let Some(job) = rx.recv().await {
        let AppendJob {
            delivery,
            mut datum,
            prev_hash,
        } = job;

        match writer.append(&mut datum, prev_hash.as_ref()).await {
            Ok(_) => {
                delivery.created(datum);
            }
            Err(err) => {
                delivery.failure(err);
            }
        }
    }
    trace!("appender stopped");
}

/// Reads up to `max` records starting at `first`, or up to the current tail if `max` is zero.
pub(crate) async fn run_read<S>(reader: Reader<S>, delivery: Delivery, first: i64, max: u64)
where
    S: LogStore,
{
    let result: Result<(), GdpError> = async {
        let Some(first) = reader.resolve(first).await? else {
            delivery.missing(first.max(0) as RecNo);
            return Ok(());
        };

        let last = match max {
            0 => reader.nrecs().await?,
            max => first.saturating_add(max - 1),
        };
        if first > last {
            delivery.missing(first);
            return Ok(());
        }

        for recno in first..=last {
            match reader.read(recno).await {
                Ok(datum) => {
                    delivery.data(datum);
                }
                Err(GdpError::RecordNotFound(_)) => {
                    delivery.missing(recno);
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            delivery.done();
        }
        Err(err) => {
            delivery.failure(err);
        }
    }
}

/// Delivers existing records from `start`, then every new record, until `max` records were
/// delivered. A `max` of zero subscribes forever.
///
/// The receiver has to be obtained before the start is resolved, records appended in between are
/// then caught up on and neither skipped nor delivered twice.
pub(crate) async fn run_subscription<S>(
    reader: Reader<S>,
    delivery: Delivery,
    mut rx: broadcast::Receiver<RecNo>,
    mut next: RecNo,
    max: u64,
) where
    S: LogStore,
{
    let mut delivered = 0;
    debug!(request = %delivery.request(), start = next, max, "start subscription");

    loop {
        // Catch up to the tail.
        loop {
            if max > 0 && delivered >= max {
                debug!(request = %delivery.request(), delivered, "subscription complete");
                delivery.done();
                return;
            }

            match reader.read(next).await {
                Ok(datum) => {
                    delivery.data(datum);
                    next += 1;
                    delivered += 1;
                }
                Err(GdpError::RecordNotFound(_)) => break,
                Err(err) => {
                    warn!(request = %delivery.request(), "subscription failed: {err}");
                    delivery.failure(err);
                    return;
                }
            }
        }

        match rx.recv().await {
            Ok(recno) => trace!(recno, "new record"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                trace!(skipped, "subscription lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => {
                delivery.done();
                return;
            }
        }
    }
}
