// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handles of open logs.
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use gdp_core::{Datum, GdpName, Hash, Metadata, PublicKey, RecNo};
use gdp_store::LogStore;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::GdpError;
use crate::event::{Event, EventQueue, RequestId};
use crate::io::{Reader, Writer};
use crate::registry::{GinId, Registry};
use crate::subscription::{
    AppendJob, Delivery, Task, TaskKind, run_appender, run_read, run_subscription,
};

/// What a log was opened for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IoMode {
    ReadOnly,
    AppendOnly,
    ReadAppend,
}

impl IoMode {
    pub fn is_readable(&self) -> bool {
        matches!(self, IoMode::ReadOnly | IoMode::ReadAppend)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, IoMode::AppendOnly | IoMode::ReadAppend)
    }
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            IoMode::ReadOnly => "RO",
            IoMode::AppendOnly => "AO",
            IoMode::ReadAppend => "RA",
        };
        write!(f, "{value}")
    }
}

/// Inbox of the task processing asynchronous appends.
struct Appender {
    tx: mpsc::Sender<AppendJob>,
    delivery: Delivery,
}

type Tasks = HashMap<RequestId, Task>;

/// State of a handle between open and close.
pub(crate) struct OpenLog<S> {
    metadata: Metadata,
    reader: Reader<S>,
    writer: Option<Writer<S>>,
    appender: Option<Appender>,
    /// Running tasks, `None` once the log was shut down.
    tasks: Mutex<Option<Tasks>>,
}

impl<S> OpenLog<S>
where
    S: LogStore,
{
    /// Sets up the log state, spawning an appender when a writer is given.
    pub fn new(
        gin: GinId,
        name: GdpName,
        metadata: Metadata,
        reader: Reader<S>,
        writer: Option<Writer<S>>,
        events: &Arc<EventQueue>,
        queue_len: usize,
    ) -> Self {
        let mut tasks = Tasks::new();

        let appender = writer.clone().map(|writer| {
            let (tx, rx) = mpsc::channel(queue_len.max(1));
            let delivery = Delivery::new(gin, name, events.request_id(), events.clone());
            let task = Task::spawn(TaskKind::Appender, &delivery, run_appender(writer, rx));
            tasks.insert(delivery.request(), task);
            Appender { tx, delivery }
        });

        Self {
            metadata,
            reader,
            writer,
            appender,
            tasks: Mutex::new(Some(tasks)),
        }
    }
}

impl<S> OpenLog<S> {
    fn tasks(&self) -> MutexGuard<'_, Option<Tasks>> {
        self.tasks
            .lock()
            .expect("acquire exclusive access on log tasks")
    }

    /// Spawns a task delivering into the session queue, unless the log was shut down.
    fn spawn<F>(&self, kind: TaskKind, delivery: &Delivery, future: F) -> Result<(), GdpError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks();
        let Some(tasks) = tasks.as_mut() else {
            return Err(GdpError::HandleClosed);
        };

        tasks.retain(|_, task| !task.is_finished());
        tasks.insert(delivery.request(), Task::spawn(kind, delivery, future));
        Ok(())
    }

    /// Cancels tasks of the given kind, optionally only one request. Returns the cancelled
    /// request ids.
    fn cancel(&self, kind: TaskKind, request: Option<RequestId>) -> Vec<RequestId> {
        let mut tasks = self.tasks();
        let Some(tasks) = tasks.as_mut() else {
            return Vec::new();
        };

        let cancelled: Vec<RequestId> = tasks
            .iter()
            .filter(|(id, task)| task.kind() == kind && request.is_none_or(|r| r == **id))
            .map(|(id, _)| *id)
            .collect();
        for id in &cancelled {
            // Dropping aborts the task.
            tasks.remove(id);
        }
        cancelled
    }

    /// Aborts all tasks, no events are delivered afterwards.
    fn shutdown(&self) -> usize {
        self.tasks().take().map(|tasks| tasks.len()).unwrap_or_default()
    }
}

enum GinState<S> {
    Open(Arc<OpenLog<S>>),
    Closed,
}

pub(crate) struct GinInner<S> {
    id: GinId,
    name: GdpName,
    mode: IoMode,
    state: Mutex<GinState<S>>,
    events: Arc<EventQueue>,
    registry: Weak<Mutex<Registry<Gin<S>>>>,
}

/// Handle of an open log.
///
/// The handle returned by [`Gdp::open`] owns the log and closes it when dropped. Clones of it
/// and handles obtained through [`Gdp::gin`] are views which leave the log open when dropped.
/// Every handle can close the log explicitly, afterwards all operations fail with
/// [`GdpError::HandleClosed`].
///
/// [`Gdp::open`]: crate::Gdp::open
/// [`Gdp::gin`]: crate::Gdp::gin
pub struct Gin<S> {
    inner: Arc<GinInner<S>>,
    owned: bool,
}

impl<S> Gin<S> {
    pub(crate) fn new(
        id: GinId,
        name: GdpName,
        mode: IoMode,
        log: OpenLog<S>,
        events: Arc<EventQueue>,
        registry: Weak<Mutex<Registry<Gin<S>>>>,
    ) -> Self {
        Self {
            inner: Arc::new(GinInner {
                id,
                name,
                mode,
                state: Mutex::new(GinState::Open(Arc::new(log))),
                events,
                registry,
            }),
            owned: false,
        }
    }

    /// Owning handle of the same log.
    pub(crate) fn to_owned_handle(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            owned: true,
        }
    }

    fn state(&self) -> MutexGuard<'_, GinState<S>> {
        self.inner
            .state
            .lock()
            .expect("acquire exclusive access on handle state")
    }

    fn open_log(&self) -> Result<Arc<OpenLog<S>>, GdpError> {
        match &*self.state() {
            GinState::Open(log) => Ok(log.clone()),
            GinState::Closed => Err(GdpError::HandleClosed),
        }
    }

    pub fn id(&self) -> GinId {
        self.inner.id
    }

    pub fn name(&self) -> &GdpName {
        &self.inner.name
    }

    pub fn mode(&self) -> IoMode {
        self.inner.mode
    }

    /// Returns true if dropping this handle closes the log.
    pub fn is_owner(&self) -> bool {
        self.owned
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state(), GinState::Closed)
    }

    /// Closes the log, cancelling subscriptions and pending requests and discarding queued
    /// events. Closing again has no effect.
    pub fn close(&self) {
        let mut state = self.state();
        let GinState::Open(log) = std::mem::replace(&mut *state, GinState::Closed) else {
            return;
        };

        let cancelled = log.shutdown();

        if let Some(registry) = self.inner.registry.upgrade() {
            let removed = registry
                .lock()
                .expect("acquire exclusive access on handle registry")
                .remove(self.inner.id);
            drop(removed);
        }

        let id = self.inner.id;
        let discarded = self.inner.events.discard(|event| event.gin == id);
        debug!(name = %self.inner.name, gin = %id, cancelled, discarded, "close log");
    }

    /// Sealed metadata of the log.
    pub fn metadata(&self) -> Result<Metadata, GdpError> {
        Ok(self.open_log()?.metadata.clone())
    }

    /// Public key records of the log are signed with.
    pub fn writer_key(&self) -> Result<PublicKey, GdpError> {
        Ok(*self.open_log()?.reader.writer_key())
    }

    fn check_readable(&self) -> Result<(), GdpError> {
        if !self.mode().is_readable() {
            return Err(GdpError::NotReadable(self.mode()));
        }
        Ok(())
    }
}

impl<S> Gin<S>
where
    S: LogStore,
{
    /// Number of records in the log.
    pub async fn nrecs(&self) -> Result<RecNo, GdpError> {
        let log = self.open_log()?;
        log.reader.nrecs().await
    }

    /// Appends a record and returns its record number.
    ///
    /// The datum is filled in with record number, timestamp, previous hash and signature. When
    /// `prev_hash` is given the append only succeeds if it is the hash of the latest record,
    /// otherwise it fails with [`GdpError::HashChainMismatch`].
    pub async fn append(
        &self,
        datum: &mut Datum,
        prev_hash: Option<&Hash>,
    ) -> Result<RecNo, GdpError> {
        let log = self.open_log()?;
        let writer = log
            .writer
            .as_ref()
            .ok_or(GdpError::NotWritable(self.mode()))?;
        writer.append(datum, prev_hash).await
    }

    /// Queues an append without waiting for it.
    ///
    /// Exactly one datum is accepted per call. The outcome is delivered as
    /// [`EventKind::Created`] or [`EventKind::Failure`] event carrying the returned request id,
    /// appends of one handle are committed in the order they were queued in.
    ///
    /// [`EventKind::Created`]: crate::EventKind::Created
    /// [`EventKind::Failure`]: crate::EventKind::Failure
    pub async fn append_async(
        &self,
        datums: Vec<Datum>,
        prev_hash: Option<Hash>,
    ) -> Result<RequestId, GdpError> {
        let log = self.open_log()?;
        let appender = log
            .appender
            .as_ref()
            .ok_or(GdpError::NotWritable(self.mode()))?;

        let [datum]: [Datum; 1] = datums
            .try_into()
            .map_err(|datums: Vec<Datum>| GdpError::UnsupportedBatchSize(datums.len()))?;

        let delivery = appender
            .delivery
            .for_request(self.inner.events.request_id());
        let request = delivery.request();
        appender
            .tx
            .send(AppendJob {
                delivery,
                datum,
                prev_hash,
            })
            .await
            .map_err(|_| GdpError::HandleClosed)?;

        Ok(request)
    }

    /// Reads a record by its number, negative numbers count back from the latest record.
    pub async fn read_by_recno(&self, recno: i64) -> Result<Datum, GdpError> {
        let log = self.open_log()?;
        self.check_readable()?;

        let resolved = log
            .reader
            .resolve(recno)
            .await?
            .ok_or(GdpError::RecordNotFound(recno))?;
        log.reader.read(resolved).await
    }

    /// Reads up to `max` records starting at `first` in the background, all records up to the
    /// latest one if `max` is zero.
    ///
    /// Records are delivered as data events, followed by a missing event if the log ended
    /// early and a done event.
    pub async fn read_by_recno_async(&self, first: i64, max: u64) -> Result<RequestId, GdpError> {
        let log = self.open_log()?;
        self.check_readable()?;

        let delivery = self.delivery();
        log.spawn(
            TaskKind::Read,
            &delivery,
            run_read(log.reader.clone(), delivery.clone(), first, max),
        )?;
        Ok(delivery.request())
    }

    /// Subscribes to records starting at `start`, ending after `max` records or never if `max`
    /// is zero.
    ///
    /// A positive start is a record number, a negative one counts back from the latest record and
    /// zero only delivers records appended from now on.
    pub async fn subscribe_by_recno(&self, start: i64, max: u64) -> Result<RequestId, GdpError> {
        let log = self.open_log()?;
        self.check_readable()?;

        let rx = log.reader.watch().await?;
        let next = match start {
            0 => log.reader.nrecs().await? + 1,
            start => log.reader.resolve(start).await?.unwrap_or(1),
        };

        let delivery = self.delivery();
        log.spawn(
            TaskKind::Subscription,
            &delivery,
            run_subscription(log.reader.clone(), delivery.clone(), rx, next, max),
        )?;
        Ok(delivery.request())
    }

    /// Verifies signature and chain link of a record of this log.
    pub async fn verify(&self, datum: &Datum) -> Result<(), GdpError> {
        let log = self.open_log()?;
        log.reader.verify(datum).await
    }
}

impl<S> Gin<S> {
    fn delivery(&self) -> Delivery {
        Delivery::new(
            self.inner.id,
            self.inner.name,
            self.inner.events.request_id(),
            self.inner.events.clone(),
        )
    }

    /// Cancels all subscriptions of this handle and discards their queued events.
    pub fn unsubscribe(&self) -> Result<(), GdpError> {
        let log = self.open_log()?;
        let cancelled = log.cancel(TaskKind::Subscription, None);
        self.discard(&cancelled);
        Ok(())
    }

    /// Cancels one subscription. Returns false if the request is not a running subscription of
    /// this handle.
    pub fn unsubscribe_by_id(&self, request: RequestId) -> Result<bool, GdpError> {
        let log = self.open_log()?;
        let cancelled = log.cancel(TaskKind::Subscription, Some(request));
        self.discard(&cancelled);
        Ok(!cancelled.is_empty())
    }

    fn discard(&self, requests: &[RequestId]) {
        if requests.is_empty() {
            return;
        }
        let discarded = self
            .inner
            .events
            .discard(|event| requests.contains(&event.request));
        debug!(name = %self.inner.name, cancelled = requests.len(), discarded, "unsubscribe");
    }

    /// Verifies the signature of a record against a given key.
    pub fn verify_with_key(&self, datum: &Datum, key: &PublicKey) -> Result<(), GdpError> {
        self.open_log()?;
        datum.verify(&self.inner.name, key)?;
        Ok(())
    }

    /// Waits for the next event of this log. A zero timeout waits forever.
    pub async fn next_event(&self, timeout: Duration) -> Result<Event, GdpError> {
        self.open_log()?;
        self.inner.events.next(Some(self.inner.id), timeout).await
    }
}

impl<S> Clone for Gin<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            owned: false,
        }
    }
}

impl<S> Drop for Gin<S> {
    fn drop(&mut self) {
        if self.owned {
            self.close();
        }
    }
}

impl<S> fmt::Debug for Gin<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gin")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("mode", &self.inner.mode)
            .field("owned", &self.owned)
            .finish()
    }
}
