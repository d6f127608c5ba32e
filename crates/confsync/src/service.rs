//! The sync service: drivers → validation → reconciliation → broadcast.
//!
//! Every driver runs as its own task and pushes into one unbounded queue.
//! A single consumer loop drains that queue and processes one file event
//! completely (validate, diff, commit, publish) before looking at the next,
//! so state is never touched by two events at once.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;

use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, mpsc, watch};

use crate::broadcast::{ActionBroadcaster, Notice, NoticeBroadcaster};
use crate::error::{Result, SyncError};
use crate::reconcile::{Action, ConfigSet, Reconciler, Reconciliation};
use crate::source::{ChangeKind, ConfigFileChange, SourceDriver, SourceEvent, SourceSink};
use crate::validation::ValidationPipeline;

/// Default capacity of the action and notice channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Item types the service can carry.
pub trait ConfigItem: DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {}

impl<T> ConfigItem for T where T: DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {}

/// Processes file events one at a time against the shared state.
struct Engine<T> {
    pipeline: Arc<ValidationPipeline<T>>,
    state: Arc<RwLock<Reconciler<T>>>,
    actions: ActionBroadcaster<T>,
    notices: NoticeBroadcaster,
    qualify_filenames: bool,
}

impl<T: ConfigItem> Engine<T> {
    fn handle(&self, event: SourceEvent) {
        match event {
            SourceEvent::Change { source, change } => {
                self.apply(&source, change);
            }
            SourceEvent::Failed { source, error } => {
                log::error!("Source {} failed permanently: {}", source, error);
                self.notices.source_failed(&source, &error.to_string());
            }
        }
    }

    fn filename(&self, source: &str, filename: &str) -> String {
        if self.qualify_filenames {
            format!("{}:{}", source, filename)
        } else {
            filename.to_string()
        }
    }

    fn apply(&self, source: &str, change: ConfigFileChange) -> Option<Reconciliation<T>> {
        let filename = self.filename(source, &change.filename);
        let _span =
            tracing::info_span!("reconcile.file", filename = %filename, kind = ?change.kind)
                .entered();

        let items = match (change.kind, change.content) {
            (ChangeKind::Remove, _) | (_, None) => None,
            (_, Some(content)) => match self.pipeline.validate(&filename, &content) {
                Ok(file) => Some(file.items),
                Err(e) => {
                    log::warn!("Rejected {}, keeping previous items: {}", filename, e);
                    self.notices.validation_failed(&filename, e.details());
                    return None;
                }
            },
        };

        let outcome = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            match items {
                Some(items) => state.apply_file(&filename, items),
                None => state.remove_file(&filename),
            }
        };

        for reassignment in &outcome.reassignments {
            log::warn!(
                "'{}' moved from {} to {}",
                reassignment.id,
                reassignment.previous_filename,
                reassignment.filename
            );
            self.notices.identity_reassigned(reassignment.clone());
        }
        for action in &outcome.actions {
            log::debug!("{} {} ({})", action.kind(), action.id(), filename);
        }
        if !outcome.is_empty() {
            log::info!("{}: {} actions", filename, outcome.actions.len());
        }

        self.actions.send_all(outcome.actions.iter().cloned());
        Some(outcome)
    }

    async fn run(
        self,
        mut queue: mpsc::UnboundedReceiver<SourceEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = queue.recv() => match event {
                    Some(event) => {
                        if *shutdown.borrow() {
                            break;
                        }
                        self.handle(event);
                    }
                    None => {
                        log::warn!("All sources have stopped; serving the last known state");
                        let _ = shutdown.wait_for(|stopped| *stopped).await;
                        break;
                    }
                }
            }
        }

        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        log::info!("Sync loop stopped");
    }
}

/// Keeps a set of validated items in sync with one or more sources.
pub struct ConfigSync<T> {
    pipeline: Arc<ValidationPipeline<T>>,
    drivers: Mutex<Vec<Box<dyn SourceDriver>>>,
    state: Arc<RwLock<Reconciler<T>>>,
    actions: ActionBroadcaster<T>,
    notices: NoticeBroadcaster,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: ConfigItem> ConfigSync<T> {
    /// Creates a stopped service over the given drivers.
    ///
    /// With more than one driver, filenames are qualified as
    /// `<driver name>:<filename>` so that sources cannot shadow each other.
    pub fn new(pipeline: ValidationPipeline<T>, drivers: Vec<Box<dyn SourceDriver>>) -> Self {
        Self::with_capacity(pipeline, drivers, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(
        pipeline: ValidationPipeline<T>,
        drivers: Vec<Box<dyn SourceDriver>>,
        capacity: usize,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pipeline: Arc::new(pipeline),
            drivers: Mutex::new(drivers),
            state: Arc::new(RwLock::new(Reconciler::new())),
            actions: ActionBroadcaster::new(capacity),
            notices: NoticeBroadcaster::new(capacity),
            shutdown,
            started: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Subscribes to committed actions. Only actions committed after this
    /// call are delivered; seed from [`ConfigSync::current_state`].
    pub fn subscribe(&self) -> broadcast::Receiver<Action<T>> {
        self.actions.subscribe()
    }

    /// Subscribes to validation failures, source failures and identity reassignments.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Returns a snapshot of the current state.
    pub fn current_state(&self) -> BTreeMap<String, ConfigSet<T>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Starts every driver and the consumer loop on a background thread.
    ///
    /// Calling `start` on a running service does nothing. A stopped service
    /// cannot be restarted.
    pub fn start(&self) -> Result<()> {
        self.start_with(|body| {
            std::thread::Builder::new()
                .name("confsync".to_string())
                .spawn(body)
        })
    }

    /// Starts the service on a thread obtained from `spawn`.
    ///
    /// The drivers only leave `self` once the thread exists, so a failed
    /// spawn leaves the service stopped but startable.
    fn start_with<S>(&self, spawn: S) -> Result<()>
    where
        S: FnOnce(Box<dyn FnOnce() + Send + 'static>) -> std::io::Result<JoinHandle<()>>,
    {
        if *self.shutdown.borrow() {
            return Err(SyncError::AlreadyStopped);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                self.started.store(false, Ordering::Release);
                SyncError::Runtime(e.to_string())
            })?;

        let drivers = std::mem::take(&mut *self.drivers.lock().unwrap_or_else(PoisonError::into_inner));
        let engine = Engine {
            pipeline: Arc::clone(&self.pipeline),
            state: Arc::clone(&self.state),
            actions: self.actions.clone(),
            notices: self.notices.clone(),
            qualify_filenames: drivers.len() > 1,
        };
        let shutdown = self.shutdown.subscribe();
        let (handoff_tx, handoff_rx) = std::sync::mpsc::channel::<Vec<Box<dyn SourceDriver>>>();

        let body: Box<dyn FnOnce() + Send + 'static> = Box::new(move || {
            let Ok(drivers) = handoff_rx.recv() else {
                return;
            };
            runtime.block_on(async move {
                let (queue_tx, queue_rx) = mpsc::unbounded_channel();

                for mut driver in drivers {
                    let sink = SourceSink::new(driver.name(), queue_tx.clone());
                    let driver_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = driver.run(sink.clone(), driver_shutdown).await {
                            sink.fail(e);
                        }
                    });
                }
                drop(queue_tx);

                engine.run(queue_rx, shutdown).await;
            });
        });

        let handle = match spawn(body) {
            Ok(handle) => handle,
            Err(e) => {
                *self.drivers.lock().unwrap_or_else(PoisonError::into_inner) = drivers;
                self.started.store(false, Ordering::Release);
                return Err(SyncError::Runtime(format!("Failed to spawn sync thread: {}", e)));
            }
        };

        log::info!("Starting config sync with {} sources", drivers.len());
        if handoff_tx.send(drivers).is_err() {
            log::error!("Sync thread exited before receiving its sources");
        }

        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Signals shutdown and returns immediately.
    ///
    /// An event already being processed finishes; nothing queued after the
    /// signal is applied. Calling `stop` more than once is harmless.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            log::info!("Stopping config sync");
        }
    }

    /// Blocks until the background thread has exited.
    pub fn wait(&self) -> Result<()> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| SyncError::Runtime("sync thread panicked".to_string())),
            None => Ok(()),
        }
    }

    /// Returns true between a successful `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !*self.shutdown.borrow()
    }
}

impl<T> Drop for ConfigSync<T> {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
