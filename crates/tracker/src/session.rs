//! Application root that wires the update sources to the reconciler.
//!
//! A [`Tracker`] owns the optional [`ConnectionManager`], the status
//! source used for polling, and the [`ReconcilerState`] of the active
//! job. Every inbound event (push, poll, connection status, timer tick)
//! is funneled into a single task, so reconciler mutations never
//! interleave. Observer callbacks run on that task after the state lock
//! is released.
//!
//! Each arming of a job bumps a generation number. Polled results carry
//! the generation they were issued for and are discarded once it no
//! longer matches; push events are discarded when their job is not the
//! active one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use pulse_core::job_events::{
    EVENT_ANALYSIS_COMPLETE, EVENT_ANALYSIS_ERROR, EVENT_ANALYSIS_PROGRESS, EVENT_CONNECT,
    EVENT_CONNECT_ERROR, EVENT_DISCONNECT, EVENT_RECONNECT, EVENT_RECONNECT_FAILED,
};
use pulse_core::{JobId, ProgressEvent};
use pulse_realtime::api::{StatusApi, StatusSource};
use pulse_realtime::client::WsTransport;
use pulse_realtime::events::PushEvent;
use pulse_realtime::manager::{ConnectionManager, ConnectionState, HandlerId};
use pulse_realtime::poller::{self, PollConfig, PollHandle, PolledEvent};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::completion::CompletionHandler;
use crate::config::TrackerConfig;
use crate::effect::Effect;
use crate::observer::{ConnectionStatus, ProgressObserver};
use crate::reconciler::ReconcilerState;
use crate::TrackerError;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the event task can receive besides polled results.
#[derive(Debug)]
enum Inbound {
    Push(ProgressEvent),
    Connection(ConnectionStatus),
    /// Effects produced outside the event task, rendered in order.
    Render(JobId, Vec<Effect>),
}

struct ActiveJob {
    reconciler: ReconcilerState,
    poller: Option<PollHandle>,
    generation: u64,
}

struct Inner {
    push: Option<Arc<ConnectionManager>>,
    source: Arc<dyn StatusSource>,
    observer: Arc<dyn ProgressObserver>,
    completion: CompletionHandler,
    poll_config: PollConfig,
    feed_capacity: usize,
    active: Mutex<Option<ActiveJob>>,
    generation: AtomicU64,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    poll_tx: mpsc::UnboundedSender<PolledEvent>,
}

/// Tracks one job at a time and reports to a [`ProgressObserver`].
pub struct Tracker {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    handlers: Vec<(&'static str, HandlerId)>,
}

impl Tracker {
    /// Build a tracker from configuration: a [`StatusApi`] for polling
    /// and, when `ws_url` is set, a WebSocket-backed push channel.
    pub fn from_config(config: &TrackerConfig, observer: Arc<dyn ProgressObserver>) -> Self {
        let source: Arc<dyn StatusSource> = Arc::new(StatusApi::new(config.api_url.clone()));
        let push = config.ws_url.as_ref().map(|ws_url| {
            ConnectionManager::new(
                Arc::new(WsTransport::new(ws_url.clone())),
                config.reconnect.clone(),
            )
        });
        Self::new(config, push, source, observer)
    }

    /// Build a tracker around explicit collaborators.
    ///
    /// Spawns the event task; must be called inside a Tokio runtime.
    pub fn new(
        config: &TrackerConfig,
        push: Option<Arc<ConnectionManager>>,
        source: Arc<dyn StatusSource>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();

        let handlers = match &push {
            Some(manager) => register_handlers(manager, &inbound_tx),
            None => Vec::new(),
        };

        let inner = Arc::new(Inner {
            push,
            source,
            observer,
            completion: CompletionHandler::new(config.api_url.clone()),
            poll_config: config.poll.clone(),
            feed_capacity: config.feed_capacity,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            inbound_tx,
            poll_tx,
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&inner).run(
            inbound_rx,
            poll_rx,
            config.tick_interval,
            cancel.clone(),
        ));

        Self {
            inner,
            cancel,
            task: Mutex::new(Some(task)),
            handlers,
        }
    }

    /// Begin tracking a job, replacing whatever was tracked before.
    pub async fn start_tracking(&self, job_id: &str) -> Result<JobId, TrackerError> {
        let job_id = JobId::parse(job_id)?;
        tracing::info!(job_id = %job_id, "Starting tracking");
        self.inner.arm(job_id.clone(), false).await;
        Ok(job_id)
    }

    /// Reset all state and re-arm both sources for `job_id`, which may
    /// be the same job or a newly issued one.
    pub async fn restart(&self, job_id: &str) -> Result<JobId, TrackerError> {
        let job_id = JobId::parse(job_id)?;
        self.inner.arm(job_id.clone(), true).await;
        Ok(job_id)
    }

    /// Stop tracking the active job, if any.
    pub fn stop(&self) {
        self.inner.stop_sources();
        *self.inner.active.lock() = None;
    }

    /// Progress currently displayed, if a job is active.
    pub fn progress(&self) -> Option<u8> {
        self.inner
            .active
            .lock()
            .as_ref()
            .map(|job| job.reconciler.progress())
    }

    /// The job currently tracked.
    pub fn active_job(&self) -> Option<JobId> {
        self.inner
            .active
            .lock()
            .as_ref()
            .map(|job| job.reconciler.job_id().clone())
    }

    /// Whether the poll loop for the active job is still running.
    pub fn is_polling(&self) -> bool {
        self.inner
            .active
            .lock()
            .as_ref()
            .and_then(|job| job.poller.as_ref())
            .is_some_and(|p| !p.is_finished())
    }

    /// Stop tracking, close the push channel, and end the event task.
    pub async fn shutdown(&self) {
        self.stop();
        if let Some(manager) = &self.inner.push {
            for (name, id) in &self.handlers {
                manager.off(name, *id);
            }
            manager.shutdown().await;
        }
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await;
        }
        tracing::info!("Tracker shut down");
    }
}

impl Inner {
    async fn arm(&self, job_id: JobId, restart: bool) {
        let now = Utc::now();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (effects, previous_job) = {
            let mut active = self.active.lock();
            let previous = active.take();
            let previous_job = previous.as_ref().map(|p| p.reconciler.job_id().clone());

            let (reconciler, effects) = match previous {
                Some(mut prev) => {
                    if let Some(poller) = prev.poller.take() {
                        poller.stop();
                    }
                    if restart {
                        let effects = prev.reconciler.restart(job_id.clone(), now);
                        (prev.reconciler, effects)
                    } else {
                        (self.fresh(job_id.clone(), now), Vec::new())
                    }
                }
                None => (self.fresh(job_id.clone(), now), Vec::new()),
            };

            *active = Some(ActiveJob {
                reconciler,
                poller: None,
                generation,
            });
            (effects, previous_job)
        };

        // Queued ahead of any result from the new poller.
        if !effects.is_empty() {
            let _ = self.inbound_tx.send(Inbound::Render(job_id.clone(), effects));
        }

        let poller = poller::start(
            job_id.clone(),
            generation,
            Arc::clone(&self.source),
            self.poll_config.clone(),
            self.poll_tx.clone(),
        );
        {
            let mut active = self.active.lock();
            match active.as_mut() {
                Some(job) if job.generation == generation && !job.reconciler.is_terminal() => {
                    job.poller = Some(poller);
                }
                _ => poller.stop(),
            }
        }

        if let Some(manager) = &self.push {
            if let Some(previous) = previous_job.filter(|p| *p != job_id) {
                manager.leave_room(&previous);
            }
            manager.join_room(&job_id);
            if matches!(
                manager.state(),
                ConnectionState::Disconnected | ConnectionState::Failed
            ) {
                let connected = manager.initialize().await;
                tracing::info!(job_id = %job_id, connected, "Push channel initialized");
            }
        }

        tracing::debug!(job_id = %job_id, generation, restart, "Job armed");
    }

    fn fresh(&self, job_id: JobId, now: chrono::DateTime<Utc>) -> ReconcilerState {
        ReconcilerState::with_feed_capacity(job_id, now, self.feed_capacity)
    }

    /// Stop polling and leave the active job's room.
    fn stop_sources(&self) {
        let job_id = {
            let mut active = self.active.lock();
            let Some(job) = active.as_mut() else {
                return;
            };
            if let Some(poller) = job.poller.take() {
                poller.stop();
            }
            job.reconciler.job_id().clone()
        };
        if let Some(manager) = &self.push {
            manager.leave_room(&job_id);
        }
        tracing::debug!(job_id = %job_id, "Update sources stopped");
    }

    /// Event task: the only place reconciler state is mutated by
    /// inbound events.
    async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
        mut polled: mpsc::UnboundedReceiver<PolledEvent>,
        tick_interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(msg) = inbound.recv() => match msg {
                    Inbound::Push(event) => self.handle_event(event, None),
                    Inbound::Connection(status) => self.observer.on_connection(&status),
                    Inbound::Render(job_id, effects) => self.dispatch(&job_id, effects),
                },
                Some(PolledEvent { tag, event }) = polled.recv() => {
                    self.handle_event(event, Some(tag));
                }
                _ = ticker.tick() => self.handle_tick(),
            }
        }
        tracing::debug!("Tracker event task exited");
    }

    fn handle_event(&self, event: ProgressEvent, tag: Option<u64>) {
        let (job_id, effects) = {
            let mut active = self.active.lock();
            let Some(job) = active.as_mut() else {
                tracing::debug!(job_id = %event.job_id, "No active job, dropping event");
                return;
            };
            if tag.is_some_and(|t| t != job.generation) {
                tracing::debug!(job_id = %event.job_id, ?tag, "Dropping result from superseded poll");
                return;
            }
            let effects = job.reconciler.apply_event(&event, Utc::now());
            (job.reconciler.job_id().clone(), effects)
        };
        self.dispatch(&job_id, effects);
    }

    fn handle_tick(&self) {
        let timing = {
            let active = self.active.lock();
            active.as_ref().and_then(|job| job.reconciler.tick(Utc::now()))
        };
        if let Some(Effect::Timing(timing)) = timing {
            self.observer.on_timing(&timing);
        }
    }

    /// Render effects in order.
    fn dispatch(&self, job_id: &JobId, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StopSources => self.stop_sources(),
                Effect::Progress {
                    percentage,
                    message,
                    stage_key,
                } => self.observer.on_progress(percentage, &message, stage_key),
                Effect::StageChanged {
                    previous,
                    current,
                    step,
                } => self.observer.on_stage(previous, current, step),
                Effect::FeedAppended(entry) => self.observer.on_feed(&entry),
                Effect::Timing(timing) => self.observer.on_timing(&timing),
                Effect::Completed(completion) => {
                    let summary = self.completion.summarize(completion);
                    self.observer.on_complete(&summary);
                }
                Effect::Failed { message } => {
                    let notice = self.completion.failure(job_id.clone(), message);
                    self.observer.on_error(&notice);
                }
            }
        }
    }
}

/// Forward push events into the tracker's event channel.
fn register_handlers(
    manager: &ConnectionManager,
    tx: &mpsc::UnboundedSender<Inbound>,
) -> Vec<(&'static str, HandlerId)> {
    let mut ids = Vec::new();

    for name in [
        EVENT_ANALYSIS_PROGRESS,
        EVENT_ANALYSIS_COMPLETE,
        EVENT_ANALYSIS_ERROR,
    ] {
        let tx = tx.clone();
        let id = manager.on(name, move |event| {
            if let PushEvent::Job(job) = event {
                tx.send(Inbound::Push(job.clone()))
                    .map_err(|_| "tracker stopped")?;
            }
            Ok(())
        });
        ids.push((name, id));
    }

    for name in [
        EVENT_CONNECT,
        EVENT_DISCONNECT,
        EVENT_CONNECT_ERROR,
        EVENT_RECONNECT,
        EVENT_RECONNECT_FAILED,
    ] {
        let tx = tx.clone();
        let id = manager.on(name, move |event| {
            let status = match event {
                PushEvent::Connect => ConnectionStatus::Connected,
                PushEvent::Disconnect => ConnectionStatus::Disconnected,
                PushEvent::ConnectError { error } => ConnectionStatus::Error {
                    message: error.clone(),
                },
                PushEvent::Reconnect { attempts } => ConnectionStatus::Reconnected {
                    attempts: *attempts,
                },
                PushEvent::ReconnectFailed { .. } => ConnectionStatus::ReconnectFailed,
                _ => return Ok(()),
            };
            tx.send(Inbound::Connection(status))
                .map_err(|_| "tracker stopped")?;
            Ok(())
        });
        ids.push((name, id));
    }

    ids
}
