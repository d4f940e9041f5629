//! Bounded-concurrency thumbnail rendering
//!
//! Thumbnail requests share one scarce rendering context. The queue runs at
//! most one job at a time, strictly FIFO, on a dedicated context thread that
//! owns the context, and caches every outcome (failures included) by key.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::render::{render_thumbnail, RenderContext};
use crate::utils::{catch_panic_mut, PassSource, ThumbnailConfig};

/// Builds the shared rendering context; called on the context thread
pub type ContextFactory = Box<dyn FnMut() -> Result<Box<dyn RenderContext>, String> + Send>;

/// Receives a thumbnail data URL, or `None` if rendering failed
pub type ThumbnailCallback = Box<dyn FnOnce(Option<String>) + Send>;

struct PendingJob {
    key: String,
    passes: Vec<PassSource>,
    callbacks: Vec<ThumbnailCallback>,
}

struct ContextJob {
    passes: Vec<PassSource>,
    reply: Sender<Option<String>>,
}

struct ContextHandle {
    jobs: Sender<ContextJob>,
    /// Disconnects when the context thread exits
    done: Receiver<()>,
    thread: JoinHandle<()>,
}

/// How a job handed to the context thread ended
enum ContextOutcome {
    Finished(Option<String>),
    /// The watchdog fired while the job was rendering
    TimedOut,
    /// The job never reached a context
    Unreachable,
}

type SharedFactory = Arc<Mutex<ContextFactory>>;

struct QueueState {
    cache: HashMap<String, Option<String>>,
    pending: VecDeque<PendingJob>,
    /// Key and callbacks of the job currently on the context thread
    in_flight: Option<(String, Vec<ThumbnailCallback>)>,
    draining: bool,
    disposed: bool,
    factory: Option<SharedFactory>,
    context: Option<ContextHandle>,
}

/// Serializes thumbnail renders onto one shared context
pub struct ThumbnailQueue {
    state: Arc<Mutex<QueueState>>,
    config: ThumbnailConfig,
}

impl ThumbnailQueue {
    /// Create a queue; the context is built by `factory` on first use
    pub fn new<F>(config: ThumbnailConfig, factory: F) -> Self
    where
        F: FnMut() -> Result<Box<dyn RenderContext>, String> + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                cache: HashMap::new(),
                pending: VecDeque::new(),
                in_flight: None,
                draining: false,
                disposed: false,
                factory: Some(Arc::new(Mutex::new(Box::new(factory)))),
                context: None,
            })),
            config,
        }
    }

    /// Request a thumbnail for `key`
    ///
    /// A cached result (including a cached failure) is delivered before this
    /// returns. Otherwise the job is queued and `on_result` runs on the
    /// queue's drain thread once the job resolves.
    pub fn request<F>(&self, key: impl Into<String>, passes: Vec<PassSource>, on_result: F)
    where
        F: FnOnce(Option<String>) + Send + 'static,
    {
        let key = key.into();
        let callback: ThumbnailCallback = Box::new(on_result);
        let hit = {
            let mut state = lock(&self.state);
            if state.disposed {
                log::warn!("[ThumbnailQueue] Ignoring request for '{}' after dispose", key);
                return;
            }

            match state.cache.get(&key).cloned() {
                Some(cached) => Some((cached, callback)),
                None => {
                    self.enqueue(&mut state, key, passes, callback);
                    None
                }
            }
        };

        match hit {
            Some((cached, callback)) => callback(cached),
            None => self.start_drain(),
        }
    }

    fn enqueue(
        &self,
        state: &mut QueueState,
        key: String,
        passes: Vec<PassSource>,
        callback: ThumbnailCallback,
    ) {
        if self.config.coalesce_duplicates {
            if let Some((in_flight_key, callbacks)) = state.in_flight.as_mut() {
                if *in_flight_key == key {
                    log::debug!("[ThumbnailQueue] '{}' joins the in-flight job", key);
                    callbacks.push(callback);
                    return;
                }
            }
            if let Some(job) = state.pending.iter_mut().find(|job| job.key == key) {
                log::debug!("[ThumbnailQueue] '{}' joins its pending job", key);
                job.callbacks.push(callback);
                return;
            }
        }

        log::debug!(
            "[ThumbnailQueue] Queued '{}' ({} pending)",
            key,
            state.pending.len() + 1
        );
        state.pending.push_back(PendingJob {
            key,
            passes,
            callbacks: vec![callback],
        });
    }

    fn start_drain(&self) {
        {
            let mut state = lock(&self.state);
            if state.draining || state.pending.is_empty() {
                return;
            }
            state.draining = true;
        }

        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        let spawned = thread::Builder::new()
            .name("thumbnail-drain".to_string())
            .spawn(move || drain(state, config));

        if let Err(e) = spawned {
            log::error!("[ThumbnailQueue] Failed to start drain thread: {}", e);
            lock(&self.state).draining = false;
        }
    }

    /// Cached outcome for `key`: `None` if never attempted, `Some(None)` if
    /// rendering failed
    pub fn cached(&self, key: &str) -> Option<Option<String>> {
        lock(&self.state).cache.get(key).cloned()
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.state).disposed
    }

    /// Tear the queue down
    ///
    /// Pending requests are dropped without their callbacks, the cache is
    /// cleared and the context is released once any in-flight job finishes.
    /// With a render timeout configured, a context still busy after that
    /// timeout is detached instead of waited for. The queue cannot be
    /// restarted.
    pub fn dispose(&self) {
        let context = {
            let mut state = lock(&self.state);
            if state.disposed {
                return;
            }
            state.disposed = true;
            let dropped = state.pending.len();
            state.pending.clear();
            state.in_flight = None;
            state.cache.clear();
            state.factory = None;
            log::info!("[ThumbnailQueue] Disposed ({} pending request(s) dropped)", dropped);
            state.context.take()
        };

        let Some(ContextHandle { jobs, done, thread }) = context else {
            return;
        };
        drop(jobs);

        if let Some(timeout) = self.config.render_timeout() {
            if let Err(RecvTimeoutError::Timeout) = done.recv_timeout(timeout) {
                log::warn!(
                    "[ThumbnailQueue] Render context still busy after {:?}, abandoning it",
                    timeout
                );
                return;
            }
        }
        if thread.join().is_err() {
            log::error!("[ThumbnailQueue] Context thread panicked during shutdown");
        }
    }
}

impl Drop for ThumbnailQueue {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pop jobs one at a time until the queue is empty or disposed
fn drain(state: Arc<Mutex<QueueState>>, config: ThumbnailConfig) {
    log::debug!("[ThumbnailQueue] Drain started");

    loop {
        let (key, passes, jobs) = {
            let mut guard = lock(&state);
            if guard.disposed {
                guard.draining = false;
                return;
            }
            let Some(job) = guard.pending.pop_front() else {
                guard.draining = false;
                log::debug!("[ThumbnailQueue] Drain finished");
                return;
            };
            let jobs = context_sender(&mut guard, &config);
            guard.in_flight = Some((job.key.clone(), job.callbacks));
            (job.key, job.passes, jobs)
        };

        let outcome = run_on_context(jobs, passes, &config, &key);

        let (result, callbacks) = {
            let mut guard = lock(&state);
            if guard.disposed {
                guard.draining = false;
                return;
            }
            let result = match outcome {
                ContextOutcome::Finished(result) => {
                    guard.cache.insert(key.clone(), result.clone());
                    result
                }
                ContextOutcome::TimedOut => {
                    // A hung shader counts as a failed render
                    guard.cache.insert(key.clone(), None);
                    if guard.context.take().is_some() {
                        log::warn!("[ThumbnailQueue] Abandoning stuck render context after '{}'", key);
                    }
                    None
                }
                ContextOutcome::Unreachable => {
                    guard.context = None;
                    None
                }
            };
            let callbacks = guard
                .in_flight
                .take()
                .map(|(_, callbacks)| callbacks)
                .unwrap_or_default();
            (result, callbacks)
        };

        log::info!(
            "[ThumbnailQueue] '{}' resolved ({})",
            key,
            if result.is_some() { "ok" } else { "failed" }
        );
        for callback in callbacks {
            let value = result.clone();
            if let Err(msg) = catch_panic_mut(move || callback(value)) {
                log::error!("[ThumbnailQueue] Callback for '{}' panicked: {}", key, msg);
            }
        }

        thread::sleep(config.drain_delay());
    }
}

/// Sender to the context thread, starting the thread on first use
fn context_sender(state: &mut QueueState, config: &ThumbnailConfig) -> Option<Sender<ContextJob>> {
    if let Some(handle) = &state.context {
        return Some(handle.jobs.clone());
    }

    let factory = Arc::clone(state.factory.as_ref()?);
    let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<ContextJob>();
    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
    let config = config.clone();
    let spawned = thread::Builder::new()
        .name("thumbnail-context".to_string())
        .spawn(move || {
            let _done = done_tx;
            run_context(factory, jobs_rx, config)
        });

    match spawned {
        Ok(thread) => {
            state.context = Some(ContextHandle {
                jobs: jobs_tx.clone(),
                done: done_rx,
                thread,
            });
            Some(jobs_tx)
        }
        Err(e) => {
            log::error!("[ThumbnailQueue] Failed to start context thread: {}", e);
            None
        }
    }
}

/// Hand one job to the context thread and wait for it (bounded by the watchdog)
fn run_on_context(
    jobs: Option<Sender<ContextJob>>,
    passes: Vec<PassSource>,
    config: &ThumbnailConfig,
    key: &str,
) -> ContextOutcome {
    let Some(jobs) = jobs else {
        return ContextOutcome::Unreachable;
    };
    let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
    if jobs.send(ContextJob { passes, reply: reply_tx }).is_err() {
        log::error!("[ThumbnailQueue] Context thread is gone, '{}' failed", key);
        return ContextOutcome::Unreachable;
    }
    // Only the queue's own handle may keep the context thread alive
    drop(jobs);

    match config.render_timeout() {
        Some(timeout) => match reply_rx.recv_timeout(timeout) {
            Ok(result) => ContextOutcome::Finished(result),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "[ThumbnailQueue] '{}' did not finish within {:?}, giving up",
                    key,
                    timeout
                );
                ContextOutcome::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => ContextOutcome::Unreachable,
        },
        None => match reply_rx.recv() {
            Ok(result) => ContextOutcome::Finished(result),
            Err(_) => ContextOutcome::Unreachable,
        },
    }
}

/// Context thread body: owns the rendering context for the queue's lifetime
fn run_context(factory: SharedFactory, jobs: Receiver<ContextJob>, config: ThumbnailConfig) {
    let mut context: Option<Box<dyn RenderContext>> = None;

    for job in jobs.iter() {
        let result = run_job(&factory, &mut context, &job.passes, &config);
        // The watchdog may have stopped waiting
        let _ = job.reply.send(result);
    }

    log::info!("[ThumbnailQueue] Render context released");
}

fn run_job(
    factory: &Mutex<ContextFactory>,
    context: &mut Option<Box<dyn RenderContext>>,
    passes: &[PassSource],
    config: &ThumbnailConfig,
) -> Option<String> {
    if context.is_none() {
        let built = {
            let mut factory = factory.lock().unwrap_or_else(PoisonError::into_inner);
            catch_panic_mut(|| (*factory)())
        };
        match built {
            Ok(Ok(built)) => {
                log::info!("[ThumbnailQueue] Render context created");
                *context = Some(built);
            }
            Ok(Err(e)) => {
                log::error!("[ThumbnailQueue] Failed to create render context: {}", e);
                return None;
            }
            Err(_) => return None,
        }
    }

    let ctx = context.as_mut()?;
    match catch_panic_mut(|| render_thumbnail(&mut **ctx, passes, config)) {
        Ok(Ok(url)) => Some(url),
        Ok(Err(e)) => {
            log::warn!("[ThumbnailQueue] Thumbnail job failed: {}", e);
            None
        }
        Err(_) => {
            // State after a panic is unknown; the next job builds a fresh context
            *context = None;
            None
        }
    }
}
