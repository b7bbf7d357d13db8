pub mod debounce;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::PipelineError;
use crate::events::Envelope;
use debounce::DebounceGate;

/// Bounded re-delivery policy for Transient handler failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Optional per-subscription coalescing of repeated events for the same key.
#[derive(Clone, Copy)]
pub struct DebounceSpec {
    pub window: Duration,
    /// Events matching the predicate skip the gate entirely.
    pub bypass: Option<fn(&Envelope) -> bool>,
}

/// A subscription declared as data: topic, consumer group, worker count,
/// retry policy, and optional debounce.
#[derive(Clone)]
pub struct SubscriptionSpec {
    pub topic: &'static str,
    pub group: &'static str,
    pub workers: usize,
    pub retry: RetryPolicy,
    pub debounce: Option<DebounceSpec>,
}

impl SubscriptionSpec {
    pub fn new(topic: &'static str, group: &'static str) -> Self {
        Self {
            topic,
            group,
            workers: 4,
            retry: RetryPolicy::default(),
            debounce: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn debounce(mut self, spec: DebounceSpec) -> Self {
        self.debounce = Some(spec);
        self
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Envelope) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Starting,
    Running,
    Draining,
    Closed,
}

/// An envelope parked after exhausting its retry budget.
#[derive(Debug)]
pub struct DeadLetter {
    pub group: String,
    pub envelope: Envelope,
    pub attempts: u32,
    pub error: String,
}

struct Subscription {
    topic: &'static str,
    group: &'static str,
    state: SubscriptionState,
    /// One sender per worker; the entity key hashes to a worker index so a
    /// given entity's events are handled in publish order.
    senders: Vec<mpsc::UnboundedSender<Envelope>>,
}

struct BusInner {
    subscriptions: Mutex<Vec<Subscription>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    /// Deliveries queued or mid-handler. Zero means quiescent: any cascade
    /// publish happens while its parent delivery is still counted.
    in_flight: AtomicUsize,
}

/// In-process topic bus: at-least-once delivery per consumer group, fan-out
/// across groups, per-entity ordering within a group. Handlers depend only
/// on the delivery contract (envelope shape, retry-then-dead-letter, group
/// fan-out), never on this transport.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscriptions: Mutex::new(Vec::new()),
                dead_letters: Mutex::new(Vec::new()),
                worker_handles: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Publish to every running consumer group subscribed to the payload's
    /// topic. Returns the envelope for caller-side logging.
    pub fn publish(&self, payload: crate::events::EventPayload) -> Envelope {
        let envelope = Envelope::new(payload);
        self.publish_envelope(&envelope);
        envelope
    }

    fn publish_envelope(&self, envelope: &Envelope) {
        let subs = self.inner.subscriptions.lock().unwrap();
        for sub in subs.iter() {
            if sub.topic != envelope.topic() {
                continue;
            }
            if !matches!(
                sub.state,
                SubscriptionState::Starting | SubscriptionState::Running
            ) {
                continue;
            }
            let idx = worker_index(envelope.entity_key(), sub.senders.len());
            // A closed worker channel during shutdown is not an error path.
            if sub.senders[idx].send(envelope.clone()).is_ok() {
                self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Register a consumer group and spawn its worker pool.
    pub fn subscribe(&self, spec: SubscriptionSpec, handler: Arc<dyn EventHandler>) {
        let gate = spec
            .debounce
            .as_ref()
            .map(|d| Arc::new(DebounceGate::new(d.window)));
        let bypass = spec.debounce.as_ref().and_then(|d| d.bypass);

        let mut senders = Vec::with_capacity(spec.workers);
        let mut handles = Vec::with_capacity(spec.workers);

        for worker in 0..spec.workers {
            let (tx, rx) = mpsc::unbounded_channel::<Envelope>();
            senders.push(tx);

            let handler = handler.clone();
            let gate = gate.clone();
            let bus = self.clone();
            let group = spec.group;
            let retry = spec.retry;

            handles.push(tokio::spawn(async move {
                worker_loop(rx, handler, gate, bypass, retry, group, worker, bus).await;
            }));
        }

        self.inner.subscriptions.lock().unwrap().push(Subscription {
            topic: spec.topic,
            group: spec.group,
            state: SubscriptionState::Running,
            senders,
        });
        self.inner.worker_handles.lock().unwrap().extend(handles);

        info!(
            topic = spec.topic,
            group = spec.group,
            workers = spec.workers,
            "subscription running"
        );
    }

    /// Drain in-flight handlers and close every subscription. Workers that
    /// outlive the timeout are aborted so a stuck handler cannot hold the
    /// process open. Returns true on a clean drain.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        {
            let mut subs = self.inner.subscriptions.lock().unwrap();
            for sub in subs.iter_mut() {
                sub.state = SubscriptionState::Draining;
                // Dropping the senders lets each worker finish its queue and exit.
                sub.senders.clear();
            }
        }

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.inner.worker_handles.lock().unwrap());

        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        let clean = tokio::time::timeout(timeout, drain).await.is_ok();
        if !clean {
            warn!("bus drain timed out; in-flight handlers force-closed");
        }

        let mut subs = self.inner.subscriptions.lock().unwrap();
        for sub in subs.iter_mut() {
            sub.state = SubscriptionState::Closed;
        }
        clean
    }

    /// Take every parked envelope off the dead-letter channel.
    pub fn drain_dead_letters(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut *self.inner.dead_letters.lock().unwrap())
    }

    pub fn dead_letter_count(&self) -> usize {
        self.inner.dead_letters.lock().unwrap().len()
    }

    /// Wait until no delivery is queued or mid-handler, or the timeout
    /// passes. Cascades are covered: a handler's own publishes are counted
    /// before its delivery is.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn subscription_states(&self) -> Vec<(String, SubscriptionState)> {
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|s| (format!("{}/{}", s.topic, s.group), s.state))
            .collect()
    }

    fn park(&self, letter: DeadLetter) {
        warn!(
            group = %letter.group,
            event = letter.envelope.topic(),
            entity = letter.envelope.entity_key(),
            attempts = letter.attempts,
            error = %letter.error,
            "delivery parked to dead-letter channel"
        );
        self.inner.dead_letters.lock().unwrap().push(letter);
    }
}

fn worker_index(key: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % workers.max(1)
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    handler: Arc<dyn EventHandler>,
    gate: Option<Arc<DebounceGate>>,
    bypass: Option<fn(&Envelope) -> bool>,
    retry: RetryPolicy,
    group: &'static str,
    worker: usize,
    bus: Bus,
) {
    while let Some(envelope) = rx.recv().await {
        let admit = match &gate {
            Some(gate) => {
                let bypassed = bypass.is_some_and(|f| f(&envelope));
                if bypassed {
                    gate.record(envelope.entity_key());
                    true
                } else {
                    gate.admit(envelope.entity_key())
                }
            }
            None => true,
        };

        if admit {
            deliver(&envelope, handler.as_ref(), retry, group, &bus).await;
        } else {
            debug!(
                group,
                worker,
                event = envelope.topic(),
                entity = envelope.entity_key(),
                "debounced"
            );
        }

        bus.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Invoke the handler with bounded retries on Transient errors; exhausted
/// retries park the envelope, non-retryable errors are logged and dropped.
async fn deliver(
    envelope: &Envelope,
    handler: &dyn EventHandler,
    retry: RetryPolicy,
    group: &'static str,
    bus: &Bus,
) {
    let mut attempt = 1u32;
    loop {
        let start = Instant::now();
        match handler.handle(envelope).await {
            Ok(()) => {
                info!(
                    service = group,
                    event = envelope.topic(),
                    entity = envelope.entity_key(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    outcome = "ok",
                    "handled"
                );
                return;
            }
            Err(err) if err.retryable() && attempt < retry.max_attempts => {
                warn!(
                    service = group,
                    event = envelope.topic(),
                    entity = envelope.entity_key(),
                    attempt,
                    error = %err,
                    outcome = "retry",
                    "transient failure, re-delivering"
                );
                tokio::time::sleep(retry.backoff * attempt).await;
                attempt += 1;
            }
            Err(err) if err.retryable() => {
                bus.park(DeadLetter {
                    group: group.to_string(),
                    envelope: envelope.clone(),
                    attempts: attempt,
                    error: err.to_string(),
                });
                return;
            }
            Err(err) => {
                warn!(
                    service = group,
                    event = envelope.topic(),
                    entity = envelope.entity_key(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    outcome = err.kind(),
                    error = %err,
                    "handler failed without retry"
                );
                return;
            }
        }
    }
}
