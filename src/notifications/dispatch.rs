//! Off-path execution of dispatch units.
//!
//! Each matched subscription becomes one [`DispatchUnit`]: a boxed closure that
//! materializes the subscription's value and hands it to the observer. Units
//! are queued on a crossbeam channel and run by a small pool of worker
//! threads. A unit that errors or panics is logged and counted; it never
//! affects the submitter or any other unit.

use crate::error::{NotifyError, Result};
use crate::types::{NotificationStats, SubscriptionId};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// What a unit did when it ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// A value reached the observer.
    Delivered,
    /// Nothing to deliver to (no observer yet, or unsubscribed meanwhile).
    Skipped,
}

/// One materialize-and-deliver job for one subscription.
pub struct DispatchUnit {
    subscription: SubscriptionId,
    job: Box<dyn FnOnce() -> Result<Delivery> + Send>,
}

impl DispatchUnit {
    /// Wrap `job` as the unit for `subscription`.
    pub fn new<F>(subscription: SubscriptionId, job: F) -> Self
    where
        F: FnOnce() -> Result<Delivery> + Send + 'static,
    {
        Self {
            subscription,
            job: Box::new(job),
        }
    }

    /// Subscription this unit delivers to.
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Run the job on the current thread.
    pub(crate) fn run(self) -> Result<Delivery> {
        (self.job)()
    }
}

/// Shared activity counters.
#[derive(Default)]
pub(crate) struct StatsCounters {
    pub passes: AtomicU64,
    pub dispatched: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
}

impl StatsCounters {
    pub fn snapshot(&self) -> NotificationStats {
        NotificationStats {
            passes: self.passes.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Number of units queued or running, with a condvar for waiters.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn end(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Worker pool running dispatch units.
pub(crate) struct Dispatcher {
    sender: Option<Sender<DispatchUnit>>,
    workers: Vec<JoinHandle<()>>,
    in_flight: Arc<InFlight>,
    stats: Arc<StatsCounters>,
}

impl Dispatcher {
    /// Spawn `worker_threads` workers (at least one).
    pub(crate) fn new(
        worker_threads: usize,
        thread_name: &str,
        stats: Arc<StatsCounters>,
    ) -> Result<Self> {
        let (sender, receiver) = unbounded::<DispatchUnit>();
        let in_flight = Arc::new(InFlight::default());

        let mut workers = Vec::with_capacity(worker_threads.max(1));
        for index in 0..worker_threads.max(1) {
            let receiver = receiver.clone();
            let in_flight = Arc::clone(&in_flight);
            let stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", thread_name, index))
                .spawn(move || worker_loop(receiver, in_flight, stats))
                .map_err(|e| {
                    error!(error = %e, "failed to spawn dispatch worker");
                    NotifyError::DispatcherClosed
                })?;
            workers.push(handle);
        }

        debug!(workers = workers.len(), "dispatcher started");

        Ok(Self {
            sender: Some(sender),
            workers,
            in_flight,
            stats,
        })
    }

    /// Queue a unit. Returns as soon as it is queued.
    pub fn submit(&self, unit: DispatchUnit) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(NotifyError::DispatcherClosed)?;
        self.in_flight.begin();
        if sender.send(unit).is_err() {
            self.in_flight.end();
            return Err(NotifyError::DispatcherClosed);
        }
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Units queued or running right now.
    pub fn pending(&self) -> usize {
        *self.in_flight.count.lock()
    }

    /// Block until no unit is queued or running, or until `timeout` elapses.
    ///
    /// Returns true if the dispatcher went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            if self.in_flight.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the channel lets workers drain the queue and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("dispatch worker exited abnormally");
            }
        }
    }
}

fn worker_loop(
    receiver: Receiver<DispatchUnit>,
    in_flight: Arc<InFlight>,
    stats: Arc<StatsCounters>,
) {
    for unit in receiver.iter() {
        run_unit(unit, &stats);
        in_flight.end();
    }
}

fn run_unit(unit: DispatchUnit, stats: &StatsCounters) {
    let subscription = unit.subscription();
    match panic::catch_unwind(AssertUnwindSafe(|| unit.run())) {
        Ok(Ok(Delivery::Delivered)) => {
            stats.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Ok(Delivery::Skipped)) => {
            debug!(%subscription, "dispatch skipped");
        }
        Ok(Err(e)) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(%subscription, error = %e, "materialization failed");
        }
        Err(payload) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                %subscription,
                panic = panic_message(payload.as_ref()),
                "observer panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
