//! Executors run dispatched operations against the daemon connection.
//!
//! [`AsyncActionExecutor`] is the contract the facade consumes.
//! [`TokioActionExecutor`] is the stock implementation: one shared wire
//! connection, operations run on the tokio blocking pool.

use crate::action::Dispatch;
use crate::cancellation::CancellationToken;
use crate::connection::ConsumerConnection;
use crate::error::ConnectionError;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Serializes operations to the daemon and delivers their results.
pub trait AsyncActionExecutor: Send + Sync {
    /// Human-readable name of the daemon connection, used in error messages
    fn display_name(&self) -> String;

    /// Run `dispatch` eventually, on a thread owned by the executor. The
    /// result is delivered through the dispatch itself, exactly once.
    fn run(&self, dispatch: Dispatch);

    /// Refuse new work and block until in-flight work has finished.
    fn stop(&self);

    /// Refuse new work and cancel everything in flight.
    fn stop_now(&self);

    /// Refuse new work; in-flight work finishes without blocking the caller.
    fn stop_when_idle(&self);
}

pub struct TokioActionExecutor {
    connection: Arc<dyn ConsumerConnection>,
    runtime: Handle,
    tracker: TaskTracker,
    in_flight: Arc<DashMap<u64, CancellationToken>>,
    next_id: AtomicU64,
    /// `true` while new work is accepted. `run` holds the read side from the
    /// check until the work is registered and spawned.
    accepting: RwLock<bool>,
}

/// Drops the in-flight entry however the dispatch ends.
struct InFlightEntry {
    in_flight: Arc<DashMap<u64, CancellationToken>>,
    id: u64,
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

impl TokioActionExecutor {
    pub fn new(connection: Arc<dyn ConsumerConnection>, runtime: Handle) -> Self {
        Self {
            connection,
            runtime,
            tracker: TaskTracker::new(),
            in_flight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            accepting: RwLock::new(true),
        }
    }

    /// Number of operations dispatched but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_stopped(&self) -> bool {
        !*self.accepting.read()
    }

    /// Once this returns, every accepted dispatch is registered with the
    /// tracker and the in-flight table, and no further one will be.
    fn refuse_new_work(&self) {
        *self.accepting.write() = false;
        self.tracker.close();
    }

    fn cancel_in_flight(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.in_flight.iter() {
            entry.value().trigger();
            cancelled += 1;
        }
        cancelled
    }
}

impl AsyncActionExecutor for TokioActionExecutor {
    fn display_name(&self) -> String {
        self.connection.display_name()
    }

    fn run(&self, dispatch: Dispatch) {
        let accepting = self.accepting.read();
        if !*accepting {
            drop(accepting);
            warn!(
                entry_point = %dispatch.entry_point(),
                "Executor is stopped, rejecting operation"
            );
            dispatch.reject(ConnectionError::Stopped);
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.in_flight
            .insert(id, dispatch.cancellation_token().clone());
        let entry = InFlightEntry {
            in_flight: Arc::clone(&self.in_flight),
            id,
        };

        debug!(
            operation_id = id,
            entry_point = %dispatch.entry_point(),
            "Dispatching operation"
        );

        let connection = Arc::clone(&self.connection);
        self.tracker.spawn_blocking_on(
            move || {
                let _entry = entry;
                dispatch.run(connection.as_ref());
            },
            &self.runtime,
        );
        drop(accepting);
    }

    fn stop(&self) {
        self.refuse_new_work();
        debug!(in_flight = self.in_flight(), "Waiting for in-flight operations");
        futures::executor::block_on(self.tracker.wait());
        info!(connection = %self.display_name(), "Executor stopped");
    }

    fn stop_now(&self) {
        self.refuse_new_work();
        let cancelled = self.cancel_in_flight();
        info!(
            connection = %self.display_name(),
            cancelled,
            "Executor stopped immediately"
        );
    }

    fn stop_when_idle(&self) {
        self.refuse_new_work();
        info!(
            connection = %self.display_name(),
            in_flight = self.in_flight(),
            "Executor will stop once idle"
        );
    }
}

impl std::fmt::Debug for TokioActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioActionExecutor")
            .field("connection", &self.connection.display_name())
            .field("in_flight", &self.in_flight.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
