//! Single-flight coordination of refresh cycles.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::oneshot;

use super::TRACING_TARGET;
use crate::token::AccessToken;

/// Result of one refresh cycle: the new access token, or `None` if the
/// session had to be dropped.
pub type RefreshOutcome = Option<AccessToken>;

/// Handle every waiter of a cycle awaits; all of them observe the same outcome.
pub type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Observable phase of the refresh state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshPhase {
    /// No refresh is running; the next request starts a new cycle.
    Idle,
    /// A refresh is running; new requests join it.
    Refreshing,
}

enum FlightState {
    Idle,
    Refreshing {
        generation: u64,
        outcome: SharedRefresh,
    },
}

struct FlightInner {
    state: FlightState,
    next_generation: u64,
}

/// At most one refresh cycle at a time, shared by every concurrent caller.
///
/// Checking for a running cycle and registering a new one happen under the
/// same lock, with no suspension point in between. A settled cycle is never
/// reused: the machine returns to `Idle` as soon as the cycle's task ends.
#[derive(Clone)]
pub struct RefreshFlight {
    inner: Arc<Mutex<FlightInner>>,
}

impl fmt::Debug for RefreshFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshFlight")
            .field("phase", &self.phase())
            .finish()
    }
}

impl Default for RefreshFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshFlight {
    /// Creates an idle state machine.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FlightInner {
                state: FlightState::Idle,
                next_generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlightInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current phase.
    pub fn phase(&self) -> RefreshPhase {
        match self.lock().state {
            FlightState::Idle => RefreshPhase::Idle,
            FlightState::Refreshing { .. } => RefreshPhase::Refreshing,
        }
    }

    /// Joins the running cycle, or starts a new one driven by `start`.
    ///
    /// `start` is only invoked when the machine is idle. The cycle runs on its
    /// own task so it completes even if every waiter goes away. Must be called
    /// from within a Tokio runtime.
    pub fn join<F, Fut>(&self, start: F) -> SharedRefresh
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let (generation, sender, outcome) = {
            let mut inner = self.lock();
            if let FlightState::Refreshing { generation, outcome } = &inner.state {
                tracing::debug!(
                    target: TRACING_TARGET,
                    generation,
                    "Joining in-flight token refresh"
                );
                return outcome.clone();
            }

            let generation = inner.next_generation;
            inner.next_generation += 1;

            let (sender, receiver) = oneshot::channel();
            let outcome = async move {
                receiver.await.unwrap_or_else(|_| {
                    tracing::error!(
                        target: TRACING_TARGET,
                        generation,
                        "Token refresh task ended without an outcome"
                    );
                    None
                })
            }
            .boxed()
            .shared();

            inner.state = FlightState::Refreshing {
                generation,
                outcome: outcome.clone(),
            };
            (generation, sender, outcome)
        };

        tracing::debug!(
            target: TRACING_TARGET,
            generation,
            "Starting token refresh"
        );

        let guard = SettleGuard {
            flight: self.clone(),
            generation,
        };
        let cycle = start();
        tokio::spawn(async move {
            let result = cycle.await;
            // Settle before publishing so waiters never observe a stale phase.
            drop(guard);
            let _ = sender.send(result);
        });

        outcome
    }

    /// Returns to `Idle` if `generation` is still the running cycle.
    fn settle(&self, generation: u64) {
        let mut inner = self.lock();
        if matches!(inner.state, FlightState::Refreshing { generation: running, .. } if running == generation)
        {
            inner.state = FlightState::Idle;
            tracing::trace!(
                target: TRACING_TARGET,
                generation,
                "Token refresh settled"
            );
        }
    }
}

/// Resets the machine when a cycle ends, including by panic.
struct SettleGuard {
    flight: RefreshFlight,
    generation: u64,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.flight.settle(self.generation);
    }
}
