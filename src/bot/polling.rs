//! Long-polling runtime.
//!
//! An unbounded fetch/dispatch loop driven as an explicit state machine
//! so idle and failure backoff transitions are testable without
//! wall-clock delays, with a stop handle checked between steps instead
//! of raw uninterruptible sleeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::api::ApiClient;
use crate::bot::dispatcher::Dispatcher;
use crate::config::BackoffStrategy;
use crate::error::Result;

/// Updates requested per fetch.
const POLL_LIMIT: u8 = 100;

/// Growing delay between consecutive failed fetches.
const FETCH_BACKOFF: BackoffStrategy = BackoffStrategy::Exponential {
    base: Duration::from_secs(1),
    cap: Duration::from_secs(30),
};

/// Consecutive fetch failures tolerated before the loop dies.
const MAX_CONSECUTIVE_FETCH_FAILURES: u32 = 10;

/// Where the polling loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Fetching,
    Dispatching,
    Backoff,
    Stopped,
}

/// Idle delay for empty batches: starts at the floor, grows by a fixed
/// step per empty fetch up to the cap, resets once updates arrive.
#[derive(Debug, Clone)]
pub(crate) struct IdleBackoff {
    current: Duration,
}

impl IdleBackoff {
    const FLOOR: Duration = Duration::from_millis(100);
    const STEP: Duration = Duration::from_millis(100);
    const CAP: Duration = Duration::from_secs(1);

    pub(crate) fn new() -> Self {
        Self {
            current: Self::FLOOR,
        }
    }

    /// Delay to sleep now; the next empty fetch waits longer.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current + Self::STEP).min(Self::CAP);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = Self::FLOOR;
    }
}

/// Cancels a running [`Poller`]. Dropping the handle does not stop the
/// loop; call [`StopHandle::stop`].
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub(crate) fn from_sender(tx: watch::Sender<bool>) -> Self {
        Self { tx }
    }

    /// Ask the loop to finish. Takes effect at the next step boundary;
    /// an in-flight fetch or handler is not interrupted.
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// The long-polling loop.
pub struct Poller {
    client: Arc<ApiClient>,
    dispatcher: Arc<Dispatcher>,
    stop: watch::Receiver<bool>,
    state: watch::Sender<PollerState>,
    offset: Option<i64>,
    idle: IdleBackoff,
    consecutive_failures: u32,
}

impl Poller {
    pub fn new(client: Arc<ApiClient>, dispatcher: Arc<Dispatcher>) -> (Self, StopHandle) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let poller = Self::with_stop(client, dispatcher, stop_rx);
        (poller, StopHandle::from_sender(stop_tx))
    }

    /// Build a poller wired to an externally owned stop channel.
    pub(crate) fn with_stop(
        client: Arc<ApiClient>,
        dispatcher: Arc<Dispatcher>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(PollerState::Idle);
        Self {
            client,
            dispatcher,
            stop,
            state: state_tx,
            offset: None,
            idle: IdleBackoff::new(),
            consecutive_failures: 0,
        }
    }

    /// Observe state transitions (useful for tests and health checks).
    pub fn state(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    fn enter(&self, state: PollerState) {
        let _ = self.state.send(state);
    }

    fn stopping(&self) -> bool {
        *self.stop.borrow()
    }

    /// Run until stopped or until the failure ceiling is hit.
    ///
    /// Returns `Ok` on a clean stop; the error of the final fetch once
    /// `MAX_CONSECUTIVE_FETCH_FAILURES` is reached, after which polling
    /// must be restarted externally.
    pub async fn run(mut self) -> Result<()> {
        info!("starting polling loop");

        loop {
            if self.stopping() {
                self.enter(PollerState::Stopped);
                info!("polling loop stopped");
                return Ok(());
            }

            self.enter(PollerState::Fetching);
            match self
                .client
                .get_updates(self.offset, Some(POLL_LIMIT), Some(Duration::ZERO))
                .await
            {
                Ok(batch) if batch.is_empty() => {
                    self.consecutive_failures = 0;
                    self.enter(PollerState::Idle);
                    let delay = self.idle.next_delay();
                    self.wait(delay).await;
                }
                Ok(batch) => {
                    self.consecutive_failures = 0;
                    self.idle.reset();
                    self.enter(PollerState::Dispatching);

                    for update in batch {
                        // Advance the offset before dispatching so a
                        // handler failure never redelivers this update
                        // on the next fetch.
                        self.offset = Some(update.update_id + 1);
                        self.dispatcher
                            .dispatch(update, Arc::clone(&self.client))
                            .await;

                        if self.stopping() {
                            break;
                        }
                    }
                }
                Err(error) => {
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= MAX_CONSECUTIVE_FETCH_FAILURES {
                        self.enter(PollerState::Stopped);
                        error!(
                            failures = self.consecutive_failures,
                            error = %error,
                            "polling aborted after repeated fetch failures"
                        );
                        return Err(error);
                    }

                    let delay = FETCH_BACKOFF.delay_for(self.consecutive_failures);
                    warn!(
                        failures = self.consecutive_failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "fetch failed, backing off"
                    );
                    self.enter(PollerState::Backoff);
                    self.wait(delay).await;
                }
            }
        }
    }

    /// Sleep, waking early if the stop handle fires.
    async fn wait(&mut self, delay: Duration) {
        let sleep = sleep(delay);
        tokio::pin!(sleep);
        tokio::select! {
            _ = &mut sleep => {}
            _ = self.stop.changed() => {}
        }
    }
}
