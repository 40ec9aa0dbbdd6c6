//! Small runtime utilities shared across modules.
//!
//! Native `tokio` equivalent of `medea-jason`'s
//! `utils::resettable_delay::ResettableDelayHandle` — a delay future that
//! can be stopped and restarted. The teacher's version spawns an abortable
//! future via `platform::spawn` and resolves a `oneshot::Sender` through a
//! `Rc<RefCell<_>>`; ours drives a `tokio::sync::watch<Option<Instant>>`
//! deadline instead, since this crate has no `!Send` wasm constraint to work
//! around.

use std::time::{Duration, Instant};

use tokio::sync::watch;

/// A delay that can be [`stop`](Self::stop)ped and
/// [`reset`](Self::reset) — used for the reconnect timer and the
/// reauthentication poll.
pub struct ResettableDelay {
    timeout: Duration,
    deadline: watch::Sender<Option<Instant>>,
}

impl ResettableDelay {
    /// Builds a new delay of `timeout`, optionally starting it immediately.
    #[must_use]
    pub fn new(timeout: Duration, start_immediately: bool) -> Self {
        let initial = start_immediately.then(|| Instant::now() + timeout);
        let (deadline, _) = watch::channel(initial);
        Self { timeout, deadline }
    }

    /// Stops the delay; [`Self::wait`] will block until [`Self::reset`] is
    /// called again.
    pub fn stop(&self) {
        let _ = self.deadline.send(None);
    }

    /// Restarts the countdown from the beginning.
    pub fn reset(&self) {
        let _ = self.deadline.send(Some(Instant::now() + self.timeout));
    }

    /// Resolves once the current countdown elapses. If [`Self::reset`] is
    /// called while awaiting, the countdown restarts from scratch; if
    /// [`Self::stop`] is called, this awaits forever until reset.
    pub async fn wait(&self) {
        let mut rx = self.deadline.subscribe();
        loop {
            let deadline = *rx.borrow_and_update();
            match deadline {
                None => {
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
                Some(deadline) => {
                    tokio::select! {
                        () = tokio::time::sleep_until(deadline.into()) => return,
                        changed = rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ResettableDelay;

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout() {
        let delay = ResettableDelay::new(Duration::from_millis(100), true);
        tokio::time::advance(Duration::from_millis(150)).await;
        delay.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restarts_the_countdown() {
        let delay = std::sync::Arc::new(ResettableDelay::new(Duration::from_millis(100), true));
        let waiter = tokio::spawn({
            let delay = delay.clone();
            async move { delay.wait().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        delay.reset();

        // Had reset not restarted the countdown, the original deadline
        // (50ms remaining) would have fired during this advance.
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(!waiter.is_finished());

        tokio::time::advance(Duration::from_millis(50)).await;
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_blocks_until_reset() {
        let delay = ResettableDelay::new(Duration::from_millis(50), false);
        let waiter = tokio::spawn(async move {
            delay.wait().await;
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!waiter.is_finished());
        waiter.abort();
    }
}
