//! Cancellable scheduled work with a single in-flight instance.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, interval_at, sleep};
use tokio_util::sync::CancellationToken;

/// Slot holding at most one armed timer.
///
/// Arming cancels whatever was armed before; cancelling an empty slot is a no-op.
#[derive(Debug, Default)]
pub(crate) struct ScheduledTask {
    token: Option<CancellationToken>,
}

impl ScheduledTask {
    /// Replace any armed task with a fresh one and return its token.
    pub(crate) fn arm(&mut self) -> CancellationToken {
        self.cancel();
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        token
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Whether `token` still belongs to the armed task. Must be checked under the owner's lock.
    pub(crate) fn is_current(&self, token: &CancellationToken) -> bool {
        !token.is_cancelled() && self.is_pending()
    }

    /// Clear the slot after a one-shot task fired.
    pub(crate) fn complete(&mut self) {
        self.token = None;
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run `fire` once after `delay` unless `token` is cancelled first.
pub(crate) fn spawn_after<F>(handle: &Handle, token: CancellationToken, delay: Duration, fire: F)
where
    F: FnOnce(CancellationToken) + Send + 'static,
{
    handle.spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            () = sleep(delay) => fire(token),
        }
    });
}

/// Run `tick` every `period`, first after one full period, until `token` is cancelled.
pub(crate) fn spawn_every<F>(handle: &Handle, token: CancellationToken, period: Duration, mut tick: F)
where
    F: FnMut(&CancellationToken) + Send + 'static,
{
    handle.spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => tick(&token),
            }
        }
    });
}
