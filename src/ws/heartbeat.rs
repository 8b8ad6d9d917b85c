//! Keep-alive sender and responder.
//!
//! The monitor owns the periodic ping timer and remembers when the last inbound frame arrived.
//! It never closes anything itself; the connection manager asks [`HeartbeatMonitor::is_expired`]
//! on every tick when a heartbeat timeout is configured.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::envelope::{Envelope, Heartbeat, HeartbeatAction};
use super::task::ScheduledTask;

#[derive(Debug)]
pub(crate) struct HeartbeatMonitor {
    timer: ScheduledTask,
    last_inbound: Instant,
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self {
            timer: ScheduledTask::default(),
            last_inbound: Instant::now(),
        }
    }
}

impl HeartbeatMonitor {
    /// Arm the ping timer for a freshly opened connection.
    pub(crate) fn start(&mut self) -> CancellationToken {
        self.last_inbound = Instant::now();
        self.timer.arm()
    }

    pub(crate) fn stop(&mut self) {
        self.timer.cancel();
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.timer.is_pending()
    }

    pub(crate) fn is_current(&self, token: &CancellationToken) -> bool {
        self.timer.is_current(token)
    }

    pub(crate) fn record_inbound(&mut self) {
        self.last_inbound = Instant::now();
    }

    /// Whether nothing has been heard for longer than `timeout`.
    pub(crate) fn is_expired(&self, timeout: Option<Duration>) -> bool {
        timeout.is_some_and(|t| self.last_inbound.elapsed() > t)
    }

    /// Envelope sent on every timer tick.
    pub(crate) fn ping() -> Envelope {
        Envelope::ping()
    }

    /// Reply owed for an inbound heartbeat. A pong is only proof of life and is not answered.
    pub(crate) fn reply_to(heartbeat: &Heartbeat) -> Option<Envelope> {
        match heartbeat.action {
            Some(HeartbeatAction::Pong) => None,
            _ => Some(Envelope::pong()),
        }
    }
}
