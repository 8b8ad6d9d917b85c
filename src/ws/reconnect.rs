//! Exponential-backoff retry state.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::config::ReconnectConfig;
use super::task::ScheduledTask;

/// Outcome of asking for another retry.
#[derive(Debug)]
pub(crate) enum Retry {
    /// A retry timer was armed.
    Scheduled {
        /// One-based number of this retry
        attempt: u32,
        delay: Duration,
        token: CancellationToken,
    },
    /// The cap was reached just now. Reported once.
    Exhausted { attempts: u32 },
    /// The cap was reached earlier; nothing to do.
    GaveUp,
}

#[derive(Debug, Default)]
pub(crate) struct ReconnectController {
    attempts: u32,
    exhausted: bool,
    timer: ScheduledTask,
}

impl ReconnectController {
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    #[cfg(test)]
    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    /// Forget all failures and cancel any pending retry.
    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
        self.exhausted = false;
        self.timer.cancel();
    }

    pub(crate) fn cancel(&mut self) {
        self.timer.cancel();
    }

    /// Arm the next retry, or report that the cap has been hit.
    pub(crate) fn schedule(&mut self, config: &ReconnectConfig) -> Retry {
        if self.exhausted {
            return Retry::GaveUp;
        }
        if self.attempts >= config.max_attempts {
            self.exhausted = true;
            self.timer.cancel();
            return Retry::Exhausted {
                attempts: self.attempts,
            };
        }

        let delay = config.delay_for(self.attempts);
        self.attempts += 1;
        Retry::Scheduled {
            attempt: self.attempts,
            delay,
            token: self.timer.arm(),
        }
    }

    /// Reset and arm a single retry for a manual reconnect.
    pub(crate) fn schedule_manual(&mut self) -> CancellationToken {
        self.reset();
        self.timer.arm()
    }

    pub(crate) fn is_current(&self, token: &CancellationToken) -> bool {
        self.timer.is_current(token)
    }

    pub(crate) fn fired(&mut self) {
        self.timer.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            interval: Duration::from_millis(1000),
            max_attempts,
            ..ReconnectConfig::default()
        }
    }

    #[test]
    fn schedules_with_doubling_delay() {
        let mut controller = ReconnectController::default();
        let config = config(10);

        let delays: Vec<_> = (0..3)
            .map(|_| match controller.schedule(&config) {
                Retry::Scheduled { delay, .. } => delay,
                other => panic!("unexpected {other:?}"),
            })
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ]
        );
        assert_eq!(controller.attempts(), 3);
    }

    #[test]
    fn exhaustion_is_reported_once() {
        let mut controller = ReconnectController::default();
        let config = config(2);

        assert!(matches!(controller.schedule(&config), Retry::Scheduled { attempt: 1, .. }));
        assert!(matches!(controller.schedule(&config), Retry::Scheduled { attempt: 2, .. }));
        assert!(matches!(controller.schedule(&config), Retry::Exhausted { attempts: 2 }));
        assert!(matches!(controller.schedule(&config), Retry::GaveUp));
        assert!(controller.is_exhausted());
        assert!(!controller.is_pending());
    }

    #[test]
    fn reset_clears_exhaustion_and_timer() {
        let mut controller = ReconnectController::default();
        let config = config(1);
        let Retry::Scheduled { token, .. } = controller.schedule(&config) else {
            panic!("expected a scheduled retry");
        };
        let _exhausted = controller.schedule(&config);

        controller.reset();

        assert!(token.is_cancelled());
        assert_eq!(controller.attempts(), 0);
        assert!(!controller.is_exhausted());
        assert!(matches!(controller.schedule(&config), Retry::Scheduled { .. }));
    }

    #[test]
    fn rescheduling_keeps_one_timer_in_flight() {
        let mut controller = ReconnectController::default();
        let config = config(10);
        let Retry::Scheduled { token: first, .. } = controller.schedule(&config) else {
            panic!("expected a scheduled retry");
        };
        let Retry::Scheduled { token: second, .. } = controller.schedule(&config) else {
            panic!("expected a scheduled retry");
        };

        assert!(first.is_cancelled());
        assert!(controller.is_current(&second));
    }

    #[test]
    fn manual_schedule_resets_attempts() {
        let mut controller = ReconnectController::default();
        let config = config(10);
        let _first = controller.schedule(&config);
        let _second = controller.schedule(&config);

        let token = controller.schedule_manual();

        assert_eq!(controller.attempts(), 0);
        assert!(controller.is_current(&token));
        controller.fired();
        assert!(!controller.is_pending());
    }
}
