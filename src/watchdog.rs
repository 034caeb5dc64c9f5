//! Inactivity watchdog
//!
//! A per-session timer task with two stages: after `warning_timeout` of
//! inactivity the warning becomes visible and a one-second countdown starts;
//! at `logout_timeout` the session is ended whether or not the warning was
//! acknowledged. Any activity (or the "stay logged in" acknowledgment, which
//! is the same thing) resets both stages.
//!
//! The watchdog exists only while authenticated. The session manager aborts
//! the task before the state transition on logout, and the logout-timer arm
//! exits the loop before the logout itself runs, so a timer firing against a
//! cleared session is structurally impossible rather than guarded against.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Ephemeral timer state, observable by the warning dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerState {
    /// Whether the inactivity warning should be on screen.
    pub warning_visible: bool,
    /// Seconds left on the visible countdown.
    pub remaining_seconds: u64,
    /// Last processed activity.
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug)]
enum Activity {
    Input,
    Acknowledge,
}

/// Handle to a running watchdog task.
#[derive(Debug)]
pub struct InactivityWatchdog {
    activity_tx: mpsc::Sender<Activity>,
    state_rx: watch::Receiver<TimerState>,
    last_forwarded: Mutex<Option<Instant>>,
    throttle: Duration,
    task: JoinHandle<()>,
}

impl InactivityWatchdog {
    /// Spawn the timer task.
    ///
    /// `on_logout` is the session manager's logout operation, invoked at most
    /// once, after the timer loop has already exited.
    pub fn spawn<F, Fut>(
        warning_timeout: Duration,
        logout_timeout: Duration,
        throttle: Duration,
        on_logout: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        debug_assert!(warning_timeout < logout_timeout);

        let (activity_tx, mut activity_rx) = mpsc::channel::<Activity>(16);
        let countdown_total = (logout_timeout - warning_timeout).as_secs();
        let (state_tx, state_rx) = watch::channel(TimerState {
            warning_visible: false,
            remaining_seconds: countdown_total,
            last_activity_at: Utc::now(),
        });

        let task = tokio::spawn(async move {
            let mut on_logout = Some(on_logout);
            let mut warn_deadline = Instant::now() + warning_timeout;
            let mut logout_deadline = Instant::now() + logout_timeout;
            let mut warning_visible = false;
            let mut remaining = countdown_total;

            let mut countdown = tokio::time::interval(Duration::from_secs(1));
            countdown.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    event = activity_rx.recv() => {
                        let Some(event) = event else {
                            // Handle dropped: the session manager tore us down
                            break;
                        };
                        if matches!(event, Activity::Acknowledge) {
                            debug!("inactivity warning acknowledged");
                        }
                        let now = Instant::now();
                        warn_deadline = now + warning_timeout;
                        logout_deadline = now + logout_timeout;
                        warning_visible = false;
                        remaining = countdown_total;
                        let _ = state_tx.send(TimerState {
                            warning_visible: false,
                            remaining_seconds: remaining,
                            last_activity_at: Utc::now(),
                        });
                    }
                    _ = tokio::time::sleep_until(warn_deadline), if !warning_visible => {
                        warning_visible = true;
                        remaining = countdown_total;
                        countdown.reset();
                        info!(remaining, "inactivity warning raised");
                        state_tx.send_modify(|state| {
                            state.warning_visible = true;
                            state.remaining_seconds = remaining;
                        });
                    }
                    _ = countdown.tick(), if warning_visible => {
                        remaining = remaining.saturating_sub(1);
                        state_tx.send_modify(|state| {
                            state.remaining_seconds = remaining;
                        });
                    }
                    _ = tokio::time::sleep_until(logout_deadline) => {
                        info!("inactivity limit reached, ending session");
                        state_tx.send_modify(|state| {
                            state.warning_visible = false;
                            state.remaining_seconds = 0;
                        });
                        // Leave the loop before the logout runs: from here on
                        // no timer arm can fire, and the manager aborting an
                        // already-finished task cannot cancel the logout.
                        if let Some(on_logout) = on_logout.take() {
                            tokio::spawn(on_logout());
                        }
                        break;
                    }
                }
            }
        });

        Self {
            activity_tx,
            state_rx,
            last_forwarded: Mutex::new(None),
            throttle,
            task,
        }
    }

    /// Record a user input event.
    ///
    /// Throttled: events within the configured spacing of the last forwarded
    /// one are coalesced to bound timer-reset overhead.
    pub fn record_activity(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_forwarded.lock().expect("throttle lock poisoned");
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.throttle {
                    return;
                }
            }
            *last = Some(now);
        }
        // Queue full means a reset is already pending; dropping is harmless.
        let _ = self.activity_tx.try_send(Activity::Input);
    }

    /// "Stay logged in" acknowledgment: functionally identical to activity,
    /// but never throttled away.
    pub fn acknowledge(&self) {
        let _ = self.activity_tx.try_send(Activity::Acknowledge);
    }

    /// Current timer state.
    pub fn state(&self) -> TimerState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to timer state changes.
    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.state_rx.clone()
    }

    /// Tear the task down synchronously. The abort lands before the session
    /// state transition, so no timer can observe a cleared session.
    pub fn shutdown(self) {
        self.task.abort();
    }
}
