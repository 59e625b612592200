//! Desired/actual SCO reconciliation.
//!
//! One thread owns the whole route state; enable/disable calls, OS
//! notifications and timer firings all arrive through the same mailbox,
//! so no locking is needed and every timer firing re-checks `desired`
//! before acting on what may be stale intent.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use micbridge_foundation::timer::{TimerHandle, TimerService};

use crate::backend::{AudioMode, RouteBackend, ScoState};

/// Delays driving the reconciliation loop. Defaults are the production
/// values; tests shrink them.
#[derive(Debug, Clone, Copy)]
pub struct RouteTiming {
    /// Gap between the defensive SCO reset and the fresh start request.
    pub settle_kick: Duration,
    /// Gap between the start request and sampling the resulting state.
    pub settle_report: Duration,
    /// Delay before retrying after a spontaneous disconnect.
    pub retry_delay: Duration,
    /// Period of the keep-alive check while routing is desired.
    pub keep_alive_period: Duration,
}

impl Default for RouteTiming {
    fn default() -> Self {
        Self {
            settle_kick: Duration::from_millis(100),
            settle_report: Duration::from_secs(2),
            retry_delay: Duration::from_secs(1),
            keep_alive_period: Duration::from_secs(5),
        }
    }
}

/// Sampled audio state, echoed back from `enable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteReport {
    pub mode: AudioMode,
    pub sco_on: bool,
    pub sco_available: bool,
}

/// Diagnostic event emitted on every transition and retry attempt.
/// At-least-once, with no ordering guarantee relative to command
/// completions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLog {
    pub message: String,
}

pub(crate) enum Msg {
    Enable(Sender<RouteReport>),
    Disable(Sender<()>),
    StateChanged(ScoState),
    SettleKick,
    SettleReport,
    RetryFire,
    KeepAliveTick,
    Shutdown,
}

pub(crate) struct ScoReconciler {
    backend: Arc<dyn RouteBackend>,
    timers: TimerService,
    timing: RouteTiming,
    /// Feedback sender so timer callbacks land in the same mailbox.
    tx: Sender<Msg>,
    log_tx: Sender<RouteLog>,
    desired: bool,
    pending_retry: Option<TimerHandle>,
    keep_alive: Option<TimerHandle>,
    pending_report: Option<Sender<RouteReport>>,
}

impl ScoReconciler {
    pub(crate) fn new(
        backend: Arc<dyn RouteBackend>,
        timers: TimerService,
        timing: RouteTiming,
        tx: Sender<Msg>,
        log_tx: Sender<RouteLog>,
    ) -> Self {
        Self {
            backend,
            timers,
            timing,
            tx,
            log_tx,
            desired: false,
            pending_retry: None,
            keep_alive: None,
            pending_report: None,
        }
    }

    pub(crate) fn run(mut self, rx: Receiver<Msg>) {
        tracing::info!("route reconciler started");
        while let Ok(msg) = rx.recv() {
            match msg {
                Msg::Enable(reply) => self.on_enable(reply),
                Msg::Disable(reply) => self.on_disable(reply),
                Msg::StateChanged(state) => self.on_state_changed(state),
                Msg::SettleKick => self.on_settle_kick(),
                Msg::SettleReport => self.on_settle_report(),
                Msg::RetryFire => self.on_retry_fire(),
                Msg::KeepAliveTick => self.on_keep_alive_tick(),
                Msg::Shutdown => break,
            }
        }

        // Leave the audio path the way we found it.
        self.cancel_timers();
        if self.desired {
            self.backend.stop_sco();
            self.backend.set_sco_on(false);
            self.backend.set_mode(AudioMode::Normal);
        }
        tracing::info!("route reconciler stopped");
    }

    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "micbridge::route", "{message}");
        let _ = self.log_tx.send(RouteLog { message });
    }

    fn sample(&self) -> RouteReport {
        RouteReport {
            mode: self.backend.mode(),
            sco_on: self.backend.is_sco_on(),
            sco_available: self.backend.is_sco_available(),
        }
    }

    fn log_audio_state(&self, prefix: &str) {
        let s = self.sample();
        self.log(format!(
            "{prefix}: mode={:?}, scoOn={}, scoAvailable={}",
            s.mode, s.sco_on, s.sco_available
        ));
    }

    fn on_enable(&mut self, reply: Sender<RouteReport>) {
        self.desired = true;
        self.log_audio_state("BEFORE");

        self.backend.set_mode(AudioMode::Communication);

        // Defensive reset: clear any stale SCO flag first, otherwise the
        // platform may silently no-op the fresh start request.
        self.backend.stop_sco();
        self.backend.set_sco_on(false);

        // A re-enable while one is settling answers the earlier caller
        // with the state as it stands now.
        if let Some(prev) = self.pending_report.take() {
            let _ = prev.send(self.sample());
        }
        self.pending_report = Some(reply);
        let tx = self.tx.clone();
        self.timers.schedule(self.timing.settle_kick, move || {
            let _ = tx.send(Msg::SettleKick);
        });
    }

    fn on_settle_kick(&mut self) {
        if self.desired {
            self.backend.start_sco();
            self.backend.set_sco_on(true);
            self.arm_keep_alive();
        }
        // The report goes out either way so an enable that raced a
        // disable still answers its caller.
        let tx = self.tx.clone();
        self.timers.schedule(self.timing.settle_report, move || {
            let _ = tx.send(Msg::SettleReport);
        });
    }

    fn on_settle_report(&mut self) {
        self.log_audio_state("AFTER");
        if let Some(reply) = self.pending_report.take() {
            let _ = reply.send(self.sample());
        }
        self.log("SCO routing completed");
    }

    fn on_disable(&mut self, reply: Sender<()>) {
        self.desired = false;
        self.cancel_timers();
        self.backend.stop_sco();
        self.backend.set_sco_on(false);
        self.backend.set_mode(AudioMode::Normal);
        self.log("SCO routing disabled");
        let _ = reply.send(());
    }

    fn on_state_changed(&mut self, state: ScoState) {
        self.log(format!(
            "SCO state changed: {state} (desired={})",
            self.desired
        ));

        if self.desired && state == ScoState::Disconnected {
            // One pending retry at a time; a newer disconnect supersedes
            // an older schedule.
            if let Some(retry) = self.pending_retry.take() {
                retry.cancel();
            }
            let tx = self.tx.clone();
            self.pending_retry = Some(self.timers.schedule(self.timing.retry_delay, move || {
                let _ = tx.send(Msg::RetryFire);
            }));
        }
    }

    fn on_retry_fire(&mut self) {
        self.pending_retry = None;
        // Desired may have flipped since the timer was armed.
        if self.desired {
            self.log("Attempting SCO reconnection...");
            self.backend.start_sco();
        }
    }

    fn on_keep_alive_tick(&mut self) {
        if !self.desired {
            // Stale tick: the handle was cancelled but this firing was
            // already in flight.
            return;
        }
        // Trigger condition inspects only the SCO flag, not the
        // negotiated link state.
        if !self.backend.is_sco_on() {
            self.log("Maintaining SCO: restarting connection");
            self.backend.start_sco();
        }
    }

    fn arm_keep_alive(&mut self) {
        if self.keep_alive.is_some() {
            return;
        }
        let tx = self.tx.clone();
        self.keep_alive = Some(
            self.timers
                .schedule_periodic(self.timing.keep_alive_period, move || {
                    let _ = tx.send(Msg::KeepAliveTick);
                }),
        );
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.keep_alive.take() {
            timer.cancel();
        }
        if let Some(timer) = self.pending_retry.take() {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoopRouteBackend;
    use micbridge_foundation::clock::real_clock;

    fn reconciler() -> (ScoReconciler, Receiver<Msg>, Receiver<RouteLog>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (log_tx, log_rx) = crossbeam_channel::unbounded();
        let r = ScoReconciler::new(
            Arc::new(NoopRouteBackend::new()),
            TimerService::new(real_clock()),
            RouteTiming::default(),
            tx,
            log_tx,
        );
        (r, rx, log_rx)
    }

    #[test]
    fn stale_keep_alive_tick_after_disable_is_a_noop() {
        let (mut r, _rx, log_rx) = reconciler();
        r.desired = false;
        r.backend.set_sco_on(false);

        r.on_keep_alive_tick();

        // No "Maintaining SCO" log, no action.
        assert!(log_rx.try_recv().is_err());
    }

    #[test]
    fn stale_retry_fire_after_disable_is_a_noop() {
        let (mut r, _rx, log_rx) = reconciler();
        r.desired = false;

        r.on_retry_fire();

        assert!(log_rx.try_recv().is_err());
    }

    #[test]
    fn disconnect_while_not_desired_schedules_nothing() {
        let (mut r, _rx, _log_rx) = reconciler();
        r.desired = false;

        r.on_state_changed(ScoState::Disconnected);

        assert!(r.pending_retry.is_none());
    }

    #[test]
    fn disable_cancels_pending_timers() {
        let (mut r, _rx, _log_rx) = reconciler();
        r.desired = true;
        r.on_state_changed(ScoState::Disconnected);
        let retry = r.pending_retry.clone().expect("retry scheduled");
        r.arm_keep_alive();
        let keep_alive = r.keep_alive.clone().expect("keep-alive armed");

        let (ack_tx, _ack_rx) = crossbeam_channel::bounded(1);
        r.on_disable(ack_tx);

        assert!(retry.is_cancelled());
        assert!(keep_alive.is_cancelled());
        assert!(r.pending_retry.is_none());
        assert!(r.keep_alive.is_none());
        assert!(!r.desired);
    }
}
