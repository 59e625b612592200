//! Public facade over the reconciler thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use micbridge_foundation::timer::TimerService;
use micbridge_foundation::RouteError;

use crate::backend::{RouteBackend, ScoState};
use crate::reconciler::{Msg, RouteLog, RouteReport, RouteTiming, ScoReconciler};

pub struct RouterController {
    tx: Sender<Msg>,
    join: Option<JoinHandle<()>>,
    report_timeout: Duration,
}

impl RouterController {
    /// Spawn the reconciler thread. `sco_events` carries the OS
    /// state-change notifications; the returned receiver carries the
    /// diagnostic route log.
    pub fn new(
        backend: Arc<dyn RouteBackend>,
        sco_events: Receiver<ScoState>,
        timers: TimerService,
        timing: RouteTiming,
    ) -> (Self, Receiver<RouteLog>) {
        let (tx, rx) = unbounded();
        let (log_tx, log_rx) = unbounded();

        // Forward OS notifications into the reconciler's single mailbox.
        let forward_tx = tx.clone();
        thread::Builder::new()
            .name("sco-events".to_string())
            .spawn(move || {
                for state in sco_events.iter() {
                    if forward_tx.send(Msg::StateChanged(state)).is_err() {
                        break;
                    }
                }
            })
            .expect("Failed to spawn SCO event forwarder thread");

        let reconciler = ScoReconciler::new(backend, timers, timing, tx.clone(), log_tx);
        let join = thread::Builder::new()
            .name("route-reconciler".to_string())
            .spawn(move || reconciler.run(rx))
            .expect("Failed to spawn route reconciler thread");

        let report_timeout = timing.settle_kick + timing.settle_report + Duration::from_secs(3);

        (
            Self {
                tx,
                join: Some(join),
                report_timeout,
            },
            log_rx,
        )
    }

    /// Steer the audio path onto the SCO link. Blocks until the settle
    /// delays have elapsed and returns the sampled mode/flag/availability.
    /// Hardware without SCO support is not an error here; it shows up as
    /// `sco_available == false` in the report.
    pub fn enable(&self) -> Result<RouteReport, RouteError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(Msg::Enable(reply_tx))
            .map_err(|_| RouteError::ReconcilerGone)?;
        reply_rx
            .recv_timeout(self.report_timeout)
            .map_err(|_| RouteError::ReportTimeout)
    }

    /// Restore the normal audio path. Never fails; a reconciler that is
    /// already gone has nothing left to disable.
    pub fn disable(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(Msg::Disable(ack_tx)).is_err() {
            tracing::warn!("disable requested after the reconciler stopped");
            return;
        }
        if ack_rx.recv_timeout(self.report_timeout).is_err() {
            tracing::warn!("timed out waiting for disable acknowledgement");
        }
    }
}

impl Drop for RouterController {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
