//! Fixed-cadence capture orchestration.
//!
//! One control task drives the selector: left, settle, right, settle, then,
//! if the send interval has elapsed and the link is usable, encode and
//! dispatch. Sends run on background tasks so a slow link never skews the
//! capture cadence, with at most one in flight per lane; a lane that is
//! still busy drops the new payload rather than queueing it.
//!
//! No fault kind terminates the loop. Capture faults re-initialize the
//! selector a bounded number of times; past that the loop idles at a fixed
//! interval so the device stays observably alive even when fully broken.

use crate::config::StreamConfig;
use crate::encode::encode;
use crate::link::{LinkBackend, LinkSupervisor};
use crate::transport::{self, Request, TransportConfig, TransportFault};
use duolens_capture::{SideSelector, StereoSensor};
use duolens_core::{Frame, FrameId, Lane, Payload, Side, stitch};
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What one loop iteration did. Returned by [`CaptureLoop::step`] so tests
/// can drive the loop round by round.
#[derive(Debug, Default)]
pub struct RoundOutcome {
    /// Both sides captured cleanly.
    pub captured: bool,
    /// Sends spawned this round.
    pub dispatched: usize,
    /// Payloads dropped because their lane was still in flight.
    pub dropped: usize,
    /// Previously dispatched sends that completed successfully.
    pub completed_ok: usize,
    /// Previously dispatched sends that failed after local retries.
    pub completed_err: usize,
}

pub struct CaptureLoop<S: StereoSensor, B: LinkBackend>
where
    B::Dialer: 'static,
{
    selector: SideSelector<S>,
    supervisor: LinkSupervisor<B>,
    cfg: StreamConfig,
    transport_cfg: TransportConfig,
    next_id: FrameId,
    last_send: Option<Instant>,
    in_flight: HashMap<Lane, JoinHandle<Result<(), TransportFault>>>,
    sensor_exhausted: bool,
}

impl<S: StereoSensor, B: LinkBackend> CaptureLoop<S, B>
where
    B::Dialer: 'static,
{
    pub fn new(selector: SideSelector<S>, supervisor: LinkSupervisor<B>, cfg: StreamConfig) -> Self {
        let transport_cfg = cfg.transport();
        Self {
            selector,
            supervisor,
            cfg,
            transport_cfg,
            next_id: FrameId(0),
            last_send: None,
            in_flight: HashMap::new(),
            sensor_exhausted: false,
        }
    }

    /// Run forever. Returns only if the task is dropped.
    pub async fn run(mut self) {
        if !self.init_selector().await {
            self.idle_spin().await;
        }
        info!("capture loop running ({:?} mode)", self.cfg.mode);
        loop {
            if self.sensor_exhausted {
                self.idle_spin().await;
            }
            let outcome = self.step().await;
            debug!(
                "round: captured={} dispatched={} dropped={} ok={} err={}",
                outcome.captured,
                outcome.dispatched,
                outcome.dropped,
                outcome.completed_ok,
                outcome.completed_err
            );
            if outcome.completed_err > 0 && outcome.completed_ok == 0 {
                let delay = self.supervisor.backoff_delay();
                debug!("fully-failed round, backing off {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// One capture round: left, settle, right, settle, send stage if due.
    pub async fn step(&mut self) -> RoundOutcome {
        let mut outcome = RoundOutcome::default();

        let Some(left) = self.capture(Side::Left).await else {
            return outcome;
        };
        tokio::time::sleep(self.cfg.switch_interval()).await;
        let Some(right) = self.capture(Side::Right).await else {
            return outcome;
        };
        tokio::time::sleep(self.cfg.switch_interval()).await;
        outcome.captured = true;

        if self.send_due() {
            // Harvest the previous dispatch before deciding link health.
            let (ok, err) = self.reap().await;
            outcome.completed_ok = ok;
            outcome.completed_err = err;
            if ok + err > 0 {
                self.supervisor.record_round(err == 0).await;
            }

            match self.supervisor.ensure_connected().await {
                Ok(dialer) => {
                    self.dispatch_round(dialer, left, right, &mut outcome);
                    self.last_send = Some(Instant::now());
                }
                Err(fault) => {
                    // Keep capturing; sends resume when the link comes back.
                    debug!("link unavailable, skipping send stage: {fault}");
                }
            }
        }
        outcome
    }

    fn send_due(&self) -> bool {
        match self.last_send {
            None => true,
            Some(at) => at.elapsed() >= self.cfg.send_interval(),
        }
    }

    async fn capture(&mut self, side: Side) -> Option<Frame> {
        let result = match self.selector.select(side).await {
            Ok(()) => self.selector.capture_selected(),
            Err(fault) => Err(fault),
        };
        match result {
            Ok(frame) => Some(frame),
            Err(fault) => {
                warn!("capture fault on {side}: {fault}, re-initializing");
                self.init_selector().await;
                None
            }
        }
    }

    /// Bounded re-initialization. Marks the sensor exhausted when every
    /// attempt fails; the run loop then enters the idle spin.
    async fn init_selector(&mut self) -> bool {
        for attempt in 1..=self.cfg.reinit_attempts {
            match self.selector.init().await {
                Ok(()) => {
                    self.sensor_exhausted = false;
                    return true;
                }
                Err(fault) => {
                    warn!(
                        "selector init attempt {attempt}/{} failed: {fault}",
                        self.cfg.reinit_attempts
                    );
                    tokio::time::sleep(self.cfg.switch_interval()).await;
                }
            }
        }
        error!(
            "sensor unrecoverable after {} init attempts",
            self.cfg.reinit_attempts
        );
        self.sensor_exhausted = true;
        false
    }

    /// Last resort: stay alive and keep saying so. Never returns.
    async fn idle_spin(&self) -> ! {
        loop {
            warn!("sensor unrecoverable, idling");
            tokio::time::sleep(self.cfg.idle_spin_interval()).await;
        }
    }

    fn dispatch_round(
        &mut self,
        dialer: B::Dialer,
        left: Frame,
        right: Frame,
        outcome: &mut RoundOutcome,
    ) {
        let id = self.next_id.bump();
        let frames: Vec<(Lane, Frame)> = if self.cfg.stitch {
            match stitch(&left, &right) {
                Ok(frame) => vec![(Lane::Stitched, frame)],
                Err(e) => {
                    error!("stitch failed: {e}");
                    return;
                }
            }
        } else {
            vec![(Lane::Side(Side::Left), left), (Lane::Side(Side::Right), right)]
        };

        for (lane, frame) in frames {
            let bytes = match encode(&frame, self.cfg.mode, self.cfg.jpeg_quality) {
                Ok(bytes) => bytes,
                Err(fault) => {
                    // Malformed output is dropped, never forwarded or retried.
                    warn!("encode fault on lane {lane}: {fault}, frame dropped");
                    continue;
                }
            };
            let payload = Payload {
                lane,
                frame_id: id,
                width: frame.width,
                height: frame.height,
                format: frame.format,
                kind: self.cfg.mode,
                bytes,
            };
            self.dispatch(lane, dialer.clone(), payload, outcome);
        }
    }

    /// Spawn one background send, unless this lane already has one running.
    fn dispatch(
        &mut self,
        lane: Lane,
        dialer: B::Dialer,
        payload: Payload,
        outcome: &mut RoundOutcome,
    ) {
        if let Some(handle) = self.in_flight.get(&lane) {
            if !handle.is_finished() {
                debug!("lane {lane} still in flight, dropping frame {}", payload.tag());
                outcome.dropped += 1;
                return;
            }
        }
        let request = Request::upload(&payload, self.cfg.send_frame_id);
        let cfg = self.transport_cfg.clone();
        let handle =
            tokio::spawn(async move { transport::send(&dialer, &request, &cfg).await });
        if let Some(old) = self.in_flight.insert(lane, handle) {
            // Finished after the reap; its result is dropped with it.
            old.abort();
        }
        outcome.dispatched += 1;
    }

    /// Collect results of finished background sends.
    async fn reap(&mut self) -> (usize, usize) {
        let done: Vec<Lane> = self
            .in_flight
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(lane, _)| *lane)
            .collect();
        let (mut ok, mut err) = (0, 0);
        for lane in done {
            if let Some(handle) = self.in_flight.remove(&lane) {
                match handle.await {
                    Ok(Ok(())) => ok += 1,
                    Ok(Err(fault)) => {
                        warn!("send on lane {lane} failed: {fault}");
                        err += 1;
                    }
                    Err(join_err) => {
                        warn!("send task on lane {lane} aborted: {join_err}");
                        err += 1;
                    }
                }
            }
        }
        (ok, err)
    }
}
