//! Link lifecycle supervision.
//!
//! Exactly one link handle exists at a time and this module owns it. The
//! capture loop reads the state and borrows the dialer for one send; it never
//! mutates the lifecycle. A freshly established link is not trusted until the
//! liveness probe answers.

use crate::transport::{self, Dial, TransportConfig, TransportFault};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConnectFault {
    #[error("link bring-up failed: {0}")]
    BringUp(String),

    #[error("link probe failed: {0}")]
    Probe(#[from] TransportFault),
}

/// Link lifecycle as seen by the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// Entered after the consecutive-failure threshold; a forced reconnect
    /// follows immediately.
    Degraded,
}

/// Link association seam. The real WiFi handshake lives behind this: it
/// either produces a usable dialer or fails.
pub trait LinkBackend: Send {
    type Dialer: Dial + Clone + Send;

    fn bring_up(&mut self) -> impl Future<Output = Result<Self::Dialer, ConnectFault>> + Send;

    fn tear_down(&mut self) -> impl Future<Output = ()> + Send;
}

/// Backend for plain IP networking: the OS keeps the link associated, so
/// bring-up just hands out a TCP dialer and the probe decides health.
pub struct TcpLinkBackend {
    server_addr: String,
}

impl TcpLinkBackend {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
        }
    }
}

impl LinkBackend for TcpLinkBackend {
    type Dialer = transport::TcpDialer;

    fn bring_up(&mut self) -> impl Future<Output = Result<Self::Dialer, ConnectFault>> + Send {
        let dialer = transport::TcpDialer::new(self.server_addr.clone());
        async move { Ok(dialer) }
    }

    fn tear_down(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Reconnect/backoff policy knobs.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Consecutive fully-failed rounds before a forced reconnect.
    pub failure_threshold: u32,
    /// Post-failure backoff: base + step * consecutive failures.
    pub backoff_base: Duration,
    pub backoff_step: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            backoff_base: Duration::from_millis(500),
            backoff_step: Duration::from_millis(500),
        }
    }
}

/// Owns the one link handle and the consecutive-failure counter.
pub struct LinkSupervisor<B: LinkBackend> {
    backend: B,
    transport: TransportConfig,
    cfg: SupervisorConfig,
    dialer: Option<B::Dialer>,
    state: LinkState,
    consecutive_failures: u32,
}

impl<B: LinkBackend> LinkSupervisor<B> {
    pub fn new(backend: B, transport: TransportConfig, cfg: SupervisorConfig) -> Self {
        Self {
            backend,
            transport,
            cfg,
            dialer: None,
            state: LinkState::Disconnected,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Hand out the current dialer, establishing the link first if needed.
    /// A failed establishment leaves the state `Disconnected`; the caller
    /// skips the send stage and keeps capturing.
    pub async fn ensure_connected(&mut self) -> Result<B::Dialer, ConnectFault> {
        if self.state == LinkState::Connected {
            if let Some(dialer) = &self.dialer {
                return Ok(dialer.clone());
            }
        }
        self.establish().await
    }

    /// Tear down any existing handle, then establish a new one. Teardown
    /// always runs first so no handle can leak.
    pub async fn reconnect(&mut self) -> Result<B::Dialer, ConnectFault> {
        self.dialer = None;
        self.backend.tear_down().await;
        self.state = LinkState::Disconnected;
        self.establish().await
    }

    async fn establish(&mut self) -> Result<B::Dialer, ConnectFault> {
        self.state = LinkState::Connecting;
        let dialer = match self.backend.bring_up().await {
            Ok(dialer) => dialer,
            Err(fault) => {
                self.state = LinkState::Disconnected;
                return Err(fault);
            }
        };
        // Validate before trusting: probe the collector's liveness path.
        match transport::probe(&dialer, &self.transport).await {
            Ok(()) => {
                self.dialer = Some(dialer.clone());
                self.state = LinkState::Connected;
                info!("link established and probed");
                Ok(dialer)
            }
            Err(fault) => {
                self.backend.tear_down().await;
                self.dialer = None;
                self.state = LinkState::Disconnected;
                Err(fault.into())
            }
        }
    }

    /// Account one capture round. A fully successful round resets the
    /// counter; a round with any failed send increments it. At the threshold
    /// the link is declared degraded and a reconnect is forced. The counter
    /// resets whether or not that reconnect succeeds, so a broken handle is
    /// never hammered in a tight loop.
    pub async fn record_round(&mut self, all_sends_ok: bool) {
        if all_sends_ok {
            self.consecutive_failures = 0;
            return;
        }
        self.consecutive_failures += 1;
        warn!(
            "round failed ({}/{} consecutive)",
            self.consecutive_failures, self.cfg.failure_threshold
        );
        if self.consecutive_failures >= self.cfg.failure_threshold {
            self.state = LinkState::Degraded;
            warn!("failure threshold reached, forcing reconnect");
            if let Err(fault) = self.reconnect().await {
                warn!("forced reconnect failed: {fault}");
            }
            self.consecutive_failures = 0;
        }
    }

    /// How long the loop should wait after a fully-failed round.
    pub fn backoff_delay(&self) -> Duration {
        self.cfg.backoff_base + self.cfg.backoff_step * self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::{Script, ScriptedDialer};
    use std::future::Future;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend handing out scripted dialers, counting lifecycle calls.
    struct FakeBackend {
        dialers: Vec<ScriptedDialer>,
        bring_ups: u32,
        tear_downs: Arc<AtomicU32>,
        refuse_bring_up: bool,
    }

    impl FakeBackend {
        fn new(dialers: Vec<ScriptedDialer>) -> Self {
            Self {
                dialers,
                bring_ups: 0,
                tear_downs: Arc::new(AtomicU32::new(0)),
                refuse_bring_up: false,
            }
        }
    }

    impl LinkBackend for FakeBackend {
        type Dialer = ScriptedDialer;

        fn bring_up(&mut self) -> impl Future<Output = Result<Self::Dialer, ConnectFault>> + Send {
            let result = if self.refuse_bring_up {
                Err(ConnectFault::BringUp("scripted".into()))
            } else {
                let dialer = self.dialers[self.bring_ups as usize % self.dialers.len()].clone();
                self.bring_ups += 1;
                Ok(dialer)
            };
            async move { result }
        }

        fn tear_down(&mut self) -> impl Future<Output = ()> + Send {
            self.tear_downs.fetch_add(1, Ordering::SeqCst);
            async {}
        }
    }

    fn supervisor(backend: FakeBackend) -> LinkSupervisor<FakeBackend> {
        let cfg = SupervisorConfig {
            failure_threshold: 3,
            backoff_base: Duration::from_millis(500),
            backoff_step: Duration::from_millis(250),
        };
        LinkSupervisor::new(backend, TransportConfig::default(), cfg)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_connected_probes_once_then_reuses() {
        let dialer = ScriptedDialer::always(Script::Ok200);
        let mut sup = supervisor(FakeBackend::new(vec![dialer.clone()]));
        sup.ensure_connected().await.unwrap();
        assert_eq!(sup.state(), LinkState::Connected);
        assert_eq!(dialer.request_count(), 1);
        // Already connected: no second probe.
        sup.ensure_connected().await.unwrap();
        assert_eq!(dialer.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_tears_down_and_disconnects() {
        let dialer = ScriptedDialer::always(Script::Refuse);
        let mut sup = supervisor(FakeBackend::new(vec![dialer]));
        let tear_downs = sup.backend.tear_downs.clone();
        assert!(sup.ensure_connected().await.is_err());
        assert_eq!(sup.state(), LinkState::Disconnected);
        assert_eq!(tear_downs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_resets_on_clean_round() {
        let dialer = ScriptedDialer::always(Script::Ok200);
        let mut sup = supervisor(FakeBackend::new(vec![dialer]));
        sup.record_round(false).await;
        sup.record_round(false).await;
        assert_eq!(sup.consecutive_failures(), 2);
        sup.record_round(true).await;
        assert_eq!(sup.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_fires_at_exactly_threshold() {
        let dialer = ScriptedDialer::always(Script::Ok200);
        let mut sup = supervisor(FakeBackend::new(vec![dialer]));
        let tear_downs = sup.backend.tear_downs.clone();
        sup.record_round(false).await;
        sup.record_round(false).await;
        assert_eq!(tear_downs.load(Ordering::SeqCst), 0);
        sup.record_round(false).await;
        assert_eq!(tear_downs.load(Ordering::SeqCst), 1);
        assert_eq!(sup.consecutive_failures(), 0);
        assert_eq!(sup.state(), LinkState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_resets_even_when_forced_reconnect_fails() {
        let dialer = ScriptedDialer::always(Script::Ok200);
        let mut sup = supervisor(FakeBackend::new(vec![dialer]));
        sup.backend.refuse_bring_up = true;
        for _ in 0..3 {
            sup.record_round(false).await;
        }
        assert_eq!(sup.consecutive_failures(), 0);
        assert_eq!(sup.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear_in_failures() {
        let dialer = ScriptedDialer::always(Script::Ok200);
        let mut sup = supervisor(FakeBackend::new(vec![dialer]));
        assert_eq!(sup.backoff_delay(), Duration::from_millis(500));
        sup.record_round(false).await;
        assert_eq!(sup.backoff_delay(), Duration::from_millis(750));
        sup.record_round(false).await;
        assert_eq!(sup.backoff_delay(), Duration::from_millis(1000));
    }
}
