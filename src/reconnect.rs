use crate::ledger::{ConnectionIdentity, IdentityLedger};
use crate::model::{LinkSignal, SyncMessage};
use crate::transport::{Frame, WatchTransport};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const NORMAL_CLOSURE: u16 = 1000;
pub const GOING_AWAY: u16 = 1001;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CloseKind {
    Clean,
    Dirty,
}

impl CloseKind {
    pub fn from_code(code: Option<u16>) -> Self {
        match code {
            Some(NORMAL_CLOSURE | GOING_AWAY) => Self::Clean,
            _ => Self::Dirty,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed(CloseKind),
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "live",
            Self::Closed(CloseKind::Clean) => "closed",
            Self::Closed(CloseKind::Dirty) => "reconnecting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_secs_f64();
        let cap = self.max_delay.max(self.initial_delay).as_secs_f64();
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        let scaled = initial * multiplier.powi(attempt.min(32) as i32);
        Duration::from_secs_f64(scaled.min(cap))
    }
}

/// Owns the single watch connection slot of one synchronizer: the connection
/// task, the pending reconnect timer, and the identity ledger that fences
/// both.
pub struct ReconnectManager<T> {
    ledger: IdentityLedger,
    state: ConnectionState,
    policy: ReconnectPolicy,
    attempt: u32,
    transport: Arc<dyn WatchTransport>,
    tx: mpsc::UnboundedSender<SyncMessage<T>>,
    connection: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
    pending_retry: Option<ConnectionIdentity>,
}

impl<T: Send + 'static> ReconnectManager<T> {
    pub fn new(
        transport: Arc<dyn WatchTransport>,
        tx: mpsc::UnboundedSender<SyncMessage<T>>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            ledger: IdentityLedger::default(),
            state: ConnectionState::Idle,
            policy,
            attempt: 0,
            transport,
            tx,
            connection: None,
            retry_timer: None,
            pending_retry: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_policy(&mut self, policy: ReconnectPolicy) {
        self.policy = policy;
    }

    pub fn current_identity(&self) -> Option<&ConnectionIdentity> {
        self.ledger.current()
    }

    /// Opens a connection for `target` after `delay`, replacing whatever was
    /// there. Returns `false` when a connection for `target` is already
    /// opening or open.
    pub fn connect(&mut self, target: &str, delay: Duration) -> bool {
        if self.holds(target)
            && matches!(self.state, ConnectionState::Connecting | ConnectionState::Open)
        {
            return false;
        }
        self.reconnect(target, delay);
        true
    }

    /// Opens a fresh connection for `target` after `delay`, closing the
    /// current one even when it is live.
    pub fn reconnect(&mut self, target: &str, delay: Duration) {
        let same_target = self.holds(target);
        self.release_slot();
        if !same_target {
            self.attempt = 0;
        }

        let identity = self.ledger.mint(target);
        info!("opening watch connection {identity}");
        self.state = ConnectionState::Connecting;
        self.connection = Some(spawn_connection(
            Arc::clone(&self.transport),
            identity,
            delay,
            self.tx.clone(),
        ));
    }

    fn holds(&self, target: &str) -> bool {
        self.current_identity()
            .is_some_and(|identity| identity.target() == target)
    }

    pub fn on_open(&mut self, identity: &ConnectionIdentity) -> bool {
        if !self.ledger.mark_open(identity) {
            debug!("ignoring open from superseded connection {identity}");
            return false;
        }
        info!("watch connection {identity} is live");
        self.state = ConnectionState::Open;
        self.attempt = 0;
        true
    }

    /// Whether a message from `identity` may touch shared state.
    pub fn accepts(&self, identity: &ConnectionIdentity) -> bool {
        self.ledger.is_live(identity)
    }

    pub fn on_error(&mut self, identity: &ConnectionIdentity, error: &str) {
        if !self.ledger.mark_not_open(identity) {
            debug!("ignoring error from superseded connection {identity}: {error}");
            return;
        }
        warn!("watch connection {identity} failed: {error}");
    }

    /// Records a close and returns the delay of the reconnect it scheduled.
    pub fn on_close(
        &mut self,
        identity: &ConnectionIdentity,
        code: Option<u16>,
        target_active: bool,
    ) -> Option<Duration> {
        if !self.ledger.mark_not_open(identity) {
            debug!("ignoring close from superseded connection {identity}");
            return None;
        }

        let kind = CloseKind::from_code(code);
        self.state = ConnectionState::Closed(kind);
        if let Some(task) = self.connection.take() {
            task.abort();
        }
        if kind == CloseKind::Clean {
            info!("watch connection {identity} closed cleanly ({code:?})");
            return None;
        }
        if !target_active {
            debug!("not reconnecting {identity}: target no longer active");
            return None;
        }
        if self.reconnect_pending() {
            return None;
        }

        let delay = self.policy.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        warn!(
            "watch connection {identity} closed abnormally ({code:?}), retrying in {:.1}s",
            delay.as_secs_f64()
        );
        self.pending_retry = Some(identity.clone());
        let tx = self.tx.clone();
        let due = identity.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SyncMessage::ReconnectDue { identity: due });
        }));
        Some(delay)
    }

    /// Consumes a fired reconnect timer, returning the target to reconnect.
    pub fn take_due(&mut self, identity: &ConnectionIdentity) -> Option<String> {
        if self.pending_retry.as_ref() != Some(identity) || !self.ledger.is_current(identity) {
            debug!("ignoring stale reconnect timer for {identity}");
            return None;
        }
        self.pending_retry = None;
        self.retry_timer = None;
        Some(identity.target().to_string())
    }

    /// Closes the connection and clears any pending reconnect.
    pub fn shutdown(&mut self) {
        self.release_slot();
        self.state = ConnectionState::Idle;
        self.attempt = 0;
    }

    fn reconnect_pending(&self) -> bool {
        self.pending_retry.is_some()
    }

    fn release_slot(&mut self) {
        if let Some(task) = self.retry_timer.take() {
            task.abort();
        }
        self.pending_retry = None;

        if let Some(task) = self.connection.take() {
            task.abort();
        }
        if let Some(identity) = self.ledger.retire() {
            debug!("retired watch connection {identity}");
        }
    }
}

impl<T> Drop for ReconnectManager<T> {
    fn drop(&mut self) {
        if let Some(task) = self.retry_timer.take() {
            task.abort();
        }
        if let Some(task) = self.connection.take() {
            task.abort();
        }
    }
}

fn spawn_connection<T: Send + 'static>(
    transport: Arc<dyn WatchTransport>,
    identity: ConnectionIdentity,
    delay: Duration,
    tx: mpsc::UnboundedSender<SyncMessage<T>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let send = |signal: LinkSignal| {
            tx.send(SyncMessage::Link {
                identity: identity.clone(),
                signal,
            })
            .is_ok()
        };

        let mut frames = match transport.open(identity.target()).await {
            Ok(frames) => frames,
            Err(error) => {
                send(LinkSignal::Error(format!("{error:#}")));
                send(LinkSignal::Closed(None));
                return;
            }
        };
        if !send(LinkSignal::Opened) {
            return;
        }

        while let Some(frame) = frames.next().await {
            match frame {
                Frame::Text(text) => {
                    if !send(LinkSignal::Message(text)) {
                        return;
                    }
                }
                Frame::Failed(error) => {
                    send(LinkSignal::Error(error));
                    break;
                }
                Frame::Closed(code) => {
                    send(LinkSignal::Closed(code));
                    return;
                }
            }
        }
        send(LinkSignal::Closed(None));
    })
}
