use std::sync::Arc;

use cadence_core::{ClientEvent, ServerEvent};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::error::ChannelError;
use crate::policy::ReconnectPolicy;
use crate::state::{ChannelPhase, ConnectivityState};
use crate::transport::{Connector, FrameChannel, WebSocketConnector};

/// Messages from the manager to its driver task.
#[derive(Debug)]
enum Control {
    Reconnect,
    Shutdown,
}

struct Driver {
    control: mpsc::UnboundedSender<Control>,
    handle: JoinHandle<()>,
}

/// Owns the single connection to the worker.
///
/// All methods take `&self`; share it with `Arc`. Inbound events have one
/// consumer, reading through [`ChannelManager::recv`].
pub struct ChannelManager {
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    state: Arc<watch::Sender<ConnectivityState>>,
    outbound: Arc<Mutex<Option<mpsc::Sender<String>>>>,
    inbound_tx: mpsc::UnboundedSender<ServerEvent>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerEvent>>,
    driver: Mutex<Option<Driver>>,
}

impl ChannelManager {
    pub fn new(policy: ReconnectPolicy, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectivityState::default());
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            policy,
            connector,
            state: Arc::new(state),
            outbound: Arc::new(Mutex::new(None)),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            driver: Mutex::new(None),
        }
    }

    pub fn websocket(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self::new(policy, Arc::new(WebSocketConnector::new(url)))
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Start dialing in the background. Calling it again while the driver
    /// runs is a no-op. Must be called inside a Tokio runtime.
    pub fn connect(&self) {
        let mut driver = self.driver.lock();
        if driver.as_ref().is_some_and(|d| !d.handle.is_finished()) {
            return;
        }
        *driver = Some(self.spawn_driver());
    }

    /// Ask for a fresh round of attempts, e.g. after the channel gave up.
    pub fn reconnect(&self) {
        let mut driver = self.driver.lock();
        match driver.as_ref() {
            Some(d) if !d.handle.is_finished() => {
                let _ = d.control.send(Control::Reconnect);
            }
            _ => *driver = Some(self.spawn_driver()),
        }
    }

    /// Close the connection and stop retrying.
    ///
    /// Resolves once the driver has exited and published `Idle`, so no
    /// late `Connected` can follow.
    pub async fn disconnect(&self) {
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            let _ = driver.control.send(Control::Shutdown);
            if let Err(e) = driver.handle.await {
                warn!(error = %e, "channel driver ended abnormally");
            }
        }
        info!("channel disconnected by request");
    }

    /// Queue one event for the worker. Fails immediately when not connected.
    pub fn send(&self, event: &ClientEvent) -> Result<(), ChannelError> {
        let frame = event.encode()?;
        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return Err(ChannelError::NotConnected);
        };
        match tx.try_send(frame) {
            Ok(()) => {
                trace!(event = event.name(), "queued outbound event");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(ChannelError::SendQueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ChannelError::NotConnected),
        }
    }

    /// Next inbound event in arrival order.
    ///
    /// Returns `None` once nothing buffered remains and the channel is
    /// dormant (never connected, disconnected, or out of retries).
    pub async fn recv(&self) -> Option<ServerEvent> {
        let mut inbound = self.inbound_rx.lock().await;
        let mut state = self.state.subscribe();
        loop {
            if let Ok(event) = inbound.try_recv() {
                return Some(event);
            }
            if state.borrow_and_update().phase.is_dormant() {
                return None;
            }
            tokio::select! {
                event = inbound.recv() => return event,
                changed = state.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    fn spawn_driver(&self) -> Driver {
        let (control, control_rx) = mpsc::unbounded_channel();
        let task = DriverTask {
            policy: self.policy.clone(),
            connector: Arc::clone(&self.connector),
            state: Arc::clone(&self.state),
            outbound: Arc::clone(&self.outbound),
            inbound: self.inbound_tx.clone(),
        };
        info!(target_url = %self.connector.describe(), "starting channel driver");
        Driver {
            control,
            handle: tokio::spawn(task.run(control_rx)),
        }
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.handle.abort();
        }
    }
}

enum Served {
    Lost,
    Shutdown,
}

/// Clears the outbound queue and publishes `Idle` when the driver stops,
/// whether it returned or was aborted.
struct IdleOnExit {
    state: Arc<watch::Sender<ConnectivityState>>,
    outbound: Arc<Mutex<Option<mpsc::Sender<String>>>>,
}

impl Drop for IdleOnExit {
    fn drop(&mut self) {
        *self.outbound.lock() = None;
        let _ = self.state.send_replace(ConnectivityState::default());
    }
}

/// Connection state machine: connecting → connected → disconnected → …
struct DriverTask {
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    state: Arc<watch::Sender<ConnectivityState>>,
    outbound: Arc<Mutex<Option<mpsc::Sender<String>>>>,
    inbound: mpsc::UnboundedSender<ServerEvent>,
}

impl DriverTask {
    async fn run(self, mut control: mpsc::UnboundedReceiver<Control>) {
        let _exit = IdleOnExit {
            state: Arc::clone(&self.state),
            outbound: Arc::clone(&self.outbound),
        };
        let mut attempts: u32 = 0;
        loop {
            self.publish(ChannelPhase::Connecting, attempts);
            let dialed = tokio::select! {
                dialed = self.connector.connect() => dialed,
                ctl = control.recv() => match ctl {
                    Some(Control::Reconnect) => continue,
                    Some(Control::Shutdown) | None => break,
                },
            };
            match dialed {
                Ok(frames) => {
                    info!(attempts, "channel connected");
                    attempts = 0;
                    match self.serve(frames, &mut control).await {
                        Served::Lost => warn!("channel connection lost"),
                        Served::Shutdown => break,
                    }
                }
                Err(e) => warn!(attempts, error = %e, "channel dial failed"),
            }

            if attempts >= self.policy.max_attempts {
                warn!(attempts, "reconnect attempts exhausted");
                self.publish(ChannelPhase::GaveUp, attempts);
                match control.recv().await {
                    Some(Control::Reconnect) => {
                        info!("reconnect requested");
                        attempts = 0;
                        continue;
                    }
                    Some(Control::Shutdown) | None => break,
                }
            }

            self.publish(ChannelPhase::Disconnected, attempts);
            attempts += 1;
            tokio::select! {
                () = tokio::time::sleep(self.policy.delay) => {}
                ctl = control.recv() => match ctl {
                    Some(Control::Reconnect) => debug!("reconnect requested during backoff"),
                    Some(Control::Shutdown) | None => break,
                },
            }
        }
    }

    async fn serve(
        &self,
        frames: FrameChannel,
        control: &mut mpsc::UnboundedReceiver<Control>,
    ) -> Served {
        let FrameChannel {
            mut sink,
            mut stream,
        } = frames;
        let (tx, mut rx) = mpsc::channel::<String>(self.policy.send_queue.max(1));
        *self.outbound.lock() = Some(tx);
        self.publish(ChannelPhase::Connected, 0);

        let period = self.policy.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let served = loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else { break Served::Lost };
                    if let Err(e) = sink.send(frame).await {
                        warn!(error = %e, "failed to write frame");
                        break Served::Lost;
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(frame)) => self.deliver(&frame),
                    Some(Err(e)) => {
                        warn!(error = %e, "failed to read frame");
                        break Served::Lost;
                    }
                    None => break Served::Lost,
                },
                _ = heartbeat.tick() => {
                    let ping = ClientEvent::Ping { timestamp: Utc::now() };
                    let Ok(frame) = ping.encode() else { continue };
                    if sink.send(frame).await.is_err() {
                        break Served::Lost;
                    }
                    trace!("sent heartbeat");
                }
                ctl = control.recv() => match ctl {
                    Some(Control::Reconnect) => {}
                    Some(Control::Shutdown) | None => break Served::Shutdown,
                },
            }
        };

        // Anything still queued belonged to this connection only.
        *self.outbound.lock() = None;
        if matches!(served, Served::Shutdown) {
            let _ = sink.close().await;
        }
        served
    }

    fn deliver(&self, frame: &str) {
        match ServerEvent::decode(frame) {
            Ok(event) => {
                trace!(event = event.name(), "inbound event");
                let _ = self.inbound.send(event);
            }
            Err(e) => warn!(error = %e, frame_len = frame.len(), "skipping undecodable frame"),
        }
    }

    fn publish(&self, phase: ChannelPhase, attempts: u32) {
        let _ = self.state.send_replace(ConnectivityState { phase, attempts });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Dial, MemoryConnector, RemotePeer};
    use assert_matches::assert_matches;
    use cadence_core::{Completion, ProgressStage, ProgressUpdate, SessionId};
    use std::time::Duration;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_secs(30),
            send_queue: 8,
        }
    }

    async fn wait_for_phase(manager: &ChannelManager, phase: ChannelPhase) {
        let mut rx = manager.subscribe();
        let _ = rx.wait_for(|s| s.phase == phase).await.unwrap();
    }

    async fn connected() -> (
        ChannelManager,
        Arc<MemoryConnector>,
        mpsc::UnboundedReceiver<RemotePeer>,
        RemotePeer,
    ) {
        let (connector, mut peers) = MemoryConnector::new();
        let manager = ChannelManager::new(policy(), connector.clone());
        manager.connect();
        let peer = peers.recv().await.unwrap();
        wait_for_phase(&manager, ChannelPhase::Connected).await;
        (manager, connector, peers, peer)
    }

    fn ping() -> ClientEvent {
        ClientEvent::Ping {
            timestamp: Utc::now(),
        }
    }

    fn progress(value: u16) -> ServerEvent {
        ServerEvent::Progress(ProgressUpdate {
            session_id: SessionId::from_raw("job_x"),
            stage: ProgressStage::Generating,
            progress: value,
            message: String::new(),
        })
    }

    #[tokio::test]
    async fn send_before_connect_is_not_connected() {
        let (connector, _peers) = MemoryConnector::new();
        let manager = ChannelManager::new(policy(), connector);
        assert!(!manager.is_connected());
        assert_matches!(manager.send(&ping()), Err(ChannelError::NotConnected));
    }

    #[tokio::test]
    async fn recv_before_connect_returns_none() {
        let (connector, _peers) = MemoryConnector::new();
        let manager = ChannelManager::new(policy(), connector);
        assert!(manager.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sent_events_reach_the_peer() {
        let (manager, _connector, _peers, mut peer) = connected().await;
        assert!(manager.is_connected());
        manager.send(&ping()).unwrap();
        let frame = peer.next_frame().await.unwrap();
        assert!(frame.contains("\"event\":\"ping\""));
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_events_arrive_in_order_and_garbage_is_skipped() {
        let (manager, _connector, _peers, peer) = connected().await;
        peer.push(&progress(10)).unwrap();
        peer.push_raw("not json");
        peer.push(&progress(20)).unwrap();
        peer.push(&ServerEvent::Complete(Completion {
            session_id: SessionId::from_raw("job_x"),
            artifact_id: "f".into(),
            filename: "f.mid".into(),
            file_size_bytes: 3,
            download_reference: String::new(),
        }))
        .unwrap();

        assert_eq!(manager.recv().await, Some(progress(10)));
        assert_eq!(manager.recv().await, Some(progress(20)));
        assert_matches!(manager.recv().await, Some(ServerEvent::Complete(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_reconnects_after_fixed_delay() {
        let (manager, connector, mut peers, peer) = connected().await;
        let lost_at = Instant::now();
        drop(peer);

        wait_for_phase(&manager, ChannelPhase::Disconnected).await;
        assert_matches!(manager.send(&ping()), Err(ChannelError::NotConnected));

        let _peer = peers.recv().await.unwrap();
        wait_for_phase(&manager, ChannelPhase::Connected).await;
        let elapsed = lost_at.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(2000), "elapsed {elapsed:?}");
        assert_eq!(connector.dials(), 2);
        assert_eq!(manager.state().attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded_then_reconnect_restarts() {
        let (connector, mut peers) = MemoryConnector::new();
        connector.refuse_next(6);
        let manager = ChannelManager::new(policy(), connector.clone());
        let started = Instant::now();
        manager.connect();

        wait_for_phase(&manager, ChannelPhase::GaveUp).await;
        assert_eq!(connector.dials(), 6);
        assert_eq!(manager.state().attempts, 5);
        assert!(!manager.is_connected());
        // Five fixed gaps, no growth.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(5000), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(5100), "elapsed {elapsed:?}");

        // Stays down on its own.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.dials(), 6);
        assert_eq!(manager.state().phase, ChannelPhase::GaveUp);

        manager.reconnect();
        let _peer = peers.recv().await.unwrap();
        wait_for_phase(&manager, ChannelPhase::Connected).await;
        assert_eq!(connector.dials(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn recv_ends_when_channel_gives_up() {
        let (connector, _peers) = MemoryConnector::new();
        connector.script([Dial::Refuse; 6]);
        let manager = ChannelManager::new(policy(), connector);
        manager.connect();
        assert!(manager.recv().await.is_none());
        assert_eq!(manager.state().phase, ChannelPhase::GaveUp);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_pings_while_connected() {
        let (_manager, _connector, _peers, mut peer) = connected().await;
        tokio::time::advance(Duration::from_secs(31)).await;
        let frame = peer.next_frame().await.unwrap();
        assert!(frame.contains("\"event\":\"ping\""));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_stops_everything() {
        let (manager, connector, _peers, mut peer) = connected().await;
        manager.disconnect().await;
        assert_eq!(manager.state().phase, ChannelPhase::Idle);
        assert_matches!(manager.send(&ping()), Err(ChannelError::NotConnected));
        assert!(manager.recv().await.is_none());
        assert!(peer.next_frame().await.is_none());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.dials(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_while_dialing_settles_idle() {
        let (connector, _peers) = MemoryConnector::new();
        connector.script([Dial::Hang]);
        let manager = ChannelManager::new(policy(), connector.clone());
        manager.connect();
        wait_for_phase(&manager, ChannelPhase::Connecting).await;

        manager.disconnect().await;
        assert_eq!(manager.state().phase, ChannelPhase::Idle);
        assert!(manager.recv().await.is_none());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(manager.state().phase, ChannelPhase::Idle);
        assert_eq!(connector.dials(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_manager_publishes_idle() {
        let (manager, _connector, _peers, _peer) = connected().await;
        let mut state = manager.subscribe();
        let _ = state.borrow_and_update();
        drop(manager);
        let _ = tokio::time::timeout(Duration::from_secs(1), state.changed()).await;
        assert_eq!(state.borrow().phase, ChannelPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_reports_back_pressure() {
        let (connector, mut peers) = MemoryConnector::new();
        let manager = ChannelManager::new(
            ReconnectPolicy {
                send_queue: 1,
                ..policy()
            },
            connector,
        );
        manager.connect();
        let _peer = peers.recv().await.unwrap();
        wait_for_phase(&manager, ChannelPhase::Connected).await;
        // No await between sends: the driver cannot drain on this thread.
        manager.send(&ping()).unwrap();
        assert_matches!(manager.send(&ping()), Err(ChannelError::SendQueueFull));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_twice_keeps_one_driver() {
        let (manager, connector, _peers, _peer) = connected().await;
        manager.connect();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.dials(), 1);
        assert!(manager.is_connected());
    }
}
