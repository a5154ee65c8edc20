//! Link supervisor.
//!
//! One task owns the transport, `LinkState`, the router, the command
//! dispatcher and the mission transfer machine. Inbound chunks, caller
//! requests, beacon ticks and deadlines are all handled in one `select!` loop,
//! so none of that state is ever touched from two places at once. Callers talk
//! to it through a cloneable [`LinkHandle`].

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use groundlink_core::config::GroundlinkConfig;
use groundlink_core::message::Heartbeat;
use groundlink_core::wire::encode_frame;
use groundlink_core::{Endpoint, Message, MissionPlan};

use crate::command::{AckMatch, Command, CommandDispatcher};
use crate::error::{LinkError, TransferFailure};
use crate::event::{ConnectionStatus, LinkEvent, TransferCompleted, TransferOutcome};
use crate::link_state::{LinkSnapshot, LinkState};
use crate::mission_transfer::{MissionTransferMachine, TransferAction};
use crate::router::{MessageRouter, Routed};
use crate::transport::{self, ConnectionSpec, Inbound, Opened, Transport};

const REQUEST_QUEUE: usize = 64;
const EVENT_CAPACITY: usize = 1024;

/// Timing and identity for one supervisor.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub local: Endpoint,
    pub default_target: Endpoint,
    pub heartbeat_interval: Duration,
    pub stale_after: Duration,
    pub command_ack_timeout: Duration,
    pub mission_step_timeout: Duration,
    pub mission_retries: u8,
    pub connect_timeout: Duration,
}

impl From<&GroundlinkConfig> for LinkSettings {
    fn from(config: &GroundlinkConfig) -> Self {
        Self {
            local: config.identity.local(),
            default_target: config.identity.default_target(),
            heartbeat_interval: config.timing.heartbeat_interval(),
            stale_after: config.timing.stale_after(),
            command_ack_timeout: config.timing.command_ack_timeout(),
            mission_step_timeout: config.timing.mission_step_timeout(),
            mission_retries: config.timing.mission_retries,
            connect_timeout: config.timing.connect_timeout(),
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::from(&GroundlinkConfig::default())
    }
}

enum Request {
    Connect {
        spec: ConnectionSpec,
        reply: oneshot::Sender<Result<String, LinkError>>,
    },
    Attach {
        opened: Opened,
        reply: oneshot::Sender<String>,
    },
    Disconnect {
        reply: oneshot::Sender<bool>,
    },
    Command {
        command: Command,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Upload {
        plan: MissionPlan,
        reply: oneshot::Sender<Result<usize, LinkError>>,
    },
    Download {
        reply: oneshot::Sender<Result<MissionPlan, LinkError>>,
    },
    Clear {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    CancelTransfer {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
}

/// Where the result of the running transfer goes.
enum TransferReply {
    Upload(oneshot::Sender<Result<usize, LinkError>>),
    Download(oneshot::Sender<Result<MissionPlan, LinkError>>),
    Clear(oneshot::Sender<Result<(), LinkError>>),
}

impl TransferReply {
    fn resolve(self, result: Result<TransferCompleted, TransferFailure>) {
        let result = result.map_err(LinkError::from);
        // A dropped receiver means the caller gave up waiting; nothing to do.
        match self {
            TransferReply::Upload(tx) => {
                let _ = tx.send(result.map(|done| match done {
                    TransferCompleted::Uploaded { count } => count,
                    _ => 0,
                }));
            }
            TransferReply::Download(tx) => {
                let _ = tx.send(result.map(|done| match done {
                    TransferCompleted::Downloaded { plan } => plan,
                    _ => MissionPlan::default(),
                }));
            }
            TransferReply::Clear(tx) => {
                let _ = tx.send(result.map(|_| ()));
            }
        }
    }

    /// The transfer never started.
    fn reject(self, error: LinkError) {
        match self {
            TransferReply::Upload(tx) => {
                let _ = tx.send(Err(error));
            }
            TransferReply::Download(tx) => {
                let _ = tx.send(Err(error));
            }
            TransferReply::Clear(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

pub struct LinkSupervisor {
    settings: LinkSettings,
    state: LinkState,
    router: MessageRouter,
    commands: CommandDispatcher,
    missions: MissionTransferMachine,
    transport: Option<Arc<dyn Transport>>,
    inbound: Option<mpsc::Receiver<Inbound>>,
    transfer_reply: Option<TransferReply>,
    requests: mpsc::Receiver<Request>,
    events: broadcast::Sender<LinkEvent>,
    snapshot: watch::Sender<LinkSnapshot>,
    shutdown: broadcast::Receiver<()>,
}

impl LinkSupervisor {
    pub fn new(settings: LinkSettings, shutdown: broadcast::Receiver<()>) -> (Self, LinkHandle) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(LinkSnapshot::default());

        let supervisor = Self {
            state: LinkState::new(),
            router: MessageRouter::new(settings.local, settings.default_target),
            commands: CommandDispatcher::new(settings.command_ack_timeout),
            missions: MissionTransferMachine::new(
                settings.local,
                settings.mission_step_timeout,
                settings.mission_retries,
            ),
            transport: None,
            inbound: None,
            transfer_reply: None,
            requests: request_rx,
            events: events.clone(),
            snapshot: snapshot_tx,
            shutdown,
            settings,
        };
        let handle = LinkHandle {
            requests: request_tx,
            events,
            snapshot: snapshot_rx,
        };
        (supervisor, handle)
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut beacon = tokio::time::interval(self.settings.heartbeat_interval);
        beacon.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let transfer_deadline = self.missions.deadline();
            let command_deadline = self.commands.next_deadline();

            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("link supervisor shutting down");
                    self.disconnect(None).await;
                    return Ok(());
                }

                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.handle_request(request).await,
                        None => {
                            tracing::info!("all link handles dropped, supervisor exiting");
                            self.disconnect(None).await;
                            return Ok(());
                        }
                    }
                }

                inbound = next_inbound(&mut self.inbound) => {
                    self.handle_inbound(inbound).await;
                }

                _ = beacon.tick() => {
                    self.on_beacon().await;
                }

                _ = sleep_until(transfer_deadline) => {
                    let actions = self.missions.on_deadline(Instant::now());
                    self.apply_transfer_actions(actions).await;
                }

                _ = sleep_until(command_deadline) => {
                    for command in self.commands.expire(Instant::now()) {
                        tracing::debug!(%command, "command ack deadline passed");
                        self.emit(LinkEvent::CommandTimeout { command });
                    }
                }
            }

            self.publish_snapshot();
        }
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect { spec, reply } => {
                let result = self.connect(spec).await;
                let _ = reply.send(result);
            }
            Request::Attach { opened, reply } => {
                self.disconnect(None).await;
                let _ = reply.send(self.attach(opened));
            }
            Request::Disconnect { reply } => {
                let was_active = self.disconnect(None).await;
                let _ = reply.send(was_active);
            }
            Request::Command { command, reply } => {
                let _ = reply.send(self.send_command(command).await);
            }
            Request::Upload { plan, reply } => {
                let started = self
                    .require_connected()
                    .and_then(|target| self.missions.start_upload(plan, target, Instant::now()));
                self.start_transfer(started, TransferReply::Upload(reply)).await;
            }
            Request::Download { reply } => {
                let started = self
                    .require_connected()
                    .and_then(|target| self.missions.start_download(target, Instant::now()));
                self.start_transfer(started, TransferReply::Download(reply)).await;
            }
            Request::Clear { reply } => {
                let started = self
                    .require_connected()
                    .and_then(|target| self.missions.start_clear(target, Instant::now()));
                self.start_transfer(started, TransferReply::Clear(reply)).await;
            }
            Request::CancelTransfer { reply } => {
                if !self.missions.is_active() {
                    let _ = reply.send(Err(LinkError::NoTransfer));
                    return;
                }
                tracing::info!("mission transfer cancelled by caller");
                let actions = self.missions.cancel(TransferFailure::Cancelled);
                self.apply_transfer_actions(actions).await;
                let _ = reply.send(Ok(()));
            }
        }
    }

    async fn connect(&mut self, spec: ConnectionSpec) -> Result<String, LinkError> {
        self.disconnect(None).await;
        tracing::info!(%spec, "opening transport");
        match transport::open(&spec, self.settings.connect_timeout).await {
            Ok(opened) => Ok(self.attach(opened)),
            Err(e) => {
                tracing::warn!(%spec, error = %e, "failed to open transport");
                self.emit(LinkEvent::ConnectionChanged {
                    status: ConnectionStatus::Disconnected,
                    description: Some(spec.to_string()),
                    error: Some(e.to_string()),
                });
                Err(e.into())
            }
        }
    }

    fn attach(&mut self, opened: Opened) -> String {
        let description = opened.transport.describe();
        self.state.begin_connecting(description.clone());
        self.router.reset();
        self.transport = Some(opened.transport);
        self.inbound = Some(opened.inbound);
        self.emit(LinkEvent::ConnectionChanged {
            status: ConnectionStatus::Connecting,
            description: Some(description.clone()),
            error: None,
        });
        description
    }

    /// Tear the link down. Returns false if there was nothing to tear down.
    async fn disconnect(&mut self, error: Option<String>) -> bool {
        if !self.state.is_active() {
            return false;
        }
        let actions = self.missions.cancel(TransferFailure::LinkClosed);
        self.apply_transfer_actions(actions).await;
        self.commands.clear();

        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        self.inbound = None;

        let description = self.state.description().map(str::to_string);
        self.state.reset();
        self.router.reset();

        match &error {
            Some(e) => tracing::warn!(transport = ?description, error = %e, "link lost"),
            None => tracing::info!(transport = ?description, "link disconnected"),
        }
        self.emit(LinkEvent::ConnectionChanged {
            status: ConnectionStatus::Disconnected,
            description,
            error,
        });
        true
    }

    async fn send_command(&mut self, command: Command) -> Result<(), LinkError> {
        let target = self.require_connected()?;
        let message = self.commands.prepare(command, target, Instant::now());
        tracing::info!(%command, target = ?target, "sending command");
        self.send_message(&message).await
    }

    fn require_connected(&self) -> Result<Endpoint, LinkError> {
        if !self.state.is_connected() {
            return Err(LinkError::NotConnected);
        }
        Ok(self.router.target())
    }

    async fn start_transfer(&mut self, started: Result<Vec<TransferAction>, LinkError>, reply: TransferReply) {
        match started {
            Ok(actions) => {
                self.transfer_reply = Some(reply);
                self.apply_transfer_actions(actions).await;
            }
            Err(e) => reply.reject(e),
        }
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    async fn handle_inbound(&mut self, inbound: Option<Inbound>) {
        match inbound {
            Some(Inbound::Data { bytes, from }) => {
                tracing::trace!(len = bytes.len(), bytes = %hex::encode(&bytes), "inbound chunk");
                self.router.push(&bytes);
                while let Some(routed) = self.router.next() {
                    self.on_message(routed, from).await;
                }
            }
            Some(Inbound::Closed { error }) => {
                let error = error.unwrap_or_else(|| "connection closed by peer".to_string());
                self.disconnect(Some(error)).await;
            }
            None => {
                self.disconnect(Some("transport reader stopped".to_string())).await;
            }
        }
    }

    async fn on_message(&mut self, routed: Routed, from: Option<std::net::SocketAddr>) {
        let now = Instant::now();
        self.state.record_frame();

        if self.state.mark_connected(now) {
            if let (Some(addr), Some(transport)) = (from, &self.transport) {
                if self.state.latch_peer_addr(addr) {
                    transport.set_peer(addr);
                }
            }
            tracing::info!(transport = ?self.state.description(), "link connected");
            self.emit(LinkEvent::ConnectionChanged {
                status: ConnectionStatus::Connected,
                description: self.state.description().map(str::to_string),
                error: None,
            });
        }
        if let Some(peer) = routed.peer_update {
            if self.state.set_peer(peer) {
                self.emit(LinkEvent::PeerIdentified { peer });
            }
        }

        let sender = routed.sender;
        match routed.message {
            Message::Heartbeat(heartbeat) => {
                if self.router.peer().map(|p| p.system_id) == Some(sender.system_id)
                    && self.state.record_heartbeat(now)
                {
                    tracing::info!("vehicle heartbeat resumed");
                    self.emit(LinkEvent::LinkRestored);
                }
                self.emit(LinkEvent::Heartbeat {
                    from: sender,
                    armed: heartbeat.armed(),
                    mode: heartbeat.mode_name(),
                    heartbeat,
                });
            }
            Message::SysStatus(status) => self.emit(LinkEvent::SystemStatus(status)),
            Message::Attitude(attitude) => self.emit(LinkEvent::Attitude(attitude)),
            Message::GlobalPositionInt(position) => self.emit(LinkEvent::GlobalPosition(position)),
            Message::GpsRawInt(gps) => self.emit(LinkEvent::GpsRaw(gps)),
            Message::VfrHud(hud) => self.emit(LinkEvent::VfrHud(hud)),
            Message::BatteryStatus(battery) => self.emit(LinkEvent::Battery(battery)),
            Message::StatusText(text) => {
                tracing::debug!(severity = %text.severity, text = %text.text, "vehicle status text");
                self.emit(LinkEvent::StatusText(text));
            }
            Message::CommandAck(ack) => {
                if self.commands.on_ack(&ack, now) == AckMatch::Unsolicited {
                    tracing::debug!(command = %ack.command, "unsolicited command ack");
                }
                self.emit(LinkEvent::CommandAck(ack));
            }
            Message::MissionCurrent(seq) => self.emit(LinkEvent::MissionCurrent { seq }),
            message @ (Message::MissionCount(_)
            | Message::MissionRequest(_)
            | Message::MissionRequestInt(_)
            | Message::MissionItemInt(_)
            | Message::MissionAck(_)) => {
                let actions = self.missions.handle(sender, &message, now);
                self.apply_transfer_actions(actions).await;
            }
            // Station-to-vehicle messages echoed back carry nothing for us.
            Message::CommandLong(_) | Message::MissionRequestList(_) | Message::MissionClearAll(_) => {}
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    async fn on_beacon(&mut self) {
        if !self.state.is_connected() {
            return;
        }
        let beacon = Message::Heartbeat(Heartbeat::ground_station());
        if let Err(e) = self.send_message(&beacon).await {
            tracing::debug!(error = %e, "heartbeat beacon not sent");
        }
        if let Some(silent) = self.state.check_liveness(Instant::now(), self.settings.stale_after) {
            tracing::warn!(silent_for = ?silent, "no vehicle heartbeat, link stale");
            self.emit(LinkEvent::LinkStale {
                silent_for_ms: silent.as_millis() as u64,
            });
        }
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    async fn apply_transfer_actions(&mut self, actions: Vec<TransferAction>) {
        for action in actions {
            match action {
                TransferAction::Send(message) => {
                    if let Err(e) = self.send_message(&message).await {
                        tracing::warn!(error = %e, message_id = message.id(), "mission frame not sent");
                    }
                }
                TransferAction::Progress { direction, done, total } => {
                    self.emit(LinkEvent::MissionProgress { direction, done, total });
                }
                TransferAction::Finished { direction, result } => {
                    self.emit(LinkEvent::MissionTransferFinished {
                        direction,
                        outcome: TransferOutcome::from_result(&result),
                    });
                    if let Some(reply) = self.transfer_reply.take() {
                        // The caller may read the snapshot as soon as it has the result.
                        self.publish_snapshot();
                        reply.resolve(result);
                    }
                }
            }
        }
    }

    async fn send_message(&mut self, message: &Message) -> Result<(), LinkError> {
        let transport = self.transport.clone().ok_or(LinkError::NotConnected)?;
        let sequence = self.state.next_sequence();
        let frame = encode_frame(message.id(), sequence, self.settings.local, &message.encode_payload())?;
        tracing::trace!(
            message_id = message.id(),
            sequence,
            bytes = %hex::encode(&frame),
            "outbound frame"
        );
        transport.send(&frame).await?;
        Ok(())
    }

    fn emit(&self, event: LinkEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish_snapshot(&self) {
        let mut snapshot = self.state.snapshot(Instant::now(), self.router.discarded());
        snapshot.transfer = self.missions.status();
        self.snapshot.send_replace(snapshot);
    }
}

async fn next_inbound(inbound: &mut Option<mpsc::Receiver<Inbound>>) -> Option<Inbound> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cloneable front door to a running [`LinkSupervisor`].
#[derive(Clone)]
pub struct LinkHandle {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<LinkEvent>,
    snapshot: watch::Receiver<LinkSnapshot>,
}

impl LinkHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T, LinkError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .await
            .map_err(|_| LinkError::SupervisorGone)?;
        rx.await.map_err(|_| LinkError::SupervisorGone)
    }

    /// Open a transport. Returns its description.
    pub async fn connect(&self, spec: ConnectionSpec) -> Result<String, LinkError> {
        self.call(|reply| Request::Connect { spec, reply }).await?
    }

    /// Adopt an already-open transport, e.g. one half of a memory pair.
    pub async fn attach(&self, opened: Opened) -> Result<String, LinkError> {
        self.call(|reply| Request::Attach { opened, reply }).await
    }

    /// Returns false if the link was already down.
    pub async fn disconnect(&self) -> Result<bool, LinkError> {
        self.call(|reply| Request::Disconnect { reply }).await
    }

    pub async fn send_command(&self, command: Command) -> Result<(), LinkError> {
        self.call(|reply| Request::Command { command, reply }).await?
    }

    /// Upload and wait for the vehicle's final ack. Returns the item count.
    pub async fn upload_mission(&self, plan: MissionPlan) -> Result<usize, LinkError> {
        self.call(|reply| Request::Upload { plan, reply }).await?
    }

    pub async fn download_mission(&self) -> Result<MissionPlan, LinkError> {
        self.call(|reply| Request::Download { reply }).await?
    }

    pub async fn clear_mission(&self) -> Result<(), LinkError> {
        self.call(|reply| Request::Clear { reply }).await?
    }

    pub async fn cancel_transfer(&self) -> Result<(), LinkError> {
        self.call(|reply| Request::CancelTransfer { reply }).await?
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use groundlink_core::mav::{MavCmd, MavResult, MavState, MissionResult};
    use groundlink_core::message::{CommandAck, MissionAck, MissionCount, MissionItem, MissionRequest};
    use groundlink_core::mission::Waypoint;
    use groundlink_core::wire::{ids, try_decode, Decoded};

    use crate::event::TransferDirection;
    use crate::mission_transfer::Stage;
    use crate::transport::{memory_pair, MemoryPeer};

    const VEHICLE: Endpoint = Endpoint::new(1, 1);
    const LOCAL: Endpoint = Endpoint::new(255, 190);

    struct Harness {
        handle: LinkHandle,
        peer: MemoryPeer,
        events: broadcast::Receiver<LinkEvent>,
        vehicle_seq: u8,
        _shutdown: broadcast::Sender<()>,
    }

    impl Harness {
        async fn start() -> Self {
            let (shutdown, shutdown_rx) = broadcast::channel(1);
            let (supervisor, handle) = LinkSupervisor::new(LinkSettings::default(), shutdown_rx);
            tokio::spawn(supervisor.run());
            let events = handle.subscribe();

            let (opened, peer) = memory_pair();
            handle.attach(opened).await.unwrap();
            Self {
                handle,
                peer,
                events,
                vehicle_seq: 0,
                _shutdown: shutdown,
            }
        }

        /// Attach and complete the connection with one vehicle heartbeat.
        async fn connected() -> Self {
            let mut h = Self::start().await;
            h.vehicle_says(vehicle_heartbeat()).await;
            h.wait_for(|e| matches!(e, LinkEvent::ConnectionChanged { status: ConnectionStatus::Connected, .. }))
                .await;
            h
        }

        async fn vehicle_says(&mut self, message: Message) {
            let frame = encode_frame(message.id(), self.vehicle_seq, VEHICLE, &message.encode_payload()).unwrap();
            self.vehicle_seq = self.vehicle_seq.wrapping_add(1);
            assert!(self.peer.deliver(frame).await);
        }

        /// Next non-heartbeat message the station sent.
        async fn station_sent(&mut self) -> Message {
            loop {
                let bytes: Bytes = self.peer.sent.recv().await.expect("link closed");
                let Decoded::Frame(frame, _) = try_decode(&bytes) else {
                    panic!("station sent an invalid frame");
                };
                assert_eq!(frame.sender, LOCAL);
                let message = Message::decode(frame.message_id, &frame.payload).unwrap();
                if !matches!(message, Message::Heartbeat(_)) {
                    return message;
                }
            }
        }

        async fn wait_for(&mut self, pred: impl Fn(&LinkEvent) -> bool) -> LinkEvent {
            loop {
                let event = self.events.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        }

        fn drain_events(&mut self) -> Vec<LinkEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn vehicle_heartbeat() -> Message {
        Message::Heartbeat(Heartbeat {
            vehicle_type: 2,
            autopilot: 3,
            base_mode: 0x81,
            custom_mode: 3,
            system_status: MavState::Standby,
            mavlink_version: 3,
        })
    }

    fn plan(n: usize) -> MissionPlan {
        MissionPlan::new(
            (0..n)
                .map(|i| Waypoint::new(MavCmd::NavWaypoint, 47.3977418 + i as f64 * 1e-3, 8.5455938, 40.0))
                .collect(),
        )
        .unwrap()
    }

    fn request(seq: u16) -> Message {
        Message::MissionRequestInt(MissionRequest { seq, target: LOCAL })
    }

    fn item(seq: u16) -> Message {
        let mut waypoint = Waypoint::new(MavCmd::NavWaypoint, 47.0, 8.0, 10.0 + seq as f32);
        waypoint.seq = seq;
        Message::MissionItemInt(MissionItem { target: LOCAL, waypoint })
    }

    fn count(count: u16) -> Message {
        Message::MissionCount(MissionCount { count, target: LOCAL })
    }

    #[tokio::test(start_paused = true)]
    async fn beacon_starts_only_after_first_frame() {
        let mut h = Harness::start().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(h.peer.sent.try_recv().is_err());
        assert_eq!(h.handle.snapshot().status, ConnectionStatus::Connecting);

        h.vehicle_says(vehicle_heartbeat()).await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let bytes = h.peer.sent.recv().await.unwrap();
        let Decoded::Frame(frame, _) = try_decode(&bytes) else {
            panic!("invalid beacon frame");
        };
        match Message::decode(frame.message_id, &frame.payload).unwrap() {
            Message::Heartbeat(hb) => {
                assert_eq!(hb.vehicle_type, 6);
                assert_eq!(hb.autopilot, 8);
                assert_eq!(hb.base_mode, 0);
                assert_eq!(hb.mavlink_version, 3);
            }
            other => panic!("expected heartbeat, got {:?}", other),
        }
        let snapshot = h.handle.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert_eq!(snapshot.peer, Some(VEHICLE));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_warning_fires_once_and_link_stays_connected() {
        let mut h = Harness::connected().await;
        h.drain_events();

        tokio::time::sleep(Duration::from_secs(12)).await;
        let stale: Vec<_> = h
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, LinkEvent::LinkStale { .. }))
            .collect();
        assert_eq!(stale.len(), 1);
        assert!(matches!(stale[0], LinkEvent::LinkStale { silent_for_ms } if silent_for_ms >= 5000));
        assert_eq!(h.handle.snapshot().status, ConnectionStatus::Connected);
        assert!(h.handle.snapshot().stale);

        h.vehicle_says(vehicle_heartbeat()).await;
        h.wait_for(|e| matches!(e, LinkEvent::LinkRestored)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn upload_three_waypoints_on_request() {
        let mut h = Harness::connected().await;
        let handle = h.handle.clone();
        let upload = tokio::spawn(async move { handle.upload_mission(plan(3)).await });

        assert!(matches!(h.station_sent().await, Message::MissionCount(MissionCount { count: 3, .. })));
        let mut sent_items = Vec::new();
        for seq in 0..3 {
            h.vehicle_says(request(seq)).await;
            match h.station_sent().await {
                Message::MissionItemInt(item) => {
                    assert_eq!(item.target, VEHICLE);
                    sent_items.push(item.waypoint.seq);
                }
                other => panic!("expected item, got {:?}", other),
            }
        }
        h.vehicle_says(Message::MissionAck(MissionAck {
            target: LOCAL,
            result: MissionResult::Accepted,
        }))
        .await;

        assert_eq!(upload.await.unwrap().unwrap(), 3);
        assert_eq!(sent_items, vec![0, 1, 2]);
        // Nothing else went out: no duplicate items.
        tokio::task::yield_now().await;
        while let Ok(bytes) = h.peer.sent.try_recv() {
            let Decoded::Frame(frame, _) = try_decode(&bytes) else {
                panic!("invalid frame");
            };
            assert_ne!(frame.message_id, ids::MISSION_ITEM_INT);
        }
        assert!(h.handle.snapshot().transfer.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn download_with_zero_items_completes_empty() {
        let mut h = Harness::connected().await;
        let handle = h.handle.clone();
        let download = tokio::spawn(async move { handle.download_mission().await });

        assert_eq!(h.station_sent().await, Message::MissionRequestList(VEHICLE));
        h.vehicle_says(count(0)).await;
        assert!(matches!(
            h.station_sent().await,
            Message::MissionAck(MissionAck {
                result: MissionResult::Accepted,
                ..
            })
        ));
        let plan = download.await.unwrap().unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn upload_rejected_while_download_receives_items() {
        let mut h = Harness::connected().await;
        let handle = h.handle.clone();
        let download = tokio::spawn(async move { handle.download_mission().await });

        assert_eq!(h.station_sent().await, Message::MissionRequestList(VEHICLE));
        h.vehicle_says(count(2)).await;
        assert_eq!(h.station_sent().await, Message::MissionRequestInt(MissionRequest { seq: 0, target: VEHICLE }));
        h.vehicle_says(item(0)).await;
        assert_eq!(h.station_sent().await, Message::MissionRequestInt(MissionRequest { seq: 1, target: VEHICLE }));

        let err = h.handle.upload_mission(plan(1)).await.unwrap_err();
        assert!(matches!(err, LinkError::TransferInProgress));
        let transfer = h.handle.snapshot().transfer.unwrap();
        assert_eq!(transfer.direction, TransferDirection::Download);
        assert_eq!(transfer.stage, Stage::ReceivingItems { remaining: 1 });
        assert_eq!(transfer.done, 1);

        h.vehicle_says(item(1)).await;
        let plan = download.await.unwrap().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.items()[1].altitude, 11.0);
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_times_out_after_one_resend() {
        let mut h = Harness::connected().await;
        let handle = h.handle.clone();
        let download = tokio::spawn(async move { handle.download_mission().await });

        assert_eq!(h.station_sent().await, Message::MissionRequestList(VEHICLE));
        // Keep the link alive while ignoring the request.
        assert_eq!(h.station_sent().await, Message::MissionRequestList(VEHICLE));
        let err = download.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            LinkError::Transfer(TransferFailure::Timeout { stage: "mission count" })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent_and_fails_transfer() {
        let mut h = Harness::connected().await;
        let handle = h.handle.clone();
        let download = tokio::spawn(async move { handle.download_mission().await });
        assert_eq!(h.station_sent().await, Message::MissionRequestList(VEHICLE));

        assert!(h.handle.disconnect().await.unwrap());
        assert!(matches!(
            download.await.unwrap(),
            Err(LinkError::Transfer(TransferFailure::LinkClosed))
        ));
        assert!(!h.handle.disconnect().await.unwrap());

        let snapshot = h.handle.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
        assert_eq!(snapshot.peer, None);
        assert!(matches!(
            h.handle.send_command(Command::Arm).await,
            Err(LinkError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn command_ack_is_reported_and_missing_ack_times_out() {
        let mut h = Harness::connected().await;

        h.handle.send_command(Command::Arm).await.unwrap();
        match h.station_sent().await {
            Message::CommandLong(long) => {
                assert_eq!(long.command, MavCmd::ComponentArmDisarm);
                assert_eq!(long.params[0], 1.0);
                assert_eq!(long.target, VEHICLE);
            }
            other => panic!("expected command, got {:?}", other),
        }
        h.vehicle_says(Message::CommandAck(CommandAck {
            command: MavCmd::ComponentArmDisarm,
            result: MavResult::Accepted,
        }))
        .await;
        h.wait_for(|e| matches!(e, LinkEvent::CommandAck(ack) if ack.result == MavResult::Accepted))
            .await;

        h.handle.send_command(Command::Land).await.unwrap();
        let event = h
            .wait_for(|e| matches!(e, LinkEvent::CommandTimeout { .. }))
            .await;
        assert_eq!(event, LinkEvent::CommandTimeout { command: MavCmd::NavLand });
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_disconnects_with_error() {
        let mut h = Harness::connected().await;
        h.peer.hang_up(Some("device unplugged")).await;
        let event = h
            .wait_for(|e| matches!(e, LinkEvent::ConnectionChanged { status: ConnectionStatus::Disconnected, .. }))
            .await;
        match event {
            LinkEvent::ConnectionChanged { error, description, .. } => {
                assert_eq!(error.as_deref(), Some("device unplugged"));
                assert_eq!(description.as_deref(), Some("memory"));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn transfers_require_a_connected_link() {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let (supervisor, handle) = LinkSupervisor::new(LinkSettings::default(), shutdown_rx);
        let task = tokio::spawn(supervisor.run());

        assert!(matches!(handle.download_mission().await, Err(LinkError::NotConnected)));
        assert!(matches!(handle.cancel_transfer().await, Err(LinkError::NoTransfer)));

        shutdown.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(matches!(handle.clear_mission().await, Err(LinkError::SupervisorGone)));
    }
}
