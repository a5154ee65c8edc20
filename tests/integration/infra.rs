//! Simulated autopilot and ground-station helpers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use groundlink_core::mav::{
    MavCmd, MavResult, MavState, MissionResult, Severity, MODE_FLAG_CUSTOM_MODE_ENABLED,
    MODE_FLAG_SAFETY_ARMED,
};
use groundlink_core::message::{
    Attitude, CommandAck, CommandLong, GlobalPosition, Heartbeat, MissionAck, MissionCount,
    MissionItem, MissionRequest, StatusText,
};
use groundlink_core::wire::encode_frame;
use groundlink_core::{Endpoint, FrameReader, Message, Waypoint};
use groundlink_services::event::ConnectionStatus;
use groundlink_services::{ConnectionSpec, LinkEvent, LinkHandle, LinkSettings, LinkSupervisor};

pub const VEHICLE: Endpoint = Endpoint::new(1, 1);
pub const STATION: Endpoint = Endpoint::new(255, 190);

/// Upper bound on any single wait for an event.
pub const EVENT_WAIT: Duration = Duration::from_secs(5);

/// Copter stabilize and loiter custom modes.
pub const MODE_STABILIZE: u32 = 0;
pub const MODE_LOITER: u32 = 5;

// ── Station ───────────────────────────────────────────────────────────────────

/// Short timings so failure paths finish quickly.
pub fn station_settings() -> LinkSettings {
    LinkSettings {
        local: STATION,
        default_target: VEHICLE,
        heartbeat_interval: Duration::from_millis(100),
        stale_after: Duration::from_millis(600),
        command_ack_timeout: Duration::from_millis(400),
        mission_step_timeout: Duration::from_millis(400),
        mission_retries: 1,
        connect_timeout: Duration::from_secs(2),
    }
}

/// A running link supervisor plus an event subscription.
pub struct Station {
    pub link: LinkHandle,
    pub events: broadcast::Receiver<LinkEvent>,
    _shutdown: broadcast::Sender<()>,
}

impl Station {
    pub fn start() -> Self {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let (supervisor, link) = LinkSupervisor::new(station_settings(), shutdown_rx);
        tokio::spawn(supervisor.run());
        let events = link.subscribe();
        Self {
            link,
            events,
            _shutdown: shutdown,
        }
    }

    /// Next event matching `pred`, skipping everything else.
    pub async fn wait_for(
        &mut self,
        what: &str,
        pred: impl Fn(&LinkEvent) -> bool,
    ) -> Result<LinkEvent> {
        let events = &mut self.events;
        tokio::time::timeout(EVENT_WAIT, async move {
            loop {
                match events.recv().await {
                    Ok(event) if pred(&event) => return Ok(event),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => bail!("event stream closed"),
                }
            }
        })
        .await
        .with_context(|| format!("timed out waiting for {what}"))?
    }

    pub async fn wait_connected(&mut self) -> Result<()> {
        self.wait_for("connection", |e| {
            matches!(
                e,
                LinkEvent::ConnectionChanged {
                    status: ConnectionStatus::Connected,
                    ..
                }
            )
        })
        .await
        .map(|_| ())
    }
}

/// Station and vehicle talking over loopback UDP, link already connected.
pub async fn udp_pair(options: SimOptions) -> Result<(Station, SimVehicle)> {
    let port = free_udp_port()?;
    let mut station = Station::start();
    station.link.connect(ConnectionSpec::Udp { port }).await?;
    let vehicle = SimVehicle::udp(port, options).await?;
    station.wait_connected().await?;
    Ok((station, vehicle))
}

/// Station and vehicle talking over loopback TCP, link already connected.
pub async fn tcp_pair(options: SimOptions) -> Result<(Station, SimVehicle)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let mut station = Station::start();
    station
        .link
        .connect(ConnectionSpec::Tcp {
            host: "127.0.0.1".into(),
            port,
        })
        .await?;
    let vehicle = SimVehicle::accept(&listener, options).await?;
    station.wait_connected().await?;
    Ok((station, vehicle))
}

pub fn free_udp_port() -> Result<u16> {
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").context("failed to probe for a port")?;
    Ok(probe.local_addr()?.port())
}

pub fn waypoint(command: MavCmd, lat: f64, lon: f64, alt: f32) -> Waypoint {
    Waypoint::new(command, lat, lon, alt)
}

// ── Simulated autopilot ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SimOptions {
    /// Never answer COMMAND_LONG.
    pub ignore_commands: bool,
    /// Answer every MISSION_COUNT with this result instead of requesting items.
    pub reject_uploads: Option<MissionResult>,
    /// Keep the connection open and keep talking, but never read from it.
    pub deaf: bool,
}

/// What the vehicle has seen and holds, for assertions.
#[derive(Debug, Clone, Default)]
pub struct SimState {
    pub armed: bool,
    pub custom_mode: u32,
    pub mission: Vec<Waypoint>,
    pub commands: Vec<CommandLong>,
    /// MISSION_ITEM_INT frames received, duplicates included.
    pub items_received: usize,
    pub clears: usize,
}

pub struct SimVehicle {
    state: Arc<Mutex<SimState>>,
    silent: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SimVehicle {
    /// Vehicle on an ephemeral loopback port sending to the station's `port`.
    pub async fn udp(station_port: u16, options: SimOptions) -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        socket
            .connect(SocketAddr::from(([127, 0, 0, 1], station_port)))
            .await?;
        Ok(Self::spawn(SimIo::Udp(socket), options))
    }

    pub async fn accept(listener: &TcpListener, options: SimOptions) -> Result<Self> {
        let (stream, _) = tokio::time::timeout(EVENT_WAIT, listener.accept())
            .await
            .context("station never connected")??;
        let (read, write) = stream.into_split();
        Ok(Self::spawn(SimIo::Tcp(read, write), options))
    }

    fn spawn(io: SimIo, options: SimOptions) -> Self {
        let state = Arc::new(Mutex::new(SimState::default()));
        let silent = Arc::new(AtomicBool::new(false));
        let autopilot = Autopilot {
            io,
            reader: FrameReader::new(),
            sequence: 0,
            state: state.clone(),
            silent: silent.clone(),
            options,
            upload: None,
            announced: false,
            boot: tokio::time::Instant::now(),
        };
        let task = tokio::spawn(autopilot.run());
        Self {
            state,
            silent,
            task,
        }
    }

    pub fn state(&self) -> SimState {
        self.state.lock().unwrap().clone()
    }

    /// Stop (or resume) all periodic traffic. Requests are still answered.
    pub fn go_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    /// Drop the vehicle's socket.
    pub fn hang_up(self) {
        self.task.abort();
    }
}

impl Drop for SimVehicle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum SimIo {
    Udp(UdpSocket),
    Tcp(OwnedReadHalf, OwnedWriteHalf),
}

impl SimIo {
    async fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            SimIo::Udp(socket) => socket.recv(buf).await,
            SimIo::Tcp(read, _) => read.read(buf).await,
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            SimIo::Udp(socket) => socket.send(bytes).await.map(|_| ()),
            SimIo::Tcp(_, write) => write.write_all(bytes).await,
        }
    }
}

struct UploadInProgress {
    expected: u16,
    items: Vec<Waypoint>,
}

struct Autopilot {
    io: SimIo,
    reader: FrameReader,
    sequence: u8,
    state: Arc<Mutex<SimState>>,
    silent: Arc<AtomicBool>,
    options: SimOptions,
    upload: Option<UploadInProgress>,
    announced: bool,
    boot: tokio::time::Instant,
}

impl Autopilot {
    async fn run(mut self) {
        let mut beacon = tokio::time::interval(Duration::from_millis(100));
        let mut buf = vec![0u8; 2048];
        loop {
            tokio::select! {
                _ = beacon.tick() => {
                    if !self.silent.load(Ordering::SeqCst) && self.beacon().await.is_err() {
                        return;
                    }
                }

                n = self.io.recv(&mut buf), if !self.options.deaf => {
                    let n = match n {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    self.reader.push(&buf[..n]);
                    while let Some(frame) = self.reader.next_frame() {
                        let Ok(message) = Message::decode(frame.message_id, &frame.payload) else {
                            continue;
                        };
                        if self.handle(frame.sender, message).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn say(&mut self, message: Message) -> Result<()> {
        let frame = encode_frame(message.id(), self.sequence, VEHICLE, &message.encode_payload())?;
        self.sequence = self.sequence.wrapping_add(1);
        self.io.send(&frame).await?;
        Ok(())
    }

    async fn beacon(&mut self) -> Result<()> {
        let (armed, custom_mode) = {
            let s = self.state.lock().unwrap();
            (s.armed, s.custom_mode)
        };
        let mut base_mode = MODE_FLAG_CUSTOM_MODE_ENABLED;
        if armed {
            base_mode |= MODE_FLAG_SAFETY_ARMED;
        }
        self.say(Message::Heartbeat(Heartbeat {
            vehicle_type: 2,
            autopilot: 3,
            base_mode,
            custom_mode,
            system_status: if armed { MavState::Active } else { MavState::Standby },
            mavlink_version: 3,
        }))
        .await?;

        let time_boot_ms = self.boot.elapsed().as_millis() as u32;
        self.say(Message::Attitude(Attitude {
            time_boot_ms,
            roll: 0.05,
            pitch: -0.02,
            yaw: 1.2,
            rollspeed: 0.0,
            pitchspeed: 0.0,
            yawspeed: 0.0,
        }))
        .await?;
        self.say(Message::GlobalPositionInt(GlobalPosition {
            time_boot_ms,
            latitude: 47.3977418,
            longitude: 8.5455938,
            altitude: 488.0,
            relative_altitude: 0.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            heading: Some(68.0),
        }))
        .await?;

        if !self.announced {
            self.announced = true;
            self.say(Message::StatusText(StatusText {
                severity: Severity::Info,
                text: "sim autopilot ready".into(),
            }))
            .await?;
        }
        Ok(())
    }

    async fn handle(&mut self, sender: Endpoint, message: Message) -> Result<()> {
        match message {
            Message::CommandLong(command) => self.on_command(command).await,
            Message::MissionCount(MissionCount { count, .. }) => {
                if let Some(result) = self.options.reject_uploads {
                    return self.ack_mission(sender, result).await;
                }
                if count == 0 {
                    self.state.lock().unwrap().mission.clear();
                    return self.ack_mission(sender, MissionResult::Accepted).await;
                }
                self.upload = Some(UploadInProgress {
                    expected: count,
                    items: Vec::new(),
                });
                self.request_item(sender, 0).await
            }
            Message::MissionItemInt(MissionItem { waypoint, .. }) => {
                self.state.lock().unwrap().items_received += 1;
                let Some(upload) = self.upload.as_mut() else {
                    return Ok(());
                };
                if usize::from(waypoint.seq) == upload.items.len() {
                    upload.items.push(waypoint);
                }
                let next = upload.items.len() as u16;
                if next < upload.expected {
                    return self.request_item(sender, next).await;
                }
                if let Some(done) = self.upload.take() {
                    self.state.lock().unwrap().mission = done.items;
                }
                self.ack_mission(sender, MissionResult::Accepted).await
            }
            Message::MissionRequestList(_) => {
                let count = self.state.lock().unwrap().mission.len() as u16;
                self.say(Message::MissionCount(MissionCount {
                    count,
                    target: sender,
                }))
                .await
            }
            Message::MissionRequestInt(MissionRequest { seq, .. })
            | Message::MissionRequest(MissionRequest { seq, .. }) => {
                let item = self.state.lock().unwrap().mission.get(usize::from(seq)).cloned();
                match item {
                    Some(waypoint) => {
                        self.say(Message::MissionItemInt(MissionItem {
                            target: sender,
                            waypoint,
                        }))
                        .await
                    }
                    None => self.ack_mission(sender, MissionResult::InvalidSequence).await,
                }
            }
            Message::MissionClearAll(_) => {
                {
                    let mut s = self.state.lock().unwrap();
                    s.mission.clear();
                    s.clears += 1;
                }
                self.ack_mission(sender, MissionResult::Accepted).await
            }
            _ => Ok(()),
        }
    }

    async fn on_command(&mut self, command: CommandLong) -> Result<()> {
        {
            let mut s = self.state.lock().unwrap();
            s.commands.push(command);
            if self.options.ignore_commands {
                return Ok(());
            }
            match command.command {
                MavCmd::ComponentArmDisarm => s.armed = command.params[0] >= 0.5,
                MavCmd::DoSetMode => s.custom_mode = command.params[1] as u32,
                _ => {}
            }
        }
        self.say(Message::CommandAck(CommandAck {
            command: command.command,
            result: MavResult::Accepted,
        }))
        .await
    }

    async fn request_item(&mut self, station: Endpoint, seq: u16) -> Result<()> {
        self.say(Message::MissionRequestInt(MissionRequest {
            seq,
            target: station,
        }))
        .await
    }

    async fn ack_mission(&mut self, station: Endpoint, result: MissionResult) -> Result<()> {
        self.say(Message::MissionAck(MissionAck {
            target: station,
            result,
        }))
        .await
    }
}
