//! Typed payloads: one struct per message, with unit conversion.
//!
//! `raw` holds the byte-exact wire layouts. The types at the top level are
//! what collaborators see: angles in degrees, distances in metres, speeds in
//! m/s, voltages in volts. Scaled integers never leave this module.
//!
//! Decoding accepts any payload at least as long as the message's v1 base
//! length. Missing trailing extension bytes read as zero. Encoding always
//! emits exactly the base length.

use serde::{Deserialize, Serialize};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::mav::{
    copter_mode_name, GpsFixType, MavCmd, MavFrame, MavResult, MavState, MissionResult, Severity,
    MAVLINK_VERSION, MAV_AUTOPILOT_INVALID, MAV_TYPE_GCS, MODE_FLAG_SAFETY_ARMED,
};
use crate::mission::Waypoint;
use crate::wire::{ids, Endpoint, WireError};

// ── Wire layouts ──────────────────────────────────────────────────────────────

/// Byte-exact payload layouts, little-endian, no padding.
pub mod raw {
    use static_assertions::assert_eq_size;
    use zerocopy::byteorder::little_endian::{F32, I16, I32, U16, U32, U64};
    use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct Heartbeat {
        pub mav_type: u8,
        pub autopilot: u8,
        pub base_mode: u8,
        pub custom_mode: U32,
        pub system_status: u8,
        pub mavlink_version: u8,
    }

    assert_eq_size!(Heartbeat, [u8; 9]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct SysStatus {
        pub sensors_present: U32,
        pub sensors_enabled: U32,
        pub sensors_health: U32,
        /// Main loop load, 0.1 %.
        pub load: U16,
        /// mV.
        pub voltage_battery: U16,
        /// cA, -1 when unknown.
        pub current_battery: I16,
        /// 0.01 %.
        pub drop_rate_comm: U16,
        pub errors_comm: U16,
        pub errors_count1: U16,
        pub errors_count2: U16,
        pub errors_count3: U16,
        pub errors_count4: U16,
        /// %, -1 when unknown.
        pub battery_remaining: i8,
    }

    assert_eq_size!(SysStatus, [u8; 31]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct GpsRawInt {
        pub time_usec: U64,
        pub lat: I32,
        pub lon: I32,
        /// mm above MSL.
        pub alt: I32,
        pub eph: U16,
        pub epv: U16,
        /// cm/s.
        pub vel: U16,
        /// cdeg.
        pub cog: U16,
        pub fix_type: u8,
        pub satellites_visible: u8,
    }

    assert_eq_size!(GpsRawInt, [u8; 30]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct Attitude {
        pub time_boot_ms: U32,
        pub roll: F32,
        pub pitch: F32,
        pub yaw: F32,
        pub rollspeed: F32,
        pub pitchspeed: F32,
        pub yawspeed: F32,
    }

    assert_eq_size!(Attitude, [u8; 28]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct GlobalPositionInt {
        pub time_boot_ms: U32,
        pub lat: I32,
        pub lon: I32,
        pub alt: I32,
        pub relative_alt: I32,
        pub vx: I16,
        pub vy: I16,
        pub vz: I16,
        pub hdg: U16,
    }

    assert_eq_size!(GlobalPositionInt, [u8; 28]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct VfrHud {
        pub airspeed: F32,
        pub groundspeed: F32,
        pub alt: F32,
        pub climb: F32,
        pub heading: I16,
        pub throttle: U16,
    }

    assert_eq_size!(VfrHud, [u8; 20]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct BatteryStatus {
        /// mAh, -1 when unknown.
        pub current_consumed: I32,
        /// hJ, -1 when unknown.
        pub energy_consumed: I32,
        /// cdegC, i16::MAX when unknown.
        pub temperature: I16,
        /// Per-cell mV, u16::MAX marks an unused slot.
        pub voltages: [U16; 10],
        pub current_battery: I16,
        pub id: u8,
        pub battery_function: u8,
        pub battery_type: u8,
        pub battery_remaining: i8,
    }

    assert_eq_size!(BatteryStatus, [u8; 36]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct StatusText {
        pub severity: u8,
        /// NUL-padded, not necessarily NUL-terminated.
        pub text: [u8; 50],
    }

    assert_eq_size!(StatusText, [u8; 51]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct CommandLong {
        pub params: [F32; 7],
        pub command: U16,
        pub target_system: u8,
        pub target_component: u8,
        pub confirmation: u8,
    }

    assert_eq_size!(CommandLong, [u8; 33]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct CommandAck {
        pub command: U16,
        pub result: u8,
    }

    assert_eq_size!(CommandAck, [u8; 3]);

    /// MISSION_COUNT. `mission_type` is an extension.
    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct MissionCount {
        pub count: U16,
        pub target_system: u8,
        pub target_component: u8,
        pub mission_type: u8,
    }

    assert_eq_size!(MissionCount, [u8; 5]);

    /// Shared by MISSION_REQUEST and MISSION_REQUEST_INT.
    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct MissionRequest {
        pub seq: U16,
        pub target_system: u8,
        pub target_component: u8,
        pub mission_type: u8,
    }

    assert_eq_size!(MissionRequest, [u8; 5]);

    /// Shared by MISSION_REQUEST_LIST and MISSION_CLEAR_ALL.
    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct MissionTarget {
        pub target_system: u8,
        pub target_component: u8,
        pub mission_type: u8,
    }

    assert_eq_size!(MissionTarget, [u8; 3]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct MissionAck {
        pub target_system: u8,
        pub target_component: u8,
        pub result: u8,
        pub mission_type: u8,
    }

    assert_eq_size!(MissionAck, [u8; 4]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct MissionCurrent {
        pub seq: U16,
    }

    assert_eq_size!(MissionCurrent, [u8; 2]);

    #[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
    #[repr(C)]
    pub struct MissionItemInt {
        pub param1: F32,
        pub param2: F32,
        pub param3: F32,
        pub param4: F32,
        /// Latitude, 1e-7 deg.
        pub x: I32,
        /// Longitude, 1e-7 deg.
        pub y: I32,
        pub z: F32,
        pub command: U16,
        pub seq: U16,
        pub frame: u8,
        pub current: u8,
        pub autocontinue: u8,
        pub target_system: u8,
        pub target_component: u8,
        pub mission_type: u8,
    }

    assert_eq_size!(MissionItemInt, [u8; 38]);
}

/// v1 base payload length for a message id.
pub fn base_len(message_id: u8) -> Option<usize> {
    let len = match message_id {
        ids::HEARTBEAT => 9,
        ids::SYS_STATUS => 31,
        ids::GPS_RAW_INT => 30,
        ids::ATTITUDE => 28,
        ids::GLOBAL_POSITION_INT => 28,
        ids::MISSION_REQUEST => 4,
        ids::MISSION_CURRENT => 2,
        ids::MISSION_REQUEST_LIST => 2,
        ids::MISSION_COUNT => 4,
        ids::MISSION_CLEAR_ALL => 2,
        ids::MISSION_ACK => 3,
        ids::MISSION_REQUEST_INT => 4,
        ids::MISSION_ITEM_INT => 37,
        ids::VFR_HUD => 20,
        ids::COMMAND_LONG => 33,
        ids::COMMAND_ACK => 3,
        ids::BATTERY_STATUS => 36,
        ids::STATUSTEXT => 51,
        _ => return None,
    };
    Some(len)
}

// ── Unit conversion ───────────────────────────────────────────────────────────

/// 1e-7 degree integer to degrees.
pub fn e7_to_deg(raw: i32) -> f64 {
    raw as f64 / 1e7
}

/// Degrees to 1e-7 degree integer, rounded to nearest.
pub fn deg_to_e7(deg: f64) -> i32 {
    (deg * 1e7).round() as i32
}

fn mm_to_m(raw: i32) -> f32 {
    raw as f32 / 1000.0
}

fn cm_to_m(raw: i32) -> f32 {
    raw as f32 / 100.0
}

fn ca_to_a(raw: i16) -> f32 {
    raw as f32 / 100.0
}

fn cdeg_to_deg(raw: u16) -> f32 {
    raw as f32 / 100.0
}

fn mv_to_v(raw: u16) -> f32 {
    raw as f32 / 1000.0
}

fn remaining_percent(raw: i8) -> Option<u8> {
    u8::try_from(raw).ok()
}

// ── Typed messages ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub vehicle_type: u8,
    pub autopilot: u8,
    pub base_mode: u8,
    pub custom_mode: u32,
    pub system_status: MavState,
    pub mavlink_version: u8,
}

impl Heartbeat {
    /// The heartbeat this station emits: a GCS, not an autopilot.
    pub fn ground_station() -> Self {
        Self {
            vehicle_type: MAV_TYPE_GCS,
            autopilot: MAV_AUTOPILOT_INVALID,
            base_mode: 0,
            custom_mode: 0,
            system_status: MavState::Uninit,
            mavlink_version: MAVLINK_VERSION,
        }
    }

    pub fn armed(&self) -> bool {
        self.base_mode & MODE_FLAG_SAFETY_ARMED != 0
    }

    /// Copter flight mode name for `custom_mode`, if known.
    pub fn mode_name(&self) -> Option<&'static str> {
        copter_mode_name(self.custom_mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SysStatus {
    pub sensors_present: u32,
    pub sensors_enabled: u32,
    pub sensors_health: u32,
    /// Percent.
    pub load: f32,
    /// Volts.
    pub battery_voltage: f32,
    /// Amps, `None` when the autopilot does not measure it.
    pub battery_current: Option<f32>,
    pub battery_remaining: Option<u8>,
    /// Percent.
    pub drop_rate_comm: f32,
    pub errors_comm: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsRaw {
    pub time_usec: u64,
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above MSL.
    pub altitude: f32,
    /// Horizontal dilution, `None` when unknown.
    pub hdop: Option<f32>,
    pub vdop: Option<f32>,
    /// m/s.
    pub ground_speed: f32,
    /// Course over ground in degrees, `None` when unknown.
    pub course: Option<f32>,
    pub fix_type: GpsFixType,
    pub satellites: u8,
}

/// Radians and radians per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub time_boot_ms: u32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalPosition {
    pub time_boot_ms: u32,
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above MSL.
    pub altitude: f32,
    /// Metres above home.
    pub relative_altitude: f32,
    /// m/s, north/east/down.
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    /// Degrees, `None` when unknown.
    pub heading: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VfrHud {
    pub airspeed: f32,
    pub groundspeed: f32,
    pub altitude: f32,
    pub climb: f32,
    /// Degrees, 0..360.
    pub heading: i16,
    /// Percent.
    pub throttle: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub id: u8,
    /// Sum of the reported cells, volts.
    pub voltage: f32,
    pub cell_voltages: Vec<f32>,
    pub current: Option<f32>,
    /// mAh.
    pub consumed: Option<i32>,
    /// Degrees Celsius.
    pub temperature: Option<f32>,
    pub remaining: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusText {
    pub severity: Severity,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandLong {
    pub command: MavCmd,
    pub params: [f32; 7],
    pub target: Endpoint,
    pub confirmation: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    pub command: MavCmd,
    pub result: MavResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionCount {
    pub count: u16,
    pub target: Endpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRequest {
    pub seq: u16,
    pub target: Endpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionAck {
    pub target: Endpoint,
    pub result: MissionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionItem {
    pub target: Endpoint,
    pub waypoint: Waypoint,
}

/// Every message this link decodes or emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    Heartbeat(Heartbeat),
    SysStatus(SysStatus),
    GpsRawInt(GpsRaw),
    Attitude(Attitude),
    GlobalPositionInt(GlobalPosition),
    VfrHud(VfrHud),
    BatteryStatus(BatteryStatus),
    StatusText(StatusText),
    CommandLong(CommandLong),
    CommandAck(CommandAck),
    MissionCount(MissionCount),
    MissionRequest(MissionRequest),
    MissionRequestInt(MissionRequest),
    MissionRequestList(Endpoint),
    MissionClearAll(Endpoint),
    MissionAck(MissionAck),
    MissionCurrent(u16),
    MissionItemInt(MissionItem),
}

fn read_padded<T: FromBytes + AsBytes>(payload: &[u8]) -> T {
    let mut value = T::new_zeroed();
    let dst = value.as_bytes_mut();
    let n = payload.len().min(dst.len());
    dst[..n].copy_from_slice(&payload[..n]);
    value
}

fn truncated<T: AsBytes>(value: &T, len: usize) -> Vec<u8> {
    value.as_bytes()[..len].to_vec()
}

fn endpoint(system_id: u8, component_id: u8) -> Endpoint {
    Endpoint::new(system_id, component_id)
}

fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl Message {
    pub fn id(&self) -> u8 {
        match self {
            Message::Heartbeat(_) => ids::HEARTBEAT,
            Message::SysStatus(_) => ids::SYS_STATUS,
            Message::GpsRawInt(_) => ids::GPS_RAW_INT,
            Message::Attitude(_) => ids::ATTITUDE,
            Message::GlobalPositionInt(_) => ids::GLOBAL_POSITION_INT,
            Message::VfrHud(_) => ids::VFR_HUD,
            Message::BatteryStatus(_) => ids::BATTERY_STATUS,
            Message::StatusText(_) => ids::STATUSTEXT,
            Message::CommandLong(_) => ids::COMMAND_LONG,
            Message::CommandAck(_) => ids::COMMAND_ACK,
            Message::MissionCount(_) => ids::MISSION_COUNT,
            Message::MissionRequest(_) => ids::MISSION_REQUEST,
            Message::MissionRequestInt(_) => ids::MISSION_REQUEST_INT,
            Message::MissionRequestList(_) => ids::MISSION_REQUEST_LIST,
            Message::MissionClearAll(_) => ids::MISSION_CLEAR_ALL,
            Message::MissionAck(_) => ids::MISSION_ACK,
            Message::MissionCurrent(_) => ids::MISSION_CURRENT,
            Message::MissionItemInt(_) => ids::MISSION_ITEM_INT,
        }
    }

    /// Decode a payload by message id.
    pub fn decode(message_id: u8, payload: &[u8]) -> Result<Self, WireError> {
        let min = base_len(message_id).ok_or(WireError::UnknownMessage(message_id))?;
        if payload.len() < min {
            return Err(WireError::PayloadTooShort {
                id: message_id,
                len: payload.len(),
                min,
            });
        }

        let message = match message_id {
            ids::HEARTBEAT => {
                let r: raw::Heartbeat = read_padded(payload);
                Message::Heartbeat(Heartbeat {
                    vehicle_type: r.mav_type,
                    autopilot: r.autopilot,
                    base_mode: r.base_mode,
                    custom_mode: r.custom_mode.get(),
                    system_status: MavState::from(r.system_status),
                    mavlink_version: r.mavlink_version,
                })
            }
            ids::SYS_STATUS => {
                let r: raw::SysStatus = read_padded(payload);
                let current = r.current_battery.get();
                Message::SysStatus(SysStatus {
                    sensors_present: r.sensors_present.get(),
                    sensors_enabled: r.sensors_enabled.get(),
                    sensors_health: r.sensors_health.get(),
                    load: r.load.get() as f32 / 10.0,
                    battery_voltage: mv_to_v(r.voltage_battery.get()),
                    battery_current: (current >= 0).then(|| ca_to_a(current)),
                    battery_remaining: remaining_percent(r.battery_remaining),
                    drop_rate_comm: r.drop_rate_comm.get() as f32 / 100.0,
                    errors_comm: r.errors_comm.get(),
                })
            }
            ids::GPS_RAW_INT => {
                let r: raw::GpsRawInt = read_padded(payload);
                let dop = |raw: u16| (raw != u16::MAX).then(|| raw as f32 / 100.0);
                let cog = r.cog.get();
                Message::GpsRawInt(GpsRaw {
                    time_usec: r.time_usec.get(),
                    latitude: e7_to_deg(r.lat.get()),
                    longitude: e7_to_deg(r.lon.get()),
                    altitude: mm_to_m(r.alt.get()),
                    hdop: dop(r.eph.get()),
                    vdop: dop(r.epv.get()),
                    ground_speed: cm_to_m(r.vel.get() as i32),
                    course: (cog != u16::MAX).then(|| cdeg_to_deg(cog)),
                    fix_type: GpsFixType::from(r.fix_type),
                    satellites: r.satellites_visible,
                })
            }
            ids::ATTITUDE => {
                let r: raw::Attitude = read_padded(payload);
                Message::Attitude(Attitude {
                    time_boot_ms: r.time_boot_ms.get(),
                    roll: r.roll.get(),
                    pitch: r.pitch.get(),
                    yaw: r.yaw.get(),
                    rollspeed: r.rollspeed.get(),
                    pitchspeed: r.pitchspeed.get(),
                    yawspeed: r.yawspeed.get(),
                })
            }
            ids::GLOBAL_POSITION_INT => {
                let r: raw::GlobalPositionInt = read_padded(payload);
                let hdg = r.hdg.get();
                Message::GlobalPositionInt(GlobalPosition {
                    time_boot_ms: r.time_boot_ms.get(),
                    latitude: e7_to_deg(r.lat.get()),
                    longitude: e7_to_deg(r.lon.get()),
                    altitude: mm_to_m(r.alt.get()),
                    relative_altitude: mm_to_m(r.relative_alt.get()),
                    vx: cm_to_m(r.vx.get() as i32),
                    vy: cm_to_m(r.vy.get() as i32),
                    vz: cm_to_m(r.vz.get() as i32),
                    heading: (hdg != u16::MAX).then(|| cdeg_to_deg(hdg)),
                })
            }
            ids::VFR_HUD => {
                let r: raw::VfrHud = read_padded(payload);
                Message::VfrHud(VfrHud {
                    airspeed: r.airspeed.get(),
                    groundspeed: r.groundspeed.get(),
                    altitude: r.alt.get(),
                    climb: r.climb.get(),
                    heading: r.heading.get(),
                    throttle: r.throttle.get(),
                })
            }
            ids::BATTERY_STATUS => {
                let r: raw::BatteryStatus = read_padded(payload);
                let cell_voltages: Vec<f32> = r
                    .voltages
                    .iter()
                    .map(|v| v.get())
                    .filter(|&mv| mv != u16::MAX)
                    .map(mv_to_v)
                    .collect();
                let current = r.current_battery.get();
                let consumed = r.current_consumed.get();
                let temperature = r.temperature.get();
                Message::BatteryStatus(BatteryStatus {
                    id: r.id,
                    voltage: cell_voltages.iter().sum(),
                    cell_voltages,
                    current: (current >= 0).then(|| ca_to_a(current)),
                    consumed: (consumed >= 0).then_some(consumed),
                    temperature: (temperature != i16::MAX).then(|| temperature as f32 / 100.0),
                    remaining: remaining_percent(r.battery_remaining),
                })
            }
            ids::STATUSTEXT => {
                let r: raw::StatusText = read_padded(payload);
                Message::StatusText(StatusText {
                    severity: Severity::from(r.severity),
                    text: decode_text(&r.text),
                })
            }
            ids::COMMAND_LONG => {
                let r: raw::CommandLong = read_padded(payload);
                Message::CommandLong(CommandLong {
                    command: MavCmd::from(r.command.get()),
                    params: r.params.map(|p| p.get()),
                    target: endpoint(r.target_system, r.target_component),
                    confirmation: r.confirmation,
                })
            }
            ids::COMMAND_ACK => {
                let r: raw::CommandAck = read_padded(payload);
                Message::CommandAck(CommandAck {
                    command: MavCmd::from(r.command.get()),
                    result: MavResult::from(r.result),
                })
            }
            ids::MISSION_COUNT => {
                let r: raw::MissionCount = read_padded(payload);
                Message::MissionCount(MissionCount {
                    count: r.count.get(),
                    target: endpoint(r.target_system, r.target_component),
                })
            }
            ids::MISSION_REQUEST | ids::MISSION_REQUEST_INT => {
                let r: raw::MissionRequest = read_padded(payload);
                let request = MissionRequest {
                    seq: r.seq.get(),
                    target: endpoint(r.target_system, r.target_component),
                };
                if message_id == ids::MISSION_REQUEST {
                    Message::MissionRequest(request)
                } else {
                    Message::MissionRequestInt(request)
                }
            }
            ids::MISSION_REQUEST_LIST | ids::MISSION_CLEAR_ALL => {
                let r: raw::MissionTarget = read_padded(payload);
                let target = endpoint(r.target_system, r.target_component);
                if message_id == ids::MISSION_REQUEST_LIST {
                    Message::MissionRequestList(target)
                } else {
                    Message::MissionClearAll(target)
                }
            }
            ids::MISSION_ACK => {
                let r: raw::MissionAck = read_padded(payload);
                Message::MissionAck(MissionAck {
                    target: endpoint(r.target_system, r.target_component),
                    result: MissionResult::from(r.result),
                })
            }
            ids::MISSION_CURRENT => {
                let r: raw::MissionCurrent = read_padded(payload);
                Message::MissionCurrent(r.seq.get())
            }
            ids::MISSION_ITEM_INT => {
                let r: raw::MissionItemInt = read_padded(payload);
                Message::MissionItemInt(MissionItem {
                    target: endpoint(r.target_system, r.target_component),
                    waypoint: Waypoint {
                        seq: r.seq.get(),
                        frame: MavFrame::from(r.frame),
                        command: MavCmd::from(r.command.get()),
                        current: r.current != 0,
                        autocontinue: r.autocontinue != 0,
                        param1: r.param1.get(),
                        param2: r.param2.get(),
                        param3: r.param3.get(),
                        param4: r.param4.get(),
                        latitude: e7_to_deg(r.x.get()),
                        longitude: e7_to_deg(r.y.get()),
                        altitude: r.z.get(),
                    },
                })
            }
            other => return Err(WireError::UnknownMessage(other)),
        };
        Ok(message)
    }

    /// Encode to a v1 payload of exactly the base length.
    pub fn encode_payload(&self) -> Vec<u8> {
        use zerocopy::byteorder::little_endian::{F32, I16, I32, U16, U32, U64};

        let len = base_len(self.id()).unwrap_or(0);
        match self {
            Message::Heartbeat(m) => truncated(
                &raw::Heartbeat {
                    mav_type: m.vehicle_type,
                    autopilot: m.autopilot,
                    base_mode: m.base_mode,
                    custom_mode: U32::new(m.custom_mode),
                    system_status: m.system_status.into(),
                    mavlink_version: m.mavlink_version,
                },
                len,
            ),
            Message::SysStatus(m) => {
                let mut r = raw::SysStatus::new_zeroed();
                r.sensors_present = U32::new(m.sensors_present);
                r.sensors_enabled = U32::new(m.sensors_enabled);
                r.sensors_health = U32::new(m.sensors_health);
                r.load = U16::new((m.load * 10.0).round() as u16);
                r.voltage_battery = U16::new((m.battery_voltage * 1000.0).round() as u16);
                r.current_battery = I16::new(
                    m.battery_current
                        .map_or(-1, |a| (a * 100.0).round() as i16),
                );
                r.drop_rate_comm = U16::new((m.drop_rate_comm * 100.0).round() as u16);
                r.errors_comm = U16::new(m.errors_comm);
                r.battery_remaining = m.battery_remaining.map_or(-1, |p| p.min(100) as i8);
                truncated(&r, len)
            }
            Message::GpsRawInt(m) => {
                let dop = |d: Option<f32>| U16::new(d.map_or(u16::MAX, |v| (v * 100.0).round() as u16));
                truncated(
                    &raw::GpsRawInt {
                        time_usec: U64::new(m.time_usec),
                        lat: I32::new(deg_to_e7(m.latitude)),
                        lon: I32::new(deg_to_e7(m.longitude)),
                        alt: I32::new((m.altitude * 1000.0).round() as i32),
                        eph: dop(m.hdop),
                        epv: dop(m.vdop),
                        vel: U16::new((m.ground_speed * 100.0).round() as u16),
                        cog: U16::new(m.course.map_or(u16::MAX, |c| (c * 100.0).round() as u16)),
                        fix_type: m.fix_type.into(),
                        satellites_visible: m.satellites,
                    },
                    len,
                )
            }
            Message::Attitude(m) => truncated(
                &raw::Attitude {
                    time_boot_ms: U32::new(m.time_boot_ms),
                    roll: F32::new(m.roll),
                    pitch: F32::new(m.pitch),
                    yaw: F32::new(m.yaw),
                    rollspeed: F32::new(m.rollspeed),
                    pitchspeed: F32::new(m.pitchspeed),
                    yawspeed: F32::new(m.yawspeed),
                },
                len,
            ),
            Message::GlobalPositionInt(m) => {
                let cms = |v: f32| I16::new((v * 100.0).round() as i16);
                truncated(
                    &raw::GlobalPositionInt {
                        time_boot_ms: U32::new(m.time_boot_ms),
                        lat: I32::new(deg_to_e7(m.latitude)),
                        lon: I32::new(deg_to_e7(m.longitude)),
                        alt: I32::new((m.altitude * 1000.0).round() as i32),
                        relative_alt: I32::new((m.relative_altitude * 1000.0).round() as i32),
                        vx: cms(m.vx),
                        vy: cms(m.vy),
                        vz: cms(m.vz),
                        hdg: U16::new(m.heading.map_or(u16::MAX, |h| (h * 100.0).round() as u16)),
                    },
                    len,
                )
            }
            Message::VfrHud(m) => truncated(
                &raw::VfrHud {
                    airspeed: F32::new(m.airspeed),
                    groundspeed: F32::new(m.groundspeed),
                    alt: F32::new(m.altitude),
                    climb: F32::new(m.climb),
                    heading: I16::new(m.heading),
                    throttle: U16::new(m.throttle),
                },
                len,
            ),
            Message::BatteryStatus(m) => {
                let mut r = raw::BatteryStatus::new_zeroed();
                r.current_consumed = I32::new(m.consumed.unwrap_or(-1));
                r.energy_consumed = I32::new(-1);
                r.temperature = I16::new(
                    m.temperature
                        .map_or(i16::MAX, |c| (c * 100.0).round() as i16),
                );
                for (i, slot) in r.voltages.iter_mut().enumerate() {
                    *slot = U16::new(
                        m.cell_voltages
                            .get(i)
                            .map_or(u16::MAX, |v| (v * 1000.0).round() as u16),
                    );
                }
                r.current_battery = I16::new(m.current.map_or(-1, |a| (a * 100.0).round() as i16));
                r.id = m.id;
                r.battery_remaining = m.remaining.map_or(-1, |p| p.min(100) as i8);
                truncated(&r, len)
            }
            Message::StatusText(m) => {
                let mut r = raw::StatusText::new_zeroed();
                r.severity = m.severity.into();
                let bytes = m.text.as_bytes();
                let n = bytes.len().min(r.text.len());
                r.text[..n].copy_from_slice(&bytes[..n]);
                truncated(&r, len)
            }
            Message::CommandLong(m) => truncated(
                &raw::CommandLong {
                    params: m.params.map(F32::new),
                    command: U16::new(m.command.into()),
                    target_system: m.target.system_id,
                    target_component: m.target.component_id,
                    confirmation: m.confirmation,
                },
                len,
            ),
            Message::CommandAck(m) => truncated(
                &raw::CommandAck {
                    command: U16::new(m.command.into()),
                    result: m.result.into(),
                },
                len,
            ),
            Message::MissionCount(m) => truncated(
                &raw::MissionCount {
                    count: U16::new(m.count),
                    target_system: m.target.system_id,
                    target_component: m.target.component_id,
                    mission_type: 0,
                },
                len,
            ),
            Message::MissionRequest(m) | Message::MissionRequestInt(m) => truncated(
                &raw::MissionRequest {
                    seq: U16::new(m.seq),
                    target_system: m.target.system_id,
                    target_component: m.target.component_id,
                    mission_type: 0,
                },
                len,
            ),
            Message::MissionRequestList(target) | Message::MissionClearAll(target) => truncated(
                &raw::MissionTarget {
                    target_system: target.system_id,
                    target_component: target.component_id,
                    mission_type: 0,
                },
                len,
            ),
            Message::MissionAck(m) => truncated(
                &raw::MissionAck {
                    target_system: m.target.system_id,
                    target_component: m.target.component_id,
                    result: m.result.into(),
                    mission_type: 0,
                },
                len,
            ),
            Message::MissionCurrent(seq) => truncated(
                &raw::MissionCurrent {
                    seq: U16::new(*seq),
                },
                len,
            ),
            Message::MissionItemInt(m) => {
                let w = &m.waypoint;
                truncated(
                    &raw::MissionItemInt {
                        param1: F32::new(w.param1),
                        param2: F32::new(w.param2),
                        param3: F32::new(w.param3),
                        param4: F32::new(w.param4),
                        x: I32::new(deg_to_e7(w.latitude)),
                        y: I32::new(deg_to_e7(w.longitude)),
                        z: F32::new(w.altitude),
                        command: U16::new(w.command.into()),
                        seq: U16::new(w.seq),
                        frame: w.frame.into(),
                        current: w.current as u8,
                        autocontinue: w.autocontinue as u8,
                        target_system: m.target.system_id,
                        target_component: m.target.component_id,
                        mission_type: 0,
                    },
                    len,
                )
            }
        }
    }
}
