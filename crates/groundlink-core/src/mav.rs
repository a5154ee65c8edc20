//! Protocol enumerations shared by payloads, commands, and mission items.
//!
//! Every enum keeps an `Other` variant so a value the vehicle sends that we
//! have no name for still round-trips unchanged. Serialization is the raw
//! numeric value.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Heartbeat `type` of a ground control station.
pub const MAV_TYPE_GCS: u8 = 6;

/// Heartbeat `autopilot` value meaning "not an autopilot".
pub const MAV_AUTOPILOT_INVALID: u8 = 8;

/// Protocol version byte carried in every heartbeat.
pub const MAVLINK_VERSION: u8 = 3;

/// base_mode bit: custom_mode carries the firmware flight mode.
pub const MODE_FLAG_CUSTOM_MODE_ENABLED: u8 = 0x01;

/// base_mode bit: motors armed.
pub const MODE_FLAG_SAFETY_ARMED: u8 = 0x80;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident($repr:ty) {
            $($variant:ident = $value:literal => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Other($repr),
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                match value {
                    $($value => Self::$variant,)+
                    other => Self::Other(other),
                }
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> $repr {
                match value {
                    $($name::$variant => $value,)+
                    $name::Other(raw) => raw,
                }
            }
        }

        impl $name {
            /// Upper-case protocol name, or "UNKNOWN".
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                    Self::Other(_) => "UNKNOWN",
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    Self::Other(raw) => write!(f, "UNKNOWN({})", raw),
                    known => f.write_str(known.name()),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                <$repr>::from(*self).serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                <$repr>::deserialize(deserializer).map(Self::from)
            }
        }
    };
}

wire_enum! {
    /// MAV_CMD: commands carried by COMMAND_LONG and mission items.
    MavCmd(u16) {
        NavWaypoint = 16 => "NAV_WAYPOINT",
        NavLoiterUnlim = 17 => "NAV_LOITER_UNLIM",
        NavLoiterTurns = 18 => "NAV_LOITER_TURNS",
        NavLoiterTime = 19 => "NAV_LOITER_TIME",
        NavReturnToLaunch = 20 => "NAV_RETURN_TO_LAUNCH",
        NavLand = 21 => "NAV_LAND",
        NavTakeoff = 22 => "NAV_TAKEOFF",
        NavLoiterToAlt = 31 => "NAV_LOITER_TO_ALT",
        NavSplineWaypoint = 82 => "NAV_SPLINE_WAYPOINT",
        NavDelay = 93 => "NAV_DELAY",
        DoSetMode = 176 => "DO_SET_MODE",
        DoJump = 177 => "DO_JUMP",
        DoChangeSpeed = 178 => "DO_CHANGE_SPEED",
        DoSetHome = 179 => "DO_SET_HOME",
        DoSetRelay = 181 => "DO_SET_RELAY",
        DoSetServo = 183 => "DO_SET_SERVO",
        DoDigicamControl = 203 => "DO_DIGICAM_CONTROL",
        MissionStart = 300 => "MISSION_START",
        ComponentArmDisarm = 400 => "COMPONENT_ARM_DISARM",
    }
}

wire_enum! {
    /// MAV_FRAME: coordinate frame of a mission item.
    MavFrame(u8) {
        Global = 0 => "GLOBAL",
        LocalNed = 1 => "LOCAL_NED",
        Mission = 2 => "MISSION",
        GlobalRelativeAlt = 3 => "GLOBAL_RELATIVE_ALT",
        LocalEnu = 4 => "LOCAL_ENU",
        GlobalInt = 5 => "GLOBAL_INT",
        GlobalRelativeAltInt = 6 => "GLOBAL_RELATIVE_ALT_INT",
        LocalOffsetNed = 7 => "LOCAL_OFFSET_NED",
        BodyNed = 8 => "BODY_NED",
        BodyOffsetNed = 9 => "BODY_OFFSET_NED",
        GlobalTerrainAlt = 10 => "GLOBAL_TERRAIN_ALT",
        GlobalTerrainAltInt = 11 => "GLOBAL_TERRAIN_ALT_INT",
    }
}

wire_enum! {
    /// MAV_RESULT: outcome carried by COMMAND_ACK.
    MavResult(u8) {
        Accepted = 0 => "ACCEPTED",
        TemporarilyRejected = 1 => "TEMPORARILY_REJECTED",
        Denied = 2 => "DENIED",
        Unsupported = 3 => "UNSUPPORTED",
        Failed = 4 => "FAILED",
        InProgress = 5 => "IN_PROGRESS",
        Cancelled = 6 => "CANCELLED",
    }
}

wire_enum! {
    /// MAV_MISSION_RESULT: outcome carried by MISSION_ACK.
    MissionResult(u8) {
        Accepted = 0 => "ACCEPTED",
        Error = 1 => "ERROR",
        UnsupportedFrame = 2 => "UNSUPPORTED_FRAME",
        Unsupported = 3 => "UNSUPPORTED",
        NoSpace = 4 => "NO_SPACE",
        Invalid = 5 => "INVALID",
        InvalidParam1 = 6 => "INVALID_PARAM1",
        InvalidParam2 = 7 => "INVALID_PARAM2",
        InvalidParam3 = 8 => "INVALID_PARAM3",
        InvalidParam4 = 9 => "INVALID_PARAM4",
        InvalidParam5X = 10 => "INVALID_PARAM5_X",
        InvalidParam6Y = 11 => "INVALID_PARAM6_Y",
        InvalidParam7 = 12 => "INVALID_PARAM7",
        InvalidSequence = 13 => "INVALID_SEQUENCE",
        Denied = 14 => "DENIED",
        OperationCancelled = 15 => "OPERATION_CANCELLED",
    }
}

wire_enum! {
    /// MAV_SEVERITY: STATUSTEXT severity, most severe first.
    Severity(u8) {
        Emergency = 0 => "EMERGENCY",
        Alert = 1 => "ALERT",
        Critical = 2 => "CRITICAL",
        Error = 3 => "ERROR",
        Warning = 4 => "WARNING",
        Notice = 5 => "NOTICE",
        Info = 6 => "INFO",
        Debug = 7 => "DEBUG",
    }
}

wire_enum! {
    /// GPS_FIX_TYPE.
    GpsFixType(u8) {
        NoGps = 0 => "NO_GPS",
        NoFix = 1 => "NO_FIX",
        Fix2d = 2 => "2D_FIX",
        Fix3d = 3 => "3D_FIX",
        Dgps = 4 => "DGPS",
        RtkFloat = 5 => "RTK_FLOAT",
        RtkFixed = 6 => "RTK_FIXED",
        Static = 7 => "STATIC",
        Ppp = 8 => "PPP",
    }
}

wire_enum! {
    /// MAV_STATE: heartbeat system_status.
    MavState(u8) {
        Uninit = 0 => "UNINIT",
        Boot = 1 => "BOOT",
        Calibrating = 2 => "CALIBRATING",
        Standby = 3 => "STANDBY",
        Active = 4 => "ACTIVE",
        Critical = 5 => "CRITICAL",
        Emergency = 6 => "EMERGENCY",
        Poweroff = 7 => "POWEROFF",
        FlightTermination = 8 => "FLIGHT_TERMINATION",
    }
}

// ── Copter flight modes ───────────────────────────────────────────────────────

/// ArduCopter custom_mode numbers.
const COPTER_MODES: &[(u32, &str)] = &[
    (0, "STABILIZE"),
    (1, "ACRO"),
    (2, "ALT_HOLD"),
    (3, "AUTO"),
    (4, "GUIDED"),
    (5, "LOITER"),
    (6, "RTL"),
    (7, "CIRCLE"),
    (9, "LAND"),
    (11, "DRIFT"),
    (13, "SPORT"),
    (14, "FLIP"),
    (15, "AUTOTUNE"),
    (16, "POSHOLD"),
    (17, "BRAKE"),
    (18, "THROW"),
    (19, "AVOID_ADSB"),
    (20, "GUIDED_NOGPS"),
    (21, "SMART_RTL"),
    (22, "FLOWHOLD"),
    (23, "FOLLOW"),
    (24, "ZIGZAG"),
    (25, "SYSTEMID"),
    (26, "AUTOROTATE"),
    (27, "AUTO_RTL"),
];

/// Copter custom mode used for return-to-launch.
pub const COPTER_MODE_RTL: u32 = 6;

pub fn copter_mode_name(custom_mode: u32) -> Option<&'static str> {
    COPTER_MODES
        .iter()
        .find(|(n, _)| *n == custom_mode)
        .map(|(_, name)| *name)
}

/// Resolve a mode name (case-insensitive) or a bare number.
pub fn copter_mode_number(name: &str) -> Option<u32> {
    let name = name.trim();
    if let Ok(n) = name.parse::<u32>() {
        return Some(n);
    }
    COPTER_MODES
        .iter()
        .find(|(_, label)| label.eq_ignore_ascii_case(name))
        .map(|(n, _)| *n)
}
