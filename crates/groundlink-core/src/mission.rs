//! Mission model: waypoints, normalisation, the plan file format, and the
//! survey grid generator.
//!
//! A mission is an ordered list of waypoints with contiguous `seq` values
//! starting at 0. Exactly one waypoint is `current`, and after any clean load
//! (plan file, normalisation before upload, completed download) it is index 0.
//!
//! Plan files are the tab-separated "QGC WPL 110" text format:
//!
//! ```text
//! QGC WPL 110
//! 0	1	0	16	0.000000	0.000000	0.000000	0.000000	47.39774180	8.54559380	488.000000	1
//! ```
//!
//! Columns: seq, current, frame, command, param1..4, lat, lon, alt, autocontinue.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::mav::{MavCmd, MavFrame};

pub const PLAN_HEADER: &str = "QGC WPL 110";

/// Metres per degree of latitude, close enough for grid spacing.
const METRES_PER_DEG_LAT: f64 = 111_000.0;

// ── Waypoint ──────────────────────────────────────────────────────────────────

/// One mission item. Coordinates are degrees, altitude metres in `frame`.
///
/// Deserialization fills anything missing with a plain relative-altitude
/// NAV_WAYPOINT, so callers can submit `{ "lat": .., "lon": .., "alt": .. }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Waypoint {
    pub seq: u16,
    pub frame: MavFrame,
    pub command: MavCmd,
    pub current: bool,
    pub autocontinue: bool,
    pub param1: f32,
    pub param2: f32,
    pub param3: f32,
    pub param4: f32,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon")]
    pub longitude: f64,
    #[serde(alias = "alt")]
    pub altitude: f32,
}

impl Default for Waypoint {
    fn default() -> Self {
        Self {
            seq: 0,
            frame: MavFrame::GlobalRelativeAlt,
            command: MavCmd::NavWaypoint,
            current: false,
            autocontinue: true,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
        }
    }
}

impl Waypoint {
    pub fn new(command: MavCmd, latitude: f64, longitude: f64, altitude: f32) -> Self {
        Self {
            command,
            latitude,
            longitude,
            altitude,
            ..Self::default()
        }
    }
}

/// Largest mission the u16 item count and sequence numbers can describe.
pub const MAX_ITEMS: usize = u16::MAX as usize;

/// Renumber `seq` contiguously from 0 and make index 0 the only current item.
/// Callers keep `items` within [`MAX_ITEMS`].
pub fn normalize(items: &mut [Waypoint]) {
    for (i, wp) in items.iter_mut().enumerate() {
        wp.seq = i as u16;
        wp.current = i == 0;
    }
}

// ── Mission plan ──────────────────────────────────────────────────────────────

/// A normalised, ordered mission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Waypoint>", into = "Vec<Waypoint>")]
pub struct MissionPlan {
    items: Vec<Waypoint>,
}

impl MissionPlan {
    /// Build a plan, renumbering and resetting `current` flags.
    pub fn new(mut items: Vec<Waypoint>) -> Result<Self, PlanError> {
        if items.len() > MAX_ITEMS {
            return Err(PlanError::TooManyItems(items.len()));
        }
        normalize(&mut items);
        Ok(Self { items })
    }

    pub fn items(&self) -> &[Waypoint] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Waypoint> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse plan file text.
    pub fn parse(text: &str) -> Result<Self, PlanError> {
        let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

        let header = lines
            .by_ref()
            .find(|(_, l)| !l.is_empty() && !l.starts_with('#'))
            .ok_or(PlanError::MissingHeader)?;
        if !header.1.starts_with("QGC WPL") {
            return Err(PlanError::BadHeader(header.1.to_string()));
        }

        let mut items = Vec::new();
        for (line_no, line) in lines {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if items.len() == MAX_ITEMS {
                return Err(PlanError::TooManyItems(MAX_ITEMS + 1));
            }
            items.push(parse_line(line_no, line)?);
        }
        Self::new(items)
    }

    /// Render as plan file text, newline-terminated.
    pub fn to_plan_string(&self) -> String {
        let mut out = String::from(PLAN_HEADER);
        out.push('\n');
        for wp in &self.items {
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.8}\t{:.8}\t{:.6}\t{}",
                wp.seq,
                wp.current as u8,
                u8::from(wp.frame),
                u16::from(wp.command),
                wp.param1,
                wp.param2,
                wp.param3,
                wp.param4,
                wp.latitude,
                wp.longitude,
                wp.altitude,
                wp.autocontinue as u8,
            );
        }
        out
    }

    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PlanError::ReadFailed(path.to_path_buf(), e))?;
        Self::parse(&text)
    }

    pub fn save(&self, path: &Path) -> Result<(), PlanError> {
        std::fs::write(path, self.to_plan_string())
            .map_err(|e| PlanError::WriteFailed(path.to_path_buf(), e))
    }
}

impl TryFrom<Vec<Waypoint>> for MissionPlan {
    type Error = PlanError;

    fn try_from(items: Vec<Waypoint>) -> Result<Self, Self::Error> {
        Self::new(items)
    }
}

impl From<MissionPlan> for Vec<Waypoint> {
    fn from(plan: MissionPlan) -> Self {
        plan.items
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<Waypoint, PlanError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 12 {
        return Err(PlanError::Malformed {
            line: line_no,
            reason: format!("expected 12 columns, found {}", fields.len()),
        });
    }

    let int = |i: usize| -> Result<u16, PlanError> {
        fields[i].parse::<u16>().map_err(|_| PlanError::Malformed {
            line: line_no,
            reason: format!("column {} is not an integer: {:?}", i + 1, fields[i]),
        })
    };
    let float = |i: usize| -> Result<f64, PlanError> {
        fields[i].parse::<f64>().map_err(|_| PlanError::Malformed {
            line: line_no,
            reason: format!("column {} is not a number: {:?}", i + 1, fields[i]),
        })
    };

    let frame = int(2)?;
    let frame = u8::try_from(frame).map_err(|_| PlanError::Malformed {
        line: line_no,
        reason: format!("frame {} out of range", frame),
    })?;

    Ok(Waypoint {
        seq: int(0)?,
        current: int(1)? != 0,
        frame: MavFrame::from(frame),
        command: MavCmd::from(int(3)?),
        param1: float(4)? as f32,
        param2: float(5)? as f32,
        param3: float(6)? as f32,
        param4: float(7)? as f32,
        latitude: float(8)?,
        longitude: float(9)?,
        altitude: float(10)? as f32,
        autocontinue: int(11)? != 0,
    })
}

// ── Survey grid ───────────────────────────────────────────────────────────────

/// Lat/lon bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurveyArea {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

/// Lawn-mower pattern over `area`: home, takeoff, alternating east/west passes
/// `spacing` metres apart from the southern edge, then return to launch.
pub fn survey_grid(area: SurveyArea, altitude: f32, spacing: f64) -> Result<MissionPlan, PlanError> {
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(PlanError::InvalidSurvey(format!("spacing must be positive, got {}", spacing)));
    }
    let bounds = [area.north, area.south, area.east, area.west];
    if bounds.iter().any(|b| !b.is_finite()) || !altitude.is_finite() {
        return Err(PlanError::InvalidSurvey("bounds and altitude must be finite".into()));
    }
    if area.north < area.south || area.east < area.west {
        return Err(PlanError::InvalidSurvey("north/south or east/west are swapped".into()));
    }

    let lat_step = spacing / METRES_PER_DEG_LAT;
    // Two points per pass plus home, takeoff and RTL.
    let passes = ((area.north - area.south) / lat_step).floor() + 1.0;
    let total = passes * 2.0 + 3.0;
    if total > MAX_ITEMS as f64 {
        return Err(PlanError::InvalidSurvey(format!(
            "{} passes at {} m spacing exceed the {} item mission limit",
            passes, spacing, MAX_ITEMS
        )));
    }
    let passes = passes as usize;

    let centre_lat = (area.north + area.south) / 2.0;
    let centre_lon = (area.east + area.west) / 2.0;

    let mut items = vec![
        Waypoint {
            frame: MavFrame::Global,
            ..Waypoint::new(MavCmd::NavWaypoint, centre_lat, centre_lon, altitude)
        },
        Waypoint::new(MavCmd::NavTakeoff, centre_lat, centre_lon, altitude),
    ];

    for pass in 0..passes {
        let lat = area.south + pass as f64 * lat_step;
        let (from, to) = if pass % 2 == 0 {
            (area.west, area.east)
        } else {
            (area.east, area.west)
        };
        items.push(Waypoint::new(MavCmd::NavWaypoint, lat, from, altitude));
        items.push(Waypoint::new(MavCmd::NavWaypoint, lat, to, altitude));
    }

    items.push(Waypoint::new(MavCmd::NavReturnToLaunch, 0.0, 0.0, 0.0));
    MissionPlan::new(items)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan file is empty")]
    MissingHeader,
    #[error("not a waypoint file, header is {0:?}")]
    BadHeader(String),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("invalid survey: {0}")]
    InvalidSurvey(String),
    #[error("mission has {0} items, at most 65535 fit the protocol")]
    TooManyItems(usize),
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
}
