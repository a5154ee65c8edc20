//! Link status, telemetry and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    transport: Option<String>,
    peer_addr: Option<String>,
    peer: Option<Endpoint>,
    connected_for_ms: Option<u64>,
    since_heartbeat_ms: Option<u64>,
    stale: bool,
    frames_received: u64,
    frames_sent: u64,
    bytes_discarded: u64,
    transfer: Option<TransferStatus>,
}

#[derive(Deserialize)]
struct Endpoint {
    system_id: u8,
    component_id: u8,
}

#[derive(Deserialize)]
struct TransferStatus {
    direction: String,
    stage: serde_json::Value,
    done: u16,
    total: Option<u16>,
}

#[derive(Deserialize)]
struct TelemetryResponse {
    heartbeat: Option<Heartbeat>,
    system_status: Option<SystemStatus>,
    attitude: Option<Attitude>,
    position: Option<Position>,
    gps: Option<Gps>,
    vfr_hud: Option<VfrHud>,
    battery: Option<Battery>,
    mission_current: Option<u16>,
    status_texts: Vec<StatusText>,
}

#[derive(Deserialize)]
struct Heartbeat {
    armed: bool,
    mode: Option<String>,
    custom_mode: u32,
}

#[derive(Deserialize)]
struct SystemStatus {
    load: f32,
    battery_voltage: f32,
    drop_rate_comm: f32,
}

#[derive(Deserialize)]
struct Attitude {
    roll: f32,
    pitch: f32,
    yaw: f32,
}

#[derive(Deserialize)]
struct Position {
    latitude: f64,
    longitude: f64,
    relative_altitude: f32,
    heading: Option<f32>,
}

#[derive(Deserialize)]
struct Gps {
    fix_type: u8,
    satellites: u8,
}

#[derive(Deserialize)]
struct VfrHud {
    airspeed: f32,
    groundspeed: f32,
    climb: f32,
    throttle: u16,
}

#[derive(Deserialize)]
struct Battery {
    voltage: f32,
    remaining: Option<u8>,
}

#[derive(Deserialize)]
struct StatusText {
    severity: u8,
    text: String,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Groundlink Status");
    println!("═══════════════════════════════════════");
    println!("  Link           : {}", resp.status);
    println!("  Transport      : {}", resp.transport.as_deref().unwrap_or("-"));
    println!("  Peer address   : {}", resp.peer_addr.as_deref().unwrap_or("-"));
    match &resp.peer {
        Some(p) => println!("  Vehicle        : {}/{}", p.system_id, p.component_id),
        None => println!("  Vehicle        : -"),
    }
    if let Some(ms) = resp.connected_for_ms {
        println!("  Connected for  : {:.1}s", ms as f64 / 1000.0);
    }
    if let Some(ms) = resp.since_heartbeat_ms {
        let flag = if resp.stale { "  (STALE)" } else { "" };
        println!("  Last heartbeat : {:.1}s ago{}", ms as f64 / 1000.0, flag);
    }
    println!("  Frames in/out  : {} / {}", resp.frames_received, resp.frames_sent);
    println!("  Noise skipped  : {} bytes", resp.bytes_discarded);

    match &resp.transfer {
        None => println!("\n  No mission transfer in progress."),
        Some(t) => {
            let total = t.total.map(|n| n.to_string()).unwrap_or_else(|| "?".into());
            println!("\n  Mission {}: {}/{} ({})", t.direction, t.done, total, t.stage);
        }
    }

    Ok(())
}

pub async fn cmd_telemetry(port: u16) -> Result<()> {
    let t: TelemetryResponse = get_json(&format!("{}/telemetry", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Vehicle Telemetry");
    println!("═══════════════════════════════════════");
    match &t.heartbeat {
        Some(hb) => {
            let mode = hb.mode.clone().unwrap_or_else(|| format!("mode {}", hb.custom_mode));
            let armed = if hb.armed { "ARMED" } else { "disarmed" };
            println!("  State      : {} / {}", mode, armed);
        }
        None => println!("  State      : no heartbeat yet"),
    }
    if let Some(p) = &t.position {
        println!(
            "  Position   : {:.7}, {:.7}  alt {:.1} m",
            p.latitude, p.longitude, p.relative_altitude
        );
        if let Some(hdg) = p.heading {
            println!("  Heading    : {:.0}°", hdg);
        }
    }
    if let Some(a) = &t.attitude {
        println!(
            "  Attitude   : roll {:.1}°  pitch {:.1}°  yaw {:.1}°",
            a.roll.to_degrees(),
            a.pitch.to_degrees(),
            a.yaw.to_degrees()
        );
    }
    if let Some(v) = &t.vfr_hud {
        println!(
            "  Speed      : air {:.1} m/s  ground {:.1} m/s  climb {:.1} m/s  throttle {}%",
            v.airspeed, v.groundspeed, v.climb, v.throttle
        );
    }
    if let Some(g) = &t.gps {
        println!("  GPS        : {}  {} satellites", fix_name(g.fix_type), g.satellites);
    }
    if let Some(b) = &t.battery {
        let remaining = b.remaining.map(|r| format!("{}%", r)).unwrap_or_else(|| "?".into());
        println!("  Battery    : {:.2} V  {}", b.voltage, remaining);
    } else if let Some(s) = &t.system_status {
        println!("  Battery    : {:.2} V", s.battery_voltage);
    }
    if let Some(s) = &t.system_status {
        println!("  CPU load   : {:.1}%  link drop {:.1}%", s.load, s.drop_rate_comm);
    }
    if let Some(seq) = t.mission_current {
        println!("  Mission    : item {}", seq);
    }

    if !t.status_texts.is_empty() {
        println!("\n  Messages:");
        for s in t.status_texts.iter().rev().take(10).rev() {
            println!("  [{:<9}] {}", severity_name(s.severity), s.text);
        }
    }

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse = post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}

fn severity_name(severity: u8) -> &'static str {
    match severity {
        0 => "EMERGENCY",
        1 => "ALERT",
        2 => "CRITICAL",
        3 => "ERROR",
        4 => "WARNING",
        5 => "NOTICE",
        6 => "INFO",
        7 => "DEBUG",
        _ => "UNKNOWN",
    }
}

fn fix_name(fix_type: u8) -> &'static str {
    match fix_type {
        0 => "no GPS",
        1 => "no fix",
        2 => "2D fix",
        3 => "3D fix",
        4 => "DGPS",
        5 => "RTK float",
        6 => "RTK fixed",
        _ => "unknown fix",
    }
}
