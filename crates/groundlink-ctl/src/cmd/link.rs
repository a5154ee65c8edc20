//! Serial port listing, connect, disconnect and vehicle command commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json, post_json_body};

#[derive(Deserialize)]
struct SerialDevice {
    path: String,
    manufacturer: Option<String>,
    product: Option<String>,
}

#[derive(Deserialize)]
struct PortsResponse {
    serial_supported: bool,
    ports: Vec<SerialDevice>,
}

#[derive(Serialize)]
struct ConnectRequest<'a> {
    spec: Option<&'a str>,
}

#[derive(Deserialize)]
struct ConnectResponse {
    transport: String,
}

#[derive(Deserialize)]
struct DisconnectResponse {
    was_connected: bool,
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    command: &'a str,
    arg: Option<&'a str>,
}

#[derive(Deserialize)]
struct CommandResponse {
    sent: String,
}

pub async fn cmd_ports(port: u16) -> Result<()> {
    let resp: PortsResponse = get_json(&format!("{}/link/ports", base_url(port))).await?;
    if !resp.serial_supported {
        println!("Serial support is not compiled into groundlinkd (build with --features serial).");
        return Ok(());
    }
    if resp.ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    println!("{:<24} DEVICE", "PATH");
    for dev in &resp.ports {
        let label = match (&dev.manufacturer, &dev.product) {
            (Some(m), Some(p)) => format!("{} {}", m, p),
            (Some(m), None) => m.clone(),
            (None, Some(p)) => p.clone(),
            (None, None) => "-".to_string(),
        };
        println!("{:<24} {}", dev.path, label);
    }
    println!();
    println!("Connect with: groundlink-ctl connect serial:<path>[:<baud>]");
    Ok(())
}

/// `spec` of `None` connects with the daemon's configured link.
pub async fn cmd_connect(port: u16, spec: Option<&str>) -> Result<()> {
    let resp: ConnectResponse =
        post_json_body(&format!("{}/connect", base_url(port)), &ConnectRequest { spec }).await?;
    println!("Opened {}. Waiting for the vehicle's heartbeat.", resp.transport);
    Ok(())
}

pub async fn cmd_disconnect(port: u16) -> Result<()> {
    let resp: DisconnectResponse = post_json(&format!("{}/disconnect", base_url(port))).await?;
    if resp.was_connected {
        println!("Disconnected.");
    } else {
        println!("Link was not connected.");
    }
    Ok(())
}

pub async fn cmd_command(port: u16, command: &str, arg: Option<&str>) -> Result<()> {
    let resp: CommandResponse =
        post_json_body(&format!("{}/command", base_url(port)), &CommandRequest { command, arg })
            .await?;
    println!("Sent {}.", resp.sent);
    Ok(())
}
