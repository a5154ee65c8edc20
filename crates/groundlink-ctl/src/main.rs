//! groundlink-ctl: command-line interface for the groundlink daemon.

mod cmd;

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 14580;

fn print_usage() {
    println!("Usage: groundlink-ctl [--port <port>] <command>");
    println!();
    println!("Link:");
    println!("  status                       Show link status and transfer progress");
    println!("  telemetry                    Show the latest vehicle telemetry");
    println!("  connect [spec]               Open a link: udp:<port>, tcp:<host>:<port>,");
    println!("                               serial:<path>[:<baud>] (default: configured)");
    println!("  disconnect                   Close the link");
    println!("  ports                        List serial ports for serial:<path>");
    println!();
    println!("Vehicle:");
    println!("  arm | disarm                 Arm or disarm the motors");
    println!("  takeoff [altitude]           Take off to altitude metres");
    println!("  land                         Land in place");
    println!("  rtl                          Return to launch");
    println!("  mode <name|number>           Change flight mode");
    println!("  start-mission                Start the uploaded mission");
    println!();
    println!("Mission:");
    println!("  mission upload <file>        Upload a waypoint file");
    println!("  mission download [file]      Download the vehicle's mission");
    println!("  mission clear                Clear the vehicle's mission");
    println!("  mission cancel               Abort the transfer in progress");
    println!("  mission survey <n> <s> <e> <w> <alt> [spacing] [--upload] [file]");
    println!("                               Generate a lawn-mower survey");
    println!();
    println!("Daemon:");
    println!("  shutdown                     Stop groundlinkd");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["telemetry"] => cmd::status::cmd_telemetry(port).await,
        ["connect"] => cmd::link::cmd_connect(port, None).await,
        ["connect", spec] => cmd::link::cmd_connect(port, Some(*spec)).await,
        ["disconnect"] => cmd::link::cmd_disconnect(port).await,
        ["ports"] => cmd::link::cmd_ports(port).await,
        [name @ ("arm" | "disarm" | "land" | "rtl" | "start-mission")] => {
            cmd::link::cmd_command(port, name, None).await
        }
        ["takeoff"] => cmd::link::cmd_command(port, "takeoff", None).await,
        ["takeoff", altitude] => cmd::link::cmd_command(port, "takeoff", Some(*altitude)).await,
        ["mode", mode] => cmd::link::cmd_command(port, "mode", Some(*mode)).await,
        ["mission", "upload", file] => cmd::mission::cmd_upload(port, file).await,
        ["mission", "download"] => cmd::mission::cmd_download(port, None).await,
        ["mission", "download", file] => cmd::mission::cmd_download(port, Some(*file)).await,
        ["mission", "clear"] => cmd::mission::cmd_clear(port).await,
        ["mission", "cancel"] => cmd::mission::cmd_cancel(port).await,
        ["mission", "survey", rest @ ..] => cmd::mission::cmd_survey(port, rest).await,
        ["shutdown"] => cmd::status::cmd_shutdown(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
