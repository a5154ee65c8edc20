use crate::*;

use groundlink_core::mav::{MavCmd, MavResult};
use groundlink_services::{Command, LinkError, LinkEvent};

#[tokio::test]
async fn arm_and_mode_change_are_acknowledged() {
    let (mut station, vehicle) = tcp_pair(SimOptions::default()).await.unwrap();

    station.link.send_command(Command::Arm).await.unwrap();
    let ack = station
        .wait_for("arm ack", |e| matches!(e, LinkEvent::CommandAck(_)))
        .await
        .unwrap();
    let LinkEvent::CommandAck(ack) = ack else {
        unreachable!()
    };
    assert_eq!(ack.command, MavCmd::ComponentArmDisarm);
    assert_eq!(ack.result, MavResult::Accepted);

    station
        .link
        .send_command(Command::SetMode { mode: MODE_LOITER })
        .await
        .unwrap();
    station
        .wait_for("armed loiter heartbeat", |e| {
            matches!(e, LinkEvent::Heartbeat { armed: true, mode: Some("LOITER"), .. })
        })
        .await
        .unwrap();

    let state = vehicle.state();
    assert!(state.armed);
    assert_eq!(state.custom_mode, MODE_LOITER);
    assert_eq!(state.commands.len(), 2);
    assert_eq!(state.commands[0].target, VEHICLE);
}

#[tokio::test]
async fn takeoff_carries_altitude() {
    let (mut station, vehicle) = udp_pair(SimOptions::default()).await.unwrap();

    let takeoff = Command::parse("takeoff", Some("25"), 10.0).unwrap();
    station.link.send_command(takeoff).await.unwrap();
    station
        .wait_for("takeoff ack", |e| {
            matches!(e, LinkEvent::CommandAck(ack) if ack.command == MavCmd::NavTakeoff)
        })
        .await
        .unwrap();
    assert_eq!(vehicle.state().commands[0].params[6], 25.0);
}

#[tokio::test]
async fn unacknowledged_command_times_out() {
    let options = SimOptions {
        ignore_commands: true,
        ..SimOptions::default()
    };
    let (mut station, vehicle) = udp_pair(options).await.unwrap();

    station.link.send_command(Command::Land).await.unwrap();
    let event = station
        .wait_for("command timeout", |e| matches!(e, LinkEvent::CommandTimeout { .. }))
        .await
        .unwrap();
    assert_eq!(event, LinkEvent::CommandTimeout { command: MavCmd::NavLand });
    assert_eq!(vehicle.state().commands.len(), 1, "commands are sent once");
}

#[tokio::test]
async fn commands_need_a_link() {
    let station = Station::start();
    let err = station.link.send_command(Command::Arm).await.unwrap_err();
    assert!(matches!(err, LinkError::NotConnected));
}
