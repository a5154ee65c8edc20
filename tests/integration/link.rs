use crate::*;

use std::time::Duration;

use groundlink_services::event::ConnectionStatus;
use groundlink_services::{Command, LinkEvent};

#[tokio::test]
async fn udp_link_comes_up_and_streams_telemetry() {
    let (mut station, _vehicle) = udp_pair(SimOptions::default()).await.unwrap();

    let peer = station
        .wait_for("peer identity", |e| matches!(e, LinkEvent::PeerIdentified { .. }))
        .await
        .unwrap();
    assert_eq!(peer, LinkEvent::PeerIdentified { peer: VEHICLE });

    station
        .wait_for("attitude", |e| matches!(e, LinkEvent::Attitude(_)))
        .await
        .unwrap();
    let text = station
        .wait_for("status text", |e| matches!(e, LinkEvent::StatusText(_)))
        .await
        .unwrap();
    let LinkEvent::StatusText(text) = text else {
        unreachable!()
    };
    assert_eq!(text.text, "sim autopilot ready");

    let snap = station.link.snapshot();
    assert_eq!(snap.status, ConnectionStatus::Connected);
    assert_eq!(snap.peer, Some(VEHICLE));
    assert!(snap.peer_addr.is_some(), "udp peer address should be latched");
    assert!(snap.frames_received > 0);
}

#[tokio::test]
async fn tcp_link_comes_up_and_streams_telemetry() {
    let (mut station, vehicle) = tcp_pair(SimOptions::default()).await.unwrap();
    assert_eq!(vehicle.state().custom_mode, MODE_STABILIZE);

    let event = station
        .wait_for("heartbeat", |e| matches!(e, LinkEvent::Heartbeat { .. }))
        .await
        .unwrap();
    let LinkEvent::Heartbeat {
        from, armed, mode, ..
    } = event
    else {
        unreachable!()
    };
    assert_eq!(from, VEHICLE);
    assert!(!armed);
    assert_eq!(mode, Some("STABILIZE"));

    station
        .wait_for("position", |e| matches!(e, LinkEvent::GlobalPosition(_)))
        .await
        .unwrap();
    assert!(station.link.snapshot().transport.unwrap().starts_with("tcp:"));
}

#[tokio::test]
async fn silent_vehicle_goes_stale_then_recovers() {
    let (mut station, vehicle) = udp_pair(SimOptions::default()).await.unwrap();

    vehicle.go_silent(true);
    station
        .wait_for("stale warning", |e| matches!(e, LinkEvent::LinkStale { .. }))
        .await
        .unwrap();
    let snap = station.link.snapshot();
    assert!(snap.stale);
    assert_eq!(snap.status, ConnectionStatus::Connected, "stale is a warning, not a disconnect");

    vehicle.go_silent(false);
    station
        .wait_for("restore", |e| matches!(e, LinkEvent::LinkRestored))
        .await
        .unwrap();
    assert!(!station.link.snapshot().stale);
}

#[tokio::test]
async fn tcp_hang_up_disconnects_with_error() {
    let (mut station, vehicle) = tcp_pair(SimOptions::default()).await.unwrap();

    vehicle.hang_up();
    let event = station
        .wait_for("disconnect", |e| {
            matches!(
                e,
                LinkEvent::ConnectionChanged {
                    status: ConnectionStatus::Disconnected,
                    ..
                }
            )
        })
        .await
        .unwrap();
    let LinkEvent::ConnectionChanged { error, .. } = event else {
        unreachable!()
    };
    assert!(error.is_some(), "peer hang-up should carry a reason");
    assert_eq!(station.link.snapshot().status, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn reconnect_after_disconnect() {
    let (mut station, vehicle) = udp_pair(SimOptions::default()).await.unwrap();

    assert!(station.link.disconnect().await.unwrap());
    assert!(!station.link.disconnect().await.unwrap());
    drop(vehicle);

    let port = free_udp_port().unwrap();
    station
        .link
        .connect(groundlink_services::ConnectionSpec::Udp { port })
        .await
        .unwrap();
    let _vehicle = SimVehicle::udp(port, SimOptions::default()).await.unwrap();
    station.wait_connected().await.unwrap();
    assert_eq!(station.link.snapshot().peer, Some(VEHICLE));
}

#[tokio::test]
async fn vehicle_that_stops_reading_cannot_wedge_the_link() {
    let options = SimOptions {
        deaf: true,
        ..SimOptions::default()
    };
    let (station, _vehicle) = tcp_pair(options).await.unwrap();

    // Flood until the outbound path pushes back or gives up on the peer.
    let mut refused = false;
    for _ in 0..1_000_000 {
        let sent = tokio::time::timeout(Duration::from_secs(2), station.link.send_command(Command::Arm))
            .await
            .expect("command send blocked behind the transport");
        if sent.is_err() {
            refused = true;
            break;
        }
    }
    assert!(refused, "a peer that never reads must eventually refuse sends");

    let disconnect = tokio::time::timeout(EVENT_WAIT, station.link.disconnect()).await;
    assert!(disconnect.is_ok(), "disconnect blocked behind the transport");
}
