use crate::*;

use groundlink_core::mav::{MavCmd, MissionResult};
use groundlink_core::mission::{survey_grid, SurveyArea};
use groundlink_core::MissionPlan;
use groundlink_services::event::{TransferDirection, TransferOutcome};
use groundlink_services::{LinkError, LinkEvent, TransferFailure};

const PLAN: &str = "QGC WPL 110
0\t1\t0\t16\t0.000000\t0.000000\t0.000000\t0.000000\t47.39774180\t8.54559380\t488.000000\t1
1\t0\t3\t22\t0.000000\t0.000000\t0.000000\t0.000000\t47.39774180\t8.54559380\t20.000000\t1
2\t0\t3\t16\t0.000000\t0.000000\t0.000000\t0.000000\t47.39850000\t8.54600000\t30.000000\t1
3\t0\t3\t20\t0.000000\t0.000000\t0.000000\t0.000000\t0.00000000\t0.00000000\t0.000000\t1
";

fn assert_same_mission(a: &MissionPlan, b: &MissionPlan) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.items().iter().zip(b.items()) {
        assert_eq!(x.seq, y.seq);
        assert_eq!(x.command, y.command);
        assert_eq!(x.frame, y.frame);
        assert_eq!(x.altitude, y.altitude);
        assert!((x.latitude - y.latitude).abs() < 1e-7, "{} vs {}", x.latitude, y.latitude);
        assert!((x.longitude - y.longitude).abs() < 1e-7, "{} vs {}", x.longitude, y.longitude);
    }
}

#[tokio::test]
async fn upload_then_download_round_trips() {
    let (mut station, vehicle) = udp_pair(SimOptions::default()).await.unwrap();
    let plan = MissionPlan::parse(PLAN).unwrap();

    let uploaded = station.link.upload_mission(plan.clone()).await.unwrap();
    assert_eq!(uploaded, 4);
    let state = vehicle.state();
    assert_eq!(state.mission.len(), 4);
    assert_eq!(state.items_received, 4, "each item is sent exactly once");

    let finished = station
        .wait_for("upload finished", |e| {
            matches!(
                e,
                LinkEvent::MissionTransferFinished {
                    direction: TransferDirection::Upload,
                    ..
                }
            )
        })
        .await
        .unwrap();
    assert!(matches!(
        finished,
        LinkEvent::MissionTransferFinished {
            outcome: TransferOutcome::Completed { items: 4 },
            ..
        }
    ));

    let downloaded = station.link.download_mission().await.unwrap();
    assert_same_mission(&plan, &downloaded);
    assert!(downloaded.items()[0].current);
    assert_eq!(downloaded.items()[3].command, MavCmd::NavReturnToLaunch);
    assert!(station.link.snapshot().transfer.is_none());
}

#[tokio::test]
async fn empty_vehicle_downloads_empty_plan() {
    let (station, _vehicle) = tcp_pair(SimOptions::default()).await.unwrap();
    let plan = station.link.download_mission().await.unwrap();
    assert!(plan.is_empty());
}

#[tokio::test]
async fn survey_grid_uploads_over_tcp() {
    let (station, vehicle) = tcp_pair(SimOptions::default()).await.unwrap();
    let area = SurveyArea {
        north: 47.3990,
        south: 47.3970,
        east: 8.5470,
        west: 8.5440,
    };
    let plan = survey_grid(area, 40.0, 50.0).unwrap();
    let total = plan.len();
    assert!(total > 4);

    assert_eq!(station.link.upload_mission(plan).await.unwrap(), total);
    let mission = vehicle.state().mission;
    assert_eq!(mission.len(), total);
    assert_eq!(mission[1].command, MavCmd::NavTakeoff);
    assert_eq!(mission.last().unwrap().command, MavCmd::NavReturnToLaunch);
}

#[tokio::test]
async fn clear_empties_the_vehicle() {
    let (station, vehicle) = tcp_pair(SimOptions::default()).await.unwrap();
    let plan = MissionPlan::new(vec![
        waypoint(MavCmd::NavTakeoff, 47.0, 8.0, 15.0),
        waypoint(MavCmd::NavWaypoint, 47.001, 8.001, 15.0),
    ])
    .unwrap();
    station.link.upload_mission(plan).await.unwrap();
    assert_eq!(vehicle.state().mission.len(), 2);

    station.link.clear_mission().await.unwrap();
    let state = vehicle.state();
    assert!(state.mission.is_empty());
    assert_eq!(state.clears, 1);
}

#[tokio::test]
async fn vehicle_rejection_fails_the_upload() {
    let options = SimOptions {
        reject_uploads: Some(MissionResult::NoSpace),
        ..SimOptions::default()
    };
    let (station, vehicle) = udp_pair(options).await.unwrap();

    let err = station
        .link
        .upload_mission(MissionPlan::parse(PLAN).unwrap())
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            LinkError::Transfer(TransferFailure::Rejected {
                result: MissionResult::NoSpace
            })
        ),
        "{err}"
    );
    assert!(vehicle.state().mission.is_empty());
    assert!(station.link.snapshot().transfer.is_none());
}

#[tokio::test]
async fn transfers_need_a_link() {
    let station = Station::start();
    let err = station.link.download_mission().await.unwrap_err();
    assert!(matches!(err, LinkError::NotConnected));
}
