//! Mission transfer state machine.
//!
//! Pure and clock-agnostic: the supervisor feeds it inbound messages and the
//! current time, and carries out the returned actions. One session at a time.
//!
//! Upload is driven by the vehicle. After MISSION_COUNT, each item goes out
//! only when the vehicle asks for it by sequence number, and the transfer
//! ends on MISSION_ACK. Download mirrors that with this station asking.
//! A step that sees no answer before its deadline resends the last message
//! (`retries` times) and then fails the session. Partial downloads are
//! dropped on failure.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use groundlink_core::mav::MissionResult;
use groundlink_core::message::{MissionAck, MissionCount, MissionItem, MissionRequest};
use groundlink_core::mission::Waypoint;
use groundlink_core::{Endpoint, Message, MissionPlan};

use crate::error::{LinkError, TransferFailure};
use crate::event::{TransferCompleted, TransferDirection};

/// Something the supervisor must do on behalf of the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferAction {
    Send(Message),
    Progress {
        direction: TransferDirection,
        done: u16,
        total: u16,
    },
    Finished {
        direction: TransferDirection,
        result: Result<TransferCompleted, TransferFailure>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SendingCount,
    SendingItems { remaining: u16 },
    AwaitingFinalAck,
    RequestingList,
    AwaitingCount,
    ReceivingItems { remaining: u16 },
    Clearing,
}

impl Stage {
    /// What the stage is waiting for, used in timeout reasons.
    pub fn awaiting(&self) -> &'static str {
        match self {
            Stage::SendingCount => "first item request",
            Stage::SendingItems { .. } => "next item request",
            Stage::AwaitingFinalAck => "final mission ack",
            Stage::RequestingList | Stage::AwaitingCount => "mission count",
            Stage::ReceivingItems { .. } => "mission item",
            Stage::Clearing => "clear ack",
        }
    }
}

/// Read-only view of the active session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferStatus {
    pub direction: TransferDirection,
    pub stage: Stage,
    pub done: u16,
    pub total: Option<u16>,
    pub retries_left: u8,
}

#[derive(Debug)]
struct Session {
    direction: TransferDirection,
    stage: Stage,
    target: Endpoint,
    /// Upload: the items being sent.
    outgoing: Vec<Waypoint>,
    /// Download: items collected so far, in order.
    incoming: Vec<Waypoint>,
    total: Option<u16>,
    done: u16,
    deadline: Instant,
    retries_left: u8,
    last_sent: Option<Message>,
}

#[derive(Debug)]
pub struct MissionTransferMachine {
    session: Option<Session>,
    local: Endpoint,
    step_timeout: Duration,
    retries: u8,
}

impl MissionTransferMachine {
    pub fn new(local: Endpoint, step_timeout: Duration, retries: u8) -> Self {
        Self {
            session: None,
            local,
            step_timeout,
            retries,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.session.as_ref().map(|s| s.deadline)
    }

    pub fn status(&self) -> Option<TransferStatus> {
        self.session.as_ref().map(|s| TransferStatus {
            direction: s.direction,
            stage: s.stage,
            done: s.done,
            total: s.total,
            retries_left: s.retries_left,
        })
    }

    pub fn start_upload(
        &mut self,
        plan: MissionPlan,
        target: Endpoint,
        now: Instant,
    ) -> Result<Vec<TransferAction>, LinkError> {
        self.ensure_idle()?;
        let items = plan.into_items();
        let count = u16::try_from(items.len())
            .map_err(|_| LinkError::InvalidArgument(format!("{} items exceed the mission limit", items.len())))?;

        let stage = if count == 0 {
            Stage::AwaitingFinalAck
        } else {
            Stage::SendingCount
        };
        let mut session = self.new_session(TransferDirection::Upload, stage, target, now);
        session.outgoing = items;
        session.total = Some(count);
        let send = session.send(Message::MissionCount(MissionCount { count, target }));
        self.session = Some(session);

        tracing::info!(count, target = ?target, "mission upload started");
        Ok(vec![
            send,
            TransferAction::Progress {
                direction: TransferDirection::Upload,
                done: 0,
                total: count,
            },
        ])
    }

    pub fn start_download(&mut self, target: Endpoint, now: Instant) -> Result<Vec<TransferAction>, LinkError> {
        self.ensure_idle()?;
        let mut session = self.new_session(TransferDirection::Download, Stage::RequestingList, target, now);
        let send = session.send(Message::MissionRequestList(target));
        // The list request is out; what remains is waiting for the count.
        session.stage = Stage::AwaitingCount;
        self.session = Some(session);

        tracing::info!(target = ?target, "mission download started");
        Ok(vec![send])
    }

    pub fn start_clear(&mut self, target: Endpoint, now: Instant) -> Result<Vec<TransferAction>, LinkError> {
        self.ensure_idle()?;
        let mut session = self.new_session(TransferDirection::Clear, Stage::Clearing, target, now);
        let send = session.send(Message::MissionClearAll(target));
        self.session = Some(session);

        tracing::info!(target = ?target, "mission clear started");
        Ok(vec![send])
    }

    /// Feed one inbound message. Messages not addressed to this station or
    /// not from the session's vehicle are ignored.
    pub fn handle(&mut self, sender: Endpoint, message: &Message, now: Instant) -> Vec<TransferAction> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if sender.system_id != session.target.system_id {
            return Vec::new();
        }
        let addressed = |target: &Endpoint| target.system_id == 0 || target.system_id == self.local.system_id;

        let outcome = match message {
            Message::MissionRequest(req) | Message::MissionRequestInt(req) if addressed(&req.target) => {
                session.on_request(req)
            }
            Message::MissionCount(count) if addressed(&count.target) => session.on_count(count),
            Message::MissionItemInt(item) if addressed(&item.target) => session.on_item(item),
            Message::MissionAck(ack) if addressed(&ack.target) => session.on_ack(ack),
            _ => Step::Ignored,
        };

        match outcome {
            Step::Ignored => Vec::new(),
            Step::Continue(actions) => {
                session.deadline = now + self.step_timeout;
                session.retries_left = self.retries;
                actions
            }
            Step::Done(mut actions, result) => {
                let direction = session.direction;
                self.session = None;
                log_finish(direction, &result);
                actions.push(TransferAction::Finished { direction, result });
                actions
            }
        }
    }

    /// Called when the session deadline passes. Resends or fails.
    pub fn on_deadline(&mut self, now: Instant) -> Vec<TransferAction> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if now < session.deadline {
            return Vec::new();
        }
        if session.retries_left > 0 {
            if let Some(last) = session.last_sent.clone() {
                session.retries_left -= 1;
                session.deadline = now + self.step_timeout;
                tracing::debug!(
                    stage = session.stage.awaiting(),
                    retries_left = session.retries_left,
                    "mission step timed out, resending"
                );
                return vec![TransferAction::Send(last)];
            }
        }
        let failure = TransferFailure::Timeout {
            stage: session.stage.awaiting(),
        };
        self.fail(failure).into_iter().collect()
    }

    /// Abort the active session. An explicit cancel also tells the vehicle.
    pub fn cancel(&mut self, failure: TransferFailure) -> Vec<TransferAction> {
        let mut actions = Vec::new();
        if failure == TransferFailure::Cancelled {
            if let Some(session) = &self.session {
                actions.push(TransferAction::Send(Message::MissionAck(MissionAck {
                    target: session.target,
                    result: MissionResult::OperationCancelled,
                })));
            }
        }
        actions.extend(self.fail(failure));
        actions
    }

    fn fail(&mut self, failure: TransferFailure) -> Option<TransferAction> {
        let session = self.session.take()?;
        let result = Err(failure);
        log_finish(session.direction, &result);
        Some(TransferAction::Finished {
            direction: session.direction,
            result,
        })
    }

    fn ensure_idle(&self) -> Result<(), LinkError> {
        if self.session.is_some() {
            return Err(LinkError::TransferInProgress);
        }
        Ok(())
    }

    fn new_session(&self, direction: TransferDirection, stage: Stage, target: Endpoint, now: Instant) -> Session {
        Session {
            direction,
            stage,
            target,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            total: None,
            done: 0,
            deadline: now + self.step_timeout,
            retries_left: self.retries,
            last_sent: None,
        }
    }
}

fn log_finish(direction: TransferDirection, result: &Result<TransferCompleted, TransferFailure>) {
    match result {
        Ok(_) => tracing::info!(?direction, "mission transfer complete"),
        Err(failure) => tracing::warn!(?direction, %failure, "mission transfer failed"),
    }
}

enum Step {
    Ignored,
    /// Progress made; the step deadline restarts.
    Continue(Vec<TransferAction>),
    Done(Vec<TransferAction>, Result<TransferCompleted, TransferFailure>),
}

impl Session {
    fn send(&mut self, message: Message) -> TransferAction {
        self.last_sent = Some(message.clone());
        TransferAction::Send(message)
    }

    fn on_request(&mut self, req: &MissionRequest) -> Step {
        if self.direction != TransferDirection::Upload {
            return Step::Ignored;
        }
        let count = self.outgoing.len() as u16;
        if req.seq >= count {
            return Step::Ignored;
        }
        if !matches!(
            self.stage,
            Stage::SendingCount | Stage::SendingItems { .. } | Stage::AwaitingFinalAck
        ) {
            return Step::Ignored;
        }
        let mut waypoint = self.outgoing[req.seq as usize].clone();
        waypoint.seq = req.seq;
        let send = self.send(Message::MissionItemInt(MissionItem {
            target: self.target,
            waypoint,
        }));

        let remaining = count - req.seq - 1;
        self.stage = if remaining == 0 {
            Stage::AwaitingFinalAck
        } else {
            Stage::SendingItems { remaining }
        };
        self.done = self.done.max(req.seq + 1);
        Step::Continue(vec![
            send,
            TransferAction::Progress {
                direction: self.direction,
                done: self.done,
                total: count,
            },
        ])
    }

    fn on_count(&mut self, count: &MissionCount) -> Step {
        if self.stage != Stage::AwaitingCount {
            return Step::Ignored;
        }
        self.total = Some(count.count);
        if count.count == 0 {
            let ack = self.send(self.accept_ack());
            return Step::Done(
                vec![ack],
                Ok(TransferCompleted::Downloaded {
                    plan: MissionPlan::default(),
                }),
            );
        }
        self.stage = Stage::ReceivingItems {
            remaining: count.count,
        };
        let request = self.send(self.request(0));
        Step::Continue(vec![
            request,
            TransferAction::Progress {
                direction: self.direction,
                done: 0,
                total: count.count,
            },
        ])
    }

    fn on_item(&mut self, item: &MissionItem) -> Step {
        let Stage::ReceivingItems { .. } = self.stage else {
            return Step::Ignored;
        };
        let total = self.total.unwrap_or(0);
        let expected = self.incoming.len() as u16;
        // Out-of-order or duplicate items are dropped; the outstanding
        // request (or its retry) asks for the right one.
        if item.waypoint.seq != expected {
            return Step::Ignored;
        }
        self.incoming.push(item.waypoint.clone());
        self.done = expected + 1;
        let progress = TransferAction::Progress {
            direction: self.direction,
            done: self.done,
            total,
        };

        if self.done >= total {
            let ack = self.send(self.accept_ack());
            // A u16 count never exceeds the plan limit.
            let plan = MissionPlan::new(std::mem::take(&mut self.incoming)).unwrap_or_default();
            return Step::Done(vec![progress, ack], Ok(TransferCompleted::Downloaded { plan }));
        }
        self.stage = Stage::ReceivingItems {
            remaining: total - self.done,
        };
        let request = self.send(self.request(self.done));
        Step::Continue(vec![request, progress])
    }

    fn on_ack(&mut self, ack: &MissionAck) -> Step {
        if ack.result != MissionResult::Accepted {
            return Step::Done(Vec::new(), Err(TransferFailure::Rejected { result: ack.result }));
        }
        match (self.direction, self.stage) {
            (TransferDirection::Upload, Stage::AwaitingFinalAck) => Step::Done(
                Vec::new(),
                Ok(TransferCompleted::Uploaded {
                    count: self.outgoing.len(),
                }),
            ),
            (TransferDirection::Clear, Stage::Clearing) => Step::Done(Vec::new(), Ok(TransferCompleted::Cleared)),
            // An early accept mid-upload or mid-download is not a completion.
            _ => Step::Ignored,
        }
    }

    fn request(&self, seq: u16) -> Message {
        Message::MissionRequestInt(MissionRequest {
            seq,
            target: self.target,
        })
    }

    fn accept_ack(&self) -> Message {
        Message::MissionAck(MissionAck {
            target: self.target,
            result: MissionResult::Accepted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundlink_core::mav::MavCmd;

    const LOCAL: Endpoint = Endpoint::new(255, 190);
    const VEHICLE: Endpoint = Endpoint::new(1, 1);
    const STEP: Duration = Duration::from_secs(3);

    fn machine() -> MissionTransferMachine {
        MissionTransferMachine::new(LOCAL, STEP, 1)
    }

    fn plan(n: usize) -> MissionPlan {
        MissionPlan::new(
            (0..n)
                .map(|i| Waypoint::new(MavCmd::NavWaypoint, 47.0 + i as f64 * 0.001, 8.5, 30.0))
                .collect(),
        )
        .unwrap()
    }

    fn request(seq: u16) -> Message {
        Message::MissionRequestInt(MissionRequest { seq, target: LOCAL })
    }

    fn ack(result: MissionResult) -> Message {
        Message::MissionAck(MissionAck { target: LOCAL, result })
    }

    fn item(seq: u16) -> Message {
        let mut waypoint = Waypoint::new(MavCmd::NavWaypoint, 47.0, 8.0 + seq as f64, 20.0);
        waypoint.seq = seq;
        Message::MissionItemInt(MissionItem { target: LOCAL, waypoint })
    }

    fn sent(actions: &[TransferAction]) -> Vec<&Message> {
        actions
            .iter()
            .filter_map(|a| match a {
                TransferAction::Send(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn finished(actions: &[TransferAction]) -> Option<&Result<TransferCompleted, TransferFailure>> {
        actions.iter().find_map(|a| match a {
            TransferAction::Finished { result, .. } => Some(result),
            _ => None,
        })
    }

    #[test]
    fn upload_three_items_on_request_without_duplicates() {
        let now = Instant::now();
        let mut m = machine();
        let actions = m.start_upload(plan(3), VEHICLE, now).unwrap();
        assert!(matches!(
            sent(&actions).as_slice(),
            [Message::MissionCount(MissionCount { count: 3, .. })]
        ));
        assert_eq!(m.status().unwrap().stage, Stage::SendingCount);

        let mut item_seqs = Vec::new();
        for seq in 0..3 {
            let actions = m.handle(VEHICLE, &request(seq), now);
            for msg in sent(&actions) {
                match msg {
                    Message::MissionItemInt(item) => item_seqs.push(item.waypoint.seq),
                    other => panic!("unexpected send {:?}", other),
                }
            }
        }
        assert_eq!(item_seqs, vec![0, 1, 2]);
        assert_eq!(m.status().unwrap().stage, Stage::AwaitingFinalAck);

        let actions = m.handle(VEHICLE, &ack(MissionResult::Accepted), now);
        assert_eq!(finished(&actions), Some(&Ok(TransferCompleted::Uploaded { count: 3 })));
        assert!(!m.is_active());
    }

    #[test]
    fn upload_ignores_requests_out_of_range_or_for_others() {
        let now = Instant::now();
        let mut m = machine();
        m.start_upload(plan(2), VEHICLE, now).unwrap();
        assert!(m.handle(VEHICLE, &request(2), now).is_empty());
        let for_other = Message::MissionRequestInt(MissionRequest {
            seq: 0,
            target: Endpoint::new(42, 190),
        });
        assert!(m.handle(VEHICLE, &for_other, now).is_empty());
        assert!(m.handle(Endpoint::new(9, 1), &request(0), now).is_empty());
        assert_eq!(m.status().unwrap().stage, Stage::SendingCount);
    }

    #[test]
    fn upload_rejection_names_the_result() {
        let now = Instant::now();
        let mut m = machine();
        m.start_upload(plan(1), VEHICLE, now).unwrap();
        m.handle(VEHICLE, &request(0), now);
        let actions = m.handle(VEHICLE, &ack(MissionResult::NoSpace), now);
        assert_eq!(
            finished(&actions),
            Some(&Err(TransferFailure::Rejected {
                result: MissionResult::NoSpace
            }))
        );
    }

    #[test]
    fn empty_upload_awaits_ack_directly() {
        let now = Instant::now();
        let mut m = machine();
        m.start_upload(MissionPlan::default(), VEHICLE, now).unwrap();
        assert_eq!(m.status().unwrap().stage, Stage::AwaitingFinalAck);
        let actions = m.handle(VEHICLE, &ack(MissionResult::Accepted), now);
        assert_eq!(finished(&actions), Some(&Ok(TransferCompleted::Uploaded { count: 0 })));
    }

    #[test]
    fn download_with_zero_count_completes_empty() {
        let now = Instant::now();
        let mut m = machine();
        let actions = m.start_download(VEHICLE, now).unwrap();
        assert_eq!(sent(&actions), vec![&Message::MissionRequestList(VEHICLE)]);

        let count = Message::MissionCount(MissionCount { count: 0, target: LOCAL });
        let actions = m.handle(VEHICLE, &count, now);
        assert!(matches!(sent(&actions).as_slice(), [Message::MissionAck(_)]));
        assert_eq!(
            finished(&actions),
            Some(&Ok(TransferCompleted::Downloaded {
                plan: MissionPlan::default()
            }))
        );
        assert!(!m.is_active());
    }

    #[test]
    fn download_collects_in_order_and_ignores_strays() {
        let now = Instant::now();
        let mut m = machine();
        m.start_download(VEHICLE, now).unwrap();
        let actions = m.handle(VEHICLE, &Message::MissionCount(MissionCount { count: 2, target: LOCAL }), now);
        assert_eq!(sent(&actions), vec![&request_to_vehicle(0)]);

        // Item 1 before item 0 is ignored.
        assert!(m.handle(VEHICLE, &item(1), now).is_empty());
        let actions = m.handle(VEHICLE, &item(0), now);
        assert_eq!(sent(&actions), vec![&request_to_vehicle(1)]);
        // Duplicate of 0 is ignored.
        assert!(m.handle(VEHICLE, &item(0), now).is_empty());

        let actions = m.handle(VEHICLE, &item(1), now);
        match finished(&actions) {
            Some(Ok(TransferCompleted::Downloaded { plan })) => {
                assert_eq!(plan.len(), 2);
                assert!(plan.items()[0].current);
                assert_eq!(plan.items()[1].longitude, 9.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    fn request_to_vehicle(seq: u16) -> Message {
        Message::MissionRequestInt(MissionRequest { seq, target: VEHICLE })
    }

    #[test]
    fn second_transfer_is_rejected_and_first_untouched() {
        let now = Instant::now();
        let mut m = machine();
        m.start_download(VEHICLE, now).unwrap();
        m.handle(VEHICLE, &Message::MissionCount(MissionCount { count: 3, target: LOCAL }), now);
        m.handle(VEHICLE, &item(0), now);
        let before = m.status();
        assert_eq!(before.as_ref().unwrap().stage, Stage::ReceivingItems { remaining: 2 });

        assert!(matches!(
            m.start_upload(plan(2), VEHICLE, now),
            Err(LinkError::TransferInProgress)
        ));
        assert!(matches!(m.start_clear(VEHICLE, now), Err(LinkError::TransferInProgress)));
        assert_eq!(m.status(), before);

        m.handle(VEHICLE, &item(1), now);
        let actions = m.handle(VEHICLE, &item(2), now);
        assert!(matches!(finished(&actions), Some(Ok(TransferCompleted::Downloaded { plan })) if plan.len() == 3));
    }

    #[test]
    fn deadline_resends_once_then_fails() {
        let t0 = Instant::now();
        let mut m = machine();
        m.start_download(VEHICLE, t0).unwrap();

        assert!(m.on_deadline(t0 + Duration::from_secs(1)).is_empty());
        let retry = m.on_deadline(t0 + STEP);
        assert_eq!(sent(&retry), vec![&Message::MissionRequestList(VEHICLE)]);
        assert_eq!(m.deadline(), Some(t0 + STEP * 2));

        let actions = m.on_deadline(t0 + STEP * 2);
        assert_eq!(
            finished(&actions),
            Some(&Err(TransferFailure::Timeout { stage: "mission count" }))
        );
        assert!(!m.is_active());
    }

    #[test]
    fn progress_restores_retry_budget() {
        let t0 = Instant::now();
        let mut m = machine();
        m.start_upload(plan(2), VEHICLE, t0).unwrap();
        m.on_deadline(t0 + STEP);
        assert_eq!(m.status().unwrap().retries_left, 0);

        let t1 = t0 + STEP + Duration::from_secs(1);
        m.handle(VEHICLE, &request(0), t1);
        let status = m.status().unwrap();
        assert_eq!(status.retries_left, 1);
        assert_eq!(m.deadline(), Some(t1 + STEP));
    }

    #[test]
    fn clear_completes_on_accept() {
        let now = Instant::now();
        let mut m = machine();
        let actions = m.start_clear(VEHICLE, now).unwrap();
        assert_eq!(sent(&actions), vec![&Message::MissionClearAll(VEHICLE)]);
        let actions = m.handle(VEHICLE, &ack(MissionResult::Accepted), now);
        assert_eq!(finished(&actions), Some(&Ok(TransferCompleted::Cleared)));
    }

    #[test]
    fn explicit_cancel_notifies_vehicle_but_link_loss_does_not() {
        let now = Instant::now();
        let mut m = machine();
        m.start_download(VEHICLE, now).unwrap();
        let actions = m.cancel(TransferFailure::Cancelled);
        assert!(matches!(
            sent(&actions).as_slice(),
            [Message::MissionAck(MissionAck {
                result: MissionResult::OperationCancelled,
                ..
            })]
        ));
        assert_eq!(finished(&actions), Some(&Err(TransferFailure::Cancelled)));

        m.start_upload(plan(1), VEHICLE, now).unwrap();
        let actions = m.cancel(TransferFailure::LinkClosed);
        assert!(sent(&actions).is_empty());
        assert_eq!(finished(&actions), Some(&Err(TransferFailure::LinkClosed)));
        assert!(m.cancel(TransferFailure::LinkClosed).is_empty());
    }
}
