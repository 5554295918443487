//! End-to-end order flows: the full production walk with staged
//! releases, the auto-approval sweep, the rejection → dispute → refund
//! path, and the concurrent-decision race.

use std::sync::Arc;
use std::thread;

use darzi_core::{ActorId, DomainEvent, EventSink, MemorySink, Money, OrderId, Timestamp};
use darzi_dispute::{
    DisputePriority, DisputeService, DisputeStatus, MemoryDisputeStore, ResolutionType,
};
use darzi_escrow::{EscrowLedger, EscrowStage, MemoryEscrowStore};
use darzi_milestone::{
    ApprovalEngine, ApprovalStatus, AutoApprovalScheduler, EvidenceRef, MemoryMilestoneStore,
    MilestoneError, MilestoneTracker, ProductionStage,
};

struct Harness {
    ledger: Arc<EscrowLedger>,
    disputes: Arc<DisputeService>,
    tracker: MilestoneTracker,
    engine: Arc<ApprovalEngine>,
    scheduler: AutoApprovalScheduler,
    sink: Arc<MemorySink>,
    customer: ActorId,
    tailor: ActorId,
}

fn harness() -> Harness {
    let sink = Arc::new(MemorySink::new());
    let ledger = Arc::new(EscrowLedger::new(
        Arc::new(MemoryEscrowStore::new()),
        sink.clone() as Arc<dyn EventSink>,
    ));
    let disputes = Arc::new(DisputeService::new(
        Arc::new(MemoryDisputeStore::new()),
        ledger.clone(),
        sink.clone(),
    ));
    let store = Arc::new(MemoryMilestoneStore::new());
    let engine = Arc::new(ApprovalEngine::new(
        store.clone(),
        ledger.clone(),
        disputes.clone(),
        sink.clone(),
    ));
    let tracker = MilestoneTracker::new(store.clone(), sink.clone());
    let scheduler = AutoApprovalScheduler::new(engine.clone(), store);
    Harness {
        ledger,
        disputes,
        tracker,
        engine,
        scheduler,
        sink,
        customer: ActorId::new(),
        tailor: ActorId::new(),
    }
}

fn evidence(name: &str) -> EvidenceRef {
    EvidenceRef {
        url: format!("https://cdn.example/milestones/{name}.jpg"),
        mime_type: "image/jpeg".into(),
    }
}

fn t(hours: i64) -> Timestamp {
    Timestamp::parse("2026-03-01T09:00:00Z")
        .unwrap()
        .plus_hours(hours)
}

#[test]
fn full_production_walk_releases_all_three_stages() {
    let h = harness();
    let order_id = OrderId::new();
    h.ledger
        .initialize(order_id, Money::from_major(1_000), None)
        .unwrap();
    h.ledger
        .record_payment(
            order_id,
            EscrowStage::Deposit,
            Money::from_major(250),
            "pay_walk_deposit",
        )
        .unwrap();

    let mut clock = 0;
    for stage in ProductionStage::ALL {
        let milestone = h
            .tracker
            .submit_evidence_at(order_id, stage, evidence(stage.as_str()), None, h.tailor, t(clock))
            .unwrap();
        let result = h
            .engine
            .approve_at(milestone.id, h.customer, None, t(clock + 1))
            .unwrap();
        assert_eq!(result.released, stage.gated_escrow_stage());
        clock += 2;

        // Capture the next stage's payment once its gate opens.
        match stage {
            ProductionStage::FabricSelected => {
                h.ledger
                    .record_payment(
                        order_id,
                        EscrowStage::Fitting,
                        Money::from_major(500),
                        "pay_walk_fitting",
                    )
                    .unwrap();
            }
            ProductionStage::FittingReady => {
                h.ledger
                    .record_payment(
                        order_id,
                        EscrowStage::Final,
                        Money::from_major(250),
                        "pay_walk_final",
                    )
                    .unwrap();
            }
            _ => {}
        }
    }

    let escrow = h.ledger.get(order_id).unwrap();
    assert_eq!(escrow.stage, EscrowStage::Released);
    assert_eq!(escrow.released, Money::from_major(1_000));
    assert_eq!(escrow.balance(), Money::ZERO);

    let events = h.sink.events();
    let releases: Vec<Money> = events
        .iter()
        .filter_map(|e| match e {
            DomainEvent::StageReleased { amount, .. } => Some(*amount),
            _ => None,
        })
        .collect();
    assert_eq!(
        releases,
        vec![
            Money::from_major(250),
            Money::from_major(500),
            Money::from_major(250)
        ]
    );
    let submissions = events
        .iter()
        .filter(|e| matches!(e, DomainEvent::MilestoneSubmitted { .. }))
        .count();
    assert_eq!(submissions, 7);
}

#[test]
fn sweep_force_approves_after_forty_eight_hours() {
    let h = harness();
    let order_id = OrderId::new();
    h.ledger
        .initialize(order_id, Money::from_major(1_000), None)
        .unwrap();

    let milestone = h
        .tracker
        .submit_evidence_at(
            order_id,
            ProductionStage::FabricSelected,
            evidence("fabric"),
            Some("Charcoal wool, 2.8m".into()),
            h.tailor,
            t(0),
        )
        .unwrap();

    // Customer never responds; at t+49h the sweep steps in.
    let report = h.scheduler.sweep(t(49)).unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.auto_approved, 1);
    assert!(report.failures.is_empty());

    let escrow = h.ledger.get(order_id).unwrap();
    assert_eq!(escrow.stage, EscrowStage::Fitting);
    assert_eq!(escrow.released, Money::from_major(250));

    // The approval is attributed to the system actor.
    let auto = h
        .sink
        .events()
        .into_iter()
        .find_map(|e| match e {
            DomainEvent::MilestoneApproved {
                decided_by, auto, ..
            } => Some((decided_by, auto)),
            _ => None,
        })
        .unwrap();
    assert!(auto.0.is_system());
    assert!(auto.1);

    // A second sweep finds nothing.
    let report = h.scheduler.sweep(t(50)).unwrap();
    assert_eq!(report.due, 0);

    // The sequence continues as if the customer had approved.
    assert!(h
        .tracker
        .submit_evidence_at(
            order_id,
            ProductionStage::Cutting,
            evidence("cutting"),
            None,
            h.tailor,
            t(50),
        )
        .is_ok());
    let decided = h
        .tracker
        .milestones_for_order(order_id)
        .unwrap()
        .into_iter()
        .find(|m| m.id == milestone.id)
        .unwrap();
    assert_eq!(decided.status, ApprovalStatus::AutoApproved);
}

#[test]
fn rejection_opens_dispute_and_refund_settles_it() {
    let h = harness();
    let order_id = OrderId::new();
    let admin = ActorId::new();
    h.ledger
        .initialize(order_id, Money::from_major(1_000), None)
        .unwrap();
    h.ledger
        .record_payment(
            order_id,
            EscrowStage::Deposit,
            Money::from_major(250),
            "pay_reject_deposit",
        )
        .unwrap();

    // Walk past the deposit gate so there is released money alongside
    // the remaining balance.
    let fabric = h
        .tracker
        .submit_evidence_at(
            order_id,
            ProductionStage::FabricSelected,
            evidence("fabric"),
            None,
            h.tailor,
            t(0),
        )
        .unwrap();
    h.engine.approve_at(fabric.id, h.customer, None, t(1)).unwrap();

    let cutting = h
        .tracker
        .submit_evidence_at(
            order_id,
            ProductionStage::Cutting,
            evidence("cutting"),
            None,
            h.tailor,
            t(2),
        )
        .unwrap();
    let rejected = h
        .engine
        .reject_at(cutting.id, h.customer, "pieces cut against the grain", t(3))
        .unwrap();

    let dispute_id = rejected.milestone.dispute_id.unwrap();
    let dispute = h.disputes.get(dispute_id).unwrap();
    assert_eq!(dispute.status, DisputeStatus::Open);
    assert_eq!(dispute.priority, DisputePriority::High);
    assert_eq!(dispute.sla_deadline, dispute.created_at.plus_hours(24));
    assert_eq!(dispute.milestone_id, Some(cutting.id));

    // Admin takes the case and refunds part of the remaining funds.
    h.disputes.assign(dispute_id, admin).unwrap();
    let resolved = h
        .disputes
        .resolve(
            dispute_id,
            ResolutionType::PartialRefund,
            "refund for recut fabric",
            Some(Money::from_major(100)),
            admin,
        )
        .unwrap();
    assert_eq!(resolved.status, DisputeStatus::Resolved);

    let escrow = h.ledger.get(order_id).unwrap();
    assert_eq!(escrow.refunded, Money::from_major(100));
    // Partial refund leaves the stage progression intact.
    assert_eq!(escrow.stage, EscrowStage::Fitting);

    // The tailor may resubmit the rejected step.
    let retry = h
        .tracker
        .submit_evidence_at(
            order_id,
            ProductionStage::Cutting,
            evidence("cutting-2"),
            None,
            h.tailor,
            t(8),
        )
        .unwrap();
    assert_eq!(retry.attempt, 2);

    h.disputes.close(dispute_id).unwrap();
    assert_eq!(
        h.disputes.get(dispute_id).unwrap().status,
        DisputeStatus::Closed
    );
}

#[test]
fn concurrent_decisions_have_exactly_one_winner() {
    let h = harness();
    let order_id = OrderId::new();
    h.ledger
        .initialize(order_id, Money::from_major(1_000), None)
        .unwrap();
    let milestone = h
        .tracker
        .submit_evidence_at(
            order_id,
            ProductionStage::FabricSelected,
            evidence("fabric"),
            None,
            h.tailor,
            t(0),
        )
        .unwrap();

    let engine = h.engine.clone();
    let customer = h.customer;
    let milestone_id = milestone.id;
    let approver = thread::spawn(move || engine.approve_at(milestone_id, customer, None, t(1)));
    let engine = h.engine.clone();
    let rejecter =
        thread::spawn(move || engine.reject_at(milestone_id, customer, "not this fabric", t(1)));

    let outcomes = [approver.join().unwrap(), rejecter.join().unwrap()];
    let wins = outcomes.iter().filter(|o| o.is_ok()).count();
    let losses = outcomes
        .iter()
        .filter(|o| matches!(o, Err(MilestoneError::AlreadyDecided { .. })))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(losses, 1);

    // Downstream effects match the winner exactly once.
    let escrow = h.ledger.get(order_id).unwrap();
    let decided = h
        .tracker
        .milestones_for_order(order_id)
        .unwrap()
        .into_iter()
        .find(|m| m.id == milestone_id)
        .unwrap();
    match decided.status {
        ApprovalStatus::Approved => {
            assert_eq!(escrow.released, Money::from_major(250));
            assert!(decided.dispute_id.is_none());
        }
        ApprovalStatus::Rejected => {
            assert_eq!(escrow.released, Money::ZERO);
            assert!(decided.dispute_id.is_some());
        }
        other => panic!("unexpected terminal status {other}"),
    }
}
