//! End-to-end properties of the access-control core: checkpoint handover,
//! presence alternation, idempotent retries, and exactly-one-winner behavior
//! under concurrent requests.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};

use warden_core::{
    AccessError, AccessService, AdminProof, CheckpointRegistry, PresenceError, PresenceLedger,
    SessionError, StaticDirectory,
};
use warden_store::AccessStore;
use warden_types::{
    AccessEvent, Affiliation, CheckpointId, DeviceInfo, Direction, GuardId, PersonId,
    PersonProfile, SessionToken,
};

fn person(id: &str, enrolled: bool) -> PersonProfile {
    PersonProfile {
        id: PersonId::new(id),
        name: format!("Person {id}"),
        affiliation: Affiliation {
            faculty: "FIIS".to_string(),
            school: "Systems".to_string(),
        },
        enrolled,
    }
}

fn service() -> AccessService {
    let store = Arc::new(AccessStore::open_in_memory().expect("open store"));
    let directory = Arc::new(StaticDirectory::new([
        person("P123", true),
        person("P456", true),
        person("P-lapsed", false),
    ]));
    AccessService::new(
        CheckpointRegistry::new(Arc::clone(&store)),
        PresenceLedger::new(store, directory),
    )
}

fn start(service: &AccessService, guard: &str, checkpoint: &str) -> warden_types::GuardSession {
    service
        .registry()
        .start_session(
            GuardId::new(guard),
            format!("Guard {guard}"),
            CheckpointId::new(checkpoint),
            DeviceInfo::default(),
        )
        .expect("start session")
}

fn event(
    person: &str,
    checkpoint: &str,
    token: &SessionToken,
    direction: Direction,
) -> AccessEvent {
    AccessEvent {
        person_id: PersonId::new(person),
        checkpoint_id: CheckpointId::new(checkpoint),
        token: token.clone(),
        direction,
        at: Utc::now(),
    }
}

#[test]
fn gate_handover_scenario() {
    let service = service();

    // Guard A takes Gate-1.
    let a = start(&service, "A", "Gate-1");

    // Guard B is refused and told who is in control.
    let err = service
        .registry()
        .start_session(
            GuardId::new("B"),
            "Guard B",
            CheckpointId::new("Gate-1"),
            DeviceInfo::default(),
        )
        .expect_err("B must be refused");
    match err {
        SessionError::CheckpointOccupied { owner, .. } => {
            assert_eq!(owner.guard_id, GuardId::new("A"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // A hands over; B's retry wins the next ownership epoch.
    service.registry().end_session(&a.token).expect("end A");
    let b = start(&service, "B", "Gate-1");
    assert_eq!(b.checkpoint_id, CheckpointId::new("Gate-1"));
}

#[test]
fn person_entry_exit_scenario() {
    let service = service();
    let gate1 = start(&service, "A", "Gate-1");
    let gate2 = start(&service, "B", "Gate-2");

    // P123 enters through Gate-1.
    let entered = service
        .apply(&event("P123", "Gate-1", &gate1.token, Direction::Enter))
        .expect("entry");
    assert!(entered.inside);
    assert_eq!(entered.entry_guard, GuardId::new("A"));

    // A second entry from a different checkpoint is refused with context.
    let err = service
        .apply(&event("P123", "Gate-2", &gate2.token, Direction::Enter))
        .expect_err("second entry must fail");
    match err {
        AccessError::Presence(PresenceError::AlreadyInside { checkpoint_id, .. }) => {
            assert_eq!(checkpoint_id, CheckpointId::new("Gate-1"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Exit through Gate-2 closes the stay and computes dwell.
    let exited = service
        .apply(&event("P123", "Gate-2", &gate2.token, Direction::Exit))
        .expect("exit");
    assert!(!exited.inside);
    assert_eq!(exited.exit_guard, Some(GuardId::new("B")));
    let dwell = exited.dwell().expect("dwell");
    assert!(dwell >= TimeDelta::zero());
    assert_eq!(
        exited.exited_at.expect("exited_at") - exited.entered_at,
        dwell
    );
    assert!(service.ledger().list_inside().expect("inside").is_empty());
}

#[test]
fn presence_alternates_strictly() {
    let service = service();
    let gate = start(&service, "A", "Gate-1");
    let person = PersonId::new("P123");

    for _ in 0..3 {
        service
            .apply(&event("P123", "Gate-1", &gate.token, Direction::Enter))
            .expect("entry");
        // A second consecutive entry can never succeed.
        assert!(matches!(
            service.apply(&event("P123", "Gate-1", &gate.token, Direction::Enter)),
            Err(AccessError::Presence(PresenceError::AlreadyInside { .. }))
        ));

        service
            .apply(&event("P123", "Gate-1", &gate.token, Direction::Exit))
            .expect("exit");
        // A second consecutive exit can never succeed.
        assert!(matches!(
            service.apply(&event("P123", "Gate-1", &gate.token, Direction::Exit)),
            Err(AccessError::Presence(PresenceError::NotInside { .. }))
        ));
    }

    assert_eq!(
        service.ledger().suggested_direction(&person).expect("suggest"),
        Direction::Enter
    );
}

#[test]
fn concurrent_claims_have_one_winner_per_epoch() {
    let store = Arc::new(AccessStore::open_in_memory().expect("open store"));
    let registry = Arc::new(CheckpointRegistry::new(store));

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    registry.start_session(
                        GuardId::new(format!("G{i}")),
                        format!("Guard {i}"),
                        CheckpointId::new("Gate-R"),
                        DeviceInfo::default(),
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("join")).collect()
    });

    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(winners.len(), 1, "exactly one claim wins the epoch");

    let winner_guard = winners[0].as_ref().expect("winner").guard_id.clone();
    for result in &results {
        if let Err(err) = result {
            match err {
                SessionError::CheckpointOccupied { owner, .. } => {
                    assert_eq!(owner.guard_id, winner_guard);
                }
                other => panic!("loser saw unexpected error: {other}"),
            }
        }
    }
}

#[test]
fn concurrent_entries_admit_exactly_one() {
    let store = Arc::new(AccessStore::open_in_memory().expect("open store"));
    let directory = Arc::new(StaticDirectory::new([person("P123", true)]));
    let ledger = Arc::new(PresenceLedger::new(store, directory));

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                scope.spawn(move || {
                    ledger.record_entry(
                        &PersonId::new("P123"),
                        &CheckpointId::new(format!("Gate-{i}")),
                        &GuardId::new(format!("G{i}")),
                        Utc::now(),
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("join")).collect()
    });

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1, "exactly one entry is admitted");
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(err, PresenceError::AlreadyInside { .. }));
        }
    }
    assert_eq!(ledger.list_inside().expect("inside").len(), 1);
}

#[test]
fn force_end_frees_the_checkpoint_and_expires_the_token() {
    let service = service();
    let a = start(&service, "A", "Gate-1");

    let closed = service
        .registry()
        .force_end_all(&GuardId::new("A"), AdminProof::verified())
        .expect("force end");
    assert_eq!(closed, 1);

    assert!(matches!(
        service.registry().heartbeat(&a.token),
        Err(SessionError::Expired)
    ));
    // Events signed with the dead token are refused...
    assert!(matches!(
        service.apply(&event("P123", "Gate-1", &a.token, Direction::Enter)),
        Err(AccessError::Session(SessionError::Expired))
    ));
    // ...and the checkpoint is claimable again.
    start(&service, "B", "Gate-1");
}

#[test]
fn event_checkpoint_must_match_session() {
    let service = service();
    let a = start(&service, "A", "Gate-1");

    // Token is live, but the event claims to come from a different gate.
    assert!(matches!(
        service.apply(&event("P123", "Gate-2", &a.token, Direction::Enter)),
        Err(AccessError::Session(SessionError::Expired))
    ));
}

#[test]
fn unknown_and_unenrolled_people_are_refused() {
    let service = service();
    let a = start(&service, "A", "Gate-1");

    assert!(matches!(
        service.apply(&event("ghost", "Gate-1", &a.token, Direction::Enter)),
        Err(AccessError::Presence(PresenceError::PersonUnknown { .. }))
    ));
    assert!(matches!(
        service.apply(&event("P-lapsed", "Gate-1", &a.token, Direction::Enter)),
        Err(AccessError::Presence(PresenceError::NotEnrolled { .. }))
    ));
}

#[test]
fn overdue_report_reflects_entry_age() {
    let service = service();
    let a = start(&service, "A", "Gate-1");

    let mut old_entry = event("P123", "Gate-1", &a.token, Direction::Enter);
    old_entry.at = Utc::now() - TimeDelta::hours(9);
    service.apply(&old_entry).expect("backdated entry");
    service
        .apply(&event("P456", "Gate-1", &a.token, Direction::Enter))
        .expect("fresh entry");

    let overdue = service
        .ledger()
        .list_overdue(TimeDelta::hours(8))
        .expect("overdue");
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].person_id, PersonId::new("P123"));
}
