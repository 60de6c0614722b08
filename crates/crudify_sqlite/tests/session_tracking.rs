mod common;

use common::{open_test_session, Bar, Tag};
use crudify_sqlite::{CrudRepository, Session, SessionError};

#[test]
fn repository_create_leaves_nothing_tracked() {
    let session = open_test_session();
    let repo = CrudRepository::<Bar>::new(session.clone());

    let mut bar = Bar::new("tracked?");
    let id = repo.create(&mut bar).unwrap();

    assert!(!session.is_tracked::<Bar>(&id));
    assert_eq!(session.tracked_len(), 0);

    // An unrelated later flush must not re-persist anything.
    let report = session.save_changes().unwrap();
    assert_eq!(report.applied, 0);
}

#[test]
fn repository_update_leaves_nothing_tracked() {
    let session = open_test_session();
    let repo = CrudRepository::<Bar>::new(session.clone());

    let mut bar = Bar::new("v1");
    let id = repo.create(&mut bar).unwrap();
    bar.stool = "v2".to_string();
    repo.update(&bar).unwrap();

    assert!(!session.is_tracked::<Bar>(&id));
    assert_eq!(session.save_changes().unwrap().applied, 0);
}

#[test]
fn flushed_entity_stays_tracked_until_detached() {
    let session = open_test_session();

    let tag = Tag::new("sticky");
    session.add(&tag).unwrap();
    let report = session.save_changes().unwrap();
    assert_eq!(report.applied, 1);

    // Still occupying the identity map after the flush.
    assert!(session.is_tracked::<Tag>(&tag.uuid));

    // A second queue of the same key conflicts instead of shadowing.
    let err = session.update(&tag).unwrap_err();
    assert!(matches!(err, SessionError::AlreadyTracked { table: "tags", .. }));

    assert!(session.detach::<Tag>(&tag.uuid));
    session.update(&tag).unwrap();
    assert_eq!(session.save_changes().unwrap().applied, 1);
}

#[test]
fn detach_of_untracked_id_returns_false() {
    let session = Session::open_in_memory().expect("in-memory session should open");
    assert!(!session.detach::<Bar>(&1));
}

#[test]
fn store_generated_key_is_adopted_into_identity_map_on_flush() {
    let session = open_test_session();

    let bar = Bar::new("pending key");
    session.add(&bar).unwrap();
    let report = session.save_changes().unwrap();
    let rowid = report.last_insert_rowid.expect("insert should report a rowid");

    assert!(session.is_tracked::<Bar>(&rowid));
    assert!(session.detach::<Bar>(&rowid));
    assert_eq!(session.tracked_len(), 0);
}

#[test]
fn stale_update_fails_flush_and_keeps_queue() {
    let session = open_test_session();

    let ghost = Bar {
        id: 8080,
        stool: "never inserted".to_string(),
    };
    session.update(&ghost).unwrap();
    let err = session.save_changes().unwrap_err();
    assert!(matches!(err, SessionError::StaleUpdate { table: "bars", .. }));

    // The failed flush left the pending entry in place.
    assert!(session.is_tracked::<Bar>(&ghost.id));
}

#[test]
fn find_never_touches_the_tracker() {
    let session = open_test_session();
    let repo = CrudRepository::<Bar>::new(session.clone());

    let mut bar = Bar::new("read me");
    let id = repo.create(&mut bar).unwrap();

    let loaded = session.find::<Bar>(&id).unwrap();
    assert!(loaded.is_some());
    assert_eq!(session.tracked_len(), 0);
}

#[test]
fn flush_applies_queued_operations_in_order() {
    let session = open_test_session();

    let first = Tag::new("one");
    let second = Tag::new("two");
    session.add(&first).unwrap();
    session.add(&second).unwrap();

    let report = session.save_changes().unwrap();
    assert_eq!(report.applied, 2);
    assert!(session.find::<Tag>(&first.uuid).unwrap().is_some());
    assert!(session.find::<Tag>(&second.uuid).unwrap().is_some());
}
