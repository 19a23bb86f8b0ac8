use std::sync::Arc;

use chrono::{TimeZone, Utc};
use quest_log_sync::autosave::SaveStatus;
use quest_log_sync::clock::ManualClock;
use quest_log_sync::persistence::PersistenceAdapter;
use quest_log_sync::storage::{FileCache, LocalCache, MemoryCache};
use quest_log_sync::testing::FakeRemote;
use quest_log_sync::transfer;
use quest_log_sync::types::QuestDraft;
use quest_log_sync::{QuestLogSession, SessionConfig};

struct Fixture {
    remote: Arc<FakeRemote>,
    cache: Arc<MemoryCache>,
    clock: Arc<ManualClock>,
    session: QuestLogSession,
}

fn fixture() -> Fixture {
    let remote = Arc::new(FakeRemote::new());
    let cache = Arc::new(MemoryCache::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
    ));
    let persistence = PersistenceAdapter::new(Box::new(remote.clone()), Box::new(cache.clone()));
    let mut session = QuestLogSession::new(persistence, clock.clone(), SessionConfig::default());
    session.start();
    Fixture {
        remote,
        cache,
        clock,
        session,
    }
}

#[test]
fn dragon_hunt_scenario() {
    let mut f = fixture();
    let mut stamps = Vec::new();

    f.session.create_log("Dragon Hunt").unwrap();
    stamps.push(f.session.current_log().unwrap().updated);

    f.session
        .add_quest(&QuestDraft::new("Slay Dragon", ["Find lair", "Defeat dragon"]))
        .unwrap();
    stamps.push(f.session.current_log().unwrap().updated);

    let lair = f.session.current_quest().unwrap().objectives[0].id.clone();
    f.session.toggle_objective(&lair).unwrap();
    stamps.push(f.session.current_log().unwrap().updated);

    assert_eq!(f.session.current_quest().unwrap().progress().to_string(), "1/2");
    assert!(stamps.windows(2).all(|w| w[0] < w[1]), "{stamps:?}");
}

#[test]
fn toggles_strictly_advance_updated() {
    let mut f = fixture();
    f.session.create_log("Chores").unwrap();
    f.session
        .add_quest(&QuestDraft::new("Laundry", ["Wash", "Dry", "Fold"]))
        .unwrap();
    let before = f.session.current_log().unwrap().updated;
    let ids: Vec<_> = f
        .session
        .current_quest()
        .unwrap()
        .objectives
        .iter()
        .map(|o| o.id.clone())
        .collect();

    let mut last = before;
    for id in ids.iter().chain(ids.iter()) {
        f.session.toggle_objective(id).unwrap();
        let updated = f.session.current_log().unwrap().updated;
        assert!(updated > last);
        last = updated;
    }
    assert_eq!(f.session.current_quest().unwrap().progress().to_string(), "0/3");
}

#[test]
fn burst_of_edits_becomes_one_save() {
    let mut f = fixture();
    let log_id = f.session.create_log("Dragon Hunt").unwrap();
    f.remote.clear_calls();

    for i in 0..5 {
        f.session
            .add_quest(&QuestDraft::new(format!("Quest {i}"), ["Step"]))
            .unwrap();
        f.clock.advance_ms(300);
        assert!(f.session.tick().is_none());
    }
    f.clock.advance_ms(1700);
    assert!(f.session.tick().is_some());

    let saved = f.remote.saved_logs();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id, log_id);
    assert_eq!(saved[0].quests.len(), 5);
}

#[test]
fn failed_remote_save_leaves_full_collection_in_cache() {
    let mut f = fixture();
    f.session.create_log("First").unwrap();
    f.session.create_log("Second").unwrap();
    f.session
        .add_quest(&QuestDraft::new("Offline work", ["Step"]))
        .unwrap();
    f.remote.set_online(false);

    let outcome = f.session.save_now().unwrap();
    assert!(!outcome.remote_ok);
    assert!(outcome.local_ok);
    assert_eq!(
        f.session.save_status().to_string(),
        "Failed to save to server (using local backup)"
    );
    assert_eq!(f.cache.read().unwrap().unwrap(), f.session.logs().to_vec());
}

#[test]
fn blank_input_touches_nothing() {
    let mut f = fixture();
    f.session.create_log("Dragon Hunt").unwrap();
    f.remote.clear_calls();
    let snapshot = f.session.logs().to_vec();

    assert!(f.session.add_quest(&QuestDraft::new("", ["a"])).is_err());
    assert!(f.session.add_quest(&QuestDraft::new("Title", ["", " "])).is_err());

    f.clock.advance_ms(60_000);
    assert!(f.session.tick().is_none());
    assert_eq!(f.session.logs(), snapshot.as_slice());
    assert!(f.remote.calls().is_empty());
    assert_eq!(f.session.save_status(), SaveStatus::Saved);
}

#[test]
fn export_import_round_trip_and_collision() {
    let mut f = fixture();
    let id = f.session.create_log("Dragon Hunt").unwrap();
    f.session
        .add_quest(
            &QuestDraft::new("Slay Dragon", ["Find lair", "Defeat dragon"])
                .with_description("Bring a shield"),
        )
        .unwrap();
    let original = f.session.current_log().unwrap().clone();
    let exported = f.session.export_current().unwrap();

    let parsed = transfer::parse_document(&exported.document, f.session.now()).unwrap();
    assert_eq!(parsed, original);

    let copy_id = f.session.import_document(&exported.document).unwrap();
    assert_ne!(copy_id, id);
    let copy = f.session.current_log().unwrap();
    assert!(copy.name.ends_with(" (Imported)"));
    assert_eq!(copy.quests, original.quests);
    assert_eq!(f.session.state().store.get(&id).unwrap(), &original);

    let mut other = fixture();
    let fresh_id = other.session.import_document(&exported.document).unwrap();
    assert_eq!(fresh_id, id);
    assert_eq!(other.session.current_log().unwrap(), &original);
}

#[test]
fn restart_offline_restores_from_file_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("questLogs.json");
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
    ));
    let remote = Arc::new(FakeRemote::new());
    remote.set_online(false);

    let persistence =
        PersistenceAdapter::new(Box::new(remote.clone()), Box::new(FileCache::new(&path)));
    let mut session = QuestLogSession::new(persistence, clock.clone(), SessionConfig::default());
    session.start();
    session.create_log("Survives restarts").unwrap();
    session
        .add_quest(&QuestDraft::new("Quest", ["Step"]))
        .unwrap();
    session.shutdown();

    let persistence = PersistenceAdapter::new(Box::new(remote), Box::new(FileCache::new(&path)));
    let mut restarted = QuestLogSession::new(persistence, clock, SessionConfig::default());
    restarted.start();
    assert_eq!(restarted.logs().len(), 1);
    assert_eq!(restarted.logs()[0].name, "Survives restarts");
    assert_eq!(restarted.logs()[0].quests.len(), 1);
}

#[test]
fn offline_edits_reach_server_after_reconnect() {
    let mut f = fixture();
    let a = f.session.create_log("A").unwrap();
    let b = f.session.create_log("B").unwrap();
    f.session.close_log();

    f.remote.set_online(false);
    f.session.open_log(&a).unwrap();
    f.session
        .add_quest(&QuestDraft::new("Written offline", ["Step"]))
        .unwrap();
    f.session.close_log();
    f.session.open_log(&b).unwrap();

    f.remote.set_online(true);
    f.session.close_log();

    let in_memory = f.session.state().store.get(&a).unwrap();
    assert_eq!(in_memory.quests.len(), 1);
    assert!(!f.session.state().store.is_dirty(&a));
    let on_server = f.remote.server_logs().into_iter().find(|l| l.id == a).unwrap();
    assert_eq!(on_server.quests.len(), 1);
    let cached = f.cache.read().unwrap().unwrap();
    assert_eq!(cached.iter().find(|l| l.id == a).unwrap().quests.len(), 1);
}
