//! Persistence Adapter over the remote API and the local durable cache.
//!
//! Writes always reach the local cache, whatever happens remotely: `save`
//! and `delete` rewrite the entire cached collection after the remote call.
//! Reads prefer the remote and fall back wholesale, never merging.

use tracing::{debug, warn};

use crate::client::RemoteApi;
use crate::error::ServiceResult;
use crate::storage::LocalCache;
use crate::store::QuestLogStore;
use crate::types::{QuestLog, Template};

/// Result of a write against both stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOutcome {
    pub remote_ok: bool,
    pub local_ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    LocalCache,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<T> {
    pub value: T,
    pub source: LoadSource,
}

impl<T> Loaded<T> {
    pub fn is_remote(&self) -> bool {
        self.source == LoadSource::Remote
    }
}

pub struct PersistenceAdapter {
    remote: Box<dyn RemoteApi>,
    cache: Box<dyn LocalCache>,
}

impl PersistenceAdapter {
    pub fn new(remote: Box<dyn RemoteApi>, cache: Box<dyn LocalCache>) -> Self {
        Self { remote, cache }
    }

    /// Sends `log` to the server, then rewrites the cache with `all`.
    pub fn save(&self, log: &QuestLog, all: &[QuestLog]) -> PersistOutcome {
        let remote_ok = match self.remote.save_log(log) {
            Ok(()) => true,
            Err(e) => {
                warn!(log_id = %log.id, error = %e, "remote save failed, keeping local backup");
                false
            }
        };
        let local_ok = self.write_cache(all);
        debug!(log_id = %log.id, remote_ok, local_ok, "saved quest log");
        PersistOutcome { remote_ok, local_ok }
    }

    /// Remote list, or the whole cached collection when the server is
    /// unreachable. `None` means neither store had anything to offer.
    pub fn load_all(&self) -> Loaded<Option<Vec<QuestLog>>> {
        match self.remote.list_logs() {
            Ok(logs) => Loaded {
                value: Some(logs),
                source: LoadSource::Remote,
            },
            Err(e) => {
                warn!(error = %e, "remote list failed, reading local cache");
                let value = match self.cache.read() {
                    Ok(cached) => cached,
                    Err(e) => {
                        warn!(error = %e, "local cache unreadable");
                        None
                    }
                };
                Loaded {
                    value,
                    source: LoadSource::LocalCache,
                }
            }
        }
    }

    /// Remote copy of one log, or whatever `store` currently holds for it.
    pub fn load_one(&self, id: &str, store: &QuestLogStore) -> Loaded<Option<QuestLog>> {
        match self.remote.get_log(id) {
            Ok(log) => Loaded {
                value: Some(log),
                source: LoadSource::Remote,
            },
            Err(e) => {
                warn!(log_id = %id, error = %e, "remote fetch failed, using in-memory copy");
                Loaded {
                    value: store.get(id).cloned(),
                    source: LoadSource::Memory,
                }
            }
        }
    }

    /// Best-effort remote delete; the log always leaves `store` and the cache.
    pub fn delete(&self, id: &str, store: &mut QuestLogStore) -> PersistOutcome {
        let remote_ok = match self.remote.delete_log(id) {
            Ok(()) => true,
            Err(e) => {
                warn!(log_id = %id, error = %e, "remote delete failed, removing locally");
                false
            }
        };
        store.remove(id);
        let local_ok = self.write_cache(store.logs());
        PersistOutcome { remote_ok, local_ok }
    }

    pub fn write_cache(&self, all: &[QuestLog]) -> bool {
        match self.cache.write(all) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to write local cache");
                false
            }
        }
    }

    pub fn list_templates(&self) -> ServiceResult<Vec<Template>> {
        self.remote.list_templates()
    }

    pub fn import_template(&self, id: &str) -> ServiceResult<QuestLog> {
        self.remote.import_template(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryCache;
    use crate::testing::{FakeRemote, RemoteCall};
    use crate::types::QuestDraft;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    struct Fixture {
        remote: Arc<FakeRemote>,
        cache: Arc<MemoryCache>,
        adapter: PersistenceAdapter,
        store: QuestLogStore,
    }

    fn fixture() -> Fixture {
        let remote = Arc::new(FakeRemote::new());
        let cache = Arc::new(MemoryCache::new());
        let adapter = PersistenceAdapter::new(Box::new(remote.clone()), Box::new(cache.clone()));
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()));
        Fixture {
            remote,
            cache,
            adapter,
            store: QuestLogStore::new(clock),
        }
    }

    #[test]
    fn failed_remote_save_still_writes_full_collection_locally() {
        let mut f = fixture();
        let a = f.store.create_log("Dragon Hunt").unwrap();
        f.store.create_log("Groceries").unwrap();
        f.store
            .add_quest(&a, &QuestDraft::new("Slay Dragon", ["Find lair"]))
            .unwrap();
        f.remote.set_online(false);

        let outcome = f.adapter.save(f.store.get(&a).unwrap(), f.store.logs());
        assert_eq!(outcome, PersistOutcome { remote_ok: false, local_ok: true });
        assert_eq!(f.cache.read().unwrap().unwrap(), f.store.logs().to_vec());
    }

    #[test]
    fn successful_save_reaches_both_stores() {
        let mut f = fixture();
        let a = f.store.create_log("Dragon Hunt").unwrap();
        let outcome = f.adapter.save(f.store.get(&a).unwrap(), f.store.logs());
        assert!(outcome.remote_ok && outcome.local_ok);
        assert_eq!(f.remote.saved_logs()[0].id, a);
        assert!(f.cache.raw().is_some());
    }

    #[test]
    fn load_all_is_remote_or_cache_never_merged() {
        let mut f = fixture();
        let a = f.store.create_log("Cached only").unwrap();
        f.adapter.write_cache(f.store.logs());
        let remote_log = f.store.get(&a).map(|l| QuestLog {
            id: "remote".into(),
            name: "Remote only".into(),
            ..l.clone()
        });
        f.remote.put_log(remote_log.unwrap());

        let loaded = f.adapter.load_all();
        assert!(loaded.is_remote());
        let names: Vec<_> = loaded.value.unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Remote only"]);

        f.remote.set_online(false);
        let loaded = f.adapter.load_all();
        assert_eq!(loaded.source, LoadSource::LocalCache);
        let names: Vec<_> = loaded.value.unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Cached only"]);
    }

    #[test]
    fn load_all_with_nothing_anywhere_is_none() {
        let f = fixture();
        f.remote.set_online(false);
        assert_eq!(f.adapter.load_all().value, None);
    }

    #[test]
    fn load_one_falls_back_to_memory() {
        let mut f = fixture();
        let a = f.store.create_log("Dragon Hunt").unwrap();
        f.remote.set_online(false);
        let loaded = f.adapter.load_one(&a, &f.store);
        assert_eq!(loaded.source, LoadSource::Memory);
        assert_eq!(loaded.value.as_ref(), f.store.get(&a));
        assert_eq!(f.adapter.load_one("missing", &f.store).value, None);
    }

    #[test]
    fn delete_is_guaranteed_locally() {
        let mut f = fixture();
        let a = f.store.create_log("Dragon Hunt").unwrap();
        let b = f.store.create_log("Groceries").unwrap();
        f.remote.set_online(false);

        let outcome = f.adapter.delete(&a, &mut f.store);
        assert!(!outcome.remote_ok);
        assert!(outcome.local_ok);
        assert!(f.store.get(&a).is_none());
        let cached = f.cache.read().unwrap().unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, b);
        assert!(f.remote.calls().contains(&RemoteCall::Delete(a)));
    }

    #[test]
    fn cache_write_failure_is_reported() {
        let mut f = fixture();
        let a = f.store.create_log("Dragon Hunt").unwrap();
        f.cache.set_fail_writes(true);
        let outcome = f.adapter.save(f.store.get(&a).unwrap(), f.store.logs());
        assert_eq!(outcome, PersistOutcome { remote_ok: true, local_ok: false });
    }
}
