//! Session controller: owns the application state and sequences every
//! user-visible operation across the store, the auto-save scheduler and the
//! persistence adapter.
//!
//! Navigation away from a log (opening another one, going back to the menu,
//! shutting down) always persists the open log before the transition.
//! Failures never escape as panics; each operation records a notification
//! and falls back to a safe state, then returns the error for the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::autosave::{AutosaveScheduler, DEFAULT_DEBOUNCE_MS, SaveStatus, SchedulerState};
use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::notify::{DEFAULT_NOTIFICATION_MS, Level, Notification, Notifier};
use crate::persistence::{LoadSource, PersistOutcome, PersistenceAdapter};
use crate::store::{QuestLogStore, StoreError};
use crate::transfer;
use crate::types::{LogId, Quest, QuestDraft, QuestId, QuestLog, QuestLogSummary, Template};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub debounce: Duration,
    pub notification_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            notification_ttl: Duration::from_millis(DEFAULT_NOTIFICATION_MS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Navigation {
    #[default]
    AtMenu,
    LogOpen {
        log_id: LogId,
        quest_id: Option<QuestId>,
    },
}

/// Tracks which log and quest are open. A quest can only be selected
/// inside an open log, and leaving the log clears the selection.
#[derive(Debug, Default)]
pub struct Navigator {
    state: Navigation,
}

impl Navigator {
    pub fn state(&self) -> &Navigation {
        &self.state
    }

    pub fn current_log(&self) -> Option<&str> {
        match &self.state {
            Navigation::LogOpen { log_id, .. } => Some(log_id),
            Navigation::AtMenu => None,
        }
    }

    pub fn current_quest(&self) -> Option<&str> {
        match &self.state {
            Navigation::LogOpen { quest_id, .. } => quest_id.as_deref(),
            Navigation::AtMenu => None,
        }
    }

    pub fn open(&mut self, log_id: &str) {
        self.state = Navigation::LogOpen {
            log_id: log_id.to_string(),
            quest_id: None,
        };
    }

    pub fn close(&mut self) {
        self.state = Navigation::AtMenu;
    }

    pub fn select(&mut self, quest: &str) -> Result<(), StoreError> {
        match &mut self.state {
            Navigation::LogOpen { quest_id, .. } => {
                *quest_id = Some(quest.to_string());
                Ok(())
            }
            Navigation::AtMenu => Err(StoreError::NoOpenLog),
        }
    }
}

/// Everything the session mutates, in one place.
pub struct AppState {
    pub store: QuestLogStore,
    pub nav: Navigator,
    pub autosave: AutosaveScheduler,
    pub notices: Notifier,
}

/// A rendered `.quest` document and its suggested file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedLog {
    pub file_name: String,
    pub document: String,
}

pub struct QuestLogSession {
    state: AppState,
    persistence: PersistenceAdapter,
    clock: Arc<dyn Clock>,
}

impl QuestLogSession {
    pub fn new(
        persistence: PersistenceAdapter,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            state: AppState {
                store: QuestLogStore::new(clock.clone()),
                nav: Navigator::default(),
                autosave: AutosaveScheduler::new(config.debounce),
                notices: Notifier::new(config.notification_ttl),
            },
            persistence,
            clock,
        }
    }

    // ---- queries -------------------------------------------------------

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn logs(&self) -> &[QuestLog] {
        self.state.store.logs()
    }

    pub fn summaries(&self) -> Vec<QuestLogSummary> {
        self.state.store.summaries()
    }

    pub fn navigation(&self) -> &Navigation {
        self.state.nav.state()
    }

    pub fn current_log(&self) -> Option<&QuestLog> {
        self.state
            .nav
            .current_log()
            .and_then(|id| self.state.store.get(id))
    }

    pub fn current_quest(&self) -> Option<&Quest> {
        let quest_id = self.state.nav.current_quest()?;
        self.current_log()?.quest(quest_id)
    }

    pub fn save_status(&self) -> SaveStatus {
        self.state.autosave.status()
    }

    pub fn scheduler_state(&self) -> &SchedulerState {
        self.state.autosave.state()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.state.autosave.next_deadline()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn notifications(&mut self) -> &[Notification] {
        let now = self.clock.now();
        self.state.notices.active(now)
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.state.notices.drain()
    }

    // ---- loading and navigation ---------------------------------------

    /// Initial load of the log list.
    pub fn start(&mut self) -> LoadSource {
        self.refresh_logs()
    }

    /// Pushes logs with local-only edits to the server, then reloads the
    /// list. Logs that still could not be synced keep their in-memory copy.
    pub fn refresh_logs(&mut self) -> LoadSource {
        self.sync_dirty();
        let loaded = self.persistence.load_all();
        if !loaded.is_remote() {
            self.notify(
                Level::Error,
                "Failed to load quest logs. Using local storage instead.",
            );
        }
        if let Some(logs) = loaded.value {
            self.state.store.replace_all(logs);
        }
        info!(source = ?loaded.source, count = self.state.store.len(), "quest logs loaded");
        loaded.source
    }

    /// Flushes the open log, then loads `id` and makes it current.
    pub fn open_log(&mut self, id: &str) -> ServiceResult<()> {
        if self.state.nav.current_log().is_some() {
            self.flush_now();
        }
        self.state.nav.close();

        let loaded = self.persistence.load_one(id, &self.state.store);
        if !loaded.is_remote() {
            self.notify(Level::Error, "Failed to load quest log");
        }
        let remote = loaded.is_remote();
        let Some(log) = loaded.value else {
            return Err(StoreError::LogNotFound(id.to_string()).into());
        };

        if remote {
            let local_is_newer = self
                .state
                .store
                .get(id)
                .is_some_and(|local| local.updated > log.updated);
            if local_is_newer {
                debug!(log_id = %id, "keeping newer in-memory copy over remote");
                self.schedule_save(id);
            } else {
                self.state.store.upsert(log);
            }
        }
        self.state.nav.open(id);
        debug!(log_id = %id, "opened quest log");
        Ok(())
    }

    /// Back to the menu: flush, clear selection, reload the list.
    pub fn close_log(&mut self) -> LoadSource {
        if self.state.nav.current_log().is_some() {
            self.flush_now();
        }
        self.state.nav.close();
        self.refresh_logs()
    }

    pub fn select_quest(&mut self, quest_id: &str) -> ServiceResult<()> {
        let log_id = self.require_open_log()?;
        self.state.store.quest(&log_id, quest_id)?;
        self.state.nav.select(quest_id)?;
        Ok(())
    }

    // ---- mutations -----------------------------------------------------

    /// Creates, saves and opens a new log.
    pub fn create_log(&mut self, name: &str) -> ServiceResult<LogId> {
        let id = match self.state.store.create_log(name) {
            Ok(id) => id,
            Err(e) => return Err(self.reject(e)),
        };
        self.persist(&id);
        self.open_log(&id)?;
        Ok(id)
    }

    pub fn add_quest(&mut self, draft: &QuestDraft) -> ServiceResult<QuestId> {
        let log_id = self.require_open_log()?;
        let quest_id = match self.state.store.add_quest(&log_id, draft) {
            Ok(id) => id,
            Err(e) => return Err(self.reject(e)),
        };
        self.schedule_save(&log_id);
        self.state.nav.select(&quest_id)?;
        Ok(quest_id)
    }

    /// Replaces the selected quest's content with `draft`.
    pub fn edit_quest(&mut self, draft: &QuestDraft) -> ServiceResult<()> {
        let (log_id, quest_id) = self.require_selected_quest()?;
        if let Err(e) = self.state.store.edit_quest(&log_id, &quest_id, draft) {
            return Err(self.reject(e));
        }
        self.schedule_save(&log_id);
        self.notify(Level::Success, "Quest updated successfully");
        Ok(())
    }

    pub fn toggle_objective(&mut self, objective_id: &str) -> ServiceResult<bool> {
        let (log_id, quest_id) = self.require_selected_quest()?;
        let completed = match self
            .state
            .store
            .toggle_objective(&log_id, &quest_id, objective_id)
        {
            Ok(completed) => completed,
            Err(e) => return Err(self.reject(e)),
        };
        self.schedule_save(&log_id);
        Ok(completed)
    }

    /// Deletes the open log (remote best-effort, always local) and returns
    /// to the menu.
    pub fn delete_current_log(&mut self) -> ServiceResult<PersistOutcome> {
        let log_id = self.require_open_log()?;
        let outcome = self.delete_log(&log_id);
        self.close_log();
        Ok(outcome)
    }

    pub fn delete_log(&mut self, log_id: &str) -> PersistOutcome {
        self.state.autosave.discard(log_id);
        let outcome = self.persistence.delete(log_id, &mut self.state.store);
        if outcome.remote_ok {
            self.notify(Level::Success, "Quest log deleted successfully");
        } else {
            self.notify(Level::Error, "Failed to delete quest log from server");
        }
        if self.state.nav.current_log() == Some(log_id) {
            self.state.nav.close();
        }
        outcome
    }

    // ---- import / export -----------------------------------------------

    pub fn export_log(&self, log_id: &str) -> ServiceResult<ExportedLog> {
        let log = self
            .state
            .store
            .get(log_id)
            .ok_or_else(|| StoreError::LogNotFound(log_id.to_string()))?;
        Ok(ExportedLog {
            file_name: transfer::export_file_name(log),
            document: transfer::export_document(log)?,
        })
    }

    pub fn export_current(&mut self) -> ServiceResult<ExportedLog> {
        let log_id = self.require_open_log()?;
        let exported = self.export_log(&log_id)?;
        self.notify(Level::Success, "Quest log exported successfully");
        Ok(exported)
    }

    /// Adds the log in `document`, saves it immediately and opens it.
    pub fn import_document(&mut self, document: &str) -> ServiceResult<LogId> {
        let log = match transfer::parse_document(document, self.clock.now()) {
            Ok(log) => log,
            Err(e) => {
                self.notify(
                    Level::Error,
                    "Failed to import quest log. Please make sure the file is valid.",
                );
                return Err(ServiceError::from(e));
            }
        };
        let id = self.state.store.insert_imported(log);
        self.persist(&id);
        self.notify(Level::Success, "Quest log imported successfully");
        self.open_log(&id)?;
        Ok(id)
    }

    pub fn templates(&mut self) -> Vec<Template> {
        match self.persistence.list_templates() {
            Ok(templates) => templates,
            Err(_) => {
                self.notify(Level::Error, "Failed to load quest templates");
                Vec::new()
            }
        }
    }

    /// Copies a server template into the collection and opens it.
    pub fn use_template(&mut self, template_id: &str) -> ServiceResult<LogId> {
        let log = match self.persistence.import_template(template_id) {
            Ok(log) => log,
            Err(e) => {
                self.notify(Level::Error, "Failed to import template");
                return Err(e);
            }
        };
        let server_id = log.id.clone();
        let id = self.state.store.insert_imported(log);
        if id == server_id {
            self.persistence.write_cache(self.state.store.logs());
            self.state.store.mark_clean(&id);
        } else {
            self.persist(&id);
        }
        self.notify(Level::Success, "Template imported successfully");
        self.open_log(&id)?;
        Ok(id)
    }

    // ---- saving --------------------------------------------------------

    /// Fires the auto-save if its debounce window has elapsed.
    pub fn tick(&mut self) -> Option<PersistOutcome> {
        let now = self.clock.now();
        let log_id = self.state.autosave.due(now)?.to_string();
        self.persist(&log_id)
    }

    /// Explicit save: skips the debounce.
    pub fn save_now(&mut self) -> Option<PersistOutcome> {
        self.flush_now()
    }

    /// Teardown: persists whatever is open or pending.
    pub fn shutdown(&mut self) -> Option<PersistOutcome> {
        let outcome = self.flush_now();
        info!(status = %self.save_status(), "session closed");
        outcome
    }

    fn schedule_save(&mut self, log_id: &str) {
        let now = self.clock.now();
        self.state.autosave.schedule(log_id, now);
    }

    /// Immediate path: cancels the timer and saves the open log (and a
    /// pending one, should it differ) before returning.
    fn flush_now(&mut self) -> Option<PersistOutcome> {
        let pending = self.state.autosave.cancel();
        let current = self.state.nav.current_log().map(str::to_string);
        if let Some(pending) = pending.as_deref().filter(|p| Some(*p) != current.as_deref()) {
            self.persist(pending);
        }
        current.or(pending).and_then(|id| self.persist(&id))
    }

    /// Retries the remote save of every log the server has not seen yet.
    /// Stops at the first remote failure.
    fn sync_dirty(&mut self) {
        let dirty: Vec<LogId> = self.state.store.dirty_ids().map(str::to_string).collect();
        for log_id in dirty {
            debug!(log_id = %log_id, "syncing local-only edits");
            if self.persist(&log_id).is_some_and(|outcome| !outcome.remote_ok) {
                break;
            }
        }
    }

    /// Saves the current in-memory state of `log_id`. The log stays dirty
    /// until the server has accepted it.
    fn persist(&mut self, log_id: &str) -> Option<PersistOutcome> {
        if !self.state.store.contains(log_id) {
            self.state.autosave.discard(log_id);
            return None;
        }
        self.state.autosave.begin_flush(log_id);
        let log = self.state.store.get(log_id)?;
        let outcome = self.persistence.save(log, self.state.store.logs());
        if outcome.remote_ok {
            self.state.store.mark_clean(log_id);
        }
        self.state.autosave.finish_flush(outcome.remote_ok);
        Some(outcome)
    }

    // ---- helpers -------------------------------------------------------

    fn notify(&mut self, level: Level, message: impl Into<String>) {
        let now = self.clock.now();
        self.state.notices.push(level, message, now);
    }

    fn reject(&mut self, e: StoreError) -> ServiceError {
        self.notify(Level::Error, e.to_string());
        ServiceError::from(e)
    }

    fn require_open_log(&mut self) -> ServiceResult<LogId> {
        match self.state.nav.current_log() {
            Some(id) => Ok(id.to_string()),
            None => Err(self.reject(StoreError::NoOpenLog)),
        }
    }

    fn require_selected_quest(&mut self) -> ServiceResult<(LogId, QuestId)> {
        let log_id = self.require_open_log()?;
        match self.state.nav.current_quest() {
            Some(quest_id) => Ok((log_id, quest_id.to_string())),
            None => Err(self.reject(StoreError::NoQuestSelected)),
        }
    }
}
