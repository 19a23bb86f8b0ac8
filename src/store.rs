//! In-memory source of truth for all quest logs.
//!
//! Mutations are synchronous and stamp `updated` on the touched entity and
//! every ancestor up to its log. The store also tracks which logs changed
//! since they were last persisted.

use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use ulid::Ulid;

use crate::clock::{Clock, advance_stamp};
use crate::types::{
    LogId, Objective, ObjectiveInput, Quest, QuestDraft, QuestId, QuestLog, QuestLogSummary,
};

/// Suffix appended to an imported log whose id was already taken.
pub const IMPORTED_SUFFIX: &str = " (Imported)";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Quest log not found: {0}")]
    LogNotFound(String),
    #[error("Quest not found: {0}")]
    QuestNotFound(String),
    #[error("Objective not found: {0}")]
    ObjectiveNotFound(String),
    #[error("Please enter a quest log name")]
    EmptyLogName,
    #[error("Please enter a quest title")]
    EmptyQuestTitle,
    #[error("Please add at least one objective")]
    NoObjectives,
    #[error("No quest log is open")]
    NoOpenLog,
    #[error("No quest is selected")]
    NoQuestSelected,
}

impl StoreError {
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            StoreError::EmptyLogName | StoreError::EmptyQuestTitle | StoreError::NoObjectives
        )
    }
}

pub struct QuestLogStore {
    logs: Vec<QuestLog>,
    dirty: BTreeSet<LogId>,
    clock: Arc<dyn Clock>,
}

/// A draft that passed validation, trimmed and with blank rows dropped.
struct ValidDraft {
    title: String,
    description: Option<String>,
    objectives: Vec<ObjectiveInput>,
}

fn validate(draft: &QuestDraft) -> Result<ValidDraft, StoreError> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(StoreError::EmptyQuestTitle);
    }
    let objectives: Vec<ObjectiveInput> = draft
        .objectives
        .iter()
        .filter_map(|input| {
            let title = input.title.trim();
            (!title.is_empty()).then(|| ObjectiveInput {
                id: input.id.clone(),
                title: title.to_string(),
            })
        })
        .collect();
    if objectives.is_empty() {
        return Err(StoreError::NoObjectives);
    }
    let description = draft.description.trim();
    Ok(ValidDraft {
        title: title.to_string(),
        description: (!description.is_empty()).then(|| description.to_string()),
        objectives,
    })
}

fn new_objective_id() -> String {
    Ulid::new().to_string()
}

impl QuestLogStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            logs: Vec::new(),
            dirty: BTreeSet::new(),
            clock,
        }
    }

    pub fn logs(&self) -> &[QuestLog] {
        &self.logs
    }

    pub fn summaries(&self) -> Vec<QuestLogSummary> {
        self.logs.iter().map(QuestLogSummary::from).collect()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&QuestLog> {
        self.logs.iter().find(|log| log.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn quest(&self, log_id: &str, quest_id: &str) -> Result<&Quest, StoreError> {
        self.get(log_id)
            .ok_or_else(|| StoreError::LogNotFound(log_id.to_string()))?
            .quest(quest_id)
            .ok_or_else(|| StoreError::QuestNotFound(quest_id.to_string()))
    }

    fn log_mut(&mut self, id: &str) -> Result<&mut QuestLog, StoreError> {
        self.logs
            .iter_mut()
            .find(|log| log.id == id)
            .ok_or_else(|| StoreError::LogNotFound(id.to_string()))
    }

    /// A time-based id no log in the store uses.
    pub fn fresh_log_id(&self) -> LogId {
        loop {
            let id = Ulid::new().to_string();
            if !self.contains(&id) {
                return id;
            }
        }
    }

    /// Replaces the whole collection with a freshly loaded one. Dirty logs
    /// hold edits the server has not accepted and keep their in-memory copy.
    pub fn replace_all(&mut self, logs: Vec<QuestLog>) {
        let dirty = &self.dirty;
        let unsynced: Vec<QuestLog> = std::mem::take(&mut self.logs)
            .into_iter()
            .filter(|log| dirty.contains(&log.id))
            .collect();
        self.logs = logs;
        for log in unsynced {
            self.upsert(log);
        }
        let logs = &self.logs;
        self.dirty.retain(|id| logs.iter().any(|log| &log.id == id));
    }

    /// Inserts a log, replacing any entry with the same id.
    pub fn upsert(&mut self, log: QuestLog) {
        match self.logs.iter_mut().find(|existing| existing.id == log.id) {
            Some(existing) => *existing = log,
            None => self.logs.push(log),
        }
    }

    pub fn create_log(&mut self, name: &str) -> Result<LogId, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyLogName);
        }
        let now = self.clock.now();
        let id = self.fresh_log_id();
        self.logs.push(QuestLog {
            id: id.clone(),
            name: name.to_string(),
            quests: Vec::new(),
            created: now,
            updated: now,
        });
        self.dirty.insert(id.clone());
        debug!(log_id = %id, "created quest log");
        Ok(id)
    }

    /// Adds an imported log. A log whose id is already taken gets a fresh id
    /// and a name marked as imported; the existing entry is left untouched.
    pub fn insert_imported(&mut self, mut log: QuestLog) -> LogId {
        if self.contains(&log.id) {
            let original = std::mem::replace(&mut log.id, self.fresh_log_id());
            log.name.push_str(IMPORTED_SUFFIX);
            debug!(original_id = %original, log_id = %log.id, "renamed colliding import");
        }
        let id = log.id.clone();
        self.logs.push(log);
        self.dirty.insert(id.clone());
        id
    }

    pub fn remove(&mut self, id: &str) -> Option<QuestLog> {
        let index = self.logs.iter().position(|log| log.id == id)?;
        self.dirty.remove(id);
        Some(self.logs.remove(index))
    }

    pub fn add_quest(&mut self, log_id: &str, draft: &QuestDraft) -> Result<QuestId, StoreError> {
        let draft = validate(draft)?;
        let now = self.clock.now();
        let log = self.log_mut(log_id)?;
        let quest_id = loop {
            let id = Ulid::new().to_string();
            if log.quest(&id).is_none() {
                break id;
            }
        };
        log.quests.push(Quest {
            id: quest_id.clone(),
            title: draft.title,
            description: draft.description,
            objectives: draft
                .objectives
                .into_iter()
                .map(|input| Objective {
                    id: new_objective_id(),
                    title: input.title,
                    completed: false,
                })
                .collect(),
            created: now,
            updated: now,
        });
        log.updated = advance_stamp(log.updated, now);
        self.dirty.insert(log_id.to_string());
        Ok(quest_id)
    }

    /// Replaces a quest's title, description and full objective list.
    /// Rows naming an existing objective keep its id and completion flag;
    /// objectives missing from the draft are dropped.
    pub fn edit_quest(
        &mut self,
        log_id: &str,
        quest_id: &str,
        draft: &QuestDraft,
    ) -> Result<(), StoreError> {
        let draft = validate(draft)?;
        let now = self.clock.now();
        let log = self.log_mut(log_id)?;
        let quest = log
            .quests
            .iter_mut()
            .find(|quest| quest.id == quest_id)
            .ok_or_else(|| StoreError::QuestNotFound(quest_id.to_string()))?;

        let objectives: Vec<Objective> = draft
            .objectives
            .into_iter()
            .map(|input| match input.id {
                Some(id) => {
                    let completed = quest.objective(&id).is_some_and(|o| o.completed);
                    Objective {
                        id,
                        title: input.title,
                        completed,
                    }
                }
                None => Objective {
                    id: new_objective_id(),
                    title: input.title,
                    completed: false,
                },
            })
            .collect();

        quest.title = draft.title;
        quest.description = draft.description;
        quest.objectives = objectives;
        quest.updated = advance_stamp(quest.updated, now);
        log.updated = advance_stamp(log.updated, now);
        self.dirty.insert(log_id.to_string());
        Ok(())
    }

    /// Flips an objective and returns its new completion state.
    pub fn toggle_objective(
        &mut self,
        log_id: &str,
        quest_id: &str,
        objective_id: &str,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let log = self.log_mut(log_id)?;
        let quest = log
            .quests
            .iter_mut()
            .find(|quest| quest.id == quest_id)
            .ok_or_else(|| StoreError::QuestNotFound(quest_id.to_string()))?;
        let objective = quest
            .objectives
            .iter_mut()
            .find(|objective| objective.id == objective_id)
            .ok_or_else(|| StoreError::ObjectiveNotFound(objective_id.to_string()))?;
        objective.completed = !objective.completed;
        let completed = objective.completed;
        quest.updated = advance_stamp(quest.updated, now);
        log.updated = advance_stamp(log.updated, now);
        self.dirty.insert(log_id.to_string());
        Ok(completed)
    }

    pub fn is_dirty(&self, id: &str) -> bool {
        self.dirty.contains(id)
    }

    pub fn dirty_ids(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    pub fn mark_clean(&mut self, id: &str) {
        self.dirty.remove(id);
    }
}
