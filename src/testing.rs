//! Test doubles for driving a session without a server.
//!
//! [`FakeRemote`] behaves like the quest log server held in memory. It can be
//! switched offline to simulate network failure and records every call so
//! tests can count saves.

use std::sync::Mutex;

use crate::client::RemoteApi;
use crate::error::{ServiceError, ServiceResult};
use crate::types::{QuestLog, Template};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    ListLogs,
    GetLog(String),
    Save(QuestLog),
    Delete(String),
    ListTemplates,
    ImportTemplate(String),
}

#[derive(Default)]
struct FakeState {
    offline: bool,
    logs: Vec<QuestLog>,
    templates: Vec<(Template, QuestLog)>,
    imported: usize,
    calls: Vec<RemoteCall>,
}

#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }

    pub fn set_online(&self, online: bool) {
        self.with_state(|s| s.offline = !online);
    }

    /// Stores a log server-side without recording a call.
    pub fn put_log(&self, log: QuestLog) {
        self.with_state(|s| upsert(&mut s.logs, log));
    }

    pub fn add_template(&self, template: Template, log: QuestLog) {
        self.with_state(|s| s.templates.push((template, log)));
    }

    pub fn server_logs(&self) -> Vec<QuestLog> {
        self.with_state(|s| s.logs.clone())
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.with_state(|s| s.calls.clone())
    }

    /// Logs passed to `save_log`, in call order, including failed attempts.
    pub fn saved_logs(&self) -> Vec<QuestLog> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Save(log) => Some(log),
                _ => None,
            })
            .collect()
    }

    pub fn save_count(&self) -> usize {
        self.saved_logs().len()
    }

    pub fn clear_calls(&self) {
        self.with_state(|s| s.calls.clear());
    }

    fn call<T>(
        &self,
        call: RemoteCall,
        f: impl FnOnce(&mut FakeState) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        self.with_state(|s| {
            s.calls.push(call);
            if s.offline {
                return Err(ServiceError::NetworkError("connection refused".to_string()));
            }
            f(s)
        })
    }
}

fn upsert(logs: &mut Vec<QuestLog>, log: QuestLog) {
    match logs.iter_mut().find(|existing| existing.id == log.id) {
        Some(existing) => *existing = log,
        None => logs.push(log),
    }
}

fn not_found(what: &str) -> ServiceError {
    ServiceError::ApiError(format!("{what}: HTTP 404"))
}

impl RemoteApi for FakeRemote {
    fn list_logs(&self) -> ServiceResult<Vec<QuestLog>> {
        self.call(RemoteCall::ListLogs, |s| Ok(s.logs.clone()))
    }

    fn get_log(&self, id: &str) -> ServiceResult<QuestLog> {
        self.call(RemoteCall::GetLog(id.to_string()), |s| {
            s.logs
                .iter()
                .find(|log| log.id == id)
                .cloned()
                .ok_or_else(|| not_found("Quest log not found"))
        })
    }

    fn save_log(&self, log: &QuestLog) -> ServiceResult<()> {
        self.call(RemoteCall::Save(log.clone()), |s| {
            upsert(&mut s.logs, log.clone());
            Ok(())
        })
    }

    fn delete_log(&self, id: &str) -> ServiceResult<()> {
        self.call(RemoteCall::Delete(id.to_string()), |s| {
            let before = s.logs.len();
            s.logs.retain(|log| log.id != id);
            if s.logs.len() == before {
                return Err(not_found("Quest log not found"));
            }
            Ok(())
        })
    }

    fn list_templates(&self) -> ServiceResult<Vec<Template>> {
        self.call(RemoteCall::ListTemplates, |s| {
            Ok(s.templates.iter().map(|(t, _)| t.clone()).collect())
        })
    }

    fn import_template(&self, id: &str) -> ServiceResult<QuestLog> {
        self.call(RemoteCall::ImportTemplate(id.to_string()), |s| {
            let mut log = s
                .templates
                .iter()
                .find(|(t, _)| t.id == id)
                .map(|(_, log)| log.clone())
                .ok_or_else(|| not_found("Template not found"))?;
            s.imported += 1;
            log.id = format!("{}-copy-{}", id, s.imported);
            upsert(&mut s.logs, log.clone());
            Ok(log)
        })
    }
}
