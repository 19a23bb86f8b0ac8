//! Quest Log REST API Client
//!
//! Speaks the quest log server's JSON protocol:
//! - `GET /api/logs`, `GET /api/log/{id}`
//! - `POST /api/save`, `DELETE /api/delete/{id}`
//! - `GET /api/templates`, `GET /api/import-template/{id}`
//!
//! Any non-2xx status or transport failure is an error; callers never
//! branch on the status code.

use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};
use crate::types::{QuestLog, Template};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Characters escaped in id path segments.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'%')
    .add(b'"');

/// The remote half of the persistence pair.
pub trait RemoteApi: Send + Sync {
    /// Every stored log (the server includes full quest data).
    fn list_logs(&self) -> ServiceResult<Vec<QuestLog>>;

    fn get_log(&self, id: &str) -> ServiceResult<QuestLog>;

    fn save_log(&self, log: &QuestLog) -> ServiceResult<()>;

    fn delete_log(&self, id: &str) -> ServiceResult<()>;

    fn list_templates(&self) -> ServiceResult<Vec<Template>>;

    /// Asks the server to copy a template into a new log and returns it.
    fn import_template(&self, id: &str) -> ServiceResult<QuestLog>;
}

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bound on connecting and on each whole request.
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct LogsEnvelope {
    logs: Vec<QuestLog>,
}

#[derive(Debug, Deserialize)]
struct LogEnvelope {
    log: QuestLog,
}

#[derive(Debug, Deserialize)]
struct TemplatesEnvelope {
    templates: Vec<Template>,
}

#[derive(Debug, Serialize)]
struct SaveRequest<'a> {
    log: &'a QuestLog,
}

/// Blocking HTTP client for the quest log server.
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    agent: ureq::Agent,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout)
            .timeout(config.timeout)
            .build();
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn url_with_id(&self, path: &str, id: &str) -> String {
        format!("{}{}{}", self.base_url, path, utf8_percent_encode(id, SEGMENT))
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, context: &str) -> ServiceResult<T> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| call_error(context, e))?;
        response.into_json::<T>().map_err(|e| {
            ServiceError::NetworkError(format!("{context}: failed to read response: {e}"))
        })
    }
}

impl RemoteApi for ApiClient {
    fn list_logs(&self) -> ServiceResult<Vec<QuestLog>> {
        let envelope: LogsEnvelope =
            self.get_json(&self.url("/api/logs"), "Failed to load quest logs")?;
        Ok(envelope.logs)
    }

    fn get_log(&self, id: &str) -> ServiceResult<QuestLog> {
        let context = format!("Failed to load quest log {id}");
        let envelope: LogEnvelope = self.get_json(&self.url_with_id("/api/log/", id), &context)?;
        Ok(envelope.log)
    }

    fn save_log(&self, log: &QuestLog) -> ServiceResult<()> {
        let context = format!("Failed to save quest log {}", log.id);
        self.agent
            .post(&self.url("/api/save"))
            .send_json(SaveRequest { log })
            .map_err(|e| call_error(&context, e))?;
        Ok(())
    }

    fn delete_log(&self, id: &str) -> ServiceResult<()> {
        let context = format!("Failed to delete quest log {id}");
        self.agent
            .delete(&self.url_with_id("/api/delete/", id))
            .call()
            .map_err(|e| call_error(&context, e))?;
        Ok(())
    }

    fn list_templates(&self) -> ServiceResult<Vec<Template>> {
        let envelope: TemplatesEnvelope =
            self.get_json(&self.url("/api/templates"), "Failed to load templates")?;
        Ok(envelope.templates)
    }

    fn import_template(&self, id: &str) -> ServiceResult<QuestLog> {
        let context = format!("Failed to import template {id}");
        let envelope: LogEnvelope =
            self.get_json(&self.url_with_id("/api/import-template/", id), &context)?;
        Ok(envelope.log)
    }
}

impl<R: RemoteApi + ?Sized> RemoteApi for std::sync::Arc<R> {
    fn list_logs(&self) -> ServiceResult<Vec<QuestLog>> {
        (**self).list_logs()
    }

    fn get_log(&self, id: &str) -> ServiceResult<QuestLog> {
        (**self).get_log(id)
    }

    fn save_log(&self, log: &QuestLog) -> ServiceResult<()> {
        (**self).save_log(log)
    }

    fn delete_log(&self, id: &str) -> ServiceResult<()> {
        (**self).delete_log(id)
    }

    fn list_templates(&self) -> ServiceResult<Vec<Template>> {
        (**self).list_templates()
    }

    fn import_template(&self, id: &str) -> ServiceResult<QuestLog> {
        (**self).import_template(id)
    }
}

/// Stand-in used with `--offline`: every call fails like an unreachable
/// server, so the local cache carries all state.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemote;

impl OfflineRemote {
    fn unavailable<T>() -> ServiceResult<T> {
        Err(ServiceError::NetworkError("offline mode".to_string()))
    }
}

impl RemoteApi for OfflineRemote {
    fn list_logs(&self) -> ServiceResult<Vec<QuestLog>> {
        Self::unavailable()
    }

    fn get_log(&self, _id: &str) -> ServiceResult<QuestLog> {
        Self::unavailable()
    }

    fn save_log(&self, _log: &QuestLog) -> ServiceResult<()> {
        Self::unavailable()
    }

    fn delete_log(&self, _id: &str) -> ServiceResult<()> {
        Self::unavailable()
    }

    fn list_templates(&self) -> ServiceResult<Vec<Template>> {
        Self::unavailable()
    }

    fn import_template(&self, _id: &str) -> ServiceResult<QuestLog> {
        Self::unavailable()
    }
}

fn call_error(context: &str, err: ureq::Error) -> ServiceError {
    match err {
        ureq::Error::Status(code, _) => ServiceError::ApiError(format!("{context}: HTTP {code}")),
        ureq::Error::Transport(transport) => {
            ServiceError::NetworkError(format!("{context}: {transport}"))
        }
    }
}

/// Helper function to create a client from a connection string
pub fn create_api_client(connection_string: &str, timeout: Duration) -> ApiClient {
    // Accept "localhost:8000" as well as full URLs
    let base_url = if connection_string.starts_with("http") {
        connection_string.to_string()
    } else {
        format!("http://{}", connection_string)
    };

    ApiClient::new(ApiConfig { base_url, timeout })
}
