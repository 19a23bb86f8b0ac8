//! Import/Export of single quest logs as portable `.quest` documents.
//!
//! A document is the pretty-printed JSON of one [`QuestLog`]. Import checks
//! the required top-level fields before decoding, so a malformed file is
//! rejected without touching the store. Missing `created`/`updated` stamps
//! on the log or its quests are filled with the importing session's time.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

use crate::types::{QuestLog, timestamp};

pub const EXTENSION: &str = "quest";

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static RESERVED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("reserved pattern is valid"));

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("invalid quest log file: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid quest log file: missing `{0}`")]
    MissingField(&'static str),
    #[error("invalid quest log file: malformed `{0}`")]
    InvalidField(&'static str),
}

pub fn export_document(log: &QuestLog) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(log)
}

/// `<log name>.quest` with whitespace runs and path-hostile characters
/// replaced by `_`.
pub fn export_file_name(log: &QuestLog) -> String {
    let name = WHITESPACE.replace_all(log.name.trim(), "_");
    let name = RESERVED.replace_all(&name, "_");
    if name.is_empty() {
        format!("quest_log.{EXTENSION}")
    } else {
        format!("{name}.{EXTENSION}")
    }
}

fn require_text(
    doc: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<(), ImportError> {
    match doc.get(field) {
        None | Some(Value::Null) => Err(ImportError::MissingField(field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ImportError::MissingField(field)),
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(ImportError::InvalidField(field)),
    }
}

fn fill_stamps(object: &mut serde_json::Map<String, Value>, stamp: &str) {
    for field in ["created", "updated"] {
        let entry = object.entry(field).or_insert(Value::Null);
        if entry.is_null() {
            *entry = Value::String(stamp.to_string());
        }
    }
}

pub fn parse_document(text: &str, now: DateTime<Utc>) -> Result<QuestLog, ImportError> {
    let mut value: Value = serde_json::from_str(text)?;
    let doc = value
        .as_object_mut()
        .ok_or(ImportError::InvalidField("document"))?;
    require_text(doc, "id")?;
    require_text(doc, "name")?;
    let stamp = timestamp::format(&now);
    match doc.get_mut("quests") {
        None | Some(Value::Null) => return Err(ImportError::MissingField("quests")),
        Some(Value::Array(quests)) => {
            for quest in quests.iter_mut().filter_map(Value::as_object_mut) {
                fill_stamps(quest, &stamp);
            }
        }
        Some(_) => return Err(ImportError::InvalidField("quests")),
    }
    fill_stamps(doc, &stamp);
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Objective, Quest};
    use chrono::{TimeZone, Utc};

    fn import_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
    }

    fn dragon_hunt() -> QuestLog {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        QuestLog {
            id: "1717232400000".into(),
            name: "Dragon  Hunt".into(),
            quests: vec![Quest {
                id: "q1".into(),
                title: "Slay Dragon".into(),
                description: Some("Bring a shield".into()),
                objectives: vec![
                    Objective { id: "o1".into(), title: "Find lair".into(), completed: true },
                    Objective { id: "o2".into(), title: "Defeat dragon".into(), completed: false },
                ],
                created: t,
                updated: t + chrono::Duration::milliseconds(1),
            }],
            created: t,
            updated: t + chrono::Duration::milliseconds(2),
        }
    }

    #[test]
    fn export_then_import_is_lossless() {
        let log = dragon_hunt();
        let doc = export_document(&log).unwrap();
        assert!(doc.contains("\n  \"id\""), "document is pretty printed");
        assert_eq!(parse_document(&doc, import_time()).unwrap(), log);
    }

    #[test]
    fn file_name_is_sanitized() {
        let mut log = dragon_hunt();
        assert_eq!(export_file_name(&log), "Dragon_Hunt.quest");
        log.name = "a/b: c?".into();
        assert_eq!(export_file_name(&log), "a_b__c_.quest");
        log.name = "   ".into();
        assert_eq!(export_file_name(&log), "quest_log.quest");
    }

    #[test]
    fn required_fields_are_checked() {
        assert!(matches!(
            parse_document(r#"{"name": "x", "quests": []}"#, import_time()),
            Err(ImportError::MissingField("id"))
        ));
        assert!(matches!(
            parse_document(r#"{"id": "1", "name": "", "quests": []}"#, import_time()),
            Err(ImportError::MissingField("name"))
        ));
        assert!(matches!(
            parse_document(r#"{"id": "1", "name": "x"}"#, import_time()),
            Err(ImportError::MissingField("quests"))
        ));
        assert!(matches!(
            parse_document(r#"{"id": "1", "name": "x", "quests": {}}"#, import_time()),
            Err(ImportError::InvalidField("quests"))
        ));
        assert!(matches!(
            parse_document(r#"["not", "a", "log"]"#, import_time()),
            Err(ImportError::InvalidField("document"))
        ));
        assert!(matches!(
            parse_document("{oops", import_time()),
            Err(ImportError::InvalidJson(_))
        ));
    }

    #[test]
    fn missing_stamps_take_the_import_time() {
        let doc = r#"{
            "id": "1",
            "name": "Bare",
            "quests": [
                {"id": "q1", "title": "Undated", "objectives": []},
                {"id": "q2", "title": "Dated", "objectives": [],
                 "created": "2024-03-05T07:30:00", "updated": null}
            ]
        }"#;
        let now = import_time();
        let log = parse_document(doc, now).unwrap();
        assert_eq!((log.created, log.updated), (now, now));
        assert_eq!((log.quests[0].created, log.quests[0].updated), (now, now));
        assert_eq!(
            log.quests[1].created,
            Utc.with_ymd_and_hms(2024, 3, 5, 7, 30, 0).unwrap()
        );
        assert_eq!(log.quests[1].updated, now);
    }
}
