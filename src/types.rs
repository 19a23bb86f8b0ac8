use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type LogId = String;
pub type QuestId = String;
pub type ObjectiveId = String;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub id: ObjectiveId,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub objectives: Vec<Objective>,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated: DateTime<Utc>,
}

impl Quest {
    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.objectives.iter().filter(|o| o.completed).count(),
            total: self.objectives.len(),
        }
    }

    pub fn objective(&self, id: &str) -> Option<&Objective> {
        self.objectives.iter().find(|o| o.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestLog {
    pub id: LogId,
    pub name: String,
    #[serde(default)]
    pub quests: Vec<Quest>,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated: DateTime<Utc>,
}

impl QuestLog {
    pub fn quest(&self, id: &str) -> Option<&Quest> {
        self.quests.iter().find(|q| q.id == id)
    }

    pub fn summary(&self) -> QuestLogSummary {
        QuestLogSummary::from(self)
    }
}

/// Lightweight listing entry for the log menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuestLogSummary {
    pub id: LogId,
    pub name: String,
    pub quest_count: usize,
    pub updated: DateTime<Utc>,
}

impl From<&QuestLog> for QuestLogSummary {
    fn from(log: &QuestLog) -> Self {
        Self {
            id: log.id.clone(),
            name: log.name.clone(),
            quest_count: log.quests.len(),
            updated: log.updated,
        }
    }
}

/// A server-provided log that can be copied into the collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Objective row of a quest form. Rows carrying an `id` refer to an
/// existing objective; rows without one create a new objective.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectiveInput {
    pub id: Option<ObjectiveId>,
    pub title: String,
}

impl ObjectiveInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
        }
    }

    pub fn existing(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: title.into(),
        }
    }
}

/// Submitted content of the add/edit quest form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuestDraft {
    pub title: String,
    pub description: String,
    pub objectives: Vec<ObjectiveInput>,
}

impl QuestDraft {
    pub fn new<I, S>(title: impl Into<String>, objectives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            description: String::new(),
            objectives: objectives.into_iter().map(ObjectiveInput::new).collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// RFC 3339 timestamps with millisecond precision. Offset-less ISO-8601
/// input (as the server writes them) is read as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(parsed.with_timezone(&Utc).trunc_subsecs(3));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc().trunc_subsecs(3))
            .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn progress_counts_completed_objectives() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let quest = Quest {
            id: "q".into(),
            title: "Slay Dragon".into(),
            description: None,
            objectives: vec![
                Objective { id: "a".into(), title: "Find lair".into(), completed: true },
                Objective { id: "b".into(), title: "Defeat dragon".into(), completed: false },
            ],
            created: t,
            updated: t,
        };
        assert_eq!(quest.progress().to_string(), "1/2");
    }

    #[test]
    fn reads_naive_server_timestamps_as_utc() {
        let log: QuestLog = serde_json::from_value(json!({
            "id": "daily-tasks",
            "name": "Daily Tasks",
            "quests": [{
                "id": "morning-routine",
                "title": "Morning Routine",
                "objectives": [{ "id": "obj1", "title": "Drink water", "completed": false }],
                "created": "2024-03-05T07:30:00.123456",
                "updated": "2024-03-05T07:30:00"
            }],
            "created": "2024-03-05T07:30:00.123456",
            "updated": "2024-03-05T07:30:00.123456"
        }))
        .unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 7, 30, 0).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(log.created, expected);
        assert_eq!(log.quests[0].updated, Utc.with_ymd_and_hms(2024, 3, 5, 7, 30, 0).unwrap());
    }

    #[test]
    fn writes_millisecond_utc_timestamps() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 7, 30, 0).unwrap();
        assert_eq!(timestamp::format(&t), "2024-03-05T07:30:00.000Z");
        assert!(timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn summary_counts_quests() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let log = QuestLog {
            id: "1".into(),
            name: "Dragon Hunt".into(),
            quests: vec![],
            created: t,
            updated: t,
        };
        let summary = log.summary();
        assert_eq!(summary.quest_count, 0);
        assert_eq!(summary.name, "Dragon Hunt");
    }
}
