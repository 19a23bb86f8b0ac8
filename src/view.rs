//! Plain-text rendering of the menu, an open log and a quest card.

use std::fmt::Write as _;

use chrono::{DateTime, Local, TimeZone, Utc};
use colored::Colorize;

use crate::autosave::SaveStatus;
use crate::notify::{Level, Notification};
use crate::types::{Quest, QuestLog, QuestLogSummary, Template};

/// "Today at 14:05", "Yesterday at 09:30", otherwise "Jun 1, 2024".
pub fn relative_date_in<Tz: TimeZone>(at: DateTime<Utc>, now: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let at = at.with_timezone(tz);
    let today = now.with_timezone(tz).date_naive();
    let day = at.date_naive();
    if day == today {
        format!("Today at {}", at.format("%H:%M"))
    } else if today.pred_opt() == Some(day) {
        format!("Yesterday at {}", at.format("%H:%M"))
    } else {
        at.format("%b %-d, %Y").to_string()
    }
}

pub fn relative_date(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    relative_date_in(at, now, &Local)
}

fn status_badge(status: SaveStatus) -> String {
    match status {
        SaveStatus::Saved => status.as_str().green().to_string(),
        SaveStatus::Saving => status.as_str().cyan().to_string(),
        SaveStatus::Unsaved => status.as_str().yellow().to_string(),
        SaveStatus::Failed => status.as_str().red().to_string(),
    }
}

pub fn render_menu(summaries: &[QuestLogSummary], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Quest Logs".bold());
    if summaries.is_empty() {
        let _ = writeln!(out, "  No quest logs yet. Create one with `new <name>`.");
        return out;
    }
    for (i, s) in summaries.iter().enumerate() {
        let quests = if s.quest_count == 1 { "quest" } else { "quests" };
        let _ = writeln!(
            out,
            "  {:>2}. {}  ({} {}, updated {})",
            i + 1,
            s.name.bold(),
            s.quest_count,
            quests,
            relative_date(s.updated, now).dimmed()
        );
    }
    out
}

pub fn render_log(
    log: &QuestLog,
    selected: Option<&str>,
    status: SaveStatus,
    now: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  [{}]", log.name.bold(), status_badge(status));
    let _ = writeln!(out, "  updated {}", relative_date(log.updated, now).dimmed());
    if log.quests.is_empty() {
        let _ = writeln!(out, "  No quests yet. Add one with `add <title> | <objective>; ...`.");
        return out;
    }
    for (i, quest) in log.quests.iter().enumerate() {
        let marker = if selected == Some(quest.id.as_str()) { ">" } else { " " };
        let progress = quest.progress();
        let badge = if progress.total > 0 && progress.completed == progress.total {
            progress.to_string().green()
        } else {
            progress.to_string().normal()
        };
        let _ = writeln!(out, "{marker} {:>2}. {}  [{}]", i + 1, quest.title, badge);
    }
    out
}

pub fn render_quest(quest: &Quest, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  [{}]", quest.title.bold(), quest.progress());
    if let Some(description) = &quest.description {
        let _ = writeln!(out, "  {description}");
    }
    for (i, objective) in quest.objectives.iter().enumerate() {
        let check = if objective.completed { "[x]" } else { "[ ]" };
        let title = if objective.completed {
            objective.title.strikethrough().dimmed()
        } else {
            objective.title.normal()
        };
        let _ = writeln!(out, "    {}. {check} {title}", i + 1);
    }
    let _ = writeln!(out, "  updated {}", relative_date(quest.updated, now).dimmed());
    out
}

pub fn render_templates(templates: &[Template]) -> String {
    let mut out = String::new();
    if templates.is_empty() {
        let _ = writeln!(out, "  No templates available.");
        return out;
    }
    for t in templates {
        let _ = writeln!(out, "  {}  {}  {}", t.id.dimmed(), t.name.bold(), t.description);
    }
    out
}

pub fn render_notification(n: &Notification) -> String {
    match n.level {
        Level::Error => format!("! {}", n.message).red().to_string(),
        Level::Success => format!("* {}", n.message).green().to_string(),
        Level::Info => format!("- {}", n.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Objective;
    use chrono::Duration;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn relative_dates() {
        let now = at(2024, 6, 1, 18, 0);
        assert_eq!(relative_date_in(at(2024, 6, 1, 9, 5), now, &Utc), "Today at 09:05");
        assert_eq!(
            relative_date_in(at(2024, 5, 31, 23, 59), now, &Utc),
            "Yesterday at 23:59"
        );
        assert_eq!(relative_date_in(at(2024, 5, 30, 12, 0), now, &Utc), "May 30, 2024");
        assert_eq!(relative_date_in(at(2023, 1, 2, 12, 0), now, &Utc), "Jan 2, 2023");
    }

    #[test]
    fn menu_and_log_rendering() {
        colored::control::set_override(false);
        let now = at(2024, 6, 1, 18, 0);
        assert!(render_menu(&[], now).contains("No quest logs yet"));

        let quest = Quest {
            id: "q1".into(),
            title: "Slay Dragon".into(),
            description: Some("Bring a shield".into()),
            objectives: vec![
                Objective { id: "o1".into(), title: "Find lair".into(), completed: true },
                Objective { id: "o2".into(), title: "Defeat dragon".into(), completed: false },
            ],
            created: now,
            updated: now,
        };
        let log = QuestLog {
            id: "l1".into(),
            name: "Dragon Hunt".into(),
            quests: vec![quest.clone()],
            created: now - Duration::days(3),
            updated: now,
        };
        let menu = render_menu(&[log.summary()], now);
        assert!(menu.contains("Dragon Hunt"));
        assert!(menu.contains("1 quest,"));

        let page = render_log(&log, Some("q1"), SaveStatus::Unsaved, now);
        assert!(page.contains("Unsaved changes..."));
        assert!(page.contains(">  1. Slay Dragon"));
        assert!(page.contains("1/2"));

        let card = render_quest(&quest, now);
        assert!(card.contains("[x] Find lair"));
        assert!(card.contains("[ ] Defeat dragon"));
        assert!(card.contains("Bring a shield"));
    }
}
