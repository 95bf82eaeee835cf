//! Reminder grouper — collapses due rows sharing a task name into one
//! outbound notification carrying the union of their projects.
//!
//! Task identity is the lowercase name; the display form is capitalized.
//! Output is deterministic for identical input regardless of row order.

use std::collections::{BTreeMap, BTreeSet};

use herald_common::types::{GroupedReminder, ScheduleRow};

/// Groups due schedule rows into per-task reminders.
pub struct ReminderGrouper;

impl ReminderGrouper {
    /// One `GroupedReminder` per distinct lowercase task name, with the
    /// sorted deduplicated project union and the minimum interval across the
    /// group (the shortest cadence is the conservative "next reminder"
    /// estimate when projects disagree).
    pub fn group(rows: &[ScheduleRow]) -> Vec<GroupedReminder> {
        let mut groups: BTreeMap<String, (BTreeSet<String>, i64, Vec<uuid::Uuid>)> =
            BTreeMap::new();

        for row in rows {
            let key = row.task_name.to_lowercase();
            let entry = groups
                .entry(key)
                .or_insert_with(|| (BTreeSet::new(), row.interval_minutes, Vec::new()));
            entry.0.insert(row.project.clone());
            entry.1 = entry.1.min(row.interval_minutes);
            entry.2.push(row.id);
        }

        groups
            .into_iter()
            .map(|(key, (projects, interval_minutes, mut row_ids))| {
                row_ids.sort();
                GroupedReminder {
                    task_name: capitalize(&key),
                    projects: projects.into_iter().collect(),
                    interval_minutes,
                    row_ids,
                }
            })
            .collect()
    }
}

/// Uppercase the first character, lowercase the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}
