//! Static task catalog: recurring task templates and specialist→project
//! assignments, read from JSON files at startup. Read-only at runtime.
//!
//! Absent or malformed files yield an empty list; the scheduler must never
//! crash over catalog problems.

use std::path::Path;

use serde::Deserialize;

/// A catalog entry describing one subscriber and their project assignments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogSubscriber {
    pub display_name: String,
    /// Channel-level address (e.g. a Telegram chat id).
    pub recipient_id: String,
    pub projects: Vec<String>,
}

/// A recurring task template: name plus recurrence interval.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskTemplate {
    pub task_name: String,
    pub interval_minutes: i64,
}

#[derive(Debug, Deserialize)]
struct SubscribersFile {
    subscribers: Vec<CatalogSubscriber>,
}

#[derive(Debug, Deserialize)]
struct TasksFile {
    tasks: Vec<TaskTemplate>,
}

/// Load subscriber assignments, sorted by display name.
pub fn load_subscribers(path: impl AsRef<Path>) -> Vec<CatalogSubscriber> {
    let mut subscribers = match read_json::<SubscribersFile>(path.as_ref()) {
        Some(file) => file.subscribers,
        None => return Vec::new(),
    };
    subscribers.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    subscribers
}

/// Load recurring task templates. Templates with a non-positive interval are
/// dropped with a warning.
pub fn load_task_templates(path: impl AsRef<Path>) -> Vec<TaskTemplate> {
    let templates = match read_json::<TasksFile>(path.as_ref()) {
        Some(file) => file.tasks,
        None => return Vec::new(),
    };
    templates
        .into_iter()
        .filter(|t| {
            if t.interval_minutes <= 0 {
                tracing::warn!(
                    task_name = %t.task_name,
                    interval_minutes = t.interval_minutes,
                    "Dropping task template with non-positive interval"
                );
                false
            } else {
                true
            }
        })
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Catalog file not readable");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Catalog file is not valid JSON");
            None
        }
    }
}
