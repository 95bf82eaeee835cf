//! Reminder message text.
//!
//! Plain functions so the (out-of-scope) localization veneer can swap the
//! wording without touching the scheduling core. The recovery notice is
//! intentionally worded differently from a normal reminder, so the
//! subscriber understands it was a catch-up, not a fresh occurrence.

use chrono::{DateTime, Datelike, Duration, Utc};

use herald_common::types::{GroupedReminder, RecoveryNotice};

/// Human phrase for a recurrence interval: whole days when possible, then
/// whole hours, then minutes.
pub fn interval_phrase(interval_minutes: i64) -> String {
    let (value, unit) = if interval_minutes % (24 * 60) == 0 {
        (interval_minutes / (24 * 60), "day")
    } else if interval_minutes % 60 == 0 {
        (interval_minutes / 60, "hour")
    } else {
        (interval_minutes, "minute")
    };
    if value == 1 {
        format!("1 {unit}")
    } else {
        format!("{value} {unit}s")
    }
}

/// One grouped due-reminder: the task, every project it is due for, and when
/// the next reminder will come (from the group's shortest interval).
pub fn due_reminder(group: &GroupedReminder, now: DateTime<Utc>) -> String {
    let projects = group
        .projects
        .iter()
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    let next = now + Duration::minutes(group.interval_minutes);
    format!(
        "*📋 TIME TO {}*\n\n{}\n\n*⏰ NEXT REMINDER {} {}*",
        group.task_name.to_uppercase(),
        projects,
        next.day(),
        next.format("%B"),
    )
}

/// Catch-up notice for one row whose reminders were missed while the process
/// was offline.
pub fn recovery_notice(notice: &RecoveryNotice) -> String {
    format!(
        "*❗ MISSED TASK DETECTED*\n\n*📋 {}*\nProject: {}\n\n*⏰ NEXT CHECK: {}*",
        notice.task_name.to_uppercase(),
        notice.project,
        notice.next_due.format("%d.%m.%Y %H:%M"),
    )
}

/// Post-activation summary: every task on the subscriber's schedule with its
/// check cadence.
pub fn schedule_summary(groups: &[GroupedReminder]) -> String {
    let mut lines = vec!["*YOUR REMINDERS AND CHECK SCHEDULE*".to_string(), String::new()];
    for group in groups {
        lines.push(format!(
            "• {} — every *{}*",
            group.task_name,
            interval_phrase(group.interval_minutes)
        ));
    }
    lines.join("\n")
}
