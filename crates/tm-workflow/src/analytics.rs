//! Status analytics over a project's task set.
//!
//! Derived from the `status_history` trail each [`Task`] accumulates
//! ([`tm_store::Task::push_history`]); history is treated as an
//! analytics-only log, never as the source of truth for current status.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tm_store::{Priority, Task, TaskStatus};

const STALE_DAYS: i64 = 14;
const LONG_RUNNING_DAYS: i64 = 7;
const BLOCKED_ATTENTION_DAYS: i64 = 3;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusCounts {
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub total: usize,
    pub counts: StatusCounts,
    pub completion_rate: f64,
    pub wip_count: usize,
    pub avg_in_progress_hours: Option<f64>,
    pub backlog_age_p50_days: Option<f64>,
    pub backlog_age_p90_days: Option<f64>,
    pub stale_count: usize,
    pub long_running_count: usize,
    pub blocked_needing_attention: usize,
    pub throughput_last_7_days: usize,
    pub focus_score: f64,
}

/// Computes analytics over `tasks` as of `now`. `now` is threaded in by the
/// caller so results are deterministic and testable.
pub fn analyze(tasks: &[Task], now: DateTime<Utc>) -> Analytics {
    let total = tasks.len();
    let mut counts = StatusCounts::default();
    for t in tasks {
        match t.status {
            TaskStatus::Todo => counts.todo += 1,
            TaskStatus::InProgress => counts.in_progress += 1,
            TaskStatus::Done => counts.done += 1,
            TaskStatus::Blocked => counts.blocked += 1,
        }
    }

    let completion_rate = if total == 0 { 0.0 } else { counts.done as f64 / total as f64 };
    let wip_count = counts.in_progress + counts.blocked;

    let avg_in_progress_hours = average_in_progress_hours(tasks);

    let mut backlog_ages: Vec<f64> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Todo)
        .map(|t| (now - t.created).num_minutes() as f64 / 1440.0)
        .collect();
    backlog_ages.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let backlog_age_p50_days = percentile(&backlog_ages, 0.5);
    let backlog_age_p90_days = percentile(&backlog_ages, 0.9);

    let stale_count = tasks
        .iter()
        .filter(|t| t.status != TaskStatus::Done && (now - t.updated).num_days() >= STALE_DAYS)
        .count();

    let long_running_count = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress && (now - t.created).num_days() >= LONG_RUNNING_DAYS)
        .count();

    let blocked_needing_attention = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Blocked && (now - t.updated).num_days() >= BLOCKED_ATTENTION_DAYS)
        .count();

    let throughput_last_7_days = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .filter(|t| t.completed.map(|c| (now - c).num_days() <= 7).unwrap_or(false))
        .count();

    let focus_score = non_low_priority_time_share(tasks, now);

    Analytics {
        total,
        counts,
        completion_rate,
        wip_count,
        avg_in_progress_hours,
        backlog_age_p50_days,
        backlog_age_p90_days,
        stale_count,
        long_running_count,
        blocked_needing_attention,
        throughput_last_7_days,
        focus_score,
    }
}

fn average_in_progress_hours(tasks: &[Task]) -> Option<f64> {
    let mut total_hours = 0.0;
    let mut spans = 0usize;
    for task in tasks {
        let mut entered: Option<DateTime<Utc>> = None;
        for transition in &task.status_history {
            if transition.to == TaskStatus::InProgress {
                entered = Some(transition.at);
            } else if let Some(start) = entered.take() {
                total_hours += (transition.at - start).num_minutes() as f64 / 60.0;
                spans += 1;
            }
        }
    }
    if spans == 0 { None } else { Some(total_hours / spans as f64) }
}

/// Share of cumulative task age spent on medium/high/urgent work rather than
/// low priority: each task's age (`now - created`) is weighted into either
/// the numerator or the total depending on its priority.
fn non_low_priority_time_share(tasks: &[Task], now: DateTime<Utc>) -> f64 {
    let age_minutes = |t: &Task| (now - t.created).num_minutes().max(0) as f64;
    let total_age: f64 = tasks.iter().map(age_minutes).sum();
    if total_age == 0.0 {
        return 1.0;
    }
    let non_low_age: f64 = tasks.iter().filter(|t| t.priority != Priority::Low).map(age_minutes).sum();
    non_low_age / total_age
}

fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted.get(idx).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;
    use tm_store::{Category, Priority, StatusTransition};

    fn task(status: TaskStatus, created_days_ago: i64, updated_days_ago: i64) -> Task {
        let now = Utc::now();
        Task {
            id: format!("t-{created_days_ago}-{updated_days_ago}"),
            serial: "TASK-0001".into(),
            title: "t".into(),
            description: "d".into(),
            project: "default".into(),
            category: Category::default(),
            priority: Priority::default(),
            status,
            parent_task: None,
            subtasks: vec![],
            tags: vec![],
            memory_connections: vec![],
            created: now - Duration::days(created_days_ago),
            updated: now - Duration::days(updated_days_ago),
            completed: if status == TaskStatus::Done { Some(now - Duration::days(updated_days_ago)) } else { None },
            status_history: vec![],
            extra: HashMap::new(),
        }
    }

    #[test]
    fn counts_tasks_by_status() {
        let tasks = vec![task(TaskStatus::Todo, 1, 1), task(TaskStatus::Done, 10, 1), task(TaskStatus::Blocked, 5, 5)];
        let analytics = analyze(&tasks, Utc::now());
        assert_eq!(analytics.counts.todo, 1);
        assert_eq!(analytics.counts.done, 1);
        assert_eq!(analytics.counts.blocked, 1);
        assert_eq!(analytics.total, 3);
    }

    #[test]
    fn stale_and_blocked_attention_thresholds() {
        let tasks = vec![task(TaskStatus::Todo, 30, 20), task(TaskStatus::Blocked, 10, 10)];
        let analytics = analyze(&tasks, Utc::now());
        assert_eq!(analytics.stale_count, 2);
        assert_eq!(analytics.blocked_needing_attention, 1);
    }

    #[test]
    fn average_in_progress_uses_entered_and_exited_transitions() {
        let now = Utc::now();
        let mut t = task(TaskStatus::Done, 5, 0);
        t.status_history = vec![
            StatusTransition { from: TaskStatus::Todo, to: TaskStatus::InProgress, at: now - Duration::hours(10), reason: None },
            StatusTransition { from: TaskStatus::InProgress, to: TaskStatus::Done, at: now, reason: None },
        ];
        let analytics = analyze(&[t], now);
        assert_eq!(analytics.avg_in_progress_hours, Some(10.0));
    }

    #[test]
    fn empty_task_list_has_full_focus_score() {
        let analytics = analyze(&[], Utc::now());
        assert_eq!(analytics.focus_score, 1.0);
        assert_eq!(analytics.completion_rate, 0.0);
    }

    #[test]
    fn focus_score_weights_by_task_age_and_priority() {
        let mut low = task(TaskStatus::InProgress, 10, 0);
        low.priority = Priority::Low;
        let mut high = task(TaskStatus::Todo, 10, 0);
        high.priority = Priority::High;
        let analytics = analyze(&[low, high], Utc::now());
        assert!((analytics.focus_score - 0.5).abs() < 0.01);
    }

    #[test]
    fn long_running_threshold_is_seven_days() {
        let still_fresh = task(TaskStatus::InProgress, 6, 0);
        let overdue = task(TaskStatus::InProgress, 8, 0);
        let analytics = analyze(&[still_fresh, overdue], Utc::now());
        assert_eq!(analytics.long_running_count, 1);
    }
}
