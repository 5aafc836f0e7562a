//! Progress rollup rules for objectives.
//!
//! Everything here is pure: callers fetch the related records and hand them
//! in as a [`ProgressSnapshot`]. The write path (`GoalProgressService`) and
//! the read path (objective detail) both go through these functions so the
//! stored and displayed values use identical rounding.

use super::{KeyResult, Objective, ProgressSource};
use crate::project::ProjectTask;

/// Top-level task tally for one project. Subtasks are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
}

impl TaskCounts {
    pub fn from_tasks(tasks: &[ProjectTask]) -> Self {
        tasks
            .iter()
            .filter(|t| t.parent_id.is_none())
            .fold(Self::default(), |acc, t| Self {
                total: acc.total + 1,
                completed: acc.completed + usize::from(t.completed),
            })
    }
}

/// Related records loaded for one objective. Only the collection matching
/// the objective's `progress_source` is consulted.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub key_results: Vec<KeyResult>,
    pub children: Vec<Objective>,
    pub projects: Vec<TaskCounts>,
}

/// Which sources the read path recomputes instead of trusting the stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadPathPolicy {
    pub recompute_projects: bool,
}

fn round_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0).round() as u8
}

fn mean_percent(values: impl Iterator<Item = u8>) -> u8 {
    let (sum, count) = values.fold((0u64, 0u64), |(s, c), v| (s + u64::from(v), c + 1));
    if count == 0 {
        return 0;
    }
    round_percent(sum as f64 / count as f64)
}

pub fn key_result_progress(kr: &KeyResult) -> u8 {
    let range = kr.target_value - kr.start_value;
    if range == 0.0 {
        // Nothing to travel: done only once the value has moved past the target.
        return if kr.current_value > kr.target_value { 100 } else { 0 };
    }
    let ratio = if range.is_finite() {
        (kr.current_value - kr.start_value) / range
    } else {
        // halved operands keep the subtraction finite for values near f64::MAX
        (kr.current_value / 2.0 - kr.start_value / 2.0)
            / (kr.target_value / 2.0 - kr.start_value / 2.0)
    };
    round_percent(ratio * 100.0)
}

pub fn project_progress(counts: TaskCounts) -> u8 {
    if counts.total == 0 {
        return 0;
    }
    round_percent(100.0 * counts.completed as f64 / counts.total as f64)
}

/// Progress the rule for `objective.progress_source` yields from `snapshot`.
/// `MANUAL` objectives keep their stored value.
pub fn compute_progress(objective: &Objective, snapshot: &ProgressSnapshot) -> u8 {
    match objective.progress_source {
        ProgressSource::Manual => objective.progress.min(100),
        ProgressSource::KeyResults => {
            mean_percent(snapshot.key_results.iter().map(key_result_progress))
        }
        ProgressSource::SubObjectives => {
            mean_percent(snapshot.children.iter().map(|c| c.progress.min(100)))
        }
        ProgressSource::Projects => {
            mean_percent(snapshot.projects.iter().copied().map(project_progress))
        }
    }
}

/// Progress shown when an objective is read. `PROJECTS` objectives report
/// the stored value unless the policy asks for a recompute.
pub fn display_progress(
    objective: &Objective,
    snapshot: &ProgressSnapshot,
    policy: ReadPathPolicy,
) -> u8 {
    match objective.progress_source {
        ProgressSource::KeyResults | ProgressSource::SubObjectives => {
            compute_progress(objective, snapshot)
        }
        ProgressSource::Projects if policy.recompute_projects => {
            compute_progress(objective, snapshot)
        }
        ProgressSource::Projects | ProgressSource::Manual => objective.progress.min(100),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::ObjectiveStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn objective(source: ProgressSource, progress: u8) -> Objective {
        let now = Utc::now();
        Objective {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            parent_id: None,
            team_id: None,
            name: "Grow revenue".to_string(),
            description: None,
            status: ObjectiveStatus::OnTrack,
            progress,
            progress_source: source,
            period: "2026-Q1".to_string(),
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn kr(start: f64, target: f64, current: f64) -> KeyResult {
        let now = Utc::now();
        KeyResult {
            id: Uuid::new_v4(),
            objective_id: Uuid::nil(),
            name: "kr".to_string(),
            description: None,
            start_value: start,
            target_value: target,
            current_value: current,
            unit: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn task(parent_id: Option<Uuid>, completed: bool) -> ProjectTask {
        let now = Utc::now();
        ProjectTask {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            parent_id,
            name: "task".to_string(),
            completed,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_zero_range_key_result() {
        assert_eq!(key_result_progress(&kr(0.0, 0.0, 0.0)), 0);
        assert_eq!(key_result_progress(&kr(0.0, 0.0, 5.0)), 100);
        assert_eq!(key_result_progress(&kr(10.0, 10.0, 9.0)), 0);
        assert_eq!(key_result_progress(&kr(10.0, 10.0, 10.0)), 0);
    }

    #[test]
    fn test_linear_key_result_is_clamped() {
        assert_eq!(key_result_progress(&kr(0.0, 10.0, 5.0)), 50);
        assert_eq!(key_result_progress(&kr(0.0, 10.0, 15.0)), 100);
        assert_eq!(key_result_progress(&kr(0.0, 10.0, -5.0)), 0);
    }

    #[test]
    fn test_decreasing_key_result() {
        // churn from 20% down to 10%
        assert_eq!(key_result_progress(&kr(20.0, 10.0, 15.0)), 50);
        assert_eq!(key_result_progress(&kr(20.0, 10.0, 25.0)), 0);
    }

    #[test]
    fn test_nan_values_count_as_zero() {
        assert_eq!(key_result_progress(&kr(0.0, 10.0, f64::NAN)), 0);
    }

    #[test]
    fn test_overflowing_ratio_is_clamped() {
        assert_eq!(key_result_progress(&kr(0.0, 1e-300, 1e300)), 100);
        assert_eq!(key_result_progress(&kr(0.0, 1e-300, -1e300)), 0);
    }

    #[test]
    fn test_overflowing_range_is_clamped() {
        assert_eq!(key_result_progress(&kr(-1e308, 1e308, 1e308)), 100);
        assert_eq!(key_result_progress(&kr(-1e308, 1e308, 0.0)), 50);
        assert_eq!(key_result_progress(&kr(-1e308, 1e308, -1e308)), 0);
        assert_eq!(key_result_progress(&kr(1e308, -1e308, -1e308)), 100);
    }

    #[test]
    fn test_no_key_results_is_zero() {
        let obj = objective(ProgressSource::KeyResults, 70);
        assert_eq!(compute_progress(&obj, &ProgressSnapshot::default()), 0);
    }

    #[test]
    fn test_key_results_mean() {
        let obj = objective(ProgressSource::KeyResults, 0);
        let snapshot = ProgressSnapshot {
            key_results: vec![kr(0.0, 100.0, 40.0), kr(0.0, 100.0, 60.0)],
            ..Default::default()
        };
        assert_eq!(compute_progress(&obj, &snapshot), 50);
    }

    #[test]
    fn test_key_results_are_rounded_before_averaging() {
        let obj = objective(ProgressSource::KeyResults, 0);
        // 10.4, 10.4, 10.7 -> 10, 10, 11 -> 10.33; the raw mean would be 10.5
        let snapshot = ProgressSnapshot {
            key_results: vec![
                kr(0.0, 1000.0, 104.0),
                kr(0.0, 1000.0, 104.0),
                kr(0.0, 1000.0, 107.0),
            ],
            ..Default::default()
        };
        assert_eq!(compute_progress(&obj, &snapshot), 10);
    }

    #[test]
    fn test_sub_objectives_round_half_up() {
        let obj = objective(ProgressSource::SubObjectives, 0);
        let snapshot = ProgressSnapshot {
            children: vec![
                objective(ProgressSource::Manual, 30),
                objective(ProgressSource::Manual, 45),
            ],
            ..Default::default()
        };
        assert_eq!(compute_progress(&obj, &snapshot), 38);
    }

    #[test]
    fn test_sub_objectives_empty_is_zero() {
        let obj = objective(ProgressSource::SubObjectives, 12);
        assert_eq!(compute_progress(&obj, &ProgressSnapshot::default()), 0);
    }

    #[test]
    fn test_project_without_tasks_is_zero() {
        assert_eq!(project_progress(TaskCounts::default()), 0);
    }

    #[test]
    fn test_project_counts_top_level_tasks_only() {
        let parent = Uuid::new_v4();
        let tasks = vec![
            task(None, true),
            task(None, true),
            task(None, true),
            task(None, false),
            task(Some(parent), false),
            task(Some(parent), false),
        ];
        let counts = TaskCounts::from_tasks(&tasks);
        assert_eq!(counts, TaskCounts { total: 4, completed: 3 });
        assert_eq!(project_progress(counts), 75);
    }

    #[test]
    fn test_projects_mean() {
        let obj = objective(ProgressSource::Projects, 0);
        let snapshot = ProgressSnapshot {
            projects: vec![
                TaskCounts { total: 4, completed: 3 },
                TaskCounts { total: 0, completed: 0 },
            ],
            ..Default::default()
        };
        // (75 + 0) / 2 = 37.5
        assert_eq!(compute_progress(&obj, &snapshot), 38);
    }

    #[test]
    fn test_manual_keeps_stored_value() {
        let obj = objective(ProgressSource::Manual, 64);
        let snapshot = ProgressSnapshot {
            key_results: vec![kr(0.0, 10.0, 10.0)],
            ..Default::default()
        };
        assert_eq!(compute_progress(&obj, &snapshot), 64);
    }

    #[test]
    fn test_display_skips_projects_by_default() {
        let obj = objective(ProgressSource::Projects, 20);
        let snapshot = ProgressSnapshot {
            projects: vec![TaskCounts { total: 2, completed: 2 }],
            ..Default::default()
        };
        assert_eq!(display_progress(&obj, &snapshot, ReadPathPolicy::default()), 20);
        let policy = ReadPathPolicy { recompute_projects: true };
        assert_eq!(display_progress(&obj, &snapshot, policy), 100);
    }

    #[test]
    fn test_display_matches_write_path_for_key_results() {
        let obj = objective(ProgressSource::KeyResults, 3);
        let snapshot = ProgressSnapshot {
            key_results: vec![kr(0.0, 8.0, 3.0), kr(5.0, 5.0, 5.0)],
            ..Default::default()
        };
        assert_eq!(
            display_progress(&obj, &snapshot, ReadPathPolicy::default()),
            compute_progress(&obj, &snapshot)
        );
    }
}
