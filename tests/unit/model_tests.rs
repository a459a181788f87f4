use chrono::Utc;

use ai_intervention_agent::models::task::{Task, TaskStatus};

fn task(auto_resubmit_timeout: u64) -> Task {
    Task::new(
        "proj-0001".into(),
        "prompt".into(),
        vec!["yes".into(), "no".into()],
        auto_resubmit_timeout,
    )
}

#[test]
fn new_tasks_start_pending() {
    let task = task(0);
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.result.is_none());
    assert!(task.completed_at.is_none());
}

#[test]
fn deadline_tracks_the_timeout() {
    let t = task(300);
    let deadline = t.deadline.expect("deadline set");
    let delta = (deadline - t.created_at).num_seconds();
    assert_eq!(delta, 300);

    assert!(task(0).deadline.is_none());
}

#[test]
fn remaining_seconds_floors_at_zero() {
    let t = task(1);
    let far_future = Utc::now() + chrono::Duration::seconds(3600);
    assert_eq!(t.remaining_seconds(far_future), Some(0));
    assert!(t.remaining_seconds(t.created_at).expect("some") >= 0);
    assert!(task(0).remaining_seconds(Utc::now()).is_none());
}

#[test]
fn transitions_only_advance() {
    let mut task = task(0);

    // pending → active and pending → completed are legal.
    assert!(task.can_transition_to(TaskStatus::Active));
    assert!(task.can_transition_to(TaskStatus::Completed));
    assert!(!task.can_transition_to(TaskStatus::Pending));

    // active → pending (explicit demotion) and active → completed.
    task.status = TaskStatus::Active;
    assert!(task.can_transition_to(TaskStatus::Pending));
    assert!(task.can_transition_to(TaskStatus::Completed));
    assert!(!task.can_transition_to(TaskStatus::Active));

    // completed is terminal.
    task.status = TaskStatus::Completed;
    assert!(!task.can_transition_to(TaskStatus::Pending));
    assert!(!task.can_transition_to(TaskStatus::Active));
    assert!(!task.can_transition_to(TaskStatus::Completed));
}
