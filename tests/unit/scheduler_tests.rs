use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use ai_intervention_agent::config::{CliOverrides, ConfigStore};
use ai_intervention_agent::models::task::{FeedbackResult, TaskStatus};
use ai_intervention_agent::queue::{TaskQueue, DEFAULT_MAX_TASKS};
use ai_intervention_agent::rendezvous::{RendezvousRegistry, WaitOutcome};
use ai_intervention_agent::scheduler::ResubmitScheduler;

const TEST_CONFIG: &str = r#"{
    "feedback": {
        "timeout": 600,
        "resubmit_prompt": "carry on without me"
    }
}"#;

struct Fixture {
    queue: Arc<TaskQueue>,
    rendezvous: Arc<RendezvousRegistry>,
    scheduler: ResubmitScheduler,
}

fn fixture() -> Fixture {
    let config =
        Arc::new(ConfigStore::from_jsonc_str(TEST_CONFIG, CliOverrides::default()).expect("config"));
    let queue = Arc::new(TaskQueue::new("sched", DEFAULT_MAX_TASKS));
    let rendezvous = Arc::new(RendezvousRegistry::new());
    let scheduler = ResubmitScheduler::new(
        Arc::clone(&queue),
        Arc::clone(&rendezvous),
        config,
    );
    Fixture {
        queue,
        rendezvous,
        scheduler,
    }
}

#[tokio::test]
async fn deadline_fire_synthesizes_the_canned_submission() {
    let f = fixture();
    let id = f.queue.add("prompt".into(), vec![], 300).expect("add");
    let rx = f.rendezvous.register(&id).await;

    // Deadline already elapsed: the timer fires on its first clock check.
    f.scheduler.arm(&id, Utc::now()).await;

    let outcome = RendezvousRegistry::wait(rx, Duration::from_secs(5)).await;
    assert_eq!(
        outcome,
        WaitOutcome::Submitted(FeedbackResult::text("carry on without me"))
    );
    let task = f.queue.get(&id).expect("task");
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(
        task.result.expect("result").user_input,
        "carry on without me"
    );
}

#[tokio::test]
async fn disarm_prevents_the_fire() {
    let f = fixture();
    let id = f.queue.add("prompt".into(), vec![], 300).expect("add");
    let rx = f.rendezvous.register(&id).await;

    f.scheduler
        .arm(&id, Utc::now() + chrono::Duration::seconds(2))
        .await;
    f.scheduler.disarm(&id).await;

    let outcome = RendezvousRegistry::wait(rx, Duration::from_secs(3)).await;
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert_eq!(f.queue.get(&id).expect("task").status, TaskStatus::Active);
}

#[tokio::test]
async fn human_submission_wins_the_race() {
    let f = fixture();
    let id = f.queue.add("prompt".into(), vec![], 300).expect("add");
    let rx = f.rendezvous.register(&id).await;

    // Human submits first; the already-late timer must become a no-op.
    let stored = f
        .queue
        .submit(&id, FeedbackResult::text("human answer"))
        .expect("submit");
    f.rendezvous
        .deliver(&id, ai_intervention_agent::models::task::TaskOutcome::Submitted(stored))
        .await;
    f.scheduler.arm(&id, Utc::now()).await;

    let outcome = RendezvousRegistry::wait(rx, Duration::from_secs(5)).await;
    assert_eq!(
        outcome,
        WaitOutcome::Submitted(FeedbackResult::text("human answer"))
    );
    // Give the losing timer a moment to run its no-op path.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        f.queue.get(&id).expect("task").result.expect("result").user_input,
        "human answer"
    );
}

#[tokio::test]
async fn rearming_replaces_the_previous_timer() {
    let f = fixture();
    let id = f.queue.add("prompt".into(), vec![], 300).expect("add");

    f.scheduler
        .arm(&id, Utc::now() + chrono::Duration::seconds(60))
        .await;
    f.scheduler
        .arm(&id, Utc::now() + chrono::Duration::seconds(120))
        .await;

    assert_eq!(f.scheduler.armed_count().await, 1);
    f.scheduler.disarm(&id).await;
    assert_eq!(f.scheduler.armed_count().await, 0);
}

#[tokio::test]
async fn shutdown_disarms_everything() {
    let f = fixture();
    let a = f.queue.add("a".into(), vec![], 300).expect("add");
    let b = f.queue.add("b".into(), vec![], 300).expect("add");
    f.scheduler
        .arm(&a, Utc::now() + chrono::Duration::seconds(60))
        .await;
    f.scheduler
        .arm(&b, Utc::now() + chrono::Duration::seconds(60))
        .await;

    f.scheduler.shutdown().await;
    assert_eq!(f.scheduler.armed_count().await, 0);
}
