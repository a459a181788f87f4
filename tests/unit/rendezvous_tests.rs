use std::time::Duration;

use ai_intervention_agent::models::task::{FeedbackResult, TaskOutcome};
use ai_intervention_agent::rendezvous::{RendezvousRegistry, WaitOutcome};

#[tokio::test]
async fn deliver_wakes_the_waiter() {
    let registry = RendezvousRegistry::new();
    let rx = registry.register("t-0001").await;

    registry
        .deliver("t-0001", TaskOutcome::Submitted(FeedbackResult::text("hi")))
        .await;

    let outcome = RendezvousRegistry::wait(rx, Duration::from_secs(1)).await;
    assert_eq!(outcome, WaitOutcome::Submitted(FeedbackResult::text("hi")));
}

#[tokio::test]
async fn deliver_to_unknown_slot_is_silent() {
    let registry = RendezvousRegistry::new();
    registry
        .deliver("ghost", TaskOutcome::Submitted(FeedbackResult::text("x")))
        .await;
}

#[tokio::test]
async fn second_deliver_is_silent() {
    let registry = RendezvousRegistry::new();
    let rx = registry.register("t-0001").await;

    registry
        .deliver("t-0001", TaskOutcome::Submitted(FeedbackResult::text("human")))
        .await;
    // The scheduler losing the race delivers again; nothing happens.
    registry
        .deliver("t-0001", TaskOutcome::Submitted(FeedbackResult::text("timer")))
        .await;

    let outcome = RendezvousRegistry::wait(rx, Duration::from_secs(1)).await;
    assert_eq!(
        outcome,
        WaitOutcome::Submitted(FeedbackResult::text("human"))
    );
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_at_the_overall_deadline() {
    let registry = RendezvousRegistry::new();
    let rx = registry.register("t-0001").await;

    let outcome = RendezvousRegistry::wait(rx, Duration::from_secs(300)).await;
    assert_eq!(outcome, WaitOutcome::TimedOut);
}

#[tokio::test]
async fn cancel_wakes_waiter_with_cancellation() {
    let registry = RendezvousRegistry::new();
    let rx = registry.register("t-0001").await;

    registry.cancel("t-0001").await;
    let outcome = RendezvousRegistry::wait(rx, Duration::from_secs(1)).await;
    assert_eq!(outcome, WaitOutcome::Cancelled);
}

#[tokio::test]
async fn cancel_all_wakes_every_waiter() {
    let registry = RendezvousRegistry::new();
    let rx1 = registry.register("t-0001").await;
    let rx2 = registry.register("t-0002").await;

    registry.cancel_all().await;

    assert_eq!(
        RendezvousRegistry::wait(rx1, Duration::from_secs(1)).await,
        WaitOutcome::Cancelled
    );
    assert_eq!(
        RendezvousRegistry::wait(rx2, Duration::from_secs(1)).await,
        WaitOutcome::Cancelled
    );
}

#[tokio::test]
async fn reregistering_replaces_a_stale_slot() {
    let registry = RendezvousRegistry::new();
    let stale = registry.register("t-0001").await;
    let fresh = registry.register("t-0001").await;

    registry
        .deliver("t-0001", TaskOutcome::Submitted(FeedbackResult::text("new")))
        .await;

    assert_eq!(
        RendezvousRegistry::wait(fresh, Duration::from_secs(1)).await,
        WaitOutcome::Submitted(FeedbackResult::text("new"))
    );
    // The stale waiter resolves as cancelled, not hung.
    assert_eq!(
        RendezvousRegistry::wait(stale, Duration::from_secs(1)).await,
        WaitOutcome::Cancelled
    );
}

#[tokio::test]
async fn discard_drops_the_slot_without_waking() {
    let registry = RendezvousRegistry::new();
    let rx = registry.register("t-0001").await;
    registry.discard("t-0001").await;

    // Sender gone — the waiter resolves as cancelled.
    assert_eq!(
        RendezvousRegistry::wait(rx, Duration::from_secs(1)).await,
        WaitOutcome::Cancelled
    );
}
