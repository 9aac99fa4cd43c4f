//! Scheduler tests on paused time: non-overlap, end-of-cycle pause, shutdown.

mod common;

use common::{PanickingQueue, ScriptedCaller, memory_queue, test_config};
use cycleq::engine::{Cycle, CycleScheduler, Trigger};
use cycleq::queue::QueueGateway;
use std::sync::Arc;
use std::time::Duration;

fn scheduler(queue: Arc<cycleq::queue::MemoryQueue>, caller: Arc<ScriptedCaller>) -> CycleScheduler {
    CycleScheduler::new(Cycle::new(queue, caller, &test_config()))
}

#[tokio::test(start_paused = true)]
async fn trigger_while_running_is_skipped() {
    let queue = memory_queue();
    queue.push("slow-1");
    let caller = Arc::new(ScriptedCaller::new());
    let sched = scheduler(Arc::clone(&queue), Arc::clone(&caller));

    let Trigger::Started(handle) = sched.trigger() else {
        panic!("first trigger should start a cycle");
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(sched.is_running());

    match sched.trigger() {
        Trigger::Skipped { running_for } => assert!(running_for >= Duration::from_millis(10)),
        other => panic!("expected Skipped, got {other:?}"),
    }

    handle.await.unwrap();
    assert!(!sched.is_running());
    // The straggler is still holding one permit.
    assert_eq!(sched.available_admission(), test_config().batch_size - 1);

    // The cycle used its whole budget; only the margin before the next tick remains.
    match sched.trigger() {
        Trigger::Paused { remaining } => {
            assert!(remaining <= Duration::from_millis(test_config().deadline_margin_ms));
        }
        other => panic!("expected Paused, got {other:?}"),
    }
    tokio::time::sleep(Duration::from_millis(test_config().deadline_margin_ms)).await;
    assert!(matches!(sched.trigger(), Trigger::Started(_)));
}

#[tokio::test(start_paused = true)]
async fn quick_cycle_pauses_until_period_elapses() {
    let queue = memory_queue();
    queue.push("ok");
    let caller = Arc::new(ScriptedCaller::new());
    let sched = scheduler(Arc::clone(&queue), caller);

    let Trigger::Started(handle) = sched.trigger() else {
        panic!("first trigger should start a cycle");
    };
    handle.await.unwrap();
    assert!(queue.is_empty());

    match sched.trigger() {
        Trigger::Paused { remaining } => {
            assert!(remaining > Duration::ZERO);
            assert!(remaining <= Duration::from_secs(1));
        }
        other => panic!("expected Paused, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(matches!(sched.trigger(), Trigger::Started(_)));
}

#[tokio::test(start_paused = true)]
async fn busy_flag_is_released_after_a_panic() {
    let caller = Arc::new(ScriptedCaller::new());
    let sched = CycleScheduler::new(Cycle::new(Arc::new(PanickingQueue), caller, &test_config()));

    let Trigger::Started(handle) = sched.trigger() else {
        panic!("first trigger should start a cycle");
    };
    let joined = handle.await;
    assert!(joined.unwrap_err().is_panic());
    assert!(!sched.is_running());

    assert!(matches!(sched.trigger(), Trigger::Started(_)));
}

#[tokio::test(start_paused = true)]
async fn run_drains_the_queue_until_shutdown() {
    let queue = memory_queue();
    for i in 0..5 {
        queue.push(format!("ok-{i}"));
    }
    let caller = Arc::new(ScriptedCaller::new());
    let sched = scheduler(Arc::clone(&queue), Arc::clone(&caller));

    let runner = tokio::spawn({
        let sched = sched.clone();
        async move { sched.run().await }
    });

    tokio::time::sleep(Duration::from_millis(1500)).await;
    queue.push("ok-late");
    tokio::time::sleep(Duration::from_millis(1000)).await;
    sched.shutdown();

    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("scheduler should stop promptly")
        .unwrap();

    assert!(queue.is_empty());
    assert_eq!(caller.calls(), 6);
    assert!(!sched.is_running());
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_a_long_cycle() {
    let queue = memory_queue();
    queue.push("slow-job");
    let caller = Arc::new(ScriptedCaller::new());
    let sched = scheduler(Arc::clone(&queue), caller);

    let runner = tokio::spawn({
        let sched = sched.clone();
        async move { sched.run().await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sched.is_running());
    sched.shutdown();

    tokio::time::timeout(Duration::from_millis(500), runner)
        .await
        .expect("shutdown should not wait for the deadline")
        .unwrap();
    assert!(!sched.is_running());
    // Triggers after shutdown start cycles that refuse to run.
    if let Trigger::Started(handle) = sched.trigger() {
        handle.await.unwrap();
    }
    assert_eq!(queue.receive_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn back_to_back_deadline_cycles_run_on_every_tick() {
    let queue = memory_queue();
    for i in 0..5 {
        queue.push(format!("slow-{i}"));
    }
    let caller = Arc::new(ScriptedCaller::new());
    let mut config = test_config();
    config.batch_size = 1;
    config.receive_cap = 1;
    config.max_receive_calls = 1;
    let sched = CycleScheduler::new(Cycle::new(Arc::clone(&queue) as Arc<dyn QueueGateway>, caller, &config));

    let runner = tokio::spawn({
        let sched = sched.clone();
        async move { sched.run().await }
    });

    // Ticks at 0, 1, 2, 3 and 4 periods; every cycle hits its deadline.
    tokio::time::sleep(Duration::from_millis(config.cycle_period_ms * 9 / 2)).await;
    sched.shutdown();

    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("scheduler should stop promptly")
        .unwrap();
    assert_eq!(queue.receive_calls(), 5);
}
