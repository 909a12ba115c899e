use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use ulid::Ulid;

use conveyor_core::app::{AppBuilder, Backends, Runtime, RuntimeOptions, WorkerLoop};
use conveyor_core::config::DemoConfig;
use conveyor_core::demo::{self, EXPECTED_TASKS};
use conveyor_core::domain::{
    AckPolicy, HandlerError, RetryPolicy, TaskId, TaskInvocation, TaskName, TaskState,
    TransportError,
};
use conveyor_core::impls::{InMemoryBroker, InMemoryClaimStore, InMemoryResultStore};
use conveyor_core::ports::{Broker, Clock, ResultStore, SystemClock};
use conveyor_core::typed::TaskPolicy;
use conveyor_core::{App, ConveyorError};

fn demo_config() -> DemoConfig {
    DemoConfig {
        flaky_failure_rate: 0.0,
        ..DemoConfig::default()
    }
}

fn demo_app(backends: &Backends) -> (App, demo::ChargeCounter) {
    let (builder, charges) =
        demo::register_all(AppBuilder::new(), &demo_config(), backends.idempotency_guard(None))
            .unwrap();
    let app = builder.expect_tasks(EXPECTED_TASKS).build().unwrap();
    (app, charges)
}

struct Local {
    broker: Arc<InMemoryBroker>,
    backends: Backends,
}

fn local_backends() -> Local {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broker = Arc::new(InMemoryBroker::new());
    let backends = Backends {
        broker: broker.clone(),
        results: Arc::new(InMemoryResultStore::new(clock.clone())),
        claims: Arc::new(InMemoryClaimStore::new()),
        clock,
    };
    Local { broker, backends }
}

#[tokio::test(start_paused = true)]
async fn long_running_task_reports_processed_word() {
    let backends = Backends::in_memory(None);
    let (app, _) = demo_app(&backends);
    let runtime = Runtime::start(&app, &backends, RuntimeOptions::in_process());

    let receipt = runtime
        .producer()
        .submit("long_running_task", vec![json!("demo")], "Task received")
        .await
        .unwrap();
    assert_eq!(receipt.message, "Task received");

    let record = runtime
        .status()
        .wait_for_terminal(receipt.task_id, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(record.state, TaskState::Success);
    assert_eq!(record.result, Some(json!("Processed: demo")));
    assert_eq!(record.attempt_count, 1);
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_orders_charge_once() {
    let backends = Backends::in_memory(None);
    let (app, charges) = demo_app(&backends);
    let runtime = Runtime::start(
        &app,
        &backends,
        RuntimeOptions {
            concurrency: 2,
            ..RuntimeOptions::in_process()
        },
    );

    let first = runtime.run_to_completion("process_order", vec![json!("A1")]);
    let second = runtime.run_to_completion("process_order", vec![json!("A1")]);
    let (first, second) = tokio::join!(first, second);

    let mut results: Vec<Value> = [first.unwrap(), second.unwrap()]
        .into_iter()
        .map(|record| {
            assert_eq!(record.state, TaskState::Success);
            record.result.unwrap()
        })
        .collect();
    results.sort_by_key(|v| v.to_string());
    assert_eq!(
        results,
        vec![
            json!("Order A1 Processed Successfully"),
            json!("Order A1 Skipped (Idempotent)"),
        ]
    );
    assert_eq!(charges.get(), 1);
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn always_failing_task_runs_max_retries_plus_one_times() {
    let calls = Arc::new(AtomicU32::new(0));
    let app = {
        let calls = calls.clone();
        AppBuilder::new()
            .register_fn(
                "always_fails",
                TaskPolicy::new().retry(RetryPolicy::transient(3)),
                move |_ctx, _args| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<Value, _>(HandlerError::transient("Simulated network failure!"))
                    }
                },
            )
            .unwrap()
            .build()
            .unwrap()
    };
    let runtime = Runtime::in_process(&app);

    let started = tokio::time::Instant::now();
    let record = runtime.run_to_completion("always_fails", vec![]).await.unwrap();

    assert_eq!(record.state, TaskState::Failure);
    assert_eq!(record.attempt_count, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(
        record.error.as_deref(),
        Some("transient: Simulated network failure!")
    );
    // Backoff 1s + 2s + 4s between the four attempts.
    assert!(started.elapsed() >= Duration::from_secs(7));
    runtime.shutdown().await;
}

#[tokio::test]
async fn unknown_task_fails_once() {
    let app = AppBuilder::new().build().unwrap();
    let runtime = Runtime::in_process(&app);

    let record = runtime.run_to_completion("no_such_task", vec![]).await.unwrap();
    assert_eq!(record.state, TaskState::Failure);
    assert_eq!(record.attempt_count, 0);
    assert!(record.error.unwrap().contains("no_such_task"));
    runtime.shutdown().await;
}

#[tokio::test]
async fn unreachable_broker_surfaces_transport_error() {
    let local = local_backends();
    let app = AppBuilder::new().build().unwrap();
    let runtime = Runtime::start(&app, &local.backends, RuntimeOptions::in_process());
    local.broker.close();

    let err = runtime
        .producer()
        .enqueue("long_running_task", vec![json!("demo")])
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Closed);

    let err = runtime
        .run_to_completion("long_running_task", vec![json!("demo")])
        .await
        .unwrap_err();
    assert!(matches!(err, ConveyorError::Transport(TransportError::Closed)));
    runtime.shutdown().await;
}

#[tokio::test]
async fn status_of_unknown_id_is_pending() {
    let runtime = Runtime::in_process(&AppBuilder::new().build().unwrap());
    let record = runtime
        .status()
        .get_status(TaskId::from_ulid(Ulid::new()))
        .await
        .unwrap();
    assert_eq!(record.state, TaskState::Pending);
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn records_are_evicted_after_retention() {
    let backends = Backends::in_memory(Some(Duration::from_secs(60)));
    let (app, _) = demo_app(&backends);
    let runtime = Runtime::start(&app, &backends, RuntimeOptions::in_process());

    let task_id = runtime
        .producer()
        .enqueue("scheduled_task_demo", vec![])
        .await
        .unwrap();
    let record = runtime
        .status()
        .wait_for_terminal(task_id, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(record.state, TaskState::Success);
    assert_eq!(record.result, Some(Value::Null));

    tokio::time::sleep(Duration::from_secs(61)).await;
    let record = runtime.status().get_status(task_id).await.unwrap();
    assert_eq!(record.state, TaskState::Pending);
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fire_and_forget_notification_runs_in_process() {
    let backends = Backends::in_memory(None);
    let (app, _) = demo_app(&backends);
    let runtime = Runtime::start(&app, &backends, RuntimeOptions::in_process());

    let started = tokio::time::Instant::now();
    let record = runtime
        .run_to_completion(
            "write_notification",
            vec![json!("user@example.com"), json!("Welcome to the system!")],
        )
        .await
        .unwrap();
    assert_eq!(record.state, TaskState::Success);
    assert!(started.elapsed() >= Duration::from_secs(3));
    runtime.shutdown().await;
}

/// A handler that counts its invocations and takes ten seconds.
fn slow_counting_worker(local: &Local, calls: Arc<AtomicU32>) -> WorkerLoop {
    let app = AppBuilder::new()
        .register_fn(
            "slow",
            TaskPolicy::new(),
            move |ctx, _args| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<_, HandlerError>(json!({ "redelivered": ctx.redelivered }))
                }
            },
        )
        .unwrap()
        .build()
        .unwrap();
    WorkerLoop::new(
        "default",
        local.backends.broker.clone(),
        local.backends.results.clone(),
        app.registry().clone(),
    )
}

fn slow_invocation(ack_policy: AckPolicy) -> TaskInvocation {
    TaskInvocation::new(
        TaskId::from_ulid(Ulid::new()),
        TaskName::new("slow"),
        vec![],
        Utc::now(),
        ack_policy,
    )
}

#[tokio::test(start_paused = true)]
async fn late_ack_task_is_rerun_after_worker_crash() {
    let local = local_backends();
    let calls = Arc::new(AtomicU32::new(0));
    let worker = slow_counting_worker(&local, calls.clone());
    let inv = slow_invocation(AckPolicy::Late);
    local.broker.publish("default", inv.clone()).await.unwrap();

    // Crash mid-handler: the in-flight future is dropped before the ack.
    let delivery = local.broker.consume("default").await.unwrap();
    let crashed = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.process(delivery).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    crashed.abort();
    assert!(crashed.await.unwrap_err().is_cancelled());

    let delivery = local.broker.consume("default").await.unwrap();
    assert!(delivery.redelivered());
    worker.process(delivery).await;

    let record = local.backends.results.get(inv.task_id()).await.unwrap().unwrap();
    assert_eq!(record.state, TaskState::Success);
    assert_eq!(record.attempt_count, 2);
    assert_eq!(record.result, Some(json!({ "redelivered": true })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(local.broker.in_flight().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn eager_ack_task_is_lost_on_worker_crash() {
    let local = local_backends();
    let calls = Arc::new(AtomicU32::new(0));
    let worker = slow_counting_worker(&local, calls.clone());
    let inv = slow_invocation(AckPolicy::Eager);
    local.broker.publish("default", inv.clone()).await.unwrap();

    let delivery = local.broker.consume("default").await.unwrap();
    let crashed = tokio::spawn(async move { worker.process(delivery).await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    crashed.abort();
    let _ = crashed.await;

    assert_eq!(local.broker.depth("default").unwrap(), 0);
    assert_eq!(local.broker.in_flight().unwrap(), 0);
    let record = local.backends.results.get(inv.task_id()).await.unwrap().unwrap();
    assert_eq!(record.state, TaskState::Started);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
