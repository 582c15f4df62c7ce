//! Orchestration tests over scripted adapters

use crate::common::{
    error, orchestrator, orchestrator_with_directives, test_config, text, Adapters,
    FixedDirectives,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use sumi_gather::adapters::{AdapterKind, FetchErrorKind};
use sumi_gather::config::RateLimitConfig;
use sumi_gather::output::TaskClass;
use sumi_gather::{DataKind, GatherError, ProgressEvent, ScrapePlan, Task, TaskState};
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::test]
async fn test_same_domain_requests_are_spaced() {
    let adapters = Adapters::new();
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        requests_per_second: 10.0,
        burst: 1,
        max_acquire_wait_ms: 5_000,
        ..RateLimitConfig::default()
    };
    config.orchestrator.workers = 5;

    let tasks = (1..=5)
        .map(|id| Task::new(id, format!("https://example.com/page{}", id), DataKind::Text))
        .collect();
    let results = orchestrator(config, &adapters)
        .run(&ScrapePlan::new(tasks))
        .await
        .unwrap();

    assert_eq!(results.report.succeeded, 5);

    let mut times: Vec<_> = adapters.static_http.calls().iter().map(|c| c.at).collect();
    times.sort();
    for pair in times.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= Duration::from_millis(90), "requests only {:?} apart", gap);
    }
}

#[tokio::test]
async fn test_other_domain_does_not_wait() {
    let adapters = Adapters::new();
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        requests_per_second: 1.0,
        burst: 1,
        max_acquire_wait_ms: 5_000,
        ..RateLimitConfig::default()
    };
    config.orchestrator.workers = 2;

    // More slow-domain tasks than workers, queued ahead of the fast one
    let mut tasks: Vec<Task> = ["a", "b", "c", "d"]
        .iter()
        .enumerate()
        .map(|(i, page)| {
            Task::new(i as u64 + 1, format!("https://slow.com/{}", page), DataKind::Text)
        })
        .collect();
    tasks.push(Task::new(5, "https://fast.com/e", DataKind::Text));

    let started = tokio::time::Instant::now();
    let results = orchestrator(config, &adapters)
        .run(&ScrapePlan::new(tasks))
        .await
        .unwrap();
    assert_eq!(results.report.succeeded, 5);

    let fast = adapters
        .static_http
        .calls()
        .into_iter()
        .find(|c| c.url == "https://fast.com/e")
        .unwrap();
    assert!(fast.at.duration_since(started) < Duration::from_millis(500));
}

#[tokio::test]
async fn test_backoff_frees_worker() {
    let adapters = Adapters::new();
    adapters.static_http.script(
        "https://a.com/flaky",
        vec![Err(error(FetchErrorKind::Network))],
    );
    let mut config = test_config();
    config.orchestrator.workers = 1;
    config.retry.base_delay_ms = 500;
    config.retry.max_delay_ms = 500;

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://a.com/flaky", DataKind::Text),
        Task::new(2, "https://b.com/ok", DataKind::Text),
    ]);
    let started = tokio::time::Instant::now();
    let results = orchestrator(config, &adapters).run(&plan).await.unwrap();

    assert_eq!(results.get(1).unwrap().status, TaskState::Success);
    assert_eq!(results.get(1).unwrap().attempts, 2);
    assert_eq!(results.get(2).unwrap().status, TaskState::Success);

    let calls = adapters.static_http.calls();
    let order: Vec<&str> = calls.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(
        order,
        vec!["https://a.com/flaky", "https://b.com/ok", "https://a.com/flaky"]
    );
    assert!(calls[1].at.duration_since(started) < Duration::from_millis(300));
    assert!(calls[2].at.duration_since(calls[0].at) >= Duration::from_millis(490));
}

#[tokio::test]
async fn test_waiting_duplicate_does_not_hold_worker() {
    let adapters = Adapters::new();
    adapters
        .static_http
        .delay("https://example.com/a", Duration::from_millis(300));
    let mut config = test_config();
    config.orchestrator.workers = 2;

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/a", DataKind::Text),
        Task::new(2, "https://example.com/a?utm=1", DataKind::Text),
        Task::new(3, "https://other.com/b", DataKind::Text),
    ]);
    let started = tokio::time::Instant::now();
    let results = orchestrator(config, &adapters).run(&plan).await.unwrap();

    assert_eq!(results.get(2).unwrap().status, TaskState::SkippedDuplicate);
    assert_eq!(results.get(2).unwrap().duplicate_of, Some(1));

    let other = adapters
        .static_http
        .calls()
        .into_iter()
        .find(|c| c.url == "https://other.com/b")
        .unwrap();
    assert!(other.at.duration_since(started) < Duration::from_millis(200));
}

#[tokio::test]
async fn test_token_wait_beyond_bound_fails_task() {
    let adapters = Adapters::new();
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        requests_per_second: 1.0,
        burst: 1,
        max_acquire_wait_ms: 300,
        ..RateLimitConfig::default()
    };
    config.orchestrator.workers = 1;

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/a", DataKind::Text),
        Task::new(2, "https://example.com/b", DataKind::Text).with_max_retries(0),
    ]);
    let results = orchestrator(config, &adapters).run(&plan).await.unwrap();

    assert_eq!(results.get(1).unwrap().status, TaskState::Success);
    let second = results.get(2).unwrap();
    assert_eq!(second.status, TaskState::Failed);
    assert_eq!(second.attempts, 1);
    assert_eq!(
        second.error.as_ref().unwrap().kind,
        FetchErrorKind::RateLimitWait
    );
    assert_eq!(adapters.static_http.call_count(), 1);
}

#[tokio::test]
async fn test_orchestrator_reusable_after_cancel() {
    let adapters = Adapters::new();
    let orchestrator = orchestrator(test_config(), &adapters);
    let plan = ScrapePlan::new(vec![Task::new(1, "https://example.com/a", DataKind::Text)]);

    // A cancel requested between runs stops the next run only
    orchestrator.cancel_handle().cancel();
    let results = orchestrator.run(&plan).await.unwrap();
    assert_eq!(results.get(1).unwrap().status, TaskState::SkippedCancelled);
    assert!(!orchestrator.cancel_handle().is_cancelled());

    let results = orchestrator.run(&plan).await.unwrap();
    assert_eq!(results.get(1).unwrap().status, TaskState::Success);
    assert_eq!(adapters.static_http.call_count(), 1);
}

#[tokio::test]
async fn test_identical_plans_classify_identically() {
    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://a.com/ok", DataKind::Text),
        Task::new(2, "https://a.com/missing", DataKind::Text),
        Task::new(3, "https://b.com/flaky", DataKind::Text),
        Task::new(4, "https://b.com/private/x", DataKind::Text),
        Task::new(5, "https://a.com/ok?utm_source=feed", DataKind::Text),
        Task::new(6, "https://c.com/pic.png", DataKind::Image),
    ]);

    let mut runs = Vec::new();
    for _ in 0..2 {
        let adapters = Adapters::new();
        adapters.static_http.script(
            "https://a.com/missing",
            vec![Err(error(FetchErrorKind::Http { status: 404 }))],
        );
        adapters.static_http.script(
            "https://b.com/flaky",
            vec![Err(error(FetchErrorKind::Network))],
        );

        let results = orchestrator_with_directives(
            test_config(),
            &adapters,
            Arc::new(FixedDirectives("User-agent: *\nDisallow: /private".to_string())),
        )
        .run(&plan)
        .await
        .unwrap();

        let classes: Vec<(u64, TaskClass)> = results
            .report
            .tasks
            .iter()
            .map(|t| (t.task_id, t.class))
            .collect();
        runs.push(classes);
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(
        runs[0],
        vec![
            (1, TaskClass::Succeeded),
            (2, TaskClass::Failed { kind: FetchErrorKind::Http { status: 404 } }),
            (3, TaskClass::Recovered),
            (4, TaskClass::Disallowed),
            (5, TaskClass::Deduplicated),
            (6, TaskClass::Succeeded),
        ]
    );
}

#[tokio::test]
async fn test_equivalent_urls_fetch_once() {
    let adapters = Adapters::new();
    adapters
        .static_http
        .delay("https://example.com/a", Duration::from_millis(100));
    let mut config = test_config();
    config.orchestrator.workers = 3;

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/a", DataKind::Text),
        Task::new(2, "https://EXAMPLE.com/a?utm=1", DataKind::Text),
        Task::new(3, "https://www.example.com/a#top", DataKind::Text),
    ]);
    let results = orchestrator(config, &adapters).run(&plan).await.unwrap();

    assert_eq!(adapters.static_http.call_count(), 1);

    let winner = results
        .results
        .iter()
        .find(|r| r.duplicate_of.is_none())
        .unwrap();
    assert_eq!(winner.status, TaskState::Success);
    for result in results.results.iter().filter(|r| r.duplicate_of.is_some()) {
        assert_eq!(result.status, TaskState::SkippedDuplicate);
        assert_eq!(result.duplicate_of, Some(winner.task_id));
        assert_eq!(result.payload, winner.payload);
        assert_eq!(result.content_hash, winner.content_hash);
    }
    assert_eq!(results.report.deduplicated, 2);
}

#[tokio::test]
async fn test_different_kinds_are_not_deduplicated() {
    let adapters = Adapters::new();
    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/gallery", DataKind::Text),
        Task::new(2, "https://example.com/gallery", DataKind::Image),
    ]);

    orchestrator(test_config(), &adapters).run(&plan).await.unwrap();

    assert_eq!(adapters.static_http.call_count(), 1);
    assert_eq!(adapters.media.call_count(), 1);
}

#[tokio::test]
async fn test_attempts_never_exceed_retry_budget() {
    let adapters = Adapters::new();
    adapters.static_http.script(
        "https://example.com/down",
        (0..10).map(|_| Err(error(FetchErrorKind::Network))).collect(),
    );

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/down", DataKind::Text).with_max_retries(2),
    ]);
    let results = orchestrator(test_config(), &adapters).run(&plan).await.unwrap();

    let result = results.get(1).unwrap();
    assert_eq!(result.status, TaskState::Failed);
    assert_eq!(result.attempts, 3);
    assert_eq!(adapters.static_http.call_count(), 3);

    assert_eq!(results.errors.len(), 1);
    let record = &results.errors[0];
    assert_eq!(record.kind, FetchErrorKind::Network);
    assert_eq!(record.attempts.len(), 3);
    let numbers: Vec<u32> = record.attempts.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let adapters = Adapters::new();
    adapters.static_http.script(
        "https://example.com/gone",
        vec![Err(error(FetchErrorKind::Http { status: 410 }))],
    );
    adapters.media.script(
        "https://example.com/doc.pdf",
        vec![Err(error(FetchErrorKind::UnsupportedMediaType))],
    );

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/gone", DataKind::Text),
        Task::new(2, "https://example.com/doc.pdf", DataKind::Image),
    ]);
    let results = orchestrator(test_config(), &adapters).run(&plan).await.unwrap();

    assert_eq!(results.get(1).unwrap().attempts, 1);
    assert_eq!(results.get(2).unwrap().attempts, 1);
    assert_eq!(adapters.total_calls(), 2);
}

#[tokio::test]
async fn test_disallowed_is_not_retried_and_takes_no_token() {
    let adapters = Adapters::new();
    let config = test_config();
    let orchestrator = orchestrator_with_directives(
        config,
        &adapters,
        Arc::new(FixedDirectives("User-agent: *\nDisallow: /private".to_string())),
    );

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/private/a", DataKind::Text),
        Task::new(2, "https://example.com/private/b", DataKind::Text).with_max_retries(5),
        Task::new(3, "https://example.com/public", DataKind::Text),
    ]);
    let results = orchestrator.run(&plan).await.unwrap();

    for id in [1, 2] {
        let result = results.get(id).unwrap();
        assert_eq!(result.status, TaskState::Disallowed);
        assert_eq!(result.attempts, 1);
        assert_eq!(
            result.error.as_ref().unwrap().kind,
            FetchErrorKind::Disallowed
        );
    }
    assert_eq!(results.get(3).unwrap().status, TaskState::Success);

    assert_eq!(adapters.static_http.call_count(), 1);
    assert_eq!(orchestrator.limiter().granted("example.com").await, 1);
    assert_eq!(results.report.disallowed, 2);
}

#[tokio::test]
async fn test_cancellation_stops_dequeuing() {
    let adapters = Adapters::new();
    for id in 1..=5 {
        adapters.static_http.delay(
            &format!("https://example.com/{}", id),
            Duration::from_millis(200),
        );
    }
    let mut config = test_config();
    config.orchestrator.workers = 1;

    let orchestrator = orchestrator(config, &adapters);
    let mut events = orchestrator.subscribe();
    let cancel = orchestrator.cancel_handle();

    let plan = ScrapePlan::new(
        (1..=5)
            .map(|id| Task::new(id, format!("https://example.com/{}", id), DataKind::Text))
            .collect(),
    );

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let results = orchestrator.run(&plan).await.unwrap();
    canceller.await.unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(results.get(1).unwrap().status, TaskState::Success);
    for id in 2..=5 {
        let result = results.get(id).unwrap();
        assert_eq!(result.status, TaskState::SkippedCancelled);
        assert_eq!(result.attempts, 0);
    }
    assert_eq!(adapters.static_http.call_count(), 1);
    assert_eq!(results.report.cancelled, 4);
    assert!(results.report.interrupted);

    let mut running = HashSet::new();
    loop {
        match events.try_recv() {
            Ok(ProgressEvent::Running { task_id, .. }) => {
                running.insert(task_id);
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
    assert_eq!(running, HashSet::from([1]));
}

#[tokio::test]
async fn test_cancellation_interrupts_backoff() {
    let adapters = Adapters::new();
    adapters.static_http.script(
        "https://example.com/flaky",
        vec![Err(error(FetchErrorKind::Network))],
    );
    let mut config = test_config();
    config.retry.base_delay_ms = 5_000;
    config.retry.max_delay_ms = 5_000;

    let orchestrator = orchestrator(config, &adapters);
    let cancel = orchestrator.cancel_handle();
    let plan = ScrapePlan::new(vec![Task::new(1, "https://example.com/flaky", DataKind::Text)]);

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });
    let started = tokio::time::Instant::now();
    let results = orchestrator.run(&plan).await.unwrap();
    canceller.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    let result = results.get(1).unwrap();
    assert_eq!(result.status, TaskState::Failed);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.error.as_ref().unwrap().kind, FetchErrorKind::Network);
}

#[tokio::test]
async fn test_three_task_dedup_scenario() {
    let adapters = Adapters::new();
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        requests_per_second: 1.0,
        burst: 1,
        max_acquire_wait_ms: 5_000,
        ..RateLimitConfig::default()
    };

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/a", DataKind::Text),
        Task::new(2, "https://example.com/a?utm=1", DataKind::Text),
        Task::new(3, "https://other.com/b", DataKind::Text),
    ]);

    let started = tokio::time::Instant::now();
    let results = orchestrator(config, &adapters).run(&plan).await.unwrap();

    assert_eq!(adapters.static_http.call_count(), 2);
    assert_eq!(adapters.static_http.calls_for("https://example.com/a"), 1);
    assert_eq!(adapters.static_http.calls_for("https://other.com/b"), 1);

    let first = results.get(1).unwrap();
    let second = results.get(2).unwrap();
    assert_eq!(first.payload, second.payload);
    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(results.get(3).unwrap().status, TaskState::Success);

    // One unique request per domain: nothing waits on the 1 req/s bucket
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[tokio::test]
async fn test_empty_static_body_escalates_once() {
    let adapters = Adapters::new();
    adapters.static_http.script(
        "https://example.com/app",
        (0..10).map(|_| Err(error(FetchErrorKind::EmptyContent))).collect(),
    );
    adapters.rendered.script(
        "https://example.com/app",
        vec![Err(error(FetchErrorKind::RenderTimeout))],
    );

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/app", DataKind::Text).with_max_retries(3),
    ]);
    let results = orchestrator(test_config(), &adapters).run(&plan).await.unwrap();

    assert_eq!(adapters.static_http.call_count(), 3);
    assert_eq!(adapters.rendered.call_count(), 1);

    let result = results.get(1).unwrap();
    assert_eq!(result.status, TaskState::Failed);
    assert_eq!(result.attempts, 4);
    assert_eq!(result.adapter_used, Some(AdapterKind::Rendered));

    let adapters_used: Vec<AdapterKind> = results.errors[0]
        .attempts
        .iter()
        .map(|a| a.adapter)
        .collect();
    assert_eq!(
        adapters_used,
        vec![
            AdapterKind::Static,
            AdapterKind::Static,
            AdapterKind::Static,
            AdapterKind::Rendered
        ]
    );
    assert!(results.report.tasks[0].escalated);
}

#[tokio::test]
async fn test_escalation_recovers_task() {
    let adapters = Adapters::new();
    adapters.static_http.script(
        "https://example.com/spa",
        vec![
            Err(error(FetchErrorKind::EmptyContent)),
            Err(error(FetchErrorKind::Timeout)),
        ],
    );

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/spa", DataKind::Text).with_max_retries(2),
    ]);
    let results = orchestrator(test_config(), &adapters).run(&plan).await.unwrap();

    let result = results.get(1).unwrap();
    assert_eq!(result.status, TaskState::Success);
    assert_eq!(result.adapter_used, Some(AdapterKind::Rendered));
    assert_eq!(results.report.tasks[0].class, TaskClass::Recovered);
    assert_eq!(adapters.rendered.call_count(), 1);
}

#[tokio::test]
async fn test_too_many_requests_then_success_shrinks_bucket() {
    let adapters = Adapters::new();
    adapters.static_http.script(
        "https://example.com/busy",
        (0..3)
            .map(|_| Err(error(FetchErrorKind::Http { status: 429 })))
            .collect(),
    );
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        requests_per_second: 50.0,
        burst: 4,
        max_acquire_wait_ms: 5_000,
        ..RateLimitConfig::default()
    };

    let orchestrator = orchestrator(config, &adapters);
    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/busy", DataKind::Text).with_max_retries(3),
    ]);
    let results = orchestrator.run(&plan).await.unwrap();

    let result = results.get(1).unwrap();
    assert_eq!(result.status, TaskState::Success);
    assert_eq!(result.attempts, 4);
    assert_eq!(adapters.static_http.call_count(), 4);

    let capacity = orchestrator
        .limiter()
        .bucket_capacity("example.com")
        .await
        .unwrap();
    assert!(capacity < 4.0, "capacity still {}", capacity);

    // A subsequent task on the same domain still runs under the smaller bucket
    let follow_up = ScrapePlan::new(vec![Task::new(2, "https://example.com/next", DataKind::Text)]);
    let results = orchestrator.run(&follow_up).await.unwrap();
    assert_eq!(results.get(2).unwrap().status, TaskState::Success);
    assert!(
        orchestrator
            .limiter()
            .bucket_capacity("example.com")
            .await
            .unwrap()
            < 4.0
    );
}

#[tokio::test]
async fn test_too_many_requests_exhaustion() {
    let adapters = Adapters::new();
    adapters.static_http.script(
        "https://example.com/busy",
        (0..5)
            .map(|_| Err(error(FetchErrorKind::Http { status: 429 })))
            .collect(),
    );

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/busy", DataKind::Text).with_max_retries(1),
    ]);
    let results = orchestrator(test_config(), &adapters).run(&plan).await.unwrap();

    let result = results.get(1).unwrap();
    assert_eq!(result.status, TaskState::Failed);
    assert_eq!(
        result.error.as_ref().unwrap().kind,
        FetchErrorKind::RateLimitExceeded
    );
    assert_eq!(result.attempts, 2);
}

#[tokio::test]
async fn test_results_ordered_by_task_id() {
    let adapters = Adapters::new();
    for (id, delay) in [(1, 150), (2, 100), (3, 50), (4, 0)] {
        adapters.static_http.delay(
            &format!("https://site{}.com/", id),
            Duration::from_millis(delay),
        );
    }
    let mut config = test_config();
    config.orchestrator.workers = 4;

    let plan = ScrapePlan::new(
        [4, 2, 3, 1]
            .iter()
            .map(|&id| Task::new(id, format!("https://site{}.com/", id), DataKind::Text))
            .collect(),
    );
    let results = orchestrator(config, &adapters).run(&plan).await.unwrap();

    let ids: Vec<u64> = results.results.iter().map(|r| r.task_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_priority_controls_dispatch_order() {
    let adapters = Adapters::new();
    let mut config = test_config();
    config.orchestrator.workers = 1;

    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://a.com/low", DataKind::Text).with_priority(0),
        Task::new(2, "https://b.com/high", DataKind::Text).with_priority(10),
        Task::new(3, "https://c.com/mid", DataKind::Text).with_priority(5),
    ]);
    orchestrator(config, &adapters).run(&plan).await.unwrap();

    let order: Vec<String> = adapters
        .static_http
        .calls()
        .into_iter()
        .map(|c| c.url)
        .collect();
    assert_eq!(
        order,
        vec!["https://b.com/high", "https://c.com/mid", "https://a.com/low"]
    );
}

#[tokio::test]
async fn test_malformed_plan_rejected_before_fetching() {
    let adapters = Adapters::new();
    let plan = ScrapePlan::new(vec![
        Task::new(1, "https://example.com/a", DataKind::Text),
        Task::new(2, "", DataKind::Text),
        Task::new(3, "https://example.com/c", DataKind::Image).with_strategy(AdapterKind::Static),
    ]);

    let err = orchestrator(test_config(), &adapters)
        .run(&plan)
        .await
        .unwrap_err();

    match err {
        GatherError::Plan(rejected) => assert_eq!(rejected.problems.len(), 2),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(adapters.total_calls(), 0);
}

#[tokio::test]
async fn test_unread_progress_channel_never_blocks() {
    let adapters = Adapters::new();
    let mut config = test_config();
    config.orchestrator.progress_buffer = 1;

    let orchestrator = orchestrator(config, &adapters);
    let mut events = orchestrator.subscribe();

    let plan = ScrapePlan::new(
        (1..=20)
            .map(|id| Task::new(id, format!("https://example.com/{}", id), DataKind::Text))
            .collect(),
    );
    let results = tokio::time::timeout(Duration::from_secs(10), orchestrator.run(&plan))
        .await
        .expect("run blocked on the progress channel")
        .unwrap();
    assert_eq!(results.report.succeeded, 20);

    assert!(matches!(events.try_recv(), Err(TryRecvError::Lagged(_))));
    assert!(matches!(
        events.try_recv(),
        Ok(ProgressEvent::Terminal { .. })
    ));
}

#[tokio::test]
async fn test_progress_events_follow_task_lifecycle() {
    let adapters = Adapters::new();
    adapters.static_http.script(
        "https://example.com/a",
        vec![Err(error(FetchErrorKind::Timeout))],
    );

    let orchestrator = orchestrator(test_config(), &adapters);
    let mut events = orchestrator.subscribe();
    let plan = ScrapePlan::new(vec![Task::new(1, "https://example.com/a", DataKind::Text)]);
    orchestrator.run(&plan).await.unwrap();

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        states.push(event.state());
    }
    assert_eq!(
        states,
        vec![
            TaskState::Queued,
            TaskState::Running,
            TaskState::Retrying,
            TaskState::Running,
            TaskState::Success,
        ]
    );
}

#[tokio::test]
async fn test_snapshot_only_during_run() {
    let adapters = Adapters::new();
    adapters
        .static_http
        .delay("https://example.com/slow", Duration::from_millis(200));

    let orchestrator = Arc::new(orchestrator(test_config(), &adapters));
    assert!(orchestrator.snapshot().is_none());

    let running = Arc::clone(&orchestrator);
    let handle = tokio::spawn(async move {
        let plan = ScrapePlan::new(vec![
            Task::new(1, "https://example.com/fast", DataKind::Text),
            Task::new(2, "https://example.com/slow", DataKind::Text),
        ]);
        running.run(&plan).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = orchestrator.snapshot().unwrap();
    assert_eq!(snapshot.total, 2);
    assert_eq!(snapshot.completed, 1);
    assert_eq!(snapshot.count(TaskState::Success), 1);

    handle.await.unwrap().unwrap();
    assert!(orchestrator.snapshot().is_none());
}

#[tokio::test]
async fn test_payload_shared_with_text_helper() {
    let adapters = Adapters::new();
    adapters.static_http.script(
        "https://example.com/a",
        vec![Ok(text("https://example.com/a", "exact body"))],
    );

    let plan = ScrapePlan::new(vec![Task::new(1, "https://example.com/a", DataKind::Text)]);
    let results = orchestrator(test_config(), &adapters).run(&plan).await.unwrap();

    let payload = results.get(1).unwrap().payload.clone().unwrap();
    assert_eq!(payload.content_hash(), text("x", "exact body").content_hash());
}
