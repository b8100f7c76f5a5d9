//! End-to-end orchestration tests
//!
//! Drive jobs through the orchestrator with a scripted crawler and check
//! step order, progress, admission and failure handling.

use std::sync::Arc;

use crawl_orchestrator::crawler::CrawlerRegistry;
use crawl_orchestrator::models::Platform;
use crawl_orchestrator::orchestrator::{
    ConfigResolver, CrawlRequest, CrawlerConfigOverlay, CrawlerSettings, DelayPolicy, DelayRange,
    JobEvent, JobStatus, Orchestrator, OrchestratorError,
};
use crawl_orchestrator::storage::ResultStore;

use super::fixtures::{
    collect_until_terminal, next_event, orchestrator_with, BrokenStore, ScriptedCrawler,
};

// ============================================================================
// Step Order and Progress
// ============================================================================

#[tokio::test]
async fn test_steps_follow_submitted_order() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let (orch, _store) = orchestrator_with(crawler.clone());
    let mut events = orch.subscribe();

    // Duplicate platforms are separate steps.
    let receipt = orch
        .submit(CrawlRequest::new(&["xhs", "dy", "xhs"], &[&["a"], &["b"]]))
        .await
        .unwrap();
    let events = collect_until_terminal(&mut events, &receipt.task_id).await;

    let expected = vec![
        (Platform::Xhs, "a".to_string()),
        (Platform::Douyin, "a".to_string()),
        (Platform::Xhs, "a".to_string()),
        (Platform::Xhs, "b".to_string()),
        (Platform::Douyin, "b".to_string()),
        (Platform::Xhs, "b".to_string()),
    ];
    assert_eq!(crawler.call_order(), expected);

    let cursors: Vec<(usize, Platform)> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::StepStarted {
                round, platform, ..
            } => Some((*round, *platform)),
            _ => None,
        })
        .collect();
    assert_eq!(
        cursors,
        vec![
            (1, Platform::Xhs),
            (1, Platform::Douyin),
            (1, Platform::Xhs),
            (2, Platform::Xhs),
            (2, Platform::Douyin),
            (2, Platform::Xhs),
        ]
    );
    assert!(matches!(events.last(), Some(JobEvent::Completed { .. })));
}

#[tokio::test]
async fn test_progress_is_monotonic_and_hits_100_only_when_completed() {
    let (crawler, gate) = ScriptedCrawler::new().gated();
    let (orch, _store) = orchestrator_with(Arc::new(crawler));
    let mut rx = orch.subscribe();

    let receipt = orch
        .submit(CrawlRequest::new(&["xhs", "bili", "wb"], &[&["a"], &["b"]]))
        .await
        .unwrap();

    let mut last_progress = 0.0;
    loop {
        let event = next_event(&mut rx, &receipt.task_id).await;
        match event {
            JobEvent::StepStarted { .. } => {
                // The step is parked in the crawler until released.
                let job = orch.status(&receipt.task_id).await.unwrap();
                assert_eq!(job.status, JobStatus::Running);
                assert!(job.progress < 100.0);
                assert!(job.progress >= last_progress);
                last_progress = job.progress;
                gate.add_permits(1);
            }
            JobEvent::StepCompleted { progress, .. } => {
                assert!(progress >= last_progress);
                last_progress = progress;
            }
            JobEvent::Completed { .. } => break,
            JobEvent::Failed { error, .. } => panic!("job failed: {error}"),
            JobEvent::Started { total_steps, .. } => assert_eq!(total_steps, 6),
        }
    }

    let job = orch.status(&receipt.task_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100.0);
    assert!(job.started_at.is_some());
    assert!(job.finished_at.is_some());
    assert!(job.error_message.is_none());
}

#[tokio::test]
async fn test_two_round_single_platform_scenario() {
    let (crawler, gate) = ScriptedCrawler::new().gated();
    let crawler = Arc::new(crawler);
    let (orch, _store) = orchestrator_with(crawler);
    let mut rx = orch.subscribe();

    let receipt = orch
        .submit(
            CrawlRequest::new(&["xhs"], &[&["a"], &["b"]]).with_config(CrawlerConfigOverlay {
                max_notes_count: Some(5),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    assert_eq!(receipt.total_rounds, 2);
    assert_eq!(receipt.platforms, vec![Platform::Xhs]);

    // Round 1 in flight.
    assert!(matches!(
        next_event(&mut rx, &receipt.task_id).await,
        JobEvent::Started { .. }
    ));
    assert!(matches!(
        next_event(&mut rx, &receipt.task_id).await,
        JobEvent::StepStarted { round: 1, .. }
    ));
    let job = orch.status(&receipt.task_id).await.unwrap();
    assert_eq!(job.current_round, Some(1));
    assert_eq!(job.progress, 0.0);

    gate.add_permits(1);
    match next_event(&mut rx, &receipt.task_id).await {
        JobEvent::StepCompleted {
            round, progress, ..
        } => {
            assert_eq!(round, 1);
            assert_eq!(progress, 50.0);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Round 2 in flight: progress still reflects round 1 only.
    assert!(matches!(
        next_event(&mut rx, &receipt.task_id).await,
        JobEvent::StepStarted { round: 2, .. }
    ));
    let job = orch.status(&receipt.task_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.progress, 50.0);
    assert_eq!(job.current_round, Some(2));
    assert_eq!(job.current_platform, Some(Platform::Xhs));

    gate.add_permits(1);
    let rest = collect_until_terminal(&mut rx, &receipt.task_id).await;
    assert!(matches!(rest.last(), Some(JobEvent::Completed { .. })));

    let job = orch.status(&receipt.task_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100.0);
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_submit_while_running_is_rejected_without_record() {
    let (crawler, gate) = ScriptedCrawler::new().gated();
    let (orch, _store) = orchestrator_with(Arc::new(crawler));
    let mut rx = orch.subscribe();

    let first = orch
        .submit(CrawlRequest::new(&["xhs"], &[&["a"]]).with_task_id("first"))
        .await
        .unwrap();
    assert!(orch.is_running());

    let err = orch
        .submit(CrawlRequest::new(&["dy"], &[&["b"]]).with_task_id("second"))
        .await
        .unwrap_err();
    match err {
        OrchestratorError::AdmissionConflict { running_task } => {
            assert_eq!(running_task.as_deref(), Some("first"));
        }
        other => panic!("expected conflict, got {other}"),
    }
    assert!(matches!(
        orch.status("second").await,
        Err(OrchestratorError::NotFound { .. })
    ));
    assert_eq!(orch.current_task().await.unwrap().id, "first");

    gate.add_permits(1);
    collect_until_terminal(&mut rx, &first.task_id).await;
    assert!(!orch.is_running());
    assert!(orch.current_task().await.is_none());

    // Slot is free again.
    gate.add_permits(1);
    let next = orch
        .submit(CrawlRequest::new(&["dy"], &[&["b"]]).with_task_id("second"))
        .await
        .unwrap();
    collect_until_terminal(&mut rx, &next.task_id).await;
    assert_eq!(
        orch.status("second").await.unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_concurrent_submissions_admit_exactly_one() {
    let (crawler, gate) = ScriptedCrawler::new().gated();
    let (orch, _store) = orchestrator_with(Arc::new(crawler));
    let orch = Arc::new(orch);

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.submit(CrawlRequest::new(&["ks"], &[&["race"]]).with_task_id(format!("job-{i}")))
                    .await
            })
        })
        .collect();

    let mut accepted = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => accepted.push(receipt.task_id),
            Err(OrchestratorError::AdmissionConflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error {other}"),
        }
    }

    assert_eq!(accepted.len(), 1);
    assert_eq!(conflicts, 11);
    for i in 0..12 {
        let id = format!("job-{i}");
        assert_eq!(orch.status(&id).await.is_ok(), accepted.contains(&id));
    }

    gate.add_permits(1);
    orch.shutdown().await;
}

#[tokio::test]
async fn test_resubmitting_running_task_id_conflicts() {
    let (crawler, gate) = ScriptedCrawler::new().gated();
    let (orch, _store) = orchestrator_with(Arc::new(crawler));
    let mut rx = orch.subscribe();

    orch.submit(CrawlRequest::new(&["xhs"], &[&["a"]]).with_task_id("hourly"))
        .await
        .unwrap();

    let err = orch
        .submit(CrawlRequest::new(&["dy"], &[&["b"]]).with_task_id(" hourly "))
        .await
        .unwrap_err();
    match err {
        OrchestratorError::AdmissionConflict { running_task } => {
            assert_eq!(running_task.as_deref(), Some("hourly"));
        }
        other => panic!("expected conflict, got {other}"),
    }

    // The running job is untouched.
    let job = orch.status("hourly").await.unwrap();
    assert_eq!(job.platforms, vec![Platform::Xhs]);

    gate.add_permits(1);
    collect_until_terminal(&mut rx, "hourly").await;
}

#[tokio::test]
async fn test_reusing_task_id_is_rejected() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let (orch, _store) = orchestrator_with(crawler);
    let mut rx = orch.subscribe();

    orch.submit(CrawlRequest::new(&["xhs"], &[&["a"]]).with_task_id("nightly"))
        .await
        .unwrap();
    collect_until_terminal(&mut rx, "nightly").await;

    let err = orch
        .submit(CrawlRequest::new(&["xhs"], &[&["a"]]).with_task_id("nightly"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation { .. }));
    assert!(!orch.is_running());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_crawler_failure_freezes_cursors_and_releases_lock() {
    // Second call is round 1, platform "dy".
    let crawler = Arc::new(ScriptedCrawler::new().failing_on(2, "captcha wall"));
    let (orch, store) = orchestrator_with(crawler.clone());
    let mut rx = orch.subscribe();

    let receipt = orch
        .submit(CrawlRequest::new(&["xhs", "dy"], &[&["a"], &["b"]]))
        .await
        .unwrap();
    let events = collect_until_terminal(&mut rx, &receipt.task_id).await;

    match events.last() {
        Some(JobEvent::Failed { error, .. }) => assert!(error.contains("captcha wall")),
        other => panic!("expected failure, got {other:?}"),
    }

    let job = orch.status(&receipt.task_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.as_deref().unwrap().contains("captcha wall"));
    assert_eq!(job.current_round, Some(1));
    assert_eq!(job.current_platform, Some(Platform::Douyin));
    assert_eq!(job.progress, 25.0);
    assert!(job.finished_at.is_some());
    assert!(!orch.is_running());

    // No further steps ran; the first step's results stay.
    assert_eq!(crawler.calls().len(), 2);
    assert_eq!(store.count_stats(Platform::Xhs).await.unwrap().total_posts, 2);
    assert_eq!(store.count_stats(Platform::Douyin).await.unwrap().total_posts, 0);
}

#[tokio::test]
async fn test_persistence_failure_fails_job() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let orch = Orchestrator::new(CrawlerRegistry::uniform(crawler), Arc::new(BrokenStore))
        .with_delays(DelayPolicy::none());
    let mut rx = orch.subscribe();

    let receipt = orch
        .submit(CrawlRequest::new(&["zhihu"], &[&["a"]]))
        .await
        .unwrap();
    collect_until_terminal(&mut rx, &receipt.task_id).await;

    let job = orch.status(&receipt.task_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let message = job.error_message.unwrap();
    assert!(message.contains("zhihu"));
    assert!(message.contains("disk full"));
    assert!(!orch.is_running());
}

#[tokio::test]
async fn test_crawler_panic_fails_job() {
    let crawler = Arc::new(ScriptedCrawler::new().panicking_on(1));
    let (orch, _store) = orchestrator_with(crawler);
    let mut rx = orch.subscribe();

    let receipt = orch
        .submit(CrawlRequest::new(&["tieba"], &[&["a"]]))
        .await
        .unwrap();
    collect_until_terminal(&mut rx, &receipt.task_id).await;

    let job = orch.status(&receipt.task_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("aborted"));
    assert!(!orch.is_running());
}

#[tokio::test]
async fn test_shutdown_interrupts_running_job() {
    let (crawler, _gate) = ScriptedCrawler::new().gated();
    let (orch, _store) = orchestrator_with(Arc::new(crawler));
    let mut rx = orch.subscribe();

    let receipt = orch
        .submit(CrawlRequest::new(&["xhs"], &[&["a"]]))
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut rx, &receipt.task_id).await,
        JobEvent::Started { .. }
    ));

    orch.shutdown().await;

    let job = orch.status(&receipt.task_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_message
        .unwrap()
        .contains("interrupted by shutdown"));
    assert!(!orch.is_running());

    let err = orch
        .submit(CrawlRequest::new(&["xhs"], &[&["a"]]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Interrupted));
}

// ============================================================================
// Configuration and Results
// ============================================================================

#[tokio::test]
async fn test_overlay_is_merged_onto_platform_baseline() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let resolver = ConfigResolver::new(CrawlerSettings::default()).with_platform_override(
        Platform::Bilibili,
        CrawlerConfigOverlay {
            sort_type: Some("pubdate".to_string()),
            max_scan_page: Some(3),
            ..Default::default()
        },
    );
    let (orch, _store) = orchestrator_with(crawler.clone());
    let orch = orch.with_resolver(resolver);
    let mut rx = orch.subscribe();

    let overlay: CrawlerConfigOverlay = serde_json::from_value(serde_json::json!({
        "headless": true,
        "max_scan_page": 7,
        "start_page": 2
    }))
    .unwrap();
    let receipt = orch
        .submit(CrawlRequest::new(&["bili", "xhs"], &[&["a"]]).with_config(overlay))
        .await
        .unwrap();
    collect_until_terminal(&mut rx, &receipt.task_id).await;

    let calls = crawler.calls();
    let bili = &calls[0].config;
    assert_eq!(bili.platform, Platform::Bilibili);
    assert!(bili.settings.headless);
    assert_eq!(bili.settings.max_scan_page, 7);
    assert_eq!(bili.settings.sort_type, "pubdate");
    assert_eq!(bili.settings.extra["start_page"], 2);

    let xhs = &calls[1].config;
    assert_eq!(xhs.settings.sort_type, "general");
    assert_eq!(xhs.settings.max_scan_page, 7);
}

#[tokio::test]
async fn test_reserved_config_keys_are_rejected() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let (orch, _store) = orchestrator_with(crawler.clone());

    for overlay in [
        serde_json::json!({"platform": "dy"}),
        serde_json::json!({"keywords": ["elsewhere"], "headless": true}),
    ] {
        let overlay: CrawlerConfigOverlay = serde_json::from_value(overlay).unwrap();
        let err = orch
            .submit(CrawlRequest::new(&["xhs"], &[&["a"]]).with_config(overlay))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation { .. }), "{err}");
    }

    assert!(!orch.is_running());
    assert!(crawler.calls().is_empty());
}

#[tokio::test]
async fn test_results_carry_crawl_metadata() {
    let crawler = Arc::new(ScriptedCrawler::new().with_posts_per_call(3));
    let (orch, store) = orchestrator_with(crawler);
    let mut rx = orch.subscribe();

    let receipt = orch
        .submit(
            CrawlRequest::new(&["wb"], &[&["tea", "coffee"], &["tea", "coffee"]])
                .with_task_id("meta")
                .with_task_name("beverages"),
        )
        .await
        .unwrap();
    collect_until_terminal(&mut rx, &receipt.task_id).await;

    // The second round re-crawls the same keywords and overwrites.
    let rows = store.query(Platform::Weibo, 100, 0).await.unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.crawl_metadata.task_id, "meta");
        assert_eq!(row.crawl_metadata.round, 2);
        assert_eq!(row.crawl_metadata.keywords, vec!["tea", "coffee"]);
        assert_eq!(row.comment_count, row.comments.len());
        assert_eq!(row.post_detail["call"], 2);
    }

    let job = orch.status("meta").await.unwrap();
    assert_eq!(job.name.as_deref(), Some("beverages"));
}

// ============================================================================
// Pauses
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_pauses_fall_only_between_steps() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let (orch, _store) = orchestrator_with(crawler);
    let orch = orch.with_delays(DelayPolicy {
        between_platforms: DelayRange::from_secs(60, 60),
        between_rounds: DelayRange::from_secs(300, 300),
    });
    let mut rx = orch.subscribe();

    let start = tokio::time::Instant::now();
    let receipt = orch
        .submit(CrawlRequest::new(&["xhs", "dy"], &[&["a"], &["b"]]))
        .await
        .unwrap();

    // No timeout here: with the clock paused it would fire before the pauses.
    let mut step_offsets = Vec::new();
    let finished_at = loop {
        let event = rx.recv().await.unwrap();
        if event.task_id() != receipt.task_id {
            continue;
        }
        match event {
            JobEvent::StepStarted { .. } => step_offsets.push(start.elapsed().as_secs()),
            JobEvent::Completed { .. } => break start.elapsed().as_secs(),
            JobEvent::Failed { error, .. } => panic!("job failed: {error}"),
            _ => {}
        }
    };

    // xhs, 60s, dy, 300s, xhs, 60s, dy
    assert_eq!(step_offsets, vec![0, 60, 360, 420]);
    // Nothing waits after the final step.
    assert_eq!(finished_at, 420);
    assert_eq!(
        orch.status(&receipt.task_id).await.unwrap().status,
        JobStatus::Completed
    );
}
