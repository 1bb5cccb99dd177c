use super::*;
use listing_watcher::ExecuteOptions;
use rstest::rstest;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[rstest]
#[case(1, 1)]
#[case(1, 7)]
#[case(3, 10)]
#[case(10, 10)]
#[case(10, 23)]
#[tokio::test]
async fn test_results_preserve_input_order(#[case] concurrency: usize, #[case] n: usize) -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.set_delay(Duration::from_millis(2));
    let (engine, _) = test_engine(&site, concurrency);
    let tasks = tasks(n);

    let report = engine.execute(&tasks, ExecuteOptions::default()).await?;

    let ids: Vec<_> = report.results.iter().map(|r| r.product_id.as_str()).collect();
    let expected: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, expected);
    assert_eq!(report.stats.total, n);
    assert_eq!(report.stats.success + report.stats.failed, n);
    Ok(())
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(10)]
#[tokio::test]
async fn test_concurrency_bound(#[case] concurrency: usize) -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.set_delay(Duration::from_millis(20));
    let (engine, _) = test_engine(&site, concurrency);

    engine.execute(&tasks(25), ExecuteOptions::default()).await?;

    assert!(site.peak_pages() <= concurrency, "peak {} > {}", site.peak_pages(), concurrency);
    assert!(engine.peak_open_pages() <= concurrency);
    assert_eq!(site.peak_pages(), concurrency);
    Ok(())
}

#[tokio::test]
async fn test_concurrency_override() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.set_delay(Duration::from_millis(10));
    let (engine, _) = test_engine(&site, 10);

    let options = ExecuteOptions {
        concurrency: Some(2),
        ..Default::default()
    };
    engine.execute(&tasks(6), options).await?;
    assert_eq!(site.peak_pages(), 2);
    Ok(())
}

#[tokio::test]
async fn test_pages_always_closed() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.route(&listing_url(1), Scenario::BrokenDom);
    site.route(&listing_url(2), Scenario::status(404));
    let (engine, _) = test_engine(&site, 3);

    engine.execute(&tasks(5), ExecuteOptions::default()).await?;
    settle(&site).await;

    // 4 single attempts plus 3 for the broken page
    assert_eq!(site.opened(), 7);
    assert_eq!(site.closed(), 7);
    assert_eq!(site.open_pages(), 0);
    assert_eq!(engine.open_pages(), 0);
    Ok(())
}

#[tokio::test]
async fn test_browser_launched_once_across_batches() -> anyhow::Result<()> {
    let site = FakeSite::new();
    let (engine, launcher) = test_engine(&site, 2);

    engine.execute(&tasks(3), ExecuteOptions::default()).await?;
    engine.execute(&tasks(4), ExecuteOptions::default()).await?;
    assert_eq!(launcher.launches(), 1);

    engine.close().await?;
    engine.close().await?;
    engine.execute(&tasks(1), ExecuteOptions::default()).await?;
    assert_eq!(launcher.launches(), 2);
    Ok(())
}

#[tokio::test]
async fn test_empty_batch() -> anyhow::Result<()> {
    let site = FakeSite::new();
    let (engine, launcher) = test_engine(&site, 3);

    let report = engine.execute(&[], ExecuteOptions::default()).await?;
    assert!(report.results.is_empty());
    assert_eq!(report.stats.total, 0);
    assert_eq!(report.stats.average_per_item, 0.0);
    assert_eq!(launcher.launches(), 0);
    Ok(())
}

#[tokio::test]
async fn test_launch_failure_propagates() {
    let site = FakeSite::new();
    let launcher = FakeLauncher::failing(Arc::clone(&site));
    let engine = ScrapingEngine::with_launcher(launcher, &ScraperConfig::default(), test_batch_config(3));

    let err = engine
        .execute(&tasks(3), ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_systemic());
    assert!(err.to_string().contains("chrome executable not found"));
    assert_eq!(site.opened(), 0);
}

#[tokio::test]
async fn test_invalid_task_rejected_before_launch() {
    let site = FakeSite::new();
    let (engine, launcher) = test_engine(&site, 3);

    let bad = vec![ScrapingTask::new("p0", "not a url")];
    let err = engine.execute(&bad, ExecuteOptions::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let options = ExecuteOptions {
        concurrency: Some(0),
        ..Default::default()
    };
    let err = engine.execute(&tasks(1), options).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn test_progress_events() -> anyhow::Result<()> {
    let site = FakeSite::new();
    let (engine, _) = test_engine(&site, 2);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let options = ExecuteOptions {
        progress: Some(tx),
        ..Default::default()
    };
    let report = engine.execute(&tasks(5), options).await?;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 5);
    for event in &events {
        assert_eq!(event.total, 5);
        assert_eq!(event.result.product_id, report.results[event.position - 1].product_id);
    }
    Ok(())
}

#[tokio::test]
async fn test_cancellation_still_yields_every_result() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.set_delay(Duration::from_millis(200));
    let (engine, _) = test_engine(&site, 2);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let options = ExecuteOptions {
        cancel: Some(cancel),
        ..Default::default()
    };
    let report = engine.execute(&tasks(6), options).await?;
    settle(&site).await;

    assert!(report.cancelled);
    assert_eq!(report.results.len(), 6);
    assert_eq!(report.stats.failed, 6);
    for result in &report.results {
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("batch cancelled"));
    }
    assert_eq!(site.open_pages(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancel_during_browser_launch() -> anyhow::Result<()> {
    let site = FakeSite::new();
    let launcher = FakeLauncher::slow(Arc::clone(&site), Duration::from_secs(30));
    let engine = ScrapingEngine::with_launcher(launcher.clone(), &ScraperConfig::default(), test_batch_config(2));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let options = ExecuteOptions {
        cancel: Some(cancel),
        ..Default::default()
    };
    let report = tokio::time::timeout(Duration::from_secs(5), engine.execute(&tasks(4), options)).await??;

    assert!(report.cancelled);
    assert_eq!(report.results.len(), 4);
    for result in &report.results {
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("batch cancelled"));
    }
    assert_eq!(launcher.launches(), 0);
    assert_eq!(site.opened(), 0);
    Ok(())
}

#[tokio::test]
async fn test_spawned_batch_streams_progress() -> anyhow::Result<()> {
    let site = FakeSite::new();
    let (engine, _) = test_engine(&site, 3);
    let engine = Arc::new(engine);

    let mut handle = engine.spawn_batch(tasks(4), None);
    let mut positions = Vec::new();
    while let Some(event) = handle.progress.recv().await {
        positions.push(event.position);
    }
    positions.sort();
    assert_eq!(positions, vec![1, 2, 3, 4]);

    let report = tokio_test::assert_ok!(handle.join.await?);
    assert_eq!(report.results.len(), 4);
    assert!(!report.cancelled);
    Ok(())
}

#[tokio::test]
async fn test_dropping_progress_receiver_cancels() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.set_delay(Duration::from_millis(5));
    let (engine, _) = test_engine(&site, 1);
    let engine = Arc::new(engine);

    let handle = engine.spawn_batch(tasks(5), None);
    drop(handle.progress);

    let report = handle.join.await??;
    assert!(report.cancelled);
    assert_eq!(report.results.len(), 5);
    assert!(report.results.iter().any(|r| r.error.as_deref() == Some("batch cancelled")));
    Ok(())
}
