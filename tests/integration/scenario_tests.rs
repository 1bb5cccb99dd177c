use super::*;
use listing_watcher::browser::{FilterDecision, ResourceKind};
use listing_watcher::{ExecuteOptions, ListingStatus, Marketplace};
use rust_decimal::Decimal;

#[tokio::test]
async fn test_happy_path_active_listing() -> anyhow::Result<()> {
    let site = FakeSite::new();
    let (engine, _) = test_engine(&site, 1);

    let report = engine.execute(&tasks(1), ExecuteOptions::default()).await?;
    let result = &report.results[0];

    assert!(result.success);
    assert!(result.is_available);
    assert_eq!(result.status, ListingStatus::Active);
    assert_eq!(result.price, Some(Decimal::from(12345)));
    assert_eq!(result.stock, Some(2));
    assert_eq!(result.title.as_deref(), Some("Canon AE-1 Program"));
    assert_eq!(result.condition.as_deref(), Some("目立った傷や汚れなし"));
    assert_eq!(result.attempts, 1);
    assert!(result.error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_ended_listing() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.route(&listing_url(0), Scenario::ended());
    let (engine, _) = test_engine(&site, 1);

    let task = ScrapingTask::new("p0", listing_url(0)).with_marketplace(Marketplace::YahooAuctions);
    let report = engine.execute(&[task], ExecuteOptions::default()).await?;
    let result = &report.results[0];

    assert!(result.success);
    assert!(!result.is_available);
    assert_eq!(result.status, ListingStatus::Ended);
    assert_eq!(result.price, Some(Decimal::ZERO));
    assert_eq!(result.stock, Some(0));
    assert_eq!(site.attempts(&listing_url(0)), 1);
    Ok(())
}

#[tokio::test]
async fn test_not_found_listing() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.route(&listing_url(0), Scenario::status(404));
    site.route(&listing_url(1), Scenario::NoResponse);
    let (engine, _) = test_engine(&site, 2);

    let report = engine.execute(&tasks(2), ExecuteOptions::default()).await?;

    for result in &report.results {
        assert!(result.success);
        assert!(!result.is_available);
        assert_eq!(result.status, ListingStatus::NotFound);
        assert_eq!(result.attempts, 1);
    }
    assert_eq!(site.attempts(&listing_url(0)), 1);
    assert_eq!(site.attempts(&listing_url(1)), 1);
    Ok(())
}

#[tokio::test]
async fn test_gone_listing_is_deleted() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.route(&listing_url(0), Scenario::status(410));
    let (engine, _) = test_engine(&site, 1);

    let report = engine.execute(&tasks(1), ExecuteOptions::default()).await?;
    assert_eq!(report.results[0].status, ListingStatus::Deleted);
    assert!(report.results[0].success);
    assert_eq!(site.attempts(&listing_url(0)), 1);
    Ok(())
}

#[tokio::test]
async fn test_permanent_extractor_failure() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.route(&listing_url(0), Scenario::BrokenDom);
    let (engine, _) = test_engine(&site, 1);

    let report = engine.execute(&tasks(1), ExecuteOptions::default()).await?;
    let result = &report.results[0];

    assert!(!result.success);
    assert!(!result.is_available);
    assert_eq!(result.attempts, 3);
    assert_eq!(site.attempts(&listing_url(0)), 3);
    assert!(result.error.as_deref().unwrap_or_default().contains("Cannot read properties of null"));
    assert_eq!(report.stats.failed, 1);
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_retried() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.route(&listing_url(0), Scenario::status(503));
    let (engine, _) = test_engine(&site, 1);

    let report = engine.execute(&tasks(1), ExecuteOptions::default()).await?;
    let result = &report.results[0];

    assert!(!result.success);
    assert_eq!(site.attempts(&listing_url(0)), 3);
    assert!(result.error.as_deref().unwrap_or_default().contains("503"));
    Ok(())
}

#[tokio::test]
async fn test_transient_failure_recovers() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.route(
        &listing_url(0),
        Scenario::Flaky {
            failures: 1,
            html: ACTIVE_HTML.to_string(),
        },
    );
    let (engine, _) = test_engine(&site, 1);

    let report = engine.execute(&tasks(1), ExecuteOptions::default()).await?;
    let result = &report.results[0];

    assert!(result.success);
    assert_eq!(result.status, ListingStatus::Active);
    assert_eq!(result.attempts, 2);
    Ok(())
}

#[tokio::test]
async fn test_heavy_resources_are_aborted() -> anyhow::Result<()> {
    let site = FakeSite::new();
    let (engine, _) = test_engine(&site, 1);

    engine.execute(&tasks(1), ExecuteOptions::default()).await?;

    let decisions = site.decisions();
    assert_eq!(decisions.len(), 6);
    for (kind, decision) in decisions {
        let expected = match kind {
            ResourceKind::Image | ResourceKind::Font | ResourceKind::Stylesheet | ResourceKind::Media => {
                FilterDecision::Abort
            }
            _ => FilterDecision::Allow,
        };
        assert_eq!(decision, expected, "unexpected decision for {:?}", kind);
    }
    assert_eq!(engine.filter().aborted_count(), 4);
    assert_eq!(engine.filter().allowed_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_mixed_batch_stats() -> anyhow::Result<()> {
    let site = FakeSite::new();
    site.route(&listing_url(1), Scenario::ended());
    site.route(&listing_url(2), Scenario::status(404));
    site.route(&listing_url(3), Scenario::BrokenDom);
    let (engine, _) = test_engine(&site, 2);

    let report = engine.execute(&tasks(4), ExecuteOptions::default()).await?;

    let statuses: Vec<_> = report.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ListingStatus::Active,
            ListingStatus::Ended,
            ListingStatus::NotFound,
            ListingStatus::NotFound
        ]
    );
    assert_eq!(report.stats.total, 4);
    assert_eq!(report.stats.success, 3);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.changes_detected, 0);
    assert!(!report.cancelled);
    Ok(())
}
