use backbone_application::admin::{
    GetCacheMetrics, InvalidateCache, ListDeadLetters, RemoveDeadLetter, ResetCacheMetrics,
    ResolveDeadLetter, RetryAllDeadLetters, RetryDeadLetter,
};
use backbone_application::command_bus::CommandBus;
use backbone_application::context::AppContext;
use backbone_application::error::AppError;
use backbone_application::query_bus::QueryBus;
use backbone_application::{Backbone, BackboneConfig};
use backbone_domain::cache::InMemoryCacheBackend;
use backbone_domain::dead_letter::{
    DeadLetterFilter, DeadLetterStatus, InMemoryDeadLetterRepository,
};
use backbone_domain::domain_event::{ChallengeChanged, ChallengeUpdated, PublishOptions};
use backbone_domain::eventing::handler_fn;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

fn backbone() -> (Backbone, InMemoryCacheBackend) {
    let cache = InMemoryCacheBackend::new();
    let backbone = Backbone::bootstrap(
        BackboneConfig::default(),
        Arc::new(InMemoryDeadLetterRepository::new()),
        Arc::new(cache.clone()),
    )
    .unwrap();
    (backbone, cache)
}

fn ops() -> AppContext {
    AppContext::builder()
        .actor_id("ops-1".into())
        .correlation_id("cor-admin".into())
        .build()
}

#[tokio::test(start_paused = true)]
async fn dead_letters_are_listed_retried_and_resolved_through_admin_buses() {
    let (backbone, _cache) = backbone();
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    backbone
        .bus()
        .subscribe(
            "ChallengeUpdated",
            "leaderboard",
            handler_fn(move |_ev| {
                let flag = flag.clone();
                async move {
                    anyhow::ensure!(flag.load(Ordering::SeqCst), "leaderboard offline");
                    Ok(())
                }
            }),
        )
        .unwrap();

    for id in ["c1", "c2"] {
        let _ = backbone
            .bus()
            .publish_event(
                &ChallengeUpdated(ChallengeChanged {
                    challenge_id: id.into(),
                    user_id: None,
                }),
                PublishOptions::default(),
            )
            .await;
    }

    let page = backbone
        .queries()
        .dispatch(
            &ops(),
            ListDeadLetters {
                status: Some(DeadLetterStatus::Pending),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.limit, 50);

    let scoped = backbone
        .commands()
        .dispatch(
            &ops(),
            RetryAllDeadLetters {
                filter: DeadLetterFilter {
                    status: Some(DeadLetterStatus::Exhausted),
                    ..Default::default()
                },
            },
        )
        .await
        .unwrap();
    assert_eq!(scoped.attempted, 0);

    let first = page.entries[0].id;
    let still_failing = backbone
        .commands()
        .dispatch(&ops(), RetryDeadLetter { id: first })
        .await
        .unwrap();
    assert_eq!(still_failing.status, DeadLetterStatus::Pending);
    assert_eq!(still_failing.retry_count, 4);

    healthy.store(true, Ordering::SeqCst);
    let summary = backbone
        .commands()
        .dispatch(&ops(), RetryAllDeadLetters::default())
        .await
        .unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);

    let err = backbone
        .commands()
        .dispatch(&ops(), RetryDeadLetter { id: first })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 409);

    backbone
        .commands()
        .dispatch(&ops(), RemoveDeadLetter { id: first })
        .await
        .unwrap();
    let remaining = backbone
        .queries()
        .dispatch(&ops(), ListDeadLetters::default())
        .await
        .unwrap();
    assert_eq!(remaining.total, 1);

    backbone.shutdown().await;
}

#[tokio::test]
async fn unknown_dead_letter_maps_to_404() {
    let (backbone, _cache) = backbone();

    for err in [
        backbone
            .commands()
            .dispatch(&ops(), RetryDeadLetter { id: Uuid::new_v4() })
            .await
            .unwrap_err(),
        backbone
            .commands()
            .dispatch(&ops(), ResolveDeadLetter { id: Uuid::new_v4() })
            .await
            .unwrap_err(),
        backbone
            .commands()
            .dispatch(&ops(), RemoveDeadLetter { id: Uuid::new_v4() })
            .await
            .unwrap_err(),
    ] {
        assert_eq!(err.status_code(), 404, "{err}");
    }
}

#[tokio::test]
async fn cache_admin_invalidates_and_reports_metrics() {
    let (backbone, cache) = backbone();
    cache.insert("challenge:c1", json!(1));
    cache.insert("challenges:list:page1", json!(1));
    cache.insert("leaderboard:weekly", json!(1));

    let cmd: InvalidateCache =
        serde_json::from_value(json!({"entityType": "challenge", "entityId": "c1"})).unwrap();
    backbone.commands().dispatch(&ops(), cmd).await.unwrap();
    backbone
        .commands()
        .dispatch(
            &ops(),
            InvalidateCache::Pattern {
                pattern: "leaderboard:*".into(),
            },
        )
        .await
        .unwrap();

    assert!(!cache.contains("challenge:c1"));
    assert!(!cache.contains("challenges:list:page1"));
    assert!(!cache.contains("leaderboard:weekly"));

    let metrics = backbone
        .queries()
        .dispatch(&ops(), GetCacheMetrics)
        .await
        .unwrap();
    assert_eq!(metrics.invalidations_by_entity_type.get("challenge"), Some(&1));
    assert_eq!(metrics.key_invalidations, 1);
    assert_eq!(metrics.pattern_invalidations, 3);
    assert!(metrics.last_invalidation.is_some());

    backbone
        .commands()
        .dispatch(&ops(), ResetCacheMetrics)
        .await
        .unwrap();
    let metrics = backbone
        .queries()
        .dispatch(&ops(), GetCacheMetrics)
        .await
        .unwrap();
    assert_eq!(metrics.pattern_invalidations, 0);
    assert!(metrics.invalidations_by_entity_type.is_empty());

    let err = backbone
        .commands()
        .dispatch(
            &ops(),
            InvalidateCache::Pattern {
                pattern: "  ".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(err.status_code(), 400);
}
