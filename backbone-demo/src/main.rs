//! 演示：一次 `UserUpdated` 发布驱动缓存失效，同时一个故障订阅者进入死信队列，
//! 修复后通过运维命令重放。
//!
//! 运行：`RUST_LOG=debug cargo run -p backbone-demo`
//!
use backbone_application::admin::{GetCacheMetrics, ListDeadLetters, RetryDeadLetter};
use backbone_application::command_bus::CommandBus;
use backbone_application::context::AppContext;
use backbone_application::query_bus::QueryBus;
use backbone_application::{Backbone, BackboneConfig};
use backbone_domain::cache::InMemoryCacheBackend;
use backbone_domain::dead_letter::{DeadLetterStatus, InMemoryDeadLetterRepository};
use backbone_domain::domain_event::{PublishOptions, UserChanged, UserUpdated};
use backbone_domain::eventing::handler_fn;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cache = InMemoryCacheBackend::new();
    cache.insert("user:u1", json!({"name": "Ada"}));
    cache.insert("user:u1:achievements", json!(["first-challenge"]));

    let backbone = Backbone::bootstrap(
        BackboneConfig::default(),
        Arc::new(InMemoryDeadLetterRepository::new()),
        Arc::new(cache.clone()),
    )?;

    // 一个暂时故障的订阅者
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    backbone.bus().subscribe(
        "UserUpdated",
        "profile-search-indexer",
        handler_fn(move |event| {
            let flag = flag.clone();
            async move {
                anyhow::ensure!(flag.load(Ordering::SeqCst), "search index unavailable");
                info!(event_id = event.id(), "user reindexed");
                Ok(())
            }
        }),
    )?;

    let outcome = backbone
        .bus()
        .publish_event(
            &UserUpdated(UserChanged {
                user_id: "u1".into(),
            }),
            PublishOptions::builder()
                .correlation_id("demo-run".to_string())
                .build(),
        )
        .await;
    if let Err(err) = outcome {
        info!(error = %err, "publish reported handler failures");
    }

    info!(
        user_cached = cache.contains("user:u1"),
        achievements_cached = cache.contains("user:u1:achievements"),
        "cache after publish"
    );

    let ctx = AppContext::builder().actor_id("demo-operator".into()).build();
    let pending = backbone
        .queries()
        .dispatch(
            &ctx,
            ListDeadLetters {
                status: Some(DeadLetterStatus::Pending),
                ..Default::default()
            },
        )
        .await?;
    info!(pending = pending.total, "dead letters after publish");

    healthy.store(true, Ordering::SeqCst);
    for entry in pending.entries {
        let replayed = backbone
            .commands()
            .dispatch(&ctx, RetryDeadLetter { id: entry.id })
            .await?;
        info!(dead_letter_id = %replayed.id, status = %replayed.status, "replayed");
    }

    let metrics = backbone.queries().dispatch(&ctx, GetCacheMetrics).await?;
    info!(cache = %serde_json::to_string(&metrics)?, "cache metrics");
    info!(
        events = %serde_json::to_string(&backbone.metrics().events().snapshot())?,
        "event metrics"
    );

    backbone.shutdown().await;
    Ok(())
}
