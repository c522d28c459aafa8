//! 启动装配（Backbone）
//!
//! 以固定顺序构造全部组件，依赖通过构造参数显式传递：
//! 指标 → 事件目录（登记知名事件）→ 处理器登记表 → 死信服务 → 事件总线
//! → 缓存失效管理器（默认依赖）→ 订阅缓存失效处理器 → 注册运维处理器。
//!
//! 登记表由总线与死信服务共享，总线只通过 `DeadLetterSink` 写入死信，二者之间没有循环引用。
//!
use crate::admin::register_admin_handlers;
use crate::error::AppError;
use crate::inmemory_command_bus::InMemoryCommandBus;
use crate::inmemory_query_bus::InMemoryQueryBus;
use backbone_domain::cache::{
    CacheBackend, CacheInvalidationHandler, CacheInvalidationManager,
    register_default_dependencies,
};
use backbone_domain::dead_letter::{
    DeadLetterConfig, DeadLetterQueueService, DeadLetterReclaimer, DeadLetterRepository,
    EngineHandle, ReclaimerConfig,
};
use backbone_domain::domain_event::{EventCatalog, register_well_known_events};
use backbone_domain::eventing::{EventBusConfig, HandlerRegistry, RobustEventBus};
use backbone_domain::metrics::MetricsContext;
use bon::Builder;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, Builder)]
pub struct BackboneConfig {
    #[builder(default)]
    pub bus: EventBusConfig,
    #[builder(default)]
    pub dead_letter: DeadLetterConfig,
    /// 为空时不启动周期回收
    pub reclaimer: Option<ReclaimerConfig>,
}

pub struct Backbone {
    metrics: Arc<MetricsContext>,
    bus: RobustEventBus,
    dead_letters: Arc<DeadLetterQueueService>,
    cache: Arc<CacheInvalidationManager>,
    commands: InMemoryCommandBus,
    queries: InMemoryQueryBus,
    reclaimer: Option<EngineHandle>,
}

impl Backbone {
    /// 装配全部组件；配置了回收器时需在 Tokio 运行时内调用
    pub fn bootstrap(
        config: BackboneConfig,
        repository: Arc<dyn DeadLetterRepository>,
        cache_backend: Arc<dyn CacheBackend>,
    ) -> Result<Self, AppError> {
        let metrics = MetricsContext::new();

        let catalog = EventCatalog::new();
        register_well_known_events(&catalog);

        let registry = HandlerRegistry::new();

        let dead_letters = Arc::new(DeadLetterQueueService::new(
            repository,
            registry.clone(),
            config.dead_letter,
        ));

        let bus = RobustEventBus::builder()
            .catalog(catalog)
            .registry(registry)
            .metrics(metrics.clone())
            .dead_letters(dead_letters.clone())
            .config(config.bus)
            .build();

        let cache = Arc::new(CacheInvalidationManager::new(cache_backend, metrics.clone()));
        register_default_dependencies(&cache);

        CacheInvalidationHandler::new(cache.clone()).subscribe(&bus)?;

        let commands = InMemoryCommandBus::new();
        let queries = InMemoryQueryBus::new();
        register_admin_handlers(&commands, &queries, dead_letters.clone(), cache.clone())?;

        let reclaimer = config.reclaimer.map(|reclaimer_config| {
            Arc::new(DeadLetterReclaimer::new(dead_letters.clone(), reclaimer_config)).start()
        });

        info!(
            events = bus.catalog().names().len(),
            reclaimer = reclaimer.is_some(),
            "backbone ready"
        );

        Ok(Self {
            metrics,
            bus,
            dead_letters,
            cache,
            commands,
            queries,
            reclaimer,
        })
    }

    pub fn metrics(&self) -> &Arc<MetricsContext> {
        &self.metrics
    }

    pub fn bus(&self) -> &RobustEventBus {
        &self.bus
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterQueueService> {
        &self.dead_letters
    }

    pub fn cache(&self) -> &Arc<CacheInvalidationManager> {
        &self.cache
    }

    pub fn commands(&self) -> &InMemoryCommandBus {
        &self.commands
    }

    pub fn queries(&self) -> &InMemoryQueryBus {
        &self.queries
    }

    /// 等待后台分发结束并停止回收器
    pub async fn shutdown(mut self) {
        self.bus.flush().await;
        if let Some(handle) = self.reclaimer.take() {
            handle.shutdown();
            handle.join().await;
        }
        info!("backbone stopped");
    }
}
