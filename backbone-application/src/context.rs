use bon::Builder;

/// 应用层上下文（Application Context）
///
/// 承载一次应用层调用（命令/查询）所需的横切信息：
/// - 关联 ID（`correlation_id`）：用于链路追踪，也会写入由此触发的事件；
/// - 执行者（`actor_id`）：审计主体，例如发起重试的运维人员；
/// - 幂等键（`idempotency_key`）：用于在基础设施层实现请求幂等。
///
/// 典型用法：
/// ```rust
/// use backbone_application::context::AppContext;
///
/// let ctx = AppContext::builder()
///     .correlation_id("cor-123".into())
///     .actor_id("ops-1".into())
///     .build();
/// assert_eq!(ctx.actor_id.as_deref(), Some("ops-1"));
/// ```
#[derive(Clone, Debug, Default, Builder)]
pub struct AppContext {
    pub correlation_id: Option<String>,
    pub actor_id: Option<String>,
    /// 幂等键（可选）：为空则由上层或基础设施决定是否参与幂等
    pub idempotency_key: Option<String>,
}
