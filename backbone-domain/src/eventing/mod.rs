//! 事件子系统（eventing）
//!
//! 提供事件发布/订阅与处理的基础抽象与运行时：
//! - `EventHandler`：对某个事件名进行消费处理；
//! - `HandlerRegistry`：按 (事件名, 处理器 ID) 登记处理器，总线与死信服务共享；
//! - `RetryPolicy`：单次尝试超时与指数退避；
//! - `RobustEventBus`：并发分发、失败隔离、有界重试，并将耗尽的尝试升级到死信；
//! - `EventMetrics`：按事件名累计的发布/失败/死信计数。
//!
pub mod bus;
pub mod failure;
pub mod handler;
pub mod metrics;
pub mod registry;
pub mod retry;

pub use bus::{EventBusConfig, RobustEventBus};
pub use failure::{DispatchFailures, FailureKind, HandlerFailure, HandlerTimeout, PoisonEvent};
pub use handler::{EventHandler, FnHandler, HandledEventType, NamedEventHandler, handler_fn};
pub use metrics::{EventCountersSnapshot, EventMetrics};
pub use registry::{HandlerRegistry, RegisteredHandler};
pub use retry::RetryPolicy;
