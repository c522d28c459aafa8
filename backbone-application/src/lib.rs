//! 应用层（backbone-application）
//!
//! - 命令/查询抽象与进程内总线（按 `TypeId` 路由的类型擦除处理器）；
//! - 死信队列与缓存失效的运维命令/查询（`admin`）；
//! - 固定顺序的启动装配（`bootstrap`）。
//!
pub mod admin;
pub mod bootstrap;
pub mod command;
pub mod command_bus;
pub mod command_handler;
pub mod context;
pub mod dto;
pub mod error;
pub mod inmemory_command_bus;
pub mod inmemory_query_bus;
pub mod query;
pub mod query_bus;
pub mod query_handler;

pub use bootstrap::{Backbone, BackboneConfig};
pub use inmemory_command_bus::InMemoryCommandBus;
pub use inmemory_query_bus::InMemoryQueryBus;
