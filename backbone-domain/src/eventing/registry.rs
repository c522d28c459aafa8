//! 处理器登记表
//!
//! 以 (事件名, 处理器 ID) 为键保存处理器，同一事件名下保持登记顺序。
//! 总线用它分发，死信服务用它在重放时找回原处理器。
//!
use super::EventHandler;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct RegisteredHandler {
    pub handler_id: String,
    pub handler: Arc<dyn EventHandler>,
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    by_event: Arc<DashMap<String, Vec<RegisteredHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记处理器；同键重复登记时原位替换（后写者胜），返回是否发生替换
    pub fn insert(
        &self,
        event_name: &str,
        handler_id: &str,
        handler: Arc<dyn EventHandler>,
    ) -> bool {
        let mut list = self.by_event.entry(event_name.to_string()).or_default();

        if let Some(existing) = list.iter_mut().find(|h| h.handler_id == handler_id) {
            existing.handler = handler;
            return true;
        }

        list.push(RegisteredHandler {
            handler_id: handler_id.to_string(),
            handler,
        });
        false
    }

    pub fn remove(&self, event_name: &str, handler_id: &str) -> bool {
        let Some(mut list) = self.by_event.get_mut(event_name) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| h.handler_id != handler_id);
        before != list.len()
    }

    pub fn get(&self, event_name: &str, handler_id: &str) -> Option<Arc<dyn EventHandler>> {
        self.by_event.get(event_name).and_then(|list| {
            list.iter()
                .find(|h| h.handler_id == handler_id)
                .map(|h| h.handler.clone())
        })
    }

    /// 某事件名下的处理器快照（按登记顺序）
    pub fn handlers_for(&self, event_name: &str) -> Vec<RegisteredHandler> {
        self.by_event
            .get(event_name)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    pub fn handler_count(&self, event_name: &str) -> usize {
        self.by_event
            .get(event_name)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}
