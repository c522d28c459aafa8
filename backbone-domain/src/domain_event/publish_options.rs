use bon::Builder;
use serde::{Deserialize, Serialize};

/// 分发模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// 等待全部处理器结束（成功、耗尽重试或已写入死信）后返回
    #[default]
    Await,
    /// 分发开始后立即返回，失败仅体现在死信与指标中
    Decoupled,
}

/// 发布选项
#[derive(Debug, Clone, Default, Builder)]
pub struct PublishOptions {
    /// 显式事件 ID；为空时自动生成。重发同一业务事件时应复用以便死信去重
    pub event_id: Option<String>,
    pub correlation_id: Option<String>,
    pub source_id: Option<String>,
    #[builder(default)]
    pub mode: DispatchMode,
}

impl PublishOptions {
    pub fn decoupled() -> Self {
        Self {
            mode: DispatchMode::Decoupled,
            ..Self::default()
        }
    }
}
